//! Step 2: requirement extraction and SKU matching against the active catalog.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use rfpflow_core::domain::analysis::{AnalysisSource, SkuMatch, TechnicalAnalysis};
use rfpflow_core::domain::product::{Product, ProductId};
use rfpflow_core::domain::rfp::{Requirement, RequirementId, Rfp};
use rfpflow_core::domain::workflow::{AgentType, TaskComplexity};
use rfpflow_db::RepositorySet;

use super::parse::{clean_list, parse_model_json, validate_number, ParseError};
use crate::gateway::{ModelGateway, ModelRequest};
use crate::runtime::{PipelineStep, StepContext, StepError};

/// Below this the model's matching is replaced by keyword overlap.
pub const MIN_MATCH_CONFIDENCE: f64 = 0.3;
const HEURISTIC_PRODUCT_LIMIT: usize = 3;
const HEURISTIC_CONFIDENCE: f64 = 0.25;
const SAMPLE_CONFIDENCE: f64 = 0.1;
const MAX_MATCHES: usize = 10;
const EXCERPT_CHARS: usize = 8_000;

const SYSTEM_PROMPT: &str = "You are a technical bid engineer. You only reference products from \
the catalog you are given. Reply with a single JSON object and nothing else.";

const MANDATORY_MARKERS: [&str; 4] = ["must", "shall", "required", "mandatory"];
const OPTIONAL_MARKERS: [&str; 3] = ["optional", "should", "preferred"];
const DURATION_UNITS: [&str; 8] =
    ["day", "days", "week", "weeks", "month", "months", "year", "years"];
const STOP_WORDS: [&str; 12] =
    ["the", "and", "for", "with", "all", "of", "be", "are", "must", "shall", "supplier", "each"];

#[derive(Debug, Deserialize)]
struct ExtractionReply {
    requirements: Vec<ExtractedRequirement>,
}

#[derive(Debug, Deserialize)]
struct ExtractedRequirement {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    section: Option<String>,
    text: String,
    #[serde(default)]
    mandatory: bool,
    #[serde(default)]
    quantity: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MatchingReply {
    matches: Vec<MatchReply>,
    #[serde(default)]
    gaps: Vec<String>,
    #[serde(default)]
    risks: Vec<String>,
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MatchReply {
    #[serde(default)]
    requirement_id: Option<String>,
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    sku: Option<String>,
    match_score: Option<f64>,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    gaps: Vec<String>,
}

/// Validated matching result before it is stamped with run ids.
struct Matching {
    matches: Vec<SkuMatch>,
    gaps: Vec<String>,
    risks: Vec<String>,
    confidence: f64,
    source: AnalysisSource,
}

pub struct TechnicalAgent {
    gateway: ModelGateway,
    repos: RepositorySet,
    sample_matches_on_empty_catalog: bool,
}

impl TechnicalAgent {
    pub fn new(gateway: ModelGateway, repos: RepositorySet) -> Self {
        Self { gateway, repos, sample_matches_on_empty_catalog: false }
    }

    /// Fabricated sample matches instead of an empty result when the catalog is empty.
    pub fn with_sample_matches(mut self, enabled: bool) -> Self {
        self.sample_matches_on_empty_catalog = enabled;
        self
    }

    async fn requirements(
        &self,
        ctx: &StepContext,
        rfp: &Rfp,
    ) -> Result<(Vec<Requirement>, Option<AnalysisSource>), StepError> {
        let existing = self.repos.requirements.list_for_rfp(&rfp.id).await?;
        if !existing.is_empty() {
            return Ok((existing, None));
        }

        let (requirements, source) = match self.extract_with_model(ctx, rfp).await {
            Ok(requirements) if !requirements.is_empty() => (requirements, AnalysisSource::Model),
            Ok(_) => (heuristic_requirements(rfp), AnalysisSource::Heuristic),
            Err(reason) => {
                warn!(
                    event_name = "agent.technical.extraction_fallback",
                    correlation_id = %ctx.workflow_run_id,
                    reason = %reason,
                    "requirement extraction unusable; using keyword extraction"
                );
                (heuristic_requirements(rfp), AnalysisSource::Heuristic)
            }
        };

        info!(
            event_name = "agent.technical.requirements_extracted",
            correlation_id = %ctx.workflow_run_id,
            count = requirements.len(),
            source = source.as_str(),
            "requirements extracted"
        );
        if !requirements.is_empty() {
            self.repos.requirements.save_all(&rfp.id, requirements.clone()).await?;
        }
        Ok((requirements, Some(source)))
    }

    async fn extract_with_model(
        &self,
        ctx: &StepContext,
        rfp: &Rfp,
    ) -> Result<Vec<Requirement>, String> {
        let prompt = format!(
            "Extract every requirement from this RFP.\n\nTitle: {}\nClient: {}\n\nDocument:\n{}\n\n\
             Return JSON: {{\"requirements\": [{{\"category\": string, \"section\": string|null, \
             \"text\": string, \"mandatory\": bool, \"quantity\": number|null, \"unit\": string|null}}]}}",
            rfp.title,
            rfp.client_name,
            rfp.excerpt(EXCERPT_CHARS)
        );
        let request = ModelRequest::new(prompt, "requirement_extraction", TaskComplexity::High)
            .with_system_prompt(SYSTEM_PROMPT)
            .with_temperature(0.0)
            .for_activity(ctx.workflow_run_id.clone(), ctx.activity_id.clone());

        let text = self.gateway.execute(request).await.map_err(|error| error.to_string())?;
        let reply: ExtractionReply = parse_model_json(&text).map_err(|error| error.to_string())?;

        Ok(reply
            .requirements
            .into_iter()
            .filter(|requirement| !requirement.text.trim().is_empty())
            .enumerate()
            .map(|(index, extracted)| Requirement {
                id: requirement_id(rfp, index),
                rfp_id: rfp.id.clone(),
                category: extracted
                    .category
                    .map(|category| category.trim().to_ascii_lowercase())
                    .filter(|category| !category.is_empty())
                    .unwrap_or_else(|| "technical".to_string()),
                section: extracted.section.filter(|section| !section.trim().is_empty()),
                text: extracted.text.trim().to_string(),
                mandatory: extracted.mandatory,
                quantity: extracted
                    .quantity
                    .filter(|quantity| quantity.is_finite() && *quantity >= 1.0)
                    .map(|quantity| validate_number(Some(quantity), 1.0, f64::from(u32::MAX), 1.0) as u32),
                unit: extracted.unit.filter(|unit| !unit.trim().is_empty()),
            })
            .collect())
    }

    async fn match_with_model(
        &self,
        ctx: &StepContext,
        requirements: &[Requirement],
        products: &[Product],
    ) -> Result<Matching, String> {
        let mut listing = String::new();
        for requirement in requirements {
            listing.push_str(&format!(
                "- [{}] {} (mandatory: {}, quantity: {} {})\n",
                requirement.id.0,
                requirement.text,
                requirement.mandatory,
                requirement.quantity.map_or("n/a".to_string(), |quantity| quantity.to_string()),
                requirement.unit.as_deref().unwrap_or("")
            ));
        }
        let mut catalog = String::new();
        for product in products {
            let specs = product
                .specifications
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(", ");
            catalog.push_str(&format!(
                "- [{}] {} {} ({}) {specs}\n",
                product.id.0, product.sku, product.name, product.category
            ));
        }

        let prompt = format!(
            "Match these RFP requirements to catalog products.\n\nRequirements:\n{listing}\n\
             Catalog:\n{catalog}\n\
             Return JSON: {{\"matches\": [{{\"requirement_id\": string|null, \"product_id\": string, \
             \"sku\": string, \"match_score\": 0-100, \"rationale\": string, \"gaps\": [string]}}], \
             \"gaps\": [string], \"risks\": [string], \"confidence\": 0-1}}"
        );
        let request = ModelRequest::new(prompt, "sku_matching", TaskComplexity::High)
            .with_system_prompt(SYSTEM_PROMPT)
            .with_temperature(0.1)
            .for_activity(ctx.workflow_run_id.clone(), ctx.activity_id.clone());

        let text = self.gateway.execute(request).await.map_err(|error| error.to_string())?;
        let reply: MatchingReply = parse_model_json(&text).map_err(|error| error.to_string())?;
        validate_matching(reply, requirements, products).map_err(|error| error.to_string())
    }
}

fn requirement_id(rfp: &Rfp, index: usize) -> RequirementId {
    RequirementId(format!("{}-req-{:03}", rfp.id.0, index + 1))
}

/// Drops matches to unknown products and clamps every score.
fn validate_matching(
    reply: MatchingReply,
    requirements: &[Requirement],
    products: &[Product],
) -> Result<Matching, ParseError> {
    let by_id: HashMap<&str, &Product> =
        products.iter().map(|product| (product.id.0.as_str(), product)).collect();
    let by_sku: HashMap<&str, &Product> =
        products.iter().map(|product| (product.sku.as_str(), product)).collect();
    let known_requirements: BTreeSet<&str> =
        requirements.iter().map(|requirement| requirement.id.0.as_str()).collect();

    let mut matches: Vec<SkuMatch> = reply
        .matches
        .into_iter()
        .filter_map(|candidate| {
            let product = candidate
                .product_id
                .as_deref()
                .and_then(|id| by_id.get(id.trim()))
                .or_else(|| candidate.sku.as_deref().and_then(|sku| by_sku.get(sku.trim())))?;
            let requirement_id = candidate
                .requirement_id
                .filter(|id| known_requirements.contains(id.trim()))
                .map(|id| RequirementId(id.trim().to_string()));
            Some(SkuMatch {
                requirement_id,
                product_id: product.id.clone(),
                sku: product.sku.clone(),
                product_name: product.name.clone(),
                match_score: validate_number(candidate.match_score, 0.0, 100.0, 0.0),
                rationale: candidate.rationale.trim().to_string(),
                gaps: clean_list(candidate.gaps),
            })
        })
        .collect();

    if matches.is_empty() {
        return Err(ParseError::Malformed("no matches referenced catalog products".to_string()));
    }
    rank(&mut matches);

    Ok(Matching {
        matches,
        gaps: clean_list(reply.gaps),
        risks: clean_list(reply.risks),
        confidence: validate_number(reply.confidence, 0.0, 1.0, 0.0),
        source: AnalysisSource::Model,
    })
}

fn rank(matches: &mut Vec<SkuMatch>) {
    matches.sort_by(|left, right| {
        right.match_score.total_cmp(&left.match_score).then_with(|| left.sku.cmp(&right.sku))
    });
    matches.truncate(MAX_MATCHES);
}

fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|character: char| !character.is_ascii_alphanumeric())
        .map(str::to_ascii_lowercase)
        .filter(|word| word.len() >= 3 && !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

/// Sentences carrying requirement language, with quantity and unit when one is stated.
pub fn heuristic_requirements(rfp: &Rfp) -> Vec<Requirement> {
    rfp.document_text
        .split(|character| matches!(character, '.' | ';' | '\n'))
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .filter_map(|sentence| {
            let lowered = sentence.to_ascii_lowercase();
            let words: Vec<&str> = lowered.split_whitespace().collect();
            let has = |markers: &[&str]| {
                words.iter().any(|word| {
                    markers.contains(&word.trim_matches(|c: char| !c.is_ascii_alphanumeric()))
                })
            };
            let mandatory = has(&MANDATORY_MARKERS);
            if !mandatory && !has(&OPTIONAL_MARKERS) {
                return None;
            }
            let (quantity, unit) = quantity_and_unit(&words);
            Some((sentence.to_string(), mandatory, quantity, unit, category_for(&lowered)))
        })
        .enumerate()
        .map(|(index, (text, mandatory, quantity, unit, category))| Requirement {
            id: requirement_id(rfp, index),
            rfp_id: rfp.id.clone(),
            category: category.to_string(),
            section: None,
            text,
            mandatory,
            quantity,
            unit,
        })
        .collect()
}

fn quantity_and_unit(words: &[&str]) -> (Option<u32>, Option<String>) {
    for pair in words.windows(2) {
        let Ok(quantity) = pair[0].parse::<u32>() else {
            continue;
        };
        let unit = pair[1].trim_matches(|c: char| !c.is_ascii_alphabetic());
        if quantity > 0 && !unit.is_empty() && !DURATION_UNITS.contains(&unit) {
            return (Some(quantity), Some(unit.to_string()));
        }
    }
    (None, None)
}

fn category_for(sentence: &str) -> &'static str {
    if sentence.contains("certif") || sentence.contains("comply") || sentence.contains("standard") {
        "compliance"
    } else if sentence.contains("deliver") || sentence.contains("install") || sentence.contains("support") {
        "service"
    } else {
        "technical"
    }
}

/// Keyword overlap over the first few active products.
fn heuristic_matching(rfp: &Rfp, requirements: &[Requirement], products: &[Product]) -> Matching {
    let document_terms = keywords(rfp.excerpt(EXCERPT_CHARS));
    let mut matches: Vec<SkuMatch> = products
        .iter()
        .take(HEURISTIC_PRODUCT_LIMIT)
        .map(|product| {
            let product_terms = keywords(&product.search_text());
            let overlap = |terms: &BTreeSet<String>| {
                if product_terms.is_empty() {
                    return 0.0;
                }
                terms.intersection(&product_terms).count() as f64 / product_terms.len() as f64
            };

            let best = requirements
                .iter()
                .map(|requirement| (requirement, overlap(&keywords(&requirement.text))))
                .max_by(|left, right| left.1.total_cmp(&right.1));
            let (requirement_id, ratio) = match best {
                Some((requirement, ratio)) => (Some(requirement.id.clone()), ratio),
                None => (None, overlap(&document_terms)),
            };

            SkuMatch {
                requirement_id,
                product_id: product.id.clone(),
                sku: product.sku.clone(),
                product_name: product.name.clone(),
                match_score: (validate_number(Some(ratio * 100.0), 0.0, 100.0, 0.0) * 10.0).round() / 10.0,
                rationale: "Keyword overlap between requirement text and catalog entry".to_string(),
                gaps: Vec::new(),
            }
        })
        .collect();
    rank(&mut matches);

    Matching {
        matches,
        gaps: Vec::new(),
        risks: vec!["Matches derived from keyword overlap; verify manually".to_string()],
        confidence: HEURISTIC_CONFIDENCE,
        source: AnalysisSource::Heuristic,
    }
}

fn sample_matching(requirements: &[Requirement]) -> Matching {
    let requirement_id = requirements.first().map(|requirement| requirement.id.clone());
    let matches = (1..=3)
        .map(|index| SkuMatch {
            requirement_id: requirement_id.clone(),
            product_id: ProductId(format!("sample-product-{index}")),
            sku: format!("SAMPLE-SKU-{index}"),
            product_name: format!("Sample product {index}"),
            match_score: 80.0 - 10.0 * f64::from(index),
            rationale: "Sample match; catalog is empty".to_string(),
            gaps: Vec::new(),
        })
        .collect();

    Matching {
        matches,
        gaps: vec!["Product catalog is empty".to_string()],
        risks: vec!["Sample matches are not real catalog products".to_string()],
        confidence: SAMPLE_CONFIDENCE,
        source: AnalysisSource::Sample,
    }
}

fn empty_catalog_matching() -> Matching {
    Matching {
        matches: Vec::new(),
        gaps: vec!["Product catalog has no active products".to_string()],
        risks: Vec::new(),
        confidence: 0.0,
        source: AnalysisSource::Heuristic,
    }
}

#[async_trait]
impl PipelineStep for TechnicalAgent {
    type Input = Rfp;
    type Output = TechnicalAnalysis;

    fn agent_type(&self) -> AgentType {
        AgentType::TechnicalSpecialist
    }

    fn step_number(&self) -> u32 {
        2
    }

    fn name(&self) -> &'static str {
        "Technical Agent"
    }

    async fn run(&self, ctx: &StepContext, rfp: &Rfp) -> Result<TechnicalAnalysis, StepError> {
        let (requirements, extraction_source) = self.requirements(ctx, rfp).await?;
        let products = self.repos.products.list_active().await?;

        let matching = if products.is_empty() {
            warn!(
                event_name = "agent.technical.empty_catalog",
                correlation_id = %ctx.workflow_run_id,
                sample_matches = self.sample_matches_on_empty_catalog,
                "no active products to match against"
            );
            if self.sample_matches_on_empty_catalog {
                sample_matching(&requirements)
            } else {
                empty_catalog_matching()
            }
        } else {
            match self.match_with_model(ctx, &requirements, &products).await {
                Ok(matching) if matching.confidence >= MIN_MATCH_CONFIDENCE => matching,
                Ok(matching) => {
                    warn!(
                        event_name = "agent.technical.low_confidence",
                        correlation_id = %ctx.workflow_run_id,
                        confidence = matching.confidence,
                        "model matching below confidence threshold; using keyword matching"
                    );
                    heuristic_matching(rfp, &requirements, &products)
                }
                Err(reason) => {
                    warn!(
                        event_name = "agent.technical.matching_fallback",
                        correlation_id = %ctx.workflow_run_id,
                        reason = %reason,
                        "model matching unusable; using keyword matching"
                    );
                    heuristic_matching(rfp, &requirements, &products)
                }
            }
        };

        let analysis = TechnicalAnalysis {
            workflow_run_id: ctx.workflow_run_id.clone(),
            rfp_id: rfp.id.clone(),
            requirements_analyzed: u32::try_from(requirements.len()).unwrap_or(u32::MAX),
            top_matches: matching.matches,
            gaps: matching.gaps,
            risks: matching.risks,
            confidence: matching.confidence,
            extraction_source,
            source: matching.source,
        };
        self.repos.analyses.save_technical(analysis.clone()).await?;
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rfpflow_core::audit::InMemoryAuditSink;
    use rfpflow_core::domain::analysis::AnalysisSource;
    use rfpflow_core::domain::rfp::{RequirementId, RfpId};
    use rfpflow_core::domain::workflow::{AgentActivityId, WorkflowRunId};
    use rfpflow_db::{DemoSeed, RepositorySet};

    use super::{heuristic_requirements, TechnicalAgent};
    use crate::gateway::ModelGateway;
    use crate::runtime::{PipelineStep, StepContext};
    use crate::test_support::ScriptedLlmClient;

    fn ctx() -> StepContext {
        StepContext {
            rfp_id: RfpId("rfp-demo-001".to_string()),
            workflow_run_id: WorkflowRunId("run-1".to_string()),
            step_number: 2,
            activity_id: AgentActivityId("act-2".to_string()),
            attempt: 0,
        }
    }

    fn agent(repos: &RepositorySet, primary: ScriptedLlmClient) -> TechnicalAgent {
        let gateway = ModelGateway::new(
            Arc::new(primary),
            Arc::new(ScriptedLlmClient::new("economy")),
            repos.decisions.clone(),
            Arc::new(InMemoryAuditSink::default()),
        );
        TechnicalAgent::new(gateway, repos.clone())
    }

    #[test]
    fn keyword_extraction_finds_quantities_and_mandatory_language() {
        let requirements = heuristic_requirements(&DemoSeed::rfp());

        let cable = requirements
            .iter()
            .find(|requirement| requirement.text.contains("10 drums"))
            .expect("cable requirement");
        assert!(cable.mandatory);
        assert_eq!(cable.quantity, Some(10));
        assert_eq!(cable.unit.as_deref(), Some("drums"));

        let delivery = requirements
            .iter()
            .find(|requirement| requirement.text.contains("8 weeks"))
            .expect("delivery requirement");
        assert_eq!(delivery.quantity, None);

        let optional = requirements
            .iter()
            .find(|requirement| requirement.text.starts_with("Optional"))
            .expect("optional requirement");
        assert!(!optional.mandatory);
    }

    #[tokio::test]
    async fn model_matches_are_validated_against_the_catalog() {
        let repos = RepositorySet::in_memory();
        DemoSeed::load(&repos).await.expect("seed");
        let reply = r#"{"matches":[
            {"requirement_id":"req-demo-001","product_id":"prod-cbl-11kv-al","sku":"CBL-11KV-XLPE-AL","match_score":60,"rationale":"aluminium alternative"},
            {"requirement_id":"req-demo-001","product_id":"prod-cbl-11kv-cu","sku":"CBL-11KV-XLPE-CU","match_score":140,"rationale":"exact"},
            {"requirement_id":"req-unknown","product_id":"prod-ghost","sku":"GHOST-1","match_score":99}
        ],"gaps":[],"risks":["lead time"],"confidence":0.9}"#;
        let agent = agent(&repos, ScriptedLlmClient::new("primary").respond(reply));

        let analysis = agent.run(&ctx(), &DemoSeed::rfp()).await.expect("run");

        assert_eq!(analysis.source, AnalysisSource::Model);
        assert_eq!(analysis.extraction_source, None);
        let skus: Vec<_> = analysis.top_matches.iter().map(|m| m.sku.as_str()).collect();
        assert_eq!(skus, vec!["CBL-11KV-XLPE-CU", "CBL-11KV-XLPE-AL"]);
        assert_eq!(analysis.top_matches[0].match_score, 100.0);
        assert_eq!(
            analysis.top_matches[0].requirement_id,
            Some(RequirementId("req-demo-001".to_string()))
        );
        let stored = repos.analyses.find_technical(&ctx().workflow_run_id).await.expect("find");
        assert_eq!(stored, Some(analysis));
    }

    #[tokio::test]
    async fn low_confidence_falls_back_to_keyword_matching() {
        let repos = RepositorySet::in_memory();
        DemoSeed::load(&repos).await.expect("seed");
        let reply = r#"{"matches":[{"product_id":"prod-joint-kit","match_score":90}],"confidence":0.1}"#;
        let agent = agent(&repos, ScriptedLlmClient::new("primary").respond(reply));

        let analysis = agent.run(&ctx(), &DemoSeed::rfp()).await.expect("run");

        assert_eq!(analysis.source, AnalysisSource::Heuristic);
        assert_eq!(analysis.top_matches.len(), 3);
        assert_eq!(analysis.top_matches[0].sku, "CBL-11KV-XLPE-CU");
        assert!(analysis.confidence < super::MIN_MATCH_CONFIDENCE);
    }

    #[tokio::test]
    async fn missing_requirements_are_extracted_and_persisted() {
        let repos = RepositorySet::in_memory();
        for product in DemoSeed::products() {
            repos.products.save(product).await.expect("product");
        }
        repos.rfps.save(DemoSeed::rfp()).await.expect("rfp");
        let extraction = r#"{"requirements":[{"category":"Technical","text":"11kV XLPE copper cable","mandatory":true,"quantity":10,"unit":"drums"}]}"#;
        let agent = agent(
            &repos,
            ScriptedLlmClient::new("primary").respond(extraction).respond("not json"),
        );

        let analysis = agent.run(&ctx(), &DemoSeed::rfp()).await.expect("run");

        assert_eq!(analysis.extraction_source, Some(AnalysisSource::Model));
        assert_eq!(analysis.requirements_analyzed, 1);
        let stored = repos
            .requirements
            .list_for_rfp(&RfpId("rfp-demo-001".to_string()))
            .await
            .expect("requirements");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].category, "technical");
        assert_eq!(stored[0].quantity, Some(10));
        assert_eq!(analysis.top_matches[0].requirement_id, Some(stored[0].id.clone()));
    }

    #[tokio::test]
    async fn empty_catalog_yields_no_matches_unless_samples_are_enabled() {
        let repos = RepositorySet::in_memory();
        repos.rfps.save(DemoSeed::rfp()).await.expect("rfp");
        let rfp_id = RfpId("rfp-demo-001".to_string());
        repos.requirements.save_all(&rfp_id, DemoSeed::requirements(&rfp_id)).await.expect("reqs");

        let strict = agent(&repos, ScriptedLlmClient::new("primary"));
        let analysis = strict.run(&ctx(), &DemoSeed::rfp()).await.expect("run");
        assert!(!analysis.has_viable_matches());

        let lenient = agent(&repos, ScriptedLlmClient::new("primary")).with_sample_matches(true);
        let analysis = lenient.run(&ctx(), &DemoSeed::rfp()).await.expect("run");
        assert_eq!(analysis.source, AnalysisSource::Sample);
        assert_eq!(analysis.top_matches.len(), 3);
    }
}
