use rfpflow_core::config::AppConfig;
use rfpflow_db::{DemoSeed, SeedResult};

use crate::commands::{block_on, open_store, CommandResult};

pub fn run(config: &AppConfig) -> CommandResult {
    block_on("seed", async {
        let (pool, repos) = open_store(config).await?;
        let loaded = DemoSeed::load(&repos).await;
        pool.close().await;

        let seeded = loaded.map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        Ok(CommandResult::success_with_data("seed", summary(&seeded), &SeedSummary::from(&seeded)))
    })
}

#[derive(serde::Serialize)]
struct SeedSummary<'a> {
    rfp_id: &'a str,
    products_seeded: usize,
    requirements_seeded: usize,
}

impl<'a> From<&'a SeedResult> for SeedSummary<'a> {
    fn from(result: &'a SeedResult) -> Self {
        Self {
            rfp_id: &result.rfp_id.0,
            products_seeded: result.products_seeded,
            requirements_seeded: result.requirements_seeded,
        }
    }
}

fn summary(result: &SeedResult) -> String {
    format!(
        "demo dataset loaded: RFP {} with {} requirements against {} catalog products",
        result.rfp_id.0, result.requirements_seeded, result.products_seeded
    )
}

#[cfg(test)]
mod tests {
    use rfpflow_core::domain::rfp::RfpId;
    use rfpflow_db::SeedResult;

    #[test]
    fn summary_names_the_seeded_rfp() {
        let result = SeedResult {
            rfp_id: RfpId("rfp-demo-001".to_string()),
            products_seeded: 4,
            requirements_seeded: 3,
        };

        assert_eq!(
            super::summary(&result),
            "demo dataset loaded: RFP rfp-demo-001 with 3 requirements against 4 catalog products"
        );
    }
}
