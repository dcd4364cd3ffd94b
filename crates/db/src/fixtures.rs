use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use rfpflow_core::domain::product::{PricingTier, Product, ProductId};
use rfpflow_core::domain::rfp::{Requirement, RequirementId, Rfp, RfpId, RfpStatus};

use crate::repositories::{RepositoryError, RepositorySet};

pub const DEMO_RFP_ID: &str = "rfp-demo-001";

const DEMO_DOCUMENT: &str = "Northgrid Utilities invites bids for the supply of medium-voltage \
cabling for the Eastfield substation upgrade. The supplier must deliver 10 drums of 11kV XLPE \
armoured copper cable. All cable shall comply with IEC 60502-2 and be delivered within 8 weeks \
of award. Factory test certificates are required for every drum. Optional: on-site jointing \
support during commissioning.";

/// Demo catalog and RFP for exercising a full workflow locally.
pub struct DemoSeed;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub rfp_id: RfpId,
    pub products_seeded: usize,
    pub requirements_seeded: usize,
}

impl DemoSeed {
    /// Loads the dataset; safe to run more than once.
    pub async fn load(repos: &RepositorySet) -> Result<SeedResult, RepositoryError> {
        let products = Self::products();
        let products_seeded = products.len();
        for product in products {
            repos.products.save(product).await?;
        }

        let rfp = Self::rfp();
        let rfp_id = rfp.id.clone();
        repos.rfps.save(rfp).await?;

        let requirements = Self::requirements(&rfp_id);
        let requirements_seeded = requirements.len();
        repos.requirements.save_all(&rfp_id, requirements).await?;

        Ok(SeedResult { rfp_id, products_seeded, requirements_seeded })
    }

    pub fn rfp() -> Rfp {
        Rfp {
            id: RfpId(DEMO_RFP_ID.to_string()),
            title: "Eastfield substation MV cabling".to_string(),
            client_name: "Northgrid Utilities".to_string(),
            status: RfpStatus::New,
            deadline: Some(Utc::now() + Duration::days(21)),
            estimated_value: Some(Decimal::new(3_000, 0)),
            document_text: DEMO_DOCUMENT.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn requirements(rfp_id: &RfpId) -> Vec<Requirement> {
        vec![Requirement {
            id: RequirementId("req-demo-001".to_string()),
            rfp_id: rfp_id.clone(),
            category: "technical".to_string(),
            section: Some("2.1 Cable supply".to_string()),
            text: "11kV XLPE armoured copper cable, IEC 60502-2".to_string(),
            mandatory: true,
            quantity: Some(10),
            unit: Some("drums".to_string()),
        }]
    }

    pub fn products() -> Vec<Product> {
        vec![
            Product {
                id: ProductId("prod-cbl-11kv-cu".to_string()),
                sku: "CBL-11KV-XLPE-CU".to_string(),
                name: "11kV XLPE armoured copper cable".to_string(),
                category: "cable".to_string(),
                specifications: BTreeMap::from([
                    ("conductor".to_string(), "copper".to_string()),
                    ("insulation".to_string(), "XLPE".to_string()),
                    ("standard".to_string(), "IEC 60502-2".to_string()),
                    ("voltage".to_string(), "11kV".to_string()),
                ]),
                base_price: Decimal::new(260, 0),
                active: true,
                pricing_tiers: vec![
                    PricingTier {
                        min_quantity: 10,
                        max_quantity: Some(49),
                        unit_price: Decimal::new(245, 0),
                    },
                    PricingTier {
                        min_quantity: 50,
                        max_quantity: Some(99),
                        unit_price: Decimal::new(2205, 1),
                    },
                    PricingTier {
                        min_quantity: 100,
                        max_quantity: None,
                        unit_price: Decimal::new(196, 0),
                    },
                ],
            },
            Product {
                id: ProductId("prod-cbl-11kv-al".to_string()),
                sku: "CBL-11KV-XLPE-AL".to_string(),
                name: "11kV XLPE armoured aluminium cable".to_string(),
                category: "cable".to_string(),
                specifications: BTreeMap::from([
                    ("conductor".to_string(), "aluminium".to_string()),
                    ("insulation".to_string(), "XLPE".to_string()),
                    ("voltage".to_string(), "11kV".to_string()),
                ]),
                base_price: Decimal::new(190, 0),
                active: true,
                pricing_tiers: vec![PricingTier {
                    min_quantity: 20,
                    max_quantity: None,
                    unit_price: Decimal::new(175, 0),
                }],
            },
            Product {
                id: ProductId("prod-joint-kit".to_string()),
                sku: "JNT-11KV-HS".to_string(),
                name: "11kV heat-shrink joint kit".to_string(),
                category: "accessory".to_string(),
                specifications: BTreeMap::from([("voltage".to_string(), "11kV".to_string())]),
                base_price: Decimal::new(85, 0),
                active: true,
                pricing_tiers: Vec::new(),
            },
        ]
    }
}
