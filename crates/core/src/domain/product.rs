use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTier {
    pub min_quantity: u32,
    pub max_quantity: Option<u32>,
    pub unit_price: Decimal,
}

impl PricingTier {
    pub fn covers(&self, quantity: u32) -> bool {
        quantity >= self.min_quantity && self.max_quantity.map_or(true, |max| quantity <= max)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub specifications: BTreeMap<String, String>,
    pub base_price: Decimal,
    pub active: bool,
    pub pricing_tiers: Vec<PricingTier>,
}

impl Product {
    /// Flattened searchable text: name, category and specification pairs.
    pub fn search_text(&self) -> String {
        let mut text = format!("{} {} {}", self.sku, self.name, self.category);
        for (key, value) in &self.specifications {
            text.push(' ');
            text.push_str(key);
            text.push(' ');
            text.push_str(value);
        }
        text.to_ascii_lowercase()
    }
}
