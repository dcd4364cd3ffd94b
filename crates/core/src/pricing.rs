//! Deterministic bid pricing: tiered unit prices, cost roll-up and competitiveness.
//!
//! The model may estimate ancillary costs, but product cost, totals and the
//! competitiveness band are always computed here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::analysis::Competitiveness;
use crate::domain::product::{PricingTier, Product};

/// Flat contingency applied when no cost estimate is available.
pub const FALLBACK_CONTINGENCY_PCT: Decimal = Decimal::from_parts(10, 0, 0, false, 0);
const HIGH_COMPETITIVENESS_PCT: Decimal = Decimal::from_parts(15, 0, 0, false, 0);
const MEDIUM_COMPETITIVENESS_PCT: Decimal = Decimal::from_parts(8, 0, 0, false, 0);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    pub unit_price: Decimal,
    pub tier_applied: bool,
}

/// Picks the covering tier with the highest `min_quantity`, else the base price.
pub fn resolve_unit_price(product: &Product, quantity: u32) -> ResolvedPrice {
    match select_tier(&product.pricing_tiers, quantity) {
        Some(tier) => ResolvedPrice { unit_price: tier.unit_price, tier_applied: true },
        None => ResolvedPrice { unit_price: product.base_price, tier_applied: false },
    }
}

pub fn select_tier(tiers: &[PricingTier], quantity: u32) -> Option<&PricingTier> {
    tiers.iter().filter(|tier| tier.covers(quantity)).max_by_key(|tier| tier.min_quantity)
}

pub fn line_total(unit_price: Decimal, quantity: u32) -> Decimal {
    round_money(unit_price * Decimal::from(quantity))
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub testing: Decimal,
    pub logistics: Decimal,
    pub compliance: Decimal,
    pub contingency: Decimal,
}

impl CostBreakdown {
    pub fn flat_contingency(products_cost: Decimal) -> Self {
        Self {
            contingency: round_money(products_cost * FALLBACK_CONTINGENCY_PCT / Decimal::ONE_HUNDRED),
            ..Self::default()
        }
    }

    pub fn ancillary_total(&self) -> Decimal {
        self.testing + self.logistics + self.compliance + self.contingency
    }
}

pub fn total_bid_price(products_cost: Decimal, breakdown: &CostBreakdown) -> Decimal {
    round_money(products_cost + breakdown.ancillary_total())
}

/// Contingency share of the total bid: > 15% high, > 8% medium, otherwise low.
pub fn competitiveness(contingency: Decimal, total_bid_price: Decimal) -> Competitiveness {
    if total_bid_price <= Decimal::ZERO {
        return Competitiveness::Low;
    }

    let share_pct = contingency / total_bid_price * Decimal::ONE_HUNDRED;
    if share_pct > HIGH_COMPETITIVENESS_PCT {
        Competitiveness::High
    } else if share_pct > MEDIUM_COMPETITIVENESS_PCT {
        Competitiveness::Medium
    } else {
        Competitiveness::Low
    }
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}
