use serde::{Deserialize, Serialize};

use crate::constants::{CAUTION_PROFIT_SHARE, LOSS_PROFIT_SHARE, SAFE_PROFIT_SHARE};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingInput {
    pub cost: f64,
    pub target_margin_percent: f64,
    #[serde(default)]
    pub tax_percent: f64,
    #[serde(default)]
    pub marketplace_fee_percent: f64,
    #[serde(default)]
    pub shipping_cost: f64,
    #[serde(default)]
    pub include_shipping_in_price: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub cost_component: f64,
    pub tax_component: f64,
    pub fee_component: f64,
    pub shipping_component: f64,
    pub margin_component: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingResult {
    pub selling_price: f64,
    pub profit: f64,
    /// Profit as a share of the selling price.
    pub margin_percent: f64,
    /// Profit as a share of the cost base (cost plus included shipping).
    pub markup_percent: f64,
    pub breakdown: PriceBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscountInput {
    pub selling_price: f64,
    pub cost_price: f64,
    #[serde(default)]
    pub marketplace_fee_percent: f64,
    #[serde(default)]
    pub tax_percent: f64,
    #[serde(default)]
    pub shipping_cost: f64,
    #[serde(default)]
    pub additional_costs: f64,
}

/// How much of the current profit a discount consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountBand {
    /// Less than 30% of the profit.
    Safe,
    /// 30% up to (excluding) 70%.
    Caution,
    /// 70% up to (excluding) 100%.
    Danger,
    /// The whole profit or more; the discounted price is at or below break-even.
    Loss,
}

impl DiscountBand {
    /// Lower bounds are inclusive, upper bounds exclusive.
    pub fn from_profit_share(share: f64) -> Self {
        if !share.is_finite() || share >= LOSS_PROFIT_SHARE {
            DiscountBand::Loss
        } else if share >= CAUTION_PROFIT_SHARE {
            DiscountBand::Danger
        } else if share >= SAFE_PROFIT_SHARE {
            DiscountBand::Caution
        } else {
            DiscountBand::Safe
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DiscountBand::Safe => "safe",
            DiscountBand::Caution => "caution",
            DiscountBand::Danger => "danger",
            DiscountBand::Loss => "loss",
        }
    }
}

impl std::fmt::Display for DiscountBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscountScenario {
    pub discount_percent: f64,
    pub final_price: f64,
    pub profit_per_unit: f64,
    /// `None` when the discounted price is zero.
    pub margin_percent: Option<f64>,
    pub revenue_change_percent: f64,
    /// Extra volume needed to keep revenue constant. `None` at a 100% discount.
    pub volume_increase_needed_percent: Option<f64>,
    /// Extra volume needed to keep total profit constant. `None` when the
    /// discounted unit no longer makes a profit.
    pub volume_increase_for_same_profit_percent: Option<f64>,
    pub band: DiscountBand,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscountResult {
    pub current_profit: f64,
    pub current_margin_percent: f64,
    /// Discount at which profit reaches zero. Non-positive when the product
    /// already sells at or below break-even.
    pub break_even_discount_percent: f64,
    pub max_discount_percent: f64,
    pub safe_discount_percent: f64,
    pub caution_discount_percent: f64,
}
