//! Discount safety analysis.
//!
//! Marketplace fee and tax are charged on the discounted price, so profit
//! falls linearly with the discount:
//! `profit(d) = P * (1 - d) * (1 - fee - tax) - fixed_costs`.

use crate::constants::{CAUTION_PROFIT_SHARE, SAFE_PROFIT_SHARE, STANDARD_DISCOUNTS};
use crate::error::PricingError;
use crate::model::Percent;
use crate::pricing::types::{DiscountBand, DiscountInput, DiscountResult, DiscountScenario};

impl DiscountInput {
    pub fn validate(&self) -> Result<(), PricingError> {
        if !self.selling_price.is_finite() || self.selling_price <= 0.0 {
            return Err(PricingError::InvalidInput(format!(
                "Selling price {} must be positive.",
                self.selling_price
            )));
        }
        for (name, value) in [
            ("cost_price", self.cost_price),
            ("shipping_cost", self.shipping_cost),
            ("additional_costs", self.additional_costs),
            ("marketplace_fee_percent", self.marketplace_fee_percent),
            ("tax_percent", self.tax_percent),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PricingError::InvalidInput(format!(
                    "{} {} must be a non-negative number.",
                    name, value
                )));
            }
        }
        let charged = self.marketplace_fee_percent + self.tax_percent;
        if charged >= 100.0 {
            return Err(PricingError::InvalidMarginConfiguration {
                total_percent: charged,
            });
        }
        Ok(())
    }

    /// Costs that do not scale with the price.
    pub fn fixed_costs(&self) -> f64 {
        self.cost_price + self.shipping_cost + self.additional_costs
    }

    /// Share of each unit of price left after fee and tax.
    fn net_rate(&self) -> f64 {
        1.0 - Percent::new(self.marketplace_fee_percent).fraction()
            - Percent::new(self.tax_percent).fraction()
    }

    fn profit_at_price(&self, price: f64) -> f64 {
        price * self.net_rate() - self.fixed_costs()
    }
}

#[derive(Debug, Clone)]
pub struct DiscountAnalyzer {
    input: DiscountInput,
    result: DiscountResult,
}

impl DiscountAnalyzer {
    pub fn new(input: DiscountInput) -> Result<Self, PricingError> {
        input.validate()?;

        let price = input.selling_price;
        let current_profit = input.profit_at_price(price);
        let break_even = (1.0 - input.fixed_costs() / (price * input.net_rate())) * 100.0;
        let max_discount = break_even.max(0.0);

        let result = DiscountResult {
            current_profit,
            current_margin_percent: current_profit / price * 100.0,
            break_even_discount_percent: break_even,
            max_discount_percent: max_discount,
            safe_discount_percent: max_discount * SAFE_PROFIT_SHARE,
            caution_discount_percent: max_discount * CAUTION_PROFIT_SHARE,
        };

        Ok(Self { input, result })
    }

    pub fn input(&self) -> &DiscountInput {
        &self.input
    }

    pub fn result(&self) -> &DiscountResult {
        &self.result
    }

    /// A discount equal to the break-even discount is `Loss`. When the
    /// product already sells without profit every discount is `Loss`.
    pub fn classify(&self, discount_percent: f64) -> DiscountBand {
        let break_even = self.result.break_even_discount_percent;
        if break_even <= 0.0 || !discount_percent.is_finite() {
            return DiscountBand::Loss;
        }
        DiscountBand::from_profit_share(discount_percent / break_even)
    }

    pub fn simulate_scenario(&self, discount_percent: f64) -> Result<DiscountScenario, PricingError> {
        if !discount_percent.is_finite() || !(0.0..=100.0).contains(&discount_percent) {
            return Err(PricingError::InvalidDiscount(discount_percent));
        }

        let discount = Percent::new(discount_percent);
        let final_price = discount.markdown(self.input.selling_price);
        let profit = self.input.profit_at_price(final_price);

        let margin_percent = if final_price > 0.0 {
            Some(profit / final_price * 100.0)
        } else {
            None
        };

        let volume_increase_needed_percent = if discount.fraction() < 1.0 {
            Some((1.0 / (1.0 - discount.fraction()) - 1.0) * 100.0)
        } else {
            None
        };

        let current_profit = self.result.current_profit;
        let volume_increase_for_same_profit_percent = if profit > 0.0 && current_profit > 0.0 {
            Some((current_profit / profit - 1.0) * 100.0)
        } else {
            None
        };

        Ok(DiscountScenario {
            discount_percent,
            final_price,
            profit_per_unit: profit,
            margin_percent,
            revenue_change_percent: -discount_percent,
            volume_increase_needed_percent,
            volume_increase_for_same_profit_percent,
            band: self.classify(discount_percent),
        })
    }

    /// Scenarios for the discounts merchants reach for most often.
    pub fn standard_scenarios(&self) -> Vec<DiscountScenario> {
        STANDARD_DISCOUNTS
            .iter()
            .filter_map(|pct| self.simulate_scenario(*pct).ok())
            .collect()
    }
}

/// One-shot analysis of `input`.
pub fn analyze_discount(input: &DiscountInput) -> Result<DiscountResult, PricingError> {
    DiscountAnalyzer::new(*input).map(|a| a.result)
}
