//! Inverse-margin pricing engine.
//!
//! Given a cost and the share of the selling price that must go to margin,
//! taxes and marketplace fees, the selling price is `base_cost / divisor`
//! where `divisor = 1 - margin - tax - fee`.

pub mod batch;
pub mod discount;
pub mod types;

use crate::constants::DIVISOR_EPSILON;
use crate::error::PricingError;
use crate::model::Percent;

pub use discount::{analyze_discount, DiscountAnalyzer};
pub use types::{
    DiscountBand, DiscountInput, DiscountResult, DiscountScenario, PriceBreakdown, PricingInput,
    PricingResult,
};

impl PricingInput {
    pub fn validate(&self) -> Result<(), PricingError> {
        if !self.cost.is_finite() || self.cost <= 0.0 {
            return Err(PricingError::InvalidInput(format!(
                "Cost {} must be positive.",
                self.cost
            )));
        }
        for (name, value) in [
            ("target_margin_percent", self.target_margin_percent),
            ("tax_percent", self.tax_percent),
            ("marketplace_fee_percent", self.marketplace_fee_percent),
        ] {
            if !Percent::new(value).is_valid_rate() {
                return Err(PricingError::InvalidInput(format!(
                    "{} {} must be a non-negative number.",
                    name, value
                )));
            }
        }
        if !self.shipping_cost.is_finite() || self.shipping_cost < 0.0 {
            return Err(PricingError::InvalidInput(format!(
                "Shipping cost {} must not be negative.",
                self.shipping_cost
            )));
        }
        if self.divisor() <= DIVISOR_EPSILON {
            return Err(PricingError::InvalidMarginConfiguration {
                total_percent: self.total_percent(),
            });
        }
        Ok(())
    }

    /// Margin + tax + fee, in percent.
    pub fn total_percent(&self) -> f64 {
        self.target_margin_percent + self.tax_percent + self.marketplace_fee_percent
    }

    pub fn divisor(&self) -> f64 {
        1.0 - Percent::new(self.target_margin_percent).fraction()
            - Percent::new(self.tax_percent).fraction()
            - Percent::new(self.marketplace_fee_percent).fraction()
    }

    /// Cost plus shipping when shipping is passed on to the buyer.
    pub fn base_cost(&self) -> f64 {
        self.cost + self.included_shipping()
    }

    fn included_shipping(&self) -> f64 {
        if self.include_shipping_in_price {
            self.shipping_cost
        } else {
            0.0
        }
    }
}

/// Computes the selling price that yields the target margin after tax and
/// marketplace fee, both charged on the selling price.
pub fn compute_selling_price(input: &PricingInput) -> Result<PricingResult, PricingError> {
    input.validate()?;

    let base_cost = input.base_cost();
    let selling_price = base_cost / input.divisor();
    Ok(price_breakdown(selling_price, input))
}

/// Breaks a given selling price down into its components for `input`'s
/// cost, tax and fee.
pub fn price_breakdown(selling_price: f64, input: &PricingInput) -> PricingResult {
    let base_cost = input.base_cost();
    let tax_component = Percent::new(input.tax_percent).of(selling_price);
    let fee_component = Percent::new(input.marketplace_fee_percent).of(selling_price);
    let profit = selling_price - base_cost - tax_component - fee_component;

    let margin_percent = if selling_price > 0.0 {
        profit / selling_price * 100.0
    } else {
        0.0
    };
    let markup_percent = if base_cost > 0.0 {
        profit / base_cost * 100.0
    } else {
        0.0
    };

    PricingResult {
        selling_price,
        profit,
        margin_percent,
        markup_percent,
        breakdown: PriceBreakdown {
            cost_component: input.cost,
            tax_component,
            fee_component,
            shipping_component: input.included_shipping(),
            margin_component: profit,
        },
    }
}

/// Margin (in percent of the price) actually achieved when selling at
/// `selling_price`. The target margin of `input` is ignored.
pub fn margin_for_price(selling_price: f64, input: &PricingInput) -> Result<f64, PricingError> {
    if !selling_price.is_finite() || selling_price <= 0.0 {
        return Err(PricingError::InvalidInput(format!(
            "Selling price {} must be positive.",
            selling_price
        )));
    }
    Ok(price_breakdown(selling_price, input).margin_percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marketplace_input() -> PricingInput {
        PricingInput {
            cost: 60.0,
            target_margin_percent: 30.0,
            tax_percent: 7.0,
            marketplace_fee_percent: 13.0,
            shipping_cost: 0.0,
            include_shipping_in_price: false,
        }
    }

    #[test]
    fn test_end_to_end_marketplace_price() {
        let result = compute_selling_price(&marketplace_input()).unwrap();

        assert!((result.selling_price - 120.0).abs() < 1e-9);
        assert!((result.breakdown.tax_component - 8.40).abs() < 1e-9);
        assert!((result.breakdown.fee_component - 15.60).abs() < 1e-9);
        assert!((result.profit - 36.0).abs() < 1e-9);
        // 36 is 30% of 120
        assert!((result.margin_percent - 30.0).abs() < 1e-9);
        assert!((result.markup_percent - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_profit_round_trip() {
        let inputs = [
            marketplace_input(),
            PricingInput {
                cost: 12.5,
                target_margin_percent: 15.0,
                tax_percent: 4.0,
                marketplace_fee_percent: 16.0,
                shipping_cost: 8.9,
                include_shipping_in_price: true,
            },
            PricingInput {
                cost: 999.99,
                target_margin_percent: 0.0,
                tax_percent: 0.0,
                marketplace_fee_percent: 0.0,
                shipping_cost: 30.0,
                include_shipping_in_price: false,
            },
        ];

        for input in inputs {
            let result = compute_selling_price(&input).unwrap();
            let price = result.selling_price;
            let recomputed = price
                - input.base_cost()
                - price * input.tax_percent / 100.0
                - price * input.marketplace_fee_percent / 100.0;
            assert!((recomputed - result.profit).abs() < 1e-6);

            let margin = margin_for_price(price, &input).unwrap();
            assert!((margin - input.target_margin_percent).abs() < 1e-6);
        }
    }

    #[test]
    fn test_shipping_included_in_base_cost() {
        let mut input = marketplace_input();
        input.shipping_cost = 10.0;
        input.include_shipping_in_price = true;

        let result = compute_selling_price(&input).unwrap();
        assert!((result.selling_price - 140.0).abs() < 1e-9);
        assert_eq!(result.breakdown.shipping_component, 10.0);

        input.include_shipping_in_price = false;
        let result = compute_selling_price(&input).unwrap();
        assert!((result.selling_price - 120.0).abs() < 1e-9);
        assert_eq!(result.breakdown.shipping_component, 0.0);
    }

    #[test]
    fn test_divisor_exhausted_is_rejected() {
        let mut input = marketplace_input();
        input.target_margin_percent = 80.0;

        let err = compute_selling_price(&input).unwrap_err();
        match err {
            PricingError::InvalidMarginConfiguration { total_percent } => {
                assert!((total_percent - 100.0).abs() < 1e-9)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let mut input = marketplace_input();
        input.cost = 0.0;
        assert!(matches!(
            compute_selling_price(&input),
            Err(PricingError::InvalidInput(_))
        ));

        let mut input = marketplace_input();
        input.tax_percent = -1.0;
        assert!(compute_selling_price(&input).is_err());

        let mut input = marketplace_input();
        input.shipping_cost = f64::NAN;
        assert!(compute_selling_price(&input).is_err());
    }

    #[test]
    fn test_margin_for_price_requires_positive_price() {
        assert!(margin_for_price(0.0, &marketplace_input()).is_err());
        // Selling at cost leaves a negative margin once tax and fee are paid
        let margin = margin_for_price(60.0, &marketplace_input()).unwrap();
        assert!((margin - -20.0).abs() < 1e-9);
    }
}
