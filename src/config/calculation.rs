use serde::{Deserialize, Serialize};

pub use crate::pricing::{DiscountInput, PricingInput};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type")]
pub enum CalculationConfig {
    #[serde(rename = "pricing")]
    Pricing(PricingCalculation),
    #[serde(rename = "discount")]
    Discount(DiscountCalculation),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PricingCalculation {
    pub name: String,
    pub input: PricingInput,
    /// Extra target margins to price side by side.
    #[serde(default)]
    pub scenario_margins: Vec<f64>,
    /// A price already in use; the report shows the margin it achieves.
    #[serde(default)]
    pub reference_price: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DiscountCalculation {
    pub name: String,
    pub input: DiscountInput,
    /// Discounts to simulate. Empty means the standard 5%..30% ladder.
    #[serde(default)]
    pub discounts: Vec<f64>,
}

impl CalculationConfig {
    pub fn type_name(&self) -> &str {
        match self {
            CalculationConfig::Pricing(_) => "Pricing",
            CalculationConfig::Discount(_) => "Discount",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CalculationConfig::Pricing(c) => &c.name,
            CalculationConfig::Discount(c) => &c.name,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name().trim().is_empty() {
            return Err(anyhow::anyhow!("Calculation name must not be empty."));
        }
        match self {
            CalculationConfig::Pricing(c) => c.validate(),
            CalculationConfig::Discount(c) => c.validate(),
        }
    }
}

impl PricingCalculation {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.input.validate()?;

        for margin in &self.scenario_margins {
            if !margin.is_finite() || *margin < 0.0 || *margin >= 100.0 {
                return Err(anyhow::anyhow!(
                    "Scenario margin {} must be in [0, 100).",
                    margin
                ));
            }
        }

        if let Some(price) = self.reference_price {
            if !price.is_finite() || price <= 0.0 {
                return Err(anyhow::anyhow!("Reference price must be positive."));
            }
        }
        Ok(())
    }
}

impl DiscountCalculation {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.input.validate()?;

        for discount in &self.discounts {
            if !discount.is_finite() || *discount < 0.0 || *discount > 100.0 {
                return Err(anyhow::anyhow!(
                    "Discount {} is outside [0, 100].",
                    discount
                ));
            }
        }
        Ok(())
    }
}

pub fn print_calculation_help() {
    println!("Available Calculations:\n");

    println!("1. Pricing (type = 'pricing')");
    println!("   Description: Selling price that reaches a target margin after tax and marketplace fee.");
    println!("   Parameters:");
    println!("     - name (String): Label for the product or calculation.");
    println!("     - input.cost (f64): Unit cost of the product.");
    println!("     - input.target_margin_percent (f64): Desired margin on the selling price.");
    println!("     - input.tax_percent (f64): Tax on the selling price (default 0).");
    println!("     - input.marketplace_fee_percent (f64): Marketplace commission (default 0).");
    println!("     - input.shipping_cost (f64): Shipping cost (default 0).");
    println!("     - input.include_shipping_in_price (bool): Pass shipping on to the buyer (default false).");
    println!("     - scenario_margins (Vec<f64>): Extra margins to compare (optional).");
    println!("     - reference_price (Option<f64>): Current price to evaluate (optional).");
    println!();

    println!("2. Discount (type = 'discount')");
    println!("   Description: How far a price can be discounted before profit runs out.");
    println!("   Parameters:");
    println!("     - name (String): Label for the product or calculation.");
    println!("     - input.selling_price (f64): Current selling price.");
    println!("     - input.cost_price (f64): Unit cost of the product.");
    println!("     - input.marketplace_fee_percent (f64): Marketplace commission (default 0).");
    println!("     - input.tax_percent (f64): Tax on the selling price (default 0).");
    println!("     - input.shipping_cost (f64): Shipping paid by the seller (default 0).");
    println!("     - input.additional_costs (f64): Packaging and other unit costs (default 0).");
    println!(
        "     - discounts (Vec<f64>): Discounts to simulate (optional, default 5-30%)."
    );
    println!();
}
