use crate::config::calculation::{
    CalculationConfig, DiscountCalculation, DiscountInput, PricingCalculation, PricingInput,
};
use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use std::fs;

pub fn create_config() -> Result<()> {
    let theme = ColorfulTheme::default();

    let calculation_types = vec!["Pricing", "Discount"];
    let selection = Select::with_theme(&theme)
        .with_prompt("Select Calculation Type")
        .default(0)
        .items(&calculation_types)
        .interact()?;

    let config = if selection == 0 {
        create_pricing(&theme)?
    } else {
        create_discount(&theme)?
    };

    config.validate()?;

    let filename: String = Input::with_theme(&theme)
        .with_prompt("Configuration filename")
        .default(generate_default_filename(&config))
        .interact_text()?;

    let toml_string = toml::to_string_pretty(&config)?;

    let path = if filename.ends_with(".toml") {
        filename
    } else {
        format!("{}.toml", filename)
    };

    // Bare filenames go to configs/ when that directory exists
    let final_path = if !path.contains('/') && fs::metadata("configs").is_ok() {
        format!("configs/{}", path)
    } else {
        path
    };

    fs::write(&final_path, toml_string)?;
    println!("Configuration saved to {}", final_path);

    Ok(())
}

fn prompt_percent(theme: &ColorfulTheme, prompt: &str, default: f64) -> Result<f64> {
    Ok(Input::with_theme(theme)
        .with_prompt(prompt)
        .default(default)
        .validate_with(|input: &f64| -> Result<(), &str> {
            if *input >= 0.0 && *input < 100.0 {
                Ok(())
            } else {
                Err("Percentage must be between 0 and 100")
            }
        })
        .interact_text()?)
}

fn prompt_amount(theme: &ColorfulTheme, prompt: &str, default: Option<f64>) -> Result<f64> {
    let mut input = Input::with_theme(theme);
    input = input
        .with_prompt(prompt)
        .validate_with(|input: &f64| -> Result<(), &str> {
            if *input >= 0.0 {
                Ok(())
            } else {
                Err("Amount must not be negative")
            }
        });
    if let Some(default) = default {
        input = input.default(default);
    }
    Ok(input.interact_text()?)
}

fn create_pricing(theme: &ColorfulTheme) -> Result<CalculationConfig> {
    let name: String = Input::with_theme(theme)
        .with_prompt("Product name")
        .interact_text()?;

    let cost: f64 = Input::with_theme(theme)
        .with_prompt("Unit cost")
        .validate_with(|input: &f64| -> Result<(), &str> {
            if *input > 0.0 {
                Ok(())
            } else {
                Err("Cost must be positive")
            }
        })
        .interact_text()?;

    let target_margin_percent = prompt_percent(theme, "Target margin (%)", 30.0)?;
    let tax_percent = prompt_percent(theme, "Tax (%)", 0.0)?;
    let marketplace_fee_percent = prompt_percent(theme, "Marketplace fee (%)", 0.0)?;
    let shipping_cost = prompt_amount(theme, "Shipping cost", Some(0.0))?;

    let include_shipping_in_price = shipping_cost > 0.0
        && Confirm::with_theme(theme)
            .with_prompt("Include shipping in the selling price?")
            .default(false)
            .interact()?;

    let has_reference = Confirm::with_theme(theme)
        .with_prompt("Compare against a current price?")
        .default(false)
        .interact()?;

    let reference_price = if has_reference {
        Some(prompt_amount(theme, "Current price", None)?)
    } else {
        None
    };

    Ok(CalculationConfig::Pricing(PricingCalculation {
        name,
        input: PricingInput {
            cost,
            target_margin_percent,
            tax_percent,
            marketplace_fee_percent,
            shipping_cost,
            include_shipping_in_price,
        },
        scenario_margins: Vec::new(),
        reference_price,
    }))
}

fn create_discount(theme: &ColorfulTheme) -> Result<CalculationConfig> {
    let name: String = Input::with_theme(theme)
        .with_prompt("Product name")
        .interact_text()?;

    let selling_price = prompt_amount(theme, "Current selling price", None)?;
    let cost_price = prompt_amount(theme, "Unit cost", None)?;
    let marketplace_fee_percent = prompt_percent(theme, "Marketplace fee (%)", 0.0)?;
    let tax_percent = prompt_percent(theme, "Tax (%)", 0.0)?;
    let shipping_cost = prompt_amount(theme, "Shipping paid by seller", Some(0.0))?;
    let additional_costs = prompt_amount(theme, "Other unit costs", Some(0.0))?;

    Ok(CalculationConfig::Discount(DiscountCalculation {
        name,
        input: DiscountInput {
            selling_price,
            cost_price,
            marketplace_fee_percent,
            tax_percent,
            shipping_cost,
            additional_costs,
        },
        discounts: Vec::new(),
    }))
}

fn generate_default_filename(config: &CalculationConfig) -> String {
    let slug: String = config
        .name()
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    match config {
        CalculationConfig::Pricing(PricingCalculation { input, .. }) => format!(
            "{}_Pricing_{}pct.toml",
            slug, input.target_margin_percent
        ),
        CalculationConfig::Discount(DiscountCalculation { input, .. }) => {
            format!("{}_Discount_{}.toml", slug, input.selling_price)
        }
    }
}
