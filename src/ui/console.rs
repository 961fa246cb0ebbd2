//! Console renderer for calculation reports.

use crate::error::PricingError;
use crate::pricing::batch::BatchItemResult;
use crate::pricing::{
    DiscountAnalyzer, DiscountBand, DiscountScenario, PricingInput, PricingResult,
};
use crate::sync::{SyncReport, SyncStats};

pub struct ConsoleRenderer;

impl ConsoleRenderer {
    /// Render a pricing report: the target price, its breakdown and any
    /// side-by-side margin scenarios.
    pub fn render_pricing(
        name: &str,
        input: &PricingInput,
        result: &PricingResult,
        scenarios: &[(f64, Result<PricingResult, PricingError>)],
        reference: Option<(f64, f64)>,
    ) {
        println!();
        println!("{}", "=".repeat(60));
        println!(" PRICING REPORT: {}", name);
        println!("{}", "=".repeat(60));

        println!();
        println!("INPUT");
        println!("Cost:          {:.2}", input.cost);
        println!("Target Margin: {:.2}%", input.target_margin_percent);
        println!("Tax:           {:.2}%", input.tax_percent);
        println!("Marketplace:   {:.2}%", input.marketplace_fee_percent);
        if input.shipping_cost > 0.0 {
            let tag = if input.include_shipping_in_price {
                "included"
            } else {
                "not included"
            };
            println!("Shipping:      {:.2} ({})", input.shipping_cost, tag);
        }

        println!();
        println!("{}", "-".repeat(60));
        println!("SELLING PRICE: {:.2}", result.selling_price);
        println!("Profit:        {:.2}", result.profit);
        println!("Margin:        {:.2}%", result.margin_percent);
        println!("Markup:        {:.2}%", result.markup_percent);

        println!();
        println!("BREAKDOWN");
        let b = &result.breakdown;
        println!("  Cost:        {:.2}", b.cost_component);
        println!("  Tax:         {:.2}", b.tax_component);
        println!("  Fee:         {:.2}", b.fee_component);
        if b.shipping_component > 0.0 {
            println!("  Shipping:    {:.2}", b.shipping_component);
        }
        println!("  Margin:      {:.2}", b.margin_component);

        if let Some((price, margin)) = reference {
            println!();
            println!("Current price {:.2} yields a {:.2}% margin", price, margin);
        }

        if !scenarios.is_empty() {
            println!();
            println!("{}", "-".repeat(60));
            println!("MARGIN SCENARIOS");
            println!("{:<10} | {:<12} | {:<12}", "MARGIN %", "PRICE", "PROFIT");
            for (margin, outcome) in scenarios {
                match outcome {
                    Ok(r) => println!(
                        "{:<10.2} | {:<12.2} | {:<12.2}",
                        margin, r.selling_price, r.profit
                    ),
                    Err(e) => println!("{:<10.2} | {}", margin, e),
                }
            }
        }

        println!();
        println!("{}", "=".repeat(60));
        println!();
    }

    /// Render a discount analysis and its simulated scenarios.
    pub fn render_discount(name: &str, analyzer: &DiscountAnalyzer, scenarios: &[DiscountScenario]) {
        let input = analyzer.input();
        let result = analyzer.result();

        println!();
        println!("{}", "=".repeat(60));
        println!(" DISCOUNT ANALYSIS: {}", name);
        println!("{}", "=".repeat(60));

        println!();
        println!("Price:         {:.2}", input.selling_price);
        println!("Unit Cost:     {:.2}", input.cost_price);
        println!("Fixed Costs:   {:.2}", input.fixed_costs());
        println!("Profit:        {:.2}", result.current_profit);
        println!("Margin:        {:.2}%", result.current_margin_percent);

        println!();
        println!("{}", "-".repeat(60));
        if result.break_even_discount_percent <= 0.0 {
            println!("  [LOSS] Already selling at or below break-even. No discount is safe.");
        } else {
            println!("Break-even:    {:.2}%", result.break_even_discount_percent);
            println!("Safe up to:    {:.2}%", result.safe_discount_percent);
            println!("Caution to:    {:.2}%", result.caution_discount_percent);
            println!("Max discount:  {:.2}%", result.max_discount_percent);
        }

        if !scenarios.is_empty() {
            println!();
            println!("{}", "-".repeat(60));
            println!("SCENARIOS");
            println!(
                "{:<6} | {:<10} | {:<10} | {:<8} | {:<10} | {:<10} | BAND",
                "DISC", "PRICE", "PROFIT", "MARGIN", "VOL REV", "VOL PROFIT"
            );
            for s in scenarios {
                println!(
                    "{:<6.1} | {:<10.2} | {:<10.2} | {:<8} | {:<10} | {:<10} | {}",
                    s.discount_percent,
                    s.final_price,
                    s.profit_per_unit,
                    format_optional_percent(s.margin_percent),
                    format_optional_percent(s.volume_increase_needed_percent),
                    format_optional_percent(s.volume_increase_for_same_profit_percent),
                    band_tag(s.band)
                );
            }
        }

        println!();
        println!("{}", "=".repeat(60));
        println!();
    }

    /// Render the results of a batch run, failures inline.
    pub fn render_batch(results: &[BatchItemResult]) {
        println!();
        println!("{}", "=".repeat(60));
        println!(" BATCH RESULTS ({} items)", results.len());
        println!("{}", "=".repeat(60));
        println!(
            "{:<16} | {:<12} | {:<12} | {:<8}",
            "SKU", "PRICE", "PROFIT", "MARGIN"
        );
        println!("{}", "-".repeat(60));

        let mut failed = 0;
        for item in results {
            match &item.result {
                Ok(r) => println!(
                    "{:<16} | {:<12.2} | {:<12.2} | {:<8.2}",
                    item.sku, r.selling_price, r.profit, r.margin_percent
                ),
                Err(e) => {
                    failed += 1;
                    println!("{:<16} | [ERROR] {}", item.sku, e);
                }
            }
        }

        if failed > 0 {
            println!();
            println!("{} of {} items could not be priced", failed, results.len());
        }
        println!("{}", "=".repeat(60));
        println!();
    }

    pub fn render_sync(report: &SyncReport, stats: &SyncStats) {
        println!();
        println!("{}", "=".repeat(60));
        println!(" SYNC");
        println!("{}", "=".repeat(60));
        println!("Attempted: {}", report.attempted);
        println!("Synced:    {}", report.synced);
        println!("Retrying:  {}", report.retried);
        println!("Abandoned: {}", report.abandoned);
        println!("Deferred:  {}", report.deferred);
        println!("{}", "-".repeat(60));
        println!("Still pending: {}", stats.pending);
        println!();
    }
}

fn format_optional_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v),
        None => "n/a".to_string(),
    }
}

fn band_tag(band: DiscountBand) -> &'static str {
    match band {
        DiscountBand::Safe => "[SAFE]",
        DiscountBand::Caution => "[CAUTION]",
        DiscountBand::Danger => "[DANGER]",
        DiscountBand::Loss => "[LOSS]",
    }
}
