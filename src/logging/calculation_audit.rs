use crate::pricing::{DiscountInput, DiscountResult, PricingInput, PricingResult};
use anyhow::{Context, Result};
use chrono::Local;
use csv::Writer;
use serde::Serialize;
use std::fs::{create_dir_all, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Serialize, Clone)]
pub struct CalculationRecord {
    pub timestamp: String,
    pub kind: String, // PRICING, DISCOUNT
    pub name: String,
    pub cost: f64,
    pub selling_price: f64,
    pub profit: f64,
    pub margin_percent: f64,
    pub break_even_discount_percent: Option<f64>,
    pub notes: Option<String>,
}

/// Appends every computed price to `calculations.csv`.
#[derive(Clone)]
pub struct CalculationAuditLogger {
    writer: Arc<Mutex<Writer<std::fs::File>>>,
}

impl CalculationAuditLogger {
    pub fn new(log_dir: &str) -> Result<Self> {
        let dir = Path::new(log_dir);
        create_dir_all(dir).context("Failed to create log directory")?;

        let file_path = dir.join("calculations.csv");
        let file_exists = file_path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .context("Failed to open calculations.csv")?;

        let writer = csv::WriterBuilder::new()
            .has_headers(!file_exists)
            .from_writer(file);

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
        })
    }

    pub fn log(&self, record: CalculationRecord) {
        if let Ok(mut w) = self.writer.lock() {
            if let Err(e) = w.serialize(record) {
                tracing::error!("Failed to write calculation audit log: {}", e);
            } else {
                let _ = w.flush();
            }
        }
    }

    pub fn log_pricing(&self, name: &str, input: &PricingInput, result: &PricingResult) {
        self.log(CalculationRecord {
            timestamp: Local::now().to_rfc3339(),
            kind: "PRICING".to_string(),
            name: name.to_string(),
            cost: input.cost,
            selling_price: result.selling_price,
            profit: result.profit,
            margin_percent: result.margin_percent,
            break_even_discount_percent: None,
            notes: None,
        });
    }

    pub fn log_discount(&self, name: &str, input: &DiscountInput, result: &DiscountResult) {
        self.log(CalculationRecord {
            timestamp: Local::now().to_rfc3339(),
            kind: "DISCOUNT".to_string(),
            name: name.to_string(),
            cost: input.cost_price,
            selling_price: input.selling_price,
            profit: result.current_profit,
            margin_percent: result.current_margin_percent,
            break_even_discount_percent: Some(result.break_even_discount_percent),
            notes: None,
        });
    }

    pub fn log_failure(&self, kind: &str, name: &str, cost: f64, reason: &str) {
        self.log(CalculationRecord {
            timestamp: Local::now().to_rfc3339(),
            kind: kind.to_string(),
            name: name.to_string(),
            cost,
            selling_price: 0.0,
            profit: 0.0,
            margin_percent: 0.0,
            break_even_discount_percent: None,
            notes: Some(reason.to_string()),
        });
    }
}
