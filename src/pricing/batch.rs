//! Bulk price computation off the async runtime.
//!
//! A batch runs on a blocking worker and reports back over a channel:
//! progress roughly every 10% of the items, then either the full result
//! list or a cancellation notice.

use crate::constants::BATCH_PROGRESS_STEP_PERCENT;
use crate::error::PricingError;
use crate::pricing::{compute_selling_price, PricingInput, PricingResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub sku: String,
    pub input: PricingInput,
}

/// CSV row layout of a batch file.
#[derive(Debug, Deserialize, Serialize)]
struct BatchRow {
    sku: String,
    cost: f64,
    target_margin_percent: f64,
    #[serde(default)]
    tax_percent: f64,
    #[serde(default)]
    marketplace_fee_percent: f64,
    #[serde(default)]
    shipping_cost: f64,
    #[serde(default)]
    include_shipping_in_price: bool,
}

impl From<BatchRow> for BatchItem {
    fn from(row: BatchRow) -> Self {
        Self {
            sku: row.sku,
            input: PricingInput {
                cost: row.cost,
                target_margin_percent: row.target_margin_percent,
                tax_percent: row.tax_percent,
                marketplace_fee_percent: row.marketplace_fee_percent,
                shipping_cost: row.shipping_cost,
                include_shipping_in_price: row.include_shipping_in_price,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchItemResult {
    pub sku: String,
    pub result: Result<PricingResult, PricingError>,
}

#[derive(Debug, Clone)]
pub enum BatchEvent {
    Progress {
        completed: usize,
        total: usize,
        percent: u32,
    },
    Completed(Vec<BatchItemResult>),
    Cancelled {
        completed: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Read batch items from a CSV file with a header row.
pub fn load_batch_csv<P: AsRef<Path>>(path: P) -> Result<Vec<BatchItem>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open batch file {}", path.display()))?;

    let mut items = Vec::new();
    for (line, row) in reader.deserialize::<BatchRow>().enumerate() {
        let row = row.with_context(|| format!("Invalid batch row {}", line + 2))?;
        items.push(row.into());
    }
    Ok(items)
}

/// Runs the batch on the calling thread, handing every event to `on_event`.
pub fn run_batch<F>(items: Vec<BatchItem>, cancel: &CancelFlag, mut on_event: F)
where
    F: FnMut(BatchEvent),
{
    let total = items.len();
    let step = progress_step(total);
    let mut results = Vec::with_capacity(total);

    for item in items {
        if cancel.is_cancelled() {
            info!("Batch cancelled after {}/{} items", results.len(), total);
            on_event(BatchEvent::Cancelled {
                completed: results.len(),
            });
            return;
        }

        let result = compute_selling_price(&item.input);
        results.push(BatchItemResult {
            sku: item.sku,
            result,
        });

        let completed = results.len();
        if completed % step == 0 || completed == total {
            let percent = (completed * 100 / total) as u32;
            debug!("Batch progress {}/{} ({}%)", completed, total, percent);
            on_event(BatchEvent::Progress {
                completed,
                total,
                percent,
            });
        }
    }

    on_event(BatchEvent::Completed(results));
}

/// Spawns the batch on a blocking worker. Events arrive on `events`; the
/// worker stops early once `cancel` is set.
pub fn calculate_batch(
    items: Vec<BatchItem>,
    events: mpsc::UnboundedSender<BatchEvent>,
    cancel: CancelFlag,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        run_batch(items, &cancel, |event| {
            // Receiver gone means nobody is listening any more
            let _ = events.send(event);
        });
    })
}

/// Prices the same product for each target margin.
pub fn calculate_scenarios(
    base: &PricingInput,
    margins: &[f64],
) -> Vec<(f64, Result<PricingResult, PricingError>)> {
    margins
        .iter()
        .map(|margin| {
            let input = PricingInput {
                target_margin_percent: *margin,
                ..*base
            };
            (*margin, compute_selling_price(&input))
        })
        .collect()
}

/// Items per progress event, rounded up so small batches still report
/// roughly every tenth.
fn progress_step(total: usize) -> usize {
    (total * BATCH_PROGRESS_STEP_PERCENT as usize).div_ceil(100).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn item(sku: &str, cost: f64) -> BatchItem {
        BatchItem {
            sku: sku.to_string(),
            input: PricingInput {
                cost,
                target_margin_percent: 30.0,
                tax_percent: 7.0,
                marketplace_fee_percent: 13.0,
                shipping_cost: 0.0,
                include_shipping_in_price: false,
            },
        }
    }

    #[test]
    fn test_run_batch_reports_progress_every_tenth() {
        let items: Vec<_> = (1..=50).map(|i| item(&format!("SKU-{}", i), i as f64)).collect();
        let mut events = Vec::new();
        run_batch(items, &CancelFlag::new(), |e| events.push(e));

        let progress: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);

        match events.last() {
            Some(BatchEvent::Completed(results)) => {
                assert_eq!(results.len(), 50);
                let first = results[0].result.as_ref().unwrap();
                assert!((first.selling_price - 2.0).abs() < 1e-9);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_small_batch_does_not_report_every_item() {
        let items: Vec<_> = (1..=15).map(|i| item(&format!("SKU-{}", i), 10.0)).collect();
        let mut completed_at = Vec::new();
        run_batch(items, &CancelFlag::new(), |e| {
            if let BatchEvent::Progress { completed, .. } = e {
                completed_at.push(completed);
            }
        });

        assert_eq!(completed_at, vec![2, 4, 6, 8, 10, 12, 14, 15]);
    }

    #[test]
    fn test_invalid_item_does_not_fail_batch() {
        let items = vec![item("OK", 10.0), item("BAD", -1.0), item("OK2", 20.0)];
        let mut completed = None;
        run_batch(items, &CancelFlag::new(), |e| {
            if let BatchEvent::Completed(r) = e {
                completed = Some(r);
            }
        });

        let results = completed.unwrap();
        assert!(results[0].result.is_ok());
        assert!(results[1].result.is_err());
        assert!(results[2].result.is_ok());
    }

    #[test]
    fn test_cancelled_batch_stops() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut events = Vec::new();
        run_batch(vec![item("A", 1.0), item("B", 2.0)], &cancel, |e| events.push(e));

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], BatchEvent::Cancelled { completed: 0 }));
    }

    #[tokio::test]
    async fn test_calculate_batch_on_worker() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let items: Vec<_> = (1..=5).map(|i| item(&i.to_string(), 10.0)).collect();
        calculate_batch(items, tx, CancelFlag::new()).await.unwrap();

        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        match last {
            Some(BatchEvent::Completed(results)) => assert_eq!(results.len(), 5),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_calculate_scenarios() {
        let base = item("X", 60.0).input;
        let scenarios = calculate_scenarios(&base, &[10.0, 30.0, 90.0]);

        assert_eq!(scenarios.len(), 3);
        let (_, at_30) = &scenarios[1];
        assert!((at_30.as_ref().unwrap().selling_price - 120.0).abs() < 1e-9);
        assert!(scenarios[2].1.is_err());
    }

    #[test]
    fn test_load_batch_csv() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "sku,cost,target_margin_percent,tax_percent,marketplace_fee_percent,shipping_cost,include_shipping_in_price"
        )
        .unwrap();
        writeln!(file, "CAMISETA-P,60,30,7,13,0,false").unwrap();
        writeln!(file, "CANECA,25.5,20,4,16,12,true").unwrap();

        let items = load_batch_csv(file.path()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].sku, "CAMISETA-P");
        assert_eq!(items[1].input.shipping_cost, 12.0);
        assert!(items[1].input.include_shipping_in_price);
    }
}
