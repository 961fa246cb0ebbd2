use anyhow::Result;
use clap::Parser;
use azuria_pricing::clock::{Clock, SystemClock};
use azuria_pricing::config::calculation::{CalculationConfig, DiscountCalculation, PricingCalculation};
use azuria_pricing::config::load_config;
use azuria_pricing::config::rate_limit::load_rate_limit_config;
use azuria_pricing::config::sync::load_sync_config;
use azuria_pricing::logging::calculation_audit::CalculationAuditLogger;
use azuria_pricing::pricing::batch::{calculate_batch, calculate_scenarios, load_batch_csv, BatchEvent, CancelFlag};
use azuria_pricing::pricing::{compute_selling_price, margin_for_price, DiscountAnalyzer};
use azuria_pricing::rate_limit::AdaptiveRateLimiter;
use azuria_pricing::sync::{BackgroundSyncService, FileSyncStore, HttpSyncTransport, SyncDataType};
use azuria_pricing::ui::console::ConsoleRenderer;
use log::{error, info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[derive(Parser, Debug)]
#[command(author, version, about = "Azuria pricing and discount calculator", long_about = None)]
struct Args {
    #[arg(short, long)]
    config: Option<String>,

    /// CSV file of products to price in one go
    #[arg(short, long)]
    batch: Option<String>,

    #[arg(short, long)]
    list_types: bool,

    #[arg(long)]
    create: bool,

    /// Queue this run's results and flush the pending sync journal
    #[arg(long)]
    sync: bool,

    /// Extra discount to simulate, in percent. Repeatable.
    #[arg(short = 'd', long = "discount")]
    discounts: Vec<f64>,
}

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

#[tokio::main]
async fn main() -> Result<()> {
    // ---------------------------------------------------------
    // 1. Setup Logging (Tracing)
    // ---------------------------------------------------------
    let file_appender = tracing_appender::rolling::daily("logs", "application.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Console Layer (Env Filter)
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
                .add_directive("azuria_pricing=debug".parse()?),
        );

    // File Layer (Simple Text)
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_target(false)
        .with_filter(tracing_subscriber::EnvFilter::new("info,azuria_pricing=debug"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    // ---------------------------------------------------------
    // 2. Setup Audit Logger
    // ---------------------------------------------------------
    let audit_logger = match CalculationAuditLogger::new("logs") {
        Ok(l) => Some(l),
        Err(e) => {
            error!("Failed to initialize Calculation Audit Logger: {}", e);
            None
        }
    };

    let args = Args::parse();

    if args.list_types {
        azuria_pricing::config::calculation::print_calculation_help();
        return Ok(());
    }

    if args.create {
        if let Err(e) = azuria_pricing::config::creator::create_config() {
            error!("Error creating config: {}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    if args.config.is_none() && args.batch.is_none() && !args.sync {
        return Err(anyhow::anyhow!(
            "One of --config, --batch or --sync is required unless --list-types or --create is used"
        ));
    }

    // Results worth syncing to the backend, in the order they were produced
    let mut outputs: Vec<serde_json::Value> = Vec::new();

    if let Some(config_path) = &args.config {
        info!("Loading config from: {}", config_path);
        let config = load_config(config_path)?;
        info!("Running {} calculation '{}'", config.type_name(), config.name());

        match run_calculation(&config, &args.discounts, audit_logger.as_ref()) {
            Ok(output) => outputs.push(output),
            Err(e) => {
                error!("Calculation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    if let Some(batch_path) = &args.batch {
        match run_batch_file(batch_path, audit_logger.as_ref()).await {
            Ok(mut batch_outputs) => outputs.append(&mut batch_outputs),
            Err(e) => {
                error!("Batch failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    if args.sync {
        if let Err(e) = run_sync(outputs).await {
            error!("Sync failed: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn run_calculation(
    config: &CalculationConfig,
    extra_discounts: &[f64],
    audit: Option<&CalculationAuditLogger>,
) -> Result<serde_json::Value> {
    match config {
        CalculationConfig::Pricing(c) => run_pricing(c, audit),
        CalculationConfig::Discount(c) => run_discount(c, extra_discounts, audit),
    }
}

fn run_pricing(
    calc: &PricingCalculation,
    audit: Option<&CalculationAuditLogger>,
) -> Result<serde_json::Value> {
    let result = match compute_selling_price(&calc.input) {
        Ok(r) => r,
        Err(e) => {
            if let Some(a) = audit {
                a.log_failure("PRICING", &calc.name, calc.input.cost, &e.to_string());
            }
            return Err(e.into());
        }
    };

    let scenarios = calculate_scenarios(&calc.input, &calc.scenario_margins);
    let reference = calc
        .reference_price
        .map(|price| margin_for_price(price, &calc.input).map(|margin| (price, margin)))
        .transpose()?;

    ConsoleRenderer::render_pricing(&calc.name, &calc.input, &result, &scenarios, reference);

    if let Some(a) = audit {
        a.log_pricing(&calc.name, &calc.input, &result);
    }

    Ok(json!({
        "kind": "pricing",
        "name": calc.name,
        "input": calc.input,
        "result": result,
    }))
}

fn run_discount(
    calc: &DiscountCalculation,
    extra_discounts: &[f64],
    audit: Option<&CalculationAuditLogger>,
) -> Result<serde_json::Value> {
    let analyzer = DiscountAnalyzer::new(calc.input)?;

    let scenarios = if calc.discounts.is_empty() && extra_discounts.is_empty() {
        analyzer.standard_scenarios()
    } else {
        let mut discounts: Vec<f64> = calc
            .discounts
            .iter()
            .chain(extra_discounts.iter())
            .copied()
            .collect();
        discounts.sort_by(|a, b| a.total_cmp(b));
        discounts.dedup();
        discounts
            .into_iter()
            .map(|d| analyzer.simulate_scenario(d))
            .collect::<Result<Vec<_>, _>>()?
    };

    ConsoleRenderer::render_discount(&calc.name, &analyzer, &scenarios);

    if let Some(a) = audit {
        a.log_discount(&calc.name, analyzer.input(), analyzer.result());
    }

    Ok(json!({
        "kind": "discount",
        "name": calc.name,
        "input": analyzer.input(),
        "result": analyzer.result(),
        "scenarios": scenarios,
    }))
}

async fn run_batch_file(
    path: &str,
    audit: Option<&CalculationAuditLogger>,
) -> Result<Vec<serde_json::Value>> {
    let items = load_batch_csv(path)?;
    info!("Pricing {} items from {}", items.len(), path);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancelFlag::new();
    let worker = calculate_batch(items, tx, cancel.clone());

    let mut results = None;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(BatchEvent::Progress { completed, total, percent }) => {
                    info!("Batch progress: {}% ({}/{})", percent, completed, total);
                }
                Some(BatchEvent::Completed(r)) => results = Some(r),
                Some(BatchEvent::Cancelled { completed }) => {
                    warn!("Batch cancelled after {} items", completed);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                warn!("Interrupt received, cancelling batch...");
                cancel.cancel();
            }
        }
    }
    worker.await?;

    let Some(results) = results else {
        return Ok(Vec::new());
    };

    ConsoleRenderer::render_batch(&results);

    let mut outputs = Vec::with_capacity(results.len());
    for item in &results {
        match &item.result {
            Ok(r) => {
                if let Some(a) = audit {
                    a.log(azuria_pricing::logging::calculation_audit::CalculationRecord {
                        timestamp: chrono::Local::now().to_rfc3339(),
                        kind: "BATCH".to_string(),
                        name: item.sku.clone(),
                        cost: r.breakdown.cost_component,
                        selling_price: r.selling_price,
                        profit: r.profit,
                        margin_percent: r.margin_percent,
                        break_even_discount_percent: None,
                        notes: None,
                    });
                }
                outputs.push(json!({
                    "kind": "batch_item",
                    "sku": item.sku,
                    "result": r,
                }));
            }
            Err(e) => warn!("Skipping {}: {}", item.sku, e),
        }
    }
    Ok(outputs)
}

async fn run_sync(outputs: Vec<serde_json::Value>) -> Result<()> {
    let sync_config = load_sync_config()?;
    let rate_limit_config = load_rate_limit_config(None);
    info!(
        "Syncing to {} (journal in {})",
        sync_config.base_url,
        sync_config.data_dir.display()
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let limiter = Arc::new(AdaptiveRateLimiter::new(rate_limit_config, Arc::clone(&clock))?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let adaptive_task = limiter.spawn_adaptive_task(shutdown_rx);

    let transport = Arc::new(HttpSyncTransport::new(
        &sync_config.base_url,
        sync_config.api_token.clone(),
    )?);
    let store = FileSyncStore::open(&sync_config.data_dir)?;
    let service = BackgroundSyncService::new(
        transport,
        Box::new(store),
        clock,
        sync_config.service_config(),
    )?
    .with_rate_limiter(Arc::clone(&limiter));

    // Journal everything first, then send in one concurrent pass
    service.set_online(false);
    for output in outputs {
        let id = service.queue_for_sync(SyncDataType::Calculation, output).await?;
        info!("Queued calculation {}", id);
    }

    service.set_online(true);
    let report = service.sync_all().await;
    for item in service.take_abandoned() {
        warn!(
            "Gave up on {:?} item {} after {} attempts",
            item.data_type, item.id, item.retry_count
        );
    }
    service.checkpoint()?;

    ConsoleRenderer::render_sync(&report, &service.stats());

    let stats = limiter.stats();
    info!(
        "Rate limiter: limit {} per window, {}/{} requests allowed",
        stats.adaptive_limit, stats.allowed_requests, stats.total_requests
    );

    let _ = shutdown_tx.send(true);
    adaptive_task.await?;
    Ok(())
}
