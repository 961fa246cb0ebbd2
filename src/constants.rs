//! Central configuration constants for azuria-pricing.
//!
//! Tunable parameters and magic numbers shared by the pricing engine, the
//! rate limiter and the background sync queue.

use std::time::Duration;

// =============================================================================
// PRICING CONSTANTS
// =============================================================================

/// Smallest divisor `1 - margin - tax - fee` accepted by the pricing engine.
pub const DIVISOR_EPSILON: f64 = 1e-6;

/// Upper edge (exclusive) of the safe discount band, as a share of profit.
pub const SAFE_PROFIT_SHARE: f64 = 0.30;

/// Upper edge (exclusive) of the caution discount band.
pub const CAUTION_PROFIT_SHARE: f64 = 0.70;

/// Upper edge (exclusive) of the danger band; at or above this the discount
/// consumes the whole profit.
pub const LOSS_PROFIT_SHARE: f64 = 1.0;

/// Discount percentages simulated by `standard_scenarios`.
pub const STANDARD_DISCOUNTS: [f64; 6] = [5.0, 10.0, 15.0, 20.0, 25.0, 30.0];

/// Batch progress is reported every 10% of completion.
pub const BATCH_PROGRESS_STEP_PERCENT: u32 = 10;

// =============================================================================
// RATE LIMITER CONSTANTS
// =============================================================================

/// Behaviour samples kept per limiter.
pub const MAX_BEHAVIOR_SAMPLES: usize = 500;

/// Samples inspected on each adaptive recalculation.
pub const ADAPTIVE_SAMPLE_WINDOW: usize = 100;

/// Samples required before the adaptive limit may move.
pub const MIN_ADAPTIVE_SAMPLES: usize = 10;

/// Interval of the adaptive recalculation (30 seconds).
pub const ADAPTIVE_RECALC_INTERVAL: Duration = Duration::from_secs(30);

/// Default dwell time between two adaptive adjustments (60 seconds).
pub const DEFAULT_ADJUSTMENT_COOLDOWN_MS: u64 = 60_000;

/// Weight of the newest success-rate reading in the smoothed signal.
pub const SUCCESS_RATE_SMOOTHING: f64 = 0.5;

pub const ADAPTIVE_RAISE_FACTOR: f64 = 1.2;
pub const ADAPTIVE_CUT_FACTOR: f64 = 0.7;
pub const HIGH_SUCCESS_RATE: f64 = 0.95;
pub const LOW_SUCCESS_RATE: f64 = 0.80;

// =============================================================================
// SYNC QUEUE CONSTANTS
// =============================================================================

/// Failed attempts before a queued item is abandoned.
pub const MAX_RETRIES: u32 = 3;

/// Interval of the periodic sync (30 seconds).
pub const SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Storage key of the pending queue; used as the journal file stem.
pub const PENDING_SYNC_KEY: &str = "azuria-pending-sync";

/// Journal records appended before the snapshot is rewritten.
pub const COMPACTION_THRESHOLD: usize = 256;

/// Timeout of a single sync POST.
pub const SYNC_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
