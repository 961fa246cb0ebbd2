//! Adaptive limit controller.
//!
//! Reads the latest behaviour samples and decides whether the effective
//! limit moves. The success signal is exponentially smoothed and every
//! adjustment is followed by a dwell time, so the limit cannot flip
//! between raise and cut on consecutive recalculations.

use super::types::BehaviorSample;
use crate::config::rate_limit::RateLimitConfig;
use crate::constants::{
    ADAPTIVE_CUT_FACTOR, ADAPTIVE_RAISE_FACTOR, ADAPTIVE_SAMPLE_WINDOW, HIGH_SUCCESS_RATE,
    LOW_SUCCESS_RATE, MIN_ADAPTIVE_SAMPLES, SUCCESS_RATE_SMOOTHING,
};
use std::collections::VecDeque;

/// Success rate and mean spacing of the most recent samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BehaviorSummary {
    pub samples: usize,
    pub success_rate: f64,
    pub avg_interval_ms: f64,
}

pub fn summarize(pattern: &VecDeque<BehaviorSample>) -> Option<BehaviorSummary> {
    let skip = pattern.len().saturating_sub(ADAPTIVE_SAMPLE_WINDOW);
    let recent: Vec<&BehaviorSample> = pattern.iter().skip(skip).collect();
    if recent.is_empty() {
        return None;
    }

    let successes = recent.iter().filter(|s| s.success).count();
    let success_rate = successes as f64 / recent.len() as f64;

    let avg_interval_ms = match (recent.first(), recent.last()) {
        (Some(first), Some(last)) if recent.len() > 1 => {
            last.timestamp.saturating_sub(first.timestamp) as f64 / (recent.len() - 1) as f64
        }
        _ => 0.0,
    };

    Some(BehaviorSummary {
        samples: recent.len(),
        success_rate,
        avg_interval_ms,
    })
}

pub fn smooth(previous: Option<f64>, current: f64) -> f64 {
    match previous {
        Some(prev) => SUCCESS_RATE_SMOOTHING * current + (1.0 - SUCCESS_RATE_SMOOTHING) * prev,
        None => current,
    }
}

/// New limit for the observed behaviour, or `None` when it should stay.
///
/// Raise by 20% when nearly everything succeeds at a relaxed pace; cut by
/// 30% when failures pile up or requests arrive in bursts. The result stays
/// within `[1, 2 * max_requests]`.
pub fn next_limit(
    current: u32,
    smoothed_success_rate: f64,
    summary: &BehaviorSummary,
    config: &RateLimitConfig,
) -> Option<u32> {
    if summary.samples < MIN_ADAPTIVE_SAMPLES {
        return None;
    }

    let nominal = config.nominal_interval_ms();
    let ceiling = config.max_requests.saturating_mul(2).max(1);

    let proposed = if smoothed_success_rate < LOW_SUCCESS_RATE
        || summary.avg_interval_ms < nominal * 0.5
    {
        (current as f64 * ADAPTIVE_CUT_FACTOR).floor() as u32
    } else if smoothed_success_rate > HIGH_SUCCESS_RATE && summary.avg_interval_ms > nominal * 2.0
    {
        (current as f64 * ADAPTIVE_RAISE_FACTOR).ceil() as u32
    } else {
        return None;
    };

    let bounded = proposed.clamp(1, ceiling);
    if bounded == current {
        None
    } else {
        Some(bounded)
    }
}
