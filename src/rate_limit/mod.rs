//! Client-side admission control for outgoing requests.
//!
//! One limiter guards one caller inside one process. It cannot enforce a
//! global limit across processes or hosts.

pub mod adaptive;
pub mod types;

use crate::clock::Clock;
use crate::config::rate_limit::{RateLimitAlgorithm, RateLimitConfig};
use crate::constants::{ADAPTIVE_RECALC_INTERVAL, MAX_BEHAVIOR_SAMPLES};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub use types::{AdaptiveAdjustment, BehaviorSample, RateLimitResult, RateLimitStats};

struct RateLimitState {
    request_history: VecDeque<u64>,
    burst_tokens: u32,
    last_refill: u64,
    refill_carry: u64,
    behavior_pattern: VecDeque<BehaviorSample>,
    adaptive_limit: u32,
    smoothed_success_rate: Option<f64>,
    last_adjustment: Option<u64>,
    last_recalculation: u64,
    total_requests: u64,
    allowed_requests: u64,
    blocked_requests: u64,
}

impl RateLimitState {
    fn new(config: &RateLimitConfig, now: u64) -> Self {
        Self {
            request_history: VecDeque::new(),
            burst_tokens: config.bucket_capacity(),
            last_refill: now,
            refill_carry: 0,
            behavior_pattern: VecDeque::new(),
            adaptive_limit: config.max_requests,
            smoothed_success_rate: None,
            last_adjustment: None,
            last_recalculation: now,
            total_requests: 0,
            allowed_requests: 0,
            blocked_requests: 0,
        }
    }

    /// Timestamps at least one window old no longer count.
    fn prune(&mut self, now: u64, window_ms: u64) {
        while let Some(&front) = self.request_history.front() {
            if now.saturating_sub(front) >= window_ms {
                self.request_history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Credits `elapsed * limit` token-milliseconds and converts every
    /// whole `window_ms` of them into a token. The leftover stays in
    /// `refill_carry`, so partial progress toward the next token is kept
    /// exactly.
    fn refill(&mut self, now: u64, config: &RateLimitConfig) {
        let limit = self.adaptive_limit.max(1) as u64;
        let elapsed = now.saturating_sub(self.last_refill);
        if elapsed == 0 {
            return;
        }
        self.last_refill = now;

        let credit = self.refill_carry + elapsed * limit;
        let to_add = credit / config.window_ms;
        self.refill_carry = credit % config.window_ms;

        let capacity = config.bucket_capacity() as u64;
        let tokens = (self.burst_tokens as u64 + to_add).min(capacity);
        self.burst_tokens = tokens as u32;
        if tokens == capacity {
            self.refill_carry = 0;
        }
    }

    /// Milliseconds until the next token lands.
    fn next_token_in(&self, config: &RateLimitConfig) -> u64 {
        let limit = self.adaptive_limit.max(1) as u64;
        config.window_ms.saturating_sub(self.refill_carry).div_ceil(limit)
    }

    fn token_interval_ms(&self, config: &RateLimitConfig) -> u64 {
        config.window_ms.div_ceil(self.adaptive_limit.max(1) as u64)
    }

    fn check_sliding_window(&mut self, now: u64, config: &RateLimitConfig) -> RateLimitResult {
        self.prune(now, config.window_ms);

        let limit = self.adaptive_limit as usize;
        if self.request_history.len() < limit {
            self.request_history.push_back(now);
            let oldest = self.request_history.front().copied().unwrap_or(now);
            RateLimitResult {
                allowed: true,
                remaining: (limit - self.request_history.len()) as u32,
                reset_time: oldest + config.window_ms,
                retry_after: None,
            }
        } else {
            let oldest = self.request_history.front().copied().unwrap_or(now);
            let reset_time = oldest + config.window_ms;
            RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_time,
                retry_after: Some(reset_time.saturating_sub(now).max(1)),
            }
        }
    }

    fn check_token_bucket(&mut self, now: u64, config: &RateLimitConfig) -> RateLimitResult {
        self.refill(now, config);

        let interval = self.token_interval_ms(config);
        let missing = config.bucket_capacity().saturating_sub(self.burst_tokens) as u64;

        if self.burst_tokens > 0 {
            self.burst_tokens -= 1;
            RateLimitResult {
                allowed: true,
                remaining: self.burst_tokens,
                reset_time: now + (missing + 1) * interval,
                retry_after: None,
            }
        } else {
            RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_time: now + missing * interval,
                retry_after: Some(self.next_token_in(config).max(1)),
            }
        }
    }

    fn recalculate(&mut self, now: u64, config: &RateLimitConfig) -> Option<AdaptiveAdjustment> {
        self.last_recalculation = now;

        let summary = adaptive::summarize(&self.behavior_pattern)?;
        let smoothed = adaptive::smooth(self.smoothed_success_rate, summary.success_rate);
        self.smoothed_success_rate = Some(smoothed);

        if let Some(last) = self.last_adjustment {
            if now.saturating_sub(last) < config.adjustment_cooldown_ms {
                return None;
            }
        }

        let from = self.adaptive_limit;
        let to = adaptive::next_limit(from, smoothed, &summary, config)?;
        self.adaptive_limit = to;
        self.last_adjustment = Some(now);
        Some(AdaptiveAdjustment { from, to })
    }
}

pub struct AdaptiveRateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<RateLimitState>,
}

impl AdaptiveRateLimiter {
    /// Fails if `config` does not validate; a zero window or limit has no
    /// meaningful rate.
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        config.validate()?;
        let now = clock.now_ms();
        let state = Mutex::new(RateLimitState::new(&config, now));
        Ok(Self {
            config,
            clock,
            state,
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, RateLimitState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admit or reject one request. Never fails; `allowed == false` is the
    /// only rejection signal.
    pub fn check_rate_limit(&self) -> RateLimitResult {
        let now = self.clock.now_ms();
        let mut state = self.state();

        if self.config.adaptive
            && now.saturating_sub(state.last_recalculation)
                >= ADAPTIVE_RECALC_INTERVAL.as_millis() as u64
        {
            if let Some(adj) = state.recalculate(now, &self.config) {
                info!("Adaptive rate limit adjusted: {} -> {}", adj.from, adj.to);
            }
        }

        state.total_requests += 1;
        let result = match self.config.algorithm {
            RateLimitAlgorithm::SlidingWindow => state.check_sliding_window(now, &self.config),
            RateLimitAlgorithm::TokenBucket => state.check_token_bucket(now, &self.config),
        };

        if result.allowed {
            state.allowed_requests += 1;
        } else {
            state.blocked_requests += 1;
            debug!(
                "Request blocked by rate limiter, retry after {:?}ms",
                result.retry_after
            );
        }
        result
    }

    /// Capacity left right now, without consuming any.
    pub fn remaining(&self) -> u32 {
        let now = self.clock.now_ms();
        let mut state = self.state();
        match self.config.algorithm {
            RateLimitAlgorithm::SlidingWindow => {
                state.prune(now, self.config.window_ms);
                (state.adaptive_limit as usize).saturating_sub(state.request_history.len()) as u32
            }
            RateLimitAlgorithm::TokenBucket => {
                state.refill(now, &self.config);
                state.burst_tokens
            }
        }
    }

    /// Record how an admitted request went.
    pub fn record_result(&self, success: bool) {
        let now = self.clock.now_ms();
        let mut state = self.state();
        state.behavior_pattern.push_back(BehaviorSample {
            timestamp: now,
            success,
        });
        while state.behavior_pattern.len() > MAX_BEHAVIOR_SAMPLES {
            state.behavior_pattern.pop_front();
        }
    }

    /// Re-evaluate the adaptive limit now. Returns the change, if any.
    pub fn recalculate_adaptive_limit(&self) -> Option<AdaptiveAdjustment> {
        if !self.config.adaptive {
            return None;
        }
        let now = self.clock.now_ms();
        let adjustment = self.state().recalculate(now, &self.config);
        if let Some(adj) = adjustment {
            info!("Adaptive rate limit adjusted: {} -> {}", adj.from, adj.to);
        }
        adjustment
    }

    pub fn adaptive_limit(&self) -> u32 {
        self.state().adaptive_limit
    }

    pub fn stats(&self) -> RateLimitStats {
        let state = self.state();
        RateLimitStats {
            total_requests: state.total_requests,
            allowed_requests: state.allowed_requests,
            blocked_requests: state.blocked_requests,
            adaptive_limit: state.adaptive_limit,
            success_rate: adaptive::summarize(&state.behavior_pattern).map(|s| s.success_rate),
            smoothed_success_rate: state.smoothed_success_rate,
        }
    }

    /// Forget all history and start over at the configured limit.
    pub fn reset(&self) {
        let now = self.clock.now_ms();
        *self.state() = RateLimitState::new(&self.config, now);
    }

    /// Recalculate the adaptive limit every 30 seconds until `shutdown`
    /// flips to `true` or its sender is dropped.
    pub fn spawn_adaptive_task(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ADAPTIVE_RECALC_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        limiter.recalculate_adaptive_limit();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Adaptive rate limit task stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}
