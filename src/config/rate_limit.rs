use crate::constants::DEFAULT_ADJUSTMENT_COOLDOWN_MS;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitAlgorithm {
    #[default]
    SlidingWindow,
    TokenBucket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Extra tokens the bucket may hold above `max_requests`.
    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: u32,

    #[serde(default)]
    pub algorithm: RateLimitAlgorithm,

    /// Let observed success/failure move the effective limit.
    #[serde(default = "default_adaptive")]
    pub adaptive: bool,

    /// Minimum time between two adaptive adjustments.
    #[serde(default = "default_adjustment_cooldown_ms")]
    pub adjustment_cooldown_ms: u64,
}

fn default_max_requests() -> u32 {
    60
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_burst_capacity() -> u32 {
    10
}

fn default_adaptive() -> bool {
    true
}

fn default_adjustment_cooldown_ms() -> u64 {
    DEFAULT_ADJUSTMENT_COOLDOWN_MS
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            burst_capacity: default_burst_capacity(),
            algorithm: RateLimitAlgorithm::default(),
            adaptive: default_adaptive(),
            adjustment_cooldown_ms: default_adjustment_cooldown_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_requests == 0 {
            return Err(anyhow::anyhow!("max_requests must be greater than 0."));
        }
        if self.window_ms == 0 {
            return Err(anyhow::anyhow!("window_ms must be greater than 0."));
        }
        Ok(())
    }

    /// Nominal spacing between requests at the configured rate.
    pub fn nominal_interval_ms(&self) -> f64 {
        self.window_ms as f64 / self.max_requests as f64
    }

    pub fn bucket_capacity(&self) -> u32 {
        self.max_requests.saturating_add(self.burst_capacity)
    }
}

/// Load rate limit configuration from a JSON file.
///
/// Resolution order:
/// 1. Explicit path argument
/// 2. AZURIA_RATE_LIMIT_CONFIG_FILE environment variable
/// 3. Default: "rate_limit.json" in current directory
///
/// A missing or invalid file yields the default configuration.
pub fn load_rate_limit_config(path: Option<&str>) -> RateLimitConfig {
    let config_path = path
        .map(String::from)
        .or_else(|| env::var("AZURIA_RATE_LIMIT_CONFIG_FILE").ok())
        .unwrap_or_else(|| "rate_limit.json".to_string());

    if !Path::new(&config_path).exists() {
        log::info!(
            "Rate limit config not found at '{}', using defaults",
            config_path
        );
        return RateLimitConfig::default();
    }

    let content = match fs::read_to_string(&config_path) {
        Ok(content) => content,
        Err(e) => {
            log::warn!(
                "Failed to read rate limit config from '{}': {}. Using defaults.",
                config_path,
                e
            );
            return RateLimitConfig::default();
        }
    };

    let mut json = match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(json) => json,
        Err(e) => {
            log::warn!(
                "Failed to parse JSON from '{}': {}. Using defaults.",
                config_path,
                e
            );
            return RateLimitConfig::default();
        }
    };

    // Comment keys start with "//"
    if let Some(obj) = json.as_object_mut() {
        obj.retain(|k, _| !k.starts_with("//"));
    }

    match serde_json::from_value::<RateLimitConfig>(json) {
        Ok(config) => match config.validate() {
            Ok(()) => {
                log::info!("Loaded rate limit config from '{}'", config_path);
                config
            }
            Err(e) => {
                log::warn!("Invalid rate limit config in '{}': {}. Using defaults.", config_path, e);
                RateLimitConfig::default()
            }
        },
        Err(e) => {
            log::warn!(
                "Failed to parse rate limit config from '{}': {}. Using defaults.",
                config_path,
                e
            );
            RateLimitConfig::default()
        }
    }
}
