use crate::config::read_env_or_file;
use crate::constants::{MAX_RETRIES, SYNC_INTERVAL};
use crate::sync::SyncServiceConfig;
use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SYNC_DATA_DIR: &str = "data";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    /// Directory holding the pending-sync snapshot and journal.
    pub data_dir: PathBuf,
    pub interval_secs: u64,
}

impl SyncConfig {
    pub fn service_config(&self) -> SyncServiceConfig {
        SyncServiceConfig {
            max_retries: MAX_RETRIES,
            sync_interval: Duration::from_secs(self.interval_secs),
            start_online: true,
        }
    }
}

pub fn load_sync_config() -> Result<SyncConfig> {
    dotenv().ok(); // .env is optional, variables may come from the environment

    build_sync_config(|name| match name {
        "AZURIA_SYNC_API_TOKEN" => read_env_or_file(name).ok(),
        _ => env::var(name).ok(),
    })
}

fn build_sync_config<F>(lookup: F) -> Result<SyncConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let base_url = lookup("AZURIA_SYNC_BASE_URL").context("AZURIA_SYNC_BASE_URL is not set")?;
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(anyhow::anyhow!(
            "AZURIA_SYNC_BASE_URL must be an http(s) URL, got '{}'",
            base_url
        ));
    }

    let api_token = lookup("AZURIA_SYNC_API_TOKEN").filter(|t| !t.is_empty());

    let data_dir = lookup("AZURIA_SYNC_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SYNC_DATA_DIR));

    let interval_secs = match lookup("AZURIA_SYNC_INTERVAL_SECS") {
        Some(raw) => {
            let secs = raw
                .parse::<u64>()
                .with_context(|| format!("AZURIA_SYNC_INTERVAL_SECS '{}' is not a number", raw))?;
            if secs == 0 {
                return Err(anyhow::anyhow!("AZURIA_SYNC_INTERVAL_SECS must be positive"));
            }
            secs
        }
        None => SYNC_INTERVAL.as_secs(),
    };

    Ok(SyncConfig {
        base_url,
        api_token,
        data_dir,
        interval_secs,
    })
}
