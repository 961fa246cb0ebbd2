use self::calculation::CalculationConfig;
use crate::error::AppError;
use anyhow::{anyhow, Context};
use std::env;
use std::fs;

pub mod calculation;
pub mod creator;
pub mod rate_limit;
pub mod sync;

#[cfg(test)]
mod test_secrets;

pub fn load_config(path: &str) -> Result<CalculationConfig, AppError> {
    let content = fs::read_to_string(path)?;
    let config: CalculationConfig = toml::from_str(&content)?;
    config
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    Ok(config)
}

/// Reads `NAME` from the environment, falling back to the file named by `NAME_FILE`.
pub fn read_env_or_file(name: &str) -> anyhow::Result<String> {
    if let Ok(value) = env::var(name) {
        return Ok(value);
    }

    let file_var = format!("{}_FILE", name);
    match env::var(&file_var) {
        Ok(path) => {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {} at {}", file_var, path))?;
            Ok(content.trim().to_string())
        }
        Err(_) => Err(anyhow!("Neither {} nor {} is set", name, file_var)),
    }
}
