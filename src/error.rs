use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    ConfigError(#[from] std::io::Error),
    #[error("Parsing error: {0}")]
    ParsingError(#[from] toml::de::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Margin + tax + marketplace fee leave no room for the cost.
    #[error("Margin, tax and fee add up to {total_percent}%, which must stay below 100%")]
    InvalidMarginConfiguration { total_percent: f64 },
    #[error("Discount {0}% must be between 0 and 100")]
    InvalidDiscount(f64),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync endpoint returned HTTP {0}")]
    Http(u16),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),
    #[error("Sync item not found: {0}")]
    NotFound(String),
}
