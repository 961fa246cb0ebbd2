pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod model;
pub mod pricing;
pub mod rate_limit;
pub mod sync;
pub mod ui;
