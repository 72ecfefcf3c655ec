pub mod error;
pub mod freshness;
pub mod metrics_api;
pub mod platform;
pub mod source;
pub mod types;
