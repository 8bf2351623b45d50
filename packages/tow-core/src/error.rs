//! error.rs — Error types for tow-core
//!
//! Only configuration and construction can fail. Everything on the per-cycle
//! path degrades to a neutral answer instead of returning an error.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid obstacle: {0}")]
    InvalidObstacle(String),

    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, TowError>;
