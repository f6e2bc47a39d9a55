pub mod commands;
pub mod enrich;
pub mod analyze;
pub mod fetch;
pub mod progress;

pub use commands::{Cli, Commands};

use std::path::PathBuf;
use crate::config::{self, ToolConfig};
use crate::errors::KevError;

/// Load the YAML config if one was given, otherwise an empty one.
pub async fn load_config(path: Option<&str>) -> Result<ToolConfig, KevError> {
    match path {
        Some(p) => config::parse_config(&PathBuf::from(p)).await,
        None => Ok(ToolConfig::default()),
    }
}
