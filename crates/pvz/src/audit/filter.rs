use std::path::Path;

use serde::Deserialize;
use shared::errors::ServiceError;
use tracing::warn;

#[derive(Debug, Default, Deserialize)]
pub struct AuditFilterConfig {
    #[serde(default)]
    pub stdout_filters: Vec<String>,
}

/// Loads the stdout filter list. An absent file means no filtering; a
/// malformed file is an error the caller downgrades to a warning.
pub fn load_filter_config(path: &str) -> Result<AuditFilterConfig, ServiceError> {
    if !Path::new(path).exists() {
        warn!("Audit filter file not found at {path}, printing all events");
        return Ok(AuditFilterConfig::default());
    }

    let raw = std::fs::read_to_string(path)?;
    let config = serde_json::from_str(&raw)?;

    Ok(config)
}
