//! Ledger service configuration, loaded from YAML (spec §9 ambient stack).
//!
//! Shaped after the teacher's `SentinelConfig`/`DatabaseConfig`
//! (`sentinel/config.rs`): plain `serde::Deserialize` structs, a `from_file`
//! constructor that reads the file and hands parse errors back through the
//! crate's own error type rather than `serde_yaml::Error` directly.

use serde::Deserialize;

use crate::error::LedgerError;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub log_dir: String,
    pub log_file: String,
    pub log_level: String,
    pub rotation: String,
    pub use_json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "./logs".to_string(),
            log_file: "ledger.log".to_string(),
            log_level: "info".to_string(),
            rotation: "daily".to_string(),
            use_json: false,
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self, LedgerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::IntegrityViolation(format!("reading config {path}: {e}")))?;
        serde_yaml::from_str(&content)
            .map_err(|e| LedgerError::IntegrityViolation(format!("parsing config {path}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_config() {
        let yaml = r#"
database:
  url: "postgres://localhost/ledger"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database.url, "postgres://localhost/ledger");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.log.log_level, "info");
    }

    #[test]
    fn deserializes_full_config() {
        let yaml = r#"
database:
  url: "postgres://localhost/ledger"
  max_connections: 25
log:
  log_dir: "/var/log/ledger"
  log_file: "ledger.log"
  log_level: "debug"
  rotation: "hourly"
  use_json: true
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database.max_connections, 25);
        assert_eq!(config.log.rotation, "hourly");
        assert!(config.log.use_json);
    }
}
