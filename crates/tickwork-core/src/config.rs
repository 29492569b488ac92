use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::AgentConfiguration;

pub const DEFAULT_LOG_FILTER: &str = "tickwork=info,tickwork_scheduler=info";

/// Top-level config (tickwork.toml + TICKWORK_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickworkConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Agents declared inline in the main config file.
    #[serde(default)]
    pub agents: Vec<AgentConfiguration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Optional external descriptor file whose `[[agents]]` entries override
    /// agents declared in code.
    #[serde(default)]
    pub descriptor: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            descriptor: None,
        }
    }
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl TickworkConfig {
    /// Load config from a TOML file with TICKWORK_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `TICKWORK_DAEMON__LOG_FILTER=debug`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(path = %path, "loading config");

        let config: TickworkConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TICKWORK_").split("__"))
            .extract()
            .map_err(|e| crate::error::TickworkError::Config(e.to_string()))?;

        Ok(config)
    }
}

/// Contents of an external agent descriptor file.
///
/// ```toml
/// [[agents]]
/// name = "nightly-report"
/// type = "cron"
/// task = "report"
/// schedule = "0 2 * * *"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptorFile {
    #[serde(default)]
    pub agents: Vec<AgentConfiguration>,
}

impl DescriptorFile {
    pub fn load(path: &str) -> crate::error::Result<Self> {
        if !std::path::Path::new(path).exists() {
            return Err(crate::error::TickworkError::Config(format!(
                "descriptor file not found: {path}"
            )));
        }
        debug!(path = %path, "loading agent descriptor");
        Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| crate::error::TickworkError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tickwork/tickwork.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_reads_daemon_and_inline_agents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[daemon]
log_filter = "debug"

[[agents]]
name = "heartbeat"
type = "timer"
task = "heartbeat"
schedule = "30 seconds"
"#
        )
        .unwrap();

        let config = TickworkConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.daemon.log_filter, "debug");
        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.agents[0].schedule(), "30 seconds");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = TickworkConfig::load(Some("/nonexistent/tickwork.toml")).unwrap();
        assert_eq!(config.daemon.log_filter, DEFAULT_LOG_FILTER);
        assert!(config.agents.is_empty());
    }

    #[test]
    fn descriptor_rejects_invalid_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[agents]]
name = ""
type = "timer"
task = "x"
"#
        )
        .unwrap();

        assert!(DescriptorFile::load(file.path().to_str().unwrap()).is_err());
        assert!(DescriptorFile::load("/nonexistent/agents.toml").is_err());
    }
}
