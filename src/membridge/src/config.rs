use std::path::{Path, PathBuf};

use anyhow::Context;
use logger::LevelFilter;
use serde::{Deserialize, Serialize};

pub const LOG_LEVEL_ENV: &str = "MEMBRIDGE_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub socket_path: PathBuf,
    pub socket_mode: u32,
    pub chunk_size: usize,
    pub max_frame: u32,
    pub log_level: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/run/membridge.sock"),
            socket_mode: 0o600,
            chunk_size: platform::DEFAULT_CHUNK_SIZE,
            max_frame: 4096,
            log_level: None,
        }
    }
}

impl BridgeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {:?}", path))?;
        Self::from_json(&content).with_context(|| format!("failed to parse config {:?}", path))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// The environment wins over the file; neither set means logging is off.
    pub fn log_level(&self) -> LevelFilter {
        let env = std::env::var(LOG_LEVEL_ENV).ok();
        resolve_level(env.as_deref(), self.log_level.as_deref())
    }
}

fn resolve_level(env: Option<&str>, file: Option<&str>) -> LevelFilter {
    match env.or(file) {
        Some(level) => logger::parse_level(level),
        None => LevelFilter::Off,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = BridgeConfig::from_json(r#"{"socket_path": "/tmp/bridge.sock"}"#).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/bridge.sock"));
        assert_eq!(config.socket_mode, 0o600);
        assert_eq!(config.chunk_size, 64 << 10);
        assert_eq!(config.max_frame, 4096);
        assert_eq!(config.log_level, None);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(BridgeConfig::from_json("{socket_path").is_err());
        assert!(BridgeConfig::from_json(r#"{"chunk_size": "big"}"#).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = BridgeConfig::load("/nonexistent/membridge.json").unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }

    #[test]
    fn environment_overrides_file_level() {
        assert_eq!(resolve_level(Some("trace"), Some("warn")), LevelFilter::Trace);
        assert_eq!(resolve_level(None, Some("warn")), LevelFilter::Warn);
        assert_eq!(resolve_level(None, None), LevelFilter::Off);
        assert_eq!(resolve_level(Some("loud"), None), LevelFilter::Off);
    }
}
