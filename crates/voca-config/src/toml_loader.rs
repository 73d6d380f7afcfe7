//! TOML config loading.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use voca_common::ConfigError;

use crate::schema::SessionConfig;
use crate::validation;

/// Parse a config from a TOML string. Missing fields take their defaults.
pub fn from_toml_str(content: &str) -> Result<SessionConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))
}

/// Load config from a specific TOML file path.
///
/// A config that parses but fails validation is rejected: a session built
/// from it could never connect.
pub fn load_from_path(path: &Path) -> Result<SessionConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config = from_toml_str(&content)?;
    if let Err(e) = validation::validate(&config) {
        warn!(path = %path.display(), "config validation failed: {e}");
        return Err(e);
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Platform config file location, e.g. `~/.config/voca/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))?;
    Ok(config_dir.join("voca").join("config.toml"))
}

/// Load the config from the platform location. No file there means
/// defaults.
pub fn load_config() -> Result<SessionConfig, ConfigError> {
    let path = default_config_path()?;
    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            debug!("no config at {}, using defaults", path.display());
            Ok(SessionConfig::default())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn empty_string_gives_defaults() {
        let config = from_toml_str("").unwrap();
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.ice_servers.len(), 2);
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config = from_toml_str(
            r#"
server_url = "wss://voca.vc"

[reconnect]
max_attempts = 3
"#,
        )
        .unwrap();
        assert_eq!(config.server_url.as_deref(), Some("wss://voca.vc"));
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.base_delay_ms, 1000);
        assert!(config.reconnect.enabled);
    }

    #[test]
    fn ice_servers_table_array() {
        let config = from_toml_str(
            r#"
[[ice_servers]]
urls = "stun:stun.example.org:3478"

[[ice_servers]]
urls = ["turn:turn.example.org:3478"]
username = "voca"
credential = "secret"
"#,
        )
        .unwrap();
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.ice_servers[1].credential.as_deref(), Some("secret"));
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = from_toml_str("server_url = [").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn default_path_is_under_voca() {
        if let Ok(path) = default_config_path() {
            assert!(path.ends_with("voca/config.toml"), "{}", path.display());
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let path = PathBuf::from("/tmp/nonexistent_voca_config_test.toml");
        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn loads_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voca.toml");
        std::fs::write(
            &path,
            r#"
server_url = "http://localhost:3001"
api_key = "test-key"
heartbeat_timeout_ms = 0
"#,
        )
        .unwrap();

        let config = load_from_path(&path).unwrap();
        assert_eq!(config.api_key(), Some("test-key"));
        assert_eq!(config.heartbeat_timeout(), None);
    }

    #[test]
    fn rejects_file_that_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voca.toml");
        std::fs::write(&path, "password = \"no!\"\n").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
