//! Configuration validation.
//!
//! Each check pushes a message onto a shared list; [`validate`] reports
//! them all at once in a single `ConfigError`.

mod password;


pub use password::{validate_password, PasswordRuleViolation};

use crate::schema::SessionConfig;
use voca_common::ConfigError;

const SERVER_SCHEMES: [&str; 4] = ["https://", "http://", "wss://", "ws://"];

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &SessionConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_server_url(&mut errors, config);
    validate_reconnect(&mut errors, config);
    validate_ice_servers(&mut errors, config);

    if let Some(password) = config.password() {
        if let Err(violation) = validate_password(password) {
            errors.push(format!("password: {violation}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_server_url(errors: &mut Vec<String>, config: &SessionConfig) {
    let Some(url) = config.server_url.as_deref() else {
        return;
    };
    match SERVER_SCHEMES.iter().find_map(|scheme| url.strip_prefix(scheme)) {
        None => errors.push(format!(
            "server_url = {url:?} must start with one of {}",
            SERVER_SCHEMES.join(", ")
        )),
        Some(rest) if rest.trim_matches('/').is_empty() => {
            errors.push(format!("server_url = {url:?} has no host"));
        }
        Some(_) => {}
    }
}

fn validate_reconnect(errors: &mut Vec<String>, config: &SessionConfig) {
    if config.reconnect.enabled && config.reconnect.base_delay_ms == 0 {
        errors.push("reconnect.base_delay_ms must be > 0".into());
    }
}

fn validate_ice_servers(errors: &mut Vec<String>, config: &SessionConfig) {
    for (i, server) in config.ice_servers.iter().enumerate() {
        if server.urls.is_empty() || server.urls.iter().any(|u| u.trim().is_empty()) {
            errors.push(format!("ice_servers[{i}].urls must not be empty"));
        }
    }
}
