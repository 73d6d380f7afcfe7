//! Subcommand implementations. Each returns the text to print.

use std::path::Path;

use tracing::{debug, info};
use voca_client::endpoint;
use voca_common::{ConfigError, VocaError};
use voca_config::{validate_password, SessionConfig};

use crate::cli::ServerArgs;

pub const SERVER_URL_VAR: &str = "VOCA_SERVER_URL";
pub const API_KEY_VAR: &str = "VOCA_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Session(#[from] VocaError),
    #[error("no server configured: pass --server or set {SERVER_URL_VAR}")]
    NoServer,
    #[error("{0}")]
    InvalidPassword(String),
}

/// Config file, then environment, then flags. The result is validated.
pub fn resolve_config(
    path: Option<&Path>,
    flags: &ServerArgs,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SessionConfig, CliError> {
    let mut config = match path {
        Some(path) => voca_config::load_from_path(path)?,
        None => voca_config::load_config()?,
    };

    if let Some(url) = env(SERVER_URL_VAR).filter(|v| !v.is_empty()) {
        debug!("server_url taken from {SERVER_URL_VAR}");
        config.server_url = Some(url);
    }
    if let Some(key) = env(API_KEY_VAR).filter(|v| !v.is_empty()) {
        debug!("api_key taken from {API_KEY_VAR}");
        config.api_key = Some(key);
    }
    flags.apply(&mut config);

    voca_config::validate(&config)?;
    Ok(config)
}

fn room_socket_url(config: &SessionConfig, room: &str, password: Option<&str>) -> Result<String, CliError> {
    let ws_base = endpoint::ws_base_url(config.server_url.as_deref(), None).ok_or(CliError::NoServer)?;
    Ok(endpoint::socket_url(&ws_base, room, config.api_key(), password))
}

pub async fn create_room(config: &SessionConfig) -> Result<String, CliError> {
    let http_base =
        endpoint::http_base_url(config.server_url.as_deref(), None).ok_or(CliError::NoServer)?;
    let http = reqwest::Client::new();
    let created =
        voca_client::request_room(&http, &http_base, config.api_key(), config.password()).await?;

    let password = created
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .or(config.password());
    let url = room_socket_url(config, &created.room, password)?;
    info!(room_id = %created.room, "Room ready");

    let mut out = format!("room: {}\n", created.room);
    if let Some(password) = password {
        out.push_str(&format!("password: {password}\n"));
    }
    out.push_str(&format!("url: {url}"));
    Ok(out)
}

pub fn check_password(password: &str) -> Result<String, CliError> {
    validate_password(password)
        .map(|()| "ok".to_string())
        .map_err(|violation| CliError::InvalidPassword(violation.to_string()))
}

pub fn socket_url(config: &SessionConfig, room: &str) -> Result<String, CliError> {
    room_socket_url(config, room, config.password())
}
