use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// Configuration for one room session.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Signaling server, e.g. `ws://localhost:3001` or `https://voca.vc`.
    /// When absent, the host environment's location is used.
    pub server_url: Option<String>,
    /// Optional API key for signaling server auth.
    pub api_key: Option<String>,
    /// Optional password for protected rooms.
    pub password: Option<String>,
    /// STUN/TURN servers handed to every peer connection.
    pub ice_servers: Vec<IceServer>,
    /// Automatic reconnection of the signaling socket.
    pub reconnect: ReconnectConfig,
    /// Treat the socket as dead after this long without an inbound frame.
    /// `0` disables the watchdog.
    pub heartbeat_timeout_ms: u64,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("server_url", &self.server_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("ice_servers", &self.ice_servers)
            .field("reconnect", &self.reconnect)
            .field("heartbeat_timeout_ms", &self.heartbeat_timeout_ms)
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            password: None,
            ice_servers: IceServer::default_stun(),
            reconnect: ReconnectConfig::default(),
            heartbeat_timeout_ms: 45_000,
        }
    }
}

impl SessionConfig {
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn heartbeat_timeout(&self) -> Option<Duration> {
        (self.heartbeat_timeout_ms > 0).then(|| Duration::from_millis(self.heartbeat_timeout_ms))
    }

    /// The configured password, treating an empty string as none.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// The configured API key, treating an empty string as none.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// Reconnection options. Enabled by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            base_delay_ms: 1000,
        }
    }
}

/// A STUN or TURN server. `urls` accepts a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// Google's public STUN servers.
    pub fn default_stun() -> Vec<Self> {
        vec![
            Self::stun("stun:stun.l.google.com:19302"),
            Self::stun("stun:stun1.l.google.com:19302"),
        ]
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}
