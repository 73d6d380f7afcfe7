use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stable error codes shared with the signaling server.
///
/// Codes the server sends that this client does not know about are kept
/// verbatim in [`ErrorCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    // Room
    RoomNotFound,
    RoomFull,
    MaxRoomsReached,
    InvalidRoomId,

    // Connection
    ConnectionFailed,
    WebsocketError,
    HeartbeatTimeout,

    // Media
    MicrophoneNotFound,
    MicrophonePermissionDenied,
    InsecureContext,

    // Signaling
    InvalidMessage,
    PeerNotFound,

    // Password
    InvalidPassword,
    PasswordRequired,

    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::RoomNotFound => "room_not_found",
            Self::RoomFull => "room_full",
            Self::MaxRoomsReached => "max_rooms_reached",
            Self::InvalidRoomId => "invalid_room_id",
            Self::ConnectionFailed => "connection_failed",
            Self::WebsocketError => "websocket_error",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::MicrophoneNotFound => "microphone_not_found",
            Self::MicrophonePermissionDenied => "microphone_permission_denied",
            Self::InsecureContext => "insecure_context",
            Self::InvalidMessage => "invalid_message",
            Self::PeerNotFound => "peer_not_found",
            Self::InvalidPassword => "invalid_password",
            Self::PasswordRequired => "password_required",
            Self::Other(code) => code,
        }
    }

    /// Human-readable message used when the server does not supply one.
    pub fn default_message(&self) -> &str {
        match self {
            Self::RoomNotFound => "Room not found",
            Self::RoomFull => "Room is at maximum capacity",
            Self::MaxRoomsReached => "Maximum number of rooms reached",
            Self::InvalidRoomId => "Invalid room ID format",
            Self::ConnectionFailed => "Failed to connect to signaling server",
            Self::WebsocketError => "WebSocket connection error",
            Self::HeartbeatTimeout => "Connection lost due to heartbeat timeout",
            Self::MicrophoneNotFound => {
                "No microphone found. Please connect a microphone and try again."
            }
            Self::MicrophonePermissionDenied => {
                "Microphone permission denied. Please allow microphone access."
            }
            Self::InsecureContext => "HTTPS is required for microphone access",
            Self::InvalidMessage => "Invalid signaling message received",
            Self::PeerNotFound => "Peer not found in room",
            Self::InvalidPassword => "Incorrect password",
            Self::PasswordRequired => "This room requires a password",
            Self::Other(_) => "Unknown error",
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "room_not_found" => Self::RoomNotFound,
            "room_full" => Self::RoomFull,
            "max_rooms_reached" => Self::MaxRoomsReached,
            "invalid_room_id" => Self::InvalidRoomId,
            "connection_failed" => Self::ConnectionFailed,
            "websocket_error" => Self::WebsocketError,
            "heartbeat_timeout" => Self::HeartbeatTimeout,
            "microphone_not_found" => Self::MicrophoneNotFound,
            "microphone_permission_denied" => Self::MicrophonePermissionDenied,
            "insecure_context" => Self::InsecureContext,
            "invalid_message" => Self::InvalidMessage,
            "peer_not_found" => Self::PeerNotFound,
            "invalid_password" => Self::InvalidPassword,
            "password_required" => Self::PasswordRequired,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        Self::from(code.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain error: a stable code plus a message, either the code's default or
/// one supplied by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct VocaError {
    pub code: ErrorCode,
    pub message: String,
}

impl VocaError {
    pub fn new(code: ErrorCode) -> Self {
        let message = code.default_message().to_string();
        Self { code, message }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_room_full(&self) -> bool {
        self.code == ErrorCode::RoomFull
    }
}

impl From<ErrorCode> for VocaError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}
