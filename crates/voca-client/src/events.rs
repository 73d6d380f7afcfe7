//! Events a session publishes to its subscribers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use voca_common::{ErrorCode, NamedEvent, VocaError};

use crate::media::{MediaStream, MediaTrack};

/// Connection lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting,
    /// The room refused us for capacity. Terminal.
    Full,
    /// Unrecoverable failure. Terminal.
    Error,
    Disconnected,
}

impl ConnectionStatus {
    /// Terminal statuses never trigger reconnection.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Full | Self::Error)
    }

    /// A connection is being made or held.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Reconnecting)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Full => "full",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something went wrong but the session carries on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: ErrorCode,
    pub message: String,
}

impl Warning {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Clone)]
pub enum SessionEvent {
    Status(ConnectionStatus),
    Error(VocaError),
    Warning(Warning),
    PeerJoined {
        peer_id: String,
    },
    PeerLeft {
        peer_id: String,
    },
    PeerAudioLevel {
        peer_id: String,
        level: f32,
    },
    LocalAudioLevel {
        level: f32,
    },
    /// Remote media arrived; the UI may attach it to an output element.
    Track {
        peer_id: String,
        track: Arc<dyn MediaTrack>,
        stream: Arc<dyn MediaStream>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Status,
    Error,
    Warning,
    PeerJoined,
    PeerLeft,
    PeerAudioLevel,
    LocalAudioLevel,
    Track,
}

impl NamedEvent for SessionEvent {
    type Name = EventKind;

    fn name(&self) -> EventKind {
        match self {
            Self::Status(_) => EventKind::Status,
            Self::Error(_) => EventKind::Error,
            Self::Warning(_) => EventKind::Warning,
            Self::PeerJoined { .. } => EventKind::PeerJoined,
            Self::PeerLeft { .. } => EventKind::PeerLeft,
            Self::PeerAudioLevel { .. } => EventKind::PeerAudioLevel,
            Self::LocalAudioLevel { .. } => EventKind::LocalAudioLevel,
            Self::Track { .. } => EventKind::Track,
        }
    }
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => f.debug_tuple("Status").field(status).finish(),
            Self::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Self::Warning(warning) => f.debug_tuple("Warning").field(warning).finish(),
            Self::PeerJoined { peer_id } => {
                f.debug_struct("PeerJoined").field("peer_id", peer_id).finish()
            }
            Self::PeerLeft { peer_id } => f.debug_struct("PeerLeft").field("peer_id", peer_id).finish(),
            Self::PeerAudioLevel { peer_id, level } => f
                .debug_struct("PeerAudioLevel")
                .field("peer_id", peer_id)
                .field("level", level)
                .finish(),
            Self::LocalAudioLevel { level } => {
                f.debug_struct("LocalAudioLevel").field("level", level).finish()
            }
            Self::Track {
                peer_id,
                track,
                stream,
            } => f
                .debug_struct("Track")
                .field("peer_id", peer_id)
                .field("track", &track.id())
                .field("stream", &stream.id())
                .finish(),
        }
    }
}
