//! Wire format for signaling messages.
//!
//! Every frame is a JSON object with a `from` field and a `type` tag; the
//! remaining fields depend on the tag. The relay overwrites `from` on
//! everything it forwards, so outbound messages leave it empty.

use serde::{Deserialize, Serialize};

/// Protocol version announced in `hello`.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Client identifier announced in `hello`.
pub const CLIENT_ID: &str = concat!("voca-client-rs/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    #[serde(default)]
    pub from: String,
    #[serde(flatten)]
    pub payload: SignalPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalPayload {
    /// Client handshake, sent once per socket open.
    Hello { version: String, client: String },
    /// Server handshake acknowledgment with our assigned peer id.
    Welcome {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<String>,
    },
    Join {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<String>,
    },
    Leave {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<String>,
    },
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        sdp: String,
    },
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        sdp: String,
    },
    /// `candidate` is itself a JSON-encoded ICE candidate.
    Ice {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        candidate: String,
    },
    Ping,
    Pong,
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl SignalPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Welcome { .. } => "welcome",
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Ice { .. } => "ice",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
        }
    }
}

impl SignalMessage {
    fn outbound(payload: SignalPayload) -> Self {
        Self {
            from: String::new(),
            payload,
        }
    }

    pub fn hello() -> Self {
        Self::outbound(SignalPayload::Hello {
            version: PROTOCOL_VERSION.to_string(),
            client: CLIENT_ID.to_string(),
        })
    }

    pub fn pong() -> Self {
        Self::outbound(SignalPayload::Pong)
    }

    pub fn offer(to: &str, sdp: String) -> Self {
        Self::outbound(SignalPayload::Offer {
            to: Some(to.to_string()),
            sdp,
        })
    }

    pub fn answer(to: &str, sdp: String) -> Self {
        Self::outbound(SignalPayload::Answer {
            to: Some(to.to_string()),
            sdp,
        })
    }

    pub fn ice(to: &str, candidate: String) -> Self {
        Self::outbound(SignalPayload::Ice {
            to: Some(to.to_string()),
            candidate,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed signaling frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn decode(text: &str) -> Result<SignalMessage, CodecError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode(msg: &SignalMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}
