//! Capabilities consumed from the host's media stack.
//!
//! The engine never touches codecs, ICE traversal or audio devices
//! directly. It drives them through these traits, which a browser binding,
//! a native WebRTC stack, or a test fake implements.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use voca_config::IceServer;

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

pub trait MediaTrack: Send + Sync {
    fn id(&self) -> String;
    fn kind(&self) -> TrackKind;
    fn enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);
    fn stop(&self);
}

pub trait MediaStream: Send + Sync {
    fn id(&self) -> String;
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;

    fn audio_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks()
            .into_iter()
            .filter(|t| t.kind() == TrackKind::Audio)
            .collect()
    }
}

/// Processing hints for microphone capture.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub latency: f64,
    pub channel_count: u32,
}

impl AudioConstraints {
    /// Constraints tuned for voice chat: mono, processed, lowest latency.
    pub fn voice() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            latency: 0.0,
            channel_count: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("requested device not found")]
    NotFound,
    #[error("permission denied")]
    NotAllowed,
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Request an audio-only stream. `None` asks for any audio input at all.
    async fn capture_audio(
        &self,
        constraints: Option<&AudioConstraints>,
    ) -> Result<Arc<dyn MediaStream>, CaptureError>;
}

// ---------------------------------------------------------------------------
// Audio graph
// ---------------------------------------------------------------------------

/// A frequency-domain analysis node attached to a stream.
pub trait AudioAnalyser: Send + Sync {
    fn bin_count(&self) -> usize;
    /// Fill `out` with the current byte magnitudes, one per bin.
    fn frequency_data(&self, out: &mut [u8]);
    fn disconnect(&self) {}
}

/// A stream routed to the shared audio destination (the speakers).
pub trait AudioOutput: Send + Sync {
    fn disconnect(&self);
}

pub trait AudioGraph: Send + Sync {
    fn analyser(&self, stream: &Arc<dyn MediaStream>) -> Arc<dyn AudioAnalyser>;
    fn play(&self, stream: &Arc<dyn MediaStream>) -> Box<dyn AudioOutput>;
    fn close(&self) {}
}

// ---------------------------------------------------------------------------
// Peer connections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate in its JSON form, as carried inside `ice` signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Notifications a peer connection raises on its own.
pub enum PeerConnectionEvent {
    /// A local candidate was gathered and should be sent to the remote peer.
    IceCandidate(IceCandidate),
    /// The remote peer's media arrived.
    Track {
        track: Arc<dyn MediaTrack>,
        stream: Arc<dyn MediaStream>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("peer connection error: {0}")]
pub struct PeerConnectionError(pub String);

#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, PeerConnectionError>;
    async fn create_answer(&self) -> Result<SessionDescription, PeerConnectionError>;
    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), PeerConnectionError>;
    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), PeerConnectionError>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerConnectionError>;
    fn add_track(&self, track: Arc<dyn MediaTrack>, stream: Arc<dyn MediaStream>);
    fn close(&self);
}

pub type PeerConnectionEvents = mpsc::UnboundedReceiver<PeerConnectionEvent>;

pub trait PeerConnectionFactory: Send + Sync {
    fn create(
        &self,
        ice_servers: &[IceServer],
    ) -> Result<(Arc<dyn PeerConnection>, PeerConnectionEvents), PeerConnectionError>;
}
