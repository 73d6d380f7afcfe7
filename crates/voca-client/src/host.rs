//! The environment a session runs in.
//!
//! Everything the engine would otherwise reach for globally (the page
//! location, the microphone, the audio graph, the WebRTC stack, the socket
//! implementation, the frame clock) comes through [`HostEnvironment`].

use std::sync::Arc;
use std::time::Duration;

use crate::audio::DEFAULT_FRAME_INTERVAL;
use crate::media::{AudioGraph, MediaCapture, PeerConnectionFactory};
use crate::transport::{Connector, TungsteniteConnector};

/// Where the host itself is served from, used when no server URL is
/// configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLocation {
    pub secure: bool,
    /// `host[:port]`
    pub host: String,
}

impl HostLocation {
    pub fn http_origin(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.host)
    }

    pub fn ws_origin(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}", self.host)
    }
}

pub trait HostEnvironment: Send + Sync {
    fn media_capture(&self) -> Arc<dyn MediaCapture>;
    fn audio_graph(&self) -> Arc<dyn AudioGraph>;
    fn peer_connections(&self) -> Arc<dyn PeerConnectionFactory>;

    fn location(&self) -> Option<HostLocation> {
        None
    }

    /// Whether microphone access is allowed at all.
    fn is_secure_context(&self) -> bool {
        true
    }

    fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(TungsteniteConnector::default())
    }

    /// Interval between audio level samples.
    fn frame_interval(&self) -> Duration {
        DEFAULT_FRAME_INTERVAL
    }
}
