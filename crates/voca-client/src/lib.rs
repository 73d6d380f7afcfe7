//! Voice-room client engine.
//!
//! A [`Session`] joins one room on a signaling relay and keeps a full mesh
//! of peer connections with everyone else in it. Audio capture, playback,
//! and the WebRTC stack itself are supplied by the host through
//! [`HostEnvironment`]; this crate does the coordination.
//!
//! ```no_run
//! # async fn run(host: std::sync::Arc<dyn voca_client::HostEnvironment>) -> voca_common::Result<()> {
//! use voca_client::{EventKind, Session, SessionEvent};
//! use voca_config::SessionConfig;
//!
//! let config = SessionConfig::default().with_server_url("https://voca.vc");
//! let session = Session::create_room(config, host).await?;
//! let _sub = session.on(EventKind::PeerJoined, |event| {
//!     if let SessionEvent::PeerJoined { peer_id } = event {
//!         println!("{peer_id} joined");
//!     }
//! });
//! session.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod codec;
pub mod endpoint;
pub mod events;
pub mod host;
pub mod media;
pub mod reconnect;
pub mod room;
pub mod transport;

mod channel;
mod peer;
mod session;

#[cfg(test)]
mod testing;

pub use audio::{level_from_spectrum, AudioMonitor};
pub use codec::{SignalMessage, SignalPayload};
pub use events::{ConnectionStatus, EventKind, SessionEvent, Warning};
pub use host::{HostEnvironment, HostLocation};
pub use peer::{NegotiationRole, PeerSnapshot};
pub use reconnect::{ReconnectPolicy, MAX_RECONNECT_DELAY};
pub use room::{request_room, CreatedRoom};
pub use session::Session;
pub use transport::{Connector, TungsteniteConnector};
