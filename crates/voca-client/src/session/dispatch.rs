//! Inbound signal handling.

use std::sync::Arc;

use tracing::{debug, info, warn};
use voca_common::{ErrorCode, VocaError};

use super::SessionInner;
use crate::audio::AudioMonitor;
use crate::codec::{SignalMessage, SignalPayload};
use crate::events::{SessionEvent, Warning};
use crate::media::{IceCandidate, MediaStream, MediaTrack, PeerConnection, SessionDescription};
use crate::peer::{self, NegotiationRole, PeerUnit};

impl SessionInner {
    /// Act on one decoded signal. Messages are handled one at a time, in
    /// arrival order.
    pub(super) async fn dispatch(&self, msg: SignalMessage) {
        let SignalMessage { from, payload } = msg;
        debug!(kind = payload.kind(), from = %from, "Signal received");

        match payload {
            SignalPayload::Welcome { version, peer_id } => {
                info!(?version, ?peer_id, "Signaling handshake complete");
                self.lock().local_peer_id = peer_id;
            }
            SignalPayload::Join { .. } => {
                if let Some(peer_id) = sender(&from, "join") {
                    self.add_peer(peer_id, NegotiationRole::Initiator, None).await;
                }
            }
            SignalPayload::Offer { sdp, .. } => {
                if let Some(peer_id) = sender(&from, "offer") {
                    self.add_peer(peer_id, NegotiationRole::Responder, Some(sdp)).await;
                }
            }
            SignalPayload::Answer { sdp, .. } => {
                let Some(connection) = self.connection_for(&from) else {
                    debug!(peer_id = %from, "Answer from unknown peer, ignoring");
                    return;
                };
                if let Err(e) = connection
                    .set_remote_description(SessionDescription::answer(sdp))
                    .await
                {
                    warn!(peer_id = %from, error = %e, "Failed to apply answer");
                    self.warn(Warning::new(
                        ErrorCode::ConnectionFailed,
                        format!("failed to apply answer from {from}: {e}"),
                    ));
                }
            }
            SignalPayload::Ice { candidate, .. } => {
                let Some(connection) = self.connection_for(&from) else {
                    debug!(peer_id = %from, "ICE candidate from unknown peer, ignoring");
                    return;
                };
                let candidate: IceCandidate = match serde_json::from_str(&candidate) {
                    Ok(candidate) => candidate,
                    Err(e) => {
                        warn!(peer_id = %from, error = %e, "Discarding malformed ICE candidate");
                        self.warn(Warning::new(
                            ErrorCode::InvalidMessage,
                            format!("malformed ICE candidate from {from}: {e}"),
                        ));
                        return;
                    }
                };
                if let Err(e) = connection.add_ice_candidate(candidate).await {
                    warn!(peer_id = %from, error = %e, "Failed to add ICE candidate");
                }
            }
            SignalPayload::Ping => {
                self.signals.send(&SignalMessage::pong());
            }
            SignalPayload::Leave { .. } => self.remove_peer(&from),
            SignalPayload::Error { code, message } => {
                let code = code.map_or(ErrorCode::Other("unknown".into()), ErrorCode::from);
                let message = message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| code.default_message().to_string());
                warn!(code = %code, message = %message, "Signaling server reported an error");
                self.raise(VocaError::with_message(code, message));
            }
            SignalPayload::Hello { .. } | SignalPayload::Pong => {}
        }
    }

    fn connection_for(&self, peer_id: &str) -> Option<Arc<dyn PeerConnection>> {
        self.lock().peers.get(peer_id).map(PeerUnit::connection)
    }

    /// Create the unit for a peer, announce it, then run our half of the
    /// offer/answer exchange. A unit already registered under the same id
    /// is torn down and replaced.
    async fn add_peer(&self, peer_id: &str, role: NegotiationRole, remote_offer: Option<String>) {
        let (connection, events) = match self
            .host
            .peer_connections()
            .create(&self.config.ice_servers)
        {
            Ok(pair) => pair,
            Err(e) => {
                warn!(peer_id, error = %e, "Failed to create peer connection");
                self.warn(Warning::new(
                    ErrorCode::ConnectionFailed,
                    format!("could not create a connection for {peer_id}: {e}"),
                ));
                return;
            }
        };

        let local_stream = self.lock().local_stream.clone();
        if let Some(stream) = &local_stream {
            for track in stream.tracks() {
                connection.add_track(track, Arc::clone(stream));
            }
        }

        let mut unit = PeerUnit::new(peer_id.to_string(), role, Arc::clone(&connection));
        let me = self.me.clone();
        let track_peer = peer_id.to_string();
        unit.set_events_task(peer::forward_events(
            peer_id.to_string(),
            events,
            self.signals.clone(),
            move |track, stream| {
                if let Some(inner) = me.upgrade() {
                    inner.on_remote_track(&track_peer, track, stream);
                }
            },
        ));

        let replaced = {
            let mut state = self.lock();
            if state.closed {
                None
            } else {
                Some(state.peers.insert(peer_id.to_string(), unit))
            }
        };
        let Some(replaced) = replaced else {
            debug!(peer_id, "Session closed, dropping new peer");
            return;
        };
        if replaced.is_some() {
            debug!(peer_id, "Replacing existing peer");
        }
        drop(replaced);

        info!(peer_id, ?role, "Peer joined");
        self.emit(SessionEvent::PeerJoined {
            peer_id: peer_id.to_string(),
        });

        if self.lock().closed {
            return;
        }
        if let Err(e) =
            peer::negotiate(&connection, peer_id, role, remote_offer, &self.signals).await
        {
            warn!(peer_id, ?role, error = %e, "Negotiation failed");
            self.warn(Warning::new(
                ErrorCode::ConnectionFailed,
                format!("negotiation with {peer_id} failed: {e}"),
            ));
        }
    }

    fn remove_peer(&self, peer_id: &str) {
        let removed = self.lock().peers.remove(peer_id);
        let Some(unit) = removed else {
            debug!(peer_id, "Leave for unknown peer, ignoring");
            return;
        };
        drop(unit);
        info!(peer_id, "Peer left");
        self.emit(SessionEvent::PeerLeft {
            peer_id: peer_id.to_string(),
        });
    }

    fn on_remote_track(
        &self,
        peer_id: &str,
        track: Arc<dyn MediaTrack>,
        stream: Arc<dyn MediaStream>,
    ) {
        if !self.lock().peers.contains_key(peer_id) {
            debug!(peer_id, "Track for unknown peer, ignoring");
            return;
        }

        // Host audio hooks may call back into the session: no lock here.
        let graph = self.host.audio_graph();
        let me = self.me.clone();
        let level_peer = peer_id.to_string();
        let monitor = AudioMonitor::start(
            graph.analyser(&stream),
            self.host.frame_interval(),
            move |level| {
                if let Some(inner) = me.upgrade() {
                    inner.on_peer_level(&level_peer, level);
                }
            },
        );
        let output = graph.play(&stream);

        let attached = {
            let mut state = self.lock();
            match state.peers.get_mut(peer_id) {
                Some(unit) => Ok(unit.attach_remote(Arc::clone(&stream), monitor, output)),
                None => Err((monitor, output)),
            }
        };
        match attached {
            Ok(previous) => previous.release(),
            Err((mut monitor, output)) => {
                debug!(peer_id, "Peer left while its audio was being attached");
                monitor.stop();
                output.disconnect();
                return;
            }
        }

        info!(peer_id, track_id = %track.id(), "Remote audio attached");
        self.emit(SessionEvent::Track {
            peer_id: peer_id.to_string(),
            track,
            stream,
        });
    }

    fn on_peer_level(&self, peer_id: &str, level: f32) {
        {
            let mut state = self.lock();
            let Some(unit) = state.peers.get_mut(peer_id) else {
                return;
            };
            unit.set_audio_level(level);
        }
        self.emit(SessionEvent::PeerAudioLevel {
            peer_id: peer_id.to_string(),
            level,
        });
    }
}

/// The relay stamps every forwarded message with its sender. A message
/// without one cannot be routed to a peer.
fn sender<'a>(from: &'a str, kind: &str) -> Option<&'a str> {
    if from.is_empty() {
        warn!(kind, "Signal without sender, ignoring");
        None
    } else {
        Some(from)
    }
}
