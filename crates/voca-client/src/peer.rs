//! Per-peer state: one peer connection plus the audio plumbing hanging off
//! its remote stream.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::audio::AudioMonitor;
use crate::channel::SignalSender;
use crate::codec::SignalMessage;
use crate::media::{
    AudioOutput, MediaStream, MediaTrack, PeerConnection, PeerConnectionError, PeerConnectionEvent,
    PeerConnectionEvents, SessionDescription,
};

/// Which side of the offer/answer exchange we play for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationRole {
    /// The peer joined after us, so we send the offer.
    Initiator,
    /// The peer sent us an offer.
    Responder,
}

/// Read-only view of a peer for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerSnapshot {
    pub id: String,
    pub role: NegotiationRole,
    pub audio_level: f32,
    pub has_stream: bool,
}

/// Owns everything allocated for one remote peer. Dropping the unit tears
/// all of it down.
pub(crate) struct PeerUnit {
    id: String,
    role: NegotiationRole,
    connection: Arc<dyn PeerConnection>,
    stream: Option<Arc<dyn MediaStream>>,
    audio_level: f32,
    monitor: Option<AudioMonitor>,
    output: Option<Box<dyn AudioOutput>>,
    events_task: Option<JoinHandle<()>>,
}

impl PeerUnit {
    pub(crate) fn new(id: String, role: NegotiationRole, connection: Arc<dyn PeerConnection>) -> Self {
        Self {
            id,
            role,
            connection,
            stream: None,
            audio_level: 0.0,
            monitor: None,
            output: None,
            events_task: None,
        }
    }

    pub(crate) fn connection(&self) -> Arc<dyn PeerConnection> {
        Arc::clone(&self.connection)
    }

    pub(crate) fn set_events_task(&mut self, task: JoinHandle<()>) {
        if let Some(previous) = self.events_task.replace(task) {
            previous.abort();
        }
    }

    pub(crate) fn set_audio_level(&mut self, level: f32) {
        self.audio_level = level;
    }

    /// Attach remote audio. Whatever was attached before is handed back
    /// so the caller can release it after dropping any lock it holds.
    pub(crate) fn attach_remote(
        &mut self,
        stream: Arc<dyn MediaStream>,
        monitor: AudioMonitor,
        output: Box<dyn AudioOutput>,
    ) -> RemoteAudio {
        self.stream = Some(stream);
        RemoteAudio {
            monitor: self.monitor.replace(monitor),
            output: self.output.replace(output),
        }
    }

    pub(crate) fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            id: self.id.clone(),
            role: self.role,
            audio_level: self.audio_level,
            has_stream: self.stream.is_some(),
        }
    }

    fn detach_audio(&mut self) {
        RemoteAudio {
            monitor: self.monitor.take(),
            output: self.output.take(),
        }
        .release();
    }
}

/// Remote audio taken off a [`PeerUnit`], not yet released.
#[must_use = "call `release` to stop the monitor and silence the output"]
pub(crate) struct RemoteAudio {
    monitor: Option<AudioMonitor>,
    output: Option<Box<dyn AudioOutput>>,
}

impl RemoteAudio {
    pub(crate) fn release(self) {
        if let Some(mut monitor) = self.monitor {
            monitor.stop();
        }
        if let Some(output) = self.output {
            output.disconnect();
        }
    }
}

impl Drop for PeerUnit {
    fn drop(&mut self) {
        debug!(peer_id = %self.id, "Tearing down peer");
        self.detach_audio();
        if let Some(task) = self.events_task.take() {
            task.abort();
        }
        self.connection.close();
    }
}

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

/// Run our half of the offer/answer exchange. Initiators send an offer;
/// responders apply `remote_offer` and send an answer.
pub(crate) async fn negotiate(
    connection: &Arc<dyn PeerConnection>,
    peer_id: &str,
    role: NegotiationRole,
    remote_offer: Option<String>,
    signals: &SignalSender,
) -> Result<(), PeerConnectionError> {
    match role {
        NegotiationRole::Initiator => {
            let offer = connection.create_offer().await?;
            connection.set_local_description(offer.clone()).await?;
            signals.send(&SignalMessage::offer(peer_id, offer.sdp));
        }
        NegotiationRole::Responder => {
            let Some(sdp) = remote_offer else {
                return Err(PeerConnectionError("responder has no remote offer".into()));
            };
            connection
                .set_remote_description(SessionDescription::offer(sdp))
                .await?;
            let answer = connection.create_answer().await?;
            connection.set_local_description(answer.clone()).await?;
            signals.send(&SignalMessage::answer(peer_id, answer.sdp));
        }
    }
    Ok(())
}

/// Pump a peer connection's own events: gathered candidates go out as
/// `ice` signals, remote tracks go to `on_track`.
pub(crate) fn forward_events<F>(
    peer_id: String,
    mut events: PeerConnectionEvents,
    signals: SignalSender,
    on_track: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<dyn MediaTrack>, Arc<dyn MediaStream>) + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PeerConnectionEvent::IceCandidate(candidate) => {
                    match serde_json::to_string(&candidate) {
                        Ok(json) => {
                            signals.send(&SignalMessage::ice(&peer_id, json));
                        }
                        Err(e) => warn!(peer_id = %peer_id, error = %e, "Failed to encode ICE candidate"),
                    }
                }
                PeerConnectionEvent::Track { track, stream } => on_track(track, stream),
            }
        }
        debug!(peer_id = %peer_id, "Peer connection events ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAnalyser, FakeOutput, FakePeerConnection, FakeStream};
    use crate::audio::DEFAULT_FRAME_INTERVAL;

    #[tokio::test]
    async fn initiator_offers() {
        let (pc, _events) = FakePeerConnection::new();
        let connection: Arc<dyn PeerConnection> = pc.clone();
        let signals = SignalSender::default();

        negotiate(&connection, "peer-b", NegotiationRole::Initiator, None, &signals)
            .await
            .unwrap();
        assert_eq!(pc.calls(), vec!["create_offer", "set_local:offer"]);
    }

    #[tokio::test]
    async fn responder_answers_the_remote_offer() {
        let (pc, _events) = FakePeerConnection::new();
        let connection: Arc<dyn PeerConnection> = pc.clone();
        let signals = SignalSender::default();

        negotiate(
            &connection,
            "peer-a",
            NegotiationRole::Responder,
            Some("remote-sdp".into()),
            &signals,
        )
        .await
        .unwrap();
        assert_eq!(
            pc.calls(),
            vec!["set_remote:offer", "create_answer", "set_local:answer"]
        );
        assert_eq!(pc.remote_sdp().as_deref(), Some("remote-sdp"));
    }

    #[tokio::test]
    async fn negotiation_failure_propagates() {
        let (pc, _events) = FakePeerConnection::new();
        pc.fail_offers();
        let connection: Arc<dyn PeerConnection> = pc.clone();

        let err = negotiate(
            &connection,
            "peer-b",
            NegotiationRole::Initiator,
            None,
            &SignalSender::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("offer"));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_unit_releases_everything() {
        let (pc, _events) = FakePeerConnection::new();
        let mut unit = PeerUnit::new("peer-b".into(), NegotiationRole::Initiator, pc.clone());

        let analyser = FakeAnalyser::new(32);
        let output = FakeOutput::new();
        unit.attach_remote(
            FakeStream::audio("remote"),
            AudioMonitor::start(analyser.clone(), DEFAULT_FRAME_INTERVAL, |_| {}),
            Box::new(output.clone()),
        )
        .release();
        assert!(unit.snapshot().has_stream);

        drop(unit);
        assert!(pc.is_closed());
        assert!(analyser.is_disconnected());
        assert!(output.is_disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn reattaching_replaces_the_previous_monitor() {
        let (pc, _events) = FakePeerConnection::new();
        let mut unit = PeerUnit::new("peer-a".into(), NegotiationRole::Responder, pc);

        let first = FakeAnalyser::new(10);
        let first_output = FakeOutput::new();
        unit.attach_remote(
            FakeStream::audio("one"),
            AudioMonitor::start(first.clone(), DEFAULT_FRAME_INTERVAL, |_| {}),
            Box::new(first_output.clone()),
        )
        .release();
        let second = FakeAnalyser::new(20);
        let previous = unit.attach_remote(
            FakeStream::audio("two"),
            AudioMonitor::start(second.clone(), DEFAULT_FRAME_INTERVAL, |_| {}),
            Box::new(FakeOutput::new()),
        );
        assert!(!first_output.is_disconnected());

        previous.release();
        assert!(first.is_disconnected());
        assert!(first_output.is_disconnected());
        assert!(!second.is_disconnected());
    }
}
