//! Session engine: one client's membership in one room.
//!
//! A [`Session`] owns the microphone stream, the signaling channel and a
//! [`PeerUnit`](crate::peer) per remote participant. Subscribers observe
//! it through [`SessionEvent`]s, delivered synchronously in emission order.
//!
//! All mutable state sits behind one lock. The lock is never held while an
//! event is delivered or while awaiting, so listeners may call back into the
//! session (including [`Session::disconnect`]) from inside a callback.

mod dispatch;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use voca_common::{ErrorCode, EventBus, Result, Subscription, VocaError};
use voca_config::SessionConfig;

use crate::audio::AudioMonitor;
use crate::channel::{ChannelHandler, ChannelOptions, SignalSender, SignalingChannel};
use crate::codec::{CodecError, SignalMessage};
use crate::endpoint;
use crate::events::{ConnectionStatus, EventKind, SessionEvent, Warning};
use crate::host::HostEnvironment;
use crate::media::{AudioConstraints, CaptureError, MediaStream};
use crate::peer::{PeerSnapshot, PeerUnit};
use crate::reconnect::ReconnectPolicy;
use crate::room;

const NO_SERVER: &str = "server_url is required when the host has no location";

struct SessionState {
    status: ConnectionStatus,
    /// Set once `connect` has been called.
    started: bool,
    /// Set once `disconnect` has been called. Nothing restarts after this.
    closed: bool,
    should_reconnect: bool,
    local_peer_id: Option<String>,
    local_stream: Option<Arc<dyn MediaStream>>,
    local_monitor: Option<AudioMonitor>,
    local_level: f32,
    is_muted: bool,
    peers: HashMap<String, PeerUnit>,
    channel: Option<SignalingChannel>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            started: false,
            closed: false,
            should_reconnect: true,
            local_peer_id: None,
            local_stream: None,
            local_monitor: None,
            local_level: 0.0,
            is_muted: false,
            peers: HashMap::new(),
            channel: None,
        }
    }

    /// Hand over everything a connection attempt allocated.
    fn take_resources(&mut self) -> Resources {
        self.local_peer_id = None;
        self.local_level = 0.0;
        self.is_muted = false;
        Resources {
            channel: self.channel.take(),
            peers: std::mem::take(&mut self.peers),
            monitor: self.local_monitor.take(),
            stream: self.local_stream.take(),
        }
    }
}

/// Resources taken out of [`SessionState`], released after the lock is gone.
struct Resources {
    channel: Option<SignalingChannel>,
    peers: HashMap<String, PeerUnit>,
    monitor: Option<AudioMonitor>,
    stream: Option<Arc<dyn MediaStream>>,
}

impl Resources {
    /// Close the channel, tear down every peer, stop local sampling and the
    /// microphone. Returns whether a microphone stream was held.
    fn release(self) -> bool {
        if let Some(channel) = self.channel {
            channel.close();
        }
        for (peer_id, unit) in self.peers {
            debug!(peer_id = %peer_id, "Closing peer");
            drop(unit);
        }
        if let Some(mut monitor) = self.monitor {
            monitor.stop();
        }
        match self.stream {
            Some(stream) => {
                stop_tracks(&stream);
                true
            }
            None => false,
        }
    }
}

pub(crate) struct SessionInner {
    me: Weak<SessionInner>,
    room_id: String,
    config: SessionConfig,
    host: Arc<dyn HostEnvironment>,
    events: EventBus<SessionEvent>,
    signals: SignalSender,
    state: Mutex<SessionState>,
}

/// Handle to a voice session. Clones share the same session; the session
/// is released when the last handle is dropped.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// A session for `room_id` that has not connected yet.
    pub fn new(
        room_id: impl Into<String>,
        config: SessionConfig,
        host: Arc<dyn HostEnvironment>,
    ) -> Self {
        let room_id = room_id.into();
        let inner = Arc::new_cyclic(|me| SessionInner {
            me: me.clone(),
            room_id,
            config,
            host,
            events: EventBus::new(),
            signals: SignalSender::default(),
            state: Mutex::new(SessionState::new()),
        });
        Self { inner }
    }

    /// Ask the server for a new room and return an unconnected session for
    /// it. A password chosen by the server replaces the configured one.
    pub async fn create_room(
        config: SessionConfig,
        host: Arc<dyn HostEnvironment>,
    ) -> Result<Self> {
        let http_base =
            endpoint::http_base_url(config.server_url.as_deref(), host.location().as_ref())
                .ok_or_else(|| VocaError::with_message(ErrorCode::ConnectionFailed, NO_SERVER))?;

        let client = reqwest::Client::new();
        let created =
            room::request_room(&client, &http_base, config.api_key(), config.password()).await?;

        let mut config = config;
        if let Some(password) = created.password.filter(|p| !p.is_empty()) {
            config.password = Some(password);
        }
        Ok(Self::new(created.room, config, host))
    }

    pub fn room_id(&self) -> &str {
        &self.inner.room_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().status
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().is_muted
    }

    /// Our own id as assigned by the relay's `welcome`, once received.
    pub fn local_peer_id(&self) -> Option<String> {
        self.inner.lock().local_peer_id.clone()
    }

    /// Most recent level sampled from the microphone.
    pub fn local_audio_level(&self) -> f32 {
        self.inner.lock().local_level
    }

    pub fn local_stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.inner.lock().local_stream.clone()
    }

    pub fn peer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock().peers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn peers(&self) -> Vec<PeerSnapshot> {
        let mut peers: Vec<PeerSnapshot> =
            self.inner.lock().peers.values().map(PeerUnit::snapshot).collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    /// Listen for one kind of event.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, listener)
    }

    /// Listen for every event.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    /// Acquire the microphone and open the signaling channel.
    ///
    /// Failures are also published as an `Error` event with status
    /// `Error`. Calling this again while a connection is underway does
    /// nothing. Once an attempt has failed, or reconnection has given up,
    /// it starts over from a fresh capture. Calling it after
    /// [`disconnect`](Self::disconnect) fails.
    pub async fn connect(&self) -> Result<()> {
        let stale = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(VocaError::with_message(
                    ErrorCode::ConnectionFailed,
                    "session has been disconnected",
                ));
            }
            if state.started && state.status.is_live() {
                debug!(room_id = %self.inner.room_id, "Connect called twice, ignoring");
                return Ok(());
            }
            let stale = state.started.then(|| state.take_resources());
            state.started = true;
            stale
        };
        if let Some(stale) = stale {
            debug!(room_id = %self.inner.room_id, "Retrying connect");
            stale.release();
        }

        self.inner.set_status(ConnectionStatus::Connecting);
        let result = self.inner.start().await;
        if let Err(err) = &result {
            warn!(room_id = %self.inner.room_id, error = %err, "Failed to connect");
            self.inner.raise(err.clone());
        }
        result
    }

    /// Leave the room and release everything. Idempotent, and safe to call
    /// from inside an event listener.
    pub fn disconnect(&self) {
        self.inner.shutdown();
    }

    /// Flip the microphone's enabled flag. Returns whether we are now muted.
    /// Without a local audio track this does nothing.
    pub fn toggle_mute(&self) -> bool {
        let mut state = self.inner.lock();
        let track = state
            .local_stream
            .as_ref()
            .and_then(|stream| stream.audio_tracks().into_iter().next());
        if let Some(track) = track {
            track.set_enabled(!track.enabled());
            state.is_muted = !track.enabled();
            info!(muted = state.is_muted, "Microphone toggled");
        }
        state.is_muted
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Session")
            .field("room_id", &self.inner.room_id)
            .field("status", &state.status)
            .field("peers", &state.peers.len())
            .field("muted", &state.is_muted)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Engine internals
// ---------------------------------------------------------------------------

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        self.events.publish(&event);
    }

    fn warn(&self, warning: Warning) {
        self.emit(SessionEvent::Warning(warning));
    }

    /// Record and announce a status. Once the session has been shut down,
    /// nothing can move it out of `Disconnected`.
    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        {
            let mut state = self.lock();
            if state.closed && state.status == ConnectionStatus::Disconnected {
                return;
            }
            state.status = status;
        }
        info!(room_id = %self.room_id, %status, "Session status changed");
        self.emit(SessionEvent::Status(status));
    }

    /// Surface a domain error: room-full errors end in `Full`, everything
    /// else in `Error`.
    fn raise(&self, error: VocaError) {
        let status = if error.is_room_full() {
            ConnectionStatus::Full
        } else {
            ConnectionStatus::Error
        };
        self.set_status(status);
        self.emit(SessionEvent::Error(error));
    }

    async fn start(&self) -> Result<()> {
        // Resolve the endpoint first so a missing server never prompts for
        // the microphone.
        let ws_base =
            endpoint::ws_base_url(self.config.server_url.as_deref(), self.host.location().as_ref())
                .ok_or_else(|| VocaError::with_message(ErrorCode::ConnectionFailed, NO_SERVER))?;
        let url = endpoint::socket_url(
            &ws_base,
            &self.room_id,
            self.config.api_key(),
            self.config.password(),
        );

        let stream = self.acquire_microphone().await?;
        let mut monitor = self.start_local_monitor(&stream);

        let mut state = self.lock();
        if state.closed {
            drop(state);
            debug!(room_id = %self.room_id, "Disconnected while acquiring microphone");
            monitor.stop();
            stop_tracks(&stream);
            return Ok(());
        }

        state.local_stream = Some(stream);
        state.local_monitor = Some(monitor);

        let handler: Weak<dyn ChannelHandler> = self.me.clone();
        state.channel = Some(SignalingChannel::open(
            ChannelOptions {
                url,
                connector: self.host.connector(),
                policy: ReconnectPolicy::from(&self.config.reconnect),
                heartbeat_timeout: self.config.heartbeat_timeout(),
            },
            self.signals.clone(),
            handler,
        ));
        Ok(())
    }

    /// Ask for voice-tuned capture, then for any audio input at all.
    async fn acquire_microphone(&self) -> Result<Arc<dyn MediaStream>> {
        if !self.host.is_secure_context() {
            return Err(VocaError::new(ErrorCode::InsecureContext));
        }

        let capture = self.host.media_capture();
        match capture.capture_audio(Some(&AudioConstraints::voice())).await {
            Ok(stream) => return Ok(stream),
            Err(e) => debug!(error = %e, "Voice capture failed, retrying with defaults"),
        }

        capture.capture_audio(None).await.map_err(|e| match e {
            CaptureError::NotFound => VocaError::new(ErrorCode::MicrophoneNotFound),
            CaptureError::NotAllowed => VocaError::new(ErrorCode::MicrophonePermissionDenied),
            CaptureError::Other(message) => {
                VocaError::with_message(ErrorCode::ConnectionFailed, message)
            }
        })
    }

    fn start_local_monitor(&self, stream: &Arc<dyn MediaStream>) -> AudioMonitor {
        let analyser = self.host.audio_graph().analyser(stream);
        let me = self.me.clone();
        AudioMonitor::start(analyser, self.host.frame_interval(), move |level| {
            if let Some(inner) = me.upgrade() {
                inner.lock().local_level = level;
                inner.emit(SessionEvent::LocalAudioLevel { level });
            }
        })
    }

    /// Release everything the session holds. Returns false if it had
    /// already been shut down.
    fn release(&self) -> bool {
        let resources = {
            let mut state = self.lock();
            if state.closed && state.status == ConnectionStatus::Disconnected {
                return false;
            }
            state.closed = true;
            state.should_reconnect = false;
            state.take_resources()
        };

        if resources.release() {
            self.host.audio_graph().close();
        }
        true
    }

    fn shutdown(&self) {
        if self.release() {
            info!(room_id = %self.room_id, "Session disconnected");
            self.set_status(ConnectionStatus::Disconnected);
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(stream) = state.local_stream.take() {
            stop_tracks(&stream);
        }
    }
}

fn stop_tracks(stream: &Arc<dyn MediaStream>) {
    for track in stream.tracks() {
        track.stop();
    }
}

#[async_trait]
impl ChannelHandler for SessionInner {
    fn on_open(&self) {
        self.set_status(ConnectionStatus::Connected);
    }

    async fn on_message(&self, msg: SignalMessage) {
        self.dispatch(msg).await;
    }

    fn on_invalid_frame(&self, raw: &str, err: &CodecError) {
        warn!(error = %err, len = raw.len(), "Discarding invalid signaling frame");
        self.warn(Warning::new(ErrorCode::InvalidMessage, err.to_string()));
    }

    fn on_transport_error(&self, detail: &str) {
        // The close path decides about reconnection; the status stays put.
        self.emit(SessionEvent::Error(VocaError::with_message(
            ErrorCode::WebsocketError,
            detail,
        )));
    }

    fn on_heartbeat_timeout(&self, silence: Duration) {
        self.warn(Warning::new(
            ErrorCode::HeartbeatTimeout,
            format!("no message from the server for {}ms", silence.as_millis()),
        ));
    }

    fn status(&self) -> ConnectionStatus {
        self.lock().status
    }

    fn set_status(&self, status: ConnectionStatus) {
        SessionInner::set_status(self, status);
    }

    fn reconnect_permitted(&self) -> bool {
        let state = self.lock();
        state.should_reconnect && !state.closed
    }
}
