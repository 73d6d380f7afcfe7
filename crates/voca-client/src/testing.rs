//! In-memory stand-ins for every host capability, for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use voca_config::IceServer;

use crate::codec::{self, SignalMessage};
use crate::host::{HostEnvironment, HostLocation};
use crate::media::{
    AudioAnalyser, AudioConstraints, AudioGraph, AudioOutput, CaptureError, IceCandidate,
    MediaCapture, MediaStream, MediaTrack, PeerConnection, PeerConnectionError,
    PeerConnectionEvent, PeerConnectionEvents, PeerConnectionFactory, SdpType,
    SessionDescription, TrackKind,
};
use crate::transport::{Connector, Message, MessageSink, MessageStream, WsError};

/// Let every runnable task reach its next wait point.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ---------------------------------------------------------------------------
// Tracks and streams
// ---------------------------------------------------------------------------

pub struct FakeTrack {
    id: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl FakeTrack {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

pub struct FakeStream {
    id: String,
    tracks: Vec<Arc<FakeTrack>>,
}

impl FakeStream {
    /// A stream with a single audio track.
    pub fn audio(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            tracks: vec![FakeTrack::new(&format!("{id}-audio"))],
        })
    }

    pub fn track(&self) -> Arc<FakeTrack> {
        Arc::clone(&self.tracks[0])
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn MediaTrack>)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

pub struct FakeCapture {
    stream: Arc<FakeStream>,
    failures: Mutex<VecDeque<CaptureError>>,
    requests: Mutex<Vec<Option<AudioConstraints>>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stream: FakeStream::audio("local"),
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        })
    }

    pub fn stream(&self) -> Arc<FakeStream> {
        Arc::clone(&self.stream)
    }

    /// Fail the next requests, in order, with these errors.
    pub fn fail_with(&self, errors: impl IntoIterator<Item = CaptureError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    /// Make every request wait until the returned notify fires.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn requests(&self) -> Vec<Option<AudioConstraints>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaCapture for FakeCapture {
    async fn capture_audio(
        &self,
        constraints: Option<&AudioConstraints>,
    ) -> Result<Arc<dyn MediaStream>, CaptureError> {
        self.requests.lock().unwrap().push(constraints.cloned());
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.stream.clone())
    }
}

// ---------------------------------------------------------------------------
// Audio graph
// ---------------------------------------------------------------------------

pub struct FakeAnalyser {
    value: u8,
    samples: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakeAnalyser {
    /// An analyser whose 128 bins always read `value`.
    pub fn new(value: u8) -> Arc<Self> {
        Arc::new(Self {
            value,
            samples: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    pub fn sample_count(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnect_count() > 0
    }
}

impl AudioAnalyser for FakeAnalyser {
    fn bin_count(&self) -> usize {
        128
    }

    fn frequency_data(&self, out: &mut [u8]) {
        out.fill(self.value);
        self.samples.fetch_add(1, Ordering::SeqCst);
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct FakeOutput {
    disconnected: Arc<AtomicBool>,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

impl AudioOutput for FakeOutput {
    fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

type PlayHook = Arc<dyn Fn() + Send + Sync>;

pub struct FakeAudioGraph {
    level: u8,
    analysers: Mutex<Vec<Arc<FakeAnalyser>>>,
    outputs: Mutex<Vec<FakeOutput>>,
    play_hook: Mutex<Option<PlayHook>>,
    closed: AtomicBool,
}

impl FakeAudioGraph {
    /// Every analyser this graph hands out reads `level` in each bin.
    pub fn new(level: u8) -> Arc<Self> {
        Arc::new(Self {
            level,
            analysers: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
            play_hook: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Run `hook` inside every `play` call, like a host that reports
    /// playback back to its embedder.
    pub fn on_play(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.play_hook.lock().unwrap() = Some(Arc::new(hook));
    }

    pub fn analysers(&self) -> Vec<Arc<FakeAnalyser>> {
        self.analysers.lock().unwrap().clone()
    }

    pub fn outputs(&self) -> Vec<FakeOutput> {
        self.outputs.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl AudioGraph for FakeAudioGraph {
    fn analyser(&self, _stream: &Arc<dyn MediaStream>) -> Arc<dyn AudioAnalyser> {
        let analyser = FakeAnalyser::new(self.level);
        self.analysers.lock().unwrap().push(Arc::clone(&analyser));
        analyser
    }

    fn play(&self, _stream: &Arc<dyn MediaStream>) -> Box<dyn AudioOutput> {
        let output = FakeOutput::new();
        self.outputs.lock().unwrap().push(output.clone());
        let hook = self.play_hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook();
        }
        Box::new(output)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Peer connections
// ---------------------------------------------------------------------------

pub struct FakePeerConnection {
    calls: Mutex<Vec<String>>,
    remote_sdp: Mutex<Option<String>>,
    candidates: Mutex<Vec<IceCandidate>>,
    tracks: AtomicUsize,
    closed: AtomicBool,
    fail_offers: AtomicBool,
    events: mpsc::UnboundedSender<PeerConnectionEvent>,
}

fn sdp_kind(kind: SdpType) -> &'static str {
    match kind {
        SdpType::Offer => "offer",
        SdpType::Answer => "answer",
    }
}

impl FakePeerConnection {
    pub fn new() -> (Arc<Self>, PeerConnectionEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let pc = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            remote_sdp: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            tracks: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            fail_offers: AtomicBool::new(false),
            events,
        });
        (pc, rx)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remote_sdp(&self) -> Option<String> {
        self.remote_sdp.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().unwrap().clone()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn fail_offers(&self) {
        self.fail_offers.store(true, Ordering::SeqCst);
    }

    /// Raise an event as if the WebRTC stack produced it.
    pub fn emit(&self, event: PeerConnectionEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription, PeerConnectionError> {
        self.record("create_offer");
        if self.fail_offers.load(Ordering::SeqCst) {
            return Err(PeerConnectionError("create offer failed".into()));
        }
        Ok(SessionDescription::offer("fake-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerConnectionError> {
        self.record("create_answer");
        Ok(SessionDescription::answer("fake-answer"))
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), PeerConnectionError> {
        self.record(format!("set_local:{}", sdp_kind(desc.kind)));
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), PeerConnectionError> {
        self.record(format!("set_remote:{}", sdp_kind(desc.kind)));
        *self.remote_sdp.lock().unwrap() = Some(desc.sdp);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerConnectionError> {
        self.record("add_ice");
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    fn add_track(&self, _track: Arc<dyn MediaTrack>, _stream: Arc<dyn MediaStream>) {
        self.tracks.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakePeerFactory {
    created: Mutex<Vec<Arc<FakePeerConnection>>>,
    fail_offers: AtomicBool,
}

impl FakePeerFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> Vec<Arc<FakePeerConnection>> {
        self.created.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<FakePeerConnection> {
        self.created().pop().expect("no peer connection created")
    }

    /// Connections created from now on fail to create offers.
    pub fn fail_offers(&self) {
        self.fail_offers.store(true, Ordering::SeqCst);
    }
}

impl PeerConnectionFactory for FakePeerFactory {
    fn create(
        &self,
        _ice_servers: &[IceServer],
    ) -> Result<(Arc<dyn PeerConnection>, PeerConnectionEvents), PeerConnectionError> {
        let (pc, events) = FakePeerConnection::new();
        if self.fail_offers.load(Ordering::SeqCst) {
            pc.fail_offers();
        }
        self.created.lock().unwrap().push(Arc::clone(&pc));
        let pc: Arc<dyn PeerConnection> = pc;
        Ok((pc, events))
    }
}

// ---------------------------------------------------------------------------
// Sockets
// ---------------------------------------------------------------------------

/// The relay's end of an in-memory socket.
pub struct ServerSocket {
    to_client: Option<mpsc::UnboundedSender<Result<Message, WsError>>>,
    from_client: mpsc::UnboundedReceiver<Message>,
}

impl ServerSocket {
    pub fn send(&self, msg: &SignalMessage) {
        let text = codec::encode(msg).unwrap();
        self.send_raw(&text);
    }

    pub fn send_json(&self, value: serde_json::Value) {
        self.send_raw(&value.to_string());
    }

    pub fn send_raw(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Ok(Message::Text(text.to_string().into())));
        }
    }

    /// Fail the socket with a transport error.
    pub fn fail(&mut self) {
        if let Some(tx) = self.to_client.take() {
            let _ = tx.send(Err(WsError::ConnectionClosed));
        }
    }

    /// End the stream as if the relay dropped the connection.
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }

    /// Every frame the client has written so far.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Decoded signals the client has written so far.
    pub fn drain_signals(&mut self) -> Vec<SignalMessage> {
        self.drain()
            .into_iter()
            .filter_map(|frame| match frame {
                Message::Text(text) => Some(codec::decode(&text).unwrap()),
                _ => None,
            })
            .collect()
    }
}

pub struct FakeConnector {
    attempts: AtomicUsize,
    refuse: AtomicBool,
    urls: Mutex<Vec<String>>,
    accepted_tx: mpsc::UnboundedSender<ServerSocket>,
    accepted_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerSocket>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            attempts: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            urls: Mutex::new(Vec::new()),
            accepted_tx,
            accepted_rx: tokio::sync::Mutex::new(accepted_rx),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    /// Refuse (or stop refusing) every connection attempt.
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// The relay side of the next accepted socket.
    pub async fn accept(&self) -> ServerSocket {
        self.accepted_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<(MessageSink, MessageStream), WsError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        if self.refuse.load(Ordering::SeqCst) {
            return Err(WsError::ConnectionClosed);
        }

        let (to_client, client_rx) = mpsc::unbounded_channel::<Result<Message, WsError>>();
        let (client_tx, from_client) = mpsc::unbounded_channel::<Message>();

        let sink = futures_util::sink::unfold(
            client_tx,
            |tx: mpsc::UnboundedSender<Message>, frame: Message| async move {
                match tx.send(frame) {
                    Ok(()) => Ok(tx),
                    Err(_) => Err(WsError::ConnectionClosed),
                }
            },
        );
        let stream = futures_util::stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        let _ = self.accepted_tx.send(ServerSocket {
            to_client: Some(to_client),
            from_client,
        });

        let sink: MessageSink = Box::pin(sink);
        let stream: MessageStream = Box::pin(stream);
        Ok((sink, stream))
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

pub struct FakeHost {
    pub capture: Arc<FakeCapture>,
    pub graph: Arc<FakeAudioGraph>,
    pub peers: Arc<FakePeerFactory>,
    pub connector: Arc<FakeConnector>,
    pub location: Option<HostLocation>,
    pub secure: bool,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            capture: FakeCapture::new(),
            graph: FakeAudioGraph::new(64),
            peers: FakePeerFactory::new(),
            connector: FakeConnector::new(),
            location: None,
            secure: true,
        }
    }
}

impl HostEnvironment for FakeHost {
    fn media_capture(&self) -> Arc<dyn MediaCapture> {
        self.capture.clone()
    }

    fn audio_graph(&self) -> Arc<dyn AudioGraph> {
        self.graph.clone()
    }

    fn peer_connections(&self) -> Arc<dyn PeerConnectionFactory> {
        self.peers.clone()
    }

    fn location(&self) -> Option<HostLocation> {
        self.location.clone()
    }

    fn is_secure_context(&self) -> bool {
        self.secure
    }

    fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }
}
