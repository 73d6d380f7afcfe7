//! Signaling channel: one logical connection to the relay that survives
//! socket drops by reopening with backoff.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{self, CodecError, SignalMessage};
use crate::events::ConnectionStatus;
use crate::reconnect::{ReconnectPolicy, ReconnectState};
use crate::transport::{Connector, Message, MessageSink, MessageStream, WsError};

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Cloneable handle for sending signals on whichever socket is currently
/// open. Sending while no socket is open drops the message.
#[derive(Clone, Default)]
pub struct SignalSender {
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
}

impl SignalSender {
    /// Queue `msg` on the open socket. Never blocks. Returns whether the
    /// message was accepted.
    pub fn send(&self, msg: &SignalMessage) -> bool {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = outbound.as_ref() else {
            debug!(kind = msg.payload.kind(), "Dropping signal, socket not open");
            return false;
        };
        match codec::encode(msg) {
            Ok(json) => tx.send(Message::Text(json.into())).is_ok(),
            Err(e) => {
                warn!(kind = msg.payload.kind(), error = %e, "Failed to encode signal");
                false
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn attach(&self, tx: mpsc::UnboundedSender<Message>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
    }

    fn detach(&self) -> Option<mpsc::UnboundedSender<Message>> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Send a close frame on the open socket, if any, and stop accepting
    /// messages.
    fn close(&self) {
        if let Some(tx) = self.detach() {
            let _ = tx.send(Message::Close(None));
        }
    }
}

impl std::fmt::Debug for SignalSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalSender")
            .field("open", &self.is_open())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// What the channel reports back to its owner.
#[async_trait]
pub(crate) trait ChannelHandler: Send + Sync {
    /// A socket opened and `hello` was queued.
    fn on_open(&self);
    async fn on_message(&self, msg: SignalMessage);
    fn on_invalid_frame(&self, raw: &str, err: &CodecError);
    fn on_transport_error(&self, detail: &str);
    /// Nothing arrived within the heartbeat window.
    fn on_heartbeat_timeout(&self, silence: Duration);
    fn status(&self) -> ConnectionStatus;
    fn set_status(&self, status: ConnectionStatus);
    /// Whether the owner still wants the channel to come back after a drop.
    fn reconnect_permitted(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

pub(crate) struct ChannelOptions {
    pub url: String,
    pub connector: Arc<dyn Connector>,
    pub policy: ReconnectPolicy,
    pub heartbeat_timeout: Option<Duration>,
}

/// A running signaling channel. Dropping it closes the channel.
pub(crate) struct SignalingChannel {
    sender: SignalSender,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl SignalingChannel {
    /// Spawn the connection loop. The handler is held weakly so the channel
    /// never keeps its owner alive.
    pub(crate) fn open(
        options: ChannelOptions,
        sender: SignalSender,
        handler: Weak<dyn ChannelHandler>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(connection_loop(
            options,
            sender.clone(),
            shutdown.clone(),
            handler,
        ));
        Self {
            sender,
            shutdown,
            task,
        }
    }

    /// Close the socket and cancel any pending reconnect. Idempotent.
    pub(crate) fn close(&self) {
        self.sender.close();
        self.shutdown.cancel();
        self.task.abort();
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.close();
    }
}

enum SocketEnd {
    /// The socket went away; the reconnect policy decides what happens next.
    Dropped,
    /// We were told to stop.
    Shutdown,
}

fn redacted(url: &str) -> &str {
    url.split('?').next().unwrap_or("")
}

async fn connection_loop(
    options: ChannelOptions,
    sender: SignalSender,
    shutdown: CancellationToken,
    handler: Weak<dyn ChannelHandler>,
) {
    let mut reconnect = ReconnectState::default();

    loop {
        info!(url = %redacted(&options.url), "Connecting to signaling server");

        let connected = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = options.connector.connect(&options.url) => result,
        };

        match connected {
            Ok((sink, mut stream)) => {
                let Some(owner) = handler.upgrade() else {
                    return;
                };
                let (tx, rx) = mpsc::unbounded_channel();
                let writer = tokio::spawn(write_frames(sink, rx));
                sender.attach(tx);
                sender.send(&SignalMessage::hello());
                owner.on_open();
                reconnect.reset();
                drop(owner);

                let end =
                    read_frames(&mut stream, &handler, options.heartbeat_timeout, &shutdown).await;
                sender.detach();
                if let SocketEnd::Shutdown = end {
                    return;
                }
                writer.abort();
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to signaling server");
                if let Some(owner) = handler.upgrade() {
                    owner.on_transport_error(&e.to_string());
                }
            }
        }

        if shutdown.is_cancelled() {
            return;
        }
        let Some(owner) = handler.upgrade() else {
            return;
        };

        let status = owner.status();
        if status.is_terminal() {
            debug!(%status, "Not reconnecting from terminal status");
            return;
        }

        match reconnect.next_delay(&options.policy, owner.reconnect_permitted()) {
            Some(delay) => {
                owner.set_status(ConnectionStatus::Reconnecting);
                drop(owner);
                info!(
                    attempt = reconnect.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Reconnecting to signaling server"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                info!(attempts = reconnect.attempts(), "Giving up on signaling server");
                owner.set_status(ConnectionStatus::Disconnected);
                return;
            }
        }
    }
}

async fn write_frames(mut sink: MessageSink, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(frame) = rx.recv().await {
        let closing = matches!(frame, Message::Close(_));
        if let Err(e) = sink.send(frame).await {
            debug!(error = %e, "Signaling write failed");
            break;
        }
        if closing {
            break;
        }
    }
}

async fn next_frame(
    stream: &mut MessageStream,
    heartbeat: Option<Duration>,
) -> Option<Option<Result<Message, WsError>>> {
    match heartbeat {
        Some(limit) => tokio::time::timeout(limit, stream.next()).await.ok(),
        None => Some(stream.next().await),
    }
}

async fn read_frames(
    stream: &mut MessageStream,
    handler: &Weak<dyn ChannelHandler>,
    heartbeat: Option<Duration>,
    shutdown: &CancellationToken,
) -> SocketEnd {
    loop {
        // A handler may close the channel mid-dispatch; queued frames must
        // not be handled after that.
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return SocketEnd::Shutdown,
            next = next_frame(stream, heartbeat) => next,
        };
        let Some(owner) = handler.upgrade() else {
            return SocketEnd::Shutdown;
        };

        match next {
            None => {
                let silence = heartbeat.unwrap_or_default();
                warn!(silence_ms = silence.as_millis() as u64, "Signaling server went silent");
                owner.on_heartbeat_timeout(silence);
                return SocketEnd::Dropped;
            }
            Some(Some(Ok(Message::Text(text)))) => match codec::decode(&text) {
                Ok(msg) => owner.on_message(msg).await,
                Err(e) => owner.on_invalid_frame(&text, &e),
            },
            Some(Some(Ok(Message::Close(frame)))) => {
                info!(?frame, "Signaling server closed connection");
                return SocketEnd::Dropped;
            }
            Some(Some(Ok(_))) => {}
            Some(Some(Err(e))) => {
                warn!(error = %e, "Signaling socket error");
                owner.on_transport_error(&e.to_string());
                return SocketEnd::Dropped;
            }
            Some(None) => {
                info!("Signaling socket ended");
                return SocketEnd::Dropped;
            }
        }
    }
}
