//! WebSocket transport for the signaling channel.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::tungstenite;

pub use tungstenite::Message;

pub type WsError = tungstenite::Error;
pub type MessageSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Opens signaling sockets.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(MessageSink, MessageStream), WsError>;
}

/// Default connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    pub connect_timeout: Duration,
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
        }
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<(MessageSink, MessageStream), WsError> {
        let (ws_stream, _) =
            match tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
                .await
            {
                Ok(result) => result?,
                Err(_elapsed) => {
                    return Err(WsError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("connection timed out after {:?}", self.connect_timeout),
                    )))
                }
            };

        let (sink, stream) = ws_stream.split();
        let sink: MessageSink = Box::pin(sink);
        let stream: MessageStream = Box::pin(stream);
        Ok((sink, stream))
    }
}
