//! Socket abstraction under the channel loop.

use crate::error::{ChannelError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Frames the channel cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
    /// Ping, pong and binary frames.
    Other,
}

/// One open socket.
#[async_trait]
pub trait StreamTransport: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// `None` once the peer has gone away.
    async fn next_frame(&mut self) -> Option<Result<Frame>>;

    async fn close(&mut self);
}

/// Opens sockets for the channel loop.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn open(&self, url: &Url) -> Result<Box<dyn StreamTransport>>;
}

#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    pub connect_timeout: Duration,
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl StreamConnector for TungsteniteConnector {
    async fn open(&self, url: &Url) -> Result<Box<dyn StreamTransport>> {
        let (stream, _response) = timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                ChannelError::Timeout(format!(
                    "connection timeout after {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(|error| ChannelError::WebSocket(error.to_string()))?;
        Ok(Box::new(TungsteniteTransport { stream }))
    }
}

struct TungsteniteTransport {
    stream: WsStream,
}

#[async_trait]
impl StreamTransport for TungsteniteTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| ChannelError::WebSocket(error.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        let frame = self.stream.next().await?;
        Some(match frame {
            Ok(Message::Text(text)) => Ok(Frame::Text(text.to_string())),
            Ok(Message::Close(_)) => Ok(Frame::Close),
            Ok(_) => Ok(Frame::Other),
            Err(error) => Err(ChannelError::WebSocket(error.to_string())),
        })
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
