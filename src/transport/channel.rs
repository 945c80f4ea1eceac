use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A message received on the control channel
#[derive(Debug, Clone)]
pub enum ChannelMessage {
    /// Control-protocol JSON text
    Control(String),
    /// Inbound media track samples (16-bit PCM)
    Media(Vec<i16>),
}

/// Bidirectional low-latency control channel to the remote endpoint
#[async_trait]
pub trait ControlChannel: Send {
    /// Send a serialized control message.
    ///
    /// Fails with `ChannelClosed` when the channel is no longer open; sends
    /// are never retried or queued.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Receive the next message. `None` means the channel is gone.
    async fn recv(&mut self) -> Option<ChannelMessage>;

    /// Close the channel. Closing an already-closed channel is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Production control channel over a websocket.
///
/// Text frames carry control JSON; binary frames carry the inbound media
/// track as little-endian PCM16.
pub struct WsControlChannel {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsControlChannel {
    /// Open the channel using the short-lived bearer credential.
    ///
    /// The session is considered active only once this returns.
    pub async fn open(url: &str, credential: &str) -> Result<Self> {
        let mut request = url
            .into_client_request()
            .map_err(|e| Error::Connect(e.to_string()))?;

        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {credential}")
                .parse()
                .map_err(|_| Error::Connect("invalid credential".into()))?,
        );

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;

        debug!(url, "control channel open");
        Ok(Self { ws })
    }
}

#[async_trait]
impl ControlChannel for WsControlChannel {
    async fn send(&mut self, text: String) -> Result<()> {
        self.ws
            .send(Message::Text(text))
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    async fn recv(&mut self) -> Option<ChannelMessage> {
        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(ChannelMessage::Control(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(ChannelMessage::Media(decode_pcm16(&bytes)))
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue, // ping/pong handled by the stream
                Err(e) => {
                    warn!(error = %e, "control channel receive error");
                    return None;
                }
            }
        }
        None
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.ws.close(None).await;
        Ok(())
    }
}

/// Derive the websocket endpoint from the negotiation base URL
pub fn ws_endpoint(base_url: &str, model: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_string()
    };
    let separator = if ws_base.contains('?') { '&' } else { '?' };
    format!("{ws_base}{separator}model={model}")
}

fn decode_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_endpoint_rewrites_scheme() {
        assert_eq!(
            ws_endpoint("https://api.example.com/v1/realtime", "model-x"),
            "wss://api.example.com/v1/realtime?model=model-x"
        );
        assert_eq!(
            ws_endpoint("http://localhost:9000/realtime", "m"),
            "ws://localhost:9000/realtime?model=m"
        );
    }

    #[test]
    fn ws_endpoint_appends_to_existing_query() {
        assert_eq!(
            ws_endpoint("https://api.example.com/v1/realtime?version=2", "model-x"),
            "wss://api.example.com/v1/realtime?version=2&model=model-x"
        );
    }

    #[test]
    fn pcm16_decode_is_little_endian() {
        assert_eq!(decode_pcm16(&[0x01, 0x00, 0xff, 0x7f]), vec![1, i16::MAX]);
    }
}
