//! Websocket transport for the connection manager.
//!
//! Wraps a `tokio-tungstenite` client stream as a
//! [`CommandChannel`](crate::traits::CommandChannel). Only text frames carry
//! commands; binary frames are decoded as lossy UTF-8, and ping/pong is left
//! to tungstenite.

use futures_util::{SinkExt, StreamExt};
use log::debug;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::ConnectionError;
use crate::traits::{CommandChannel, Connector};

/// Opens websocket sessions with [`connect_async`].
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    type Channel = WsChannel;

    async fn connect(&mut self, url: &str) -> Result<WsChannel, ConnectionError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;
        debug!("Websocket handshake with {url}: {}", response.status());
        Ok(WsChannel { stream })
    }
}

/// One open websocket session.
#[derive(Debug)]
pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl CommandChannel for WsChannel {
    async fn recv(&mut self) -> Option<Result<String, ConnectionError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(ConnectionError::Transport(e.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Ok(text)),
                Message::Binary(data) => {
                    return Some(Ok(String::from_utf8_lossy(&data).into_owned()))
                }
                Message::Close(frame) => {
                    debug!("Close frame: {frame:?}");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn send(&mut self, frame: String) -> Result<(), ConnectionError> {
        debug!("-> {frame}");
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }
}
