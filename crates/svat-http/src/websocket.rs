//! WebSocket channel transport.

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use svat_core::Result;
use svat_core::error::{Error, TransportError};
use svat_core::traits::{ChannelConnection, ChannelEvent, ChannelSender, ChannelTransport};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens duplex channels over WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelTransport for WsTransport {
    async fn open(&self, url: &str) -> Result<ChannelConnection> {
        // The URL carries the access token; only log up to the query.
        let target = url.split('?').next().unwrap_or(url);
        info!(url = %target, "Opening WebSocket");

        let (socket, _) = connect_async(url).await.map_err(|e| {
            Error::Transport(TransportError::Connection {
                message: e.to_string(),
            })
        })?;

        debug!("WebSocket connected");
        let (write, mut read) = socket.split();

        let events = async_stream::stream! {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        yield ChannelEvent::Message(text.as_str().to_owned());
                    }
                    Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => yield ChannelEvent::Message(text),
                        Err(_) => trace!(len = data.len(), "Ignoring non-UTF-8 binary frame"),
                    },
                    Ok(Message::Close(frame)) => {
                        info!(?frame, "WebSocket closed by server");
                        yield ChannelEvent::Closed;
                        break;
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                        trace!("Received ping/pong");
                    }
                    Ok(Message::Frame(_)) => {}
                    Err(e) => {
                        warn!(error = %e, "WebSocket error");
                        yield ChannelEvent::Error(e.to_string());
                        break;
                    }
                }
            }
        };

        Ok(ChannelConnection::new(
            Box::new(WsSender { write }),
            Box::pin(events),
        ))
    }
}

struct WsSender {
    write: SplitSink<Socket, Message>,
}

#[async_trait]
impl ChannelSender for WsSender {
    async fn send(&mut self, payload: String) -> Result<()> {
        self.write
            .send(Message::text(payload))
            .await
            .map_err(|e| send_error(&e))
    }

    async fn close(&mut self) -> Result<()> {
        match self.write.close().await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::AlreadyClosed | tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(send_error(&e)),
        }
    }
}

fn send_error(e: &tungstenite::Error) -> Error {
    match e {
        tungstenite::Error::AlreadyClosed | tungstenite::Error::ConnectionClosed => {
            TransportError::Closed.into()
        }
        other => TransportError::Connection {
            message: other.to_string(),
        }
        .into(),
    }
}
