//! WebSocket transport adapters
//!
//! Performs the HTTP upgrade and exposes the resulting stream as the
//! relay's [`FrameSource`]/[`FrameSink`] pair.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use crate::relay::{Frame, FrameSink, FrameSource, MessageKind, RelayError, RelayResult};

/// Path clients connect to
pub const WS_PATH: &str = "/ws";

type WsStream = WebSocketStream<TcpStream>;

/// Read half of an upgraded WebSocket
pub struct WsSource {
    inner: SplitStream<WsStream>,
}

/// Write half of an upgraded WebSocket
pub struct WsSink {
    inner: SplitSink<WsStream, Message>,
    closed: bool,
}

/// Upgrade a raw TCP stream to a WebSocket and split it.
///
/// Only requests for [`WS_PATH`] are accepted; anything else gets a 404.
pub async fn upgrade(stream: TcpStream) -> RelayResult<(WsSource, WsSink)> {
    let ws_stream = accept_hdr_async(stream, route_upgrade)
        .await
        .map_err(|e| RelayError::Upgrade(e.to_string()))?;
    let (sink, source) = ws_stream.split();

    Ok((
        WsSource { inner: source },
        WsSink {
            inner: sink,
            closed: false,
        },
    ))
}

fn route_upgrade(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == WS_PATH {
        return Ok(response);
    }

    let mut not_found = ErrorResponse::new(Some(format!(
        "no WebSocket endpoint at {}",
        request.uri().path()
    )));
    *not_found.status_mut() = StatusCode::NOT_FOUND;
    Err(not_found)
}

#[async_trait]
impl FrameSource for WsSource {
    async fn receive(&mut self) -> RelayResult<Option<Frame>> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(Frame::text(text))),
                Some(Ok(Message::Binary(data))) => return Ok(Some(Frame::binary(data))),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Pongs are queued by tungstenite itself
                    continue;
                }
                Some(Ok(Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(e)) => return Err(RelayError::TransportRead(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: &Frame) -> RelayResult<()> {
        let message = match frame.kind {
            MessageKind::Text => {
                let text = String::from_utf8(frame.payload.clone())
                    .map_err(|e| RelayError::TransportWrite(e.to_string()))?;
                Message::Text(text)
            }
            MessageKind::Binary => Message::Binary(frame.payload.clone()),
        };

        self.inner
            .send(message)
            .await
            .map_err(|e| RelayError::TransportWrite(e.to_string()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Best effort; the peer may already be gone.
        let _ = self.inner.close().await;
    }
}
