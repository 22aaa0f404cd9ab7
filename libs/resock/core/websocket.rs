//! WebSocket transport
//!
//! Each [`TransportFactory::open`] call spawns one task owning one
//! `tokio-tungstenite` stream. The returned handle forwards sends and the
//! close request to it over a channel; the task reports back through the
//! [`TransportSink`] and always finishes with exactly one close event.

use crate::core::connection_state::AtomicReadyState;
use crate::traits::*;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// How long a locally started close waits for the peer's close frame
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Code reported when the peer closed without giving one
const NO_STATUS_RECEIVED: u16 = 1005;

/// Factory opening real WebSocket connections
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl TransportFactory for WebSocketTransport {
    fn open(&self, url: &str, protocols: &[String], sink: TransportSink) -> Box<dyn Transport> {
        let state = Arc::new(AtomicReadyState::new(ReadyState::Connecting));
        let (tx, rx) = unbounded_channel();

        tokio::spawn(run_socket(
            url.to_string(),
            protocols.to_vec(),
            Arc::clone(&state),
            rx,
            sink,
        ));

        Box::new(WebSocketHandle { state, tx })
    }
}

enum Outgoing {
    Payload(Payload),
    Close,
}

/// Driver-side handle of one socket task
struct WebSocketHandle {
    state: Arc<AtomicReadyState>,
    tx: UnboundedSender<Outgoing>,
}

impl Transport for WebSocketHandle {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send(&mut self, payload: Payload) -> Result<()> {
        let state = self.state.get();
        if state != ReadyState::Open {
            return Err(SocketError::NotOpen(state.code()));
        }
        self.tx
            .send(Outgoing::Payload(payload))
            .map_err(|_| SocketError::ChannelSend("socket task has stopped".to_string()))
    }

    fn close(&mut self) {
        // Only the first request counts; the task reports the close
        let claimed = self
            .state
            .compare_exchange(ReadyState::Connecting, ReadyState::Closing)
            .or_else(|_| self.state.compare_exchange(ReadyState::Open, ReadyState::Closing));
        if claimed.is_ok() {
            let _ = self.tx.send(Outgoing::Close);
        }
    }
}

impl Drop for WebSocketHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_request(url: &str, protocols: &[String]) -> Result<Request> {
    let mut request = url.into_client_request()?;
    if !protocols.is_empty() {
        let value = HeaderValue::from_str(&protocols.join(", ")).map_err(|e| {
            SocketError::Configuration(format!("invalid subprotocol list: {}", e))
        })?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", value);
    }
    Ok(request)
}

fn to_message(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::Text(text),
        Payload::Binary(data) => Message::Binary(data),
    }
}

fn peer_close_frame(frame: Option<WsCloseFrame<'_>>) -> CloseFrame {
    match frame {
        Some(frame) => CloseFrame {
            code: u16::from(frame.code),
            reason: frame.reason.to_string(),
            was_clean: true,
        },
        None => CloseFrame {
            code: NO_STATUS_RECEIVED,
            reason: String::new(),
            was_clean: true,
        },
    }
}

/// Resolves on a close request or when the handle goes away
async fn close_requested(rx: &mut UnboundedReceiver<Outgoing>) {
    loop {
        match rx.recv().await {
            Some(Outgoing::Close) | None => return,
            // The handle refuses sends before open
            Some(Outgoing::Payload(_)) => continue,
        }
    }
}

async fn run_socket(
    url: String,
    protocols: Vec<String>,
    state: Arc<AtomicReadyState>,
    mut rx: UnboundedReceiver<Outgoing>,
    sink: TransportSink,
) {
    let frame = connect_and_serve(&url, &protocols, &state, &mut rx, &sink).await;
    state.set(ReadyState::Closed);
    debug!("Socket #{} to {} closed with code {}", sink.id(), url, frame.code);
    sink.emit(TransportEvent::Close(frame));
}

async fn connect_and_serve(
    url: &str,
    protocols: &[String],
    state: &AtomicReadyState,
    rx: &mut UnboundedReceiver<Outgoing>,
    sink: &TransportSink,
) -> CloseFrame {
    let request = match build_request(url, protocols) {
        Ok(request) => request,
        Err(e) => {
            sink.emit(TransportEvent::Error(e.to_string()));
            return CloseFrame::abnormal(e.to_string());
        }
    };

    let ws_stream = tokio::select! {
        result = connect_async(request) => match result {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                debug!("Connect to {} failed: {}", url, e);
                sink.emit(TransportEvent::Error(e.to_string()));
                return CloseFrame::abnormal(e.to_string());
            }
        },
        _ = close_requested(rx) => {
            return CloseFrame::abnormal("closed before the connection was established");
        }
    };

    // A close request may have raced the handshake
    if state
        .compare_exchange(ReadyState::Connecting, ReadyState::Open)
        .is_err()
    {
        let (mut write, _) = ws_stream.split();
        let _ = write.close().await;
        return CloseFrame::abnormal("closed before the connection was established");
    }
    sink.emit(TransportEvent::Open);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    sink.emit(TransportEvent::Message(Payload::Text(text)));
                }
                Some(Ok(Message::Binary(data))) => {
                    sink.emit(TransportEvent::Message(Payload::Binary(data)));
                }
                Some(Ok(Message::Close(frame))) => {
                    state.set(ReadyState::Closing);
                    // Flushes the close reply queued by tungstenite
                    let _ = write.close().await;
                    return peer_close_frame(frame);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    warn!("Socket to {} failed: {}", url, e);
                    sink.emit(TransportEvent::Error(e.to_string()));
                    return CloseFrame::abnormal(e.to_string());
                }
                None => return CloseFrame::abnormal("stream ended without a close frame"),
            },
            out = rx.recv() => match out {
                Some(Outgoing::Payload(payload)) => {
                    if let Err(e) = write.send(to_message(payload)).await {
                        sink.emit(TransportEvent::Error(e.to_string()));
                        return CloseFrame::abnormal(e.to_string());
                    }
                }
                Some(Outgoing::Close) | None => {
                    state.set(ReadyState::Closing);
                    let _ = write.send(Message::Close(Some(WsCloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    })))
                    .await;
                    return await_peer_close(&mut read).await;
                }
            },
        }
    }
}

/// Read until the peer answers our close frame
async fn await_peer_close<S>(read: &mut S) -> CloseFrame
where
    S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let reply = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
        while let Some(msg) = read.next().await {
            match msg {
                // A bare reply acknowledges our normal closure
                Ok(Message::Close(None)) => return Some(CloseFrame::normal()),
                Ok(Message::Close(frame)) => return Some(peer_close_frame(frame)),
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        None
    })
    .await;

    match reply {
        Ok(Some(frame)) => frame,
        Ok(None) => CloseFrame::normal(),
        Err(_) => CloseFrame::abnormal("close handshake timed out"),
    }
}
