//! WebSocket transport over tokio-tungstenite.
//!
//! Each `connect` spawns a task that dials the URL and then runs an event
//! loop multiplexing:
//!
//! - Incoming frames from the session (forwarded as [`TransportEvent`]s)
//! - Outgoing frames from the session's outbound worker
//! - Local close requests

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::socket::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, SocketTransport, TransportEvent, TransportEvents,
};

// ============================================================================
// Types
// ============================================================================

/// Client socket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the client socket.
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the event loop.
enum SocketCommand {
    /// Send a text frame and report the outcome.
    Send {
        text: String,
        ack: oneshot::Sender<Result<()>>,
    },
    /// Close the connection locally.
    Close { code: u16, reason: String },
}

// ============================================================================
// WsTransport
// ============================================================================

/// [`SocketTransport`] backed by a tokio-tungstenite client.
///
/// TLS for `wss://` URLs is handled by rustls with the webpki root store.
#[derive(Default)]
pub struct WsTransport {
    /// Command channel of the current connection, if any.
    current: Mutex<Option<mpsc::UnboundedSender<SocketCommand>>>,
}

impl WsTransport {
    /// Creates a transport with no connection.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a connection task is running.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Dials and runs one connection.
    async fn run_connection(
        url: Url,
        command_rx: mpsc::UnboundedReceiver<SocketCommand>,
        events: TransportEvents,
    ) {
        debug!(host = url.host_str().unwrap_or_default(), "Connecting socket");

        let ws_stream = match connect_async(url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!(error = %e, "Socket connect failed");
                let _ = events.send(TransportEvent::Error(e.to_string()));
                let _ = events.send(TransportEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: e.to_string(),
                });
                return;
            }
        };

        info!("Socket connection established");
        let _ = events.send(TransportEvent::Open);

        Self::run_event_loop(ws_stream, command_rx, events).await;
    }

    /// Event loop that handles socket I/O.
    async fn run_event_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
        events: TransportEvents,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the session
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            trace!(len = text.len(), "Frame received");
                            let _ = events.send(TransportEvent::Message(text.as_str().to_owned()));
                        }

                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                                .unwrap_or((CLOSE_NO_STATUS, String::new()));
                            debug!(code, reason = %reason, "Socket closed by remote");
                            let _ = events.send(TransportEvent::Closed { code, reason });
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "Socket error");
                            let _ = events.send(TransportEvent::Error(e.to_string()));
                            let _ = events.send(TransportEvent::Closed {
                                code: CLOSE_ABNORMAL,
                                reason: e.to_string(),
                            });
                            break;
                        }

                        None => {
                            debug!("Socket stream ended");
                            let _ = events.send(TransportEvent::Closed {
                                code: CLOSE_ABNORMAL,
                                reason: "stream ended".to_string(),
                            });
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the session
                command = command_rx.recv() => {
                    match command {
                        Some(SocketCommand::Send { text, ack }) => {
                            let result = Self::handle_send(&mut ws_write, text).await;
                            let _ = ack.send(result);
                        }

                        Some(SocketCommand::Close { code, reason }) => {
                            debug!(code, "Closing socket locally");
                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.into(),
                            };
                            let _ = ws_write.send(Message::Close(Some(frame))).await;
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        debug!("Socket event loop terminated");
    }

    /// Writes one text frame.
    async fn handle_send(ws_write: &mut WsSink, text: String) -> Result<()> {
        let len = text.len();
        ws_write.send(Message::Text(text.into())).await?;
        trace!(len, "Frame sent");
        Ok(())
    }
}

#[async_trait]
impl SocketTransport for WsTransport {
    fn connect(&self, url: Url, events: TransportEvents) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        // Dropping the previous sender ends its event loop quietly.
        let previous = self.current.lock().replace(command_tx);
        drop(previous);

        tokio::spawn(Self::run_connection(url, command_rx, events));
    }

    async fn send(&self, text: String) -> Result<()> {
        let command_tx = self
            .current
            .lock()
            .clone()
            .ok_or(Error::ConnectionClosed)?;

        let (ack, ack_rx) = oneshot::channel();
        command_tx
            .send(SocketCommand::Send { text, ack })
            .map_err(|_| Error::connection("socket event loop has stopped"))?;

        ack_rx.await?
    }

    fn disconnect(&self, code: u16, reason: &str) {
        if let Some(command_tx) = self.current.lock().take() {
            let _ = command_tx.send(SocketCommand::Close {
                code,
                reason: reason.to_string(),
            });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let transport = WsTransport::new();
        let result = transport.send("{}".to_string()).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_abnormal_close() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = WsTransport::new();
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/client/v1")).expect("url");
        transport.connect(url, tx);

        assert!(matches!(rx.recv().await, Some(TransportEvent::Error(_))));
        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Closed { code: CLOSE_ABNORMAL, .. })
        ));
    }

    #[tokio::test]
    async fn test_round_trip_with_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");
            ws.send(Message::Text("hello".into())).await.expect("send");
            let reply = ws.next().await.expect("frame").expect("ok");
            let frame = CloseFrame {
                code: CloseCode::from(4900),
                reason: "org mismatch".into(),
            };
            ws.send(Message::Close(Some(frame))).await.expect("close");
            reply
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = WsTransport::new();
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/client/v1")).expect("url");
        transport.connect(url, tx);

        assert_eq!(rx.recv().await, Some(TransportEvent::Open));
        assert_eq!(rx.recv().await, Some(TransportEvent::Message("hello".into())));
        transport.send("world".to_string()).await.expect("send");
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Closed {
                code: 4900,
                reason: "org mismatch".into()
            })
        );

        let reply = server.await.expect("server task");
        assert_eq!(reply, Message::Text("world".into()));
    }
}
