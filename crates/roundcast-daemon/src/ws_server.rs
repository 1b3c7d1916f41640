//! WebSocket fan-out: every connected subscriber gets every event, best
//! effort. The protocol is one-way; clients only ever receive.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::poll_loop::RoundEvent;

/// Default maximum number of concurrent subscriber connections.
const DEFAULT_MAX_CONNECTIONS: usize = 256;

// ---------------------------------------------------------------------------
// Subscriber count
// ---------------------------------------------------------------------------

/// Live subscriber count, shared between client handlers.
#[derive(Debug, Default, Clone)]
pub struct SubscriberCount(Arc<AtomicUsize>);

impl SubscriberCount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn join(&self) -> usize {
        let total = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(total, "subscriber connected");
        total
    }

    fn leave(&self) -> usize {
        let total = self.0.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::info!(total, "subscriber disconnected");
        total
    }
}

// ---------------------------------------------------------------------------
// Origin validation
// ---------------------------------------------------------------------------

/// Validate the `Origin` header on an incoming upgrade request.
///
/// With no configured origin every browser origin is allowed. With one
/// configured, only that exact origin passes. An absent header is always
/// allowed (non-browser clients like curl or native apps).
fn validate_origin(
    allowed: Option<&str>,
    req: &Request,
    resp: Response,
) -> Result<Response, ErrorResponse> {
    let Some(allowed) = allowed else {
        return Ok(resp);
    };
    match req.headers().get("origin") {
        None => Ok(resp),
        Some(origin) if origin.to_str().unwrap_or("") == allowed => Ok(resp),
        Some(origin) => {
            tracing::warn!(origin = ?origin, "rejected connection from disallowed origin");
            let err_resp = http::Response::builder()
                .status(http::StatusCode::FORBIDDEN)
                .body(Some("Origin not allowed".into()))
                .expect("building error response");
            Err(err_resp)
        }
    }
}

// ---------------------------------------------------------------------------
// WsServer
// ---------------------------------------------------------------------------

/// Accepts subscriber connections and forwards broadcast events to each one.
///
/// Delivery is independent per subscriber: each handler owns its own
/// broadcast receiver, so a slow or dead client lags and loses events without
/// delaying the poll loop or any other client.
pub struct WsServer {
    addr: SocketAddr,
    events_tx: broadcast::Sender<RoundEvent>,
    cancel: CancellationToken,
    allowed_origin: Option<String>,
    max_connections: usize,
    count: SubscriberCount,
}

impl WsServer {
    pub fn new(
        addr: SocketAddr,
        events_tx: broadcast::Sender<RoundEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            addr,
            events_tx,
            cancel,
            allowed_origin: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            count: SubscriberCount::new(),
        }
    }

    /// Restrict browser connections to a single exact origin.
    pub fn with_allowed_origin(mut self, origin: Option<String>) -> Self {
        self.allowed_origin = origin;
        self
    }

    #[allow(dead_code)]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Live subscriber count handle.
    pub fn subscriber_count(&self) -> SubscriberCount {
        self.count.clone()
    }

    /// Bind, then run the accept loop until cancelled.
    pub async fn run(&self) -> std::io::Result<()> {
        let (listener, _) = self.bind().await?;
        self.serve(listener).await
    }

    /// Bind to the configured address and return the actual local address.
    /// Binding port 0 gives an OS-assigned ephemeral port, used by tests.
    pub async fn bind(&self) -> std::io::Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "ws server listening");
        Ok((listener, local_addr))
    }

    /// Accept loop on a pre-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.max_connections));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let permit = match semaphore.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    tracing::warn!(
                                        peer = %peer,
                                        max = self.max_connections,
                                        "connection limit reached, rejecting"
                                    );
                                    drop(stream);
                                    continue;
                                }
                            };
                            let events_rx = self.events_tx.subscribe();
                            let cancel = self.cancel.clone();
                            let count = self.count.clone();
                            let allowed = self.allowed_origin.clone();
                            tokio::spawn(async move {
                                let _permit = permit;
                                let callback = |req: &Request, resp: Response| {
                                    validate_origin(allowed.as_deref(), req, resp)
                                };
                                match tokio_tungstenite::accept_hdr_async(stream, callback).await {
                                    Ok(ws_stream) => {
                                        count.join();
                                        if let Err(e) = handle_subscriber(ws_stream, events_rx, cancel).await {
                                            tracing::debug!(peer = %peer, error = %e, "subscriber handler finished with error");
                                        }
                                        count.leave();
                                    }
                                    Err(e) => {
                                        tracing::debug!(peer = %peer, error = %e, "ws handshake failed");
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "TCP accept failed");
                        }
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("ws server: cancellation requested, shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-subscriber handler
// ---------------------------------------------------------------------------

async fn handle_subscriber(
    ws_stream: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    mut events_rx: broadcast::Receiver<RoundEvent>,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                match event {
                    Ok(event) => {
                        let frame = serde_json::to_string(&event)?;
                        ws_tx.send(Message::Text(frame)).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Slow subscriber: events are dropped, the client is kept.
                        tracing::warn!(skipped, "subscriber lagging, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(Message::Ping(data))) => {
                        ws_tx.send(Message::Pong(data)).await?;
                    }
                    // One-way protocol: anything else a client sends is ignored.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                }
            }
            _ = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return Ok(());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    type ClientStream =
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    struct TestServer {
        addr: SocketAddr,
        events_tx: broadcast::Sender<RoundEvent>,
        count: SubscriberCount,
        cancel: CancellationToken,
        _handle: tokio::task::JoinHandle<std::io::Result<()>>,
    }

    async fn start_test_server(allowed_origin: Option<String>) -> TestServer {
        let (events_tx, _) = broadcast::channel(64);
        let cancel = CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = WsServer::new(addr, events_tx.clone(), cancel.clone())
            .with_allowed_origin(allowed_origin);
        let count = server.subscriber_count();
        let (listener, local_addr) = server.bind().await.unwrap();
        let handle = tokio::spawn(async move { server.serve(listener).await });
        TestServer {
            addr: local_addr,
            events_tx,
            count,
            cancel,
            _handle: handle,
        }
    }

    impl TestServer {
        fn ws_url(&self) -> String {
            format!("ws://127.0.0.1:{}", self.addr.port())
        }

        async fn connect(&self) -> ClientStream {
            let (ws, _) = tokio_tungstenite::connect_async(&self.ws_url()).await.unwrap();
            ws
        }

        async fn connect_with_origin(
            &self,
            origin: &str,
        ) -> Result<ClientStream, tokio_tungstenite::tungstenite::Error> {
            let mut req =
                tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(
                    &self.ws_url(),
                )
                .unwrap();
            req.headers_mut().insert("Origin", origin.parse().unwrap());
            let (ws, _) = tokio_tungstenite::connect_async(req).await?;
            Ok(ws)
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    async fn recv_event(ws: &mut ClientStream) -> serde_json::Value {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .expect("read error");
        let Message::Text(text) = msg else {
            panic!("expected text frame, got {msg:?}");
        };
        serde_json::from_str(&text).unwrap()
    }

    async fn wait_for_count(count: &SubscriberCount, expected: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while count.get() != expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscriber count never reached expected value");
    }

    #[tokio::test]
    async fn events_are_delivered_as_json_frames() {
        let server = start_test_server(None).await;
        let mut ws = server.connect().await;
        wait_for_count(&server.count, 1).await;

        server
            .events_tx
            .send(RoundEvent::NewRound {
                id: "123456".into(),
                color_class: 2,
            })
            .unwrap();

        let frame = recv_event(&mut ws).await;
        assert_eq!(frame["event"], "new-round");
        assert_eq!(frame["data"]["id"], "123456");
        assert_eq!(frame["data"]["colorClass"], 2);
    }

    #[tokio::test]
    async fn every_subscriber_gets_every_event() {
        let server = start_test_server(None).await;
        let mut first = server.connect().await;
        let mut second = server.connect().await;
        wait_for_count(&server.count, 2).await;

        server
            .events_tx
            .send(RoundEvent::Tick {
                timer: "45".into(),
                live_color: "rgb(0, 0, 0)".into(),
            })
            .unwrap();

        for ws in [&mut first, &mut second] {
            let frame = recv_event(ws).await;
            assert_eq!(frame["event"], "tick");
            assert_eq!(frame["data"]["timer"], "45");
        }
    }

    #[tokio::test]
    async fn disconnect_decrements_the_count() {
        let server = start_test_server(None).await;
        let ws = server.connect().await;
        wait_for_count(&server.count, 1).await;

        drop(ws);
        wait_for_count(&server.count, 0).await;
    }

    #[tokio::test]
    async fn disallowed_origin_is_rejected() {
        let server = start_test_server(Some("https://example.com".into())).await;

        server
            .connect_with_origin("https://evil.example")
            .await
            .expect_err("handshake should be rejected");

        // The configured origin still connects.
        let mut ws = server
            .connect_with_origin("https://example.com")
            .await
            .unwrap();
        wait_for_count(&server.count, 1).await;
        server
            .events_tx
            .send(RoundEvent::Tick {
                timer: "07".into(),
                live_color: String::new(),
            })
            .unwrap();
        let frame = recv_event(&mut ws).await;
        assert_eq!(frame["data"]["timer"], "07");
    }

    #[tokio::test]
    async fn no_origin_header_is_always_allowed() {
        // Non-browser clients (tungstenite's client sends no Origin) connect
        // even when an origin restriction is configured.
        let server = start_test_server(Some("https://example.com".into())).await;
        let _ws = server.connect().await;
        wait_for_count(&server.count, 1).await;
    }
}
