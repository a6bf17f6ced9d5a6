//! WebSocket chat endpoint.
//!
//! `GET /ws/{identity}` validates the identity, upgrades the connection and
//! hands it to the chat session handler. Each connection gets two tasks:
//!
//! - **Reader:** the session handler loop, reading text frames through
//!   [`WsFrameSource`].
//! - **Writer:** drains the connection's outbound queue into the socket sink.
//!   When the outbound handle is closed (disconnect, replacement, shutdown) it
//!   flushes whatever is still queued, sends a Close frame and exits.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use agora_core::transport::{FrameSource, OutboundHandle};
use agora_types::error::TransportError;
use agora_types::identity::Identity;

use crate::http::error::AppError;
use crate::state::AppState;

/// Upgrade an HTTP request to a chat connection for `identity`.
///
/// Invalid identities are rejected with 400 before the upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(identity): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let identity = match Identity::parse(&identity) {
        Ok(identity) => identity,
        Err(err) => {
            tracing::debug!(error = %err, "rejecting WebSocket upgrade");
            return AppError::from(err).into_response();
        }
    };

    let connections = state.connections.clone();
    ws.on_upgrade(move |socket| {
        connections.track_future(handle_ws_connection(socket, identity, state))
    })
}

async fn handle_ws_connection(socket: WebSocket, identity: Identity, state: AppState) {
    let (ws_sender, ws_receiver) = socket.split();
    let (outbound, outbound_rx) = OutboundHandle::channel(state.config.session.outbound_buffer);

    let writer = tokio::spawn(write_frames(ws_sender, outbound_rx, outbound.clone()));

    state
        .chat_handler
        .run(identity, WsFrameSource::new(ws_receiver), outbound.clone())
        .await;

    outbound.close();
    if let Err(err) = writer.await {
        tracing::debug!("WebSocket writer task failed: {err}");
    }
}

/// Writer task: outbound queue to socket.
async fn write_frames(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<String>,
    outbound: OutboundHandle,
) {
    loop {
        tokio::select! {
            biased;

            line = outbound_rx.recv() => match line {
                Some(line) => {
                    if ws_sender.send(Message::Text(line.into())).await.is_err() {
                        // Client disconnected; end the session too.
                        outbound.close();
                        return;
                    }
                }
                None => break,
            },

            _ = outbound.closed() => break,
        }
    }

    while let Ok(line) = outbound_rx.try_recv() {
        if ws_sender.send(Message::Text(line.into())).await.is_err() {
            return;
        }
    }
    let _ = ws_sender.send(Message::Close(None)).await;
}

/// Text frames from a WebSocket receive stream.
///
/// Binary, ping and pong frames are skipped (pings are answered by axum).
pub struct WsFrameSource<S> {
    stream: S,
}

impl<S> WsFrameSource<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<S> FrameSource for WsFrameSource<S>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    async fn recv_frame(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_string())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(TransportError::Io(err.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use agora_core::handler::REPLACED_NOTICE;
    use agora_core::store::MessageStore;
    use agora_infra::sqlite::chat::SqliteMessageStore;
    use agora_types::config::AgoraConfig;
    use tokio::sync::oneshot;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;

    use super::*;
    use crate::server::{ShutdownReport, run_server};

    const TIMEOUT: Duration = Duration::from_secs(5);

    type WsStream = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    struct TestServer {
        addr: SocketAddr,
        state: AppState,
        stop: oneshot::Sender<()>,
        task: tokio::task::JoinHandle<anyhow::Result<ShutdownReport>>,
        _dir: tempfile::TempDir,
    }

    impl TestServer {
        async fn boot() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let state = AppState::from_config(AgoraConfig::default(), dir.path())
                .await
                .unwrap();

            let tcp = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = tcp.local_addr().unwrap();
            let (stop, stopped) = oneshot::channel::<()>();
            let task = tokio::spawn(run_server(state.clone(), tcp, async move {
                let _ = stopped.await;
            }));

            let server = Self { addr, state, stop, task, _dir: dir };
            server.wait_for_bus_subscription().await;
            server
        }

        async fn wait_for_bus_subscription(&self) {
            let bus = &self.state.bus;
            let channel = self.state.config.bus.channel.clone();
            wait_until(|| match bus.as_ref() {
                agora_infra::bus::ConfiguredBus::Memory(memory) => {
                    memory.subscriber_count(&channel) > 0
                }
                agora_infra::bus::ConfiguredBus::Redis(_) => true,
            })
            .await;
        }

        async fn connect(&self, identity: &str) -> WsStream {
            let (ws, _) = connect_async(format!("ws://{}/ws/{identity}", self.addr))
                .await
                .unwrap();
            let identity = Identity::parse(identity).unwrap();
            wait_until(|| self.state.registry.lookup(&identity).is_some()).await;
            ws
        }

        async fn stop(self) -> ShutdownReport {
            let _ = self.stop.send(());
            tokio::time::timeout(TIMEOUT, self.task)
                .await
                .expect("server did not stop")
                .unwrap()
                .unwrap()
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(TIMEOUT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    async fn read_line(ws: &mut WsStream) -> String {
        loop {
            let msg = tokio::time::timeout(TIMEOUT, ws.next())
                .await
                .expect("timeout waiting for line")
                .expect("stream closed")
                .expect("ws error");
            if let ClientMessage::Text(text) = msg {
                return text.as_str().to_string();
            }
        }
    }

    /// Reads until the server closes the connection.
    async fn expect_closed(ws: &mut WsStream) {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                match ws.next().await {
                    Some(Ok(ClientMessage::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await
        .expect("connection was not closed");
    }

    #[tokio::test]
    async fn alice_and_bob_both_receive_both_lines() {
        let server = TestServer::boot().await;
        let mut alice = server.connect("alice").await;
        let mut bob = server.connect("bob").await;

        alice.send(ClientMessage::text("hello")).await.unwrap();
        assert_eq!(read_line(&mut alice).await, "alice: hello");
        assert_eq!(read_line(&mut bob).await, "alice: hello");

        bob.send(ClientMessage::text("hi")).await.unwrap();
        assert_eq!(read_line(&mut alice).await, "bob: hi");
        assert_eq!(read_line(&mut bob).await, "bob: hi");

        let store = SqliteMessageStore::new(server.state.db_pool.clone());
        let stored: Vec<(String, String)> = store
            .recent(10)
            .await
            .unwrap()
            .iter()
            .map(|e| (e.sender().to_string(), e.body().to_string()))
            .collect();
        assert_eq!(
            stored,
            vec![
                ("alice".to_string(), "hello".to_string()),
                ("bob".to_string(), "hi".to_string()),
            ]
        );

        server.stop().await;
    }

    #[tokio::test]
    async fn invalid_identity_is_rejected_before_upgrade() {
        let server = TestServer::boot().await;

        let err = connect_async(format!("ws://{}/ws/%20%20", server.addr))
            .await
            .unwrap_err();
        match err {
            tokio_tungstenite::tungstenite::Error::Http(response) => {
                assert_eq!(response.status(), 400);
            }
            other => panic!("expected HTTP 400, got {other:?}"),
        }
        assert!(server.state.registry.is_empty());

        server.stop().await;
    }

    #[tokio::test]
    async fn disconnect_removes_session() {
        let server = TestServer::boot().await;
        let mut carol = server.connect("carol").await;
        let mut dave = server.connect("dave").await;

        carol.close(None).await.unwrap();
        wait_until(|| server.state.registry.len() == 1).await;

        dave.send(ClientMessage::text("anyone left?")).await.unwrap();
        assert_eq!(read_line(&mut dave).await, "dave: anyone left?");
        assert_eq!(server.state.registry.identities(), vec![Identity::parse("dave").unwrap()]);

        server.stop().await;
    }

    #[tokio::test]
    async fn reconnect_replaces_previous_connection() {
        let server = TestServer::boot().await;
        let mut first = server.connect("alice").await;
        let first_session = server
            .state
            .registry
            .lookup(&Identity::parse("alice").unwrap())
            .unwrap();

        let (mut second, _) = connect_async(format!("ws://{}/ws/alice", server.addr))
            .await
            .unwrap();
        wait_until(|| first_session.is_closed()).await;

        assert_eq!(read_line(&mut first).await, REPLACED_NOTICE);
        expect_closed(&mut first).await;

        second.send(ClientMessage::text("it's me again")).await.unwrap();
        assert_eq!(read_line(&mut second).await, "alice: it's me again");
        assert_eq!(server.state.registry.len(), 1);

        server.stop().await;
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_to_sender_only() {
        let server = TestServer::boot().await;
        let mut alice = server.connect("alice").await;

        let big = "x".repeat(server.state.config.session.max_body_bytes + 1);
        alice.send(ClientMessage::text(big)).await.unwrap();

        let notice = read_line(&mut alice).await;
        assert!(notice.starts_with("error: message exceeds"), "got {notice}");

        server.stop().await;
    }

    #[tokio::test]
    async fn shutdown_closes_open_connections() {
        let server = TestServer::boot().await;
        let mut alice = server.connect("alice").await;
        let mut bob = server.connect("bob").await;

        let report = server.stop().await;

        assert_eq!(report.sessions_closed, 2);
        expect_closed(&mut alice).await;
        expect_closed(&mut bob).await;
    }

    #[tokio::test]
    async fn shutdown_flushes_queued_lines_before_returning() {
        const LINES: usize = 200;
        let (ready_tx, ready_rx) = oneshot::channel::<(SocketAddr, AppState)>();
        let (stop, stopped) = oneshot::channel::<()>();

        // Own runtime, dropped as soon as run_server returns, like `main`.
        let server_thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .unwrap();
            let report = runtime.block_on(async move {
                let dir = tempfile::tempdir().unwrap();
                let state = AppState::from_config(AgoraConfig::default(), dir.path())
                    .await
                    .unwrap();
                let tcp = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                let _ = ready_tx.send((tcp.local_addr().unwrap(), state.clone()));
                run_server(state, tcp, async move {
                    let _ = stopped.await;
                })
                .await
                .unwrap()
            });
            drop(runtime);
            report
        });

        let (addr, state) = ready_rx.await.unwrap();
        let (mut alice, _) = connect_async(format!("ws://{addr}/ws/alice")).await.unwrap();
        let identity = Identity::parse("alice").unwrap();
        wait_until(|| state.registry.lookup(&identity).is_some()).await;

        // Queue more than the socket can absorb before anyone reads.
        let line = "x".repeat(60 * 1024);
        for _ in 0..LINES {
            assert_eq!(state.registry.broadcast(&line).delivered, 1);
        }
        let _ = stop.send(());
        let server_done = tokio::task::spawn_blocking(move || server_thread.join());

        let mut received = 0;
        tokio::time::timeout(TIMEOUT, async {
            loop {
                match alice.next().await {
                    Some(Ok(ClientMessage::Text(_))) => received += 1,
                    Some(Ok(ClientMessage::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await
        .expect("connection was not closed");

        let report = server_done.await.unwrap().unwrap();
        assert_eq!(received, LINES);
        assert_eq!(report.sessions_closed, 1);
        assert!(state.connections.is_empty());
    }

    #[tokio::test]
    async fn frame_source_skips_non_text_frames() {
        let frames: Vec<Result<Message, axum::Error>> = vec![
            Ok(Message::Ping(vec![1].into())),
            Ok(Message::Binary(vec![0, 1].into())),
            Ok(Message::Text("hello".into())),
            Ok(Message::Close(None)),
        ];
        let mut source = WsFrameSource::new(futures_util::stream::iter(frames));

        assert_eq!(source.recv_frame().await.unwrap(), Some("hello".to_string()));
        assert_eq!(source.recv_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn frame_source_reports_transport_errors() {
        let frames: Vec<Result<Message, axum::Error>> =
            vec![Err(axum::Error::new(std::io::Error::other("reset by peer")))];
        let mut source = WsFrameSource::new(futures_util::stream::iter(frames));

        assert!(matches!(source.recv_frame().await, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn frame_source_ends_with_stream() {
        let frames: Vec<Result<Message, axum::Error>> = Vec::new();
        let mut source = WsFrameSource::new(futures_util::stream::iter(frames));

        assert_eq!(source.recv_frame().await.unwrap(), None);
    }
}
