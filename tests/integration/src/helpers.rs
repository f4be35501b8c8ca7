//! Test helpers for integration tests
//!
//! Spawns axum servers on ephemeral ports: plain HTTP apps standing in for
//! the REST API, and a WebSocket endpoint that hands every accepted socket to
//! the test so it can play the gateway's side of the protocol.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use flux_common::{ApiConfig, ClientConfig, Credential, GatewayConfig, ReconnectConfig};
use flux_gateway::{GatewayFrame, OpCode};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Upper bound on any single wait for the client
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP server running an arbitrary axum app
pub struct TestServer {
    pub addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Serve `app` on an ephemeral local port
    pub async fn start(app: Router) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            _handle: handle,
        })
    }

    /// Get base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// REST settings pointing at this server
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig::default().with_base_url(self.base_url())
    }
}

/// WebSocket endpoint playing the gateway
pub struct GatewayServer {
    server: TestServer,
    accepted: mpsc::UnboundedReceiver<WebSocket>,
}

impl GatewayServer {
    pub async fn start() -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route("/gateway", get(upgrade)).with_state(tx);

        Ok(Self {
            server: TestServer::start(app).await?,
            accepted: rx,
        })
    }

    /// Gateway URL for the client
    pub fn url(&self) -> String {
        format!("ws://{}/gateway?v=1&encoding=json", self.server.addr)
    }

    /// Gateway settings with fast, bounded reconnects
    pub fn config(&self) -> GatewayConfig {
        GatewayConfig::default().with_url(self.url()).with_reconnect(
            ReconnectConfig::default()
                .with_base_delay_ms(10)
                .with_max_attempts(3),
        )
    }

    /// Wait for the client's next connection
    pub async fn accept(&mut self) -> Result<ServerSocket> {
        self.accept_within(TEST_TIMEOUT).await
    }

    pub async fn accept_within(&mut self, timeout: Duration) -> Result<ServerSocket> {
        let socket = tokio::time::timeout(timeout, self.accepted.recv())
            .await
            .context("Timed out waiting for a gateway connection")?
            .context("Gateway server stopped")?;

        Ok(ServerSocket { socket })
    }
}

async fn upgrade(
    State(accepted): State<mpsc::UnboundedSender<WebSocket>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        accepted.send(socket).ok();
    })
}

/// Server end of one client connection
pub struct ServerSocket {
    socket: WebSocket,
}

impl ServerSocket {
    /// Send a frame to the client
    pub async fn send(&mut self, frame: &GatewayFrame) -> Result<()> {
        self.socket.send(Message::Text(frame.to_json()?)).await?;
        Ok(())
    }

    /// Next message from the client, skipping WebSocket control frames
    async fn next_message(&mut self) -> Result<Message> {
        loop {
            let message = tokio::time::timeout(TEST_TIMEOUT, self.socket.recv())
                .await
                .context("Timed out waiting for the client")?
                .context("Client disconnected")??;

            if !matches!(message, Message::Ping(_) | Message::Pong(_)) {
                return Ok(message);
            }
        }
    }

    /// Next frame from the client
    pub async fn recv(&mut self) -> Result<GatewayFrame> {
        match self.next_message().await? {
            Message::Text(text) => Ok(GatewayFrame::from_json(&text)?),
            Message::Binary(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Message::Close(frame) => anyhow::bail!("Client closed the connection: {frame:?}"),
            other => anyhow::bail!("Unexpected message: {other:?}"),
        }
    }

    /// Next frame with `op`, dropping anything else (heartbeats, mostly)
    pub async fn recv_op(&mut self, op: OpCode) -> Result<GatewayFrame> {
        loop {
            let frame = self.recv().await?;
            if frame.op == op {
                return Ok(frame);
            }
        }
    }

    /// Wait for the client to close the connection; returns its close code
    pub async fn recv_close(&mut self) -> Result<Option<u16>> {
        loop {
            if let Message::Close(frame) = self.next_message().await? {
                return Ok(frame.map(|f| f.code));
            }
        }
    }

    /// Close the connection with an application close code
    pub async fn close(mut self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        self.socket.send(Message::Close(Some(frame))).await?;
        Ok(())
    }
}

/// Client configuration against local test servers
pub fn client_config(token: &str, api: ApiConfig, gateway: GatewayConfig) -> Result<ClientConfig> {
    let mut config = ClientConfig::new(Credential::parse(token)?);
    config.api = api;
    config.gateway = gateway;
    Ok(config)
}
