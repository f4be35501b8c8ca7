//! In-memory connector
//!
//! Every `connect` hands the server half of a channel pair to whoever holds the
//! accept receiver, which lets tests script the gateway side frame by frame.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc as tokio_mpsc;

use super::{Connector, FrameSink, FrameStream};
use crate::error::TransportError;
use crate::protocol::{CloseReason, FrameCodec, GatewayFrame, Inbound, SocketMessage};

/// Connector whose peers live in the same process
#[derive(Debug)]
pub struct MemoryConnector {
    accepted: tokio_mpsc::UnboundedSender<MemoryServer>,
    refuse: AtomicU32,
}

impl MemoryConnector {
    /// Create a connector and the receiver that yields one server per connection
    #[must_use]
    pub fn new() -> (Self, tokio_mpsc::UnboundedReceiver<MemoryServer>) {
        let (accepted, rx) = tokio_mpsc::unbounded_channel();
        let connector = Self {
            accepted,
            refuse: AtomicU32::new(0),
        };
        (connector, rx)
    }

    /// Fail the next `count` connection attempts
    pub fn refuse_next(&self, count: u32) {
        self.refuse.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (client_tx, server_rx) = mpsc::unbounded();
        let (server_tx, client_rx) = mpsc::unbounded();

        let server = MemoryServer {
            url: url.to_string(),
            tx: server_tx,
            rx: server_rx,
        };
        self.accepted
            .send(server)
            .map_err(|_| TransportError::Connect("no peer is accepting".to_string()))?;

        let sink = client_tx.sink_map_err(|_| TransportError::Closed);
        Ok((Box::pin(sink), Box::pin(client_rx)))
    }
}

/// Server end of one in-memory connection
#[derive(Debug)]
pub struct MemoryServer {
    url: String,
    tx: mpsc::UnboundedSender<Result<SocketMessage, TransportError>>,
    rx: mpsc::UnboundedReceiver<SocketMessage>,
}

impl MemoryServer {
    /// URL the client dialed
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a frame; returns false once the client has gone away
    pub fn send(&self, frame: &GatewayFrame) -> bool {
        match FrameCodec::encode(frame) {
            Ok(message) => self.send_raw(message),
            Err(_) => false,
        }
    }

    /// Send an already encoded message
    pub fn send_raw(&self, message: SocketMessage) -> bool {
        self.tx.unbounded_send(Ok(message)).is_ok()
    }

    /// Send a close frame
    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.send_raw(SocketMessage::Close(Some(CloseReason::new(code, reason))))
    }

    /// Simulate a socket failure
    pub fn fail(&self) -> bool {
        self.tx
            .unbounded_send(Err(TransportError::Receive("connection reset".to_string())))
            .is_ok()
    }

    /// Next raw message from the client; `None` once the client dropped the connection
    pub async fn recv(&mut self) -> Option<SocketMessage> {
        self.rx.next().await
    }

    /// Next frame from the client; `None` on a close message or disconnect
    pub async fn recv_frame(&mut self) -> Option<GatewayFrame> {
        let message = self.recv().await?;
        match FrameCodec::decode(&message).ok()? {
            Inbound::Frame(frame) => Some(frame),
            Inbound::Close(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let (connector, mut accepted) = MemoryConnector::new();
        let (mut sink, mut stream) = connector.connect("memory://gateway").await.unwrap();
        let mut server = accepted.recv().await.unwrap();
        assert_eq!(server.url(), "memory://gateway");

        assert!(server.send(&GatewayFrame::hello(1000)));
        let message = stream.next().await.unwrap().unwrap();
        let Inbound::Frame(frame) = FrameCodec::decode(&message).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.op, OpCode::Hello);

        sink.send(FrameCodec::encode(&GatewayFrame::heartbeat(Some(3))).unwrap())
            .await
            .unwrap();
        let frame = server.recv_frame().await.unwrap();
        assert_eq!(frame.as_heartbeat_seq(), Some(Some(3)));

        drop(sink);
        assert!(server.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_refused_connections() {
        let (connector, _accepted) = MemoryConnector::new();
        connector.refuse_next(2);

        assert!(connector.connect("memory://a").await.is_err());
        assert!(connector.connect("memory://a").await.is_err());
        assert!(connector.connect("memory://a").await.is_ok());
    }
}
