//! Socket transport
//!
//! The session manager talks to the network only through [`Connector`], so the
//! state machine can be driven by an in-memory peer in tests. The in-memory
//! pair is only built for this crate's tests or with the `test-util` feature.

#[cfg(any(test, feature = "test-util"))]
mod memory;
mod websocket;

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

use crate::error::TransportError;
use crate::protocol::SocketMessage;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryConnector, MemoryServer};
pub use websocket::WebSocketConnector;

/// Outbound half of an open connection
pub type FrameSink = Pin<Box<dyn Sink<SocketMessage, Error = TransportError> + Send>>;

/// Inbound half of an open connection; ends when the peer goes away
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SocketMessage, TransportError>> + Send>>;

/// Opens gateway connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError>;
}
