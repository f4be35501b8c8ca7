//! # flux-gateway
//!
//! Client for the real-time gateway: frame codec, session state machine with
//! heartbeats and resume, and typed event dispatch.
//!
//! ```no_run
//! use flux_common::ClientConfig;
//! use flux_gateway::{EventKind, GatewayEvent, SessionManager};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let gateway = SessionManager::spawn(config.credential, config.gateway)?;
//!
//! gateway.events().on(EventKind::MessageCreate, |event| {
//!     if let GatewayEvent::MessageCreate(message) = event {
//!         println!("{}", message.content);
//!     }
//!     Ok(())
//! });
//! gateway.connect()?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod events;
pub mod protocol;
pub mod transport;

pub use connection::{
    ConnectionState, GatewayBuilder, GatewayHandle, LifecycleEvent, ReconnectPolicy, Session,
    SessionManager,
};
pub use error::{DispatchError, GatewayError, TransportError};
pub use events::{DispatchOutcome, EventDispatcher, EventKind, GatewayEvent, ListenerId};
pub use protocol::{FrameCodec, GatewayFrame, OpCode};
pub use transport::{Connector, WebSocketConnector};
