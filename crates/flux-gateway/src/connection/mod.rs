//! Connection management
//!
//! The session manager actor, its state machine and the reconnect policy.

mod manager;
mod reconnect;
mod session;
mod state;

pub use manager::{
    GatewayBuilder, GatewayHandle, LifecycleEvent, SessionManager, NORMAL_CLOSE_CODE,
    RESUMABLE_CLOSE_CODE,
};
pub use reconnect::ReconnectPolicy;
pub use session::Session;
pub use state::ConnectionState;
