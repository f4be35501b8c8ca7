//! Gateway protocol definitions
//!
//! Op codes, close codes, the frame envelope, payloads, and the frame codec.

mod close_codes;
mod codec;
mod frame;
mod opcodes;
mod payloads;

pub use close_codes::{is_recoverable, CloseCode};
pub use codec::{CloseReason, CodecError, FrameCodec, Inbound, SocketMessage};
pub use frame::GatewayFrame;
pub use opcodes::{OpCode, UnknownOpCode};
pub use payloads::{
    ConnectionProperties, HelloPayload, IdentifyPayload, PresenceUpdatePayload,
    RequestGuildMembersPayload, ResumePayload,
};
