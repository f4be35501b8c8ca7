//! Gateway frame format
//!
//! Every message on the socket is a `{op, d, s, t}` envelope.

use super::{
    HelloPayload, IdentifyPayload, OpCode, PresenceUpdatePayload, RequestGuildMembersPayload,
    ResumePayload,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway frame envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayFrame {
    /// Operation code
    pub op: OpCode,

    /// Payload, serialized as `null` when absent
    #[serde(default)]
    pub d: Option<Value>,

    /// Sequence number (dispatch frames only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name (dispatch frames only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayFrame {
    fn new(op: OpCode, d: Option<Value>) -> Self {
        Self { op, d, s: None, t: None }
    }

    fn with_payload<T: Serialize>(op: OpCode, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(op, Some(serde_json::to_value(payload)?)))
    }

    // === Client frames ===

    /// Heartbeat (op 1) carrying the last seen sequence
    #[must_use]
    pub fn heartbeat(last_seq: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, last_seq.map(Value::from))
    }

    /// Identify (op 2)
    pub fn identify(payload: &IdentifyPayload) -> Result<Self, serde_json::Error> {
        Self::with_payload(OpCode::Identify, payload)
    }

    /// Presence Update (op 3)
    pub fn presence_update(payload: &PresenceUpdatePayload) -> Result<Self, serde_json::Error> {
        Self::with_payload(OpCode::PresenceUpdate, payload)
    }

    /// Resume (op 6)
    pub fn resume(payload: &ResumePayload) -> Result<Self, serde_json::Error> {
        Self::with_payload(OpCode::Resume, payload)
    }

    /// Request Guild Members (op 8)
    pub fn request_guild_members(
        payload: &RequestGuildMembersPayload,
    ) -> Result<Self, serde_json::Error> {
        Self::with_payload(OpCode::RequestGuildMembers, payload)
    }

    // === Server frames ===

    /// Dispatch (op 0)
    #[must_use]
    pub fn dispatch(event_name: impl Into<String>, seq: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            d: Some(data),
            s: Some(seq),
            t: Some(event_name.into()),
        }
    }

    /// Hello (op 10)
    #[must_use]
    pub fn hello(heartbeat_interval: u64) -> Self {
        Self::new(
            OpCode::Hello,
            Some(serde_json::json!({ "heartbeat_interval": heartbeat_interval })),
        )
    }

    /// Heartbeat ACK (op 11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self::new(OpCode::HeartbeatAck, None)
    }

    /// Reconnect (op 7)
    #[must_use]
    pub fn reconnect() -> Self {
        Self::new(OpCode::Reconnect, None)
    }

    /// Invalid Session (op 9)
    #[must_use]
    pub fn invalid_session(resumable: bool) -> Self {
        Self::new(OpCode::InvalidSession, Some(Value::Bool(resumable)))
    }

    // === Parsing ===

    fn payload_as<T: serde::de::DeserializeOwned>(&self, op: OpCode) -> Option<T> {
        if self.op != op {
            return None;
        }
        self.d.as_ref().and_then(|d| T::deserialize(d).ok())
    }

    /// Parse a Hello payload (op 10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        self.payload_as(OpCode::Hello)
    }

    /// Parse an Identify payload (op 2)
    pub fn as_identify(&self) -> Option<IdentifyPayload> {
        self.payload_as(OpCode::Identify)
    }

    /// Parse a Resume payload (op 6)
    pub fn as_resume(&self) -> Option<ResumePayload> {
        self.payload_as(OpCode::Resume)
    }

    /// Sequence carried by a heartbeat (op 1); outer `None` for other ops
    pub fn as_heartbeat_seq(&self) -> Option<Option<u64>> {
        (self.op == OpCode::Heartbeat).then(|| self.d.as_ref().and_then(Value::as_u64))
    }

    /// Resumable flag of an Invalid Session (op 9)
    pub fn as_invalid_session(&self) -> Option<bool> {
        (self.op == OpCode::InvalidSession)
            .then(|| self.d.as_ref().and_then(Value::as_bool).unwrap_or(false))
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayFrame(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayFrame(op={})", self.op)
        }
    }
}
