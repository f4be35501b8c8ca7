//! Frame codec
//!
//! Converts between gateway frames and transport-level socket messages.

use super::GatewayFrame;

/// A message as seen by the transport layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketMessage {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<CloseReason>),
}

/// Close frame contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Frame(GatewayFrame),
    Close(Option<CloseReason>),
}

/// Frame codec errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary frame is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// JSON frame codec
pub struct FrameCodec;

impl FrameCodec {
    /// Encode an outbound frame as a text message
    pub fn encode(frame: &GatewayFrame) -> Result<SocketMessage, CodecError> {
        Ok(SocketMessage::Text(frame.to_json()?))
    }

    /// Decode an inbound socket message
    pub fn decode(message: &SocketMessage) -> Result<Inbound, CodecError> {
        match message {
            SocketMessage::Text(text) => Ok(Inbound::Frame(GatewayFrame::from_json(text)?)),
            SocketMessage::Binary(bytes) => {
                let text = std::str::from_utf8(bytes)?;
                Ok(Inbound::Frame(GatewayFrame::from_json(text)?))
            }
            SocketMessage::Close(reason) => Ok(Inbound::Close(reason.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;

    #[test]
    fn test_encode_is_text_json() {
        let message = FrameCodec::encode(&GatewayFrame::heartbeat(Some(3))).unwrap();
        assert_eq!(message, SocketMessage::Text(r#"{"op":1,"d":3}"#.to_string()));
    }

    #[test]
    fn test_decode_text_and_binary() {
        let text = SocketMessage::Text(r#"{"op":10,"d":{"heartbeat_interval":1000}}"#.to_string());
        let Inbound::Frame(frame) = FrameCodec::decode(&text).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.op, OpCode::Hello);

        let binary = SocketMessage::Binary(br#"{"op":11}"#.to_vec());
        assert_eq!(
            FrameCodec::decode(&binary).unwrap(),
            Inbound::Frame(GatewayFrame::heartbeat_ack())
        );
    }

    #[test]
    fn test_decode_close() {
        let close = SocketMessage::Close(Some(CloseReason::new(4004, "bad token")));
        assert_eq!(
            FrameCodec::decode(&close).unwrap(),
            Inbound::Close(Some(CloseReason::new(4004, "bad token")))
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            FrameCodec::decode(&SocketMessage::Text("not json".to_string())),
            Err(CodecError::Json(_))
        ));
        assert!(matches!(
            FrameCodec::decode(&SocketMessage::Binary(vec![0xff, 0xfe])),
            Err(CodecError::InvalidUtf8(_))
        ));
    }
}
