//! WebSocket connector backed by tokio-tungstenite

use async_trait::async_trait;
use futures::future;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

use super::{Connector, FrameSink, FrameStream};
use crate::error::TransportError;
use crate::protocol::{CloseReason, SocketMessage};

/// Connects over `ws://` or `wss://`
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let (socket, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!(url = %url, status = %response.status(), "WebSocket connected");

        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(|e| TransportError::Send(e.to_string()))
            .with(|message: SocketMessage| {
                future::ready(Ok::<_, TransportError>(into_ws_message(message)))
            });

        let stream = stream.filter_map(|result| future::ready(from_ws_message(result)));

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

fn into_ws_message(message: SocketMessage) -> Message {
    match message {
        SocketMessage::Text(text) => Message::Text(text),
        SocketMessage::Binary(bytes) => Message::Binary(bytes),
        SocketMessage::Close(reason) => Message::Close(reason.map(|r| CloseFrame {
            code: WsCloseCode::from(r.code),
            reason: r.reason.into(),
        })),
    }
}

fn from_ws_message(
    result: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<SocketMessage, TransportError>> {
    match result {
        Ok(Message::Text(text)) => Some(Ok(SocketMessage::Text(text))),
        Ok(Message::Binary(bytes)) => Some(Ok(SocketMessage::Binary(bytes))),
        Ok(Message::Close(frame)) => Some(Ok(SocketMessage::Close(
            frame.map(|f| CloseReason::new(u16::from(f.code), f.reason.into_owned())),
        ))),
        // tungstenite answers pings itself
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
            trace!("Absorbed control frame");
            None
        }
        Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_frame_conversion() {
        let message = into_ws_message(SocketMessage::Close(Some(CloseReason::new(4000, "zombie"))));
        let Message::Close(Some(frame)) = message else {
            panic!("expected close frame");
        };
        assert_eq!(u16::from(frame.code), 4000);
        assert_eq!(frame.reason, "zombie");

        let back = from_ws_message(Ok(Message::Close(Some(frame)))).unwrap().unwrap();
        assert_eq!(back, SocketMessage::Close(Some(CloseReason::new(4000, "zombie"))));
    }

    #[test]
    fn test_control_frames_are_absorbed() {
        assert!(from_ws_message(Ok(Message::Ping(vec![1]))).is_none());
        assert!(from_ws_message(Ok(Message::Pong(vec![1]))).is_none());
    }

    #[test]
    fn test_text_passthrough() {
        let message = from_ws_message(Ok(Message::Text("{\"op\":11}".to_string())))
            .unwrap()
            .unwrap();
        assert_eq!(message, SocketMessage::Text("{\"op\":11}".to_string()));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let result = WebSocketConnector::new().connect("ws://127.0.0.1:1").await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
