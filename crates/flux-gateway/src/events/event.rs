//! Decoded dispatch events

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::payloads::{
    ChannelDeleteEvent, ChannelEvent, GuildCreateEvent, GuildDeleteEvent, GuildEvent,
    GuildMemberAddEvent, GuildMemberRemoveEvent, GuildMemberUpdateEvent, MessageCreateEvent,
    MessageDeleteEvent, MessageEvent, MessageReactionEvent, PresenceEvent, ReadyEvent,
    TypingStartEvent, UserEvent,
};
use super::EventKind;

/// A dispatch event with its typed payload
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Ready(Box<ReadyEvent>),
    Resumed,
    GuildCreate(Box<GuildCreateEvent>),
    GuildUpdate(GuildEvent),
    GuildDelete(GuildDeleteEvent),
    ChannelCreate(ChannelEvent),
    ChannelUpdate(ChannelEvent),
    ChannelDelete(ChannelDeleteEvent),
    MessageCreate(Box<MessageCreateEvent>),
    MessageUpdate(MessageEvent),
    MessageDelete(MessageDeleteEvent),
    MessageReactionAdd(MessageReactionEvent),
    MessageReactionRemove(MessageReactionEvent),
    GuildMemberAdd(Box<GuildMemberAddEvent>),
    GuildMemberUpdate(GuildMemberUpdateEvent),
    GuildMemberRemove(GuildMemberRemoveEvent),
    PresenceUpdate(PresenceEvent),
    TypingStart(TypingStartEvent),
    UserUpdate(UserEvent),
    /// Dispatch the client has no type for; the raw payload is kept
    Unknown { name: String, data: Value },
}

impl GatewayEvent {
    /// Decode a dispatch payload by event name
    pub fn decode(name: &str, data: Value) -> Result<Self, serde_json::Error> {
        let event = match EventKind::from_name(name) {
            EventKind::Ready => Self::Ready(parse(data)?),
            EventKind::Resumed => Self::Resumed,
            EventKind::GuildCreate => Self::GuildCreate(parse(data)?),
            EventKind::GuildUpdate => Self::GuildUpdate(parse(data)?),
            EventKind::GuildDelete => Self::GuildDelete(parse(data)?),
            EventKind::ChannelCreate => Self::ChannelCreate(parse(data)?),
            EventKind::ChannelUpdate => Self::ChannelUpdate(parse(data)?),
            EventKind::ChannelDelete => Self::ChannelDelete(parse(data)?),
            EventKind::MessageCreate => Self::MessageCreate(parse(data)?),
            EventKind::MessageUpdate => Self::MessageUpdate(parse(data)?),
            EventKind::MessageDelete => Self::MessageDelete(parse(data)?),
            EventKind::MessageReactionAdd => Self::MessageReactionAdd(parse(data)?),
            EventKind::MessageReactionRemove => Self::MessageReactionRemove(parse(data)?),
            EventKind::GuildMemberAdd => Self::GuildMemberAdd(parse(data)?),
            EventKind::GuildMemberUpdate => Self::GuildMemberUpdate(parse(data)?),
            EventKind::GuildMemberRemove => Self::GuildMemberRemove(parse(data)?),
            EventKind::PresenceUpdate => Self::PresenceUpdate(parse(data)?),
            EventKind::TypingStart => Self::TypingStart(parse(data)?),
            EventKind::UserUpdate => Self::UserUpdate(parse(data)?),
            EventKind::Unknown => Self::Unknown {
                name: name.to_string(),
                data,
            },
        };
        Ok(event)
    }

    /// Kind used to route this event to listeners
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Ready(_) => EventKind::Ready,
            Self::Resumed => EventKind::Resumed,
            Self::GuildCreate(_) => EventKind::GuildCreate,
            Self::GuildUpdate(_) => EventKind::GuildUpdate,
            Self::GuildDelete(_) => EventKind::GuildDelete,
            Self::ChannelCreate(_) => EventKind::ChannelCreate,
            Self::ChannelUpdate(_) => EventKind::ChannelUpdate,
            Self::ChannelDelete(_) => EventKind::ChannelDelete,
            Self::MessageCreate(_) => EventKind::MessageCreate,
            Self::MessageUpdate(_) => EventKind::MessageUpdate,
            Self::MessageDelete(_) => EventKind::MessageDelete,
            Self::MessageReactionAdd(_) => EventKind::MessageReactionAdd,
            Self::MessageReactionRemove(_) => EventKind::MessageReactionRemove,
            Self::GuildMemberAdd(_) => EventKind::GuildMemberAdd,
            Self::GuildMemberUpdate(_) => EventKind::GuildMemberUpdate,
            Self::GuildMemberRemove(_) => EventKind::GuildMemberRemove,
            Self::PresenceUpdate(_) => EventKind::PresenceUpdate,
            Self::TypingStart(_) => EventKind::TypingStart,
            Self::UserUpdate(_) => EventKind::UserUpdate,
            Self::Unknown { .. } => EventKind::Unknown,
        }
    }

    /// Wire name, including the original name of unknown events
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Unknown { name, .. } => name,
            other => other.kind().as_str(),
        }
    }
}

fn parse<T: DeserializeOwned>(data: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_known_event() {
        let event = GatewayEvent::decode(
            "MESSAGE_DELETE",
            json!({"id": "1", "channel_id": "2"}),
        )
        .unwrap();

        assert_eq!(event.kind(), EventKind::MessageDelete);
        assert_eq!(event.name(), "MESSAGE_DELETE");
        let GatewayEvent::MessageDelete(payload) = event else {
            panic!("expected MESSAGE_DELETE");
        };
        assert_eq!(payload.channel_id, "2");
    }

    #[test]
    fn test_decode_unknown_event_keeps_payload() {
        let event = GatewayEvent::decode("CALL_CREATE", json!({"x": 1})).unwrap();

        assert_eq!(event.kind(), EventKind::Unknown);
        assert_eq!(event.name(), "CALL_CREATE");
        assert_eq!(
            event,
            GatewayEvent::Unknown {
                name: "CALL_CREATE".to_string(),
                data: json!({"x": 1}),
            }
        );
    }

    #[test]
    fn test_resumed_ignores_payload() {
        assert_eq!(
            GatewayEvent::decode("RESUMED", Value::Null).unwrap(),
            GatewayEvent::Resumed
        );
    }

    #[test]
    fn test_malformed_known_event() {
        assert!(GatewayEvent::decode("TYPING_START", json!({"channel_id": 5})).is_err());
    }
}
