//! Gateway events
//!
//! Event kinds, typed dispatch payloads and the dispatcher that routes them.

mod dispatcher;
mod event;
mod event_types;
mod payloads;

pub use dispatcher::{DispatchOutcome, EventDispatcher, ListenerFailure, ListenerId};
pub use event::GatewayEvent;
pub use event_types::EventKind;
pub use payloads::{
    AttachmentPayload, ChannelDeleteEvent, ChannelEvent, ChannelPayload, GuildCreateEvent,
    GuildDeleteEvent, GuildEvent, GuildMemberAddEvent, GuildMemberRemoveEvent,
    GuildMemberUpdateEvent, MemberPayload, MessageCreateEvent, MessageDeleteEvent, MessageEvent,
    MessageReactionEvent, MessageReferencePayload, PresenceEvent, ReadyEvent, ResumedEvent,
    RolePayload, TypingStartEvent, UnavailableGuild, UserEvent, UserIdPayload, UserPayload,
};
