//! REST endpoints
//!
//! A [`Route`] pairs a concrete request (method + path) with the logical
//! rate-limit route it is admitted against.

use flux_ratelimit::RouteParams;
use reqwest::Method;

/// One REST endpoint call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    method: Method,
    path: String,
    rate_limit: &'static str,
}

impl Route {
    /// Create a route from its parts.
    ///
    /// `rate_limit` is the logical route name looked up in the rate limit
    /// registry; unknown names are not limited.
    pub fn new(method: Method, path: impl Into<String>, rate_limit: &'static str) -> Self {
        Self {
            method,
            path: path.into(),
            rate_limit,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the API base URL, starting with `/`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Logical rate limit route name
    pub fn rate_limit(&self) -> &'static str {
        self.rate_limit
    }

    // ========================================================================
    // Channels
    // ========================================================================

    pub fn get_channel(channel_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::GET,
                format!("/channels/{channel_id}"),
                "channels::channel_id::get",
            ),
            RouteParams::new().channel(channel_id),
        )
    }

    pub fn modify_channel(channel_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::PATCH,
                format!("/channels/{channel_id}"),
                "channels::channel_id::modify",
            ),
            RouteParams::new().channel(channel_id),
        )
    }

    pub fn trigger_typing(channel_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::POST,
                format!("/channels/{channel_id}/typing"),
                "channels::channel_id::typing",
            ),
            RouteParams::new().channel(channel_id),
        )
    }

    // ========================================================================
    // Messages
    // ========================================================================

    pub fn get_messages(channel_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::GET,
                format!("/channels/{channel_id}/messages"),
                "channels::channel_id::messages::get",
            ),
            RouteParams::new().channel(channel_id),
        )
    }

    pub fn create_message(channel_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::POST,
                format!("/channels/{channel_id}/messages"),
                "channels::channel_id::messages::send",
            ),
            RouteParams::new().channel(channel_id),
        )
    }

    pub fn edit_message(channel_id: &str, message_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::PATCH,
                format!("/channels/{channel_id}/messages/{message_id}"),
                "channels::channel_id::messages::edit",
            ),
            RouteParams::new().channel(channel_id),
        )
    }

    pub fn delete_message(channel_id: &str, message_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::DELETE,
                format!("/channels/{channel_id}/messages/{message_id}"),
                "channels::channel_id::messages::delete",
            ),
            RouteParams::new().channel(channel_id),
        )
    }

    pub fn bulk_delete_messages(channel_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::POST,
                format!("/channels/{channel_id}/messages/bulk-delete"),
                "channels::channel_id::messages::bulk_delete",
            ),
            RouteParams::new().channel(channel_id),
        )
    }

    /// Add (`PUT`) or remove (`DELETE`) the current user's reaction
    pub fn own_reaction(
        method: Method,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> (Self, RouteParams) {
        (
            Self::new(
                method,
                format!(
                    "/channels/{channel_id}/messages/{message_id}/reactions/{}/@me",
                    encode_segment(emoji)
                ),
                "channels::channel_id::reactions::modify",
            ),
            RouteParams::new().channel(channel_id),
        )
    }

    // ========================================================================
    // Guilds
    // ========================================================================

    pub fn get_guild(guild_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::GET,
                format!("/guilds/{guild_id}"),
                "guilds::guild_id::get",
            ),
            RouteParams::new().guild(guild_id),
        )
    }

    pub fn modify_guild(guild_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::PATCH,
                format!("/guilds/{guild_id}"),
                "guilds::guild_id::modify",
            ),
            RouteParams::new().guild(guild_id),
        )
    }

    pub fn get_members(guild_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::GET,
                format!("/guilds/{guild_id}/members"),
                "guilds::guild_id::members::get",
            ),
            RouteParams::new().guild(guild_id),
        )
    }

    pub fn modify_member(guild_id: &str, user_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::PATCH,
                format!("/guilds/{guild_id}/members/{user_id}"),
                "guilds::guild_id::members::target_id::modify",
            ),
            RouteParams::new().guild(guild_id).target(user_id),
        )
    }

    pub fn kick_member(guild_id: &str, user_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::DELETE,
                format!("/guilds/{guild_id}/members/{user_id}"),
                "guilds::guild_id::members::target_id::kick",
            ),
            RouteParams::new().guild(guild_id).target(user_id),
        )
    }

    pub fn ban_member(guild_id: &str, user_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::PUT,
                format!("/guilds/{guild_id}/bans/{user_id}"),
                "guilds::guild_id::bans::target_id::create",
            ),
            RouteParams::new().guild(guild_id).target(user_id),
        )
    }

    pub fn modify_role(guild_id: &str, role_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::PATCH,
                format!("/guilds/{guild_id}/roles/{role_id}"),
                "guilds::guild_id::roles::modify",
            ),
            RouteParams::new().guild(guild_id),
        )
    }

    // ========================================================================
    // Invites, webhooks, users
    // ========================================================================

    pub fn get_invite(code: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::GET,
                format!("/invites/{code}"),
                "invites::invite_code::get",
            ),
            RouteParams::new().invite(code),
        )
    }

    pub fn delete_invite(code: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::DELETE,
                format!("/invites/{code}"),
                "invites::invite_code::delete",
            ),
            RouteParams::new().invite(code),
        )
    }

    pub fn execute_webhook(webhook_id: &str, token: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::POST,
                format!("/webhooks/{webhook_id}/{token}"),
                "webhooks::webhook_id::execute",
            ),
            RouteParams::new().webhook(webhook_id),
        )
    }

    pub fn current_user() -> (Self, RouteParams) {
        (
            Self::new(Method::GET, "/users/@me", "users::@me::get"),
            RouteParams::new(),
        )
    }

    pub fn get_user(user_id: &str) -> (Self, RouteParams) {
        (
            Self::new(
                Method::GET,
                format!("/users/{user_id}"),
                "users::user_id::get",
            ),
            RouteParams::new().user(user_id),
        )
    }

    pub fn create_dm() -> (Self, RouteParams) {
        (
            Self::new(Method::POST, "/users/@me/channels", "users::@me::channels::create"),
            RouteParams::new(),
        )
    }
}

/// Percent-encode a path segment (unicode emoji, `name:id` custom emoji)
fn encode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_ratelimit::RateLimitRegistry;

    #[test]
    fn test_create_message_route() {
        let (route, params) = Route::create_message("123");
        assert_eq!(*route.method(), Method::POST);
        assert_eq!(route.path(), "/channels/123/messages");
        assert_eq!(route.rate_limit(), "channels::channel_id::messages::send");
        assert_eq!(params.channel_id.as_deref(), Some("123"));
    }

    #[test]
    fn test_member_routes_carry_target() {
        let (route, params) = Route::kick_member("1", "2");
        assert_eq!(*route.method(), Method::DELETE);
        assert_eq!(route.path(), "/guilds/1/members/2");
        assert_eq!(params.guild_id.as_deref(), Some("1"));
        assert_eq!(params.target_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_reaction_emoji_is_encoded() {
        let (route, _) = Route::own_reaction(Method::PUT, "1", "2", "party:99");
        assert_eq!(route.path(), "/channels/1/messages/2/reactions/party%3A99/@me");

        let (route, _) = Route::own_reaction(Method::DELETE, "1", "2", "👍");
        assert_eq!(
            route.path(),
            "/channels/1/messages/2/reactions/%F0%9F%91%8D/@me"
        );
    }

    #[test]
    fn test_every_builtin_route_is_registered() {
        let registry = RateLimitRegistry::with_defaults();
        let routes = [
            Route::get_channel("1"),
            Route::modify_channel("1"),
            Route::trigger_typing("1"),
            Route::get_messages("1"),
            Route::create_message("1"),
            Route::edit_message("1", "2"),
            Route::delete_message("1", "2"),
            Route::bulk_delete_messages("1"),
            Route::own_reaction(Method::PUT, "1", "2", "x"),
            Route::get_guild("1"),
            Route::modify_guild("1"),
            Route::get_members("1"),
            Route::modify_member("1", "2"),
            Route::kick_member("1", "2"),
            Route::ban_member("1", "2"),
            Route::modify_role("1", "2"),
            Route::get_invite("abc"),
            Route::delete_invite("abc"),
            Route::execute_webhook("1", "tok"),
            Route::current_user(),
            Route::get_user("1"),
            Route::create_dm(),
        ];

        for (route, params) in routes {
            let resolved = registry.resolve(route.rate_limit(), &params);
            assert!(resolved.is_some(), "{} has no rule", route.rate_limit());
        }
    }

    #[test]
    fn test_resolved_bucket_uses_route_ids() {
        let registry = RateLimitRegistry::with_defaults();
        let (route, params) = Route::create_message("555");
        let resolved = registry.resolve(route.rate_limit(), &params).unwrap();
        assert_eq!(resolved.key, "channels::555::messages::send");
    }
}
