//! Route rules and bucket key resolution
//!
//! Bucket templates are `::`-separated segments; a segment named after one of
//! the dynamic IDs (`channel_id`, `guild_id`, ...) is a placeholder.

use std::collections::HashMap;
use std::time::Duration;

/// Immutable limit for one logical route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Bucket key template, e.g. `channels::channel_id::messages::send`
    pub bucket: String,
    /// Maximum requests per window
    pub limit: u32,
    /// Window length
    pub window: Duration,
    /// Skip the global bucket for this route
    pub exempt_from_global: bool,
}

impl RateLimitRule {
    #[must_use]
    pub fn new(bucket: impl Into<String>, limit: u32, window: Duration) -> Self {
        Self {
            bucket: bucket.into(),
            limit,
            window,
            exempt_from_global: false,
        }
    }

    #[must_use]
    pub fn exempt_from_global(mut self) -> Self {
        self.exempt_from_global = true;
        self
    }
}

/// Dynamic IDs substituted into bucket templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    pub channel_id: Option<String>,
    pub guild_id: Option<String>,
    pub user_id: Option<String>,
    pub target_id: Option<String>,
    pub webhook_id: Option<String>,
    pub invite_code: Option<String>,
}

impl RouteParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn channel(mut self, id: impl Into<String>) -> Self {
        self.channel_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn guild(mut self, id: impl Into<String>) -> Self {
        self.guild_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn user(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn target(mut self, id: impl Into<String>) -> Self {
        self.target_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn webhook(mut self, id: impl Into<String>) -> Self {
        self.webhook_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn invite(mut self, code: impl Into<String>) -> Self {
        self.invite_code = Some(code.into());
        self
    }

    /// Value for a placeholder segment, if the segment is a placeholder and set
    fn lookup(&self, placeholder: &str) -> Option<&str> {
        let value = match placeholder {
            "channel_id" => &self.channel_id,
            "guild_id" => &self.guild_id,
            "user_id" => &self.user_id,
            "target_id" => &self.target_id,
            "webhook_id" => &self.webhook_id,
            "invite_code" => &self.invite_code,
            _ => return None,
        };
        value.as_deref()
    }
}

/// A rule together with its concrete bucket key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBucket {
    pub key: String,
    pub rule: RateLimitRule,
}

/// Route name → rule lookup
#[derive(Debug, Clone, Default)]
pub struct RateLimitRegistry {
    rules: HashMap<String, RateLimitRule>,
}

impl RateLimitRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the standard API routes
    #[must_use]
    pub fn with_defaults() -> Self {
        const SECOND: Duration = Duration::from_secs(1);
        const MINUTE: Duration = Duration::from_secs(60);

        let routes = [
            ("channels::channel_id::messages::send", 5, Duration::from_secs(5)),
            ("channels::channel_id::messages::edit", 5, Duration::from_secs(5)),
            ("channels::channel_id::messages::delete", 5, SECOND),
            ("channels::channel_id::messages::bulk_delete", 1, SECOND),
            ("channels::channel_id::messages::get", 50, SECOND),
            ("channels::channel_id::reactions::modify", 1, Duration::from_millis(250)),
            ("channels::channel_id::typing", 5, Duration::from_secs(5)),
            ("channels::channel_id::get", 50, SECOND),
            ("channels::channel_id::modify", 2, Duration::from_secs(600)),
            ("guilds::guild_id::get", 50, SECOND),
            ("guilds::guild_id::modify", 5, MINUTE),
            ("guilds::guild_id::members::get", 10, Duration::from_secs(10)),
            ("guilds::guild_id::members::target_id::modify", 10, Duration::from_secs(10)),
            ("guilds::guild_id::members::target_id::kick", 5, Duration::from_secs(5)),
            ("guilds::guild_id::bans::target_id::create", 5, Duration::from_secs(5)),
            ("guilds::guild_id::roles::modify", 10, Duration::from_secs(10)),
            ("invites::invite_code::get", 10, Duration::from_secs(10)),
            ("invites::invite_code::delete", 5, Duration::from_secs(5)),
            ("users::@me::get", 20, SECOND),
            ("users::@me::channels::create", 10, Duration::from_secs(10)),
            ("users::user_id::get", 20, SECOND),
        ];

        let mut registry = Self::new();
        for (route, limit, window) in routes {
            registry.insert(route, RateLimitRule::new(route, limit, window));
        }

        // Webhook executions carry their own token and do not count globally.
        let webhook = "webhooks::webhook_id::execute";
        registry.insert(
            webhook,
            RateLimitRule::new(webhook, 5, Duration::from_secs(2)).exempt_from_global(),
        );

        registry
    }

    /// Register or replace a rule
    pub fn insert(&mut self, route: impl Into<String>, rule: RateLimitRule) {
        self.rules.insert(route.into(), rule);
    }

    /// Builder-style insert
    #[must_use]
    pub fn with_rule(mut self, route: impl Into<String>, rule: RateLimitRule) -> Self {
        self.insert(route, rule);
        self
    }

    /// Look up the rule for a route
    pub fn rule(&self, route: &str) -> Option<&RateLimitRule> {
        self.rules.get(route)
    }

    /// Number of registered routes
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if no route is registered
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolve the concrete bucket for a call
    pub fn resolve(&self, route: &str, params: &RouteParams) -> Option<ResolvedBucket> {
        self.rule(route).map(|rule| ResolvedBucket {
            key: resolve_bucket_key(&rule.bucket, params),
            rule: rule.clone(),
        })
    }
}

/// Substitute placeholders present in both the template and `params`.
///
/// Placeholders without a supplied value stay literal, so every call missing
/// the same ID shares one bucket.
pub(crate) fn resolve_bucket_key(template: &str, params: &RouteParams) -> String {
    template
        .split("::")
        .map(|segment| params.lookup(segment).unwrap_or(segment))
        .collect::<Vec<_>>()
        .join("::")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_channel_id() {
        let params = RouteParams::new().channel("123");
        assert_eq!(
            resolve_bucket_key("channels::channel_id::messages::send", &params),
            "channels::123::messages::send"
        );
    }

    #[test]
    fn test_missing_param_keeps_placeholder() {
        let template = "channels::channel_id::messages::send";
        assert_eq!(resolve_bucket_key(template, &RouteParams::new()), template);

        // Unrelated params do not help either
        let params = RouteParams::new().guild("9");
        assert_eq!(resolve_bucket_key(template, &params), template);
    }

    #[test]
    fn test_multiple_placeholders() {
        let params = RouteParams::new().guild("1").target("2").channel("3");
        assert_eq!(
            resolve_bucket_key("guilds::guild_id::members::target_id::kick", &params),
            "guilds::1::members::2::kick"
        );
    }

    #[test]
    fn test_partial_words_are_not_placeholders() {
        let params = RouteParams::new().user("7");
        assert_eq!(
            resolve_bucket_key("users::user_id_list::get", &params),
            "users::user_id_list::get"
        );
    }

    #[test]
    fn test_defaults_and_resolve() {
        let registry = RateLimitRegistry::with_defaults();
        assert!(!registry.is_empty());

        let resolved = registry
            .resolve("channels::channel_id::messages::send", &RouteParams::new().channel("42"))
            .unwrap();
        assert_eq!(resolved.key, "channels::42::messages::send");
        assert_eq!(resolved.rule.limit, 5);

        assert!(registry
            .rule("webhooks::webhook_id::execute")
            .unwrap()
            .exempt_from_global);
        assert!(registry.resolve("no::such::route", &RouteParams::new()).is_none());
    }

    #[test]
    fn test_custom_rule() {
        let registry = RateLimitRegistry::new().with_rule(
            "custom",
            RateLimitRule::new("custom::guild_id", 1, Duration::from_secs(1)),
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.resolve("custom", &RouteParams::new().guild("5")).unwrap().key,
            "custom::5"
        );
    }
}
