//! Session state
//!
//! Owned by the session manager actor; everything else sees clones.

use std::time::Duration;

use tokio::time::Instant;

/// Resumable session and heartbeat bookkeeping
#[derive(Debug, Clone, Default)]
pub struct Session {
    session_id: Option<String>,
    last_seq: Option<u64>,
    heartbeat_interval: Option<Duration>,
    last_heartbeat_sent_at: Option<Instant>,
    last_heartbeat_ack_at: Option<Instant>,
    reconnect_attempt: u32,
    latency: Option<Duration>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Session ID issued by READY
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Sequence of the last delivered dispatch
    #[must_use]
    pub const fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    /// Interval announced by the last Hello
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    #[must_use]
    pub const fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    /// Round trip of the most recently acknowledged heartbeat
    #[must_use]
    pub const fn latency(&self) -> Option<Duration> {
        self.latency
    }

    #[must_use]
    pub const fn last_heartbeat_sent_at(&self) -> Option<Instant> {
        self.last_heartbeat_sent_at
    }

    #[must_use]
    pub const fn last_heartbeat_ack_at(&self) -> Option<Instant> {
        self.last_heartbeat_ack_at
    }

    /// Session ID and sequence to resume with, if both are known
    #[must_use]
    pub fn resume_target(&self) -> Option<(String, u64)> {
        match (&self.session_id, self.last_seq) {
            (Some(id), Some(seq)) => Some((id.clone(), seq)),
            _ => None,
        }
    }

    /// Check if a heartbeat went out and has not been acknowledged yet
    #[must_use]
    pub fn awaiting_ack(&self) -> bool {
        match (self.last_heartbeat_sent_at, self.last_heartbeat_ack_at) {
            (Some(sent), Some(acked)) => acked < sent,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    pub(crate) fn set_session_id(&mut self, session_id: impl Into<String>) {
        self.session_id = Some(session_id.into());
    }

    /// Advance the resume cursor; sequences never move backwards
    pub(crate) fn record_sequence(&mut self, seq: u64) {
        self.last_seq = Some(self.last_seq.map_or(seq, |last| last.max(seq)));
    }

    /// Forget the resumable session so the next handshake identifies
    pub(crate) fn clear_resume(&mut self) {
        self.session_id = None;
        self.last_seq = None;
    }

    /// Start heartbeat bookkeeping for a new connection
    pub(crate) fn begin_heartbeats(&mut self, interval: Duration) {
        self.heartbeat_interval = Some(interval);
        self.last_heartbeat_sent_at = None;
        self.last_heartbeat_ack_at = None;
    }

    pub(crate) fn heartbeat_sent(&mut self, at: Instant) {
        self.last_heartbeat_sent_at = Some(at);
    }

    /// Record an acknowledgement and return the new latency sample
    pub(crate) fn heartbeat_acked(&mut self, at: Instant) -> Option<Duration> {
        self.last_heartbeat_ack_at = Some(at);
        if let Some(sent) = self.last_heartbeat_sent_at {
            self.latency = Some(at.saturating_duration_since(sent));
        }
        self.latency
    }

    pub(crate) fn handshake_succeeded(&mut self) {
        self.reconnect_attempt = 0;
    }

    pub(crate) fn next_attempt(&mut self) -> u32 {
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        self.reconnect_attempt
    }
}
