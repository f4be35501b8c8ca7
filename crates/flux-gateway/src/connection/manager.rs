//! Session manager
//!
//! A single task owns the socket, the heartbeat timer and the [`Session`].
//! Inbound frames, heartbeat ticks and commands from [`GatewayHandle`]s are
//! multiplexed with `select!`, so every state transition and every write to the
//! session happens in one place and no suspension blocks another.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use flux_common::{Credential, GatewayConfig};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::{ConnectionState, ReconnectPolicy, Session};
use crate::error::GatewayError;
use crate::events::{EventDispatcher, EventKind, GatewayEvent};
use crate::protocol::{
    is_recoverable, CloseCode, CloseReason, ConnectionProperties, FrameCodec, GatewayFrame,
    IdentifyPayload, Inbound, OpCode, PresenceUpdatePayload, RequestGuildMembersPayload,
    ResumePayload, SocketMessage,
};
use crate::transport::{Connector, FrameSink, FrameStream, WebSocketConnector};

/// Close code sent when the client drops a connection it intends to resume
pub const RESUMABLE_CLOSE_CODE: u16 = 4000;

/// Close code sent on shutdown
pub const NORMAL_CLOSE_CODE: u16 = 1000;

const LIFECYCLE_CAPACITY: usize = 64;

/// Notifications about the connection lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A connection attempt started
    Connecting,
    /// READY received
    Ready { session_id: String },
    /// A resume completed
    Resumed,
    /// The connection closed; `code` is `None` when the socket just went away
    Closed { code: Option<u16>, reason: String },
    /// A recoverable fault, already handled
    Error { message: String },
    /// The session ended for good; emitted at most once
    Fatal { code: Option<u16>, reason: String },
}

enum Command {
    Connect,
    Send(GatewayFrame),
    Shutdown,
}

/// Why a connection ended
enum Exit {
    Reconnect,
    Shutdown,
    Fatal(GatewayError),
}

/// Gateway client core
///
/// Not used directly: [`SessionManager::builder`] spawns the actor and returns a
/// [`GatewayHandle`].
pub struct SessionManager {
    url: String,
    credential: Credential,
    properties: ConnectionProperties,
    presence: Option<PresenceUpdatePayload>,
    ignored_events: Vec<String>,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<EventDispatcher>,
    session: Arc<RwLock<Session>>,
    state_tx: watch::Sender<ConnectionState>,
    lifecycle_tx: broadcast::Sender<LifecycleEvent>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
}

impl SessionManager {
    /// Start configuring a gateway client
    #[must_use]
    pub fn builder(credential: Credential, config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(credential, config)
    }

    /// Spawn a client with the WebSocket connector and default settings
    pub fn spawn(
        credential: Credential,
        config: GatewayConfig,
    ) -> Result<GatewayHandle, GatewayError> {
        GatewayBuilder::new(credential, config).spawn()
    }

    async fn run(mut self) {
        // Idle until asked to connect
        loop {
            match self.cmd_rx.recv().await {
                Some(Command::Connect) => break,
                Some(Command::Send(frame)) => {
                    warn!(op = %frame.op, "Dropping outbound frame, gateway is not connected");
                }
                Some(Command::Shutdown) | None => {
                    self.terminate(None);
                    return;
                }
            }
        }

        loop {
            self.set_state(ConnectionState::Connecting);
            self.emit(LifecycleEvent::Connecting);

            let connector = Arc::clone(&self.connector);
            let url = self.url.clone();
            let connected = self
                .interruptible(async move { connector.connect(&url).await })
                .await;

            let exit = match connected {
                None => Exit::Shutdown,
                Some(Ok((sink, stream))) => {
                    info!(url = %self.url, "Gateway transport open");
                    self.drive(sink, stream).await
                }
                Some(Err(e)) => {
                    warn!(url = %self.url, error = %e, "Gateway connection failed");
                    self.emit(LifecycleEvent::Error {
                        message: e.to_string(),
                    });
                    Exit::Reconnect
                }
            };

            match exit {
                Exit::Reconnect => {}
                Exit::Shutdown => {
                    self.terminate(None);
                    return;
                }
                Exit::Fatal(error) => {
                    self.terminate(Some(error));
                    return;
                }
            }

            self.set_state(ConnectionState::Reconnecting);

            let attempt = self.session.read().reconnect_attempt();
            if !self.policy.allows(attempt) {
                error!(attempts = attempt, "Reconnect attempts exhausted");
                self.terminate(Some(GatewayError::AttemptsExhausted { attempts: attempt }));
                return;
            }

            let delay = self.policy.backoff(attempt);
            let resumable = {
                let mut session = self.session.write();
                session.next_attempt();
                session.resume_target().is_some()
            };
            info!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                resumable,
                "Reconnecting to gateway"
            );

            if self.interruptible(tokio::time::sleep(delay)).await.is_none() {
                self.terminate(None);
                return;
            }
        }
    }

    /// Run `fut` while still answering commands; `None` if shutdown came first
    async fn interruptible<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                output = &mut fut => return Some(output),
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Send(frame)) => {
                        warn!(op = %frame.op, "Dropping outbound frame, gateway is not connected");
                    }
                    Some(Command::Connect) => debug!("Connect requested while already connecting"),
                    Some(Command::Shutdown) | None => return None,
                },
            }
        }
    }

    /// Serve one open connection until it ends
    async fn drive(&mut self, mut sink: FrameSink, mut stream: FrameStream) -> Exit {
        self.set_state(ConnectionState::AwaitingHello);
        let mut heartbeat: Option<Interval> = None;

        loop {
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Send(frame)) => {
                        if self.state() != ConnectionState::Established {
                            warn!(
                                op = %frame.op,
                                state = %self.state(),
                                "Dropping outbound frame, session not established"
                            );
                        } else if let Err(e) = send_frame(&mut sink, &frame).await {
                            self.report(&e);
                            return Exit::Reconnect;
                        }
                    }
                    Some(Command::Connect) => debug!("Connect requested while already connected"),
                    Some(Command::Shutdown) | None => {
                        info!("Closing gateway connection on request");
                        close(&mut sink, NORMAL_CLOSE_CODE, "client shutdown").await;
                        self.emit(LifecycleEvent::Closed {
                            code: Some(NORMAL_CLOSE_CODE),
                            reason: "client shutdown".to_string(),
                        });
                        return Exit::Shutdown;
                    }
                },

                () = next_heartbeat(&mut heartbeat) => {
                    let zombied = self.session.read().awaiting_ack();
                    if zombied {
                        warn!("Heartbeat not acknowledged, connection zombied");
                        close(&mut sink, RESUMABLE_CLOSE_CODE, "heartbeat ack timeout").await;
                        self.emit(LifecycleEvent::Closed {
                            code: Some(RESUMABLE_CLOSE_CODE),
                            reason: "heartbeat ack timeout".to_string(),
                        });
                        return Exit::Reconnect;
                    }
                    if let Err(e) = self.send_heartbeat(&mut sink).await {
                        self.report(&e);
                        return Exit::Reconnect;
                    }
                }

                message = stream.next() => {
                    let message = match message {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => {
                            let error = GatewayError::from(e);
                            self.report(&error);
                            self.emit(LifecycleEvent::Closed {
                                code: None,
                                reason: error.to_string(),
                            });
                            return Exit::Reconnect;
                        }
                        None => {
                            info!("Gateway stream ended");
                            self.emit(LifecycleEvent::Closed {
                                code: None,
                                reason: "connection lost".to_string(),
                            });
                            return Exit::Reconnect;
                        }
                    };

                    match FrameCodec::decode(&message) {
                        Ok(Inbound::Frame(frame)) => {
                            let exit = self.handle_frame(frame, &mut sink, &mut heartbeat).await;
                            if let Some(exit) = exit {
                                return exit;
                            }
                        }
                        Ok(Inbound::Close(reason)) => return self.handle_close(reason),
                        Err(e) => warn!(error = %e, "Dropping undecodable frame"),
                    }
                }
            }
        }
    }

    async fn handle_frame(
        &mut self,
        frame: GatewayFrame,
        sink: &mut FrameSink,
        heartbeat: &mut Option<Interval>,
    ) -> Option<Exit> {
        trace!(op = %frame.op, seq = ?frame.s, event = ?frame.t, "Received frame");

        match frame.op {
            OpCode::Hello => {
                let Some(hello) = frame.as_hello() else {
                    warn!("Dropping malformed Hello");
                    return None;
                };
                let period = Duration::from_millis(hello.heartbeat_interval.max(1));
                self.session.write().begin_heartbeats(period);

                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                *heartbeat = Some(interval);
                debug!(interval_ms = period.as_millis() as u64, "Heartbeat interval set");

                if let Err(e) = self.handshake(sink).await {
                    self.report(&e);
                    return Some(Exit::Reconnect);
                }
            }
            OpCode::HeartbeatAck => {
                let latency = self.session.write().heartbeat_acked(Instant::now());
                trace!(latency_ms = ?latency.map(|l| l.as_millis()), "Heartbeat acknowledged");
            }
            OpCode::Heartbeat => {
                // Server wants a beat now, outside the schedule
                if let Err(e) = self.send_heartbeat(sink).await {
                    self.report(&e);
                    return Some(Exit::Reconnect);
                }
            }
            OpCode::Reconnect => {
                info!("Gateway requested a reconnect");
                close(sink, RESUMABLE_CLOSE_CODE, "reconnect requested").await;
                self.emit(LifecycleEvent::Closed {
                    code: Some(RESUMABLE_CLOSE_CODE),
                    reason: "reconnect requested".to_string(),
                });
                return Some(Exit::Reconnect);
            }
            OpCode::InvalidSession => {
                let resumable = frame.as_invalid_session().unwrap_or(false);
                warn!(resumable, "Gateway invalidated the session, identifying again");
                self.session.write().clear_resume();
                self.emit(LifecycleEvent::Error {
                    message: "session invalidated".to_string(),
                });
                close(sink, RESUMABLE_CLOSE_CODE, "invalid session").await;
                return Some(Exit::Reconnect);
            }
            OpCode::Dispatch => self.handle_dispatch(frame),
            other => debug!(op = %other, "Ignoring unexpected op code"),
        }

        None
    }

    /// Send Resume if a resumable session exists, Identify otherwise
    async fn handshake(&mut self, sink: &mut FrameSink) -> Result<(), GatewayError> {
        let token = self.credential.gateway_token().to_string();
        let resume = self.session.read().resume_target();

        match resume {
            Some((session_id, seq)) => {
                self.set_state(ConnectionState::Resuming);
                info!(session_id = %session_id, seq, "Resuming gateway session");
                let frame = GatewayFrame::resume(&ResumePayload {
                    token,
                    session_id,
                    seq,
                })?;
                send_frame(sink, &frame).await
            }
            None => {
                self.set_state(ConnectionState::Identifying);
                info!("Identifying with gateway");
                let ignored_events =
                    (!self.ignored_events.is_empty()).then(|| self.ignored_events.clone());
                let frame = GatewayFrame::identify(&IdentifyPayload {
                    token,
                    properties: self.properties.clone(),
                    presence: self.presence.clone(),
                    ignored_events,
                })?;
                send_frame(sink, &frame).await
            }
        }
    }

    async fn send_heartbeat(&mut self, sink: &mut FrameSink) -> Result<(), GatewayError> {
        let seq = {
            let mut session = self.session.write();
            session.heartbeat_sent(Instant::now());
            session.last_seq()
        };
        trace!(seq = ?seq, "Sending heartbeat");
        send_frame(sink, &GatewayFrame::heartbeat(seq)).await
    }

    fn handle_dispatch(&mut self, frame: GatewayFrame) {
        let Some(name) = frame.t else {
            warn!(seq = ?frame.s, "Dropping dispatch without an event name");
            return;
        };
        let data = frame.d.unwrap_or(Value::Null);
        let state = self.state();

        if name == EventKind::Ready.as_str() {
            let Some(session_id) = data.get("session_id").and_then(Value::as_str) else {
                warn!("Dropping READY without a session_id");
                return;
            };
            let session_id = session_id.to_string();
            {
                let mut session = self.session.write();
                session.set_session_id(session_id.clone());
                session.handshake_succeeded();
            }
            self.set_state(ConnectionState::Established);
            info!(session_id = %session_id, "Gateway session ready");
            self.emit(LifecycleEvent::Ready { session_id });
        } else if state == ConnectionState::Resuming {
            // Replayed dispatches without an InvalidSession mean the resume took
            self.session.write().handshake_succeeded();
            self.set_state(ConnectionState::Established);
            info!(event = %name, "Gateway session resumed");
            self.emit(LifecycleEvent::Resumed);
        } else if state != ConnectionState::Established {
            debug!(
                event = %name,
                state = %state,
                "Dropping dispatch before the session is established"
            );
            return;
        }

        // Advance the cursor before any listener runs
        if let Some(seq) = frame.s {
            self.session.write().record_sequence(seq);
        }

        let event = match GatewayEvent::decode(&name, data) {
            Ok(event) => event,
            Err(e) => {
                warn!(event = %name, error = %e, "Dropping undecodable dispatch");
                self.emit(LifecycleEvent::Error {
                    message: format!("failed to decode {name}: {e}"),
                });
                return;
            }
        };

        let outcome = self.dispatcher.dispatch(&event);
        trace!(event = %name, delivered = outcome.delivered, "Dispatched event");
        for failure in outcome.failures {
            self.emit(LifecycleEvent::Error {
                message: failure.to_string(),
            });
        }
    }

    fn handle_close(&mut self, reason: Option<CloseReason>) -> Exit {
        let (code, reason) = match reason {
            Some(r) => (Some(r.code), r.reason),
            None => (None, String::new()),
        };
        self.emit(LifecycleEvent::Closed {
            code,
            reason: reason.clone(),
        });

        match code {
            Some(code) if !is_recoverable(code) => {
                let reason = match CloseCode::from_u16(code) {
                    Some(known) if reason.is_empty() => known.description().to_string(),
                    _ => reason,
                };
                error!(code, reason = %reason, "Gateway closed with a non-recoverable code");
                self.session.write().clear_resume();
                Exit::Fatal(GatewayError::FatalClose { code, reason })
            }
            _ => {
                info!(code = ?code, reason = %reason, "Gateway connection closed");
                Exit::Reconnect
            }
        }
    }

    fn terminate(&mut self, error: Option<GatewayError>) {
        match error {
            Some(error) => self.emit(LifecycleEvent::Fatal {
                code: error.close_code(),
                reason: error.to_string(),
            }),
            None => self.session.write().clear_resume(),
        }
        let cancelled = self.dispatcher.cancel_waiters();
        self.set_state(ConnectionState::Terminated);
        info!(cancelled_waits = cancelled, "Gateway session terminated");
    }

    fn report(&self, error: &GatewayError) {
        warn!(error = %error, "Gateway connection error");
        self.emit(LifecycleEvent::Error {
            message: error.to_string(),
        });
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Gateway state changed");
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine
        let _ = self.lifecycle_tx.send(event);
    }
}

async fn next_heartbeat(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn send_frame(sink: &mut FrameSink, frame: &GatewayFrame) -> Result<(), GatewayError> {
    let message = FrameCodec::encode(frame)?;
    sink.send(message).await?;
    trace!(op = %frame.op, "Sent frame");
    Ok(())
}

async fn close(sink: &mut FrameSink, code: u16, reason: &str) {
    let message = SocketMessage::Close(Some(CloseReason::new(code, reason)));
    if let Err(e) = sink.send(message).await {
        debug!(error = %e, "Close frame not sent");
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "Transport close failed");
    }
}

/// Configures and spawns a [`SessionManager`]
pub struct GatewayBuilder {
    credential: Credential,
    config: GatewayConfig,
    connector: Option<Arc<dyn Connector>>,
    dispatcher: Option<Arc<EventDispatcher>>,
    properties: ConnectionProperties,
    presence: Option<PresenceUpdatePayload>,
}

impl GatewayBuilder {
    #[must_use]
    pub fn new(credential: Credential, config: GatewayConfig) -> Self {
        Self {
            credential,
            config,
            connector: None,
            dispatcher: None,
            properties: ConnectionProperties::default(),
            presence: None,
        }
    }

    /// Replace the WebSocket connector
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Share an existing dispatcher; its suppression set wins over the config's
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<EventDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    #[must_use]
    pub fn properties(mut self, properties: ConnectionProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Presence announced in Identify
    #[must_use]
    pub fn presence(mut self, presence: PresenceUpdatePayload) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Spawn the actor onto the current tokio runtime
    pub fn spawn(self) -> Result<GatewayHandle, GatewayError> {
        let Self {
            credential,
            config,
            connector,
            dispatcher,
            properties,
            presence,
        } = self;

        let policy = ReconnectPolicy::from_config(&config.reconnect)?;
        let dispatcher = dispatcher.unwrap_or_else(|| {
            Arc::new(EventDispatcher::with_suppressed(config.ignored_events.iter().cloned()))
        });
        let connector = connector.unwrap_or_else(|| Arc::new(WebSocketConnector::new()));

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (lifecycle_tx, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        let session = Arc::new(RwLock::new(Session::new()));

        let manager = SessionManager {
            url: config.url,
            credential,
            properties,
            presence,
            ignored_events: config.ignored_events,
            policy,
            connector,
            dispatcher: Arc::clone(&dispatcher),
            session: Arc::clone(&session),
            state_tx,
            lifecycle_tx: lifecycle_tx.clone(),
            cmd_rx,
        };
        tokio::spawn(manager.run());

        Ok(GatewayHandle {
            cmd_tx,
            state_rx,
            lifecycle_tx,
            session,
            dispatcher,
        })
    }
}

/// Cloneable handle to a running [`SessionManager`]
///
/// The actor shuts down once every handle is dropped.
#[derive(Clone)]
pub struct GatewayHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    lifecycle_tx: broadcast::Sender<LifecycleEvent>,
    session: Arc<RwLock<Session>>,
    dispatcher: Arc<EventDispatcher>,
}

impl GatewayHandle {
    /// Leave `Idle` and open the first connection
    pub fn connect(&self) -> Result<(), GatewayError> {
        self.command(Command::Connect)
    }

    /// Close the connection and stop reconnecting; a no-op once terminated
    pub fn shutdown(&self) {
        let _ = self.command(Command::Shutdown);
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Wait until the state satisfies `predicate` and return it
    pub async fn wait_for_state<F>(&self, mut predicate: F) -> Result<ConnectionState, GatewayError>
    where
        F: FnMut(ConnectionState) -> bool,
    {
        let mut rx = self.state_rx.clone();
        let state = rx
            .wait_for(|state| predicate(*state))
            .await
            .map_err(|_| GatewayError::ActorClosed)?;
        Ok(*state)
    }

    /// Subscribe to lifecycle notifications emitted from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle_tx.subscribe()
    }

    /// Copy of the current session state
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.session.read().clone()
    }

    /// Latest heartbeat round trip
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.session.read().latency()
    }

    /// Dispatcher for registering listeners
    #[must_use]
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Update own presence (op 3)
    pub fn update_presence(&self, presence: &PresenceUpdatePayload) -> Result<(), GatewayError> {
        if !presence.is_valid_status() {
            return Err(GatewayError::Protocol(format!(
                "invalid presence status: {}",
                presence.status
            )));
        }
        self.send_frame(GatewayFrame::presence_update(presence)?)
    }

    /// Request guild member chunks (op 8)
    pub fn request_guild_members(
        &self,
        request: &RequestGuildMembersPayload,
    ) -> Result<(), GatewayError> {
        self.send_frame(GatewayFrame::request_guild_members(request)?)
    }

    /// Queue a raw frame; frames sent before the session is established are dropped
    pub fn send_frame(&self, frame: GatewayFrame) -> Result<(), GatewayError> {
        if !frame.op.is_client_op() {
            return Err(GatewayError::Protocol(format!("{} is not a client op code", frame.op)));
        }
        self.command(Command::Send(frame))
    }

    fn command(&self, command: Command) -> Result<(), GatewayError> {
        self.cmd_tx.send(command).map_err(|_| GatewayError::ActorClosed)
    }
}

impl std::fmt::Debug for GatewayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayHandle")
            .field("state", &self.state())
            .field("session_id", &self.session.read().session_id())
            .finish()
    }
}
