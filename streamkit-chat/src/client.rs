//! Connection manager and public chat client.
//!
//! One spawned supervisor task per client owns the transport lifecycle:
//! handshake and authentication, the `select!` read loop, keepalive,
//! and reconnect-with-backoff. It is the sole producer of events for
//! its connection and the only task that mutates channel state, so
//! event ordering is preserved end-to-end. Multiple clients run fully
//! independently.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};

use streamkit_common::{ChannelRef, Credential};

use crate::conn::{BoxedTransport, ConnectionState, Connector};
use crate::dispatch::EventDispatcher;
use crate::error::ChatError;
use crate::event::ChatEvent;
use crate::interpret::interpret;
use crate::irc::Message;
use crate::rate::RateLimiter;
use crate::state::{ChannelSnapshot, ChannelTracker};

/// Capabilities requested during the handshake.
const CAP_REQUEST: &str = "CAP REQ :message-tags commands membership";

/// Server NOTICE texts that mean our credentials were rejected.
const AUTH_FAILURE_NOTICES: &[&str] =
    &["Login authentication failed", "Improperly formatted auth"];

/// Configuration for one chat connection.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Credential for authentication. `None` connects read-only under a
    /// generated guest nick.
    pub credential: Option<Credential>,
    pub rate_limit: RateLimitConfig,
    pub reconnect: ReconnectConfig,
    /// What `send_message` does while not Connected.
    pub outbound: OutboundPolicy,
    /// What happens to queued outbound lines on `close()`.
    pub close_policy: ClosePolicy,
    /// Idle interval after which we send the server our own PING.
    pub ping_interval: Duration,
    /// Total silence beyond this forces a reconnect.
    pub ping_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            credential: None,
            rate_limit: RateLimitConfig::default(),
            reconnect: ReconnectConfig::default(),
            outbound: OutboundPolicy::Reject,
            close_policy: ClosePolicy::Discard,
            ping_interval: Duration::from_secs(60),
            ping_timeout: Duration::from_secs(120),
        }
    }
}

/// Outbound message cap per rolling window. The platform default for
/// unprivileged accounts is 20 messages per 30 seconds.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub messages: usize,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages: 20,
            window: Duration::from_secs(30),
        }
    }
}

/// Exponential backoff with jitter and a retry ceiling.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            max_attempts: 10,
        }
    }
}

/// Behavior of outbound sends while the connection is not Connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundPolicy {
    /// Fail synchronously with [`ChatError::NotConnected`].
    Reject,
    /// Buffer and send once registered.
    Queue,
}

/// Outbound queue handling on close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosePolicy {
    /// Drain queued lines before tearing the transport down.
    Flush,
    /// Drop whatever is still queued.
    Discard,
}

/// Moderation actions; each maps to one outbound protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    DeleteMessage { msg_id: String },
    Timeout {
        user_login: String,
        duration: Duration,
        reason: Option<String>,
    },
    Ban {
        user_login: String,
        reason: Option<String>,
    },
    ClearChat,
}

impl ModerationAction {
    fn render(&self) -> String {
        match self {
            ModerationAction::DeleteMessage { msg_id } => format!("/delete {msg_id}"),
            ModerationAction::Timeout { user_login, duration, reason } => match reason {
                Some(r) => format!("/timeout {user_login} {} {r}", duration.as_secs()),
                None => format!("/timeout {user_login} {}", duration.as_secs()),
            },
            ModerationAction::Ban { user_login, reason } => match reason {
                Some(r) => format!("/ban {user_login} {r}"),
                None => format!("/ban {user_login}"),
            },
            ModerationAction::ClearChat => "/clear".to_string(),
        }
    }
}

/// Commands flowing from callers to the supervisor task.
#[derive(Debug)]
enum Command {
    Join(ChannelRef),
    Part(ChannelRef),
    Send { channel: ChannelRef, text: String },
    Raw(String),
    Close,
}

/// Lines headed for the writer task. Control traffic (handshake, PONG,
/// JOIN/PART) bypasses the rate limiter; message traffic does not.
#[derive(Debug)]
enum Outbound {
    Control(String),
    Limited(String),
}

/// A chat connection handle. Cheap to clone; all clones share one
/// underlying connection.
#[derive(Clone)]
pub struct ChatClient {
    cmd_tx: mpsc::Sender<Command>,
    dispatcher: Arc<EventDispatcher>,
    tracker: Arc<ChannelTracker>,
    state_rx: watch::Receiver<ConnectionState>,
    outbound: OutboundPolicy,
}

impl ChatClient {
    /// Connect and authenticate.
    ///
    /// Resolves once the handshake completes. A rejected credential is
    /// terminal ([`ChatError::Authentication`], no auto-retry); transport
    /// failures go through the reconnect policy first and only surface as
    /// [`ChatError::ConnectionLost`] when the retry ceiling is reached.
    pub async fn connect(
        config: ChatConfig,
        connector: impl Connector + 'static,
    ) -> Result<Self, ChatError> {
        let dispatcher = Arc::new(EventDispatcher::new());
        let tracker = Arc::new(ChannelTracker::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (ready_tx, ready_rx) = oneshot::channel();

        let outbound = config.outbound;
        let supervisor = Supervisor {
            login: resolve_login(&config),
            limiter: Arc::new(RateLimiter::new(
                config.rate_limit.messages,
                config.rate_limit.window,
            )),
            config,
            connector: Arc::new(connector),
            dispatcher: Arc::clone(&dispatcher),
            tracker: Arc::clone(&tracker),
            state_tx,
            attempts: 0,
            delay: Duration::ZERO,
        };
        tokio::spawn(supervisor.run(cmd_rx, ready_tx));

        ready_rx.await.map_err(|_| ChatError::Closed)??;
        Ok(Self {
            cmd_tx,
            dispatcher,
            tracker,
            state_rx,
            outbound,
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Event subscription registry.
    pub fn events(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Stable snapshot of joined/pending channels.
    pub fn channels(&self) -> ChannelSnapshot {
        self.tracker.snapshot()
    }

    /// Request a channel join. Idempotent; tracked across reconnects.
    pub async fn join(&self, channel: &ChannelRef) -> Result<(), ChatError> {
        self.send_cmd(Command::Join(channel.clone())).await
    }

    /// Leave a channel and release its state.
    pub async fn part(&self, channel: &ChannelRef) -> Result<(), ChatError> {
        self.send_cmd(Command::Part(channel.clone())).await
    }

    /// Send a chat message. Queues behind the outbound rate limit.
    pub async fn send_message(&self, channel: &ChannelRef, text: &str) -> Result<(), ChatError> {
        self.guard_connected()?;
        self.send_cmd(Command::Send {
            channel: channel.clone(),
            text: text.to_string(),
        })
        .await
    }

    /// Issue a moderation action in a channel.
    pub async fn send_moderation(
        &self,
        channel: &ChannelRef,
        action: ModerationAction,
    ) -> Result<(), ChatError> {
        self.guard_connected()?;
        self.send_cmd(Command::Send {
            channel: channel.clone(),
            text: action.render(),
        })
        .await
    }

    /// Send a raw protocol line. Rate-limited like a message.
    pub async fn send_raw(&self, line: &str) -> Result<(), ChatError> {
        self.guard_connected()?;
        self.send_cmd(Command::Raw(line.to_string())).await
    }

    /// Tear the connection down: cancels the read loop and any pending
    /// reconnect backoff, applies the close policy to queued outbound
    /// lines, and releases all channel state. Terminal.
    pub async fn close(&self) -> Result<(), ChatError> {
        let _ = self.cmd_tx.send(Command::Close).await;
        let mut rx = self.state_rx.clone();
        let _ = rx
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await;
        Ok(())
    }

    fn guard_connected(&self) -> Result<(), ChatError> {
        if self.outbound == OutboundPolicy::Reject && self.state() != ConnectionState::Connected {
            return Err(ChatError::NotConnected);
        }
        Ok(())
    }

    async fn send_cmd(&self, cmd: Command) -> Result<(), ChatError> {
        self.cmd_tx.send(cmd).await.map_err(|_| ChatError::Closed)
    }
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("state", &self.state())
            .field("channels", &self.tracker.snapshot().len())
            .field("outbound", &self.outbound)
            .finish_non_exhaustive()
    }
}

fn resolve_login(config: &ChatConfig) -> String {
    match &config.credential {
        Some(cred) => cred.login.to_ascii_lowercase(),
        None => format!("guest{}", rand::thread_rng().gen_range(10_000..100_000u32)),
    }
}

/// Why a session ended, from the supervisor's point of view.
enum SessionEnd {
    /// Credentials rejected before registration. Terminal.
    AuthFailed(String),
    /// Explicit close. Terminal.
    Closed,
    /// Transport-level loss; subject to the reconnect policy.
    /// `registered` records whether the handshake had completed, which
    /// resets the backoff schedule.
    Transport { reason: String, registered: bool },
}

struct Supervisor {
    config: ChatConfig,
    login: String,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<EventDispatcher>,
    tracker: Arc<ChannelTracker>,
    state_tx: watch::Sender<ConnectionState>,
    limiter: Arc<RateLimiter>,
    attempts: u32,
    delay: Duration,
}

impl Supervisor {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        ready_tx: oneshot::Sender<Result<(), ChatError>>,
    ) {
        let mut ready = Some(ready_tx);
        let mut carryover: Vec<Command> = Vec::new();
        self.delay = self.config.reconnect.initial_delay;
        self.state_tx.send_replace(ConnectionState::Connecting);

        loop {
            let stream = match self.connector.connect().await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, attempt = self.attempts + 1, "connect failed");
                    if self
                        .backoff_or_terminate(&mut cmd_rx, &mut ready, &mut carryover, e.to_string())
                        .await
                    {
                        return;
                    }
                    continue;
                }
            };

            self.state_tx.send_replace(ConnectionState::Authenticating);
            let ctx = SessionCtx {
                config: &self.config,
                login: &self.login,
                dispatcher: &self.dispatcher,
                tracker: &self.tracker,
                state_tx: &self.state_tx,
            };
            let end = run_session(
                &ctx,
                &mut cmd_rx,
                stream,
                Arc::clone(&self.limiter),
                &mut carryover,
                &mut ready,
            )
            .await;

            match end {
                SessionEnd::AuthFailed(reason) => {
                    self.terminate();
                    match ready.take() {
                        Some(tx) => {
                            let _ = tx.send(Err(ChatError::Authentication(reason)));
                        }
                        None => self.dispatcher.publish(&ChatEvent::ConnectionLost {
                            reason: format!("authentication rejected: {reason}"),
                        }),
                    }
                    return;
                }
                SessionEnd::Closed => {
                    self.terminate();
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Err(ChatError::Closed));
                    }
                    return;
                }
                SessionEnd::Transport { reason, registered } => {
                    tracing::warn!(reason = %reason, "transport lost");
                    if registered {
                        // A completed handshake resets the backoff schedule.
                        self.attempts = 0;
                        self.delay = self.config.reconnect.initial_delay;
                    }
                    self.tracker.reset_for_reconnect();
                    if self
                        .backoff_or_terminate(&mut cmd_rx, &mut ready, &mut carryover, reason)
                        .await
                    {
                        return;
                    }
                }
            }
        }
    }

    /// Sleep out the backoff delay, still servicing close/join/part.
    /// Returns `true` when the supervisor must terminate (ceiling reached
    /// or explicit close).
    async fn backoff_or_terminate(
        &mut self,
        cmd_rx: &mut mpsc::Receiver<Command>,
        ready: &mut Option<oneshot::Sender<Result<(), ChatError>>>,
        carryover: &mut Vec<Command>,
        reason: String,
    ) -> bool {
        self.attempts += 1;
        if self.attempts > self.config.reconnect.max_attempts {
            let attempts = self.attempts - 1;
            self.terminate();
            self.dispatcher.publish(&ChatEvent::ConnectionLost {
                reason: reason.clone(),
            });
            if let Some(tx) = ready.take() {
                let _ = tx.send(Err(ChatError::ConnectionLost { attempts, reason }));
            }
            return true;
        }

        self.state_tx.send_replace(ConnectionState::Reconnecting);
        let jitter_ceiling = (self.delay.as_millis() as u64 / 4).max(1);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ceiling));
        tracing::info!(
            delay_ms = (self.delay + jitter).as_millis() as u64,
            attempt = self.attempts,
            "reconnecting after backoff"
        );

        let sleep = tokio::time::sleep(self.delay + jitter);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(Command::Close) => {
                        self.terminate();
                        if let Some(tx) = ready.take() {
                            let _ = tx.send(Err(ChatError::Closed));
                        }
                        return true;
                    }
                    Some(Command::Join(channel)) => {
                        self.tracker.mark_pending(channel);
                    }
                    Some(Command::Part(channel)) => {
                        self.tracker.remove(&channel);
                    }
                    Some(other) => {
                        if self.config.outbound == OutboundPolicy::Queue {
                            carryover.push(other);
                        } else {
                            tracing::warn!(?other, "dropping outbound command while disconnected");
                        }
                    }
                },
            }
        }

        let next = self.delay.as_millis() as f64 * self.config.reconnect.backoff_factor;
        self.delay = Duration::from_millis(next as u64).min(self.config.reconnect.max_delay);
        false
    }

    fn terminate(&self) {
        self.tracker.clear();
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }
}

/// Shared, read-only view of the supervisor for the session loop. The
/// tracker and dispatcher use interior locking, so `&` access suffices.
struct SessionCtx<'a> {
    config: &'a ChatConfig,
    login: &'a str,
    dispatcher: &'a EventDispatcher,
    tracker: &'a ChannelTracker,
    state_tx: &'a watch::Sender<ConnectionState>,
}

/// Run one connection from handshake to loss or close.
async fn run_session(
    ctx: &SessionCtx<'_>,
    cmd_rx: &mut mpsc::Receiver<Command>,
    stream: BoxedTransport,
    limiter: Arc<RateLimiter>,
    carryover: &mut Vec<Command>,
    ready: &mut Option<oneshot::Sender<Result<(), ChatError>>>,
) -> SessionEnd {
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let (out_tx, out_rx) = mpsc::channel::<Outbound>(512);
    let writer_task = tokio::spawn(write_loop(writer, out_rx, limiter));

    let mut registered = false;
    let mut pending: Vec<Command> = std::mem::take(carryover);

    let handshake = handshake_lines(ctx);
    for line in handshake {
        if out_tx.send(Outbound::Control(line)).await.is_err() {
            writer_task.abort();
            return transport("writer failed during handshake", registered);
        }
    }

    let mut line_buf = String::new();
    let mut last_activity = tokio::time::Instant::now();
    let ping_interval = ctx.config.ping_interval;
    let ping_timeout = ctx.config.ping_timeout;
    // Next keepalive deadline. Re-armed on traffic and after each PING
    // so an idle connection sends one PING per interval, not a flood.
    let mut next_ping = last_activity + ping_interval;

    let end = loop {
        tokio::select! {
            result = reader.read_line(&mut line_buf) => {
                let n = match result {
                    Ok(n) => n,
                    Err(e) => break transport(&e.to_string(), registered),
                };
                if n == 0 {
                    break transport("connection closed by server", registered);
                }
                last_activity = tokio::time::Instant::now();
                next_ping = last_activity + ping_interval;

                let msg = match Message::parse(&line_buf) {
                    Ok(msg) => msg,
                    Err(e) => {
                        // Parse errors drop the line, never the loop.
                        tracing::warn!(error = %e, "dropping malformed line");
                        line_buf.clear();
                        continue;
                    }
                };
                line_buf.clear();

                if let Some(end) = handle_message(
                    ctx, &msg, &out_tx, &mut registered, &mut pending, ready,
                ).await {
                    break end;
                }
            }
            cmd = cmd_rx.recv() => {
                let cmd = match cmd {
                    // All handles dropped: tear down as an implicit close.
                    None => Command::Close,
                    Some(cmd) => cmd,
                };
                if let Command::Close = cmd {
                    break SessionEnd::Closed;
                }
                if let Some(end) = execute_command(
                    ctx, cmd, &out_tx, registered, &mut pending,
                ).await {
                    break end;
                }
            }
            _ = tokio::time::sleep_until(next_ping) => {
                if last_activity.elapsed() >= ping_timeout {
                    break transport("ping timeout", registered);
                }
                if out_tx.send(Outbound::Control("PING :keepalive".to_string())).await.is_err() {
                    break transport("writer task gone", registered);
                }
                next_ping = tokio::time::Instant::now() + ping_interval;
            }
        }
    };

    // Anything still queued survives into the next session.
    *carryover = pending;

    match (&end, ctx.config.close_policy) {
        (SessionEnd::Closed, ClosePolicy::Flush) => {
            // Dropping the sender lets the writer drain what is queued.
            drop(out_tx);
            let _ = writer_task.await;
        }
        _ => writer_task.abort(),
    }
    end
}

fn handshake_lines(ctx: &SessionCtx<'_>) -> Vec<String> {
    let mut lines = vec![CAP_REQUEST.to_string()];
    if let Some(cred) = &ctx.config.credential {
        lines.push(format!("PASS oauth:{}", cred.token));
    }
    lines.push(format!("NICK {}", ctx.login));
    lines
}

fn transport(reason: &str, registered: bool) -> SessionEnd {
    SessionEnd::Transport {
        reason: reason.to_string(),
        registered,
    }
}

/// React to one inbound message. Returns `Some` when the session must end.
async fn handle_message(
    ctx: &SessionCtx<'_>,
    msg: &Message,
    out_tx: &mpsc::Sender<Outbound>,
    registered: &mut bool,
    pending: &mut Vec<Command>,
    ready: &mut Option<oneshot::Sender<Result<(), ChatError>>>,
) -> Option<SessionEnd> {
    match msg.command.as_str() {
        "PING" => {
            let token = msg.params.first().map(String::as_str).unwrap_or("");
            if out_tx
                .send(Outbound::Control(format!("PONG :{token}")))
                .await
                .is_err()
            {
                return Some(transport("writer task gone", *registered));
            }
            return None;
        }
        "PONG" | "CAP" | "366" => return None,
        "001" => {
            *registered = true;
            ctx.state_tx.send_replace(ConnectionState::Connected);
            if let Some(tx) = ready.take() {
                let _ = tx.send(Ok(()));
            }
            ctx.dispatcher.publish(&ChatEvent::ConnectionEstablished);

            // Re-issue a join for every tracked channel, once each, in
            // tracker order. Idempotent across reconnects.
            for channel in ctx.tracker.channels_in_order() {
                if out_tx
                    .send(Outbound::Control(format!("JOIN {}", channel.wire_name())))
                    .await
                    .is_err()
                {
                    return Some(transport("writer task gone", true));
                }
            }
            for cmd in std::mem::take(pending) {
                if let Some(end) = execute_command(ctx, cmd, out_tx, *registered, pending).await {
                    return Some(end);
                }
            }
            return None;
        }
        "353" => {
            // NAMES chunk: <me> = <#channel> :<login …>
            if msg.params.len() >= 4 {
                let channel = ChannelRef::from_name(&msg.params[2]);
                let logins = msg.params[3]
                    .split_whitespace()
                    .map(|s| s.trim_start_matches(['@', '+']).to_string());
                ctx.tracker.add_members(&channel, logins);
            }
            return None;
        }
        "RECONNECT" => {
            return Some(transport("server requested reconnect", *registered));
        }
        "NOTICE" if !*registered => {
            let text = msg.trailing().unwrap_or_default();
            if AUTH_FAILURE_NOTICES.iter().any(|n| text.contains(n)) {
                return Some(SessionEnd::AuthFailed(text.to_string()));
            }
        }
        "JOIN" => {
            // Our own join confirmation transitions the channel from
            // pending to active before interpretation, so the event
            // passes the channel-state invariant.
            if msg.prefix_nick() == Some(ctx.login) {
                if let Some(param) = msg.params.first() {
                    ctx.tracker.confirm_join(&ChannelRef::from_name(param));
                }
            }
        }
        _ => {}
    }

    let snapshot = ctx.tracker.snapshot();
    match interpret(msg, &snapshot) {
        Ok(Some(event)) => {
            apply_event_pre_publish(ctx, &event);
            ctx.dispatcher.publish(&event);
            apply_event_post_publish(ctx, &event);
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(command = %e.command, reason = e.reason, "dropping uninterpretable message");
        }
    }
    None
}

/// Tracker updates that must be visible to handlers of this event.
fn apply_event_pre_publish(ctx: &SessionCtx<'_>, event: &ChatEvent) {
    match event {
        ChatEvent::Join { channel, user } => {
            ctx.tracker.member_joined(channel, &user.login);
        }
        ChatEvent::UserState { channel, user, .. } => {
            ctx.tracker.set_our_state(channel, user.clone());
        }
        _ => {}
    }
}

/// Tracker updates that happen after delivery — a self-part releases the
/// channel state only once subscribers have seen the event.
fn apply_event_post_publish(ctx: &SessionCtx<'_>, event: &ChatEvent) {
    if let ChatEvent::Part { channel, user } = event {
        if user.login == ctx.login {
            ctx.tracker.remove(channel);
        } else {
            ctx.tracker.member_parted(channel, &user.login);
        }
    }
}

/// Put one caller command on the wire (or queue it). Returns `Some` when
/// the session must end.
async fn execute_command(
    ctx: &SessionCtx<'_>,
    cmd: Command,
    out_tx: &mpsc::Sender<Outbound>,
    registered: bool,
    pending: &mut Vec<Command>,
) -> Option<SessionEnd> {
    let outbound = match cmd {
        Command::Join(channel) => {
            let newly_tracked = ctx.tracker.mark_pending(channel.clone());
            if !registered || !newly_tracked {
                // Unregistered joins are replayed from the tracker after
                // the 001 welcome; duplicates are suppressed.
                return None;
            }
            Outbound::Control(format!("JOIN {}", channel.wire_name()))
        }
        Command::Part(channel) => {
            let was_tracked = ctx.tracker.remove(&channel);
            if !registered || !was_tracked {
                return None;
            }
            Outbound::Control(format!("PART {}", channel.wire_name()))
        }
        cmd @ (Command::Send { .. } | Command::Raw(_)) if !registered => {
            match ctx.config.outbound {
                OutboundPolicy::Queue => pending.push(cmd),
                OutboundPolicy::Reject => {
                    // The client already rejects these synchronously; a
                    // race across a state transition lands here.
                    tracing::warn!("dropping outbound command while unregistered");
                }
            }
            return None;
        }
        Command::Send { channel, text } => {
            Outbound::Limited(format!("PRIVMSG {} :{}", channel.wire_name(), text))
        }
        Command::Raw(line) => Outbound::Limited(line),
        Command::Close => unreachable!("close handled by the session loop"),
    };

    if out_tx.send(outbound).await.is_err() {
        return Some(transport("writer task gone", registered));
    }
    None
}

/// Writer task: serializes all outbound traffic for one session and
/// enforces the rolling-window rate limit on message traffic without
/// ever blocking the read loop.
async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut out_rx: mpsc::Receiver<Outbound>,
    limiter: Arc<RateLimiter>,
) {
    while let Some(outbound) = out_rx.recv().await {
        let line = match outbound {
            Outbound::Control(line) => line,
            Outbound::Limited(line) => {
                limiter.acquire().await;
                line
            }
        };
        if let Err(e) = writer.write_all(format!("{line}\r\n").as_bytes()).await {
            tracing::debug!(error = %e, "outbound write failed");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderation_actions_render_to_single_lines() {
        assert_eq!(
            ModerationAction::DeleteMessage { msg_id: "XYZ".into() }.render(),
            "/delete XYZ"
        );
        assert_eq!(
            ModerationAction::Timeout {
                user_login: "bob".into(),
                duration: Duration::from_secs(600),
                reason: Some("spam".into()),
            }
            .render(),
            "/timeout bob 600 spam"
        );
        assert_eq!(
            ModerationAction::Ban { user_login: "bob".into(), reason: None }.render(),
            "/ban bob"
        );
        assert_eq!(ModerationAction::ClearChat.render(), "/clear");
    }

    #[test]
    fn guest_login_generated_without_credential() {
        let login = resolve_login(&ChatConfig::default());
        assert!(login.starts_with("guest"));
    }

    #[test]
    fn credential_login_lowercased() {
        let config = ChatConfig {
            credential: Some(Credential::new("Alice", "token")),
            ..ChatConfig::default()
        };
        assert_eq!(resolve_login(&config), "alice");
    }
}
