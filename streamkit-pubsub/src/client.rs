//! PubSub connection management.
//!
//! One spawned task per client owns the WebSocket: it serializes
//! LISTEN/UNLISTEN requests, matches RESPONSE frames back to callers by
//! nonce, keeps the socket alive with jittered PINGs, and reconnects on
//! loss or a server RECONNECT, re-listening every confirmed topic. The
//! lifecycle is fully independent of the chat connection.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use streamkit_common::Credential;

use crate::error::PubSubError;
use crate::frame::{Frame, SubscribeData};
use crate::topic::Topic;

/// Configuration for one PubSub connection.
#[derive(Debug, Clone)]
pub struct PubSubConfig {
    /// WebSocket endpoint (`wss://...`).
    pub url: String,
    /// Token attached to LISTEN requests for credential-scoped topics.
    pub credential: Option<Credential>,
    /// Base keepalive interval; the server drops silent clients after ~5
    /// minutes, so we ping well inside that.
    pub ping_interval: Duration,
    /// Random extra delay added to each ping so a fleet of clients does
    /// not ping in lockstep.
    pub ping_jitter: Duration,
    /// Missing PONG within this window forces a reconnect.
    pub pong_timeout: Duration,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            credential: None,
            ping_interval: Duration::from_secs(4 * 60),
            ping_jitter: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
        }
    }
}

impl PubSubConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }
}

/// Events surfaced to the consumer.
#[derive(Debug)]
pub enum PubSubEvent {
    /// Socket (re)established; confirmed topics have been re-listened.
    Connected,
    /// A payload arrived on a listened topic. Unknown topics surface the
    /// raw JSON; see [`crate::ShoutoutPayload::decode`] for typed access.
    Message {
        topic: Topic,
        payload: serde_json::Value,
    },
    /// Socket lost; the client is reconnecting in the background.
    Disconnected { reason: String },
}

enum Cmd {
    Listen {
        topics: Vec<Topic>,
        done: oneshot::Sender<Result<(), PubSubError>>,
    },
    Unlisten {
        topics: Vec<Topic>,
        done: oneshot::Sender<Result<(), PubSubError>>,
    },
    Close,
}

/// Handle to a PubSub connection. Cheap to clone.
#[derive(Clone)]
pub struct PubSubClient {
    cmd_tx: mpsc::Sender<Cmd>,
}

impl PubSubClient {
    /// Spawn the connection task. Events arrive on the returned receiver;
    /// dropping it does not close the connection (use [`close`]).
    ///
    /// [`close`]: PubSubClient::close
    pub fn connect(config: PubSubConfig) -> (Self, mpsc::Receiver<PubSubEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);
        tokio::spawn(run(config, cmd_rx, event_tx));
        (Self { cmd_tx }, event_rx)
    }

    /// Subscribe to topics. Resolves when the server confirms or rejects
    /// the request. Confirmed topics are re-listened automatically after
    /// every reconnect.
    pub async fn listen(&self, topics: Vec<Topic>) -> Result<(), PubSubError> {
        self.request(|done| Cmd::Listen { topics, done }).await
    }

    /// Unsubscribe from topics.
    pub async fn unlisten(&self, topics: Vec<Topic>) -> Result<(), PubSubError> {
        self.request(|done| Cmd::Unlisten { topics, done }).await
    }

    /// Tear the connection down. Terminal.
    pub async fn close(&self) {
        let _ = self.cmd_tx.send(Cmd::Close).await;
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), PubSubError>>) -> Cmd,
    ) -> Result<(), PubSubError> {
        let (done, wait) = oneshot::channel();
        self.cmd_tx
            .send(make(done))
            .await
            .map_err(|_| PubSubError::Closed)?;
        wait.await.map_err(|_| PubSubError::Closed)?
    }
}

struct PendingRequest {
    done: oneshot::Sender<Result<(), PubSubError>>,
    topics: Vec<Topic>,
    unlisten: bool,
}

/// Nonce bookkeeping: every in-flight LISTEN/UNLISTEN keyed by the nonce
/// the server will echo back.
#[derive(Default)]
struct RequestRegistry {
    next_nonce: u64,
    pending: HashMap<String, PendingRequest>,
}

impl RequestRegistry {
    fn register(
        &mut self,
        topics: Vec<Topic>,
        unlisten: bool,
        done: oneshot::Sender<Result<(), PubSubError>>,
    ) -> String {
        self.next_nonce += 1;
        let nonce = format!("req-{}", self.next_nonce);
        self.pending.insert(
            nonce.clone(),
            PendingRequest {
                done,
                topics,
                unlisten,
            },
        );
        nonce
    }

    /// Match a RESPONSE to its request, updating the confirmed-topic set
    /// on success. Returns `false` for unknown or missing nonces.
    fn resolve(
        &mut self,
        nonce: Option<&str>,
        error: &str,
        confirmed: &mut HashSet<Topic>,
    ) -> bool {
        let Some(request) = nonce.and_then(|n| self.pending.remove(n)) else {
            return false;
        };
        let result = if error.is_empty() {
            if request.unlisten {
                for topic in &request.topics {
                    confirmed.remove(topic);
                }
            } else {
                confirmed.extend(request.topics.iter().cloned());
            }
            Ok(())
        } else {
            Err(PubSubError::from_response(error))
        };
        let _ = request.done.send(result);
        true
    }

    /// Fail every in-flight request (socket lost before the answer).
    fn drain_interrupted(&mut self) {
        for (_, request) in self.pending.drain() {
            let _ = request.done.send(Err(PubSubError::Interrupted));
        }
    }
}

async fn run(
    config: PubSubConfig,
    mut cmd_rx: mpsc::Receiver<Cmd>,
    event_tx: mpsc::Sender<PubSubEvent>,
) {
    let mut delay = config.initial_reconnect_delay;
    let mut confirmed: HashSet<Topic> = HashSet::new();
    loop {
        let ws = match tokio_tungstenite::connect_async(config.url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                tracing::warn!(error = %e, url = %config.url, "pubsub connect failed");
                let _ = event_tx
                    .send(PubSubEvent::Disconnected {
                        reason: e.to_string(),
                    })
                    .await;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = wait_for_close(&mut cmd_rx) => return,
                }
                delay = (delay * 2).min(config.max_reconnect_delay);
                continue;
            }
        };
        delay = config.initial_reconnect_delay;
        tracing::debug!(url = %config.url, "pubsub connected");

        match run_socket(&config, ws, &mut cmd_rx, &event_tx, &mut confirmed).await {
            SocketEnd::Closed => return,
            SocketEnd::Lost(reason) => {
                tracing::warn!(reason = %reason, "pubsub socket lost, reconnecting");
                let _ = event_tx.send(PubSubEvent::Disconnected { reason }).await;
            }
        }
    }
}

/// Consume commands while disconnected; resolves only on close.
async fn wait_for_close(cmd_rx: &mut mpsc::Receiver<Cmd>) {
    loop {
        match cmd_rx.recv().await {
            None | Some(Cmd::Close) => return,
            Some(Cmd::Listen { done, .. }) | Some(Cmd::Unlisten { done, .. }) => {
                let _ = done.send(Err(PubSubError::Interrupted));
            }
        }
    }
}

enum SocketEnd {
    Closed,
    Lost(String),
}

async fn run_socket<S>(
    config: &PubSubConfig,
    ws: tokio_tungstenite::WebSocketStream<S>,
    cmd_rx: &mut mpsc::Receiver<Cmd>,
    event_tx: &mpsc::Sender<PubSubEvent>,
    confirmed: &mut HashSet<Topic>,
) -> SocketEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let mut registry = RequestRegistry::default();
    let mut pong_deadline: Option<tokio::time::Instant> = None;
    let mut next_ping_at =
        tokio::time::Instant::now() + jittered(config.ping_interval, config.ping_jitter);

    // Re-listen everything that was confirmed before the previous socket
    // went away. The response flows through the registry like any other;
    // nobody is waiting on the result.
    if !confirmed.is_empty() {
        let topics: Vec<Topic> = confirmed.iter().cloned().collect();
        let data = SubscribeData {
            topics: topics.iter().map(Topic::render).collect(),
            auth_token: config.credential.as_ref().map(|c| c.token.clone()),
        };
        let (done, _discard) = oneshot::channel();
        let nonce = registry.register(topics, false, done);
        if send_frame(&mut sink, &Frame::Listen { nonce, data })
            .await
            .is_err()
        {
            registry.drain_interrupted();
            return SocketEnd::Lost("write failed during re-listen".into());
        }
    }
    let _ = event_tx.send(PubSubEvent::Connected).await;

    let end = loop {
        let pong_at = pong_deadline;
        let pong_due = async move {
            match pong_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            incoming = stream.next() => {
                let raw = match incoming {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => {
                        break SocketEnd::Lost("socket closed by server".into());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break SocketEnd::Lost(e.to_string()),
                };
                let frame = match Frame::from_json(&raw) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping unparseable pubsub frame");
                        continue;
                    }
                };
                match frame {
                    Frame::Pong => pong_deadline = None,
                    Frame::Ping => {
                        if send_frame(&mut sink, &Frame::Pong).await.is_err() {
                            break SocketEnd::Lost("write failed".into());
                        }
                    }
                    Frame::Reconnect => {
                        break SocketEnd::Lost("server requested reconnect".into());
                    }
                    Frame::Response { nonce, error } => {
                        if !registry.resolve(nonce.as_deref(), &error, confirmed) {
                            tracing::debug!(?nonce, "response with unknown nonce");
                        }
                    }
                    Frame::Message { data } => {
                        let payload = match serde_json::from_str(&data.message) {
                            Ok(value) => value,
                            Err(e) => {
                                tracing::warn!(topic = %data.topic, error = %e,
                                    "dropping message with unparseable payload");
                                continue;
                            }
                        };
                        let _ = event_tx.send(PubSubEvent::Message {
                            topic: Topic::parse(&data.topic),
                            payload,
                        }).await;
                    }
                    Frame::Listen { .. } | Frame::Unlisten { .. } => {
                        tracing::debug!("ignoring client-only frame from server");
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                let (topics, unlisten, done) = match cmd {
                    None | Some(Cmd::Close) => break SocketEnd::Closed,
                    Some(Cmd::Listen { topics, done }) => (topics, false, done),
                    Some(Cmd::Unlisten { topics, done }) => (topics, true, done),
                };
                let data = SubscribeData {
                    topics: topics.iter().map(Topic::render).collect(),
                    auth_token: config.credential.as_ref().map(|c| c.token.clone()),
                };
                let nonce = registry.register(topics, unlisten, done);
                let frame = if unlisten {
                    Frame::Unlisten { nonce, data }
                } else {
                    Frame::Listen { nonce, data }
                };
                if send_frame(&mut sink, &frame).await.is_err() {
                    break SocketEnd::Lost("write failed".into());
                }
            }
            _ = tokio::time::sleep_until(next_ping_at) => {
                if send_frame(&mut sink, &Frame::Ping).await.is_err() {
                    break SocketEnd::Lost("write failed".into());
                }
                pong_deadline = Some(tokio::time::Instant::now() + config.pong_timeout);
                next_ping_at = tokio::time::Instant::now()
                    + jittered(config.ping_interval, config.ping_jitter);
            }
            _ = pong_due => {
                break SocketEnd::Lost("pong timeout".into());
            }
        }
    };

    registry.drain_interrupted();
    let _ = sink.close().await;
    end
}

fn jittered(base: Duration, jitter: Duration) -> Duration {
    let extra = jitter.as_millis() as u64;
    if extra == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..extra))
}

async fn send_frame<S>(
    sink: &mut futures::stream::SplitSink<tokio_tungstenite::WebSocketStream<S>, WsMessage>,
    frame: &Frame,
) -> Result<(), PubSubError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let json = frame
        .to_json()
        .map_err(|e| PubSubError::Server(e.to_string()))?;
    sink.send(WsMessage::Text(json)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_matches_by_nonce_and_confirms_topics() {
        let mut registry = RequestRegistry::default();
        let mut confirmed = HashSet::new();

        let (done_a, wait_a) = oneshot::channel();
        let (done_b, wait_b) = oneshot::channel();
        let nonce_a = registry.register(vec![Topic::shoutouts("1")], false, done_a);
        let nonce_b = registry.register(vec![Topic::shoutouts("2")], false, done_b);
        assert_ne!(nonce_a, nonce_b);

        // Answer the second request first; only it resolves.
        assert!(registry.resolve(Some(&nonce_b), "", &mut confirmed));
        assert!(wait_b.blocking_recv().unwrap().is_ok());
        assert!(confirmed.contains(&Topic::shoutouts("2")));
        assert!(!confirmed.contains(&Topic::shoutouts("1")));

        assert!(registry.resolve(Some(&nonce_a), "", &mut confirmed));
        assert!(wait_a.blocking_recv().unwrap().is_ok());
        assert!(confirmed.contains(&Topic::shoutouts("1")));
    }

    #[test]
    fn resolve_surfaces_error_codes() {
        let mut registry = RequestRegistry::default();
        let mut confirmed = HashSet::new();

        let (done, wait) = oneshot::channel();
        let nonce = registry.register(vec![Topic::shoutouts("1")], false, done);
        assert!(registry.resolve(Some(&nonce), "ERR_BADAUTH", &mut confirmed));

        match wait.blocking_recv().unwrap() {
            Err(PubSubError::BadAuth(_)) => {}
            other => panic!("expected BadAuth, got {other:?}"),
        }
        assert!(confirmed.is_empty());
    }

    #[test]
    fn unlisten_success_removes_confirmed_topic() {
        let mut registry = RequestRegistry::default();
        let mut confirmed: HashSet<Topic> = [Topic::shoutouts("1")].into_iter().collect();

        let (done, wait) = oneshot::channel();
        let nonce = registry.register(vec![Topic::shoutouts("1")], true, done);
        assert!(registry.resolve(Some(&nonce), "", &mut confirmed));
        assert!(wait.blocking_recv().unwrap().is_ok());
        assert!(confirmed.is_empty());
    }

    #[test]
    fn unknown_or_missing_nonce_resolves_nothing() {
        let mut registry = RequestRegistry::default();
        let mut confirmed = HashSet::new();
        assert!(!registry.resolve(Some("req-99"), "", &mut confirmed));
        assert!(!registry.resolve(None, "", &mut confirmed));
    }

    #[test]
    fn drain_fails_in_flight_requests() {
        let mut registry = RequestRegistry::default();
        let (done, wait) = oneshot::channel();
        registry.register(vec![Topic::shoutouts("1")], false, done);

        registry.drain_interrupted();
        match wait.blocking_recv().unwrap() {
            Err(PubSubError::Interrupted) => {}
            other => panic!("expected Interrupted, got {other:?}"),
        }
    }
}
