//! Connection lifecycle tests against a scripted in-memory server.
//!
//! Each test drives the server side of a `tokio::io::duplex` pair by
//! hand, which exercises the real handshake, read loop, reconnect, and
//! rejoin paths without a network.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

use streamkit_chat::conn::{BoxedTransport, Connector};
use streamkit_chat::{
    ChatClient, ChatConfig, ChatError, ChatEvent, ConnectionState, EventKind, ReconnectConfig,
};
use streamkit_common::{ChannelRef, Credential};

/// Hands the server side of each accepted connection to the test, and
/// refuses connections once `max_sessions` have been granted.
struct ScriptedConnector {
    server_tx: mpsc::UnboundedSender<DuplexStream>,
    remaining: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    fn new(max_sessions: usize) -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        (
            Self {
                server_tx,
                remaining: Arc::new(AtomicUsize::new(max_sessions)),
            },
            server_rx,
        )
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> io::Result<BoxedTransport> {
        let granted = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !granted {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        }
        let (client, server) = tokio::io::duplex(4096);
        self.server_tx
            .send(server)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "test dropped server side"))?;
        Ok(Box::new(client))
    }
}

/// Server side of one accepted connection.
struct Server {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl Server {
    fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end().to_string()),
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    /// Consume the client handshake and reply with the welcome. Returns
    /// the nick the client registered with.
    async fn register(&mut self) -> String {
        loop {
            let line = self.read_line().await.expect("handshake line");
            if let Some(nick) = line.strip_prefix("NICK ") {
                let nick = nick.to_string();
                self.send(&format!(":server 001 {nick} :Welcome")).await;
                return nick;
            }
        }
    }
}

fn fast_reconnect(max_attempts: u32) -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_factor: 2.0,
        max_attempts,
    }
}

#[tokio::test(start_paused = true)]
async fn connect_completes_on_welcome() {
    let (connector, mut server_rx) = ScriptedConnector::new(1);

    let server_task = tokio::spawn(async move {
        let mut server = Server::new(server_rx.recv().await.unwrap());
        let nick = server.register().await;
        (server, nick)
    });

    let client = ChatClient::connect(ChatConfig::default(), connector)
        .await
        .unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    let (_server, nick) = server_task.await.unwrap();
    assert!(nick.starts_with("guest"));
}

#[tokio::test(start_paused = true)]
async fn handshake_sends_caps_and_credentials() {
    let (connector, mut server_rx) = ScriptedConnector::new(1);

    let server_task = tokio::spawn(async move {
        let mut server = Server::new(server_rx.recv().await.unwrap());
        let cap = server.read_line().await.unwrap();
        let pass = server.read_line().await.unwrap();
        let nick = server.read_line().await.unwrap();
        server.send(":server 001 alice :Welcome").await;
        (server, cap, pass, nick)
    });

    let config = ChatConfig {
        credential: Some(Credential::new("Alice", "oauth:sekrit")),
        ..ChatConfig::default()
    };
    let _client = ChatClient::connect(config, connector).await.unwrap();

    let (_server, cap, pass, nick) = server_task.await.unwrap();
    assert_eq!(cap, "CAP REQ :message-tags commands membership");
    assert_eq!(pass, "PASS oauth:sekrit");
    assert_eq!(nick, "NICK alice");
}

#[tokio::test(start_paused = true)]
async fn auth_rejection_is_terminal() {
    let (connector, mut server_rx) = ScriptedConnector::new(1);

    tokio::spawn(async move {
        let mut server = Server::new(server_rx.recv().await.unwrap());
        // Swallow the handshake, then reject instead of welcoming.
        while let Some(line) = server.read_line().await {
            if line.starts_with("NICK ") {
                break;
            }
        }
        server
            .send(":server NOTICE * :Login authentication failed")
            .await;
        // Keep the transport open so the failure is attributed to the
        // NOTICE, not to EOF.
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(server);
    });

    let config = ChatConfig {
        credential: Some(Credential::new("alice", "badtoken")),
        reconnect: fast_reconnect(5),
        ..ChatConfig::default()
    };
    let err = ChatClient::connect(config, connector).await.unwrap_err();
    match err {
        ChatError::Authentication(reason) => {
            assert!(reason.contains("Login authentication failed"))
        }
        other => panic!("expected Authentication, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn message_events_flow_after_join() {
    let (connector, mut server_rx) = ScriptedConnector::new(1);

    let connect = ChatClient::connect(ChatConfig::default(), connector);
    tokio::pin!(connect);
    let mut server = tokio::select! {
        stream = server_rx.recv() => Server::new(stream.unwrap()),
        _ = &mut connect => panic!("connect resolved before server accepted"),
    };
    let reg = tokio::spawn(async move {
        let nick = server.register().await;
        (server, nick)
    });
    let client = connect.await.unwrap();
    let (mut server, nick) = reg.await.unwrap();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    client.events().subscribe(EventKind::Message, move |event| {
        event_tx.send(event.clone())?;
        Ok(())
    });

    client
        .join(&ChannelRef::from_name("somechannel"))
        .await
        .unwrap();
    assert_eq!(server.read_line().await.unwrap(), "JOIN #somechannel");
    // Confirm the join so channel-scoped events are routable.
    server
        .send(&format!(":{nick}!{nick}@x JOIN #somechannel"))
        .await;
    server
        .send("@id=m1;display-name=Bob :bob!bob@x PRIVMSG #somechannel :hello there")
        .await;

    let event = event_rx.recv().await.unwrap();
    match event {
        ChatEvent::Message { channel, user, text, msg_id, .. } => {
            assert_eq!(channel.name, "somechannel");
            assert_eq!(user.login, "bob");
            assert_eq!(text, "hello there");
            assert_eq!(msg_id.as_deref(), Some("m1"));
        }
        other => panic!("expected Message, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn reconnect_rejoins_channels_once_in_join_order() {
    let (connector, mut server_rx) = ScriptedConnector::new(2);

    let config = ChatConfig {
        reconnect: fast_reconnect(5),
        ..ChatConfig::default()
    };
    let connect = ChatClient::connect(config, connector);
    tokio::pin!(connect);
    let mut server = tokio::select! {
        stream = server_rx.recv() => Server::new(stream.unwrap()),
        _ = &mut connect => panic!("connect resolved before server accepted"),
    };
    let reg = tokio::spawn(async move {
        let nick = server.register().await;
        (server, nick)
    });
    let client = connect.await.unwrap();
    let (mut server, nick) = reg.await.unwrap();

    client.join(&ChannelRef::from_name("zeta")).await.unwrap();
    client.join(&ChannelRef::from_name("alpha")).await.unwrap();
    assert_eq!(server.read_line().await.unwrap(), "JOIN #zeta");
    assert_eq!(server.read_line().await.unwrap(), "JOIN #alpha");
    server.send(&format!(":{nick}!{nick}@x JOIN #zeta")).await;
    server.send(&format!(":{nick}!{nick}@x JOIN #alpha")).await;

    // Kill the first session; the client must reconnect and re-issue
    // exactly one join per tracked channel, in original join order.
    drop(server);
    let mut server = Server::new(server_rx.recv().await.unwrap());
    server.register().await;
    assert_eq!(server.read_line().await.unwrap(), "JOIN #zeta");
    assert_eq!(server.read_line().await.unwrap(), "JOIN #alpha");

    // No duplicate joins follow.
    let extra = tokio::time::timeout(Duration::from_millis(200), server.read_line()).await;
    assert!(extra.is_err(), "unexpected extra line: {extra:?}");
    assert_eq!(client.channels().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_ceiling_emits_connection_lost_and_rejects_sends() {
    let (connector, mut server_rx) = ScriptedConnector::new(1);

    let config = ChatConfig {
        reconnect: fast_reconnect(2),
        ..ChatConfig::default()
    };
    let connect = ChatClient::connect(config, connector);
    tokio::pin!(connect);
    let mut server = tokio::select! {
        stream = server_rx.recv() => Server::new(stream.unwrap()),
        _ = &mut connect => panic!("connect resolved before server accepted"),
    };
    let reg = tokio::spawn(async move {
        let nick = server.register().await;
        (server, nick)
    });
    let client = connect.await.unwrap();
    let (server, _nick) = reg.await.unwrap();

    let (lost_tx, mut lost_rx) = mpsc::unbounded_channel();
    client.events().subscribe(EventKind::ConnectionLost, move |event| {
        lost_tx.send(event.clone())?;
        Ok(())
    });

    // Drop the transport; every reconnect attempt is refused, so the
    // retry ceiling is reached and the client gives up.
    drop(server);
    let lost = lost_rx.recv().await.unwrap();
    assert!(matches!(lost, ChatEvent::ConnectionLost { .. }));

    let mut state_rx = client.state_changes();
    state_rx
        .wait_for(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();
    assert!(client.channels().is_empty());

    let err = client
        .send_message(&ChannelRef::from_name("somechannel"), "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn idle_keepalive_pings_once_per_interval_then_times_out() {
    let (connector, mut server_rx) = ScriptedConnector::new(1);

    // No reconnect budget: the ping timeout goes straight to Disconnected.
    let config = ChatConfig {
        reconnect: fast_reconnect(0),
        ..ChatConfig::default()
    };
    let connect = ChatClient::connect(config, connector);
    tokio::pin!(connect);
    let mut server = tokio::select! {
        stream = server_rx.recv() => Server::new(stream.unwrap()),
        _ = &mut connect => panic!("connect resolved before server accepted"),
    };
    let reg = tokio::spawn(async move {
        server.register().await;
        // Stay silent and count what the idle client sends until it
        // gives up on us.
        let mut pings = 0;
        while let Some(line) = server.read_line().await {
            if line.starts_with("PING") {
                pings += 1;
            }
        }
        pings
    });
    let client = connect.await.unwrap();

    let mut state_rx = client.state_changes();
    state_rx
        .wait_for(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();

    // Exactly one PING per idle interval before the timeout trips, not
    // a flood from a permanently-expired timer.
    assert_eq!(reg.await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn close_cancels_pending_reconnect() {
    let (connector, mut server_rx) = ScriptedConnector::new(1);

    let config = ChatConfig {
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_secs(3600),
            max_delay: Duration::from_secs(3600),
            backoff_factor: 1.0,
            max_attempts: 1000,
        },
        ..ChatConfig::default()
    };
    let connect = ChatClient::connect(config, connector);
    tokio::pin!(connect);
    let mut server = tokio::select! {
        stream = server_rx.recv() => Server::new(stream.unwrap()),
        _ = &mut connect => panic!("connect resolved before server accepted"),
    };
    let reg = tokio::spawn(async move {
        let nick = server.register().await;
        (server, nick)
    });
    let client = connect.await.unwrap();
    let (server, _nick) = reg.await.unwrap();

    drop(server);
    let mut state_rx = client.state_changes();
    state_rx
        .wait_for(|s| *s == ConnectionState::Reconnecting)
        .await
        .unwrap();

    // Close resolves promptly even though the backoff delay is an hour.
    client.close().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // The supervisor is gone; further commands report the closed state.
    let err = client.join(&ChannelRef::from_name("a")).await.unwrap_err();
    assert!(matches!(err, ChatError::Closed));
}

#[tokio::test(start_paused = true)]
async fn outbound_messages_reach_the_wire() {
    let (connector, mut server_rx) = ScriptedConnector::new(1);

    let connect = ChatClient::connect(ChatConfig::default(), connector);
    tokio::pin!(connect);
    let mut server = tokio::select! {
        stream = server_rx.recv() => Server::new(stream.unwrap()),
        _ = &mut connect => panic!("connect resolved before server accepted"),
    };
    let reg = tokio::spawn(async move {
        let nick = server.register().await;
        (server, nick)
    });
    let client = connect.await.unwrap();
    let (mut server, _nick) = reg.await.unwrap();

    let chan = ChannelRef::from_name("somechannel");
    client.send_message(&chan, "hello").await.unwrap();
    client
        .send_moderation(
            &chan,
            streamkit_chat::ModerationAction::Timeout {
                user_login: "bob".into(),
                duration: Duration::from_secs(600),
                reason: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        server.read_line().await.unwrap(),
        "PRIVMSG #somechannel :hello"
    );
    assert_eq!(
        server.read_line().await.unwrap(),
        "PRIVMSG #somechannel :/timeout bob 600"
    );
}
