//! End-to-end tests: real WebSocket clients against a relay on a Unix socket.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as Frame;
use ws_relay::relay::{ControlId, InterceptError, Interceptor, Interceptors, Message, MsgId};
use ws_relay::net::ListenerError;
use ws_relay::{Connection, RelayConfig, Shutdown};

mod common;

use common::{Client, TestRelay};

const STEP: Duration = Duration::from_secs(2);

async fn next_message(client: &mut Client) -> Message {
    loop {
        let frame = timeout(STEP, client.next())
            .await
            .expect("no frame from relay")
            .expect("stream ended")
            .unwrap();
        match frame {
            Frame::Text(text) => return Message::from_json(text.as_str()).unwrap(),
            Frame::Ping(_) | Frame::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn accept(relay: &mut TestRelay) -> Connection {
    timeout(STEP, relay.listener().accept())
        .await
        .expect("no connection accepted")
        .expect("listener closed")
}

fn echo(mut connection: Connection) {
    tokio::spawn(async move {
        while let Some(message) = connection.receive().await {
            if connection.send_message(message).is_err() {
                break;
            }
        }
    });
}

struct Alice;

#[async_trait]
impl Interceptor for Alice {
    async fn intercept(&self, message: &Message) -> Result<Message, InterceptError> {
        let _token: String = message.decode().map_err(InterceptError::Payload)?;
        Message::new(MsgId::login(), "alice").map_err(InterceptError::Encode)
    }
}

#[tokio::test]
async fn echoes_messages_in_order_with_payloads_intact() {
    let mut relay = TestRelay::start(|_| {}, Interceptors::new()).await;
    let mut client = relay.connect().await;
    echo(accept(&mut relay).await);

    let payloads = [r#"{"n": 1,  "tags":["a","b"]}"#, "2", r#""three""#, "null"];
    for (i, payload) in payloads.iter().enumerate() {
        let text = format!(r#"{{"ID":"chat-{i}","Data":{payload}}}"#);
        client.send(Frame::text(text)).await.unwrap();
    }

    for (i, payload) in payloads.iter().enumerate() {
        let reply = next_message(&mut client).await;
        assert_eq!(reply.id().as_str(), format!("chat-{i}"));
        // A null payload is held as absent but still encodes as `null`.
        let expected = format!(r#"{{"ID":"chat-{i}","Data":{payload}}}"#);
        assert_eq!(reply.to_json().unwrap(), expected);
    }
}

#[tokio::test]
async fn application_sends_arrive_in_order() {
    let mut relay = TestRelay::start(|_| {}, Interceptors::new()).await;
    let mut client = relay.connect().await;
    let connection = accept(&mut relay).await;

    for n in 0..10 {
        connection.send("tick", &n).unwrap();
    }

    for n in 0..10 {
        let message = next_message(&mut client).await;
        assert_eq!(message.id().as_str(), "tick");
        assert_eq!(message.decode::<i32>().unwrap(), n);
    }
}

#[tokio::test]
async fn token_is_answered_with_login() {
    let interceptors = Interceptors::new().with(ControlId::Token, Alice);
    let mut relay = TestRelay::start(|_| {}, interceptors).await;
    let mut client = relay.connect().await;
    let mut connection = accept(&mut relay).await;

    client
        .send(Frame::text(r#"{"ID":"token","Data":"\"abc123\""}"#))
        .await
        .unwrap();

    let reply = next_message(&mut client).await;
    assert_eq!(reply.id().as_str(), MsgId::LOGIN);
    assert_eq!(reply.decode::<String>().unwrap(), "alice");

    let seen = timeout(STEP, connection.receive()).await.unwrap().unwrap();
    assert_eq!(seen, reply);
}

#[tokio::test]
async fn silent_peer_is_disconnected() {
    let mut relay = TestRelay::start(
        |config| {
            config.connection.pong_wait_ms = 300;
            config.connection.ping_period_ms = 200;
        },
        Interceptors::new(),
    )
    .await;

    // Never polled, so pings go unanswered.
    let _client = relay.connect().await;
    let mut connection = accept(&mut relay).await;

    let ended = timeout(STEP, connection.receive()).await.expect("peer not dropped");
    assert!(ended.is_none());
    assert!(connection.is_closed());
}

#[tokio::test]
async fn responsive_peer_stays_connected() {
    let mut relay = TestRelay::start(
        |config| {
            config.connection.pong_wait_ms = 300;
            config.connection.ping_period_ms = 200;
        },
        Interceptors::new(),
    )
    .await;

    let mut client = relay.connect().await;
    let mut connection = accept(&mut relay).await;

    // Reading lets the client answer pings.
    let reader = tokio::spawn(async move {
        let mut pings = 0;
        while let Some(Ok(frame)) = client.next().await {
            if frame.is_ping() {
                pings += 1;
            }
        }
        pings
    });

    assert!(timeout(Duration::from_secs(1), connection.receive()).await.is_err());
    assert!(!connection.is_closed());

    connection.close();
    let pings = timeout(STEP, reader).await.unwrap().unwrap();
    assert!(pings >= 3, "only {pings} pings seen");
}

#[tokio::test]
async fn close_sends_a_single_close_frame() {
    let mut relay = TestRelay::start(|_| {}, Interceptors::new()).await;
    let mut client = relay.connect().await;
    let mut connection = accept(&mut relay).await;

    connection.send("bye", &true).unwrap();
    connection.close();

    let last = next_message(&mut client).await;
    assert_eq!(last.id().as_str(), "bye");

    let frame = timeout(STEP, client.next()).await.unwrap().unwrap().unwrap();
    assert!(matches!(frame, Frame::Close(_)), "expected close, got {frame:?}");

    // The handshake completes and nothing follows the close frame.
    let rest = timeout(STEP, client.next()).await.unwrap();
    assert!(!matches!(rest, Some(Ok(_))), "frame after close: {rest:?}");

    assert!(timeout(STEP, connection.receive()).await.unwrap().is_none());
}

#[tokio::test]
async fn session_ends_when_nobody_accepts() {
    let mut relay = TestRelay::start(|_| {}, Interceptors::new()).await;
    relay.drop_listener();

    let mut client = relay.connect().await;
    let next = timeout(STEP, client.next()).await.expect("session left open");
    assert!(
        matches!(next, None | Some(Err(_)) | Some(Ok(Frame::Close(_)))),
        "session still open: {next:?}"
    );
}

#[tokio::test]
async fn invalid_settings_are_rejected_before_listening() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.sock");

    let mut config = RelayConfig::default();
    config.listener.address = format!("unix:{}", path.display());
    config.listener.accept_queue = 0;

    let shutdown = Shutdown::new();
    let result = ws_relay::listen(&config, Interceptors::new(), shutdown.subscribe()).await;
    assert!(matches!(result, Err(ListenerError::Config(_))));
    assert!(!path.exists());
}

#[tokio::test]
async fn non_get_request_is_rejected() {
    let relay = TestRelay::start(|_| {}, Interceptors::new()).await;
    let status = relay
        .raw_status("POST /websocket/ HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
        .await;
    assert!(status.starts_with("HTTP/1.1 405"), "got {status}");
}

#[tokio::test]
async fn plain_get_is_rejected() {
    let relay = TestRelay::start(|_| {}, Interceptors::new()).await;
    let status = relay
        .raw_status("GET /websocket/chat HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await;
    assert!(status.starts_with("HTTP/1.1 400"), "got {status}");
}

#[tokio::test]
async fn connections_are_accepted_in_arrival_order() {
    let mut relay = TestRelay::start(|_| {}, Interceptors::new()).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(relay.connect().await);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    for (i, client) in clients.iter_mut().enumerate() {
        let connection = accept(&mut relay).await;
        connection.send("order", &i).unwrap();
        let message = next_message(client).await;
        assert_eq!(message.decode::<usize>().unwrap(), i);
    }
}

#[tokio::test]
async fn full_accept_queue_holds_sessions_back() {
    let mut relay = TestRelay::start(|config| config.listener.accept_queue = 1, Interceptors::new()).await;

    let mut first = relay.connect().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut second = relay.connect().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let a = accept(&mut relay).await;
    let b = accept(&mut relay).await;
    a.send("who", "first").unwrap();
    b.send("who", "second").unwrap();

    assert_eq!(next_message(&mut first).await.decode::<String>().unwrap(), "first");
    assert_eq!(next_message(&mut second).await.decode::<String>().unwrap(), "second");
}
