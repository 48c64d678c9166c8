use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use sysdash_client::config::{load_config_with, Args};
use sysdash_client::oneshot::run_oneshot;
use sysdash_client::transport::{run_transport, TransportConfig, TransportEvent};
use sysdash_core::{
    Codec, Envelope, InboundMsg, ModuleStatus, Request, RequestStyle, DEFAULT_MAX_FRAME_BYTES,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

async fn listener() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let url = Url::parse(&format!("ws://{addr}/ws")).expect("url");
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("accept timeout")
        .expect("accept");
    accept_async(stream).await.expect("handshake")
}

async fn next_envelope(ws: &mut WebSocketStream<TcpStream>) -> Envelope {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("frame timeout")
            .expect("stream ended")
            .expect("frame");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("envelope");
        }
    }
}

async fn send_envelope(ws: &mut WebSocketStream<TcpStream>, topic: &str, payload: String) {
    let text = serde_json::to_string(&Envelope::new(topic, payload)).expect("encode");
    ws.send(Message::Text(text)).await.expect("send");
}

async fn next_event(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("event timeout")
        .expect("transport stopped")
}

fn parse_args(extra: &[&str]) -> Args {
    let mut argv = vec!["sysdash"];
    argv.extend_from_slice(extra);
    Args::try_parse_from(argv).expect("args")
}

fn transport_config(url: Url, heartbeat: Duration) -> TransportConfig {
    TransportConfig {
        url,
        heartbeat_interval: heartbeat,
        reconnect_delay: Duration::from_millis(50),
        max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        codec: Codec::default(),
        request_style: RequestStyle::PageScoped,
    }
}

#[tokio::test]
async fn delivers_decoded_frames_and_drops_garbage() {
    let (listener, url) = listener().await;
    let (event_tx, mut event_rx) = mpsc::channel(16);
    let (request_tx, request_rx) = mpsc::channel(16);
    let transport = tokio::spawn(run_transport(
        transport_config(url, Duration::from_secs(60)),
        event_tx,
        request_rx,
    ));

    let mut server = accept(&listener).await;
    assert_eq!(next_event(&mut event_rx).await, TransportEvent::Opened);

    server
        .send(Message::Text("not json".to_string()))
        .await
        .expect("send");
    send_envelope(&mut server, "nodeTeleport", String::new()).await;
    send_envelope(
        &mut server,
        "addModule",
        json!({"name": "worker-1", "status": 2, "commands": ["ping"]}).to_string(),
    )
    .await;

    match next_event(&mut event_rx).await {
        TransportEvent::Inbound(InboundMsg::AddModule(module)) => {
            assert_eq!(module.name, "worker-1");
            assert_eq!(module.status, ModuleStatus::Running);
        }
        other => panic!("unexpected event {other:?}"),
    }

    request_tx
        .send(Request::Start {
            name: "worker-1".to_string(),
        })
        .await
        .expect("queue");
    let outer = next_envelope(&mut server).await;
    assert_eq!(outer.topic, "pageRequest");
    let inner: Envelope = serde_json::from_str(&outer.payload).expect("inner");
    assert_eq!(inner, Envelope::new("start", "worker-1"));

    drop(request_tx);
    timeout(WAIT, transport)
        .await
        .expect("shutdown timeout")
        .expect("join");
}

#[tokio::test]
async fn sends_heartbeat_while_open() {
    let (listener, url) = listener().await;
    let (event_tx, mut event_rx) = mpsc::channel(16);
    let (request_tx, request_rx) = mpsc::channel(16);
    let transport = tokio::spawn(run_transport(
        transport_config(url, Duration::from_millis(100)),
        event_tx,
        request_rx,
    ));

    let mut server = accept(&listener).await;
    assert_eq!(next_event(&mut event_rx).await, TransportEvent::Opened);
    let beat = next_envelope(&mut server).await;
    assert_eq!(beat, Envelope::new("heartbeat", ""));

    drop(request_tx);
    let _ = timeout(WAIT, transport).await;
}

#[tokio::test]
async fn reconnects_after_server_drops() {
    let (listener, url) = listener().await;
    let (event_tx, mut event_rx) = mpsc::channel(16);
    let (request_tx, request_rx) = mpsc::channel(16);
    let transport = tokio::spawn(run_transport(
        transport_config(url, Duration::from_secs(60)),
        event_tx,
        request_rx,
    ));

    let first = accept(&listener).await;
    assert_eq!(next_event(&mut event_rx).await, TransportEvent::Opened);
    drop(first);
    assert_eq!(next_event(&mut event_rx).await, TransportEvent::Closed);

    let mut second = accept(&listener).await;
    assert_eq!(next_event(&mut event_rx).await, TransportEvent::Opened);
    request_tx
        .send(Request::ChangePage {
            location: "/".to_string(),
        })
        .await
        .expect("queue");
    assert_eq!(
        next_envelope(&mut second).await,
        Envelope::new("changePage", "/")
    );

    drop(request_tx);
    let _ = timeout(WAIT, transport).await;
}

#[tokio::test]
async fn oneshot_answers_page_request_then_sends_request() {
    let (listener, url) = listener().await;
    let args = parse_args(&["--url", url.as_str(), "--location", "worker-1"]);
    let config = load_config_with(&args, |_| None).expect("config");

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_envelope(&mut ws, "requestPageChange", String::new()).await;
        let handshake = next_envelope(&mut ws).await;
        send_envelope(
            &mut ws,
            "changePage",
            json!({"type": 2, "data": json!({"name": "worker-1", "status": 2}).to_string()})
                .to_string(),
        )
        .await;
        let request = next_envelope(&mut ws).await;
        send_envelope(&mut ws, "responseMessage", "reset worker-1".to_string()).await;
        (handshake, request, ws)
    });

    let store = run_oneshot(
        &config,
        Some(Request::Reset {
            name: "worker-1".to_string(),
        }),
        Duration::from_millis(500),
        WAIT,
    )
    .await
    .expect("oneshot");

    let (handshake, request, _ws) = server.await.expect("server");
    assert_eq!(handshake, Envelope::new("changePage", "worker-1"));
    assert_eq!(request.topic, "pageRequest");
    assert_eq!(store.page().identity(), "worker-1");
    let texts: Vec<&str> = store
        .responses()
        .entries()
        .map(|entry| entry.text.as_str())
        .collect();
    assert_eq!(texts, vec!["reset worker-1"]);
}

/// Mirrors a password-protected dashboard: the very first client frame must
/// be the password, then the server sends its cache and asks for a page.
#[tokio::test]
async fn oneshot_sends_password_before_anything_else() {
    let (listener, url) = listener().await;
    let args = parse_args(&["--url", url.as_str()]);
    let config = load_config_with(&args, |key| {
        (key == "SYSDASH_PASSWORD").then(|| "pw".to_string())
    })
    .expect("config");

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_envelope(&mut ws, "password", String::new()).await;
        let first = next_envelope(&mut ws).await;
        send_envelope(&mut ws, "getResponseMessageCache", "[]".to_string()).await;
        send_envelope(&mut ws, "requestPageChange", String::new()).await;
        let subscription = next_envelope(&mut ws).await;
        let request = next_envelope(&mut ws).await;
        (first, subscription, request, ws)
    });

    run_oneshot(
        &config,
        Some(Request::Gc),
        Duration::from_millis(200),
        WAIT,
    )
    .await
    .expect("oneshot");

    let (first, subscription, request, _ws) = server.await.expect("server");
    assert_eq!(first, Envelope::new("password", "pw"));
    assert_eq!(subscription, Envelope::new("changePage", "/"));
    let inner: Envelope = serde_json::from_str(&request.payload).expect("inner");
    assert_eq!(inner.topic, "gc");
}

#[tokio::test]
async fn oneshot_subscribes_to_silent_server_after_grace() {
    let (listener, url) = listener().await;
    let args = parse_args(&["--url", url.as_str(), "--handshake-grace-ms", "100"]);
    let config = load_config_with(&args, |_| None).expect("config");

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let subscription = next_envelope(&mut ws).await;
        (subscription, ws)
    });

    run_oneshot(&config, None, Duration::from_millis(100), WAIT)
        .await
        .expect("oneshot");

    let (subscription, _ws) = server.await.expect("server");
    assert_eq!(subscription, Envelope::new("changePage", "/"));
}

#[tokio::test]
async fn oneshot_fails_when_nothing_listens() {
    let (listener, url) = listener().await;
    drop(listener);
    let args = parse_args(&["--url", url.as_str(), "--reconnect-delay-ms", "20"]);
    let config = load_config_with(&args, |_| None).expect("config");
    let err = run_oneshot(&config, None, Duration::from_millis(100), Duration::from_millis(300))
        .await
        .expect_err("no server");
    assert!(err.to_string().contains("could not connect"));
}
