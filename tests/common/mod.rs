// Common helpers for integration tests
#![allow(dead_code)]

use futures::StreamExt;
use playbridge::bridge::BridgeServer;
use playbridge::data::{BridgeEvent, Track};
use playbridge::helpers::message_store::MessageStore;
use playbridge::helpers::presentation::TextPresenter;
use playbridge::helpers::publish_scheduler::PublishScheduler;
use playbridge::helpers::voice::NoopVoiceLink;
use playbridge::players::{PlaybackController, RecordingSink, Session, SessionHandle, SessionSnapshot};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const GUILD: &str = "guild-1";
pub const CHANNEL: &str = "channel-1";

pub fn track(id: &str) -> Track {
    Track::new(id, &format!("Song {}", id), &format!("Artist {}", id), "Album", &format!("spotify:track:{}", id), 180_000)
}

/// A session wired to a recording sink and an in-memory presenter
pub struct TestSession {
    pub handle: SessionHandle,
    pub sink: Arc<RecordingSink>,
    pub presenter: Arc<TextPresenter>,
    pub events: mpsc::Sender<BridgeEvent>,
    pub task: JoinHandle<()>,
    pub dir: TempDir,
}

/// Start a session publishing to `CHANNEL` with the given cooldown
pub fn spawn_session(cooldown: Duration) -> TestSession {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = MessageStore::load(dir.path(), GUILD);
    store.set_channel(CHANNEL).expect("store channel");

    let sink = Arc::new(RecordingSink::new());
    let presenter = Arc::new(TextPresenter::new());
    let controller = PlaybackController::new(sink.clone(), Arc::new(NoopVoiceLink::new()));
    let scheduler = PublishScheduler::new(cooldown, presenter.clone(), store);
    let (events, events_rx) = mpsc::channel(64);
    let (handle, task) = Session::spawn(controller, scheduler, events_rx, None);

    TestSession { handle, sink, presenter, events, task, dir }
}

/// Poll the session until `predicate` holds
pub async fn wait_for<F>(handle: &SessionHandle, predicate: F) -> SessionSnapshot
where
    F: Fn(&SessionSnapshot) -> bool,
{
    for _ in 0..1000 {
        let snapshot = handle.snapshot().await.expect("session running");
        if predicate(&snapshot) {
            return snapshot;
        }
        tokio::task::yield_now().await;
    }
    panic!("session never reached the expected state");
}

/// Bind a bridge server on an ephemeral loopback port
pub async fn bind_server() -> (Arc<BridgeServer>, mpsc::Receiver<BridgeEvent>) {
    let (events, events_rx) = mpsc::channel(64);
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("addr");
    let server = BridgeServer::bind(addr, events).await.expect("bind");
    (server, events_rx)
}

pub async fn connect(server: &BridgeServer) -> Client {
    let url = format!("ws://{}", server.local_addr());
    let (client, _) = connect_async(url.as_str()).await.expect("connect");
    client
}

/// Next message from the server, failing the test after two seconds
pub async fn next_message(client: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended")
        .expect("websocket error")
}

pub async fn next_text(client: &mut Client) -> String {
    match next_message(client).await {
        Message::Text(text) => text,
        other => panic!("expected a text frame, got {:?}", other),
    }
}

/// Read the three frames every new connection starts with
pub async fn expect_normalization(client: &mut Client) {
    assert_eq!(next_text(client).await, "volume|100");
    assert_eq!(next_text(client).await, "repeat|0");
    assert_eq!(next_text(client).await, "pause");
}
