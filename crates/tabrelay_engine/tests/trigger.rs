use serde_json::json;
use tabrelay_engine::{send_trigger, serve_triggers, READ_TIMEOUT};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn start_listener() -> (
    std::net::SocketAddr,
    mpsc::UnboundedReceiver<serde_json::Value>,
    CancellationToken,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    tokio::spawn(serve_triggers(listener, tx, shutdown.clone()));
    (addr, rx, shutdown)
}

#[tokio::test]
async fn valid_trigger_is_queued_as_an_event() {
    let (addr, mut events, shutdown) = start_listener().await;

    let reply = send_trigger(addr, "start_task:rust async:crawl").await.unwrap();
    assert_eq!(reply, "OK");
    assert_eq!(
        events.recv().await.unwrap(),
        json!({"action": "start_task", "query": "rust async", "platform": "crawl"})
    );
    shutdown.cancel();
}

#[tokio::test]
async fn unknown_and_malformed_triggers_are_answered() {
    let (addr, mut events, shutdown) = start_listener().await;

    assert_eq!(send_trigger(addr, "fly:away").await.unwrap(), "UNKNOWN_COMMAND");
    assert!(send_trigger(addr, "no separator")
        .await
        .unwrap()
        .starts_with("ERROR: Invalid format"));
    assert!(events.try_recv().is_err());
    shutdown.cancel();
}

#[tokio::test]
async fn message_without_newline_is_read_at_eof() {
    let (addr, mut events, shutdown) = start_listener().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"ping:now").await.unwrap();
    stream.shutdown().await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();

    assert_eq!(reply, "OK");
    assert_eq!(events.recv().await.unwrap()["action"], "ping");
    shutdown.cancel();
}

#[tokio::test]
async fn silent_client_times_out() {
    let (addr, _events, shutdown) = start_listener().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut reply = String::new();
    tokio::time::timeout(READ_TIMEOUT * 2, stream.read_to_string(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, "ERROR: Timeout");
    shutdown.cancel();
}
