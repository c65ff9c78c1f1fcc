//! Line-oriented TCP trigger: one `action:query[:platform]` message per
//! connection, answered with `OK`, `UNKNOWN_COMMAND` or `ERROR: <reason>`.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use serde_json::Value;
use tabrelay_core::{parse_trigger_line, TriggerError};
use tabrelay_logging::{relay_debug, relay_info, relay_warn};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const REPLY_OK: &str = "OK";
pub const REPLY_UNKNOWN: &str = "UNKNOWN_COMMAND";
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_MESSAGE_LEN: u64 = 1024;

/// Validate one raw message and queue it as an event. Returns the reply line.
pub fn handle_message(raw: &[u8], events: &mpsc::UnboundedSender<Value>) -> String {
    let Ok(line) = std::str::from_utf8(raw) else {
        return "ERROR: Invalid encoding".to_string();
    };
    match parse_trigger_line(line) {
        Ok(request) => {
            let event = match serde_json::to_value(&request) {
                Ok(event) => event,
                Err(err) => return format!("ERROR: {err}"),
            };
            if events.send(event).is_err() {
                return "ERROR: Controller is not running".to_string();
            }
            relay_info!("Trigger queued: {}", line.trim());
            REPLY_OK.to_string()
        }
        Err(TriggerError::UnknownAction(action)) => {
            relay_warn!("Trigger with unknown action {action:?}");
            REPLY_UNKNOWN.to_string()
        }
        Err(err) => format!("ERROR: {err}"),
    }
}

async fn handle_connection(mut stream: TcpStream, events: mpsc::UnboundedSender<Value>) {
    let mut raw = Vec::new();
    let read = {
        let mut reader = BufReader::new((&mut stream).take(MAX_MESSAGE_LEN));
        tokio::time::timeout(READ_TIMEOUT, reader.read_until(b'\n', &mut raw)).await
    };
    let reply = match read {
        Ok(Ok(_)) => handle_message(&raw, &events),
        Ok(Err(err)) => format!("ERROR: {err}"),
        Err(_) => "ERROR: Timeout".to_string(),
    };
    relay_debug!("Trigger reply: {reply}");
    if let Err(err) = stream.write_all(reply.as_bytes()).await {
        relay_warn!("Writing trigger reply failed: {err}");
    }
    let _ = stream.shutdown().await;
}

/// Accept trigger connections until `shutdown` fires.
pub async fn serve_triggers(
    listener: TcpListener,
    events: mpsc::UnboundedSender<Value>,
    shutdown: CancellationToken,
) {
    if let Ok(addr) = listener.local_addr() {
        relay_info!("Trigger listener on {addr}");
    }
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    relay_debug!("Trigger connection from {peer}");
                    tokio::spawn(handle_connection(stream, events.clone()));
                }
                Err(err) => relay_warn!("Accepting trigger connection failed: {err}"),
            },
        }
    }
}

/// Send one trigger line to a running listener and return its reply.
pub async fn send_trigger(addr: SocketAddr, line: &str) -> io::Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(line.trim_end().as_bytes()).await?;
    stream.write_all(b"\n").await?;
    let mut reply = String::new();
    tokio::time::timeout(READ_TIMEOUT, stream.read_to_string(&mut reply))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no reply from trigger listener"))??;
    Ok(reply)
}
