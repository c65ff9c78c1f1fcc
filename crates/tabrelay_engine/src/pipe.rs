//! Native-messaging transport: the agent runs the bridge as a child process
//! and talks framed JSON over stdin/stdout.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tabrelay_core::{Command, InboundFrame};
use tabrelay_logging::{relay_debug, relay_error, relay_info, relay_warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::correlator::{CommandSink, Correlator, DeliveryError};
use crate::framing::{decode_payload, encode_payload, frame_reader, frame_writer};

struct PipeSink {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSink for PipeSink {
    fn deliver(&self, command: Command) -> Result<(), DeliveryError> {
        self.tx.send(command).map_err(|_| DeliveryError::Closed)
    }
}

/// A running pipe transport: the correlator bound to it plus its IO tasks.
pub struct PipeTransport {
    pub correlator: Arc<Correlator>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PipeTransport {
    /// Spawn the reader and writer loops.
    ///
    /// Inbound results resolve pending commands; every other inbound message
    /// is forwarded to `events`. End of input or an undecodable frame
    /// disconnects the correlator.
    pub fn spawn<R, W>(input: R, output: W, events: mpsc::UnboundedSender<Value>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(Correlator::new(Arc::new(PipeSink { tx })));
        let reader = tokio::spawn(read_loop(input, correlator.clone(), events));
        let writer = tokio::spawn(write_loop(output, rx, correlator.clone()));
        Self {
            correlator,
            reader,
            writer,
        }
    }

    /// Attach to this process's stdin and stdout.
    pub fn stdio(events: mpsc::UnboundedSender<Value>) -> Self {
        Self::spawn(tokio::io::stdin(), tokio::io::stdout(), events)
    }

    pub fn shutdown(&self) {
        self.correlator.disconnect();
        self.reader.abort();
        self.writer.abort();
    }
}

impl Drop for PipeTransport {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn read_loop<R>(input: R, correlator: Arc<Correlator>, events: mpsc::UnboundedSender<Value>)
where
    R: AsyncRead + Unpin,
{
    let mut frames = frame_reader(input);
    while let Some(frame) = frames.next().await {
        let payload = match frame {
            Ok(payload) => payload,
            Err(err) => {
                relay_error!("Reading agent frame failed: {err}");
                break;
            }
        };
        let value = match decode_payload(&payload) {
            Ok(value) => value,
            Err(err) => {
                relay_error!("Undecodable agent frame: {err}");
                break;
            }
        };
        match InboundFrame::classify(value) {
            InboundFrame::Result(result) => {
                correlator.resolve(result);
            }
            InboundFrame::MalformedResult { id, raw } => {
                relay_warn!("Malformed result for command {id:?}: {raw}");
            }
            InboundFrame::Event(event) => {
                relay_debug!("Agent event: {event}");
                if events.send(event).is_err() {
                    relay_warn!("Event queue closed; dropping agent event");
                }
            }
        }
    }
    relay_info!("Agent input closed");
    correlator.disconnect();
}

async fn write_loop<W>(
    output: W,
    mut commands: mpsc::UnboundedReceiver<Command>,
    correlator: Arc<Correlator>,
) where
    W: AsyncWrite + Unpin,
{
    let mut frames = frame_writer(output);
    while let Some(command) = commands.recv().await {
        let id = command.id;
        let payload = match encode_payload(&json!({ "command": command })) {
            Ok(payload) => payload,
            Err(err) => {
                relay_error!("Encoding command {id} failed: {err}");
                continue;
            }
        };
        if let Err(err) = frames.send(payload).await {
            relay_error!("Writing command {id} failed: {err}");
            correlator.disconnect();
            return;
        }
    }
}
