use std::sync::Arc;

use serde_json::{json, Value};
use tabrelay_core::TaskRequest;
use tabrelay_logging::{relay_info, relay_warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;

/// Consumes browser-originated and trigger events one at a time, so at most
/// one task runs at once.
pub struct Controller {
    dispatcher: Arc<Dispatcher>,
}

impl Controller {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Handle one event and return the response that was produced for it.
    pub async fn handle_event(&self, event: Value) -> Value {
        let request = match TaskRequest::from_value(event) {
            Ok(request) => request,
            Err(err) => {
                relay_warn!("Ignoring event: {err}");
                return json!({ "status": "error", "message": err.to_string() });
            }
        };
        let action = request.action.clone();
        match self.dispatcher.handle(request).await {
            Ok(response) => {
                relay_info!("Event {action} handled: {}", response["status"]);
                response
            }
            Err(err) => {
                relay_warn!("Event {action} rejected: {err}");
                json!({ "status": "error", "message": err.to_string() })
            }
        }
    }

    /// Run until the event queue closes, the agent disconnects, or `shutdown` fires.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<Value>, shutdown: CancellationToken) {
        let correlator = self.dispatcher.correlator().clone();
        relay_info!("Controller waiting for events");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = correlator.disconnected() => {
                    relay_info!("Agent disconnected; controller stopping");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event).await;
                    }
                    None => break,
                },
            }
        }
        relay_info!("Controller stopped");
    }
}
