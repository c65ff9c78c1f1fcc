use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use tabrelay_engine::{
    serve_http, serve_triggers, BridgeState, CommandQueue, ConfigLoader, Controller, Correlator,
    Dispatcher, PipeTransport, TaskRegistry,
};
use tabrelay_logging::{relay_error, relay_info};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::cli::TransportKind;
use super::settings::BridgeSettings;

pub(crate) async fn run(settings: BridgeSettings) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_watch(shutdown.clone());
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    if let Some(addr) = settings.trigger_addr {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding trigger listener on {addr}"))?;
        tokio::spawn(serve_triggers(listener, events_tx.clone(), shutdown.clone()));
    }

    match settings.transport {
        TransportKind::Native => {
            let transport = PipeTransport::stdio(events_tx);
            let dispatcher = build_dispatcher(&settings, transport.correlator.clone());
            Controller::new(dispatcher).run(events_rx, shutdown.clone()).await;
            transport.shutdown();
        }
        TransportKind::Http => {
            drop(events_tx);
            let queue = Arc::new(CommandQueue::new());
            let correlator = Arc::new(Correlator::new(queue.clone()));
            let dispatcher = build_dispatcher(&settings, correlator);
            let listener = TcpListener::bind(settings.http_addr)
                .await
                .with_context(|| format!("binding HTTP bridge on {}", settings.http_addr))?;
            let state = BridgeState {
                queue,
                dispatcher: dispatcher.clone(),
            };
            let server = tokio::spawn(serve_http(listener, state, shutdown.clone()));
            run_controller(Controller::new(dispatcher), events_rx, shutdown.clone()).await;
            shutdown.cancel();
            server.await?.context("HTTP bridge failed")?;
        }
    }

    shutdown.cancel();
    relay_info!("tabrelay stopped");
    Ok(())
}

fn build_dispatcher(settings: &BridgeSettings, correlator: Arc<Correlator>) -> Arc<Dispatcher> {
    let mut dispatcher = Dispatcher::new(
        correlator,
        Arc::new(TaskRegistry::with_builtin_tasks()),
        ConfigLoader::new(settings.config_dir.clone()),
        settings.output_dir.clone(),
    )
    .with_default_platform(settings.default_platform.clone());
    if settings.forward_progress {
        dispatcher = dispatcher.forward_progress_to_agent();
    }
    relay_info!("Platforms: {}", dispatcher.list_platforms().join(", "));
    Arc::new(dispatcher)
}

/// Trigger events are optional in HTTP mode; with no listener the controller
/// idles until shutdown.
async fn run_controller(
    controller: Controller,
    events: mpsc::UnboundedReceiver<Value>,
    shutdown: CancellationToken,
) {
    controller.run(events, shutdown.clone()).await;
    shutdown.cancelled().await;
}

fn spawn_signal_watch(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            relay_error!("Cannot listen for interrupts: {err}");
            return;
        }
        relay_info!("Interrupt received; shutting down");
        shutdown.cancel();
    });
}
