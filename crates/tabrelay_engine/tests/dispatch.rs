mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tabrelay_core::{Action, AgentResult, EntryKind, RequestAction, Strategy, TaskRequest};
use tabrelay_engine::{
    read_entries, ConfigLoader, Controller, Correlator, Dispatcher, FailureKind, PlatformInfo,
    SearchTask, TaskRegistry, TaskReport, DUCKDUCKGO,
};
use tempfile::TempDir;

use common::{fast_config, init_logging, spawn_agent, PagedSite};

fn dispatcher(correlator: Arc<Correlator>, temp: &TempDir, config: tabrelay_core::TaskConfig) -> Dispatcher {
    let configs = ConfigLoader::new(temp.path().join("config")).with_builtin(DUCKDUCKGO, config);
    Dispatcher::new(
        correlator,
        Arc::new(TaskRegistry::with_builtin_tasks()),
        configs,
        temp.path().join("results"),
    )
}

fn search(query: &str, platform: Option<&str>) -> TaskRequest {
    TaskRequest::new(RequestAction::StartSearch, Some(query), platform)
}

#[tokio::test(start_paused = true)]
async fn search_runs_end_to_end_and_records_a_summary() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let mut site = PagedSite::new(10, 5);
    let (correlator, log) = spawn_agent(move |command| site.respond(command));
    let mut config = fast_config(Strategy::Pagination);
    config.settings.iteration.max_items = 25;
    let dispatcher = dispatcher(correlator, &temp, config);

    let report = dispatcher.dispatch(search("rust", None)).await;

    let (platform, results, summary, output_file) = match report {
        TaskReport::Success {
            platform,
            results,
            summary,
            output_file,
            ..
        } => (platform, results, summary, output_file),
        other => panic!("expected success, got {other:?}"),
    };
    assert_eq!(platform, DUCKDUCKGO);
    assert_eq!(results.len(), 25);
    assert_eq!(summary.total_items, 25);
    assert_eq!(summary.pages_processed, 2);
    assert_eq!(summary.query, "rust");

    let typed = log
        .commands()
        .into_iter()
        .find(|c| c.action == Action::Type)
        .unwrap();
    assert_eq!(typed.param_str("text"), Some("rust"));
    assert_eq!(log.urls_navigated(), vec!["https://site.test/"]);

    let run = read_entries(std::path::Path::new(&output_file.unwrap())).unwrap();
    let counts = run.counts();
    assert_eq!(counts.items, 30);
    assert_eq!(counts.summaries, 1);
    assert_eq!(counts.errors, 0);
    assert_eq!(run.summary().unwrap()["total_items"], 25);
}

#[tokio::test]
async fn unknown_platform_is_rejected_before_anything_runs() {
    let temp = TempDir::new().unwrap();
    let (correlator, log) = spawn_agent(|command| Some(AgentResult::success(command.id, None)));
    let dispatcher = dispatcher(correlator, &temp, fast_config(Strategy::Pagination));

    let report = dispatcher.dispatch(search("rust", Some("altavista"))).await;

    assert_eq!(report.failure_kind(), Some(FailureKind::InvalidPlatform));
    let TaskReport::Error { error, .. } = report else {
        unreachable!()
    };
    assert_eq!(
        error.message,
        "Unknown platform: 'altavista'. Available: crawl, duckduckgo"
    );
    assert!(log.commands().is_empty());
}

#[tokio::test]
async fn blank_query_is_a_validation_error() {
    let temp = TempDir::new().unwrap();
    let (correlator, _log) = spawn_agent(|command| Some(AgentResult::success(command.id, None)));
    let dispatcher = dispatcher(correlator, &temp, fast_config(Strategy::Pagination));

    let report = dispatcher.dispatch(search("   ", None)).await;
    assert_eq!(report.failure_kind(), Some(FailureKind::ValidationError));
}

#[tokio::test(start_paused = true)]
async fn agent_failure_is_retried_then_reported_and_recorded() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let (correlator, log) = spawn_agent(|command| {
        Some(match command.action {
            Action::Navigate => AgentResult::error(command.id, "net::ERR_NAME_NOT_RESOLVED"),
            _ => AgentResult::success(command.id, None),
        })
    });
    let dispatcher = dispatcher(correlator, &temp, fast_config(Strategy::Pagination));

    let report = dispatcher.dispatch(search("rust", None)).await;

    assert_eq!(report.failure_kind(), Some(FailureKind::AgentReportedFailure));
    assert_eq!(log.count(Action::Navigate), 3);

    let run_file = tabrelay_engine::latest_run_file(&temp.path().join("results"), Some(DUCKDUCKGO))
        .unwrap()
        .unwrap();
    let run = read_entries(&run_file).unwrap();
    assert_eq!(run.counts().errors, 1);
    assert_eq!(run.errors().next().unwrap()["code"], "AGENT_REPORTED_FAILURE");
}

#[tokio::test(start_paused = true)]
async fn silent_agent_hits_the_task_budget() {
    let temp = TempDir::new().unwrap();
    let (correlator, _log) = spawn_agent(|_| None);
    let mut config = fast_config(Strategy::Pagination);
    config.settings.timeouts.task_execution_s = 5;
    let dispatcher = dispatcher(correlator.clone(), &temp, config);

    let report = dispatcher.dispatch_with_budget(search("rust", None)).await;

    assert_eq!(report.failure_kind(), Some(FailureKind::TaskTimeout));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn budget_error_is_the_last_record_of_a_busy_run() {
    let temp = TempDir::new().unwrap();
    let mut site = PagedSite::new(10, 1_000);
    let (correlator, _log) = spawn_agent(move |command| site.respond(command));
    let mut config = fast_config(Strategy::Pagination);
    config.settings.iteration.max_pages = 1_000;
    config.settings.iteration.max_items = 100_000;
    config.settings.rate_limiting.action_delay_ms = 100;
    config.settings.timeouts.task_execution_s = 2;
    let dispatcher = dispatcher(correlator, &temp, config);

    let report = dispatcher.dispatch_with_budget(search("rust", None)).await;
    assert_eq!(report.failure_kind(), Some(FailureKind::TaskTimeout));
    tokio::time::sleep(Duration::from_secs(1)).await;

    let run_file = tabrelay_engine::latest_run_file(&temp.path().join("results"), Some(DUCKDUCKGO))
        .unwrap()
        .unwrap();
    let run = read_entries(&run_file).unwrap();
    assert!(run.counts().items > 0);
    assert_eq!(run.entries.last().map(|e| e.kind()), Some(EntryKind::Error));
    assert_eq!(run.counts().errors, 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_mid_task_fails_fast() {
    let temp = TempDir::new().unwrap();
    let (correlator, log) = spawn_agent(|_| None);
    let dispatcher = dispatcher(correlator.clone(), &temp, fast_config(Strategy::Pagination));

    let disconnector = correlator.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        disconnector.disconnect();
    });
    let report = dispatcher.dispatch(search("rust", None)).await;

    assert_eq!(
        report.failure_kind(),
        Some(FailureKind::TransportDisconnected)
    );
    assert_eq!(log.count(Action::Navigate), 1);
}

#[tokio::test]
async fn re_registration_replaces_the_task() {
    let registry = TaskRegistry::with_builtin_tasks();
    registry.register("crawl", || Box::new(SearchTask));
    assert_eq!(registry.create("crawl").unwrap().name(), "search");
    assert_eq!(registry.platforms(), vec!["crawl", "duckduckgo"]);
}

#[tokio::test]
async fn platform_info_reports_strategy_and_missing_config() {
    let temp = TempDir::new().unwrap();
    let (correlator, _log) = spawn_agent(|command| Some(AgentResult::success(command.id, None)));
    let dispatcher = dispatcher(correlator, &temp, fast_config(Strategy::InfiniteScroll));

    match dispatcher.platform_info(DUCKDUCKGO).unwrap() {
        PlatformInfo::Configured {
            strategy,
            task_timeout_s,
            ..
        } => {
            assert_eq!(strategy, Strategy::InfiniteScroll);
            assert_eq!(task_timeout_s, 90);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        serde_json::to_value(dispatcher.platform_info("crawl").unwrap()).unwrap(),
        json!({"name": "crawl", "task": "crawl", "error": "config_not_found"})
    );
    assert_eq!(
        dispatcher.platform_info("nope").unwrap_err().kind,
        FailureKind::InvalidPlatform
    );
}

#[tokio::test]
async fn controller_answers_ping_and_rejects_unknown_actions() {
    let temp = TempDir::new().unwrap();
    let (correlator, _log) = spawn_agent(|command| Some(AgentResult::success(command.id, None)));
    let controller = Controller::new(Arc::new(dispatcher(
        correlator,
        &temp,
        fast_config(Strategy::Pagination),
    )));

    assert_eq!(
        controller.handle_event(json!({"action": "ping"})).await,
        json!({"status": "success", "message": "pong"})
    );
    assert_eq!(
        controller.handle_event(json!({"action": "list_platforms"})).await["platforms"],
        json!(["crawl", "duckduckgo"])
    );
    assert_eq!(
        controller.handle_event(json!({"action": "dance"})).await["status"],
        "error"
    );
}

#[tokio::test(start_paused = true)]
async fn controller_loop_runs_queued_searches() {
    let temp = TempDir::new().unwrap();
    let mut site = PagedSite::new(3, 1);
    let (correlator, log) = spawn_agent(move |command| site.respond(command));
    let controller = Controller::new(Arc::new(dispatcher(
        correlator,
        &temp,
        fast_config(Strategy::Pagination),
    )));
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let shutdown = tokio_util::sync::CancellationToken::new();

    events_tx
        .send(json!({"action": "start_search", "query": "one"}))
        .unwrap();
    events_tx
        .send(json!({"action": "start_search", "query": "two"}))
        .unwrap();
    drop(events_tx);
    controller.run(events_rx, shutdown).await;

    let queries: Vec<String> = log
        .commands()
        .into_iter()
        .filter(|c| c.action == Action::Type)
        .filter_map(|c| c.param_str("text").map(str::to_string))
        .collect();
    assert_eq!(queries, vec!["one", "two"]);
}
