//! Drives one task run: agent primitives, the iteration strategies, and the
//! summary/error bookkeeping around a task body.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::{json, Value};
use tabrelay_core::{
    Action, AgentResult, CrawlFrontier, CrawlStep, PageCursor, PageStep, Params, ScrollObservation,
    ScrollTracker, StopReason, Strategy, TaskConfig, TaskRequest,
};
use tabrelay_logging::{relay_debug, relay_error, relay_info, relay_warn};
use tokio::time::Instant;

use crate::correlator::Correlator;
use crate::error::{FailureKind, TaskError};
use crate::progress::{ProgressSink, ProgressTracker, StoreProgressSink};
use crate::report::{ErrorBody, Performance, RunSummary, TaskReport};
use crate::retry::{with_retry_if, RetryPolicy};
use crate::store::IncrementalStore;
use crate::tasks::Task;

/// Receives each batch of newly collected items as soon as it is stored.
pub type ItemCallback<'a> = &'a mut (dyn FnMut(&[Value]) + Send);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub current_url: Option<String>,
    pub items_collected: usize,
    /// Times the runner moved to a following page.
    pub pages_processed: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Iteration {
    pub items: Vec<Value>,
    pub stop: StopReason,
}

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

pub struct TaskRunner {
    correlator: Arc<Correlator>,
    platform: String,
    config: TaskConfig,
    store: Arc<IncrementalStore>,
    progress: ProgressTracker,
    retry: RetryPolicy,
    state: RunState,
    last_stop: Option<StopReason>,
}

impl TaskRunner {
    pub fn new(
        correlator: Arc<Correlator>,
        platform: impl Into<String>,
        config: TaskConfig,
        store: Arc<IncrementalStore>,
    ) -> Self {
        let platform = platform.into();
        let progress = ProgressTracker::new(platform.clone())
            .with_sink(Arc::new(StoreProgressSink::new(store.clone())));
        let retry = RetryPolicy::from(config.retry());
        Self {
            correlator,
            platform,
            config,
            store,
            progress,
            retry,
            state: RunState::default(),
            last_stop: None,
        }
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = self.progress.with_sink(sink);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn store(&self) -> &IncrementalStore {
        &self.store
    }

    pub fn emit_progress(&mut self, event_type: &str, data: Value) {
        self.progress.emit(event_type, data);
    }

    fn action_timeout(&self) -> Duration {
        self.config.action_timeout()
    }

    /// Send one command and interpret the reply.
    async fn call(
        &self,
        action: Action,
        params: Params,
        timeout: Duration,
    ) -> Result<AgentResult, TaskError> {
        let result = self.correlator.call(action, params, timeout).await?;
        if result.is_success() {
            Ok(result)
        } else if result.is_timeout() {
            Err(TaskError::new(
                FailureKind::Timeout,
                format!("{action} got no reply within {timeout:?}"),
            ))
        } else {
            let reason = result.message.as_deref().unwrap_or("no reason given");
            Err(TaskError::new(
                FailureKind::AgentReportedFailure,
                format!("{action} failed: {reason}"),
            ))
        }
    }

    fn jittered(&self, millis: u64) -> Duration {
        let base = Duration::from_millis(millis);
        if !self.config.rate_limiting().randomize_delay {
            return base;
        }
        base.mul_f64(rand::thread_rng().gen_range(0.8..=1.2))
    }

    async fn pause(&self, millis: u64) {
        if millis > 0 {
            tokio::time::sleep(self.jittered(millis)).await;
        }
    }

    pub async fn rate_limit(&self) {
        self.pause(self.config.rate_limiting().action_delay_ms).await;
    }

    pub async fn navigate(&mut self, url: &str) -> Result<(), TaskError> {
        self.call(
            Action::Navigate,
            params(json!({ "url": url })),
            self.action_timeout(),
        )
        .await?;
        self.arrive(url).await;
        Ok(())
    }

    /// [`navigate`](Self::navigate) under the configured retry policy.
    /// Only timeouts and agent-reported failures are retried.
    pub async fn navigate_with_retry(&mut self, url: &str) -> Result<(), TaskError> {
        let this: &Self = self;
        let timeout = this.action_timeout();
        with_retry_if(
            this.retry,
            move || this.call(Action::Navigate, params(json!({ "url": url })), timeout),
            |err: &TaskError| err.kind.is_transient(),
        )
        .await?;
        self.arrive(url).await;
        Ok(())
    }

    async fn arrive(&mut self, url: &str) {
        self.state.current_url = Some(url.to_string());
        self.pause(self.config.rate_limiting().page_load_delay_ms).await;
    }

    pub async fn type_text(&self, selector: &str, text: &str) -> Result<(), TaskError> {
        self.call(
            Action::Type,
            params(json!({ "selector": selector, "text": text })),
            self.action_timeout(),
        )
        .await?;
        self.rate_limit().await;
        Ok(())
    }

    pub async fn click(&self, selector: &str) -> Result<(), TaskError> {
        self.call(
            Action::Click,
            params(json!({ "selector": selector })),
            self.action_timeout(),
        )
        .await?;
        self.rate_limit().await;
        Ok(())
    }

    /// Ask the agent to wait up to `wait_ms` for `selector` to appear.
    pub async fn wait_for_selector(&self, selector: &str, wait_ms: u64) -> Result<(), TaskError> {
        let timeout = self.action_timeout() + Duration::from_millis(wait_ms);
        self.call(
            Action::WaitForSelector,
            params(json!({ "selector": selector, "timeout": wait_ms })),
            timeout,
        )
        .await?;
        Ok(())
    }

    pub async fn scroll_to_bottom(&self) -> Result<(), TaskError> {
        self.call(Action::ScrollToBottom, Params::new(), self.action_timeout())
            .await?;
        Ok(())
    }

    pub async fn extract_results(&self) -> Result<Vec<Value>, TaskError> {
        let result = self
            .call(Action::ExtractResults, Params::new(), self.action_timeout())
            .await?;
        Ok(result.data_list())
    }

    /// Link targets on the current page. Accepts plain strings or objects
    /// carrying `url`/`href`.
    pub async fn extract_urls(&self, selector: Option<&str>) -> Result<Vec<String>, TaskError> {
        let mut request = Params::new();
        if let Some(selector) = selector {
            request.insert("selector".into(), json!(selector));
        }
        let result = self
            .call(Action::ExtractUrls, request, self.action_timeout())
            .await?;
        Ok(result
            .data_list()
            .into_iter()
            .filter_map(|value| match value {
                Value::String(url) => Some(url),
                Value::Object(obj) => obj
                    .get("url")
                    .or_else(|| obj.get("href"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect())
    }

    /// Probe for the next-page control and click it. `Ok(false)` when the
    /// control is not configured or does not show up.
    pub async fn click_next_page(&self) -> Result<bool, TaskError> {
        let Some(selector) = self.config.selector(TaskConfig::NEXT_PAGE_BUTTON) else {
            return Ok(false);
        };
        let probe_ms = self.config.timeouts().next_page_probe_ms;
        match self.wait_for_selector(selector, probe_ms).await {
            Ok(()) => {}
            Err(err) if err.kind.is_transient() => {
                relay_debug!("No next page: {}", err.message);
                return Ok(false);
            }
            Err(err) => return Err(err),
        }
        self.click(selector).await?;
        Ok(true)
    }

    /// Store a batch, report it, and count it.
    fn collect(&mut self, batch: &[Value], on_items: &mut (dyn FnMut(&[Value]) + Send)) -> Result<(), TaskError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.store.append_items(batch)?;
        on_items(batch);
        self.state.items_collected += batch.len();
        let total = self.state.items_collected;
        self.progress.emit(
            "items_collected",
            json!({ "count": batch.len(), "total": total }),
        );
        Ok(())
    }

    /// Run `strategy` from the current page. `max_items` overrides the configured cap.
    pub async fn iterate(
        &mut self,
        strategy: Strategy,
        on_items: ItemCallback<'_>,
        max_items: Option<usize>,
    ) -> Result<Iteration, TaskError> {
        let cap = max_items.unwrap_or(self.config.iteration().max_items).max(1);
        let iteration = match strategy {
            Strategy::Pagination => self.paginate(on_items, cap).await?,
            Strategy::InfiniteScroll => self.scroll(on_items, cap).await?,
            Strategy::DepthFirst => {
                let seed = self
                    .state
                    .current_url
                    .clone()
                    .unwrap_or_else(|| self.config.base_url.clone());
                self.crawl_from(&seed, on_items, cap).await?
            }
        };
        relay_info!(
            "[{}] {strategy} finished with {} items ({:?})",
            self.platform,
            iteration.items.len(),
            iteration.stop
        );
        self.last_stop = Some(iteration.stop);
        Ok(iteration)
    }

    async fn paginate(&mut self, on_items: ItemCallback<'_>, cap: usize) -> Result<Iteration, TaskError> {
        let container = self
            .config
            .selector(TaskConfig::RESULTS_CONTAINER)
            .ok_or_else(|| TaskError::validation("pagination needs a results_container selector"))?
            .to_string();
        let wait_ms = self.config.timeouts().wait_for_results_ms;
        let mut cursor = PageCursor::new(self.config.iteration().max_pages, cap);
        let mut items = Vec::new();

        let stop = loop {
            self.progress.emit(
                "page_progress",
                json!({
                    "page": cursor.page(),
                    "max_pages": cursor.max_pages(),
                    "items_collected": items.len(),
                }),
            );
            self.wait_for_selector(&container, wait_ms).await?;
            let page_items = self.extract_results().await?;
            self.collect(&page_items, on_items)?;
            let count = page_items.len();
            items.extend(page_items);

            match cursor.record_page(count) {
                PageStep::Done | PageStep::LastPage => break StopReason::Done,
                PageStep::TryNext => {
                    if !self.click_next_page().await? {
                        break StopReason::Exhausted;
                    }
                    self.state.pages_processed += 1;
                    cursor.advance();
                    self.rate_limit().await;
                }
            }
        };

        items.truncate(cap);
        Ok(Iteration { items, stop })
    }

    async fn scroll(&mut self, on_items: ItemCallback<'_>, cap: usize) -> Result<Iteration, TaskError> {
        let scroll_delay = Duration::from_millis(self.config.iteration().scroll_delay_ms);
        let mut tracker = ScrollTracker::new(cap);
        let mut items = Vec::new();

        let stop = loop {
            self.scroll_to_bottom().await?;
            tokio::time::sleep(scroll_delay).await;
            let extracted = self.extract_results().await?;

            match tracker.observe(extracted.len()) {
                ScrollObservation::Stagnant => break StopReason::Stagnant,
                ScrollObservation::Unchanged { rounds } => {
                    relay_debug!("[{}] no new items ({rounds} rounds)", self.platform);
                }
                ScrollObservation::Grew { new_items } => {
                    let delta = extracted.get(new_items).map(<[Value]>::to_vec).unwrap_or_default();
                    self.collect(&delta, on_items)?;
                    items.extend(delta);
                    self.progress.emit(
                        "scroll_progress",
                        json!({ "items_collected": items.len(), "visible": extracted.len() }),
                    );
                    if tracker.is_full() {
                        break StopReason::Done;
                    }
                }
            }
            self.rate_limit().await;
        };

        Ok(Iteration { items, stop })
    }

    /// Breadth-ordered link crawl starting at `seed`.
    pub async fn crawl_from(
        &mut self,
        seed: &str,
        on_items: ItemCallback<'_>,
        cap: usize,
    ) -> Result<Iteration, TaskError> {
        let iteration = self.config.iteration();
        let mut frontier = CrawlFrontier::new(seed, iteration.max_depth, iteration.same_domain_only);
        let mut items = Vec::new();

        let stop = loop {
            if items.len() >= cap {
                break StopReason::Done;
            }
            let Some(step) = frontier.pop() else {
                break StopReason::QueueEmpty;
            };
            let (url, depth) = match step {
                CrawlStep::Visit { url, depth } => (url, depth),
                CrawlStep::Skip { url, reason, .. } => {
                    relay_debug!("[{}] skipping {url}: {reason:?}", self.platform);
                    continue;
                }
            };

            self.navigate(&url).await?;
            let page_items = self.extract_results().await?;
            self.collect(&page_items, on_items)?;
            items.extend(page_items);
            self.progress.emit(
                "depth_progress",
                json!({
                    "url": url,
                    "depth": depth,
                    "visited": frontier.visited().len(),
                    "queued": frontier.pending(),
                    "items_collected": items.len(),
                }),
            );

            if frontier.expands(depth) {
                let links = self.extract_urls(None).await?;
                let queued = frontier.enqueue_links(&url, depth, links);
                relay_debug!("[{}] queued {queued} links from {url}", self.platform);
            }
            self.rate_limit().await;
        };

        items.truncate(cap);
        Ok(Iteration { items, stop })
    }

    /// Run `task` to completion and turn the outcome into a report. The run's
    /// summary or error record is appended to the store either way.
    pub async fn execute(mut self, task: &dyn Task, action: &str, request: &TaskRequest) -> TaskReport {
        let started = Instant::now();
        let query = request.query().unwrap_or_default().to_string();
        relay_info!("[{}] starting {} for {query:?}", self.platform, task.name());
        self.progress.emit("task_start", json!({ "query": query, "task": task.name() }));

        match task.run(&mut self, &query, request).await {
            Ok(results) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                let summary = RunSummary {
                    query,
                    total_items: results.len(),
                    pages_processed: self.state.pages_processed,
                    duration_ms,
                    stop_reason: self.last_stop,
                };
                let record = serde_json::to_value(&summary).unwrap_or(Value::Null);
                if let Err(err) = self.store.append_summary(record) {
                    relay_warn!("[{}] could not record summary: {err}", self.platform);
                }
                self.progress.emit(
                    "task_complete",
                    json!({ "total_items": results.len(), "duration_ms": duration_ms }),
                );
                relay_info!(
                    "[{}] finished: {} items in {duration_ms} ms",
                    self.platform,
                    results.len()
                );
                TaskReport::Success {
                    platform: self.platform.clone(),
                    action: action.to_string(),
                    performance: Performance::new(duration_ms, results.len()),
                    summary,
                    results,
                    output_file: Some(self.store.path().display().to_string()),
                }
            }
            Err(err) => {
                relay_error!("[{}] task failed: {err}", self.platform);
                self.record_failure(&err, &query);
                self.progress.emit("task_failed", json!({ "error": ErrorBody::from(&err) }));
                TaskReport::failure(Some(self.platform.as_str()), action, &err)
            }
        }
    }

    fn record_failure(&self, err: &TaskError, query: &str) {
        let record = json!({
            "code": err.kind,
            "message": err.message,
            "query": query,
            "items_collected": self.state.items_collected,
        });
        if let Err(store_err) = self.store.append_error(record) {
            relay_warn!("[{}] could not record error: {store_err}", self.platform);
        }
    }
}
