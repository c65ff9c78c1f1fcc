use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tabrelay_core::{RequestAction, RequestError, Strategy, TaskRequest};
use tabrelay_logging::{relay_error, relay_info, relay_warn};

use crate::correlator::Correlator;
use crate::error::{FailureKind, TaskError};
use crate::platforms::{ConfigLoader, ConfigLoadError, DUCKDUCKGO};
use crate::progress::{AgentProgressSink, ProgressSink};
use crate::report::TaskReport;
use crate::runner::TaskRunner;
use crate::store::IncrementalStore;
use crate::tasks::{CrawlTask, SearchTask, Task};

pub type TaskFactory = Arc<dyn Fn() -> Box<dyn Task> + Send + Sync>;

/// Platform name to task constructor.
#[derive(Default)]
pub struct TaskRegistry {
    factories: RwLock<BTreeMap<String, TaskFactory>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `duckduckgo` search and the generic `crawl` task.
    pub fn with_builtin_tasks() -> Self {
        let registry = Self::new();
        registry.register(DUCKDUCKGO, || Box::new(SearchTask));
        registry.register("crawl", || Box::new(CrawlTask));
        registry
    }

    /// Register `platform`; an existing registration is replaced.
    pub fn register<F>(&self, platform: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Task> + Send + Sync + 'static,
    {
        let platform = platform.into();
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if factories.insert(platform.clone(), Arc::new(factory)).is_some() {
            relay_warn!("Platform {platform:?} was already registered; replacing it");
        }
    }

    pub fn create(&self, platform: &str) -> Option<Box<dyn Task>> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(platform)
            .cloned()?;
        Some(factory())
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(platform)
    }

    /// Registered platforms, sorted.
    pub fn platforms(&self) -> Vec<String> {
        self.factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PlatformInfo {
    Configured {
        name: String,
        task: String,
        strategy: Strategy,
        requires_auth: bool,
        task_timeout_s: u64,
        base_url: String,
    },
    Unconfigured {
        name: String,
        task: String,
        error: String,
    },
}

struct PreparedRun {
    platform: String,
    task: Box<dyn Task>,
    runner: TaskRunner,
    store: Arc<IncrementalStore>,
    budget: Duration,
}

/// Turns task requests into runs and always answers with a [`TaskReport`].
pub struct Dispatcher {
    correlator: Arc<Correlator>,
    registry: Arc<TaskRegistry>,
    configs: ConfigLoader,
    output_dir: PathBuf,
    default_platform: String,
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl Dispatcher {
    pub fn new(
        correlator: Arc<Correlator>,
        registry: Arc<TaskRegistry>,
        configs: ConfigLoader,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            correlator,
            registry,
            configs,
            output_dir: output_dir.into(),
            default_platform: DUCKDUCKGO.to_string(),
            sinks: Vec::new(),
        }
    }

    pub fn with_default_platform(mut self, platform: impl Into<String>) -> Self {
        self.default_platform = platform.into();
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Send every progress event to the agent as a `progress_update` command.
    pub fn forward_progress_to_agent(self) -> Self {
        let sink = Arc::new(AgentProgressSink::new(self.correlator.clone()));
        self.with_progress_sink(sink)
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn list_platforms(&self) -> Vec<String> {
        self.registry.platforms()
    }

    fn unknown_platform(&self, platform: &str) -> TaskError {
        TaskError::new(
            FailureKind::InvalidPlatform,
            format!(
                "Unknown platform: '{platform}'. Available: {}",
                self.list_platforms().join(", ")
            ),
        )
    }

    pub fn platform_info(&self, platform: &str) -> Result<PlatformInfo, TaskError> {
        let task = self
            .registry
            .create(platform)
            .ok_or_else(|| self.unknown_platform(platform))?;
        let info = match self.configs.load(platform) {
            Ok(config) => PlatformInfo::Configured {
                name: platform.to_string(),
                task: task.name().to_string(),
                strategy: task
                    .strategy_override()
                    .unwrap_or(config.iteration().strategy),
                requires_auth: config.auth.required,
                task_timeout_s: config.timeouts().task_execution_s,
                base_url: config.base_url,
            },
            Err(ConfigLoadError::NotFound { .. }) => PlatformInfo::Unconfigured {
                name: platform.to_string(),
                task: task.name().to_string(),
                error: "config_not_found".into(),
            },
            Err(err) => PlatformInfo::Unconfigured {
                name: platform.to_string(),
                task: task.name().to_string(),
                error: err.to_string(),
            },
        };
        Ok(info)
    }

    fn prepare(&self, request: &TaskRequest) -> Result<PreparedRun, TaskReport> {
        let action = request.action.as_str();
        let platform = request
            .platform
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default_platform)
            .to_string();

        let Some(task) = self.registry.create(&platform) else {
            let err = self.unknown_platform(&platform);
            relay_warn!("{}", err.message);
            return Err(TaskReport::failure(None, action, &err));
        };
        if let Err(err) = request.query() {
            let err = TaskError::validation(err.to_string());
            return Err(TaskReport::failure(Some(platform.as_str()), action, &err));
        }

        let failed = |message: String| {
            relay_error!("[{platform}] {message}");
            TaskReport::failure(Some(platform.as_str()), action, &TaskError::execution(message))
        };
        let config = self
            .configs
            .load(&platform)
            .map_err(|err| failed(err.to_string()))?;
        let store = IncrementalStore::create(&self.output_dir, &platform)
            .map(Arc::new)
            .map_err(|err| failed(format!("result store: {err}")))?;

        let budget = config.task_budget();
        let mut runner = TaskRunner::new(self.correlator.clone(), platform.clone(), config, store.clone());
        for sink in &self.sinks {
            runner = runner.with_progress_sink(sink.clone());
        }
        Ok(PreparedRun {
            platform,
            task,
            runner,
            store,
            budget,
        })
    }

    /// Run the requested task to completion.
    pub async fn dispatch(&self, request: TaskRequest) -> TaskReport {
        self.run(request, false).await
    }

    /// Like [`dispatch`](Self::dispatch), but give up once the platform's
    /// `task_execution_s` budget is spent.
    pub async fn dispatch_with_budget(&self, request: TaskRequest) -> TaskReport {
        self.run(request, true).await
    }

    async fn run(&self, request: TaskRequest, enforce_budget: bool) -> TaskReport {
        let action = request.action.clone();
        let PreparedRun {
            platform,
            task,
            runner,
            store,
            budget,
        } = match self.prepare(&request) {
            Ok(prepared) => prepared,
            Err(report) => return report,
        };

        let run_action = action.clone();
        let mut handle = tokio::spawn(async move {
            runner.execute(task.as_ref(), &run_action, &request).await
        });

        let joined = if enforce_budget {
            match tokio::time::timeout(budget, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    // Wait for the runner to stop so the error record is the last line.
                    let _ = handle.await;
                    let err = TaskError::new(
                        FailureKind::TaskTimeout,
                        format!("Task timed out after {}s", budget.as_secs()),
                    );
                    return self.abandoned(&store, &platform, &action, err);
                }
            }
        } else {
            (&mut handle).await
        };

        match joined {
            Ok(report) => {
                relay_info!(
                    "[{platform}] {action} finished ({})",
                    if report.is_success() { "success" } else { "error" }
                );
                report
            }
            Err(join_err) => {
                let reason = if join_err.is_panic() {
                    "task panicked"
                } else {
                    "task was cancelled"
                };
                self.abandoned(&store, &platform, &action, TaskError::execution(reason))
            }
        }
    }

    fn abandoned(
        &self,
        store: &IncrementalStore,
        platform: &str,
        action: &str,
        err: TaskError,
    ) -> TaskReport {
        relay_error!("[{platform}] {err}");
        let record = json!({ "code": err.kind, "message": err.message });
        if let Err(store_err) = store.append_error(record) {
            relay_warn!("[{platform}] could not record error: {store_err}");
        }
        TaskReport::failure(Some(platform), action, &err)
    }

    /// Answer a controller-level request.
    pub async fn handle(&self, request: TaskRequest) -> Result<Value, RequestError> {
        match request.action()? {
            RequestAction::StartSearch | RequestAction::StartTask => {
                Ok(self.dispatch_with_budget(request).await.to_value())
            }
            RequestAction::ListPlatforms => Ok(json!({
                "status": "success",
                "platforms": self.list_platforms(),
            })),
            RequestAction::Ping => Ok(json!({ "status": "success", "message": "pong" })),
        }
    }
}
