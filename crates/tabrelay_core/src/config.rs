use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::Strategy;

/// Per-platform task configuration. Loaded once when a task is built and never
/// mutated during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub base_url: String,
    /// Logical role (`search_input`, `results_container`, `next_page_button`, ...)
    /// to selector string. The selectors are opaque to tabrelay.
    #[serde(default)]
    pub selectors: BTreeMap<String, String>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub iteration: IterationSettings,
    pub rate_limiting: RateLimitSettings,
    pub timeouts: TimeoutSettings,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationSettings {
    pub strategy: Strategy,
    pub max_items: usize,
    pub max_pages: u32,
    pub max_depth: u32,
    pub same_domain_only: bool,
    pub scroll_delay_ms: u64,
}

impl Default for IterationSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Pagination,
            max_items: 50,
            max_pages: 5,
            max_depth: 2,
            same_domain_only: true,
            scroll_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub action_delay_ms: u64,
    pub page_load_delay_ms: u64,
    /// Scale each delay by a random factor in `0.8..=1.2`.
    pub randomize_delay: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            action_delay_ms: 500,
            page_load_delay_ms: 2_000,
            randomize_delay: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Upper bound for awaiting any single agent reply.
    pub action_ms: u64,
    /// Agent-side wait for the results container.
    pub wait_for_results_ms: u64,
    /// Agent-side wait when probing for the next-page control.
    pub next_page_probe_ms: u64,
    /// Wall-clock budget for one whole task invocation.
    pub task_execution_s: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            action_ms: 30_000,
            wait_for_results_ms: 10_000,
            next_page_probe_ms: 2_000,
            task_execution_s: 90,
        }
    }
}

/// Retry of navigation and extraction calls that time out or fail on the agent side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    /// Seconds; the wait after failed attempt `n` (0-based) is `backoff_factor * 2^n`.
    pub backoff_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid base_url {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("strategy {strategy} requires selector {role:?}")]
    MissingSelector {
        strategy: Strategy,
        role: &'static str,
    },
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

impl TaskConfig {
    pub const RESULTS_CONTAINER: &'static str = "results_container";
    pub const NEXT_PAGE_BUTTON: &'static str = "next_page_button";
    pub const SEARCH_INPUT: &'static str = "search_input";

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            selectors: BTreeMap::new(),
            settings: Settings::default(),
            auth: AuthSettings::default(),
        }
    }

    pub fn with_selector(mut self, role: impl Into<String>, selector: impl Into<String>) -> Self {
        self.selectors.insert(role.into(), selector.into());
        self
    }

    pub fn selector(&self, role: &str) -> Option<&str> {
        self.selectors
            .get(role)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn iteration(&self) -> &IterationSettings {
        &self.settings.iteration
    }

    pub fn rate_limiting(&self) -> &RateLimitSettings {
        &self.settings.rate_limiting
    }

    pub fn timeouts(&self) -> &TimeoutSettings {
        &self.settings.timeouts
    }

    pub fn retry(&self) -> &RetrySettings {
        &self.settings.retry
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.timeouts.action_ms)
    }

    pub fn task_budget(&self) -> Duration {
        Duration::from_secs(self.settings.timeouts.task_execution_s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = Url::parse(&self.base_url).map_err(|err| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: err.to_string(),
        })?;
        if parsed.host_str().is_none() {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: "missing host".into(),
            });
        }

        let iteration = &self.settings.iteration;
        if iteration.max_items == 0 {
            return Err(ConfigError::ZeroLimit("max_items"));
        }
        if self.settings.timeouts.action_ms == 0 {
            return Err(ConfigError::ZeroLimit("action_ms"));
        }
        if self.settings.timeouts.task_execution_s == 0 {
            return Err(ConfigError::ZeroLimit("task_execution_s"));
        }

        match iteration.strategy {
            Strategy::Pagination => {
                if iteration.max_pages == 0 {
                    return Err(ConfigError::ZeroLimit("max_pages"));
                }
                if self.selector(Self::RESULTS_CONTAINER).is_none() {
                    return Err(ConfigError::MissingSelector {
                        strategy: iteration.strategy,
                        role: Self::RESULTS_CONTAINER,
                    });
                }
            }
            Strategy::InfiniteScroll | Strategy::DepthFirst => {}
        }
        Ok(())
    }
}
