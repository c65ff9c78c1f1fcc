#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use serde_json::{json, Value};
use tabrelay_core::{Action, AgentResult, Command, Strategy, TaskConfig};
use tabrelay_engine::{CommandSink, Correlator, DeliveryError};
use tokio::sync::mpsc;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(tabrelay_logging::initialize_for_tests);
}

struct ChannelSink(mpsc::UnboundedSender<Command>);

impl CommandSink for ChannelSink {
    fn deliver(&self, command: Command) -> Result<(), DeliveryError> {
        self.0.send(command).map_err(|_| DeliveryError::Closed)
    }
}

/// Every command the agent saw, in order.
#[derive(Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<Command>>>);

impl CommandLog {
    pub fn commands(&self) -> Vec<Command> {
        self.0.lock().unwrap().clone()
    }

    pub fn urls_navigated(&self) -> Vec<String> {
        self.commands()
            .iter()
            .filter(|c| c.action == Action::Navigate)
            .filter_map(|c| c.param_str("url").map(str::to_string))
            .collect()
    }

    pub fn count(&self, action: Action) -> usize {
        self.commands().iter().filter(|c| c.action == action).count()
    }
}

/// In-memory agent answering commands with `respond`. `None` means the agent
/// never replies.
pub fn spawn_agent<F>(mut respond: F) -> (Arc<Correlator>, CommandLog)
where
    F: FnMut(&Command) -> Option<AgentResult> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
    let correlator = Arc::new(Correlator::new(Arc::new(ChannelSink(tx))));
    let log = CommandLog::default();

    let agent_correlator = correlator.clone();
    let agent_log = log.clone();
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            agent_log.0.lock().unwrap().push(command.clone());
            if let Some(result) = respond(&command) {
                agent_correlator.resolve(result);
            }
        }
    });
    (correlator, log)
}

fn item(label: String) -> Value {
    json!({ "title": label })
}

/// A results listing split into pages of `per_page` items, `pages` deep.
pub struct PagedSite {
    pub per_page: usize,
    pub pages: usize,
    current: usize,
}

impl PagedSite {
    pub fn new(per_page: usize, pages: usize) -> Self {
        Self {
            per_page,
            pages,
            current: 1,
        }
    }

    pub fn respond(&mut self, command: &Command) -> Option<AgentResult> {
        let id = command.id;
        let result = match command.action {
            Action::WaitForSelector if command.param_str("selector") == Some(NEXT_BUTTON) => {
                if self.current < self.pages {
                    AgentResult::success(id, None)
                } else {
                    AgentResult::error(id, "element not found")
                }
            }
            Action::Click if command.param_str("selector") == Some(NEXT_BUTTON) => {
                self.current += 1;
                AgentResult::success(id, None)
            }
            Action::ExtractResults => {
                let items: Vec<Value> = (0..self.per_page)
                    .map(|i| item(format!("p{}-{i}", self.current)))
                    .collect();
                AgentResult::success(id, Some(Value::Array(items)))
            }
            _ => AgentResult::success(id, None),
        };
        Some(result)
    }
}

/// An endless feed whose visible length follows `counts`, repeating the last value.
pub struct ScrollFeed {
    counts: Vec<usize>,
    round: usize,
}

impl ScrollFeed {
    pub fn new(counts: Vec<usize>) -> Self {
        Self { counts, round: 0 }
    }

    pub fn respond(&mut self, command: &Command) -> Option<AgentResult> {
        let id = command.id;
        let result = match command.action {
            Action::ExtractResults => {
                let index = self.round.min(self.counts.len() - 1);
                self.round += 1;
                let items: Vec<Value> = (0..self.counts[index])
                    .map(|i| item(format!("post-{i}")))
                    .collect();
                AgentResult::success(id, Some(Value::Array(items)))
            }
            _ => AgentResult::success(id, None),
        };
        Some(result)
    }
}

/// A set of linked pages. Each page yields one item naming itself.
pub struct LinkedSite {
    links: HashMap<String, Vec<String>>,
    current: Option<String>,
}

impl LinkedSite {
    pub fn new(graph: &[(&str, &[&str])]) -> Self {
        let links = graph
            .iter()
            .map(|(page, links)| {
                (
                    page.to_string(),
                    links.iter().map(|l| l.to_string()).collect(),
                )
            })
            .collect();
        Self {
            links,
            current: None,
        }
    }

    pub fn respond(&mut self, command: &Command) -> Option<AgentResult> {
        let id = command.id;
        let result = match command.action {
            Action::Navigate => {
                self.current = command.param_str("url").map(str::to_string);
                AgentResult::success(id, None)
            }
            Action::ExtractResults => {
                let page = self.current.clone().unwrap_or_default();
                AgentResult::success(id, Some(json!([{ "page": page }])))
            }
            Action::ExtractUrls => {
                let links = self
                    .current
                    .as_ref()
                    .and_then(|page| self.links.get(page))
                    .cloned()
                    .unwrap_or_default();
                AgentResult::success(id, Some(json!(links)))
            }
            _ => AgentResult::success(id, None),
        };
        Some(result)
    }
}

pub const NEXT_BUTTON: &str = "a.next";

/// A config with every delay zeroed so tests only wait on the agent.
pub fn fast_config(strategy: Strategy) -> TaskConfig {
    let mut config = TaskConfig::new("https://site.test/")
        .with_selector(TaskConfig::SEARCH_INPUT, "input.q")
        .with_selector(TaskConfig::RESULTS_CONTAINER, "ol.results")
        .with_selector(TaskConfig::NEXT_PAGE_BUTTON, NEXT_BUTTON);
    config.settings.iteration.strategy = strategy;
    config.settings.rate_limiting.action_delay_ms = 0;
    config.settings.rate_limiting.page_load_delay_ms = 0;
    config.settings.iteration.scroll_delay_ms = 0;
    config
}
