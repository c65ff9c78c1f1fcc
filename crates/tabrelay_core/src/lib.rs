//! Tabrelay core: wire types, task configuration and the pure traversal state machines.
mod command;
mod config;
mod entry;
mod frontier;
mod pagination;
mod request;
mod scroll;
mod strategy;
mod urls;

pub use command::{Action, AgentResult, Command, CommandId, InboundFrame, Params, ResultStatus};
pub use config::{
    AuthSettings, ConfigError, IterationSettings, RateLimitSettings, RetrySettings, Settings,
    TaskConfig, TimeoutSettings,
};
pub use entry::{EntryKind, StorageEntry};
pub use frontier::{CrawlFrontier, CrawlStep, SkipReason};
pub use pagination::{PageCursor, PageStep};
pub use request::{parse_trigger_line, RequestAction, RequestError, TaskRequest, TriggerError};
pub use scroll::{ScrollObservation, ScrollTracker, STAGNATION_THRESHOLD};
pub use strategy::{StopReason, Strategy};
pub use urls::{host_of, normalize_url, resolve_link};
