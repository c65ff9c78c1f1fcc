//! Tabrelay engine: agent transports, command correlation, task execution and
//! the servers that feed requests into it.
mod controller;
mod correlator;
mod dispatcher;
mod error;
mod framing;
mod http_bridge;
mod pipe;
mod platforms;
mod progress;
mod queue;
mod report;
mod retry;
mod runner;
mod store;
mod tasks;
mod trigger;

pub use controller::Controller;
pub use correlator::{CommandSink, Correlator, CorrelatorError, DeliveryError};
pub use dispatcher::{Dispatcher, PlatformInfo, TaskFactory, TaskRegistry};
pub use error::{FailureKind, TaskError};
pub use framing::{
    decode_payload, encode_frame, encode_payload, frame_codec, frame_reader, frame_writer,
    FrameError, FrameReader, FrameWriter, MAX_FRAME_LEN,
};
pub use http_bridge::{router, serve as serve_http, BridgeState};
pub use pipe::PipeTransport;
pub use platforms::{duckduckgo_config, ConfigLoadError, ConfigLoader, DUCKDUCKGO};
pub use progress::{
    AgentProgressSink, ChannelProgressSink, ProgressEvent, ProgressSink, ProgressSummary,
    ProgressTracker, StoreProgressSink,
};
pub use queue::CommandQueue;
pub use report::{ErrorBody, Performance, RunSummary, TaskReport};
pub use retry::{with_retry, with_retry_if, RetryPolicy};
pub use runner::{ItemCallback, Iteration, RunState, TaskRunner};
pub use store::{
    ensure_output_dir, latest_run_file, read_entries, utc_clock, Clock, EntryCounts,
    IncrementalStore, RunLog, StoreError,
};
pub use tasks::{CrawlTask, SearchTask, Task};
pub use trigger::{
    handle_message, send_trigger, serve_triggers, READ_TIMEOUT, REPLY_OK, REPLY_UNKNOWN,
};
