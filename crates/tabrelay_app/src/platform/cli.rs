use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tabrelay")]
#[command(about = "Drive a browser-tab agent through correlated commands", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log verbosity
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log file; pass an empty string to log to stderr only
    #[arg(long, global = true, default_value = tabrelay_logging::DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the bridge between the agent and incoming task requests
    Serve(ServeArgs),

    /// Send one `action:query[:platform]` line to a running trigger listener
    Trigger {
        /// Listener address
        #[arg(long, default_value = "127.0.0.1:9999")]
        addr: SocketAddr,

        /// The trigger line, e.g. `start_search:rust async`
        #[arg(required = true, num_args = 1..)]
        line: Vec<String>,
    },

    /// Summarize a result file
    Results {
        /// Directory holding result files
        #[arg(long, default_value = "results")]
        dir: PathBuf,

        /// Only consider runs of this platform
        #[arg(short, long)]
        platform: Option<String>,

        /// Summarize this file instead of the latest run
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// How the agent is connected
    #[arg(long, value_enum)]
    pub transport: Option<TransportKind>,

    /// HTTP bridge address (http transport only)
    #[arg(long)]
    pub http_addr: Option<SocketAddr>,

    /// Trigger listener address
    #[arg(long)]
    pub trigger_addr: Option<SocketAddr>,

    /// Do not start the trigger listener
    #[arg(long)]
    pub no_trigger: bool,

    /// Directory holding `<platform>.ron` task configs
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    /// Directory receiving result files
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Platform used when a request names none
    #[arg(long)]
    pub default_platform: Option<String>,

    /// Also send progress events to the agent
    #[arg(long)]
    pub forward_progress: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum TransportKind {
    /// Length-prefixed JSON over stdin/stdout
    Native,
    /// Agent polls an HTTP endpoint
    Http,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}
