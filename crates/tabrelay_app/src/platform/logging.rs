//! Logger setup for the binary. Stdout is never a destination: the native
//! transport speaks its protocol there.

use tabrelay_logging::LogDestination;

use super::cli::Cli;

pub(crate) fn initialize(cli: &Cli) {
    let destination = if cli.log_file.as_os_str().is_empty() {
        LogDestination::Terminal
    } else {
        LogDestination::Both(cli.log_file.clone())
    };
    tabrelay_logging::initialize(destination, cli.log_level.into());
}
