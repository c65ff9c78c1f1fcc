use std::net::SocketAddr;
use std::path::PathBuf;

use tabrelay_engine::DUCKDUCKGO;

use super::cli::{ServeArgs, TransportKind};

/// Everything `serve` needs to wire the bridge together.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BridgeSettings {
    pub transport: TransportKind,
    pub http_addr: SocketAddr,
    pub trigger_addr: Option<SocketAddr>,
    pub config_dir: PathBuf,
    pub output_dir: PathBuf,
    pub default_platform: String,
    pub forward_progress: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::Native,
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8765)),
            trigger_addr: Some(SocketAddr::from(([127, 0, 0, 1], 9999))),
            config_dir: PathBuf::from("config"),
            output_dir: PathBuf::from("results"),
            default_platform: DUCKDUCKGO.to_string(),
            forward_progress: false,
        }
    }
}

impl BridgeSettings {
    pub fn with_overrides(mut self, args: &ServeArgs) -> Self {
        if let Some(transport) = args.transport {
            self.transport = transport;
        }
        if let Some(addr) = args.http_addr {
            self.http_addr = addr;
        }
        if let Some(addr) = args.trigger_addr {
            self.trigger_addr = Some(addr);
        }
        if args.no_trigger {
            self.trigger_addr = None;
        }
        if let Some(dir) = &args.config_dir {
            self.config_dir = dir.clone();
        }
        if let Some(dir) = &args.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(platform) = &args.default_platform {
            self.default_platform = platform.clone();
        }
        self.forward_progress |= args.forward_progress;
        self
    }
}
