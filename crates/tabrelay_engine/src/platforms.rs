//! Per-platform task configuration, read from `<config_dir>/<platform>.ron`.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tabrelay_core::{ConfigError, Strategy, TaskConfig};
use tabrelay_logging::{relay_debug, relay_info};
use thiserror::Error;

pub const DUCKDUCKGO: &str = "duckduckgo";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("no configuration for platform {platform:?} (looked for {path:?})")]
    NotFound { platform: String, path: PathBuf },
    #[error("reading {path:?} failed: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("parsing {path:?} failed: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("invalid configuration for {platform:?}: {source}")]
    Invalid {
        platform: String,
        #[source]
        source: ConfigError,
    },
}

/// Built-in configuration for the DuckDuckGo web search.
pub fn duckduckgo_config() -> TaskConfig {
    let mut config = TaskConfig::new("https://duckduckgo.com/")
        .with_selector(TaskConfig::SEARCH_INPUT, "input[name=\"q\"]")
        .with_selector(TaskConfig::RESULTS_CONTAINER, "[data-testid=\"result\"]")
        .with_selector(TaskConfig::NEXT_PAGE_BUTTON, "#more-results");
    config.settings.iteration.strategy = Strategy::Pagination;
    config.settings.iteration.max_pages = 3;
    config
}

/// Resolves platform names to validated [`TaskConfig`]s. Files on disk take
/// precedence over built-in defaults.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    dir: PathBuf,
    builtin: BTreeMap<String, TaskConfig>,
}

impl ConfigLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let mut builtin = BTreeMap::new();
        builtin.insert(DUCKDUCKGO.to_string(), duckduckgo_config());
        Self {
            dir: dir.into(),
            builtin,
        }
    }

    pub fn with_builtin(mut self, platform: impl Into<String>, config: TaskConfig) -> Self {
        self.builtin.insert(platform.into(), config);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, platform: &str) -> PathBuf {
        self.dir.join(format!("{platform}.ron"))
    }

    pub fn load(&self, platform: &str) -> Result<TaskConfig, ConfigLoadError> {
        let path = self.path_for(platform);
        let config = match fs::read_to_string(&path) {
            Ok(text) => {
                let config: TaskConfig =
                    ron::from_str(&text).map_err(|err| ConfigLoadError::Parse {
                        path: path.clone(),
                        reason: err.to_string(),
                    })?;
                relay_info!("Loaded {platform} configuration from {:?}", path);
                config
            }
            Err(err) if err.kind() == ErrorKind::NotFound => match self.builtin.get(platform) {
                Some(config) => {
                    relay_debug!("Using built-in {platform} configuration");
                    config.clone()
                }
                None => {
                    return Err(ConfigLoadError::NotFound {
                        platform: platform.to_string(),
                        path,
                    })
                }
            },
            Err(err) => {
                return Err(ConfigLoadError::Read {
                    path,
                    reason: err.to_string(),
                })
            }
        };

        config.validate().map_err(|source| ConfigLoadError::Invalid {
            platform: platform.to_string(),
            source,
        })?;
        Ok(config)
    }
}
