//! Configuration for the `tasklist` binary.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/tasklist/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use tasklist_proto::SortOrder;

use crate::enrich::EnrichmentConfig;
use crate::tasks::TaskListConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    session: SessionFileConfig,
    enrichment: EnrichmentFileConfig,
    tasks: TasksFileConfig,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    user_id: Option<String>,
}

/// `[enrichment]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct EnrichmentFileConfig {
    enabled: Option<bool>,
    functions_url: Option<String>,
    api_key: Option<String>,
    category_delay_ms: Option<u64>,
    duration_delay_ms: Option<u64>,
    submit_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
}

/// `[tasks]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TasksFileConfig {
    default_sort: Option<SortOrder>,
    event_buffer: Option<usize>,
    max_title_len: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Principal to sign in as.
    pub user_id: Option<String>,
    /// Base URL of the classification functions.
    pub functions_url: Option<String>,
    /// Bearer token for the classification functions.
    pub api_key: Option<String>,
    /// Timeout of a single classification HTTP request.
    pub request_timeout: Duration,
    /// Task-list settings.
    pub task_list: TaskListConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            functions_url: None,
            api_key: None,
            request_timeout: Duration::from_secs(10),
            task_list: TaskListConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read,
    /// or if any config file found cannot be parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let task_defaults = defaults.task_list;
        let enrich_defaults = task_defaults.enrichment.clone();
        let enrichment = &file.enrichment;

        let millis_or = |value: Option<u64>, default: Duration| {
            value.map_or(default, Duration::from_millis)
        };

        Self {
            user_id: cli
                .user_id
                .clone()
                .or_else(|| file.session.user_id.clone()),
            functions_url: cli
                .functions_url
                .clone()
                .or_else(|| enrichment.functions_url.clone()),
            api_key: cli.api_key.clone().or_else(|| enrichment.api_key.clone()),
            request_timeout: millis_or(enrichment.request_timeout_ms, defaults.request_timeout),
            task_list: TaskListConfig {
                enrichment: EnrichmentConfig {
                    enabled: !cli.no_enrichment
                        && enrichment.enabled.unwrap_or(enrich_defaults.enabled),
                    category_delay: millis_or(
                        enrichment.category_delay_ms,
                        enrich_defaults.category_delay,
                    ),
                    duration_delay: millis_or(
                        enrichment.duration_delay_ms,
                        enrich_defaults.duration_delay,
                    ),
                    submit_timeout: millis_or(
                        enrichment.submit_timeout_ms,
                        enrich_defaults.submit_timeout,
                    ),
                },
                sort: cli
                    .sort
                    .or(file.tasks.default_sort)
                    .unwrap_or(task_defaults.sort),
                max_title_len: file
                    .tasks
                    .max_title_len
                    .unwrap_or(task_defaults.max_title_len),
                event_buffer: file
                    .tasks
                    .event_buffer
                    .unwrap_or(task_defaults.event_buffer),
            },
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Task list with optimistic updates and auto-classification")]
pub struct CliArgs {
    /// Principal to sign in as.
    #[arg(long, env = "TASKLIST_USER")]
    pub user_id: Option<String>,

    /// Base URL of the classification functions.
    #[arg(long, env = "TASKLIST_FUNCTIONS_URL")]
    pub functions_url: Option<String>,

    /// Bearer token for the classification functions.
    #[arg(long, env = "TASKLIST_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Disable category and duration suggestions.
    #[arg(long)]
    pub no_enrichment: bool,

    /// Initial sort order (created-asc, created-desc, due-asc, due-desc).
    #[arg(long)]
    pub sort: Option<SortOrder>,

    /// Path to config file (default: `~/.config/tasklist/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKLIST_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/tasklist.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist. Otherwise the default
/// path is tried and a missing file is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("tasklist").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
