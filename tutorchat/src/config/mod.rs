//! Configuration system for the `TutorChat` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/tutorchat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::chat::reveal::RevealDelays;
use crate::gateway::demo::DemoConfig;

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

    /// A value parsed but is out of range.
    #[error("invalid config value for {key}: {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    reveal: RevealFileConfig,
    client: ClientFileConfig,
    demo: DemoFileConfig,
    ui: UiFileConfig,
}

/// `[reveal]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RevealFileConfig {
    char_delay_ms: Option<u64>,
    inline_delay_ms: Option<u64>,
    block_delay_ms: Option<u64>,
}

/// `[client]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ClientFileConfig {
    completion_buffer: Option<usize>,
    event_buffer: Option<usize>,
}

/// `[demo]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DemoFileConfig {
    latency_ms: Option<u64>,
    failure_rate: Option<f64>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    poll_timeout_ms: Option<u64>,
    timestamp_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Chat core configuration (used by `ChatClient`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Per-unit reveal delays.
    pub reveal: RevealDelays,
    /// Capacity of the completion channel.
    pub completion_buffer: usize,
    /// Capacity of the client event channel.
    pub event_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            reveal: RevealDelays::default(),
            completion_buffer: 256,
            event_buffer: 64,
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Chat core config (reveal pacing, channel sizes).
    pub chat: ChatConfig,
    /// Demo server latency and failure injection.
    pub demo: DemoConfig,
    /// Poll timeout for the TUI event loop.
    pub poll_timeout: Duration,
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chat: ChatConfig::default(),
            demo: DemoConfig::default(),
            poll_timeout: Duration::from_millis(50),
            timestamp_format: "%H:%M".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// Otherwise the default path (`~/.config/tutorchat/config.toml`) is
    /// tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or a value is out of range.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let reveal = defaults.chat.reveal;

        let failure_rate = cli
            .demo_failure_rate
            .or(file.demo.failure_rate)
            .unwrap_or(defaults.demo.failure_rate);
        if !(0.0..=1.0).contains(&failure_rate) {
            return Err(ConfigError::Invalid {
                key: "demo.failure_rate",
                reason: format!("{failure_rate} is not within 0.0..=1.0"),
            });
        }

        Ok(Self {
            chat: ChatConfig {
                reveal: RevealDelays {
                    char_delay: file
                        .reveal
                        .char_delay_ms
                        .map_or(reveal.char_delay, Duration::from_millis),
                    inline_delay: file
                        .reveal
                        .inline_delay_ms
                        .map_or(reveal.inline_delay, Duration::from_millis),
                    block_delay: file
                        .reveal
                        .block_delay_ms
                        .map_or(reveal.block_delay, Duration::from_millis),
                },
                completion_buffer: file
                    .client
                    .completion_buffer
                    .unwrap_or(defaults.chat.completion_buffer),
                event_buffer: file
                    .client
                    .event_buffer
                    .unwrap_or(defaults.chat.event_buffer),
            },
            demo: DemoConfig {
                latency: cli
                    .demo_latency_ms
                    .or(file.demo.latency_ms)
                    .map_or(defaults.demo.latency, Duration::from_millis),
                failure_rate,
            },
            poll_timeout: file
                .ui
                .poll_timeout_ms
                .map_or(defaults.poll_timeout, Duration::from_millis),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.ui.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Terminal chat client for a math tutor backend")]
pub struct CliArgs {
    /// Path to config file (default: `~/.config/tutorchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Base latency of the demo server in milliseconds.
    #[arg(long, env = "TUTORCHAT_DEMO_LATENCY_MS")]
    pub demo_latency_ms: Option<u64>,

    /// Probability (0.0 to 1.0) that a demo server call fails.
    #[arg(long, env = "TUTORCHAT_DEMO_FAILURE_RATE")]
    pub demo_failure_rate: Option<f64>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TUTORCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/tutorchat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

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
    let path = config_dir.join("tutorchat").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
