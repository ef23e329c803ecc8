use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of the scheduling backend (ws:// or wss://)
    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Maximum reconnect attempts after the backend connection drops (0 disables)
    #[arg(long, env = "RECONNECT_MAX_ATTEMPTS")]
    pub reconnect_max_attempts: Option<u32>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub reconnect: ReconnectConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Page title and header text.
    pub title: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub url: String,
}

impl BackendConfig {
    /// Parsed backend base URL.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.url)
    }
}

/// Exponential backoff for re-opening a dropped backend connection.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl ReconnectConfig {
    /// Reconnect turned off: a dropped connection is final.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before the given 1-based attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        let millis = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let defaults = ReconnectConfig::default();
        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.title", "AI-Powered Appointment Scheduling")?
            .set_default("backend.url", "ws://localhost:8000")?
            .set_default("reconnect.max_attempts", i64::from(defaults.max_attempts))?
            .set_default("reconnect.initial_delay_ms", defaults.initial_delay_ms)?
            .set_default("reconnect.max_delay_ms", defaults.max_delay_ms)?
            .set_default("logging.json", false)?;

        // Explicit file is required; ./config.{yaml,toml,json} is picked up if present.
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // E.g. CHAT_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("CHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // CLI flags (and their plain env fallbacks) win over everything else.
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(url) = cli.backend_url {
            builder = builder.set_override("backend.url", url)?;
        }
        if let Some(attempts) = cli.reconnect_max_attempts {
            builder = builder.set_override("reconnect.max_attempts", i64::from(attempts))?;
        }
        if let Some(json) = cli.log_json {
            builder = builder.set_override("logging.json", json)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.backend
            .base_url()
            .map_err(|e| config::ConfigError::Message(format!("backend.url: {e}")))?;
        Ok(cfg)
    }
}
