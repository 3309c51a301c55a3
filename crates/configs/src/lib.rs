//! forum-board/crates/configs/src/lib.rs
//!
//! Layered runtime configuration: built-in defaults, then an optional
//! `forum.toml`, then `FORUM__*` environment variables (a `.env` file is
//! loaded into the environment first). Nested keys use `__` in variable
//! names, e.g. `FORUM__CACHE__TTL__POST_DETAIL=120`.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;
use tracing::debug;

pub const ENV_PREFIX: &str = "FORUM";
pub const DEFAULT_CONFIG_FILE: &str = "forum.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub repair: RepairConfig,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string. Without it the in-memory store is used.
    #[serde(default)]
    pub url: Option<SecretString>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheBackendKind {
    Memory,
    /// In-process cache without prefix deletes.
    MemoryExact,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    #[serde(default)]
    pub redis_url: Option<String>,
    pub ttl: TtlConfig,
}

/// Per-category TTLs in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TtlConfig {
    pub home_posts: u64,
    pub board_posts: u64,
    pub post_detail: u64,
    pub user_profile: u64,
}

impl TtlConfig {
    pub fn home_posts(&self) -> Duration {
        Duration::from_secs(self.home_posts)
    }

    pub fn board_posts(&self) -> Duration {
        Duration::from_secs(self.board_posts)
    }

    pub fn post_detail(&self) -> Duration {
        Duration::from_secs(self.post_detail)
    }

    pub fn user_profile(&self) -> Duration {
        Duration::from_secs(self.user_profile)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RepairConfig {
    /// Seconds between counter repair sweeps. `0` disables the sweeper.
    pub interval_secs: u64,
}

impl RepairConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

impl AppConfig {
    /// Loads `.env`, then layers `forum.toml` from the working directory and
    /// the process environment over the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Same as [`AppConfig::load`] without touching `.env`, reading the
    /// given file if it exists.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(File::from(path).required(false))
            .add_source(environment())
            .build()?;
        Self::finish(config)
    }

    /// Parses a TOML document layered over the defaults, ignoring the
    /// environment.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::finish(config)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("database.max_connections", 10)?
            .set_default("cache.backend", "memory")?
            .set_default("cache.ttl.home_posts", 300)?
            .set_default("cache.ttl.board_posts", 180)?
            .set_default("cache.ttl.post_detail", 600)?
            .set_default("cache.ttl.user_profile", 1800)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("repair.interval_secs", 3600)?)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ttl = &self.cache.ttl;
        for (name, secs) in [
            ("home_posts", ttl.home_posts),
            ("board_posts", ttl.board_posts),
            ("post_detail", ttl.post_detail),
            ("user_profile", ttl.user_profile),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "cache.ttl.{name} must be greater than zero"
                )));
            }
        }

        if self.cache.backend == CacheBackendKind::Redis && self.cache.redis_url.is_none() {
            return Err(ConfigError::Invalid(
                "cache.redis_url is required when cache.backend = \"redis\"".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
