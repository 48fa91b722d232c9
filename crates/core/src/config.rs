use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::TtlPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub recommendations: RecommendationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub personalized_ttl_secs: u64,
    pub similar_ttl_secs: u64,
    pub trending_ttl_secs: u64,
    pub popular_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RecommendationConfig {
    pub trending_window_days: i64,
    pub warm_on_start: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub cache_max_entries: Option<usize>,
    pub warm_on_start: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let ttl = TtlPolicy::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://curator.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 5000,
                graceful_shutdown_secs: 15,
            },
            cache: CacheConfig {
                max_entries: crate::cache::DEFAULT_MAX_ENTRIES,
                personalized_ttl_secs: ttl.personalized.as_secs(),
                similar_ttl_secs: ttl.similar.as_secs(),
                trending_ttl_secs: ttl.trending.as_secs(),
                popular_ttl_secs: ttl.popular.as_secs(),
            },
            recommendations: RecommendationConfig {
                trending_window_days: 7,
                warm_on_start: true,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl CacheConfig {
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            personalized: Duration::from_secs(self.personalized_ttl_secs),
            similar: Duration::from_secs(self.similar_ttl_secs),
            trending: Duration::from_secs(self.trending_ttl_secs),
            popular: Duration::from_secs(self.popular_ttl_secs),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("curator.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(max_entries) = cache.max_entries {
                self.cache.max_entries = max_entries;
            }
            if let Some(secs) = cache.personalized_ttl_secs {
                self.cache.personalized_ttl_secs = secs;
            }
            if let Some(secs) = cache.similar_ttl_secs {
                self.cache.similar_ttl_secs = secs;
            }
            if let Some(secs) = cache.trending_ttl_secs {
                self.cache.trending_ttl_secs = secs;
            }
            if let Some(secs) = cache.popular_ttl_secs {
                self.cache.popular_ttl_secs = secs;
            }
        }

        if let Some(recommendations) = patch.recommendations {
            if let Some(days) = recommendations.trending_window_days {
                self.recommendations.trending_window_days = days;
            }
            if let Some(warm_on_start) = recommendations.warm_on_start {
                self.recommendations.warm_on_start = warm_on_start;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CURATOR_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CURATOR_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("CURATOR_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CURATOR_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CURATOR_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CURATOR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CURATOR_SERVER_PORT") {
            self.server.port = parse_u16("CURATOR_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CURATOR_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CURATOR_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("CURATOR_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse_usize("CURATOR_CACHE_MAX_ENTRIES", &value)?;
        }
        if let Some(value) = read_env("CURATOR_CACHE_PERSONALIZED_TTL_SECS") {
            self.cache.personalized_ttl_secs =
                parse_u64("CURATOR_CACHE_PERSONALIZED_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("CURATOR_CACHE_SIMILAR_TTL_SECS") {
            self.cache.similar_ttl_secs = parse_u64("CURATOR_CACHE_SIMILAR_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("CURATOR_CACHE_TRENDING_TTL_SECS") {
            self.cache.trending_ttl_secs = parse_u64("CURATOR_CACHE_TRENDING_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("CURATOR_CACHE_POPULAR_TTL_SECS") {
            self.cache.popular_ttl_secs = parse_u64("CURATOR_CACHE_POPULAR_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("CURATOR_RECOMMENDATIONS_TRENDING_WINDOW_DAYS") {
            self.recommendations.trending_window_days =
                parse_i64("CURATOR_RECOMMENDATIONS_TRENDING_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("CURATOR_RECOMMENDATIONS_WARM_ON_START") {
            self.recommendations.warm_on_start =
                parse_bool("CURATOR_RECOMMENDATIONS_WARM_ON_START", &value)?;
        }

        let log_level = read_env("CURATOR_LOGGING_LEVEL").or_else(|| read_env("CURATOR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CURATOR_LOGGING_FORMAT").or_else(|| read_env("CURATOR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(max_entries) = overrides.cache_max_entries {
            self.cache.max_entries = max_entries;
        }
        if let Some(warm_on_start) = overrides.warm_on_start {
            self.recommendations.warm_on_start = warm_on_start;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_cache(&self.cache)?;
        validate_recommendations(&self.recommendations)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("curator.toml"), PathBuf::from("config/curator.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

/// Thirty days.
pub const MAX_CACHE_TTL_SECS: u64 = 2_592_000;

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.max_entries == 0 || cache.max_entries > 1_000_000 {
        return Err(ConfigError::Validation(
            "cache.max_entries must be in range 1..=1000000".to_string(),
        ));
    }

    let ttls = [
        ("cache.personalized_ttl_secs", cache.personalized_ttl_secs),
        ("cache.similar_ttl_secs", cache.similar_ttl_secs),
        ("cache.trending_ttl_secs", cache.trending_ttl_secs),
        ("cache.popular_ttl_secs", cache.popular_ttl_secs),
    ];
    if let Some((name, _)) =
        ttls.iter().find(|(_, secs)| *secs == 0 || *secs > MAX_CACHE_TTL_SECS)
    {
        return Err(ConfigError::Validation(format!(
            "{name} must be in range 1..={MAX_CACHE_TTL_SECS}"
        )));
    }

    Ok(())
}

fn validate_recommendations(recommendations: &RecommendationConfig) -> Result<(), ConfigError> {
    if !(1..=365).contains(&recommendations.trending_window_days) {
        return Err(ConfigError::Validation(
            "recommendations.trending_window_days must be in range 1..=365".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    let valid = matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error");
    if !valid {
        return Err(ConfigError::Validation(format!(
            "logging.level `{}` is invalid (expected trace|debug|info|warn|error)",
            logging.level
        )));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    cache: Option<CachePatch>,
    recommendations: Option<RecommendationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    max_entries: Option<usize>,
    personalized_ttl_secs: Option<u64>,
    similar_ttl_secs: Option<u64>,
    trending_ttl_secs: Option<u64>,
    popular_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationPatch {
    trending_window_days: Option<i64>,
    warm_on_start: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
