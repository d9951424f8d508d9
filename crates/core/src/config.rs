use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::provider::{BackendKind, FallbackTarget};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub routing: RoutingConfig,
    pub cloud: CloudConfig,
    pub local: LocalConfig,
    pub tunnel: TunnelConfig,
    pub rate_limit: RateLimitSettings,
    pub auth: AuthConfig,
    pub memory: MemoryConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Owner-preferred backend routing. Non-owners are always forced to cloud
/// with no fallback regardless of these settings.
#[derive(Clone, Debug)]
pub struct RoutingConfig {
    pub primary: BackendKind,
    pub fallback: FallbackTarget,
}

#[derive(Clone, Debug)]
pub struct CloudConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Clone, Debug)]
pub struct LocalConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TunnelConfig {
    pub url: Option<String>,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
    /// A tunnel-relayed local backend only works from a direct client
    /// connection. When the serving environment cannot reach it, routing
    /// treats a tunnel primary as cloud before any attempt is made.
    pub reachable_from_server: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitSettings {
    pub window_ms: i64,
    pub max_requests: u32,
    pub owner_max_requests: u32,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub admin_signing_key: Option<SecretString>,
    pub admin_token_max_age_secs: i64,
    /// Channels whose pre-verified integrations may supply a tier claim in
    /// the request body. Anything else is ignored.
    pub trusted_channels: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct MemoryConfig {
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub base_url: Option<String>,
    pub timeout_secs: u64,
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
    pub primary_backend: Option<BackendKind>,
    pub fallback_backend: Option<FallbackTarget>,
    pub cloud_api_key: Option<String>,
    pub cloud_base_url: Option<String>,
    pub local_base_url: Option<String>,
    pub tunnel_url: Option<String>,
    pub tunnel_api_key: Option<String>,
    pub tunnel_reachable_from_server: Option<bool>,
    pub admin_signing_key: Option<String>,
    pub trusted_channels: Option<Vec<String>>,
    pub rate_limit_max_requests: Option<u32>,
    pub rate_limit_owner_max_requests: Option<u32>,
    pub memory_base_url: Option<String>,
    pub registry_base_url: Option<String>,
    pub log_level: Option<String>,
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
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            routing: RoutingConfig {
                primary: BackendKind::Cloud,
                fallback: FallbackTarget::None,
            },
            cloud: CloudConfig {
                api_key: None,
                base_url: "https://api.openai.com".to_string(),
                model: "gpt-4o".to_string(),
                max_tokens: 1000,
                temperature: 0.7,
            },
            local: LocalConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "gpt-oss:20b".to_string(),
                timeout_secs: 30,
            },
            tunnel: TunnelConfig {
                url: None,
                api_key: None,
                model: "gpt-oss:20b".to_string(),
                timeout_secs: 30,
                reachable_from_server: false,
            },
            rate_limit: RateLimitSettings {
                window_ms: 60_000,
                max_requests: 10,
                owner_max_requests: 60,
            },
            auth: AuthConfig {
                admin_signing_key: None,
                admin_token_max_age_secs: 30 * 86_400,
                trusted_channels: vec!["whatsapp".to_string()],
            },
            memory: MemoryConfig { base_url: None, timeout_secs: 10 },
            registry: RegistryConfig { base_url: None, timeout_secs: 30 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cloud" => Ok(Self::Cloud),
            "local" => Ok(Self::Local),
            "tunnel" => Ok(Self::Tunnel),
            other => Err(ConfigError::Validation(format!(
                "unsupported backend `{other}` (expected cloud|local|tunnel)"
            ))),
        }
    }
}

impl std::str::FromStr for FallbackTarget {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cloud" => Ok(Self::Cloud),
            "none" => Ok(Self::None),
            other => Err(ConfigError::Validation(format!(
                "unsupported fallback `{other}` (expected cloud|none)"
            ))),
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    routing: Option<RoutingPatch>,
    cloud: Option<CloudPatch>,
    local: Option<LocalPatch>,
    tunnel: Option<TunnelPatch>,
    rate_limit: Option<RateLimitPatch>,
    auth: Option<AuthPatch>,
    memory: Option<EndpointPatch>,
    registry: Option<EndpointPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    primary: Option<BackendKind>,
    fallback: Option<FallbackTarget>,
}

#[derive(Debug, Default, Deserialize)]
struct CloudPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LocalPatch {
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TunnelPatch {
    url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    reachable_from_server: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitPatch {
    window_ms: Option<i64>,
    max_requests: Option<u32>,
    owner_max_requests: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    admin_signing_key: Option<String>,
    admin_token_max_age_secs: Option<i64>,
    trusted_channels: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parley.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
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

        if let Some(routing) = patch.routing {
            if let Some(primary) = routing.primary {
                self.routing.primary = primary;
            }
            if let Some(fallback) = routing.fallback {
                self.routing.fallback = fallback;
            }
        }

        if let Some(cloud) = patch.cloud {
            if let Some(api_key) = cloud.api_key {
                self.cloud.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = cloud.base_url {
                self.cloud.base_url = base_url;
            }
            if let Some(model) = cloud.model {
                self.cloud.model = model;
            }
            if let Some(max_tokens) = cloud.max_tokens {
                self.cloud.max_tokens = max_tokens;
            }
            if let Some(temperature) = cloud.temperature {
                self.cloud.temperature = temperature;
            }
        }

        if let Some(local) = patch.local {
            if let Some(base_url) = local.base_url {
                self.local.base_url = base_url;
            }
            if let Some(model) = local.model {
                self.local.model = model;
            }
            if let Some(timeout_secs) = local.timeout_secs {
                self.local.timeout_secs = timeout_secs;
            }
        }

        if let Some(tunnel) = patch.tunnel {
            if let Some(url) = tunnel.url {
                self.tunnel.url = Some(url);
            }
            if let Some(api_key) = tunnel.api_key {
                self.tunnel.api_key = Some(secret_value(api_key));
            }
            if let Some(model) = tunnel.model {
                self.tunnel.model = model;
            }
            if let Some(timeout_secs) = tunnel.timeout_secs {
                self.tunnel.timeout_secs = timeout_secs;
            }
            if let Some(reachable) = tunnel.reachable_from_server {
                self.tunnel.reachable_from_server = reachable;
            }
        }

        if let Some(rate_limit) = patch.rate_limit {
            if let Some(window_ms) = rate_limit.window_ms {
                self.rate_limit.window_ms = window_ms;
            }
            if let Some(max_requests) = rate_limit.max_requests {
                self.rate_limit.max_requests = max_requests;
            }
            if let Some(owner_max_requests) = rate_limit.owner_max_requests {
                self.rate_limit.owner_max_requests = owner_max_requests;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(admin_signing_key) = auth.admin_signing_key {
                self.auth.admin_signing_key = Some(secret_value(admin_signing_key));
            }
            if let Some(max_age) = auth.admin_token_max_age_secs {
                self.auth.admin_token_max_age_secs = max_age;
            }
            if let Some(trusted_channels) = auth.trusted_channels {
                self.auth.trusted_channels = trusted_channels;
            }
        }

        if let Some(memory) = patch.memory {
            if let Some(base_url) = memory.base_url {
                self.memory.base_url = Some(base_url);
            }
            if let Some(timeout_secs) = memory.timeout_secs {
                self.memory.timeout_secs = timeout_secs;
            }
        }

        if let Some(registry) = patch.registry {
            if let Some(base_url) = registry.base_url {
                self.registry.base_url = Some(base_url);
            }
            if let Some(timeout_secs) = registry.timeout_secs {
                self.registry.timeout_secs = timeout_secs;
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
        if let Some(value) = read_env("PARLEY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PARLEY_SERVER_PORT") {
            self.server.port = parse_u16("PARLEY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_ROUTING_PRIMARY") {
            self.routing.primary = value.parse()?;
        }
        if let Some(value) = read_env("PARLEY_ROUTING_FALLBACK") {
            self.routing.fallback = value.parse()?;
        }

        if let Some(value) = read_env("PARLEY_CLOUD_API_KEY") {
            self.cloud.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARLEY_CLOUD_BASE_URL") {
            self.cloud.base_url = value;
        }
        if let Some(value) = read_env("PARLEY_CLOUD_MODEL") {
            self.cloud.model = value;
        }

        if let Some(value) = read_env("PARLEY_LOCAL_BASE_URL") {
            self.local.base_url = value;
        }
        if let Some(value) = read_env("PARLEY_LOCAL_MODEL") {
            self.local.model = value;
        }
        if let Some(value) = read_env("PARLEY_LOCAL_TIMEOUT_SECS") {
            self.local.timeout_secs = parse_u64("PARLEY_LOCAL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_TUNNEL_URL") {
            self.tunnel.url = Some(value);
        }
        if let Some(value) = read_env("PARLEY_TUNNEL_API_KEY") {
            self.tunnel.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARLEY_TUNNEL_MODEL") {
            self.tunnel.model = value;
        }
        if let Some(value) = read_env("PARLEY_TUNNEL_TIMEOUT_SECS") {
            self.tunnel.timeout_secs = parse_u64("PARLEY_TUNNEL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_TUNNEL_REACHABLE_FROM_SERVER") {
            self.tunnel.reachable_from_server =
                parse_bool("PARLEY_TUNNEL_REACHABLE_FROM_SERVER", &value)?;
        }

        if let Some(value) = read_env("PARLEY_RATE_LIMIT_WINDOW_MS") {
            self.rate_limit.window_ms = parse_i64("PARLEY_RATE_LIMIT_WINDOW_MS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests = parse_u32("PARLEY_RATE_LIMIT_MAX_REQUESTS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_RATE_LIMIT_OWNER_MAX_REQUESTS") {
            self.rate_limit.owner_max_requests =
                parse_u32("PARLEY_RATE_LIMIT_OWNER_MAX_REQUESTS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_AUTH_ADMIN_SIGNING_KEY") {
            self.auth.admin_signing_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARLEY_AUTH_TRUSTED_CHANNELS") {
            self.auth.trusted_channels =
                value.split(',').map(|channel| channel.trim().to_string()).collect();
        }

        if let Some(value) = read_env("PARLEY_MEMORY_BASE_URL") {
            self.memory.base_url = Some(value);
        }
        if let Some(value) = read_env("PARLEY_REGISTRY_BASE_URL") {
            self.registry.base_url = Some(value);
        }

        let log_level = read_env("PARLEY_LOGGING_LEVEL").or_else(|| read_env("PARLEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARLEY_LOGGING_FORMAT").or_else(|| read_env("PARLEY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(primary) = overrides.primary_backend {
            self.routing.primary = primary;
        }
        if let Some(fallback) = overrides.fallback_backend {
            self.routing.fallback = fallback;
        }
        if let Some(api_key) = overrides.cloud_api_key {
            self.cloud.api_key = Some(secret_value(api_key));
        }
        if let Some(base_url) = overrides.cloud_base_url {
            self.cloud.base_url = base_url;
        }
        if let Some(base_url) = overrides.local_base_url {
            self.local.base_url = base_url;
        }
        if let Some(url) = overrides.tunnel_url {
            self.tunnel.url = Some(url);
        }
        if let Some(api_key) = overrides.tunnel_api_key {
            self.tunnel.api_key = Some(secret_value(api_key));
        }
        if let Some(reachable) = overrides.tunnel_reachable_from_server {
            self.tunnel.reachable_from_server = reachable;
        }
        if let Some(admin_signing_key) = overrides.admin_signing_key {
            self.auth.admin_signing_key = Some(secret_value(admin_signing_key));
        }
        if let Some(trusted_channels) = overrides.trusted_channels {
            self.auth.trusted_channels = trusted_channels;
        }
        if let Some(max_requests) = overrides.rate_limit_max_requests {
            self.rate_limit.max_requests = max_requests;
        }
        if let Some(owner_max_requests) = overrides.rate_limit_owner_max_requests {
            self.rate_limit.owner_max_requests = owner_max_requests;
        }
        if let Some(base_url) = overrides.memory_base_url {
            self.memory.base_url = Some(base_url);
        }
        if let Some(base_url) = overrides.registry_base_url {
            self.registry.base_url = Some(base_url);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation("server.bind_address must not be empty".into()));
        }

        if self.local.timeout_secs == 0 || self.local.timeout_secs > 300 {
            return Err(ConfigError::Validation(
                "local.timeout_secs must be in range 1..=300".into(),
            ));
        }
        if self.tunnel.timeout_secs == 0 || self.tunnel.timeout_secs > 300 {
            return Err(ConfigError::Validation(
                "tunnel.timeout_secs must be in range 1..=300".into(),
            ));
        }

        if self.rate_limit.window_ms <= 0 {
            return Err(ConfigError::Validation(
                "rate_limit.window_ms must be greater than zero".into(),
            ));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.owner_max_requests == 0 {
            return Err(ConfigError::Validation(
                "rate_limit request budgets must be greater than zero".into(),
            ));
        }
        if self.rate_limit.owner_max_requests < self.rate_limit.max_requests {
            return Err(ConfigError::Validation(
                "rate_limit.owner_max_requests must be at least rate_limit.max_requests".into(),
            ));
        }

        if self.routing.primary == BackendKind::Tunnel && self.tunnel.reachable_from_server {
            if self.tunnel.url.as_deref().map(str::trim).unwrap_or("").is_empty() {
                return Err(ConfigError::Validation(
                    "tunnel.url is required when routing.primary = \"tunnel\"".into(),
                ));
            }
            if self
                .tunnel
                .api_key
                .as_ref()
                .map(|key| key.expose_secret().is_empty())
                .unwrap_or(true)
            {
                return Err(ConfigError::Validation(
                    "tunnel.api_key is required when routing.primary = \"tunnel\"".into(),
                ));
            }
        }

        if let Some(key) = &self.auth.admin_signing_key {
            if key.expose_secret().len() < 16 {
                return Err(ConfigError::Validation(
                    "auth.admin_signing_key must be at least 16 bytes".into(),
                ));
            }
        }

        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
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

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.into(), value: value.into() })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.into(), value: value.into() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.into(), value: value.into() })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.into(), value: value.into() })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride { key: key.into(), value: value.into() }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
    use crate::domain::provider::{BackendKind, FallbackTarget};

    fn load_with(overrides: ConfigOverrides) -> Result<AppConfig, ConfigError> {
        AppConfig::load(LoadOptions { overrides, ..LoadOptions::default() })
    }

    #[test]
    fn defaults_load_without_a_file() {
        let config = load_with(ConfigOverrides::default()).expect("defaults should validate");
        assert_eq!(config.routing.primary, BackendKind::Cloud);
        assert_eq!(config.routing.fallback, FallbackTarget::None);
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.owner_max_requests, 60);
        assert_eq!(config.auth.trusted_channels, vec!["whatsapp".to_string()]);
    }

    #[test]
    fn file_patch_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[routing]
primary = "local"
fallback = "cloud"

[local]
base_url = "http://10.0.0.5:11434"
model = "llama3.1"

[rate_limit]
owner_max_requests = 120
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("patched config should load");

        assert_eq!(config.routing.primary, BackendKind::Local);
        assert_eq!(config.routing.fallback, FallbackTarget::Cloud);
        assert_eq!(config.local.base_url, "http://10.0.0.5:11434");
        assert_eq!(config.local.model, "llama3.1");
        assert_eq!(config.rate_limit.owner_max_requests, 120);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("/nonexistent/parley.toml".into()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        });
        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn tunnel_primary_requires_url_and_key_when_reachable() {
        let result = load_with(ConfigOverrides {
            primary_backend: Some(BackendKind::Tunnel),
            tunnel_reachable_from_server: Some(true),
            ..ConfigOverrides::default()
        });
        assert!(matches!(result, Err(ConfigError::Validation(_))));

        let ok = load_with(ConfigOverrides {
            primary_backend: Some(BackendKind::Tunnel),
            tunnel_reachable_from_server: Some(true),
            tunnel_url: Some("https://relay.example.com".into()),
            tunnel_api_key: Some("tunnel-key".into()),
            ..ConfigOverrides::default()
        });
        assert!(ok.is_ok());
    }

    #[test]
    fn owner_budget_must_dominate_default_budget() {
        let result = load_with(ConfigOverrides {
            rate_limit_max_requests: Some(100),
            rate_limit_owner_max_requests: Some(10),
            ..ConfigOverrides::default()
        });
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn short_admin_signing_key_is_rejected() {
        let result = load_with(ConfigOverrides {
            admin_signing_key: Some("short".into()),
            ..ConfigOverrides::default()
        });
        assert!(matches!(result, Err(ConfigError::Validation(_))));

        let ok = load_with(ConfigOverrides {
            admin_signing_key: Some("a-long-enough-signing-key".into()),
            ..ConfigOverrides::default()
        });
        assert_eq!(
            ok.expect("valid key").auth.admin_signing_key.expect("key").expose_secret(),
            "a-long-enough-signing-key"
        );
    }
}
