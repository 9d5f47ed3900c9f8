//! Application configuration loaded from environment variables.
//!
//! Every setting has a default so the service starts against a local
//! Postgres with no environment at all. The service reads `SAGA_*` keys, the
//! participant stub reads `STUB_*` keys. Durations are whole seconds, with an
//! optional `s` suffix (`20` or `20s`).

use std::str::FromStr;
use std::time::Duration;

use queue::{PumpConfig, RESPONSES_QUEUE};
use saga::{ParticipantSpec, SAMPLE_WORKFLOW};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::ConfigError;

/// Prefix for the saga service's keys.
pub const SERVICE_PREFIX: &str = "SAGA";

/// Prefix for the participant stub's keys.
pub const STUB_PREFIX: &str = "STUB";

/// Log output format, chosen with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on the graceful HTTP drain.
    pub shutdown_timeout: Duration,
}

impl WebConfig {
    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            shutdown_timeout: Duration::from_secs(20),
        }
    }
}

/// Database connection settings.
///
/// A full `url` wins over the individual parts.
#[derive(Clone)]
pub struct DbConfig {
    pub url: Option<String>,
    pub user: String,
    pub password: String,
    pub host: String,
    pub name: String,
    pub max_connections: u32,
    pub disable_tls: bool,
}

impl DbConfig {
    /// Builds sqlx connect options from these settings.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url).map_err(|e| ConfigError::Invalid {
                key: "DB_URL".to_string(),
                reason: e.to_string(),
            });
        }

        let ssl_mode = if self.disable_tls {
            PgSslMode::Disable
        } else {
            PgSslMode::Require
        };
        let (host, port) = match self.host.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| ConfigError::Invalid {
                    key: "DB_HOST".to_string(),
                    reason: format!("bad port in '{}'", self.host),
                })?;
                (host, port)
            }
            None => (self.host.as_str(), 5432),
        };

        Ok(PgConnectOptions::new()
            .host(host)
            .port(port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(ssl_mode))
    }
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("url", &self.url.as_ref().map(|_| "<masked>"))
            .field("user", &self.user)
            .field("password", &"<masked>")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .field("disable_tls", &self.disable_tls)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: None,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            host: "localhost".to_string(),
            name: "postgres".to_string(),
            max_connections: 5,
            disable_tls: true,
        }
    }
}

/// Queue consumer settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_messages: usize,
    pub wait_time: Duration,
    pub visibility_timeout: Duration,
    pub responses_queue: String,
}

impl QueueConfig {
    pub fn pump_config(&self) -> PumpConfig {
        PumpConfig {
            max_messages: self.max_messages,
            wait_time: self.wait_time,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time: Duration::from_secs(20),
            visibility_timeout: Duration::from_secs(30),
            responses_queue: RESPONSES_QUEUE.to_string(),
        }
    }
}

/// Kubernetes downward-API details reported by `/liveness`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodInfo {
    pub host: String,
    pub pod: String,
    pub pod_ip: String,
    pub node: String,
    pub namespace: String,
}

impl PodInfo {
    fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).unwrap_or_default();
        let host = lookup("HOSTNAME")
            .filter(|h| !h.is_empty())
            .or_else(|| {
                std::fs::read_to_string("/etc/hostname")
                    .ok()
                    .map(|h| h.trim().to_string())
                    .filter(|h| !h.is_empty())
            })
            .unwrap_or_else(|| "unavailable".to_string());

        Self {
            host,
            pod: var("KUBERNETES_PODNAME"),
            pod_ip: var("KUBERNETES_NAMESPACE_POD_IP"),
            node: var("KUBERNETES_NODENAME"),
            namespace: var("KUBERNETES_NAMESPACE"),
        }
    }
}

/// Saga service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub db: DbConfig,
    pub queue: QueueConfig,
    /// Ordered participants, `SAGA_WORKFLOW=service1=commands1,...`.
    pub workflow: Vec<ParticipantSpec>,
    pub build: String,
    pub log_format: LogFormat,
    pub pod: PodInfo,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a full key to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Prefixed::new(SERVICE_PREFIX, &lookup);
        let web_defaults = WebConfig::default();
        let db_defaults = DbConfig::default();

        let workflow = match env.get("WORKFLOW") {
            Some(raw) => ParticipantSpec::parse_list(&raw),
            None => ParticipantSpec::parse_list(SAMPLE_WORKFLOW),
        }
        .map_err(|e| ConfigError::Invalid {
            key: env.key("WORKFLOW"),
            reason: e.to_string(),
        })?;

        Ok(Self {
            web: WebConfig {
                host: env.get("WEB_HOST").unwrap_or(web_defaults.host),
                port: env.parse("WEB_PORT", web_defaults.port)?,
                shutdown_timeout: env.duration("WEB_SHUTDOWN_TIMEOUT", web_defaults.shutdown_timeout)?,
            },
            db: DbConfig {
                url: env.get("DB_URL").or_else(|| lookup("DATABASE_URL")),
                user: env.get("DB_USER").unwrap_or(db_defaults.user),
                password: env.get("DB_PASSWORD").unwrap_or(db_defaults.password),
                host: env.get("DB_HOST").unwrap_or(db_defaults.host),
                name: env.get("DB_NAME").unwrap_or(db_defaults.name),
                max_connections: env.parse("DB_MAX_CONNECTIONS", db_defaults.max_connections)?,
                disable_tls: env.parse("DB_DISABLE_TLS", db_defaults.disable_tls)?,
            },
            queue: QueueConfig::from_env(&env)?,
            workflow,
            build: build_version(&lookup),
            log_format: log_format(&lookup)?,
            pod: PodInfo::from_lookup(&lookup),
        })
    }
}

impl QueueConfig {
    fn from_env<F>(env: &Prefixed<'_, F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = QueueConfig::default();
        Ok(Self {
            max_messages: env.parse("QUEUE_MAX_MESSAGES", defaults.max_messages)?,
            wait_time: env.duration("QUEUE_WAIT_TIME", defaults.wait_time)?,
            visibility_timeout: env.duration("QUEUE_VISIBILITY_TIMEOUT", defaults.visibility_timeout)?,
            responses_queue: env.get("QUEUE_RESPONSES").unwrap_or(defaults.responses_queue),
        })
    }
}

/// Participant stub configuration.
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Name reported in responses; must match a workflow participant.
    pub service_name: String,
    pub commands_queue: String,
    pub db: DbConfig,
    pub queue: QueueConfig,
    pub shutdown_timeout: Duration,
    pub build: String,
    pub log_format: LogFormat,
}

impl StubConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Prefixed::new(STUB_PREFIX, &lookup);
        let db_defaults = DbConfig::default();

        Ok(Self {
            service_name: env.get("SERVICE_NAME").unwrap_or_else(|| "service1".to_string()),
            commands_queue: env
                .get("QUEUE_COMMANDS")
                .unwrap_or_else(|| "commands1".to_string()),
            db: DbConfig {
                url: env.get("DB_URL").or_else(|| lookup("DATABASE_URL")),
                user: env.get("DB_USER").unwrap_or(db_defaults.user),
                password: env.get("DB_PASSWORD").unwrap_or(db_defaults.password),
                host: env.get("DB_HOST").unwrap_or(db_defaults.host),
                name: env.get("DB_NAME").unwrap_or(db_defaults.name),
                max_connections: env.parse("DB_MAX_CONNECTIONS", db_defaults.max_connections)?,
                disable_tls: env.parse("DB_DISABLE_TLS", db_defaults.disable_tls)?,
            },
            queue: QueueConfig::from_env(&env)?,
            shutdown_timeout: env.duration("SHUTDOWN_TIMEOUT", Duration::from_secs(20))?,
            build: build_version(&lookup),
            log_format: log_format(&lookup)?,
        })
    }
}

/// Key lookup under a fixed prefix (`SAGA_WEB_PORT` for `WEB_PORT`).
struct Prefixed<'a, F> {
    prefix: &'static str,
    lookup: &'a F,
}

impl<'a, F> Prefixed<'a, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(prefix: &'static str, lookup: &'a F) -> Self {
        Self { prefix, lookup }
    }

    fn key(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(&self.key(name)).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key: self.key(name),
                reason: format!("'{raw}': {e}"),
            }),
        }
    }

    fn duration(&self, name: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => {
                let trimmed = raw.trim();
                let seconds = trimmed.strip_suffix('s').unwrap_or(trimmed);
                seconds
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| ConfigError::Invalid {
                        key: self.key(name),
                        reason: format!("'{raw}': {e}"),
                    })
            }
        }
    }
}

fn build_version<F>(lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup("BUILD")
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
}

fn log_format<F>(lookup: &F) -> Result<LogFormat, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup("LOG_FORMAT").as_deref().map(str::trim) {
        None | Some("") | Some("text") => Ok(LogFormat::Text),
        Some("json") => Ok(LogFormat::Json),
        Some(other) => Err(ConfigError::Invalid {
            key: "LOG_FORMAT".to_string(),
            reason: format!("expected 'text' or 'json', got '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.web.addr(), "0.0.0.0:3000");
        assert_eq!(config.web.shutdown_timeout, Duration::from_secs(20));
        assert_eq!(config.queue.max_messages, 10);
        assert_eq!(config.queue.wait_time, Duration::from_secs(20));
        assert_eq!(config.queue.visibility_timeout, Duration::from_secs(30));
        assert_eq!(config.queue.responses_queue, "responses");
        assert_eq!(config.workflow.len(), 3);
        assert_eq!(config.workflow[0].name, "service1");
        assert_eq!(config.workflow[2].queue, "commands3");
        assert_eq!(config.build, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.pod.pod, "");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SAGA_WEB_HOST", "127.0.0.1"),
            ("SAGA_WEB_PORT", "8080"),
            ("SAGA_WEB_SHUTDOWN_TIMEOUT", "5s"),
            ("SAGA_QUEUE_MAX_MESSAGES", "3"),
            ("SAGA_QUEUE_WAIT_TIME", "1"),
            ("SAGA_WORKFLOW", "a=qa,b=qb"),
            ("BUILD", "abc123"),
            ("LOG_FORMAT", "json"),
            ("KUBERNETES_PODNAME", "saga-0"),
            ("HOSTNAME", "box"),
        ]))
        .unwrap();

        assert_eq!(config.web.addr(), "127.0.0.1:8080");
        assert_eq!(config.web.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.queue.pump_config().max_messages, 3);
        assert_eq!(config.queue.pump_config().wait_time, Duration::from_secs(1));
        assert_eq!(config.workflow.len(), 2);
        assert_eq!(config.build, "abc123");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.pod.pod, "saga-0");
        assert_eq!(config.pod.host, "box");
    }

    #[test]
    fn test_invalid_values_are_reported_with_their_key() {
        let err = Config::from_lookup(lookup(&[("SAGA_WEB_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "SAGA_WEB_PORT"));

        let err = Config::from_lookup(lookup(&[("SAGA_QUEUE_WAIT_TIME", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "SAGA_QUEUE_WAIT_TIME"));

        assert!(Config::from_lookup(lookup(&[("SAGA_WORKFLOW", "broken")])).is_err());
        assert!(Config::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn test_database_url_fallback() {
        let config =
            Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://u:p@db:5433/saga")])).unwrap();
        let options = config.db.connect_options().unwrap();
        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_database(), Some("saga"));
    }

    #[test]
    fn test_connect_options_from_parts() {
        let db = DbConfig {
            host: "pg.internal:6543".to_string(),
            name: "sagas".to_string(),
            ..DbConfig::default()
        };
        let options = db.connect_options().unwrap();
        assert_eq!(options.get_host(), "pg.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "postgres");
        assert_eq!(options.get_database(), Some("sagas"));
    }

    #[test]
    fn test_debug_masks_password() {
        let db = DbConfig {
            password: "hunter2".to_string(),
            ..DbConfig::default()
        };
        assert!(!format!("{db:?}").contains("hunter2"));
    }

    #[test]
    fn test_stub_defaults_and_overrides() {
        let stub = StubConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(stub.service_name, "service1");
        assert_eq!(stub.commands_queue, "commands1");
        assert_eq!(stub.queue.responses_queue, "responses");

        let stub = StubConfig::from_lookup(lookup(&[
            ("STUB_SERVICE_NAME", "service2"),
            ("STUB_QUEUE_COMMANDS", "commands2"),
            ("SAGA_SERVICE_NAME", "ignored"),
        ]))
        .unwrap();
        assert_eq!(stub.service_name, "service2");
        assert_eq!(stub.commands_queue, "commands2");
    }
}
