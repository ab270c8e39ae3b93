//! Service configuration loaded from environment variables.
//!
//! Every required value is checked before any connection is attempted.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use messaging::AmqpConfig;
use thiserror::Error;

/// Configuration errors. All are fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Which service this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Flight,
    Hotel,
    Payment,
    Coordinator,
}

impl Role {
    /// Setting naming the queue this role consumes.
    fn inbound_queue_key(&self) -> &'static str {
        match self {
            Role::Flight => "RABBIT_FLIGHT",
            Role::Hotel => "RABBIT_HOTEL",
            Role::Payment => "RABBIT_PAYMENT",
            Role::Coordinator => "RABBIT_ORDER",
        }
    }

    /// Setting naming this role's database, if it has one.
    fn database_key(&self) -> Option<&'static str> {
        match self {
            Role::Flight => Some("DB_NAME_FLIGHT"),
            Role::Hotel => Some("DB_NAME_HOTEL"),
            Role::Payment => None,
            Role::Coordinator => Some("DB_NAME_ORCHESTRATOR"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Flight => "flight",
            Role::Hotel => "hotel",
            Role::Payment => "payment",
            Role::Coordinator => "coordinator",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flight" => Ok(Role::Flight),
            "hotel" => Ok(Role::Hotel),
            "payment" => Ok(Role::Payment),
            "coordinator" | "orchestrator" => Ok(Role::Coordinator),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Database connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: Option<u16>,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Everything a saga service needs to start.
///
/// Reads from environment variables:
/// - `SERVICE_ROLE`: `flight`, `hotel`, `payment` or `coordinator`
/// - `RABBIT_HOST`, `RABBIT_PORT`, `RABBIT_VIRT_HOST`, `RABBIT_USR`, `RABBIT_PASSWORD`
/// - `RABBIT_REPLIES` and the role's inbound queue
/// - `DB_SERVER` (`host` or `host:port`), `DB_USER`, `DB_PASSWORD` and the
///   role's database name, except for `payment`
/// - `SAGA_CONCURRENCY` (default: `6`)
/// - `HOLD_TTL_SECS` (default: `900`)
/// - `SWEEP_INTERVAL_SECS` (default: `60`)
/// - `METRICS_ADDR` (default: `"0.0.0.0:9000"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub broker: AmqpConfig,
    pub inbound_queue: String,
    pub reply_queue: String,
    pub database: Option<DatabaseConfig>,
    pub concurrency: usize,
    pub hold_ttl: Duration,
    pub sweep_interval: Duration,
    pub metrics_addr: SocketAddr,
}

pub const DEFAULT_CONCURRENCY: usize = 6;
pub const DEFAULT_HOLD_TTL_SECS: u64 = 900;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9000";

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let role: Role = env.parse("SERVICE_ROLE")?;

        let broker = AmqpConfig {
            host: env.required("RABBIT_HOST")?,
            port: env.parse("RABBIT_PORT")?,
            vhost: env.required("RABBIT_VIRT_HOST")?,
            user: env.required("RABBIT_USR")?,
            password: env.required("RABBIT_PASSWORD")?,
        };

        let reply_queue = env.required("RABBIT_REPLIES")?;
        let inbound_queue = env.required(role.inbound_queue_key())?;

        let database = match role.database_key() {
            Some(name_key) => {
                let server = env.required("DB_SERVER")?;
                let (host, port) = split_server(&server)?;
                Some(DatabaseConfig {
                    host,
                    port,
                    name: env.required(name_key)?,
                    user: env.required("DB_USER")?,
                    password: env.required("DB_PASSWORD")?,
                })
            }
            None => None,
        };

        let concurrency: usize = env.parse_or("SAGA_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "SAGA_CONCURRENCY",
                reason: "must be at least 1".to_string(),
            });
        }

        let hold_ttl = env.parse_or("HOLD_TTL_SECS", DEFAULT_HOLD_TTL_SECS)?;
        let sweep_interval = env.parse_or("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?;
        if sweep_interval == 0 {
            return Err(ConfigError::Invalid {
                name: "SWEEP_INTERVAL_SECS",
                reason: "must be at least 1".to_string(),
            });
        }

        let metrics_addr = match env.optional("METRICS_ADDR") {
            Some(value) => parse_value("METRICS_ADDR", &value)?,
            None => parse_value("METRICS_ADDR", DEFAULT_METRICS_ADDR)?,
        };

        Ok(Self {
            role,
            broker,
            inbound_queue,
            reply_queue,
            database,
            concurrency,
            hold_ttl: Duration::from_secs(hold_ttl),
            sweep_interval: Duration::from_secs(sweep_interval),
            metrics_addr,
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Present and non-blank.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn parse<T>(&self, key: &'static str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        parse_value(key, &self.required(key)?)
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(value) => parse_value(key, &value),
            None => Ok(default),
        }
    }
}

fn parse_value<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn split_server(server: &str) -> Result<(String, Option<u16>), ConfigError> {
    match server.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), Some(parse_value("DB_SERVER", port)?))),
        None => Ok((server.to_string(), None)),
    }
}
