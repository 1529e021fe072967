//! Service configuration loaded from environment variables.

use std::time::Duration;

use processor::{ConfigError, ProcessorConfig};

/// Service configuration.
///
/// Reads from environment variables:
/// - `DATABASE_URL`: Postgres connection string (required)
/// - `REDIS_URL`: Redis connection string (required)
/// - `STREAM_KEY`: stream the work items live on (required)
/// - `CONSUMER_GROUP`: consumer group name (required)
/// - `CONSUMER_NAME`: this instance's consumer name (default: random UUID)
/// - `JOB_RUN_INTERVAL`: tick interval, e.g. `90s`, `1m`, `2h` or bare
///   seconds (required, at least one minute)
/// - `RECLAIM_BATCH_SIZE`, `RECLAIM_MIN_IDLE`, `READ_BATCH_SIZE`,
///   `READ_BLOCK_TIMEOUT`, `CALL_TIMEOUT`, `SHUTDOWN_GRACE`: processor tuning
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `8080`)
///
/// Logging is configured before this is loaded, from `RUST_LOG` and
/// `LOG_FORMAT`.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub processor: ProcessorConfig,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns the raw value of a
    /// variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let database_url = required("DATABASE_URL")?;
        let redis_url = required("REDIS_URL")?;
        let stream = required("STREAM_KEY")?;
        let group = required("CONSUMER_GROUP")?;
        let consumer = var("CONSUMER_NAME").unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let interval = required("JOB_RUN_INTERVAL")?;
        let mut processor = ProcessorConfig::new(stream, group, consumer)
            .with_tick_interval(duration("JOB_RUN_INTERVAL", &interval)?);

        if let Some(raw) = var("RECLAIM_BATCH_SIZE") {
            processor = processor.with_reclaim_batch_size(number("RECLAIM_BATCH_SIZE", &raw)?);
        }
        if let Some(raw) = var("RECLAIM_MIN_IDLE") {
            processor = processor.with_reclaim_min_idle(duration("RECLAIM_MIN_IDLE", &raw)?);
        }
        if let Some(raw) = var("READ_BATCH_SIZE") {
            processor = processor.with_read_batch_size(number("READ_BATCH_SIZE", &raw)?);
        }
        if let Some(raw) = var("READ_BLOCK_TIMEOUT") {
            processor = processor.with_read_block(duration("READ_BLOCK_TIMEOUT", &raw)?);
        }
        if let Some(raw) = var("CALL_TIMEOUT") {
            processor = processor.with_call_timeout(duration("CALL_TIMEOUT", &raw)?);
        }
        if let Some(raw) = var("SHUTDOWN_GRACE") {
            processor = processor.with_shutdown_grace(duration("SHUTDOWN_GRACE", &raw)?);
        }
        processor.validate()?;

        let port: u16 = match var("PORT") {
            Some(raw) => number("PORT", &raw)?,
            None => 8080,
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            database_url,
            redis_url,
            processor,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses a duration such as `500ms`, `90s`, `5m`, `2h`, or a bare number of
/// seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;

    let duration = match unit {
        "" | "s" => Duration::from_secs(value),
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(value.checked_mul(60)?),
        "h" => Duration::from_secs(value.checked_mul(3600)?),
        _ => return None,
    };
    Some(duration)
}

fn duration(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    parse_duration(raw).ok_or_else(|| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason: "expected a duration such as 90s, 5m or 2h".to_string(),
    })
}

fn number<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
