use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

use crate::consumer::DEFAULT_BATCH_SIZE;
use crate::error::ConfigError;
use crate::rotation::RotationInterval;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-level configuration, read with `Config::init_from_env()`.
#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "REPORTER_MODE", default = "batch")]
    pub mode: ConsumerMode,

    #[envconfig(from = "REPORTER_SERVER_URL")]
    pub server_url: Option<NonEmptyString>,

    #[envconfig(from = "REPORTER_APP_ID")]
    pub app_id: Option<NonEmptyString>,

    #[envconfig(from = "REPORTER_BATCH_SIZE", default = "20")]
    pub batch_size: usize,

    #[envconfig(from = "REPORTER_COMPRESS", default = "true")]
    pub compress: bool,

    #[envconfig(from = "REPORTER_FLUSH_INTERVAL", default = "3000")]
    pub flush_interval: EnvMsDuration,

    #[envconfig(from = "REPORTER_REQUEST_TIMEOUT", default = "30000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(from = "REPORTER_DRY_RUN", default = "false")]
    pub dry_run: bool,

    #[envconfig(from = "REPORTER_DEVICE_ID")]
    pub device_id: Option<NonEmptyString>,

    #[envconfig(from = "REPORTER_LOG_DIRECTORY")]
    pub log_directory: Option<NonEmptyString>,

    #[envconfig(from = "REPORTER_FILE_PREFIX")]
    pub file_prefix: Option<NonEmptyString>,

    #[envconfig(from = "REPORTER_ROTATE_HOURLY", default = "false")]
    pub rotate_hourly: bool,
}

impl Config {
    pub fn server_url(&self) -> Result<&str, ConfigError> {
        required(&self.server_url, "server_url")
    }

    pub fn app_id(&self) -> Result<&str, ConfigError> {
        required(&self.app_id, "app_id")
    }

    pub fn log_directory(&self) -> Result<&str, ConfigError> {
        required(&self.log_directory, "log_directory")
    }

    pub fn debug_config(&self) -> DebugConfig {
        DebugConfig {
            dry_run: self.dry_run,
            device_id: self.device_id.as_ref().map(|id| id.as_str().to_owned()),
            request_timeout: self.request_timeout.0,
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch_size,
            compress: self.compress,
            request_timeout: self.request_timeout.0,
        }
    }

    pub fn async_batch_config(&self) -> AsyncBatchConfig {
        AsyncBatchConfig {
            batch_size: self.batch_size,
            compress: self.compress,
            interval: self.flush_interval.0,
            request_timeout: self.request_timeout.0,
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            file_prefix: self.file_prefix.as_ref().map(|p| p.as_str().to_owned()),
            rotate_hourly: self.rotate_hourly,
        }
    }
}

fn required<'a>(
    value: &'a Option<NonEmptyString>,
    name: &'static str,
) -> Result<&'a str, ConfigError> {
    value
        .as_ref()
        .map(NonEmptyString::as_str)
        .ok_or(ConfigError::MissingField(name))
}

/// Which consumer a [`Config`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerMode {
    Debug,
    Batch,
    AsyncBatch,
    Logging,
}

impl FromStr for ConsumerMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "debug" => Ok(ConsumerMode::Debug),
            "batch" => Ok(ConsumerMode::Batch),
            "async_batch" => Ok(ConsumerMode::AsyncBatch),
            "logging" => Ok(ConsumerMode::Logging),
            _ => Err(ConfigError::InvalidMode(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DebugConfig {
    /// Ask the receiver to validate without storing.
    pub dry_run: bool,
    pub device_id: Option<String>,
    pub request_timeout: Duration,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            device_id: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub compress: bool,
    pub request_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            compress: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AsyncBatchConfig {
    pub batch_size: usize,
    pub compress: bool,
    /// Period of the background flush.
    pub interval: Duration,
    pub request_timeout: Duration,
}

impl Default for AsyncBatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            compress: true,
            interval: DEFAULT_FLUSH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub file_prefix: Option<String>,
    pub rotate_hourly: bool,
}

impl LoggingConfig {
    pub fn rotation(&self) -> RotationInterval {
        if self.rotate_hourly {
            RotationInterval::Hourly
        } else {
            RotationInterval::Daily
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_the_batch_mode() {
        let config = Config::init_from_hashmap(&env(&[])).unwrap();

        assert_eq!(config.mode, ConsumerMode::Batch);
        assert_eq!(config.batch_size, 20);
        assert!(config.compress);
        assert_eq!(config.flush_interval.0, Duration::from_millis(3000));
        assert!(matches!(
            config.server_url(),
            Err(ConfigError::MissingField("server_url"))
        ));
    }

    #[test]
    fn typed_configs_follow_the_environment() {
        let config = Config::init_from_hashmap(&env(&[
            ("REPORTER_MODE", "async_batch"),
            ("REPORTER_SERVER_URL", "https://receiver.example.com"),
            ("REPORTER_APP_ID", "app"),
            ("REPORTER_BATCH_SIZE", "5"),
            ("REPORTER_COMPRESS", "false"),
            ("REPORTER_FLUSH_INTERVAL", "250"),
            ("REPORTER_ROTATE_HOURLY", "true"),
            ("REPORTER_FILE_PREFIX", "events"),
        ]))
        .unwrap();

        assert_eq!(config.mode, ConsumerMode::AsyncBatch);
        assert_eq!(config.app_id().unwrap(), "app");

        let async_batch = config.async_batch_config();
        assert_eq!(async_batch.batch_size, 5);
        assert!(!async_batch.compress);
        assert_eq!(async_batch.interval, Duration::from_millis(250));

        let logging = config.logging_config();
        assert_eq!(logging.file_prefix.as_deref(), Some("events"));
        assert_eq!(logging.rotation(), RotationInterval::Hourly);
    }

    #[test]
    fn unknown_modes_are_rejected() {
        assert!(matches!(
            "kafka".parse::<ConsumerMode>(),
            Err(ConfigError::InvalidMode(_))
        ));
        assert_eq!(" Debug ".parse::<ConsumerMode>().unwrap(), ConsumerMode::Debug);
    }
}
