use std::{path::Path, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    logging::LoggingConfig,
    pubsub::{DEFAULT_BUCKET_CAPACITY, DEFAULT_QUEUE_CAPACITY},
};

/// Префикс переменных окружения: `TOPICBUS_BROKER__BUCKET_CAPACITY=16`.
pub const ENV_PREFIX: &str = "TOPICBUS";

/// Параметры брокера.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Начальная ёмкость очереди событий (дальше удваивается)
    pub initial_queue_capacity: usize,
    /// Максимум подписок в одной корзине `topic_id`
    pub bucket_capacity: usize,
    /// Порог медленного обработчика в мс; 0 отключает предупреждения
    pub slow_handler_threshold_ms: u64,
}

/// Полная конфигурация процесса.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerConfig,
    pub logging: LoggingConfig,
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "broker.initial_queue_capacity must be at least 1".into(),
            ));
        }
        if self.bucket_capacity == 0 {
            return Err(ConfigError::Message(
                "broker.bucket_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn slow_handler_threshold(&self) -> Option<Duration> {
        (self.slow_handler_threshold_ms > 0)
            .then(|| Duration::from_millis(self.slow_handler_threshold_ms))
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            initial_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
            slow_handler_threshold_ms: 100,
        }
    }
}

impl Settings {
    /// Загружает конфигурацию: значения по умолчанию, затем файл (если
    /// указан), затем переменные окружения с префиксом `TOPICBUS_`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Settings::default();

        let mut builder = Config::builder()
            // Значения по умолчанию
            .set_default(
                "broker.initial_queue_capacity",
                defaults.broker.initial_queue_capacity as u64,
            )?
            .set_default(
                "broker.bucket_capacity",
                defaults.broker.bucket_capacity as u64,
            )?
            .set_default(
                "broker.slow_handler_threshold_ms",
                defaults.broker.slow_handler_threshold_ms,
            )?
            .set_default("logging.level", defaults.logging.level.clone())?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let cfg = builder
            // TOPICBUS_BROKER__BUCKET_CAPACITY -> broker.bucket_capacity
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.validate()?;
        self.logging
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::{env, io::Write};

    use serial_test::serial;

    use super::*;
    use crate::logging::LogFormat;

    fn clear_env() {
        for key in [
            "TOPICBUS_BROKER__BUCKET_CAPACITY",
            "TOPICBUS_BROKER__INITIAL_QUEUE_CAPACITY",
            "TOPICBUS_LOGGING__LEVEL",
        ] {
            env::remove_var(key);
        }
    }

    /// Тест проверяет значения по умолчанию без файла и переменных.
    #[test]
    #[serial]
    fn test_load_defaults() {
        clear_env();
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.broker.initial_queue_capacity, 10);
        assert_eq!(settings.broker.bucket_capacity, 8);
        assert_eq!(
            settings.broker.slow_handler_threshold(),
            Some(Duration::from_millis(100))
        );
        assert_eq!(settings.logging.level, "info");
    }

    /// Тест проверяет, что переменные окружения перекрывают значения по
    /// умолчанию.
    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("TOPICBUS_BROKER__BUCKET_CAPACITY", "16");
        env::set_var("TOPICBUS_LOGGING__LEVEL", "debug");

        let settings = Settings::load(None).unwrap();
        clear_env();

        assert_eq!(settings.broker.bucket_capacity, 16);
        assert_eq!(settings.logging.level, "debug");
    }

    /// Тест проверяет загрузку из TOML-файла.
    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[broker]\ninitial_queue_capacity = 2\nslow_handler_threshold_ms = 0\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.broker.initial_queue_capacity, 2);
        assert_eq!(settings.broker.bucket_capacity, 8);
        assert_eq!(settings.broker.slow_handler_threshold(), None);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    /// Тест проверяет отказ на нулевой ёмкости.
    #[test]
    #[serial]
    fn test_zero_capacity_rejected() {
        clear_env();
        env::set_var("TOPICBUS_BROKER__INITIAL_QUEUE_CAPACITY", "0");
        let res = Settings::load(None);
        clear_env();
        assert!(res.is_err());
    }
}
