pub mod settings;

pub use settings::{BrokerConfig, Settings, ENV_PREFIX};
