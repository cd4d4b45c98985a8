/// Broker settings loading (file, environment, defaults).
pub mod config;
/// Structured logging setup (filters, formatters).
pub mod logging;
/// Pub/Sub: Broker, Registry, EventQueue, Handler.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// config
pub use config::{BrokerConfig, Settings};
/// Logging initialization.
pub use logging::{init_logging, LogFormat, LoggingConfig};
/// Pub/Sub API.
pub use pubsub::{
    Broker, DispatchReport, DispatcherHandle, Handler, HandlerRef, Payload, Registrant,
    RegistrantId, StatsSnapshot, TopicAddr, WILDCARD_GROUP,
};
/// Operation errors and result types.
pub use topicbus_error::{AllocationSite, BrokerError, BrokerResult, ErrorExt, StatusCode};
