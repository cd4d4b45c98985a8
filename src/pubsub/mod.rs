//! Подсистема Publish–Subscribe (pub/sub).
//!
//! Внутрипроцессный брокер событий с адресацией `(topic_id, group_id)`:
//!
//! - `topic`: 16-битный адрес события и группа-подстановка.
//! - `payload`: собственная копия байтов события.
//! - `queue`: растущая кольцевая очередь ожидающих событий.
//! - `registry`: 256 корзин подписок с ограниченной ёмкостью.
//! - `handler`: трейт обработчика событий.
//! - `broker`: приём подписок и публикаций, цикл диспетчера.
//! - `registrant`: владелец подписок с автоматической отпиской.
//! - `stats`: счётчики и снимки состояния.

pub mod broker;
pub mod handler;
pub mod payload;
pub mod queue;
pub mod registrant;
pub mod registry;
pub mod stats;
pub mod topic;

pub use broker::{Broker, DispatchReport, DispatcherHandle};
pub use handler::{Handler, HandlerRef};
pub use payload::Payload;
pub use queue::{Event, EventQueue, DEFAULT_QUEUE_CAPACITY};
pub use registrant::Registrant;
pub use registry::{RegistrantId, Registry, DEFAULT_BUCKET_CAPACITY};
pub use stats::{BrokerStats, StatsSnapshot};
pub use topic::{TopicAddr, MAX_TOPICS, WILDCARD_GROUP};
