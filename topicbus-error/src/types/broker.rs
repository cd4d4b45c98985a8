use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Что именно не удалось разместить в памяти.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationSite {
    /// Копия полезной нагрузки события.
    Payload,
    /// Новое хранилище очереди при удвоении ёмкости.
    QueueGrowth,
}

/// Ошибки API брокера.
///
/// Первые три варианта ожидаемы и восстановимы: вызывающая сторона сама
/// решает, повторить, залогировать или проигнорировать. `AllocationFailure`
/// фатальна только для одного вызова `publish`; сам брокер продолжает работу.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("registrant {registrant} is already subscribed to topic {topic_id}")]
    DuplicateSubscription { topic_id: u8, registrant: u64 },

    #[error("topic {topic_id} already holds {capacity} subscriptions")]
    RegistryFull { topic_id: u8, capacity: usize },

    #[error("registrant {registrant} has no subscription on topic {topic_id} group {group_id}")]
    NotSubscribed {
        topic_id: u8,
        group_id: u8,
        registrant: u64,
    },

    #[error("failed to allocate {requested} bytes for {site:?}")]
    AllocationFailure {
        site: AllocationSite,
        requested: usize,
    },

    #[error("dispatcher is already running for this broker")]
    DispatcherRunning,
}

impl BrokerError {
    /// `false` только для ошибок выделения памяти.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::AllocationFailure { .. })
    }
}

impl ErrorExt for BrokerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::DuplicateSubscription { .. } => StatusCode::AlreadyExists,
            Self::RegistryFull { .. } => StatusCode::SubscriberLimitExceeded,
            Self::NotSubscribed { .. } => StatusCode::NotFound,
            Self::AllocationFailure { .. } => StatusCode::AllocationFailed,
            Self::DispatcherRunning => StatusCode::DispatcherRunning,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::DuplicateSubscription { topic_id, .. } => {
                format!("Already subscribed to topic {topic_id}")
            }
            Self::RegistryFull { topic_id, .. } => {
                format!("Too many subscribers on topic {topic_id}")
            }
            Self::NotSubscribed { topic_id, .. } => {
                format!("Not subscribed to topic {topic_id}")
            }
            Self::AllocationFailure { .. } => "Out of memory".to_string(),
            Self::DispatcherRunning => "Dispatcher already running".to_string(),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "broker".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::DuplicateSubscription { topic_id, .. }
            | Self::RegistryFull { topic_id, .. }
            | Self::NotSubscribed { topic_id, .. } => {
                tags.push(("topic_id", topic_id.to_string()));
            }
            Self::AllocationFailure { site, requested } => {
                tags.push(("site", format!("{site:?}")));
                tags.push(("requested", requested.to_string()));
            }
            Self::DispatcherRunning => {}
        }

        tags
    }
}
