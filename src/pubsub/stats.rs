use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::EventQueue;

/// Счётчики брокера.
#[derive(Debug, Default)]
pub struct BrokerStats {
    /// Успешные вызовы `publish`
    pub published: AtomicU64,
    /// Вызовы `publish`, завершившиеся ошибкой памяти
    pub publish_failures: AtomicU64,
    /// Извлечённые и обработанные события
    pub dispatched: AtomicU64,
    /// Вызовы обработчиков
    pub deliveries: AtomicU64,
    /// Обработчики, завершившиеся паникой
    pub handler_panics: AtomicU64,
    /// Обработчики дольше порога
    pub slow_handlers: AtomicU64,
}

/// Снимок состояния брокера для логов и отчётов.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub timestamp: i64,
    pub published: u64,
    pub publish_failures: u64,
    pub dispatched: u64,
    pub deliveries: u64,
    pub handler_panics: u64,
    pub slow_handlers: u64,
    pub queue_growths: u64,
    pub queue_len: usize,
    pub queue_capacity: usize,
    pub active_subscriptions: usize,
}

impl BrokerStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add(
        counter: &AtomicU64,
        n: u64,
    ) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Состояние очереди и реестра передаёт брокер: счётчики не держат
    /// блокировок.
    pub fn snapshot(
        &self,
        queue: &EventQueue,
        active_subscriptions: usize,
    ) -> StatsSnapshot {
        StatsSnapshot {
            timestamp: chrono::Utc::now().timestamp_millis(),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            slow_handlers: self.slow_handlers.load(Ordering::Relaxed),
            queue_growths: queue.growths(),
            queue_len: queue.len(),
            queue_capacity: queue.capacity(),
            active_subscriptions,
        }
    }
}
