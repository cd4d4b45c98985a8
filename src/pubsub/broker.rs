use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tokio::{sync::Notify, task::JoinHandle};
use topicbus_error::{BrokerError, BrokerResult, ErrorExt};
use tracing::{debug, error, info, trace, warn, Instrument};

use super::{
    BrokerStats, Event, EventQueue, Handler, HandlerRef, Payload, Registrant, RegistrantId,
    Registry, StatsSnapshot, TopicAddr,
};
use crate::config::BrokerConfig;

/// Брокер Pub/Sub событий.
///
/// Дешёвый в клонировании дескриптор (`Arc` внутри). Реестр и очередь лежат
/// под разными блокировками; ни одна из них не удерживается во время вызова
/// обработчика, и обе никогда не берутся одновременно.
///
/// Поддерживает:
/// - подписку `(topic_id, group_id)` с одним слотом на владельца в корзине;
/// - неблокирующую публикацию с копированием нагрузки;
/// - единственного потребителя, который обрабатывает событие целиком (все
///   обработчики) до извлечения следующего.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Mutex<Registry>,
    queue: Mutex<EventQueue>,
    /// Удерживается на время обработки одного события целиком
    consumer: Mutex<()>,
    /// Пробуждение диспетчера из состояния Idle
    wake: Notify,
    shutdown: AtomicBool,
    running: AtomicBool,
    next_registrant: AtomicU64,
    slow_threshold: Option<Duration>,
    stats: BrokerStats,
}

/// Итог обработки одного события.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub topic: TopicAddr,
    /// Сколько обработчиков подошло под адрес
    pub matched: usize,
    /// Сколько из них завершились паникой
    pub panicked: usize,
}

/// Дескриптор запущенной задачи диспетчера.
pub struct DispatcherHandle {
    broker: Broker,
    join: JoinHandle<u64>,
}

////////////////////////////////////////////////////////////////////////////////
// Admission API
////////////////////////////////////////////////////////////////////////////////

impl Broker {
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::new(config.bucket_capacity)),
                queue: Mutex::new(EventQueue::with_capacity(config.initial_queue_capacity)),
                consumer: Mutex::new(()),
                wake: Notify::new(),
                shutdown: AtomicBool::new(false),
                running: AtomicBool::new(false),
                next_registrant: AtomicU64::new(0),
                slow_threshold: config.slow_handler_threshold(),
                stats: BrokerStats::new(),
            }),
        }
    }

    /// Выдаёт нового владельца подписок.
    ///
    /// При `Drop` возвращённого [`Registrant`] все его подписки снимаются.
    pub fn register(&self) -> Registrant {
        let id = self.inner.next_registrant.fetch_add(1, Ordering::Relaxed) + 1;
        Registrant::new(RegistrantId::new(id), self.clone())
    }

    /// Подписывает `registrant` на `topic`.
    ///
    /// # Ошибки
    /// - `DuplicateSubscription`: у владельца уже есть подписка на этот
    ///   `topic_id` (в любой группе);
    /// - `RegistryFull`: корзина `topic_id` заполнена.
    pub fn subscribe(
        &self,
        topic: TopicAddr,
        registrant: RegistrantId,
        handler: HandlerRef,
    ) -> BrokerResult<()> {
        let name = handler.name();
        let result = self
            .inner
            .registry
            .lock()
            .subscribe(topic, registrant, &handler);

        match &result {
            Ok(()) => debug!(
                topic_id = topic.topic_id(),
                group_id = topic.group_id(),
                %registrant,
                handler = name,
                "Subscribed"
            ),
            Err(err @ BrokerError::RegistryFull { .. }) => {
                warn!(%topic, %registrant, error = %err, "Subscription rejected")
            }
            Err(err) => debug!(%topic, %registrant, error = %err, "Subscription rejected"),
        }

        // Отклонённый обработчик освобождается без блокировки реестра: его
        // `Drop` может снять подписки своего `Registrant`.
        drop(handler);
        result
    }

    /// Снимает подписку `registrant` на `(topic_id, group_id)`.
    pub fn unsubscribe(
        &self,
        topic: TopicAddr,
        registrant: RegistrantId,
    ) -> BrokerResult<()> {
        let handler = self
            .inner
            .registry
            .lock()
            .unsubscribe(topic, registrant)?;

        debug!(
            topic_id = topic.topic_id(),
            group_id = topic.group_id(),
            %registrant,
            handler = handler.name(),
            "Unsubscribed"
        );
        drop(handler);
        Ok(())
    }

    /// Снимает все подписки владельца. Безопасна для владельца без подписок.
    pub fn unsubscribe_all(
        &self,
        registrant: RegistrantId,
    ) -> usize {
        let handlers = self.inner.registry.lock().unsubscribe_all(registrant);
        let removed = handlers.len();
        if removed > 0 {
            debug!(%registrant, removed, "Unsubscribed from all topics");
        }
        drop(handlers);
        removed
    }

    /// Публикует копию `payload` по адресу `topic`.
    ///
    /// Никогда не ждёт доставки и не отбрасывает событие: полная очередь
    /// удваивается. Ошибка возможна только при нехватке памяти.
    pub fn publish(
        &self,
        topic: TopicAddr,
        payload: &[u8],
    ) -> BrokerResult<()> {
        let payload = match Payload::copy_from(payload) {
            Ok(p) => p,
            Err(err) => {
                self.record_publish_failure(topic, &err);
                return Err(err);
            }
        };
        self.enqueue(Event::new(topic, payload))
    }

    /// Публикует одно 32-битное слово.
    pub fn publish_word(
        &self,
        topic: TopicAddr,
        word: u32,
    ) -> BrokerResult<()> {
        self.enqueue(Event::new(topic, Payload::from_word(word)))
    }

    fn enqueue(
        &self,
        event: Event,
    ) -> BrokerResult<()> {
        let topic = event.topic;
        let size = event.payload.len();
        let result = self.inner.queue.lock().push(event);

        match result {
            Ok(()) => {
                BrokerStats::incr(&self.inner.stats.published);
                debug!(%topic, size, "Event published");
                self.inner.wake.notify_one();
                Ok(())
            }
            Err(err) => {
                self.record_publish_failure(topic, &err);
                Err(err)
            }
        }
    }

    fn record_publish_failure(
        &self,
        topic: TopicAddr,
        err: &BrokerError,
    ) {
        BrokerStats::incr(&self.inner.stats.publish_failures);
        error!(
            %topic,
            error = %err,
            code = %err.status_code(),
            "Publish failed"
        );
    }

    /// Количество событий, ожидающих обработки.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Снимок счётчиков и состояния очереди.
    pub fn stats(&self) -> StatsSnapshot {
        let active = self.inner.registry.lock().total_active();
        let queue = self.inner.queue.lock();
        self.inner.stats.snapshot(&queue, active)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Диспетчеризация
////////////////////////////////////////////////////////////////////////////////

impl Broker {
    /// Обрабатывает одно событие из головы очереди.
    ///
    /// Возвращает `Ok(None)`, если очередь пуста, и `DispatcherRunning`, если
    /// в этот момент событие обрабатывает другой потребитель (в том числе при
    /// вызове из обработчика).
    pub fn dispatch_next(&self) -> BrokerResult<Option<DispatchReport>> {
        let _consumer = self
            .inner
            .consumer
            .try_lock()
            .ok_or(BrokerError::DispatcherRunning)?;
        Ok(self.dispatch_one())
    }

    /// Обрабатывает события, пока очередь не опустеет.
    pub fn drain(&self) -> BrokerResult<usize> {
        let mut dispatched = 0;
        while self.dispatch_next()?.is_some() {
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Запускает цикл диспетчера отдельной задачей tokio.
    ///
    /// На брокер допускается только один цикл.
    pub fn spawn(&self) -> BrokerResult<DispatcherHandle> {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return Err(BrokerError::DispatcherRunning);
        }
        self.inner.shutdown.store(false, Ordering::Release);

        let broker = self.clone();
        let join = tokio::spawn(broker.run().instrument(tracing::info_span!("dispatcher")));

        Ok(DispatcherHandle {
            broker: self.clone(),
            join,
        })
    }

    /// Цикл Idle/Dispatching.
    ///
    /// После запроса остановки дорабатывает уже поставленные события.
    async fn run(self) -> u64 {
        info!("Broker dispatcher started");
        let mut dispatched = 0u64;

        loop {
            // Событие может обрабатывать `drain` из другого потока: ждать его
            // блокировку на рабочем потоке tokio нельзя.
            let step = self
                .inner
                .consumer
                .try_lock()
                .map(|_consumer| self.dispatch_one());
            let Some(report) = step else {
                tokio::task::yield_now().await;
                continue;
            };

            if report.is_some() {
                dispatched += 1;
                tokio::task::yield_now().await;
                continue;
            }

            if self.inner.shutdown.load(Ordering::Acquire) {
                break;
            }

            // Idle: разрешение Notify сохраняется, поэтому публикация между
            // проверкой очереди и ожиданием не теряется.
            self.inner.wake.notified().await;
        }

        self.inner.running.store(false, Ordering::Release);
        info!(dispatched, "Broker dispatcher stopped");
        dispatched
    }

    /// Один шаг диспетчера. Вызывающий держит блокировку `consumer`.
    fn dispatch_one(&self) -> Option<DispatchReport> {
        let event = self.inner.queue.lock().pop()?;
        let handlers = self.inner.registry.lock().matching(event.topic);

        trace!(
            topic_id = event.topic.topic_id(),
            group_id = event.topic.group_id(),
            matched = handlers.len(),
            "Dispatching event"
        );

        let mut report = DispatchReport {
            topic: event.topic,
            matched: handlers.len(),
            panicked: 0,
        };

        for handler in &handlers {
            if !self.invoke(handler.as_ref(), &event) {
                report.panicked += 1;
            }
        }

        BrokerStats::incr(&self.inner.stats.dispatched);
        BrokerStats::add(&self.inner.stats.deliveries, handlers.len() as u64);

        // Нагрузка освобождается здесь: все обработчики уже вернули управление.
        drop(event);
        Some(report)
    }

    /// Вызывает обработчик; `false`, если он запаниковал.
    fn invoke(
        &self,
        handler: &dyn Handler,
        event: &Event,
    ) -> bool {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.on_event(event.topic, event.payload.as_bytes())
        }));
        let elapsed = started.elapsed();

        if let Some(threshold) = self.inner.slow_threshold {
            if elapsed >= threshold {
                BrokerStats::incr(&self.inner.stats.slow_handlers);
                warn!(
                    handler = handler.name(),
                    topic = %event.topic,
                    elapsed_ms = elapsed.as_millis() as u64,
                    threshold_ms = threshold.as_millis() as u64,
                    "Slow handler stalled dispatch"
                );
            }
        }

        match outcome {
            Ok(()) => true,
            Err(panic) => {
                BrokerStats::incr(&self.inner.stats.handler_panics);
                error!(
                    handler = handler.name(),
                    topic = %event.topic,
                    reason = panic_message(panic.as_ref()),
                    "Handler panicked"
                );
                false
            }
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(&BrokerConfig::default())
    }
}

impl DispatcherHandle {
    /// Просит цикл остановиться и ждёт его завершения.
    ///
    /// Уже поставленные события будут обработаны. Возвращает число событий,
    /// обработанных этим циклом.
    pub async fn shutdown(self) -> u64 {
        self.broker.inner.shutdown.store(true, Ordering::Release);
        self.broker.inner.wake.notify_one();

        match self.join.await {
            Ok(dispatched) => dispatched,
            Err(err) => {
                error!(error = %err, "Dispatcher task failed");
                self.broker.inner.running.store(false, Ordering::Release);
                0
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
