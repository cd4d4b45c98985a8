use std::{fmt, sync::Arc};

use topicbus_error::{BrokerError, BrokerResult};

use super::{HandlerRef, TopicAddr, MAX_TOPICS};

/// Ёмкость корзины по умолчанию.
pub const DEFAULT_BUCKET_CAPACITY: usize = 8;

/// Идентификатор владельца подписки (задачи-подписчика).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrantId(u64);

impl RegistrantId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrantId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Слот подписки. После отписки слот помечается неактивным и переиспользуется.
struct Slot {
    registrant: RegistrantId,
    group_id: u8,
    handler: Option<HandlerRef>,
}

impl Slot {
    fn is_active(&self) -> bool {
        self.handler.is_some()
    }

    fn matches(
        &self,
        group_id: u8,
    ) -> bool {
        self.is_active() && (group_id == super::WILDCARD_GROUP || self.group_id == group_id)
    }
}

/// Корзина одного `topic_id`: не больше `capacity` слотов.
///
/// Хранилище слотов растёт лениво до `capacity` и дальше только
/// переиспользуется.
#[derive(Default)]
struct Bucket {
    slots: Vec<Slot>,
    active: usize,
}

/// Реестр подписчиков: 256 корзин с прямой индексацией по `topic_id`.
///
/// Сам по себе не синхронизирован; брокер хранит его под своей блокировкой.
pub struct Registry {
    buckets: Vec<Bucket>,
    bucket_capacity: usize,
}

impl Registry {
    pub fn new(bucket_capacity: usize) -> Self {
        let mut buckets = Vec::with_capacity(MAX_TOPICS);
        buckets.resize_with(MAX_TOPICS, Bucket::default);

        Self {
            buckets,
            bucket_capacity: bucket_capacity.max(1),
        }
    }

    pub fn bucket_capacity(&self) -> usize {
        self.bucket_capacity
    }

    /// Устанавливает подписку `registrant` на `topic`.
    ///
    /// Реестр клонирует `handler` только при успехе: отклонённый обработчик
    /// остаётся у вызывающего и освобождается уже без блокировки реестра.
    ///
    /// # Ошибки
    /// - `DuplicateSubscription`, если у `registrant` уже есть активный слот в
    ///   этой корзине (независимо от группы);
    /// - `RegistryFull`, если все слоты корзины заняты.
    pub fn subscribe(
        &mut self,
        topic: TopicAddr,
        registrant: RegistrantId,
        handler: &HandlerRef,
    ) -> BrokerResult<()> {
        let capacity = self.bucket_capacity;
        let topic_id = topic.topic_id();
        let bucket = &mut self.buckets[topic_id as usize];

        if bucket
            .slots
            .iter()
            .any(|s| s.is_active() && s.registrant == registrant)
        {
            return Err(BrokerError::DuplicateSubscription {
                topic_id,
                registrant: registrant.get(),
            });
        }

        let slot = Slot {
            registrant,
            group_id: topic.group_id(),
            handler: Some(Arc::clone(handler)),
        };

        if let Some(free) = bucket.slots.iter_mut().find(|s| !s.is_active()) {
            *free = slot;
        } else if bucket.slots.len() < capacity {
            bucket.slots.push(slot);
        } else {
            return Err(BrokerError::RegistryFull { topic_id, capacity });
        }

        bucket.active += 1;
        Ok(())
    }

    /// Снимает первый активный слот `(registrant, group_id)` в корзине.
    ///
    /// Возвращает снятый обработчик: его `Drop` может снова обратиться к
    /// брокеру, поэтому освобождать его нужно после снятия блокировки.
    pub fn unsubscribe(
        &mut self,
        topic: TopicAddr,
        registrant: RegistrantId,
    ) -> BrokerResult<HandlerRef> {
        let bucket = &mut self.buckets[topic.topic_id() as usize];

        let slot = bucket
            .slots
            .iter_mut()
            .find(|s| s.is_active() && s.registrant == registrant && s.group_id == topic.group_id())
            .ok_or(BrokerError::NotSubscribed {
                topic_id: topic.topic_id(),
                group_id: topic.group_id(),
                registrant: registrant.get(),
            })?;

        let handler = slot.handler.take();
        if handler.is_some() {
            bucket.active -= 1;
        }
        handler.ok_or(BrokerError::NotSubscribed {
            topic_id: topic.topic_id(),
            group_id: topic.group_id(),
            registrant: registrant.get(),
        })
    }

    /// Снимает все активные слоты `registrant` во всех корзинах.
    ///
    /// Идемпотентна; возвращает снятые обработчики.
    pub fn unsubscribe_all(
        &mut self,
        registrant: RegistrantId,
    ) -> Vec<HandlerRef> {
        let mut removed = Vec::new();
        for bucket in &mut self.buckets {
            for slot in &mut bucket.slots {
                if slot.registrant != registrant {
                    continue;
                }
                if let Some(handler) = slot.handler.take() {
                    bucket.active -= 1;
                    removed.push(handler);
                }
            }
        }
        removed
    }

    /// Снимок обработчиков, подходящих под адрес, в порядке слотов.
    ///
    /// Группа 0 в адресе выбирает все активные слоты корзины; иначе только
    /// слоты с той же группой.
    pub fn matching(
        &self,
        topic: TopicAddr,
    ) -> Vec<HandlerRef> {
        self.buckets[topic.topic_id() as usize]
            .slots
            .iter()
            .filter(|s| s.matches(topic.group_id()))
            .filter_map(|s| s.handler.as_ref().map(Arc::clone))
            .collect()
    }

    /// Активные подписки в корзине `topic_id`.
    pub fn active_count(
        &self,
        topic_id: u8,
    ) -> usize {
        self.buckets[topic_id as usize].active
    }

    /// Активные подписки во всём реестре.
    pub fn total_active(&self) -> usize {
        self.buckets.iter().map(|b| b.active).sum()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_CAPACITY)
    }
}
