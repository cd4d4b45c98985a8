use std::mem;

use topicbus_error::{AllocationSite, BrokerError, BrokerResult};

use super::{Payload, TopicAddr};

/// Начальная ёмкость очереди по умолчанию.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Запись очереди: адрес и собственная копия нагрузки.
#[derive(Debug)]
pub struct Event {
    pub topic: TopicAddr,
    pub payload: Payload,
}

impl Event {
    pub fn new(
        topic: TopicAddr,
        payload: Payload,
    ) -> Self {
        Self { topic, payload }
    }
}

/// Кольцевая очередь ожидающих событий с удвоением ёмкости.
///
/// Инварианты:
/// - `count == 0` ⇔ очередь пуста, `count == capacity` ⇔ очередь полна;
/// - заполнены ровно слоты `head, head+1, .., head+count-1` (по модулю
///   ёмкости), остальные равны `None`;
/// - переполнение никогда не отбрасывает событие: `push` в полную очередь
///   сначала удваивает хранилище.
#[derive(Debug)]
pub struct EventQueue {
    slots: Vec<Option<Event>>,
    head: usize,
    tail: usize,
    count: usize,
    growths: u64,
}

impl EventQueue {
    /// Создаёт очередь ёмкостью `capacity` (минимум 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Self {
            slots,
            head: 0,
            tail: 0,
            count: 0,
            growths: 0,
        }
    }

    /// Добавляет событие в хвост.
    ///
    /// Если очередь полна, синхронно удваивает ёмкость. Ошибка возможна только
    /// при нехватке памяти; в этом случае очередь не меняется.
    pub fn push(
        &mut self,
        event: Event,
    ) -> BrokerResult<()> {
        if self.is_full() {
            self.grow()?;
        }

        debug_assert!(self.slots[self.tail].is_none());
        self.slots[self.tail] = Some(event);
        self.tail = (self.tail + 1) % self.capacity();
        self.count += 1;
        Ok(())
    }

    /// Забирает самое старое событие из головы.
    ///
    /// Слот освобождается сразу: нагрузка переходит к вызывающему.
    pub fn pop(&mut self) -> Option<Event> {
        if self.count == 0 {
            return None;
        }

        let event = self.slots[self.head].take();
        debug_assert!(event.is_some());
        self.head = (self.head + 1) % self.capacity();
        self.count -= 1;
        event
    }

    /// События в порядке FIFO, без извлечения.
    pub fn iter(&self) -> impl Iterator<Item = &Event> + '_ {
        let cap = self.capacity();
        (0..self.count).filter_map(move |i| self.slots[(self.head + i) % cap].as_ref())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Сколько раз очередь удваивалась.
    pub fn growths(&self) -> u64 {
        self.growths
    }

    /// Удваивает ёмкость.
    ///
    /// `count` записей копируются начиная с `head` (с переходом через конец
    /// буфера) в слоты `0..count` нового хранилища; после этого `head = 0`,
    /// `tail = count`. Старое хранилище освобождается после копирования.
    fn grow(&mut self) -> BrokerResult<()> {
        let old_cap = self.capacity();
        let new_cap = old_cap
            .checked_mul(2)
            .ok_or_else(|| Self::growth_failure(usize::MAX))?;

        let mut fresh: Vec<Option<Event>> = Vec::new();
        fresh
            .try_reserve_exact(new_cap)
            .map_err(|_| Self::growth_failure(new_cap))?;

        for i in 0..self.count {
            let idx = (self.head + i) % old_cap;
            fresh.push(self.slots[idx].take());
        }
        fresh.resize_with(new_cap, || None);

        let old = mem::replace(&mut self.slots, fresh);
        drop(old);

        self.head = 0;
        self.tail = self.count;
        self.growths += 1;

        tracing::info!(
            old_capacity = old_cap,
            new_capacity = new_cap,
            pending = self.count,
            "Event queue grown"
        );
        Ok(())
    }

    fn growth_failure(slots: usize) -> BrokerError {
        BrokerError::AllocationFailure {
            site: AllocationSite::QueueGrowth,
            requested: slots.saturating_mul(mem::size_of::<Option<Event>>()),
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}
