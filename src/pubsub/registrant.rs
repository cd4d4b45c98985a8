use std::fmt;

use topicbus_error::BrokerResult;
use tracing::debug;

use super::{Broker, HandlerRef, RegistrantId, TopicAddr};

/// Владелец подписок, выданный [`Broker::register`].
///
/// При уничтожении снимает все свои подписки, поэтому завершившийся
/// подписчик не оставляет обработчиков в реестре.
pub struct Registrant {
    id: RegistrantId,
    broker: Broker,
}

impl Registrant {
    pub(crate) fn new(
        id: RegistrantId,
        broker: Broker,
    ) -> Self {
        Self { id, broker }
    }

    pub fn id(&self) -> RegistrantId {
        self.id
    }

    pub fn subscribe(
        &self,
        topic: TopicAddr,
        handler: HandlerRef,
    ) -> BrokerResult<()> {
        self.broker.subscribe(topic, self.id, handler)
    }

    pub fn unsubscribe(
        &self,
        topic: TopicAddr,
    ) -> BrokerResult<()> {
        self.broker.unsubscribe(topic, self.id)
    }

    pub fn unsubscribe_all(&self) -> usize {
        self.broker.unsubscribe_all(self.id)
    }

    pub fn publish(
        &self,
        topic: TopicAddr,
        payload: &[u8],
    ) -> BrokerResult<()> {
        self.broker.publish(topic, payload)
    }
}

impl fmt::Debug for Registrant {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Registrant").field("id", &self.id).finish()
    }
}

impl Drop for Registrant {
    fn drop(&mut self) {
        let removed = self.broker.unsubscribe_all(self.id);
        debug!(registrant = %self.id, removed, "Registrant dropped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn noop() -> HandlerRef {
        Arc::new(|_: TopicAddr, _: &[u8]| {})
    }

    /// Тест проверяет, что идентификаторы уникальны.
    #[test]
    fn test_ids_are_unique() {
        let broker = Broker::default();
        let a = broker.register();
        let b = broker.register();
        assert_ne!(a.id(), b.id());
    }

    /// Тест проверяет снятие подписок при уничтожении владельца.
    #[test]
    fn test_drop_unsubscribes_all() {
        let broker = Broker::default();
        let keep = broker.register();
        keep.subscribe(TopicAddr::new(1, 1), noop()).unwrap();

        {
            let gone = broker.register();
            gone.subscribe(TopicAddr::new(1, 2), noop()).unwrap();
            gone.subscribe(TopicAddr::new(8, 0), noop()).unwrap();
            assert_eq!(broker.stats().active_subscriptions, 3);
        }

        assert_eq!(broker.stats().active_subscriptions, 1);
    }

    /// Тест проверяет явную отписку через владельца.
    #[test]
    fn test_explicit_unsubscribe() {
        let broker = Broker::default();
        let r = broker.register();
        r.subscribe(TopicAddr::new(3, 4), noop()).unwrap();
        r.unsubscribe(TopicAddr::new(3, 4)).unwrap();
        assert!(r.unsubscribe(TopicAddr::new(3, 4)).is_err());
        assert_eq!(r.unsubscribe_all(), 0);
    }
}
