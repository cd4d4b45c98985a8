use std::sync::Arc;

use super::TopicAddr;

/// Обработчик событий подписки.
///
/// Вызывается синхронно из единственной задачи диспетчера брокера. Пока
/// обработчик не вернул управление, следующее событие не извлекается, поэтому
/// обработчик обязан завершаться быстро и не блокироваться.
///
/// Паника внутри `on_event` перехватывается брокером: она логируется и
/// учитывается в статистике, остальные подписчики получают событие как обычно.
pub trait Handler: Send + Sync + 'static {
    /// Обрабатывает одно событие. `payload` живёт только до возврата.
    fn on_event(
        &self,
        topic: TopicAddr,
        payload: &[u8],
    );

    /// Имя для логов (по умолчанию имя типа).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F> Handler for F
where
    F: Fn(TopicAddr, &[u8]) + Send + Sync + 'static,
{
    fn on_event(
        &self,
        topic: TopicAddr,
        payload: &[u8],
    ) {
        self(topic, payload)
    }
}

/// Разделяемая ссылка на обработчик, хранимая в слоте реестра.
pub type HandlerRef = Arc<dyn Handler>;
