use std::fmt;

use serde::{Deserialize, Serialize};

/// Группа-подстановка: публикация в неё доходит до всех подписчиков темы.
pub const WILDCARD_GROUP: u8 = 0;

/// Количество корзин реестра (по одной на каждый `topic_id`).
pub const MAX_TOPICS: usize = 256;

/// 16-битный адрес события: `(group_id << 8) | topic_id`.
///
/// Младший байт выбирает корзину реестра, старший задаёт фильтр группы внутри неё.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicAddr(u16);

impl TopicAddr {
    pub const fn new(
        topic_id: u8,
        group_id: u8,
    ) -> Self {
        Self(((group_id as u16) << 8) | topic_id as u16)
    }

    /// Адрес, публикация по которому уйдёт всем подписчикам `topic_id`.
    pub const fn wildcard(topic_id: u8) -> Self {
        Self::new(topic_id, WILDCARD_GROUP)
    }

    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn topic_id(self) -> u8 {
        (self.0 & 0x00FF) as u8
    }

    pub const fn group_id(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn is_wildcard(self) -> bool {
        self.group_id() == WILDCARD_GROUP
    }
}

impl From<u16> for TopicAddr {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<TopicAddr> for u16 {
    fn from(addr: TopicAddr) -> Self {
        addr.0
    }
}

impl fmt::Display for TopicAddr {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}
