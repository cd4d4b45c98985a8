use std::fmt;

use topicbus_error::{AllocationSite, BrokerError, BrokerResult};

/// Полезная нагрузка события.
///
/// Копируется в момент `publish` и принадлежит только своей записи в очереди.
/// Не реализует `Clone`: обработчики получают `&[u8]` и не могут удержать
/// буфер дольше одного вызова.
pub struct Payload {
    data: Box<[u8]>,
}

impl Payload {
    /// Копирует `src` в собственный буфер.
    ///
    /// Не паникует при нехватке памяти: возвращает
    /// `BrokerError::AllocationFailure`.
    pub fn copy_from(src: &[u8]) -> BrokerResult<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(src.len())
            .map_err(|_| BrokerError::AllocationFailure {
                site: AllocationSite::Payload,
                requested: src.len(),
            })?;
        buf.extend_from_slice(src);

        Ok(Self {
            data: buf.into_boxed_slice(),
        })
    }

    /// Нагрузка из одного 32-битного слова (little-endian).
    pub fn from_word(word: u32) -> Self {
        Self {
            data: Box::new(word.to_le_bytes()),
        }
    }

    /// Читает слово обратно, если длина нагрузки ровно 4 байта.
    pub fn as_word(&self) -> Option<u32> {
        let bytes = <[u8; 4]>::try_from(&self.data[..]).ok()?;
        Some(u32::from_le_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Payload {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Payload")
            .field("len", &self.data.len())
            .finish()
    }
}
