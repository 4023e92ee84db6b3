use std::{
    error::Error as StdError,
    fmt,
    sync::Arc,
};
use thiserror::Error;


/// Ошибка, доставляемая через [`JoinHandle`](crate::handle::JoinHandle)
#[derive(Debug, Clone, Error)]
pub enum SpawnError {
    /// Пул уже остановлен (joined) на момент вызова
    #[error("not running: {0}")]
    NotRunning(String),
    /// Обёрнутый вызов вернул ошибку, исходная ошибка сохраняется как есть
    #[error(transparent)]
    Call(#[from] CallError),
    #[error("panic in pooled call: {0}")]
    Panic(String),
    #[error("result channel closed")]
    ChannelClosed,
    #[error("timed out waiting for result")]
    Timeout,
}

impl SpawnError {
    #[inline]
    pub fn is_not_running(&self) -> bool {
        matches!(self, SpawnError::NotRunning(_))
    }

    /// Исходная ошибка обёрнутого вызова, если это она
    pub fn as_call(&self) -> Option<&CallError> {
        match self {
            SpawnError::Call(e) => Some(e),
            _ => None,
        }
    }
}


/// Синхронная ошибка разрешения члена на [`Thimble`](crate::proxy::Thimble)
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("no such member: `{0}`")]
    NoSuchMember(String),
    #[error("hook for `{name}` failed")]
    Hook {
        name: String,
        #[source]
        source: CallError,
    },
    #[error("member `{0}` is not blocking")]
    NotBlocking(String),
}


/// Ошибка связывания аргументов внутри [`Method`](crate::value::Method)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgError {
    #[error("missing argument #{index} (`{name}`)")]
    Missing { index: usize, name: String },
    #[error("argument #{index} (`{name}`) is not a {expected}")]
    WrongType {
        index: usize,
        name: String,
        expected: &'static str,
    },
}


/// Ошибка обёрнутого вызова или хука.
///
/// Клон разделяет исходную ошибку: вызывающий может сделать downcast
/// к конкретному типу и сравнить идентичность через [`CallError::ptr_eq`].
#[derive(Clone, Error)]
#[error(transparent)]
pub struct CallError {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

impl CallError {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self { inner: Arc::new(error) }
    }

    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(Message(message.to_string()))
    }

    pub fn not_callable(name: &str) -> Self {
        Self::msg(format!("member `{name}` is not callable"))
    }

    #[inline]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    #[inline]
    pub fn is<E>(&self) -> bool
    where
        E: StdError + 'static,
    {
        self.inner.is::<E>()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &CallError) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl From<ArgError> for CallError {
    fn from(e: ArgError) -> Self {
        CallError::new(e)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);
