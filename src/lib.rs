//! Прокси для синхронных API: блокирующие методы выполняются в пуле потоков
//! и возвращают future вместо блокировки вызывающего.
//!
//! # Features
//! - Ленивый запуск пула при первом блокирующем вызове
//! - Регистрация остановки пула в shutdown-последовательности планировщика
//! - Детерминированный отказ после остановки пула
//! - Хуки на доступ к любому члену обёрнутого объекта
//! - Готовые `Reactor` и `ThreadPool`, а также синхронные двойники для тестов

pub mod errors;
pub mod handle;
pub mod model;
pub mod pool;
pub mod proxy;
pub mod reactor;
pub mod result;
pub mod testing;
pub mod value;

pub use errors::{ArgError, CallError, ResolveError, SpawnError};
pub use handle::JoinHandle;
pub use model::{PoolMetrics, PoolState, ShutdownPhase};
pub use pool::{Config, ThreadPool, WorkerPool};
pub use proxy::{Dispatcher, Hook, Hooks, Resolved, Thimble};
pub use reactor::{Reactor, Scheduler};
pub use result::SpawnResult;
pub use value::{Args, Member, MemberTable, Members, Method, Value};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
