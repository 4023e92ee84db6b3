//! Прокси над синхронным объектом: блокирующие методы уходят в пул
//! и возвращают [`JoinHandle`], остальные члены отдаются как есть.

use super::{
    errors::{CallError, ResolveError, SpawnError},
    handle::JoinHandle,
    model::{PoolState, ShutdownPhase},
    pool::WorkerPool,
    reactor::Scheduler,
    result::SpawnResult,
    value::{Args, Member, Members, Method, Value},
};
use std::{
    any::Any,
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};
use tokio::sync::oneshot;
use tracing::{debug, trace};


/// Хук доступа к члену: `(прокси, имя, значение) -> новое значение`
pub type Hook = Arc<dyn Fn(&Thimble, &str, Member) -> Result<Member, CallError> + Send + Sync>;

pub type Hooks = HashMap<String, Hook>;

/// Имена, которые всегда разрешаются из состояния самого прокси
pub const OWN_MEMBERS: [&str; 3] = ["wrapped", "scheduler", "pool"];


#[derive(Clone)]
struct Lifecycle {
    scheduler: Arc<dyn Scheduler>,
    pool: Arc<dyn WorkerPool>,
    phase: ShutdownPhase,
}

impl Lifecycle {
    fn dispatch(&self, f: Method, args: Args) -> JoinHandle<Value> {
        if self.pool.is_joined() {
            debug!("dispatch after pool join rejected");
            return JoinHandle::failed(SpawnError::NotRunning(
                "this thimble's thread pool already stopped".into(),
            ));
        }

        // start() отдаёт true ровно одному вызывающему: он и регистрирует остановку
        if !self.pool.is_started() && self.pool.start() {
            trace!(phase = self.phase.as_str(), "pool started, registering shutdown");
            let pool = Arc::clone(&self.pool);
            self.scheduler
                .on_shutdown(self.phase, Box::new(move || pool.stop()));
        }

        // Остановленный планировщик выполняет триггер сразу, а пул мог не запуститься
        if self.pool.is_joined() {
            debug!("pool joined while starting, dispatch rejected");
            return JoinHandle::failed(SpawnError::NotRunning(
                "this thimble's thread pool already stopped".into(),
            ));
        }

        let (tx, rx) = oneshot::channel();
        let scheduler = Arc::clone(&self.scheduler);
        self.pool.submit(
            Box::new(move || f.call(args)),
            Box::new(move |result: SpawnResult<Value>| {
                scheduler.run_in_context(Box::new(move || {
                    let _ = tx.send(result);
                }));
            }),
        );

        JoinHandle::new(rx)
    }
}


/// Обёртка блокирующего члена: вызов отправляет его в пул
#[derive(Clone)]
pub struct Dispatcher {
    lifecycle: Arc<Lifecycle>,
    name: String,
    method: Method,
}

impl Dispatcher {
    #[inline]
    pub fn call(&self, args: Args) -> JoinHandle<Value> {
        trace!(member = %self.name, "dispatching");
        self.lifecycle.dispatch(self.method.clone(), args)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Вызываемое, которое уйдёт в пул (после хука)
    pub fn method(&self) -> &Method {
        &self.method
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").field("name", &self.name).finish_non_exhaustive()
    }
}


/// Результат [`Thimble::resolve`]
#[derive(Clone, Debug)]
pub enum Resolved {
    Attr(Value),
    Method(Method),
    Blocking(Dispatcher),
}

impl Resolved {
    pub fn as_attr(&self) -> Option<&Value> {
        match self {
            Resolved::Attr(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&Method> {
        match self {
            Resolved::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_blocking(&self) -> Option<&Dispatcher> {
        match self {
            Resolved::Blocking(d) => Some(d),
            _ => None,
        }
    }
}

impl From<Member> for Resolved {
    fn from(member: Member) -> Self {
        match member {
            Member::Attr(v) => Resolved::Attr(v),
            Member::Method(m) => Resolved::Method(m),
        }
    }
}


/// Прокси над объектом с блокирующим API.
///
/// Пул запускается лениво при первом блокирующем вызове; в тот же момент
/// его остановка регистрируется у планировщика. После join пула все
/// блокирующие вызовы возвращают уже проваленный handle.
pub struct Thimble {
    lifecycle: Arc<Lifecycle>,
    wrapped: Arc<dyn Members>,
    blocking: HashSet<String>,
    hooks: Hooks,
}

impl Thimble {
    pub fn new<I, S>(
        scheduler: Arc<dyn Scheduler>,
        pool: Arc<dyn WorkerPool>,
        wrapped: Arc<dyn Members>,
        blocking_names: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_hooks(scheduler, pool, wrapped, blocking_names, Hooks::new())
    }

    pub fn with_hooks<I, S>(
        scheduler: Arc<dyn Scheduler>,
        pool: Arc<dyn WorkerPool>,
        wrapped: Arc<dyn Members>,
        blocking_names: I,
        hooks: Hooks,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lifecycle: Arc::new(Lifecycle {
                scheduler,
                pool,
                phase: ShutdownPhase::default(),
            }),
            wrapped,
            blocking: blocking_names.into_iter().map(Into::into).collect(),
            hooks,
        }
    }

    pub fn hook<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Thimble, &str, Member) -> Result<Member, CallError> + Send + Sync + 'static,
    {
        self.hooks.insert(name.into(), Arc::new(f));
        self
    }

    /// Фаза, в которой планировщик остановит пул
    pub fn shutdown_phase(mut self, phase: ShutdownPhase) -> Self {
        Arc::make_mut(&mut self.lifecycle).phase = phase;
        self
    }

    /// Разрешить член по имени.
    ///
    /// Порядок: собственные члены прокси, поиск на обёрнутом объекте,
    /// хук, обёртка блокирующего члена в [`Dispatcher`].
    pub fn resolve(&self, name: &str) -> Result<Resolved, ResolveError> {
        if let Some(own) = self.own_member(name) {
            return Ok(Resolved::Attr(own));
        }

        let mut member = self
            .wrapped
            .member(name)
            .ok_or_else(|| ResolveError::NoSuchMember(name.to_owned()))?;

        if let Some(hook) = self.hooks.get(name) {
            member = hook(self, name, member).map_err(|source| ResolveError::Hook {
                name: name.to_owned(),
                source,
            })?;
        }

        if !self.blocking.contains(name) {
            return Ok(member.into());
        }

        let method = match member {
            Member::Method(m) => m,
            Member::Attr(_) => {
                let name = name.to_owned();
                Method::new(move |_| Err(CallError::not_callable(&name)))
            }
        };
        Ok(Resolved::Blocking(Dispatcher {
            lifecycle: Arc::clone(&self.lifecycle),
            name: name.to_owned(),
            method,
        }))
    }

    fn own_member(&self, name: &str) -> Option<Value> {
        match name {
            "wrapped" => Some(Value::new(Arc::clone(&self.wrapped))),
            "scheduler" => Some(Value::new(Arc::clone(&self.lifecycle.scheduler))),
            "pool" => Some(Value::new(Arc::clone(&self.lifecycle.pool))),
            _ => None,
        }
    }

    /// Атрибут нужного типа; `None`, если член не атрибут или другого типа
    pub fn attr<T: Any + Clone>(&self, name: &str) -> Result<Option<T>, ResolveError> {
        Ok(self.resolve(name)?.as_attr().and_then(Value::get::<T>))
    }

    /// Разрешить блокирующий член и сразу вызвать его
    pub fn call_blocking(&self, name: &str, args: Args) -> Result<JoinHandle<Value>, ResolveError> {
        match self.resolve(name)? {
            Resolved::Blocking(dispatcher) => Ok(dispatcher.call(args)),
            _ => Err(ResolveError::NotBlocking(name.to_owned())),
        }
    }

    /// Отправить `f(args)` в пул. Никогда не блокирует и всегда отдаёт handle.
    pub fn dispatch(&self, f: Method, args: Args) -> JoinHandle<Value> {
        self.lifecycle.dispatch(f, args)
    }

    pub fn wrapped(&self) -> &Arc<dyn Members> {
        &self.wrapped
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.lifecycle.scheduler
    }

    pub fn pool(&self) -> &Arc<dyn WorkerPool> {
        &self.lifecycle.pool
    }

    pub fn pool_state(&self) -> PoolState {
        self.lifecycle.pool.state()
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn blocking_names(&self) -> &HashSet<String> {
        &self.blocking
    }

    #[inline]
    pub fn is_blocking(&self, name: &str) -> bool {
        self.blocking.contains(name)
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.lifecycle.phase
    }
}

impl fmt::Debug for Thimble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut blocking: Vec<_> = self.blocking.iter().collect();
        blocking.sort_unstable();
        let mut hooks: Vec<_> = self.hooks.keys().collect();
        hooks.sort_unstable();
        f.debug_struct("Thimble")
            .field("blocking", &blocking)
            .field("hooks", &hooks)
            .field("phase", &self.lifecycle.phase)
            .field("pool", &self.pool_state())
            .finish_non_exhaustive()
    }
}
