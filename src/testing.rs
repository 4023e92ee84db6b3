//! Синхронные тестовые двойники планировщика и пула.
//!
//! Всё выполняется в вызывающем потоке, поэтому handle от блокирующего
//! вызова готов сразу после вызова и проверяется через `try_result()`.

use super::{
    errors::SpawnError,
    model::ShutdownPhase,
    pool::{panic_message, Completion, Job, WorkerPool},
    reactor::{Callback, Scheduler},
};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};


/// Пул, выполняющий работу синхронно в потоке `submit`.
///
/// Паника в работе становится [`SpawnError::Panic`], как в настоящем пуле.
/// [`FakeThreadPool::fail_with`] заставляет пул отвечать ошибкой без запуска работы.
#[derive(Debug, Default)]
pub struct FakeThreadPool {
    started: AtomicBool,
    joined: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    submitted: AtomicUsize,
    failure: Mutex<Option<SpawnError>>,
}

impl FakeThreadPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Последующие `submit` завершаются этой ошибкой, работа не выполняется
    pub fn fail_with(&self, error: SpawnError) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    /// Вернуть обычное выполнение работы
    pub fn succeed(&self) {
        self.failure.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

impl WorkerPool for FakeThreadPool {
    fn start(&self) -> bool {
        let transitioned = !self.started.swap(true, Ordering::SeqCst);
        if transitioned {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        transitioned
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.started.store(false, Ordering::SeqCst);
        self.joined.store(true, Ordering::SeqCst);
    }

    fn submit(&self, job: Job, completion: Completion) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        let failure = self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(error) = failure {
            completion(Err(error));
            return;
        }

        let result = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(result) => result.map_err(SpawnError::Call),
            Err(payload) => Err(SpawnError::Panic(panic_message(payload.as_ref()))),
        };
        completion(result);
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn is_joined(&self) -> bool {
        self.joined.load(Ordering::SeqCst)
    }
}


/// Планировщик, выполняющий колбэки сразу и только запоминающий
/// shutdown-триггеры. `stop()` выполняет их в порядке регистрации.
#[derive(Default)]
pub struct FakeReactor {
    triggers: Mutex<Vec<(ShutdownPhase, Option<Callback>)>>,
    context_calls: AtomicUsize,
}

impl FakeReactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Фазы зарегистрированных триггеров
    pub fn triggers(&self) -> Vec<ShutdownPhase> {
        self.lock().iter().map(|(phase, _)| *phase).collect()
    }

    pub fn context_calls(&self) -> usize {
        self.context_calls.load(Ordering::SeqCst)
    }

    /// Выполнить все ещё не выполненные триггеры
    pub fn stop(&self) {
        let pending: Vec<Callback> = self
            .lock()
            .iter_mut()
            .filter_map(|(_, callback)| callback.take())
            .collect();
        for callback in pending {
            callback();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ShutdownPhase, Option<Callback>)>> {
        self.triggers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Scheduler for FakeReactor {
    fn run_in_context(&self, f: Callback) {
        self.context_calls.fetch_add(1, Ordering::SeqCst);
        f();
    }

    fn on_shutdown(&self, phase: ShutdownPhase, callback: Callback) {
        self.lock().push((phase, Some(callback)));
    }
}

impl std::fmt::Debug for FakeReactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeReactor")
            .field("triggers", &self.triggers())
            .finish_non_exhaustive()
    }
}
