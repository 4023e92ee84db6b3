use super::{
    errors::{CallError, SpawnError},
    result::SpawnResult,
    model::{
        PoolMetrics,
        PoolState,
    },
    value::Value,
};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
};
use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, trace, warn};


/// Работа для пула: выполняется вне управляющего контекста
pub type Job = Box<dyn FnOnce() -> Result<Value, CallError> + Send + 'static>;

/// Получает итог работы: значение или ошибку
pub type Completion = Box<dyn FnOnce(SpawnResult<Value>) + Send + 'static>;


/// Контракт пула потоков, которым пользуется прокси
pub trait WorkerPool: Send + Sync + 'static {
    /// Переход в рабочее состояние. Возвращает `true`, только если
    /// переход выполнил именно этот вызов. Пул, который не смог начать
    /// работу, сразу переходит в joined и возвращает `false`.
    fn start(&self) -> bool;

    fn stop(&self);

    /// Выполнить `job` вне управляющего контекста и передать итог в `completion`
    fn submit(&self, job: Job, completion: Completion);

    fn is_started(&self) -> bool;

    /// Пул окончательно остановлен
    fn is_joined(&self) -> bool;

    fn state(&self) -> PoolState {
        if self.is_joined() {
            PoolState::Stopped
        } else if self.is_started() {
            PoolState::Started
        } else {
            PoolState::NotStarted
        }
    }
}


/// Конфигурация пула потоков
#[derive(Debug, Clone)]
pub struct Config {
    pub num_threads: usize,
    pub thread_name: String,
    pub stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            num_threads: num_cpus * 2, // Для I/O-bound задач
            thread_name: "thimble-worker".into(),
            stack_size: None,
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        Self {
            num_threads: num_cpus::get(),
            ..Default::default()
        }
    }

    pub fn io_bound() -> Self {
        Self {
            num_threads: num_cpus::get() * 4,
            ..Default::default()
        }
    }
}


struct Task {
    job: Job,
    completion: Completion,
}

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    queued: AtomicUsize,
    total_submitted: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

/// Пул потоков ОС фиксированного размера для блокирующих вызовов.
///
/// Задачи, отправленные до `start()`, ждут в очереди.
/// `stop()` закрывает очередь, дожидается её опустошения и join'ит воркеры.
pub struct ThreadPool {
    config: Config,
    sender: Mutex<Option<Sender<Task>>>,
    receiver: Receiver<Task>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    started: AtomicBool,
    joined: AtomicBool,
    counters: Arc<Counters>,
}

impl ThreadPool {
    pub fn new(num_threads: usize) -> Arc<Self> {
        let config = Config {
            num_threads,
            ..Default::default()
        };
        Self::with_config(config)
    }

    /// `num_threads` меньше одного поднимается до одного воркера
    pub fn with_config(mut config: Config) -> Arc<Self> {
        config.num_threads = config.num_threads.max(1);
        let (sender, receiver) = channel::unbounded();
        Arc::new(Self {
            config,
            sender: Mutex::new(Some(sender)),
            receiver,
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            joined: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        let c = &self.counters;
        PoolMetrics {
            threads: self.config.num_threads,
            active_tasks: c.active.load(Ordering::Relaxed),
            queued_tasks: c.queued.load(Ordering::Relaxed),
            total_submitted: c.total_submitted.load(Ordering::Relaxed),
            completed_tasks: c.completed.load(Ordering::Relaxed),
            failed_tasks: c.failed.load(Ordering::Relaxed),
        }
    }

    fn spawn_worker(&self, index: usize) -> std::io::Result<thread::JoinHandle<()>> {
        let receiver = self.receiver.clone();
        let counters = Arc::clone(&self.counters);
        let mut builder = thread::Builder::new().name(format!("{}-{}", self.config.thread_name, index));
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(move || worker_loop(receiver, counters))
    }
}

fn worker_loop(receiver: Receiver<Task>, counters: Arc<Counters>) {
    // recv() завершается ошибкой, когда очередь закрыта и пуста
    while let Ok(Task { job, completion }) = receiver.recv() {
        counters.queued.fetch_sub(1, Ordering::Relaxed);
        counters.active.fetch_add(1, Ordering::Relaxed);

        let result: SpawnResult<Value> = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(SpawnError::Call(e)),
            Err(panic_info) => Err(SpawnError::Panic(panic_message(panic_info.as_ref()))),
        };

        if result.is_ok() {
            counters.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        counters.active.fetch_sub(1, Ordering::Relaxed);

        if panic::catch_unwind(AssertUnwindSafe(move || completion(result))).is_err() {
            warn!("completion callback panicked");
        }
    }
    trace!("worker exiting");
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

impl WorkerPool for ThreadPool {
    fn start(&self) -> bool {
        if self.joined.load(Ordering::Acquire) {
            return false;
        }
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let spawned = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            for index in 0..self.config.num_threads {
                match self.spawn_worker(index) {
                    Ok(handle) => workers.push(handle),
                    Err(e) => warn!(index, error = %e, "failed to spawn worker thread"),
                }
            }
            workers.len()
        };

        // Без воркеров очередь никто не разберёт: отказываем всем сразу
        if spawned == 0 {
            warn!("no worker threads spawned, stopping thread pool");
            self.stop();
            return false;
        }
        debug!(threads = spawned, "thread pool started");
        true
    }

    fn stop(&self) {
        if self.joined.swap(true, Ordering::AcqRel) {
            return;
        }
        self.started.store(false, Ordering::Release);

        // Закрываем очередь: воркеры доработают остаток и выйдут
        drop(self.sender.lock().unwrap_or_else(|e| e.into_inner()).take());

        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!("worker thread panicked");
            }
        }

        // Остаток есть, только если воркеры так и не были запущены
        while let Ok(task) = self.receiver.try_recv() {
            self.counters.queued.fetch_sub(1, Ordering::Relaxed);
            (task.completion)(Err(SpawnError::NotRunning("thread pool stopped before start".into())));
        }
        debug!("thread pool stopped");
    }

    fn submit(&self, job: Job, completion: Completion) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let Some(sender) = sender else {
            completion(Err(SpawnError::NotRunning("thread pool already stopped".into())));
            return;
        };

        self.counters.total_submitted.fetch_add(1, Ordering::Relaxed);
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        if let Err(channel::SendError(task)) = sender.send(Task { job, completion }) {
            self.counters.queued.fetch_sub(1, Ordering::Relaxed);
            (task.completion)(Err(SpawnError::NotRunning("thread pool already stopped".into())));
        }
    }

    #[inline]
    fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    #[inline]
    fn is_joined(&self) -> bool {
        self.joined.load(Ordering::Acquire)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
