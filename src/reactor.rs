//! Управляющий контекст: планировщик колбэков и shutdown-триггеров.

use super::{
    model::ShutdownPhase,
    pool::panic_message,
};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
};
use crossbeam::channel::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};


pub type Callback = Box<dyn FnOnce() + Send + 'static>;


/// Контракт планировщика, которым пользуется прокси
pub trait Scheduler: Send + Sync + 'static {
    /// Выполнить `f` в управляющем контексте
    fn run_in_context(&self, f: Callback);

    /// Зарегистрировать `callback` на shutdown в фазе `phase`
    fn on_shutdown(&self, phase: ShutdownPhase, callback: Callback);
}


enum Event {
    Call(Callback),
    Stop,
}

/// Планировщик на одном выделенном потоке.
///
/// `stop()` запускает shutdown: триггеры фаз Before, During, After
/// (внутри фазы в порядке регистрации), затем колбэки, пришедшие за это время.
pub struct Reactor {
    sender: Sender<Event>,
    // Своя копия получателя: очередь не закрывается, пока жив Reactor
    receiver: Receiver<Event>,
    // None: shutdown уже забрал триггеры
    triggers: Mutex<Option<Vec<(ShutdownPhase, Callback)>>>,
    shutting_down: AtomicBool,
    // true: поток реактора больше не разбирает очередь
    drained: AtomicBool,
    stopped: CancellationToken,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Reactor {
    pub fn start(name: &str) -> std::io::Result<Arc<Self>> {
        let (sender, receiver) = channel::unbounded();
        let reactor = Arc::new(Self {
            sender,
            receiver: receiver.clone(),
            triggers: Mutex::new(Some(Vec::new())),
            shutting_down: AtomicBool::new(false),
            drained: AtomicBool::new(false),
            stopped: CancellationToken::new(),
            thread: Mutex::new(None),
        });

        // Поток держит только Weak: сам Reactor освобождается вместе с последним Arc
        let weak = Arc::downgrade(&reactor);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                Self::run_loop(&receiver);
                drop(receiver);
                if let Some(reactor) = weak.upgrade() {
                    reactor.shutdown();
                }
            })?;
        *reactor.thread.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        debug!(name, "reactor started");
        Ok(reactor)
    }

    fn run_loop(receiver: &Receiver<Event>) {
        while let Ok(event) = receiver.recv() {
            match event {
                Event::Call(f) => run_guarded(f),
                Event::Stop => return,
            }
        }
    }

    fn shutdown(&self) {
        let mut triggers = self
            .triggers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_default();

        for phase in ShutdownPhase::ALL {
            let (current, rest): (Vec<_>, Vec<_>) =
                triggers.into_iter().partition(|(p, _)| *p == phase);
            triggers = rest;
            debug!(phase = phase.as_str(), count = current.len(), "running shutdown triggers");
            for (_, callback) in current {
                run_guarded(callback);
            }
        }

        self.drained.store(true, Ordering::SeqCst);
        self.drain();

        self.stopped.cancel();
        debug!("reactor stopped");
    }

    /// Выполнить колбэки, оставшиеся в очереди, в текущем потоке
    fn drain(&self) {
        while let Ok(event) = self.receiver.try_recv() {
            if let Event::Call(f) = event {
                run_guarded(f);
            }
        }
    }

    /// Запросить остановку. Не блокирует.
    pub fn stop(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.sender.send(Event::Stop);
    }

    /// Дождаться завершения потока реактора
    pub fn join(&self) {
        let handle = self.thread.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("reactor thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shutting_down.load(Ordering::Acquire)
    }

    /// Завершается, когда shutdown-последовательность отработала
    pub async fn stopped(&self) {
        self.stopped.cancelled().await;
    }
}

fn run_guarded(f: Callback) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        warn!(panic = %panic_message(payload.as_ref()), "reactor callback panicked");
    }
}

impl Scheduler for Reactor {
    fn run_in_context(&self, f: Callback) {
        // Получатель принадлежит и самому Reactor, поэтому send не падает
        let _ = self.sender.send(Event::Call(f));

        // Поток реактора уже завершился: колбэк выполняет вызывающий поток
        if self.drained.load(Ordering::SeqCst) {
            trace!("reactor stopped, running callback inline");
            self.drain();
        }
    }

    fn on_shutdown(&self, phase: ShutdownPhase, callback: Callback) {
        let mut guard = self.triggers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(triggers) = guard.as_mut() {
            triggers.push((phase, callback));
            return;
        }
        drop(guard);

        debug!(phase = phase.as_str(), "shutdown already running, trigger runs now");
        run_guarded(callback);
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
