#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub threads: usize,
    pub active_tasks: usize,
    pub queued_tasks: usize,
    pub total_submitted: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.threads == 0 {
            return 0.0;
        }
        self.active_tasks as f64 / self.threads as f64
    }

    /// Задач в очереди на один поток
    pub fn queue_pressure(&self) -> f64 {
        if self.threads == 0 {
            return 0.0;
        }
        self.queued_tasks as f64 / self.threads as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}


/// Состояние пула, как его видит прокси
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    NotStarted,
    Started,
    /// Терминальное: после join пул больше не запускается
    Stopped,
}


/// Фаза shutdown-последовательности планировщика, в которой выполняется
/// остановка пула. Прокси передаёт её планировщику без интерпретации.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ShutdownPhase {
    Before,
    #[default]
    During,
    After,
}

impl ShutdownPhase {
    pub const ALL: [ShutdownPhase; 3] = [
        ShutdownPhase::Before,
        ShutdownPhase::During,
        ShutdownPhase::After,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownPhase::Before => "before",
            ShutdownPhase::During => "during",
            ShutdownPhase::After => "after",
        }
    }
}
