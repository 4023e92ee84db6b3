#[cfg(test)]
mod tests {
    use thimble::{
        errors::{CallError, SpawnError},
        model::{PoolState, ShutdownPhase},
        pool::{Config, ThreadPool, WorkerPool},
        proxy::Thimble,
        reactor::{Reactor, Scheduler},
        value::{Args, MemberTable, Value},
    };
    use std::{
        future::Future,
        sync::{Arc, Mutex, mpsc},
        time::{Duration, Instant},
    };

    async fn measure<F, Fut, T>(name: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let start = Instant::now();
        let result = f().await;
        let elapsed = start.elapsed();
        println!("✓ {}: {:?}", name, elapsed);
        result
    }

    fn calculator() -> Arc<MemberTable> {
        Arc::new(
            MemberTable::new()
                .method("add", |args| {
                    let first: i64 = args.param(0, "first")?;
                    let second: i64 = args.param(1, "second")?;
                    Ok(first + second)
                })
                .method("slow_add", |args| {
                    let first: i64 = args.param(0, "first")?;
                    let second: i64 = args.param(1, "second")?;
                    std::thread::sleep(Duration::from_millis(20));
                    Ok(first + second)
                })
                .method("thread_name", |_| {
                    Ok(std::thread::current().name().unwrap_or_default().to_owned())
                })
                .method("panics", |_| -> Result<i64, CallError> { panic!("Test panic") }),
        )
    }

    fn setup(threads: usize) -> (Arc<Reactor>, Arc<ThreadPool>, Thimble) {
        let reactor = Reactor::start("test-reactor").unwrap();
        let pool = ThreadPool::with_config(Config {
            num_threads: threads,
            ..Config::default()
        });
        let thimble = Thimble::new(
            reactor.clone(),
            pool.clone(),
            calculator(),
            ["add", "slow_add", "thread_name", "panics"],
        );
        (reactor, pool, thimble)
    }

    fn add_args(first: i64, second: i64) -> Args {
        Args::new().arg(first).kwarg("second", second)
    }

    #[tokio::test]
    async fn load_test_many_dispatches() {
        println!("\n=== LOAD TEST: 10k вызовов через прокси ===");
        let (reactor, pool, thimble) = setup(8);

        let results = measure("10k dispatches", || async {
            let handles: Vec<_> = (0..10_000_i64)
                .map(|i| thimble.call_blocking("add", add_args(i, i)).unwrap())
                .collect();
            futures::future::join_all(handles).await
        }).await;

        let sum: i64 = results
            .into_iter()
            .map(|r| r.unwrap().get::<i64>().unwrap())
            .sum();
        assert_eq!(sum, (0..10_000_i64).map(|i| i * 2).sum::<i64>());

        let metrics = pool.metrics();
        println!("  Success rate: {:.1}%", metrics.success_rate() * 100.0);
        println!("  Utilization: {:.2}", metrics.utilization());
        println!("  Queue pressure: {:.2} задач на поток", metrics.queue_pressure());
        assert_eq!(metrics.queue_pressure(), 0.0, "очередь разобрана");
        assert_eq!(metrics.total_submitted, 10_000);
        assert_eq!(metrics.completed_tasks, 10_000);
        assert_eq!(metrics.failed_tasks, 0);

        reactor.stop();
        reactor.stopped().await;
        reactor.join();
    }

    #[tokio::test]
    async fn test_example_scenario() {
        let (reactor, pool, thimble) = setup(2);
        assert_eq!(pool.state(), PoolState::NotStarted);

        let value = thimble.call_blocking("add", add_args(1, 2)).unwrap().await.unwrap();
        assert_eq!(value.get::<i64>(), Some(3));
        assert_eq!(pool.state(), PoolState::Started);

        reactor.stop();
        reactor.stopped().await;
        assert!(pool.is_joined());

        let result = thimble.call_blocking("add", add_args(3, 4)).unwrap().await;
        match result {
            Err(SpawnError::NotRunning(_)) => {}
            other => panic!("Ожидали NotRunning, получили {:?}", other),
        }
        assert_eq!(pool.metrics().total_submitted, 1);
        reactor.join();
    }

    #[tokio::test]
    async fn test_first_call_after_reactor_exit_is_rejected() {
        let (reactor, pool, thimble) = setup(2);
        reactor.stop();
        reactor.stopped().await;
        reactor.join();

        let result = thimble
            .call_blocking("add", add_args(1, 2))
            .unwrap()
            .await_timeout(Duration::from_secs(5))
            .await;
        match result {
            Err(SpawnError::NotRunning(_)) => {}
            other => panic!("Ожидали NotRunning, получили {:?}", other),
        }
        // Триггер остановки выполнился сразу при регистрации
        assert!(pool.is_joined());
        assert_eq!(pool.metrics().total_submitted, 0);
    }

    #[tokio::test]
    async fn test_started_pool_delivers_results_after_reactor_exit() {
        let (reactor, pool, thimble) = setup(2);
        assert!(pool.start());
        reactor.stop();
        reactor.stopped().await;
        reactor.join();

        let value = thimble
            .call_blocking("add", add_args(1, 2))
            .unwrap()
            .await_timeout(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value.get::<i64>(), Some(3));
        assert!(!pool.is_joined(), "остановку пула никто не регистрировал");
        pool.stop();
    }

    #[test]
    fn test_reactor_runs_callbacks_inline_after_exit() {
        let reactor = Reactor::start("exited").unwrap();
        reactor.stop();
        reactor.join();

        let (tx, rx) = mpsc::channel();
        reactor.run_in_context(Box::new(move || {
            tx.send(std::thread::current().id()).unwrap();
        }));
        assert_eq!(rx.try_recv().unwrap(), std::thread::current().id());
    }

    #[tokio::test]
    async fn test_zero_threads_is_raised_to_one() {
        let (reactor, pool, thimble) = setup(0);
        assert_eq!(pool.config().num_threads, 1);
        assert_eq!(ThreadPool::new(0).config().num_threads, 1);

        let value = thimble
            .call_blocking("add", add_args(1, 2))
            .unwrap()
            .await_timeout(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value.get::<i64>(), Some(3));

        reactor.stop();
        reactor.stopped().await;
        reactor.join();
    }

    // Стек такого размера не выделяется: ни один воркер не стартует
    #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
    #[tokio::test]
    async fn test_pool_without_workers_rejects_work() {
        let reactor = Reactor::start("no-workers").unwrap();
        let pool = ThreadPool::with_config(Config {
            num_threads: 2,
            stack_size: Some(1 << 60),
            ..Config::default()
        });
        let thimble = Thimble::new(reactor.clone(), pool.clone(), calculator(), ["add"]);

        let result = thimble
            .call_blocking("add", add_args(1, 2))
            .unwrap()
            .await_timeout(Duration::from_secs(5))
            .await;
        match result {
            Err(SpawnError::NotRunning(_)) => {}
            other => panic!("Ожидали NotRunning, получили {:?}", other),
        }
        assert_eq!(pool.state(), PoolState::Stopped);
        assert!(!pool.start(), "пул без воркеров не перезапускается");

        reactor.stop();
        reactor.stopped().await;
        reactor.join();
    }

    #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
    #[test]
    fn test_pool_without_workers_fails_queued_work() {
        let pool = ThreadPool::with_config(Config {
            num_threads: 1,
            stack_size: Some(1 << 60),
            ..Config::default()
        });
        let (tx, rx) = mpsc::channel();

        pool.submit(
            Box::new(|| -> Result<Value, CallError> { Ok(Value::unit()) }),
            Box::new(move |result: Result<Value, SpawnError>| tx.send(result.is_err_and(|e| e.is_not_running())).unwrap()),
        );
        assert!(!pool.start());
        assert!(pool.is_joined());
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    #[tokio::test]
    async fn test_calls_run_on_worker_threads() {
        let (reactor, _pool, thimble) = setup(2);

        let name = thimble.call_blocking("thread_name", Args::new()).unwrap().await.unwrap();
        let name = name.get::<String>().unwrap();
        assert!(name.starts_with("thimble-worker"), "ran on {name}");

        reactor.stop();
        reactor.join();
    }

    #[tokio::test]
    async fn test_in_flight_calls_finish_on_shutdown() {
        let (reactor, _pool, thimble) = setup(2);

        let handles: Vec<_> = (0..10_i64)
            .map(|i| thimble.call_blocking("slow_add", add_args(i, 1)).unwrap())
            .collect();

        reactor.stop();

        for (i, result) in futures::future::join_all(handles).await.into_iter().enumerate() {
            assert_eq!(result.unwrap().get::<i64>(), Some(i as i64 + 1));
        }
        reactor.stopped().await;
        reactor.join();
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let _guard = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));

        let (reactor, pool, thimble) = setup(2);
        let result = thimble.call_blocking("panics", Args::new()).unwrap().await;

        match result {
            Err(SpawnError::Panic(message)) => assert!(message.contains("Test panic")),
            other => panic!("Ожидали Panic, получили {:?}", other),
        }
        assert_eq!(pool.metrics().failed_tasks, 1);

        // Пул продолжает работать после паники
        let value = thimble.call_blocking("add", add_args(2, 2)).unwrap().await.unwrap();
        assert_eq!(value.get::<i64>(), Some(4));

        reactor.stop();
        reactor.join();
    }

    #[tokio::test]
    async fn test_timeout() {
        let (reactor, _pool, thimble) = setup(1);
        let handle = thimble.call_blocking("slow_add", add_args(1, 1)).unwrap();

        match handle.await_timeout(Duration::from_millis(1)).await {
            Err(SpawnError::Timeout) => {}
            other => panic!("Ожидали timeout, получили {:?}", other),
        }

        reactor.stop();
        reactor.join();
    }

    #[test]
    fn test_blocking_wait() {
        let (reactor, _pool, thimble) = setup(2);
        let value = thimble
            .call_blocking("add", add_args(20, 22))
            .unwrap()
            .blocking_wait()
            .unwrap();
        assert_eq!(value.get::<i64>(), Some(42));
        reactor.stop();
        reactor.join();
    }

    #[tokio::test]
    async fn test_reactor_runs_phases_in_order() {
        let reactor = Reactor::start("phases").unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for phase in [ShutdownPhase::After, ShutdownPhase::During, ShutdownPhase::Before, ShutdownPhase::During] {
            let order = order.clone();
            reactor.on_shutdown(phase, Box::new(move || order.lock().unwrap().push(phase)));
        }

        reactor.stop();
        reactor.stopped().await;
        assert!(!reactor.is_running());
        assert_eq!(
            *order.lock().unwrap(),
            vec![
                ShutdownPhase::Before,
                ShutdownPhase::During,
                ShutdownPhase::During,
                ShutdownPhase::After,
            ]
        );

        // Триггер после shutdown выполняется сразу
        let late = order.clone();
        reactor.on_shutdown(ShutdownPhase::Before, Box::new(move || late.lock().unwrap().clear()));
        assert!(order.lock().unwrap().is_empty());
        reactor.join();
    }

    #[test]
    fn test_reactor_survives_panicking_callback() {
        let _guard = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));

        let reactor = Reactor::start("panicky").unwrap();
        let (tx, rx) = mpsc::channel();

        reactor.run_in_context(Box::new(|| panic!("callback panic")));
        reactor.run_in_context(Box::new(move || {
            tx.send(std::thread::current().name().map(str::to_owned)).unwrap();
        }));

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("panicky"));

        reactor.stop();
        reactor.join();
    }

    #[test]
    fn test_pool_queues_work_until_started() {
        let pool = ThreadPool::new(2);
        let (tx, rx) = mpsc::channel();

        pool.submit(
            Box::new(|| -> Result<Value, CallError> { Ok(Value::new(5_i64)) }),
            Box::new(move |result: Result<Value, SpawnError>| tx.send(result.map(|v| v.get::<i64>())).unwrap()),
        );
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        assert!(pool.start());
        assert!(!pool.start(), "повторный start не выполняет переход");
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.unwrap(), Some(5));

        pool.stop();
        assert!(pool.is_joined());
        assert!(!pool.start(), "остановленный пул не перезапускается");
    }

    #[test]
    fn test_stop_before_start_fails_queued_work() {
        let pool = ThreadPool::new(2);
        let (tx, rx) = mpsc::channel();

        let queued = tx.clone();
        pool.submit(
            Box::new(|| -> Result<Value, CallError> { Ok(Value::unit()) }),
            Box::new(move |result: Result<Value, SpawnError>| queued.send(result.is_ok()).unwrap()),
        );
        pool.stop();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), false);

        pool.submit(
            Box::new(|| -> Result<Value, CallError> { Ok(Value::unit()) }),
            Box::new(move |result: Result<Value, SpawnError>| tx.send(matches!(result, Err(SpawnError::NotRunning(_)))).unwrap()),
        );
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert_eq!(pool.state(), PoolState::Stopped);
    }
}
