use thimble::{
    Args, CallError, Config, MemberTable, Reactor, Thimble, ThreadPool,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;


fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let reactor = Reactor::start("thimble-reactor")?;
    let pool = ThreadPool::with_config(Config::cpu_bound());

    let calculator = MemberTable::new()
        .attr("name", "calculator")
        .method("add", |args: Args| -> Result<i64, CallError> {
            let first: i64 = args.param(0, "first")?;
            let second: i64 = args.param(1, "second")?;
            std::thread::sleep(std::time::Duration::from_millis(50));
            Ok(first + second)
        });

    let thimble = Thimble::new(reactor.clone(), pool, Arc::new(calculator), ["add"]);

    let name: Option<&'static str> = thimble.attr("name")?;
    println!("wrapped: {:?}", name);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        let handles = (0..8_i64)
            .map(|i| thimble.call_blocking("add", Args::new().arg(i).kwarg("second", i * 10)))
            .collect::<Result<Vec<_>, _>>()?;

        for result in futures::future::join_all(handles).await {
            println!("add: {:?}", result?.get::<i64>());
        }

        reactor.stop();
        reactor.stopped().await;

        let rejected = thimble.call_blocking("add", Args::new().arg(3_i64).kwarg("second", 4_i64))?.await;
        println!("after shutdown: {:?}", rejected);
        Ok::<_, Box<dyn std::error::Error>>(())
    })?;

    reactor.join();
    println!("thimble {}", thimble::VERSION);
    Ok(())
}
