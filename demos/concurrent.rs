//! Concurrent usage with background replacement of worn-out connections

use roundpool::{BoxError, PoolConfiguration, PoolRegistry, PoolSettings, Resource};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

struct Connection {
    id: u64,
}

impl Resource for Connection {
    fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("roundpool=debug"))
        .init();

    println!("=== roundpool - Concurrent Example ===\n");

    let dialed = Arc::new(AtomicU64::new(0));
    let registry = Arc::new(PoolRegistry::new());

    let mut settings = HashMap::new();
    settings.insert(
        "inventory".to_string(),
        PoolSettings {
            addr: "10.0.0.12:7000".to_string(),
            size: 4,
            max_life: 60,
            max_use_count: 16,
            ctx: vec!["x-request-id".to_string()],
        },
    );

    registry
        .init_once(&settings, |name, entry| {
            println!("   Configuring {} -> {} ({} connections)", name, entry.addr, entry.size);
            let dialed = Arc::clone(&dialed);
            move |_cancel: CancellationToken| {
                let id = dialed.fetch_add(1, Ordering::Relaxed);
                async move { Ok::<_, BoxError>(Connection { id }) }
            }
        })
        .await;

    // A second registration with a faster eviction cycle for the demo.
    let dialed_fast = Arc::clone(&dialed);
    registry
        .register(
            "inventory",
            move |_cancel: CancellationToken| {
                let id = dialed_fast.fetch_add(1, Ordering::Relaxed);
                async move { Ok::<_, BoxError>(Connection { id }) }
            },
            PoolConfiguration::new()
                .with_capacity(4)
                .with_max_use_count(16)
                .with_eviction_interval(Duration::from_millis(20)),
        )
        .await
        .expect("inventory pool");

    let mut tasks = Vec::new();
    for task in 0..8 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let mut used = Vec::new();
            for _ in 0..25 {
                match registry.acquire("inventory", &cancel).await {
                    Ok(conn) => {
                        used.push(conn.id);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                    }
                    Err(e) => println!("   Task {} failed: {}", task, e),
                }
            }
            used
        }));
    }

    for (task, handle) in tasks.into_iter().enumerate() {
        let used = handle.await.expect("task panicked");
        println!("   Task {} used connections {:?}", task, used);
    }

    if let Some(pool) = registry.get("inventory") {
        let metrics = pool.metrics();
        println!("\n   Acquired: {}", metrics.total_acquired);
        println!("   Replacements: {}", metrics.replacements);
        println!("   Markings refused: {}", metrics.markings_refused);
    }

    registry.close_all();
    println!("   Connections dialed in total: {}", dialed.load(Ordering::Relaxed));
}
