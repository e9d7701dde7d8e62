// Demo binary - the library lives in lib.rs
// Run demos with: cargo run --example basic

use roundpool::{BoxError, PoolConfiguration, Resource, ResourcePool};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

struct DemoConnection {
    id: u64,
}

impl Resource for DemoConnection {
    fn close(&self) -> Result<(), BoxError> {
        tracing::info!(id = self.id, "connection closed");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== roundpool ===");
    println!("See demos/ directory for usage examples");
    println!("Run: cargo run --example basic");
    println!();

    static DIALED: AtomicU64 = AtomicU64::new(0);
    let pool = ResourcePool::new(
        |_cancel: CancellationToken| async {
            Ok::<_, BoxError>(DemoConnection {
                id: DIALED.fetch_add(1, Ordering::Relaxed),
            })
        },
        PoolConfiguration::new()
            .with_capacity(3)
            .with_max_use_count(2)
            .with_eviction_interval(Duration::from_millis(100)),
    )
    .await?;

    println!("Quick Demo:");
    for _ in 0..9 {
        let conn = pool.acquire_timeout(Duration::from_secs(1)).await?;
        println!("  Got connection {} (use {})", conn.id, conn.use_count());
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("  Replacements so far: {}", pool.metrics().replacements);

    pool.close();
    Ok(())
}
