//! Basic usage examples for ResourcePool

use roundpool::{BoxError, PoolConfiguration, PoolError, Resource, ResourcePool};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Channel {
    id: u64,
    addr: &'static str,
}

impl Resource for Channel {
    fn close(&self) -> Result<(), BoxError> {
        println!("   Closing channel {} to {}", self.id, self.addr);
        Ok(())
    }
}

static DIALED: AtomicU64 = AtomicU64::new(0);

async fn dial(_cancel: CancellationToken) -> Result<Channel, BoxError> {
    Ok(Channel {
        id: DIALED.fetch_add(1, Ordering::Relaxed),
        addr: "127.0.0.1:50051",
    })
}

#[tokio::main]
async fn main() -> Result<(), PoolError> {
    println!("=== roundpool - Basic Examples ===\n");

    // Example 1: Simple pool
    simple_pool().await?;

    // Example 2: Round-robin sharing
    round_robin().await?;

    // Example 3: Timeouts and closing
    timeouts_and_close().await?;

    // Example 4: Metrics and health
    metrics_and_health().await?;

    Ok(())
}

async fn simple_pool() -> Result<(), PoolError> {
    println!("1. Simple Pool:");
    let pool = ResourcePool::new(dial, PoolConfiguration::default()).await?;

    {
        let channel = pool.acquire(&CancellationToken::new()).await?;
        println!("   Got channel {} to {}", channel.id, channel.addr);
        // Released when dropped
    }

    println!("   Capacity: {}\n", pool.capacity());
    Ok(())
}

async fn round_robin() -> Result<(), PoolError> {
    println!("2. Round-robin Sharing:");
    let pool = ResourcePool::new(dial, PoolConfiguration::new().with_capacity(3)).await?;
    let cancel = CancellationToken::new();

    let mut held = Vec::new();
    for _ in 0..5 {
        let channel = pool.acquire(&cancel).await?;
        println!("   Got channel {} ({} borrowers)", channel.id, channel.in_use());
        held.push(channel);
    }
    println!();
    Ok(())
}

async fn timeouts_and_close() -> Result<(), PoolError> {
    println!("3. Timeouts and Closing:");
    let pool = ResourcePool::new(dial, PoolConfiguration::default()).await?;

    let cancel = CancellationToken::new();
    cancel.cancel();
    match pool.acquire(&cancel).await {
        Ok(_) => println!("   Got channel"),
        Err(e) => println!("   Cancelled acquire: {}", e),
    }

    pool.close();
    match pool.acquire_timeout(Duration::from_millis(100)).await {
        Ok(_) => println!("   Got channel"),
        Err(e) => println!("   After close: {}", e),
    }
    println!("   Capacity after close: {}\n", pool.capacity());
    Ok(())
}

async fn metrics_and_health() -> Result<(), PoolError> {
    println!("4. Metrics and Health:");
    let pool = ResourcePool::new(dial, PoolConfiguration::new().with_capacity(4).with_max_use_count(1)).await?;

    for _ in 0..8 {
        pool.acquire_timeout(Duration::from_secs(1)).await?.release();
    }

    let health = pool.health_status();
    println!("   Healthy: {}", health.is_healthy());
    println!("   Unhealthy resources: {}/{}", health.unhealthy_resources, health.total_capacity);
    for warning in &health.warnings {
        println!("   Warning: {}", warning);
    }

    let mut tags = HashMap::new();
    tags.insert("service".to_string(), "demo".to_string());
    println!("\n{}", pool.export_metrics_prometheus("demo_pool", Some(&tags)));
    Ok(())
}
