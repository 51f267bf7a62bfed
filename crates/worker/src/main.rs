//! Coordination worker: runs the periodic reconciliation sweeps.
//!
//! One worker instance per deployment is enough; the sweeps are idempotent,
//! so accidentally running two is wasteful but not harmful.

mod recordings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use meethub_core::config::CoordinationConfig;
use meethub_coordination::LockService;
use meethub_media::{LiveKitClient, MediaServer};
use meethub_reconciler::{OrphanedLockSweep, StaleRecordingSweep};
use meethub_scheduler::{Schedule, TaskScheduler};
use meethub_store::RedisStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::recordings::HttpRecordingRepository;

const STORE_CONNECT_ATTEMPTS: u32 = 15;
const STORE_CONNECT_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meethub_worker=debug,meethub_reconciler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CoordinationConfig::from_env();
    tracing::info!(
        redis_url = %config.redis_url,
        livekit_url = %config.livekit_url,
        "Coordination worker starting"
    );

    // Wait out store startup ordering rather than requiring the store to be
    // up before the worker.
    let store = RedisStore::connect_with_retry(
        &config.redis_url,
        STORE_CONNECT_ATTEMPTS,
        STORE_CONNECT_DELAY,
    )
    .await
    .context("connecting to the coordination store")?;
    let store = Arc::new(store);

    let locks = LockService::new(store);
    let media: Arc<dyn MediaServer> = Arc::new(LiveKitClient::new(
        config.livekit_url.clone(),
        config.livekit_api_key.clone(),
        config.livekit_api_secret.clone(),
    ));

    let scheduler = TaskScheduler::new();

    let lock_schedule =
        Schedule::parse(&config.lock_gc_schedule).context("parsing LOCK_GC_SCHEDULE")?;
    let lock_sweep = Arc::new(OrphanedLockSweep::new(
        locks,
        media.clone(),
        config.lock_gc_grace,
    ));
    scheduler.register_fn("orphaned-lock-gc", lock_schedule, move || {
        let sweep = lock_sweep.clone();
        async move {
            sweep.run_once().await?;
            Ok(())
        }
    });

    match &config.recordings_api_url {
        Some(url) => {
            let stale_schedule =
                Schedule::parse(&config.stale_gc_schedule).context("parsing STALE_GC_SCHEDULE")?;
            let stale_sweep = Arc::new(StaleRecordingSweep::new(
                Arc::new(HttpRecordingRepository::new(url)),
                media,
                config.stale_recording_grace,
            ));
            scheduler.register_fn("stale-recording-gc", stale_schedule, move || {
                let sweep = stale_sweep.clone();
                async move {
                    sweep.run_once().await?;
                    Ok(())
                }
            });
        }
        None => {
            tracing::info!("RECORDINGS_API_URL not set; stale-recording sweep disabled");
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown signal received; stopping scheduled tasks");
    scheduler.shutdown();
    Ok(())
}
