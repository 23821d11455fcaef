// src/main.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{debug, info, warn};

use stream_recorder::api::{ApiService, ApiState};
use stream_recorder::bus::{LocalBus, MediaBus};
use stream_recorder::config::{Config, Settings};
use stream_recorder::recorder::{Recorder, RotationScheduler, install_publish_hook};

const ROTATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Config
    // ------------------------------------------------------------
    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".into());

    let cfg = Config::load(&cfg_path)?;
    info!("[recorder] loaded {}", cfg_path);

    std::fs::create_dir_all(&cfg.record.path)
        .with_context(|| format!("create storage root {}", cfg.record.path))?;

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[recorder] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    // ------------------------------------------------------------
    // Bus / Recorder
    // ------------------------------------------------------------
    let bus = LocalBus::new();
    let settings = Arc::new(Settings::from_config(&cfg.record));
    let media: Arc<dyn MediaBus> = Arc::new(bus.clone());
    let recorder = Arc::new(Recorder::new(settings.clone(), media));
    install_publish_hook(&bus, &recorder);
    info!("[recorder] {:?}", settings);

    // ------------------------------------------------------------
    // Rotation
    // ------------------------------------------------------------
    let scheduler = Arc::new(RotationScheduler::new(
        recorder.registry().clone(),
        cfg.scheduler.rotation_workers,
    ));
    let scheduler_thread = scheduler
        .clone()
        .spawn(cfg.tick(), running.clone())
        .context("spawn rotation scheduler")?;

    // ------------------------------------------------------------
    // API
    // ------------------------------------------------------------
    let bind_addr = cfg.bind_addr()?;
    ApiService::new(bind_addr).start(ApiState::new(recorder.clone()));

    // ------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------
    info!("[recorder] running on {} – Ctrl+C to stop", bind_addr);

    let mut last_stats = Instant::now();

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));

        if last_stats.elapsed() >= Duration::from_secs(60) {
            debug!("[recorder] {} active recordings", recorder.active().len());
            last_stats = Instant::now();
        }
    }

    // ------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------
    info!("[recorder] shutting down…");
    if scheduler_thread.join().is_err() {
        warn!("[recorder] scheduler thread panicked");
    }
    if !scheduler.wait_for_rotations(ROTATION_DRAIN_TIMEOUT) {
        warn!("[recorder] rotations still pending at shutdown");
    }
    recorder.shutdown();
    info!("[recorder] shutdown complete");

    Ok(())
}
