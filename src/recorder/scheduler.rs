use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Timelike};
use log::{debug, info, warn};

use crate::core::lock::lock_mutex;
use crate::recorder::keys::{logical_stream_id, rotated_key};
use crate::recorder::pool::RotationPool;
use crate::recorder::registry::Registry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reaped: usize,
    pub skipped: usize,
    pub queued: usize,
}

pub fn is_hour_boundary<Tz: TimeZone>(now: &DateTime<Tz>) -> bool {
    now.minute() == 0 && now.second() == 0
}

/// Delay until the next tick: at most `tick`, and never past the start of
/// the next wall-clock second, so no second (and no boundary) is skipped.
pub fn next_tick_delay<Tz: TimeZone>(now: &DateTime<Tz>, tick: Duration) -> Duration {
    // Schaltsekunde: subsec kann > 999 sein
    let subsec = u64::from(now.timestamp_subsec_millis().min(999));
    tick.min(Duration::from_millis(1000 - subsec))
}

/// Hourly rotation of every active recording onto a new dated file.
pub struct RotationScheduler {
    registry: Arc<Registry>,
    pool: RotationPool,
    last_fired: Mutex<Option<String>>,
}

impl RotationScheduler {
    pub fn new(registry: Arc<Registry>, workers: usize) -> Self {
        Self {
            registry,
            pool: RotationPool::new(workers),
            last_fired: Mutex::new(None),
        }
    }

    /// True once per hour boundary. Two ticks inside the same boundary
    /// second fire only once.
    pub fn should_fire<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool
    where
        Tz::Offset: std::fmt::Display,
    {
        if !is_hour_boundary(now) {
            return false;
        }
        let hour = now.format("%Y-%m-%d %H").to_string();
        let mut last = lock_mutex(&self.last_fired, "scheduler.should_fire");
        if last.as_deref() == Some(hour.as_str()) {
            return false;
        }
        *last = Some(hour);
        true
    }

    pub fn tick<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<SweepReport>
    where
        Tz::Offset: std::fmt::Display,
    {
        self.should_fire(now).then(|| self.sweep(now))
    }

    /// Reaps ended recordings and queues a rotation for every live one.
    pub fn sweep<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> SweepReport
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut report = SweepReport::default();

        for entry in self.registry.snapshot() {
            if entry.cancelled {
                if self.registry.reap(&entry.key, entry.id) {
                    info!("[scheduler] reaped ended recording {}", entry.key);
                    report.reaped += 1;
                }
                continue;
            }

            let Some(logical) = logical_stream_id(&entry.key) else {
                warn!(
                    "[scheduler] key '{}' is neither a stream id nor a rotated key, not rotating",
                    entry.key
                );
                report.skipped += 1;
                continue;
            };
            if logical != entry.stream_id {
                warn!(
                    "[scheduler] key '{}' does not belong to stream '{}', not rotating",
                    entry.key, entry.stream_id
                );
                report.skipped += 1;
                continue;
            }

            let new_key = rotated_key(logical, now);
            if new_key == entry.key {
                debug!("[scheduler] {} already rotated for this hour", entry.key);
                report.skipped += 1;
                continue;
            }

            let registry = self.registry.clone();
            let stream_id = entry.stream_id.clone();
            let queued = self.pool.submit(move || {
                if let Err(err) = registry.rotate(&entry.key, entry.id, &stream_id, &new_key) {
                    warn!(
                        "[scheduler] rotation {} -> {} failed, keeping old file: {}",
                        entry.key, new_key, err
                    );
                }
            });
            if queued {
                report.queued += 1;
            } else {
                report.skipped += 1;
            }
        }

        if report != SweepReport::default() {
            info!(
                "[scheduler] sweep: {} queued, {} reaped, {} skipped",
                report.queued, report.reaped, report.skipped
            );
        }
        report
    }

    /// Blocks until queued rotations finished or `timeout` passed.
    pub fn wait_for_rotations(&self, timeout: Duration) -> bool {
        self.pool.wait_idle(timeout)
    }

    /// Runs the tick loop on its own thread until `running` is cleared.
    pub fn spawn(
        self: Arc<Self>,
        tick: Duration,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("rotation-scheduler".to_string())
            .spawn(move || {
                info!("[scheduler] started (tick {:?})", tick);
                while running.load(Ordering::Relaxed) {
                    self.tick(&Local::now());
                    std::thread::sleep(next_tick_delay(&Local::now(), tick));
                }
                info!("[scheduler] stopped");
            })
    }
}
