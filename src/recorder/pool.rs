use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{Sender, unbounded};
use log::{debug, error, warn};

use crate::core::lock::lock_mutex;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pending-job counter the pool's callers can wait on.
struct Pending {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Pending {
    fn finish(&self) {
        let mut count = lock_mutex(&self.count, "rotation_pool.finish");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.condvar.notify_all();
        }
    }
}

/// Fixed set of worker threads that run rotation jobs.
///
/// Submitting never blocks and never spawns a thread; jobs queue on an
/// unbounded channel until a worker is free.
pub struct RotationPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<Pending>,
}

impl RotationPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Job>();
        let pending = Arc::new(Pending {
            count: Mutex::new(0),
            condvar: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = receiver.clone();
            let pending = pending.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("rotation-{}", index))
                .spawn(move || {
                    for job in receiver.iter() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("[rotation] job panicked on worker {}", index);
                        }
                        pending.finish();
                    }
                    debug!("[rotation] worker {} exiting", index);
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => error!("[rotation] failed to spawn worker {}: {}", index, err),
            }
        }

        Self {
            sender: Some(sender),
            workers,
            pending,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues `job`. Returns false if the pool has no workers left to run it.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        let Some(sender) = self.sender.as_ref().filter(|_| !self.workers.is_empty()) else {
            warn!("[rotation] no workers available, job dropped");
            return false;
        };

        *lock_mutex(&self.pending.count, "rotation_pool.submit") += 1;
        if sender.send(Box::new(job)).is_err() {
            self.pending.finish();
            return false;
        }
        true
    }

    pub fn pending(&self) -> usize {
        *lock_mutex(&self.pending.count, "rotation_pool.pending")
    }

    /// Blocks until every submitted job finished or `timeout` passed.
    /// Returns true when the pool is idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = lock_mutex(&self.pending.count, "rotation_pool.wait_idle");
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            count = match self.pending.condvar.wait_timeout(count, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

impl Drop for RotationPool {
    fn drop(&mut self) {
        // Kanal schliessen, Worker laufen die Queue leer und beenden sich
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("[rotation] worker thread panicked");
            }
        }
    }
}
