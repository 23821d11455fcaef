use std::sync::{Mutex, MutexGuard};

fn log_poisoned(context: &str) {
    log::error!("Mutex lock poisoned in {}", context);
}

/// Locks `mutex`, recovering the guard if a previous holder panicked.
/// `context` names the call site in the log line.
pub fn lock_mutex<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log_poisoned(context);
            poisoned.into_inner()
        }
    }
}
