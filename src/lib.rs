// src/lib.rs
pub mod api;
pub mod bus;
pub mod config;
pub mod core;
pub mod flv;
pub mod recorder;
pub mod testing;

// Re-export die wichtigsten Typen
pub use bus::{LocalBus, MediaBus, PublishEvent};
pub use config::{Config, Settings};
pub use crate::core::{ComponentLogger, LogContext, RecordError, RecordResult};
pub use recorder::{Recorder, Registry, RotationScheduler};
