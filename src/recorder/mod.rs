// src/recorder/mod.rs

pub mod handle;
pub mod index;
pub mod keys;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod service;

pub use handle::{RecordingHandle, WriteStats};
pub use index::{RecordedFile, walk};
pub use pool::RotationPool;
pub use registry::{ActiveRecording, EntrySnapshot, Registry};
pub use scheduler::{RotationScheduler, SweepReport};
pub use service::{Recorder, install_publish_hook};
