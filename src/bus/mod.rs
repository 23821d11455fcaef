use std::path::Path;

use crossbeam::channel::Receiver;

use crate::flv::MediaTag;

pub mod local;

pub use local::{LocalBus, PublishEvent, Publisher};

/// The media pipeline as seen by the recorder.
///
/// A subscription delivers the tags of one live stream until the publisher
/// goes away (the receiver then reports disconnection) or the subscriber
/// drops its receiver.
pub trait MediaBus: Send + Sync {
    fn subscribe(&self, stream_id: &str) -> anyhow::Result<Receiver<MediaTag>>;

    /// Publishes a recorded FLV file as the live stream `stream_id`.
    fn publish_file(&self, stream_id: &str, path: &Path) -> anyhow::Result<()>;
}
