use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use crossbeam::channel::{Receiver, Sender, unbounded};

use crate::bus::MediaBus;
use crate::core::lock::lock_mutex;
use crate::flv::MediaTag;

/// Scriptable media bus for tests: tags are pushed by hand, streams can be
/// ended and subscriptions made to fail.
#[derive(Default)]
pub struct MockBus {
    streams: Mutex<HashMap<String, Vec<Sender<MediaTag>>>>,
    fail_subscriptions: AtomicBool,
    published: Mutex<Vec<(String, PathBuf)>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `tag` to the live subscribers of `stream_id` and returns how
    /// many received it.
    pub fn push(&self, stream_id: &str, tag: MediaTag) -> usize {
        let mut streams = lock_mutex(&self.streams, "mock_bus.push");
        let Some(subscribers) = streams.get_mut(stream_id) else {
            return 0;
        };
        subscribers.retain(|subscriber| subscriber.send(tag.clone()).is_ok());
        subscribers.len()
    }

    /// Ends the stream as if its publisher went away.
    pub fn end_stream(&self, stream_id: &str) {
        lock_mutex(&self.streams, "mock_bus.end_stream").remove(stream_id);
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.fail_subscriptions.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, PathBuf)> {
        lock_mutex(&self.published, "mock_bus.published").clone()
    }
}

impl MediaBus for MockBus {
    fn subscribe(&self, stream_id: &str) -> Result<Receiver<MediaTag>> {
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            bail!("subscriptions to '{}' are disabled", stream_id);
        }
        let (sender, receiver) = unbounded();
        lock_mutex(&self.streams, "mock_bus.subscribe")
            .entry(stream_id.to_string())
            .or_default()
            .push(sender);
        Ok(receiver)
    }

    fn publish_file(&self, stream_id: &str, path: &Path) -> Result<()> {
        if !path.is_file() {
            bail!("{} does not exist", path.display());
        }
        lock_mutex(&self.published, "mock_bus.publish_file")
            .push((stream_id.to_string(), path.to_path_buf()));
        Ok(())
    }
}
