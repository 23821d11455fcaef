use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use crossbeam::channel::{Receiver, Sender, unbounded};
use log::{debug, info, warn};

use crate::bus::MediaBus;
use crate::core::lock::lock_mutex;
use crate::flv::{FlvReader, MediaTag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishEvent {
    pub stream_id: String,
    /// Set when the stream is a replay of a recorded file.
    pub source: Option<PathBuf>,
}

type PublishHook = Arc<dyn Fn(&PublishEvent) + Send + Sync>;

#[derive(Default)]
struct StreamState {
    subscribers: Vec<Sender<MediaTag>>,
    publishing: bool,
}

struct BusInner {
    streams: Mutex<HashMap<String, StreamState>>,
    hooks: Mutex<Vec<PublishHook>>,
    pace_replays: bool,
}

/// In-process media bus: one publisher per stream fanning tags out to any
/// number of subscribers.
#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<BusInner>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_pacing(true)
    }

    /// `pace_replays = false` replays files as fast as they can be read.
    pub fn with_pacing(pace_replays: bool) -> Self {
        Self {
            inner: Arc::new(BusInner {
                streams: Mutex::new(HashMap::new()),
                hooks: Mutex::new(Vec::new()),
                pace_replays,
            }),
        }
    }

    /// Registers a hook that runs for every new publisher, before its first
    /// tag is delivered.
    pub fn on_publish(&self, hook: impl Fn(&PublishEvent) + Send + Sync + 'static) {
        lock_mutex(&self.inner.hooks, "bus.on_publish").push(Arc::new(hook));
    }

    pub fn publish(&self, stream_id: &str) -> anyhow::Result<Publisher> {
        self.register_publisher(stream_id, None)
    }

    pub fn is_publishing(&self, stream_id: &str) -> bool {
        lock_mutex(&self.inner.streams, "bus.is_publishing")
            .get(stream_id)
            .is_some_and(|state| state.publishing)
    }

    pub fn subscriber_count(&self, stream_id: &str) -> usize {
        lock_mutex(&self.inner.streams, "bus.subscriber_count")
            .get(stream_id)
            .map_or(0, |state| state.subscribers.len())
    }

    fn register_publisher(
        &self,
        stream_id: &str,
        source: Option<PathBuf>,
    ) -> anyhow::Result<Publisher> {
        {
            let mut streams = lock_mutex(&self.inner.streams, "bus.register_publisher");
            let state = streams.entry(stream_id.to_string()).or_default();
            if state.publishing {
                bail!("stream '{}' already has a publisher", stream_id);
            }
            state.publishing = true;
        }

        let publisher = Publisher {
            stream_id: stream_id.to_string(),
            inner: self.inner.clone(),
        };

        // Hooks laufen ohne Stream-Lock, sie dürfen selbst abonnieren
        let hooks = lock_mutex(&self.inner.hooks, "bus.hooks_snapshot").clone();
        let event = PublishEvent {
            stream_id: stream_id.to_string(),
            source,
        };
        for hook in hooks {
            hook(&event);
        }

        info!("[bus] publish {}", stream_id);
        Ok(publisher)
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaBus for LocalBus {
    fn subscribe(&self, stream_id: &str) -> anyhow::Result<Receiver<MediaTag>> {
        let (sender, receiver) = unbounded();
        let mut streams = lock_mutex(&self.inner.streams, "bus.subscribe");
        streams
            .entry(stream_id.to_string())
            .or_default()
            .subscribers
            .push(sender);
        debug!("[bus] subscribe {}", stream_id);
        Ok(receiver)
    }

    fn publish_file(&self, stream_id: &str, path: &Path) -> anyhow::Result<()> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let reader = FlvReader::open(BufReader::new(file))
            .with_context(|| format!("read FLV header of {}", path.display()))?;

        let publisher = self.register_publisher(stream_id, Some(path.to_path_buf()))?;
        let pace = self.inner.pace_replays;
        let origin = path.to_path_buf();

        std::thread::Builder::new()
            .name(format!("replay:{}", stream_id))
            .spawn(move || replay(reader, publisher, pace, origin))
            .context("spawn replay thread")?;
        Ok(())
    }
}

fn replay(mut reader: FlvReader<BufReader<File>>, publisher: Publisher, pace: bool, origin: PathBuf) {
    let started = Instant::now();
    let mut first_ts: Option<u32> = None;
    let mut tags: u64 = 0;

    loop {
        let tag = match reader.next_tag() {
            Ok(Some(tag)) => tag,
            Ok(None) => break,
            Err(err) => {
                warn!("[bus] replay of {} aborted: {}", origin.display(), err);
                break;
            }
        };

        if pace {
            let first = *first_ts.get_or_insert(tag.timestamp);
            let offset = Duration::from_millis(u64::from(tag.timestamp.saturating_sub(first)));
            let elapsed = started.elapsed();
            if offset > elapsed {
                std::thread::sleep(offset - elapsed);
            }
        }

        publisher.push(tag);
        tags += 1;
    }

    info!(
        "[bus] replay of {} as {} finished ({} tags)",
        origin.display(),
        publisher.stream_id(),
        tags
    );
}

/// Publishing side of one stream. Dropping it ends the stream for every
/// subscriber.
pub struct Publisher {
    stream_id: String,
    inner: Arc<BusInner>,
}

impl Publisher {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Delivers `tag` to every subscriber; returns how many received it.
    pub fn push(&self, tag: MediaTag) -> usize {
        let mut streams = lock_mutex(&self.inner.streams, "bus.push");
        let Some(state) = streams.get_mut(&self.stream_id) else {
            return 0;
        };
        state
            .subscribers
            .retain(|subscriber| subscriber.send(tag.clone()).is_ok());
        state.subscribers.len()
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        let mut streams = lock_mutex(&self.inner.streams, "bus.unpublish");
        streams.remove(&self.stream_id);
        info!("[bus] unpublish {}", self.stream_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flv::{TagKind, write_header, write_tag};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_tags_fan_out_to_all_subscribers() {
        let bus = LocalBus::new();
        let first = bus.subscribe("live/cam1").unwrap();
        let second = bus.subscribe("live/cam1").unwrap();
        let publisher = bus.publish("live/cam1").unwrap();

        let reached = publisher.push(MediaTag::new(TagKind::Audio, 1, vec![1u8]));
        assert_eq!(reached, 2);
        assert_eq!(first.recv().unwrap().timestamp, 1);
        assert_eq!(second.recv().unwrap().timestamp, 1);
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let bus = LocalBus::new();
        let kept = bus.subscribe("live/cam1").unwrap();
        drop(bus.subscribe("live/cam1").unwrap());
        let publisher = bus.publish("live/cam1").unwrap();

        assert_eq!(publisher.push(MediaTag::new(TagKind::Video, 0, vec![0u8])), 1);
        assert_eq!(bus.subscriber_count("live/cam1"), 1);
        drop(kept);
    }

    #[test]
    fn test_unpublish_disconnects_subscribers() {
        let bus = LocalBus::new();
        let receiver = bus.subscribe("live/cam1").unwrap();
        let publisher = bus.publish("live/cam1").unwrap();
        assert!(bus.is_publishing("live/cam1"));

        drop(publisher);
        assert!(!bus.is_publishing("live/cam1"));
        assert!(receiver.recv().is_err());
    }

    #[test]
    fn test_second_publisher_is_rejected() {
        let bus = LocalBus::new();
        let _publisher = bus.publish("live/cam1").unwrap();
        assert!(bus.publish("live/cam1").is_err());
    }

    #[test]
    fn test_hooks_run_before_first_tag() {
        let bus = LocalBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = calls.clone();
        let hook_bus = bus.clone();
        let received = Arc::new(Mutex::new(None));
        let slot = received.clone();
        bus.on_publish(move |event| {
            hook_calls.fetch_add(1, Ordering::SeqCst);
            assert!(event.source.is_none());
            *slot.lock().unwrap() = Some(hook_bus.subscribe(&event.stream_id).unwrap());
        });

        let publisher = bus.publish("live/cam1").unwrap();
        publisher.push(MediaTag::new(TagKind::Audio, 7, vec![7u8]));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let receiver = received.lock().unwrap().take().unwrap();
        assert_eq!(receiver.recv().unwrap().timestamp, 7);
    }

    #[test]
    fn test_publish_file_replays_every_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.flv");
        let mut buf = Vec::new();
        write_header(&mut buf).unwrap();
        for ts in [0u32, 40, 80] {
            write_tag(&mut buf, TagKind::Video, ts, b"frame").unwrap();
        }
        std::fs::write(&path, buf).unwrap();

        let bus = LocalBus::with_pacing(false);
        let receiver = bus.subscribe("vod/clip").unwrap();
        bus.publish_file("vod/clip", &path).unwrap();

        let timestamps: Vec<u32> = receiver.iter().map(|tag| tag.timestamp).collect();
        assert_eq!(timestamps, vec![0, 40, 80]);
    }

    #[test]
    fn test_publish_missing_file_fails_without_publishing() {
        let dir = tempfile::tempdir().unwrap();
        let bus = LocalBus::new();
        assert!(bus.publish_file("vod/none", &dir.path().join("none.flv")).is_err());
        assert!(!bus.is_publishing("vod/none"));
    }
}
