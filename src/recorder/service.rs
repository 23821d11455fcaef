use std::fs;
use std::sync::{Arc, Weak};

use log::{debug, info, warn};

use crate::bus::{LocalBus, MediaBus, PublishEvent};
use crate::config::Settings;
use crate::core::{RecordError, RecordResult};
use crate::recorder::index::{self, RecordedFile};
use crate::recorder::keys::{recording_path, validate_stream_id};
use crate::recorder::registry::{ActiveRecording, Registry};

/// Control surface of the recorder: the operations behind the HTTP routes
/// and the publish hook.
pub struct Recorder {
    settings: Arc<Settings>,
    registry: Arc<Registry>,
    bus: Arc<dyn MediaBus>,
}

impl Recorder {
    pub fn new(settings: Arc<Settings>, bus: Arc<dyn MediaBus>) -> Self {
        let registry = Arc::new(
            Registry::new(settings.root(), bus.clone()).with_create_file(settings.create_file()),
        );
        Self {
            settings,
            registry,
            bus,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn list(&self) -> RecordResult<Vec<RecordedFile>> {
        index::walk(self.settings.root())
    }

    pub fn active(&self) -> Vec<ActiveRecording> {
        self.registry.active()
    }

    pub fn start(&self, stream_id: &str, append: bool) -> RecordResult<()> {
        let stream_id = validate_stream_id(stream_id)?;
        self.registry.start(stream_id, append)
    }

    pub fn stop(&self, stream_id: &str) -> RecordResult<usize> {
        let stream_id = validate_stream_id(stream_id)?;
        self.registry.stop(stream_id)
    }

    pub fn is_recording(&self, stream_id: &str) -> bool {
        self.registry.is_recording(stream_id)
    }

    /// Removes `<root>/<stream_id>.flv`. A missing file is `NotFound` and
    /// nothing is touched.
    pub fn delete(&self, stream_id: &str) -> RecordResult<()> {
        let stream_id = validate_stream_id(stream_id)?;
        let path = recording_path(self.settings.root(), stream_id);
        if !path.is_file() {
            return Err(RecordError::NotFound { path });
        }
        fs::remove_file(&path)
            .map_err(|err| RecordError::io(format!("remove {}", path.display()), err))?;
        info!("[recorder] deleted {}", path.display());
        Ok(())
    }

    /// Publishes the recorded file back onto the bus under `stream_id`.
    pub fn play(&self, stream_id: &str) -> RecordResult<()> {
        let stream_id = validate_stream_id(stream_id)?;
        let path = recording_path(self.settings.root(), stream_id);
        if !path.is_file() {
            return Err(RecordError::NotFound { path });
        }
        self.bus
            .publish_file(stream_id, &path)
            .map_err(|err| RecordError::media(format!("play {}", stream_id), err))?;
        info!("[recorder] playing {}", path.display());
        Ok(())
    }

    /// Publish hook. Starts recording a new live stream when auto-record is
    /// on or the stream filter accepts it. Replays of recorded files are
    /// never recorded.
    pub fn on_publish(&self, event: &PublishEvent) {
        if event.source.is_some() {
            debug!("[recorder] {} is a replay, not recording", event.stream_id);
            return;
        }
        if !self.settings.should_auto_record(&event.stream_id) {
            return;
        }

        match self.start(&event.stream_id, self.settings.append()) {
            Ok(()) => info!("[recorder] auto-recording {}", event.stream_id),
            Err(err) if err.is_already_recording() => {
                debug!("[recorder] {} already recording", event.stream_id)
            }
            Err(err) => warn!("[recorder] auto-record of {} failed: {}", event.stream_id, err),
        }
    }

    pub fn auto_record(&self) -> bool {
        self.settings.auto_record()
    }

    pub fn set_auto_record(&self, enabled: bool) {
        self.settings.set_auto_record(enabled);
    }

    /// Closes every recording.
    pub fn shutdown(&self) -> usize {
        let closed = self.registry.stop_all();
        info!("[recorder] shutdown closed {} recordings", closed);
        closed
    }
}

/// Routes publish events of `bus` into `recorder`. The hook holds only a weak
/// reference, so it goes quiet once the recorder is dropped.
pub fn install_publish_hook(bus: &LocalBus, recorder: &Arc<Recorder>) {
    let recorder: Weak<Recorder> = Arc::downgrade(recorder);
    bus.on_publish(move |event| {
        if let Some(recorder) = recorder.upgrade() {
            recorder.on_publish(event);
        }
    });
}
