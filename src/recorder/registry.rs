use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde::Serialize;

use crate::bus::MediaBus;
use crate::core::lock::lock_mutex;
use crate::core::{RecordError, RecordResult};
use crate::recorder::handle::{CreateFileFn, RecordingHandle, local_files};
use crate::recorder::keys::{key_matches_stream, recording_path, validate_stream_id};

/// Point-in-time view of one registry entry, used by the rotation sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub key: String,
    pub id: u64,
    pub stream_id: String,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActiveRecording {
    pub stream_path: String,
    pub key: String,
    pub path: PathBuf,
    pub start_time: String,
}

/// All active recordings, keyed by recording key.
///
/// Every operation runs under one mutex, so start, stop, rotation and
/// reaping are linearizable. At most one live handle exists per stream.
/// Handles are closed while the lock is held, which keeps each file owned by
/// exactly one writer even when a stop races a start for the same path.
pub struct Registry {
    root: PathBuf,
    bus: Arc<dyn MediaBus>,
    create_file: CreateFileFn,
    entries: Mutex<BTreeMap<String, RecordingHandle>>,
}

impl Registry {
    pub fn new(root: impl Into<PathBuf>, bus: Arc<dyn MediaBus>) -> Self {
        Self {
            root: root.into(),
            bus,
            create_file: local_files(),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Replaces the local filesystem as the target of new recordings.
    pub fn with_create_file(mut self, create_file: CreateFileFn) -> Self {
        self.create_file = create_file;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts recording `stream_id` into `<root>/<stream_id>.flv`.
    ///
    /// Fails with `AlreadyRecording` while a live handle exists for the
    /// stream; handles whose recording already ended are replaced.
    pub fn start(&self, stream_id: &str, append: bool) -> RecordResult<()> {
        let stream_id = validate_stream_id(stream_id)?;
        let mut entries = lock_mutex(&self.entries, "registry.start");

        if entries
            .values()
            .any(|handle| handle.stream_id() == stream_id && !handle.is_cancelled())
        {
            return Err(RecordError::already_recording(stream_id));
        }

        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, handle)| handle.stream_id() == stream_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            if let Some(handle) = entries.remove(&key) {
                info!("[registry] replacing ended recording {}", key);
                close_logged(handle);
            }
        }

        if entries.contains_key(stream_id) {
            return Err(RecordError::already_recording(stream_id));
        }

        let path = recording_path(&self.root, stream_id);
        let handle = RecordingHandle::open(
            self.bus.as_ref(),
            &self.create_file,
            stream_id,
            stream_id,
            &path,
            append,
        )?;
        entries.insert(stream_id.to_string(), handle);
        Ok(())
    }

    /// Stops every recording keyed by `stream_id` or by a key below it.
    /// Returns the number of recordings closed.
    pub fn stop(&self, stream_id: &str) -> RecordResult<usize> {
        let mut entries = lock_mutex(&self.entries, "registry.stop");

        let matching: Vec<String> = entries
            .keys()
            .filter(|key| key_matches_stream(key, stream_id))
            .cloned()
            .collect();
        if matching.is_empty() {
            return Err(RecordError::not_recording(stream_id));
        }

        for key in &matching {
            if let Some(handle) = entries.remove(key) {
                close_logged(handle);
            }
        }
        info!("[registry] stopped {} ({} recordings)", stream_id, matching.len());
        Ok(matching.len())
    }

    pub fn is_recording(&self, stream_id: &str) -> bool {
        lock_mutex(&self.entries, "registry.is_recording")
            .values()
            .any(|handle| handle.stream_id() == stream_id && !handle.is_cancelled())
    }

    /// Moves the recording under `old_key` onto a new file keyed `new_key`.
    ///
    /// The new handle is opened first, without holding the lock. It replaces
    /// the old one only if `old_key` still holds handle `old_id`; otherwise
    /// the new handle is discarded and `NotRecording` is returned. The old
    /// handle is closed only after the swap.
    pub fn rotate(
        &self,
        old_key: &str,
        old_id: u64,
        stream_id: &str,
        new_key: &str,
    ) -> RecordResult<()> {
        {
            let entries = lock_mutex(&self.entries, "registry.rotate.check");
            match entries.get(old_key) {
                Some(handle) if handle.id() == old_id => {}
                _ => return Err(RecordError::not_recording(stream_id)),
            }
            if entries.contains_key(new_key) {
                return Err(RecordError::already_recording(new_key));
            }
        }

        let path = recording_path(&self.root, new_key);
        let next = RecordingHandle::open(
            self.bus.as_ref(),
            &self.create_file,
            stream_id,
            new_key,
            &path,
            false,
        )?;

        let mut entries = lock_mutex(&self.entries, "registry.rotate.swap");
        let still_current = entries
            .get(old_key)
            .is_some_and(|handle| handle.id() == old_id);
        if !still_current || entries.contains_key(new_key) {
            drop(entries);
            debug!("[registry] rotation of {} lost a race, discarding {}", old_key, new_key);
            close_logged(next);
            return Err(RecordError::not_recording(stream_id));
        }

        entries.insert(new_key.to_string(), next);
        if let Some(previous) = entries.remove(old_key) {
            close_logged(previous);
        }
        info!("[registry] rotated {} -> {}", old_key, new_key);
        Ok(())
    }

    /// Removes and closes the entry `key` if it still holds handle `id`.
    pub fn reap(&self, key: &str, id: u64) -> bool {
        let mut entries = lock_mutex(&self.entries, "registry.reap");
        if !entries.get(key).is_some_and(|handle| handle.id() == id) {
            return false;
        }
        if let Some(handle) = entries.remove(key) {
            close_logged(handle);
        }
        true
    }

    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        lock_mutex(&self.entries, "registry.snapshot")
            .iter()
            .map(|(key, handle)| EntrySnapshot {
                key: key.clone(),
                id: handle.id(),
                stream_id: handle.stream_id().to_string(),
                cancelled: handle.is_cancelled(),
            })
            .collect()
    }

    pub fn active(&self) -> Vec<ActiveRecording> {
        lock_mutex(&self.entries, "registry.active")
            .iter()
            .filter(|(_, handle)| !handle.is_cancelled())
            .map(|(key, handle)| ActiveRecording {
                stream_path: handle.stream_id().to_string(),
                key: key.clone(),
                path: handle.path().to_path_buf(),
                start_time: handle.created_at().to_rfc3339(),
            })
            .collect()
    }

    /// Closes every recording. Used on shutdown.
    pub fn stop_all(&self) -> usize {
        let mut entries = lock_mutex(&self.entries, "registry.stop_all");
        let drained = std::mem::take(&mut *entries);
        let count = drained.len();
        for (_, handle) in drained {
            close_logged(handle);
        }
        count
    }

    pub fn len(&self) -> usize {
        lock_mutex(&self.entries, "registry.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn close_logged(handle: RecordingHandle) {
    let key = handle.key().to_string();
    if let Err(err) = handle.close() {
        warn!("[registry] closing {} failed: {}", key, err);
    }
}
