//! Registry keys and the files they map to.
//!
//! A key is a root-relative file path without extension. A recording
//! started for `app/name` is keyed `app/name` (`<root>/app/name.flv`); each
//! hourly rotation moves it to `app/name/<YYYY-MM-DD>/<HHMMSS>`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::core::{RecordError, RecordResult};
use crate::flv::FLV_EXTENSION;

/// Segment count of a rotated key.
pub const ROTATED_KEY_SEGMENTS: usize = 4;
const STREAM_ID_SEGMENTS: usize = ROTATED_KEY_SEGMENTS - 2;

pub fn recording_path(root: &Path, key: &str) -> PathBuf {
    root.join(format!("{}.{}", key, FLV_EXTENSION))
}

pub fn rotated_key<Tz: TimeZone>(stream_id: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}/{}", stream_id, at.format("%Y-%m-%d/%H%M%S"))
}

/// Logical stream identifier behind `key`.
///
/// Only two shapes are understood: a 4-segment rotated key (the first two
/// segments are the stream) and a 2-segment key that has not been rotated
/// yet. Anything else returns `None`; callers log and leave such keys alone.
pub fn logical_stream_id(key: &str) -> Option<&str> {
    match key.split('/').count() {
        ROTATED_KEY_SEGMENTS => {
            let (first, rest) = key.split_once('/')?;
            let second = rest.split('/').next()?;
            Some(&key[..first.len() + 1 + second.len()])
        }
        STREAM_ID_SEGMENTS => Some(key),
        _ => None,
    }
}

/// True when `key` is `stream_id` itself or lies below it as whole path
/// components (`live/cam1` matches `live/cam1/2026-10-19/150000`, not
/// `live/cam10`).
pub fn key_matches_stream(key: &str, stream_id: &str) -> bool {
    match key.strip_prefix(stream_id) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Rejects identifiers that are empty, would escape the storage root, or
/// name the same file as another spelling of the identifier. Every `/`
/// separated segment must be a plain name.
pub fn validate_stream_id(stream_id: &str) -> RecordResult<&str> {
    if stream_id.trim().is_empty() {
        return Err(RecordError::invalid_argument("no streamPath"));
    }

    let malformed = stream_id.contains('\\')
        || stream_id
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if malformed {
        return Err(RecordError::invalid_argument(format!(
            "invalid streamPath '{}'",
            stream_id
        )));
    }
    Ok(stream_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_recording_path_appends_extension() {
        assert_eq!(
            recording_path(Path::new("/data"), "live/cam1"),
            PathBuf::from("/data/live/cam1.flv")
        );
    }

    #[test]
    fn test_rotated_key_has_four_segments() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 15, 0, 0).unwrap();
        let key = rotated_key("live/cam1", &at);

        assert_eq!(key, "live/cam1/2026-10-19/150000");
        assert_eq!(key.split('/').count(), ROTATED_KEY_SEGMENTS);
        assert_eq!(logical_stream_id(&key), Some("live/cam1"));
    }

    #[test]
    fn test_logical_stream_id_shapes() {
        assert_eq!(logical_stream_id("live/cam1"), Some("live/cam1"));
        assert_eq!(logical_stream_id("a/b/c/d"), Some("a/b"));
        assert_eq!(logical_stream_id("cam1"), None);
        assert_eq!(logical_stream_id("a/b/c"), None);
        assert_eq!(logical_stream_id("a/b/c/d/e"), None);
    }

    #[test]
    fn test_key_matching_is_per_component() {
        assert!(key_matches_stream("live/cam1", "live/cam1"));
        assert!(key_matches_stream("live/cam1/2026-10-19/150000", "live/cam1"));
        assert!(key_matches_stream("live/cam1/2026-10-19/150000", "live"));
        assert!(!key_matches_stream("live/cam10", "live/cam1"));
        assert!(!key_matches_stream("other/live/cam1", "live/cam1"));
    }

    #[test]
    fn test_stream_id_validation() {
        assert!(validate_stream_id("live/cam1").is_ok());
        assert!(validate_stream_id("").is_err());
        assert!(validate_stream_id("   ").is_err());
        assert!(validate_stream_id("../etc/passwd").is_err());
        assert!(validate_stream_id("live/../../x").is_err());
        assert!(validate_stream_id("/abs/path").is_err());
        assert!(validate_stream_id("./live").is_err());
        assert!(validate_stream_id("live\\cam1").is_err());
    }

    #[test]
    fn test_stream_id_aliases_are_rejected() {
        // alle würden auf <root>/live/cam1.flv zeigen
        for alias in ["live//cam1", "live/./cam1", "live/cam1/.", "/live/cam1"] {
            assert!(validate_stream_id(alias).is_err(), "{}", alias);
        }
        // Datei wäre <root>/live/cam2/.flv
        assert!(validate_stream_id("live/cam2/").is_err());
        assert!(validate_stream_id("cam1").is_ok());
    }
}
