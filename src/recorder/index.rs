use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::core::{RecordError, RecordResult};
use crate::flv::{self, FLV_EXTENSION};

/// One recorded file below the storage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordedFile {
    /// Root-relative path with `/` separators.
    pub path: String,
    pub size: u64,
    /// Milliseconds.
    pub duration: u32,
}

/// Lists every FLV file below `root`.
///
/// Any error aborts the whole walk; a partial listing is never returned.
pub fn walk(root: &Path) -> RecordResult<Vec<RecordedFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            let source = err
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            RecordError::io(format!("walk {}", path.display()), source)
        })?;

        if !entry.file_type().is_file() || !is_flv(entry.path()) {
            continue;
        }

        let metadata = entry
            .metadata()
            .map_err(|err| RecordError::io(format!("stat {}", entry.path().display()), err.into()))?;
        let duration = file_duration(entry.path())
            .map_err(|err| RecordError::io(format!("read {}", entry.path().display()), err))?;

        files.push(RecordedFile {
            path: relative_key(root, entry.path()),
            size: metadata.len(),
            duration,
        });
    }

    Ok(files)
}

fn is_flv(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == FLV_EXTENSION)
}

fn file_duration(path: &Path) -> std::io::Result<u32> {
    let mut reader = BufReader::new(File::open(path)?);
    flv::read_duration(&mut reader)
}

fn relative_key(root: &Path, path: &Path) -> String {
    let relative: PathBuf = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
