use std::path::PathBuf;

use thiserror::Error;

pub type RecordResult<T> = Result<T, RecordError>;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("stream '{stream}' is already recording")]
    AlreadyRecording { stream: String },
    #[error("stream '{stream}' is not recording")]
    NotRecording { stream: String },
    #[error("{} not found", .path.display())]
    NotFound { path: PathBuf },
    #[error("{message}")]
    InvalidArgument { message: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Media {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl RecordError {
    pub fn already_recording(stream: impl Into<String>) -> Self {
        Self::AlreadyRecording {
            stream: stream.into(),
        }
    }

    pub fn not_recording(stream: impl Into<String>) -> Self {
        Self::NotRecording {
            stream: stream.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn media(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Media {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn is_already_recording(&self) -> bool {
        matches!(self, Self::AlreadyRecording { .. })
    }
}
