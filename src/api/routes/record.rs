use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;

use crate::api::ApiState;
use crate::core::RecordError;
use crate::recorder::ActiveRecording;

const SUCCESS: &str = "success";
const NO_STREAM_PATH: &str = "no streamPath";
const NO_SUCH_STREAM: &str = "no such stream";
const NO_QUERY_STREAM: &str = "no query stream";
const NO_SUCH_FILE: &str = "no such file";

#[derive(Debug, Default, Deserialize)]
pub struct RecordQuery {
    #[serde(rename = "streamPath", default)]
    pub stream_path: String,
    #[serde(default)]
    pub append: String,
}

impl RecordQuery {
    fn stream(&self) -> Option<String> {
        let stream = self.stream_path.trim();
        (!stream.is_empty()).then(|| stream.to_string())
    }

    fn append(&self) -> bool {
        self.append == "true"
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AutoRecordQuery {
    #[serde(default)]
    pub enable: Option<String>,
}

// Registry und Dateisystem blockieren, deshalb ab in den Blocking-Pool
async fn blocking<T, F>(work: F) -> Result<T, String>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| format!("internal error: {}", err))
}

fn outcome(result: Result<Result<(), RecordError>, String>) -> String {
    match result {
        Ok(Ok(())) => SUCCESS.to_string(),
        Ok(Err(err)) => err.to_string(),
        Err(message) => message,
    }
}

pub async fn list(State(state): State<ApiState>) -> Response {
    let recorder = state.recorder.clone();
    match blocking(move || recorder.list()).await {
        Ok(Ok(files)) => Json(files).into_response(),
        Ok(Err(err)) => {
            warn!("[api] list failed: {}", err);
            Json(json!({ "err": err.to_string() })).into_response()
        }
        Err(message) => Json(json!({ "err": message })).into_response(),
    }
}

pub async fn active(State(state): State<ApiState>) -> Json<Vec<ActiveRecording>> {
    Json(state.recorder.active())
}

pub async fn start(State(state): State<ApiState>, Query(query): Query<RecordQuery>) -> String {
    let Some(stream) = query.stream() else {
        return NO_STREAM_PATH.to_string();
    };
    let append = query.append();
    debug!("[api] start {} (append={})", stream, append);

    let recorder = state.recorder.clone();
    outcome(blocking(move || recorder.start(&stream, append)).await)
}

pub async fn stop(State(state): State<ApiState>, Query(query): Query<RecordQuery>) -> String {
    let Some(stream) = query.stream() else {
        return NO_SUCH_STREAM.to_string();
    };

    let recorder = state.recorder.clone();
    match blocking(move || recorder.stop(&stream)).await {
        Ok(Ok(_)) => SUCCESS.to_string(),
        Ok(Err(RecordError::NotRecording { .. })) => NO_QUERY_STREAM.to_string(),
        Ok(Err(err)) => err.to_string(),
        Err(message) => message,
    }
}

pub async fn play(State(state): State<ApiState>, Query(query): Query<RecordQuery>) -> String {
    let Some(stream) = query.stream() else {
        return NO_STREAM_PATH.to_string();
    };

    let recorder = state.recorder.clone();
    outcome(blocking(move || recorder.play(&stream)).await)
}

pub async fn delete(State(state): State<ApiState>, Query(query): Query<RecordQuery>) -> String {
    let Some(stream) = query.stream() else {
        return NO_STREAM_PATH.to_string();
    };

    let recorder = state.recorder.clone();
    match blocking(move || recorder.delete(&stream)).await {
        Ok(Err(RecordError::NotFound { .. })) => NO_SUCH_FILE.to_string(),
        result => outcome(result),
    }
}

/// Reads the auto-record flag, or switches it with `enable=true|false`.
pub async fn auto_record(
    State(state): State<ApiState>,
    Query(query): Query<AutoRecordQuery>,
) -> String {
    match query.enable.as_deref() {
        None => state.recorder.auto_record().to_string(),
        Some("true") => {
            state.recorder.set_auto_record(true);
            SUCCESS.to_string()
        }
        Some("false") => {
            state.recorder.set_auto_record(false);
            SUCCESS.to_string()
        }
        Some(other) => format!("invalid enable '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_only_for_literal_true() {
        let query = |append: &str| RecordQuery {
            stream_path: "live/cam1".to_string(),
            append: append.to_string(),
        };
        assert!(query("true").append());
        assert!(!query("1").append());
        assert!(!query("TRUE").append());
        assert!(!query("").append());
    }

    #[test]
    fn test_blank_stream_path_is_missing() {
        let query = RecordQuery {
            stream_path: "  ".to_string(),
            append: String::new(),
        };
        assert_eq!(query.stream(), None);
    }

    #[test]
    fn test_outcome_texts() {
        assert_eq!(outcome(Ok(Ok(()))), "success");
        assert_eq!(
            outcome(Ok(Err(RecordError::already_recording("live/cam1")))),
            "stream 'live/cam1' is already recording"
        );
        assert_eq!(outcome(Err("internal error: x".to_string())), "internal error: x");
    }
}
