use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Local};
use crossbeam::channel::{Receiver, Sender, bounded, select};
use tokio_util::sync::CancellationToken;

use crate::bus::MediaBus;
use crate::core::{ComponentLogger, LogContext, RecordError, RecordResult};
use crate::flv::{self, MediaTag};

static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// How often an idle writer looks at its cancellation token.
const TOKEN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Storage a recording writes into. It must be readable so an appending
/// recording can find the duration already stored.
pub trait RecordFile: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> RecordFile for T {}

/// Opens the target of a recording for `(path, append)`. With `append` the
/// existing content is kept, otherwise it is truncated.
pub type CreateFileFn = Arc<dyn Fn(&Path, bool) -> io::Result<Box<dyn RecordFile>> + Send + Sync>;

/// Local filesystem storage, creating parent directories as needed.
pub fn create_local_file(path: &Path, append: bool) -> io::Result<Box<dyn RecordFile>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut options = OpenOptions::new();
    options.read(true).create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    Ok(Box::new(options.open(path)?))
}

pub fn local_files() -> CreateFileFn {
    Arc::new(create_local_file)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub tags: u64,
    pub bytes: u64,
}

/// One open recording: a target file fed by a bus subscription on a
/// dedicated writer thread.
///
/// The cancellation token is cancelled by `close`, and by the writer itself
/// when the subscription ends or a write fails. `is_cancelled` therefore
/// tells whether the recording is still alive without blocking.
pub struct RecordingHandle {
    id: u64,
    stream_id: String,
    key: String,
    path: PathBuf,
    token: CancellationToken,
    created_at: DateTime<Local>,
    stop: Option<Sender<()>>,
    writer: Option<JoinHandle<io::Result<WriteStats>>>,
}

impl RecordingHandle {
    pub fn open(
        bus: &dyn MediaBus,
        create_file: &CreateFileFn,
        stream_id: &str,
        key: &str,
        path: &Path,
        append: bool,
    ) -> RecordResult<Self> {
        let subscription = bus
            .subscribe(stream_id)
            .map_err(|err| RecordError::media(format!("subscribe {}", stream_id), err))?;
        let sink = create_file(path, append)
            .and_then(|file| FlvSink::open(file, append))
            .map_err(|err| RecordError::io(format!("open {}", path.display()), err))?;

        let token = CancellationToken::new();
        let (stop, stop_rx) = bounded(1);
        let ctx = LogContext::new("recording", key).with_stream(stream_id);

        let writer = std::thread::Builder::new()
            .name(format!("record:{}", key))
            .spawn({
                let token = token.clone();
                move || run_writer(sink, subscription, stop_rx, token, ctx)
            })
            .map_err(|err| RecordError::io(format!("spawn writer for {}", key), err))?;

        let handle = Self {
            id: HANDLE_COUNTER.fetch_add(1, Ordering::Relaxed),
            stream_id: stream_id.to_string(),
            key: key.to_string(),
            path: path.to_path_buf(),
            token,
            created_at: Local::now(),
            stop: Some(stop),
            writer: Some(writer),
        };
        handle.info(&format!(
            "recording to {} ({})",
            handle.path.display(),
            if append { "append" } else { "truncate" }
        ));
        Ok(handle)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stops the writer, flushes the file and ends the subscription. Tags
    /// already delivered to this handle are written before it returns.
    pub fn close(mut self) -> RecordResult<WriteStats> {
        self.token.cancel();
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }

        let Some(writer) = self.writer.take() else {
            return Ok(WriteStats::default());
        };
        let result = writer
            .join()
            .map_err(|_| {
                RecordError::io(
                    format!("close {}", self.path.display()),
                    io::Error::other("writer thread panicked"),
                )
            })?
            .map_err(|err| RecordError::io(format!("write {}", self.path.display()), err));

        match &result {
            Ok(stats) => self.info(&format!("closed ({} tags, {} bytes)", stats.tags, stats.bytes)),
            Err(err) => self.warn(&format!("closed with error: {}", err)),
        }
        result
    }
}

impl ComponentLogger for RecordingHandle {
    fn log_context(&self) -> LogContext {
        LogContext::new("recording", &self.key).with_stream(&self.stream_id)
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        // Nicht geschlossene Handles beenden wenigstens den Writer
        self.token.cancel();
    }
}

impl std::fmt::Debug for RecordingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingHandle")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("key", &self.key)
            .field("path", &self.path)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

enum WriterStep {
    Tag(MediaTag),
    Ended,
    Stop,
    Idle,
}

fn run_writer(
    mut sink: FlvSink,
    subscription: Receiver<MediaTag>,
    stop: Receiver<()>,
    token: CancellationToken,
    ctx: LogContext,
) -> io::Result<WriteStats> {
    loop {
        let step = select! {
            recv(subscription) -> msg => match msg {
                Ok(tag) => WriterStep::Tag(tag),
                Err(_) => WriterStep::Ended,
            },
            recv(stop) -> _ => WriterStep::Stop,
            default(TOKEN_POLL_INTERVAL) => WriterStep::Idle,
        };

        match step {
            WriterStep::Tag(tag) => {
                if let Err(err) = sink.write(&tag) {
                    log::error!("{}", ctx.format(&format!("write failed: {}", err)));
                    token.cancel();
                    let _ = sink.finish();
                    return Err(err);
                }
            }
            WriterStep::Ended => {
                log::info!("{}", ctx.format("subscription ended"));
                token.cancel();
                break;
            }
            WriterStep::Stop => break,
            WriterStep::Idle => {
                if token.is_cancelled() {
                    break;
                }
            }
        }
    }

    // bereits zugestellte Tags noch schreiben
    while let Ok(tag) = subscription.try_recv() {
        sink.write(&tag)?;
    }

    sink.finish()
}

/// FLV file being written. Timestamps are rebased so each session starts at
/// the file's current duration (0 for a fresh file).
struct FlvSink {
    writer: BufWriter<Box<dyn RecordFile>>,
    offset: u32,
    base: Option<u32>,
    stats: WriteStats,
}

impl FlvSink {
    fn open(mut file: Box<dyn RecordFile>, append: bool) -> io::Result<Self> {
        let mut offset = 0;
        let mut stats = WriteStats::default();

        let len = file.seek(SeekFrom::End(0))?;
        if append && len > 0 {
            offset = flv::read_duration(&mut file)?;
            file.seek(SeekFrom::End(0))?;
        } else if len > 0 {
            return Err(io::Error::other("recording target was not truncated"));
        } else {
            flv::write_header(&mut file)?;
            stats.bytes = flv::FLV_PREAMBLE_LEN;
        }

        Ok(Self {
            writer: BufWriter::new(file),
            offset,
            base: None,
            stats,
        })
    }

    fn write(&mut self, tag: &MediaTag) -> io::Result<()> {
        let base = *self.base.get_or_insert(tag.timestamp);
        let timestamp = self
            .offset
            .saturating_add(tag.timestamp.saturating_sub(base));
        self.stats.bytes += flv::write_tag(&mut self.writer, tag.kind, timestamp, &tag.data)?;
        self.stats.tags += 1;
        Ok(())
    }

    fn finish(mut self) -> io::Result<WriteStats> {
        self.writer.flush()?;
        Ok(self.stats)
    }
}
