use std::fmt;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::recorder::handle::{CreateFileFn, RecordFile, local_files};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordConfig {
    /// Storage root for all recordings.
    pub path: String,
    #[serde(default)]
    pub append: bool,
    #[serde(default)]
    pub auto_record: bool,
    /// Stream prefixes recorded on publish even while `auto_record` is off.
    #[serde(default)]
    pub auto_record_streams: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_ms: u64,
    pub rotation_workers: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub record: RecordConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("read {}", path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate().context("config validation failed")?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.record.path.trim().is_empty() {
            bail!("record.path must not be empty");
        }
        for prefix in &self.record.auto_record_streams {
            if prefix.trim().is_empty() {
                bail!("record.auto_record_streams must not contain empty entries");
            }
        }

        if self.scheduler.tick_ms == 0 || self.scheduler.tick_ms > 1000 {
            bail!(
                "scheduler.tick_ms must be within 1..=1000 (got {})",
                self.scheduler.tick_ms
            );
        }
        if self.scheduler.rotation_workers == 0 {
            bail!("scheduler.rotation_workers must be > 0");
        }

        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.api
            .bind
            .parse()
            .with_context(|| format!("api.bind '{}' is not a socket address", self.api.bind))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.scheduler.tick_ms)
    }
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            path: "record".to_string(),
            append: false,
            auto_record: false,
            auto_record_streams: Vec::new(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            rotation_workers: 4,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            record: RecordConfig::default(),
            scheduler: SchedulerConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

pub type StreamFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Recording settings shared by all components. Everything is fixed at
/// startup except the auto-record flag.
pub struct Settings {
    root: PathBuf,
    append: bool,
    auto_record: AtomicBool,
    filter: Option<StreamFilter>,
    create_file: Option<CreateFileFn>,
}

impl Settings {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            append: false,
            auto_record: AtomicBool::new(false),
            filter: None,
            create_file: None,
        }
    }

    pub fn from_config(config: &RecordConfig) -> Self {
        let mut settings = Self::new(&config.path)
            .with_append(config.append)
            .with_auto_record(config.auto_record);

        if !config.auto_record_streams.is_empty() {
            let prefixes = config.auto_record_streams.clone();
            settings = settings.with_filter(move |stream| {
                prefixes.iter().any(|prefix| stream.starts_with(prefix.as_str()))
            });
        }
        settings
    }

    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn with_auto_record(self, enabled: bool) -> Self {
        self.auto_record.store(enabled, Ordering::SeqCst);
        self
    }

    pub fn with_filter(mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Hands recordings to host-provided storage instead of local files.
    pub fn with_create_file(
        mut self,
        create_file: impl Fn(&Path, bool) -> io::Result<Box<dyn RecordFile>> + Send + Sync + 'static,
    ) -> Self {
        self.create_file = Some(Arc::new(create_file));
        self
    }

    pub fn create_file(&self) -> CreateFileFn {
        self.create_file.clone().unwrap_or_else(local_files)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn append(&self) -> bool {
        self.append
    }

    pub fn auto_record(&self) -> bool {
        self.auto_record.load(Ordering::SeqCst)
    }

    pub fn set_auto_record(&self, enabled: bool) {
        let previous = self.auto_record.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            log::info!("[config] auto_record {} -> {}", previous, enabled);
        }
    }

    pub fn should_auto_record(&self, stream_id: &str) -> bool {
        self.auto_record() || self.filter.as_ref().is_some_and(|filter| filter(stream_id))
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("root", &self.root)
            .field("append", &self.append)
            .field("auto_record", &self.auto_record())
            .field("filter", &self.filter.is_some())
            .field("create_file", &self.create_file.is_some())
            .finish()
    }
}
