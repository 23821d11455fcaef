use std::sync::atomic::{AtomicU64, Ordering};

// Globale Sequenznummer für Korrelation
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub stream: Option<String>,
    pub sequence: u64,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            stream: None,
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn with_stream(mut self, stream: &str) -> Self {
        self.stream = Some(stream.to_string());
        self
    }

    pub fn format(&self, message: &str) -> String {
        let stream_info = match &self.stream {
            Some(stream) => format!(" stream={}", stream),
            None => String::new(),
        };

        format!(
            "[{}:{}{}][seq={:06}] {}",
            self.component, self.instance_id, stream_info, self.sequence, message
        )
    }
}

/// Einheitliches Logging für Komponenten mit eigener Identität.
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        log::debug!("{}", self.log_context().format(message));
    }

    fn info(&self, message: &str) {
        log::info!("{}", self.log_context().format(message));
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", self.log_context().format(message));
    }

    fn error(&self, message: &str) {
        log::error!("{}", self.log_context().format(message));
    }
}
