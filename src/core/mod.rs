pub mod error;
pub mod lock;
pub mod logging;

pub use error::{RecordError, RecordResult};
pub use logging::{ComponentLogger, LogContext};
