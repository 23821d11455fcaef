pub mod routes;
pub mod service;

pub use service::{ApiService, ApiState, router};
