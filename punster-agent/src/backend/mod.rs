//! Backends for the Punster API.
//!
//! - HTTP client for a running Punster API
//! - Mock backend for testing

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpBackend;
pub use mock::MockBackend;
pub use traits::{PunCreationService, PunEvaluationService, PunsterError};
