//! Punster Agent - collaborators of the Pun Distribution Network
//!
//! Provides the records exchanged with the Punster API and the services
//! that create and evaluate puns:
//! - Trait-based creation/evaluation services
//! - HTTP backend for a running Punster API
//! - Mock backend for tests and offline runs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Delivery Orchestrator            │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌─────────────┐       ┌─────────────┐
//! │ PunCreation │       │PunEvaluation│
//! │  Service    │       │  Service    │
//! └─────────────┘       └─────────────┘
//!        (HttpBackend / MockBackend)
//! ```

pub mod backend;
pub mod types;

pub use backend::{HttpBackend, MockBackend, PunCreationService, PunEvaluationService, PunsterError};
pub use types::*;
