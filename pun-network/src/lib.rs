//! Pun Distribution Network
//!
//! Turns a child's misbehavior into a well-placed pun and a report on how
//! it landed:
//!
//! - **Immunity tokens**: children can earn a pass, cleared daily
//! - **Channel registry**: delivery contexts with cooldowns
//! - **Channel selection**: deterministic for severe cases, random otherwise
//! - **Bounded retry** around the Punster creation and evaluation services
//! - **Report rendering** for the console
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   DeliveryOrchestrator                   │
//! │                                                          │
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌───────┐ │
//! │  │ Immunity │──►│  Create  │──►│  Select  │──►│ Eval- │ │
//! │  │  Ledger  │   │   Pun    │   │ Channel  │   │ uate  │ │
//! │  └────┬─────┘   └──────────┘   └────┬─────┘   └───┬───┘ │
//! │       │                             │             │     │
//! │  ┌────▼─────┐                  ┌────▼─────┐  ┌────▼───┐ │
//! │  │Scheduler │                  │ Channel  │  │ Report │ │
//! │  │ (reset)  │                  │ Registry │  │Renderer│ │
//! │  └──────────┘                  └──────────┘  └────────┘ │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod ledger;
pub mod network;
pub mod orchestrator;
pub mod registry;
pub mod render;
pub mod retry;
pub mod schedule;
pub mod selector;
pub mod types;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::NetworkConfig;
pub use ledger::{ImmunityLedger, ImmunityTokenLedger, LedgerError};
pub use network::PunNetwork;
pub use orchestrator::{DeliveryError, DeliveryOrchestrator, DeliveryOutcome, DeliveryStage};
pub use registry::{ChannelDirectory, ChannelRegistry, ChannelSpec, RegistryError};
pub use render::ReportRenderer;
pub use retry::RetryPolicy;
pub use schedule::{CronSchedule, ScheduleError, ScheduledTask, Scheduler};
pub use selector::SelectionError;
pub use types::*;
