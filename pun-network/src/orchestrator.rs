//! Delivery Orchestrator - runs one misbehavior through the network.
//!
//! Each request moves through these stages:
//!
//! ```text
//! CheckingImmunity ──► Creating ──► SelectingChannel ──► Evaluating ──► Delivered
//!        │                │                │                  │
//!        ▼                ▼                ▼                  ▼
//! ImmuneShortCircuit CreationFailed    NoChannel       EvaluationFailed
//! ```
//!
//! The token consume and the channel `mark_used` are single synchronous
//! steps, so dropping the `deliver` future at any await leaves the ledger
//! and registry consistent.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use punster_agent::{
    Channel, DeliveryReport, Misbehavior, Pun, PunCreationService, PunEvaluationService,
};

use crate::ledger::ImmunityLedger;
use crate::registry::ChannelDirectory;
use crate::render::ReportRenderer;
use crate::retry::{with_retry, RetryPolicy};
use crate::selector::{select_channel, SelectionError};

/// Stage of a delivery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStage {
    CheckingImmunity,
    Creating,
    SelectingChannel,
    Evaluating,
    Delivered,
    ImmuneShortCircuit,
    CreationFailed,
    NoChannel,
    EvaluationFailed,
}

impl DeliveryStage {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStage::CheckingImmunity => "checking_immunity",
            DeliveryStage::Creating => "creating",
            DeliveryStage::SelectingChannel => "selecting_channel",
            DeliveryStage::Evaluating => "evaluating",
            DeliveryStage::Delivered => "delivered",
            DeliveryStage::ImmuneShortCircuit => "immune_short_circuit",
            DeliveryStage::CreationFailed => "creation_failed",
            DeliveryStage::NoChannel => "no_channel",
            DeliveryStage::EvaluationFailed => "evaluation_failed",
        }
    }

    /// Whether the request ends at this stage.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            DeliveryStage::CheckingImmunity
                | DeliveryStage::Creating
                | DeliveryStage::SelectingChannel
                | DeliveryStage::Evaluating
        )
    }
}

impl fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a request that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// The pun was delivered and evaluated
    Delivered {
        channel: Channel,
        pun: Pun,
        report: DeliveryReport,
        rendered: String,
    },
    /// The child spent an immunity token; nothing was delivered
    Immune {
        child_name: String,
        remaining_tokens: u32,
    },
}

impl DeliveryOutcome {
    /// Terminal stage for this outcome.
    pub fn stage(&self) -> DeliveryStage {
        match self {
            DeliveryOutcome::Delivered { .. } => DeliveryStage::Delivered,
            DeliveryOutcome::Immune { .. } => DeliveryStage::ImmuneShortCircuit,
        }
    }
}

/// Error types for a delivery request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Every channel is cooling down
    #[error("No channel available for misbehavior category {category}")]
    NoChannelAvailable { category: String },

    /// The creation service kept failing
    #[error("Failed to create pun after {attempts} attempts")]
    PunCreationFailed { attempts: u32 },

    /// The evaluation service kept failing
    #[error("Failed to evaluate pun after {attempts} attempts")]
    PunEvaluationFailed { attempts: u32 },
}

impl DeliveryError {
    /// Terminal stage for this failure.
    pub fn stage(&self) -> DeliveryStage {
        match self {
            DeliveryError::NoChannelAvailable { .. } => DeliveryStage::NoChannel,
            DeliveryError::PunCreationFailed { .. } => DeliveryStage::CreationFailed,
            DeliveryError::PunEvaluationFailed { .. } => DeliveryStage::EvaluationFailed,
        }
    }
}

impl From<SelectionError> for DeliveryError {
    fn from(error: SelectionError) -> Self {
        match error {
            SelectionError::NoChannelAvailable { category } => {
                DeliveryError::NoChannelAvailable { category }
            }
        }
    }
}

/// Coordinates the ledger, registry, Punster services and renderer.
pub struct DeliveryOrchestrator {
    /// Immunity tokens
    ledger: Arc<dyn ImmunityLedger>,
    /// Delivery channels
    channels: Arc<dyn ChannelDirectory>,
    /// Pun creation service
    creator: Arc<dyn PunCreationService>,
    /// Pun evaluation service
    evaluator: Arc<dyn PunEvaluationService>,
    /// Report renderer
    renderer: ReportRenderer,
    /// Retry policy for both services
    retry: RetryPolicy,
    /// Randomness for low-severity channel selection
    rng: Mutex<StdRng>,
}

impl DeliveryOrchestrator {
    /// Create an orchestrator with the default renderer and retry policy.
    pub fn new(
        ledger: Arc<dyn ImmunityLedger>,
        channels: Arc<dyn ChannelDirectory>,
        creator: Arc<dyn PunCreationService>,
        evaluator: Arc<dyn PunEvaluationService>,
    ) -> Self {
        Self {
            ledger,
            channels,
            creator,
            evaluator,
            renderer: ReportRenderer::default(),
            retry: RetryPolicy::default(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create an orchestrator using one backend for creation and evaluation.
    pub fn with_backend<B>(
        ledger: Arc<dyn ImmunityLedger>,
        channels: Arc<dyn ChannelDirectory>,
        backend: Arc<B>,
    ) -> Self
    where
        B: PunCreationService + PunEvaluationService + 'static,
    {
        let creator: Arc<dyn PunCreationService> = backend.clone();
        let evaluator: Arc<dyn PunEvaluationService> = backend;
        Self::new(ledger, channels, creator, evaluator)
    }

    /// Set the renderer.
    pub fn with_renderer(mut self, renderer: ReportRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Seed channel selection randomness.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Retry policy in use.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Deliver a pun for `misbehavior`.
    pub async fn deliver(&self, misbehavior: &Misbehavior) -> Result<DeliveryOutcome, DeliveryError> {
        let child_name = misbehavior.child_name.as_str();
        let category = misbehavior.category.as_str();

        info!(
            child_name = %child_name,
            category = %category,
            severity = %misbehavior.severity,
            "Detected new misbehavior for child: {}",
            child_name
        );

        self.enter(DeliveryStage::CheckingImmunity, misbehavior);
        // Decrement-if-positive; a zero balance just means no immunity.
        match self.ledger.use_token(child_name) {
            Ok(remaining_tokens) => {
                self.enter(DeliveryStage::ImmuneShortCircuit, misbehavior);
                info!(
                    child_name = %child_name,
                    remaining_tokens,
                    "{} used an immunity token",
                    child_name
                );
                return Ok(DeliveryOutcome::Immune {
                    child_name: child_name.to_string(),
                    remaining_tokens,
                });
            }
            Err(e) => debug!(child_name = %child_name, reason = %e, "No immunity"),
        }

        self.enter(DeliveryStage::Creating, misbehavior);
        let pun = with_retry(&self.retry, "create_pun", || self.creator.create_pun(misbehavior))
            .await
            .map_err(|failure| {
                self.enter(DeliveryStage::CreationFailed, misbehavior);
                error!(
                    child_name = %child_name,
                    category = %category,
                    attempts = failure.attempts,
                    error = %failure.last_error,
                    "Pun creation failed"
                );
                DeliveryError::PunCreationFailed {
                    attempts: failure.attempts,
                }
            })?;

        self.enter(DeliveryStage::SelectingChannel, misbehavior);
        let channel = self.select(misbehavior).map_err(|e| {
            self.enter(DeliveryStage::NoChannel, misbehavior);
            error!(child_name = %child_name, category = %category, "{}", e);
            DeliveryError::from(e)
        })?;

        info!(
            child_name = %child_name,
            channel = %channel.channel_type,
            setup = %pun.setup,
            punchline = %pun.punchline,
            "Delivering pun to {} via channel type {}",
            child_name,
            channel.channel_type
        );

        self.enter(DeliveryStage::Evaluating, misbehavior);
        let report = with_retry(&self.retry, "evaluate_pun", || {
            self.evaluator.evaluate_pun(&pun, misbehavior, &channel)
        })
        .await
        .map_err(|failure| {
            self.enter(DeliveryStage::EvaluationFailed, misbehavior);
            error!(
                child_name = %child_name,
                channel = %channel.channel_type,
                attempts = failure.attempts,
                error = %failure.last_error,
                "Pun evaluation failed"
            );
            DeliveryError::PunEvaluationFailed {
                attempts: failure.attempts,
            }
        })?;

        // The channel was chosen from this directory's snapshot.
        if let Err(e) = self.channels.mark_used(channel.channel_type, self.channels.now()) {
            warn!(channel = %channel.channel_type, error = %e, "Could not mark channel as used");
        }

        let rendered = self.renderer.render(&report);
        self.enter(DeliveryStage::Delivered, misbehavior);

        Ok(DeliveryOutcome::Delivered {
            channel,
            pun,
            report,
            rendered,
        })
    }

    fn select(&self, misbehavior: &Misbehavior) -> Result<Channel, SelectionError> {
        let snapshot = self.channels.snapshot();
        let now = self.channels.now();
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        select_channel(&snapshot, now, misbehavior.severity, &misbehavior.category, &mut *rng)
    }

    fn enter(&self, stage: DeliveryStage, misbehavior: &Misbehavior) {
        debug!(
            stage = %stage,
            child_name = %misbehavior.child_name,
            category = %misbehavior.category,
            severity = %misbehavior.severity,
            "Delivery stage"
        );
    }
}
