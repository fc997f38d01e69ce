//! PunNetwork - the assembled network.
//!
//! Wires the ledger, registry, backend and renderer together from a
//! [`NetworkConfig`] and owns their lifetimes.

use std::sync::Arc;
use tracing::info;

use punster_agent::{Misbehavior, PunCreationService, PunEvaluationService};

use crate::clock::Clock;
use crate::config::NetworkConfig;
use crate::ledger::{ImmunityLedger, ImmunityTokenLedger};
use crate::orchestrator::{DeliveryError, DeliveryOrchestrator, DeliveryOutcome};
use crate::registry::ChannelRegistry;
use crate::render::ReportRenderer;
use crate::retry::RetryPolicy;
use crate::schedule::Scheduler;
use crate::types::Result;

/// A running Pun Distribution Network.
pub struct PunNetwork {
    /// Immunity tokens, reset on the configured schedule
    ledger: Arc<ImmunityTokenLedger>,
    /// Delivery channels
    registry: Arc<ChannelRegistry>,
    /// Request pipeline
    orchestrator: DeliveryOrchestrator,
}

impl PunNetwork {
    /// Build a network and start the ledger reset schedule.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<B>(config: &NetworkConfig, backend: Arc<B>, clock: Arc<dyn Clock>) -> Result<Self>
    where
        B: PunCreationService + PunEvaluationService + 'static,
    {
        config.validate()?;

        let schedule = config.reset_schedule()?;
        let scheduler = Scheduler::new(Arc::clone(&clock));
        let ledger = Arc::new(ImmunityTokenLedger::start(schedule, &scheduler));
        let registry = Arc::new(ChannelRegistry::new(config.channels.clone(), Arc::clone(&clock))?);

        let orchestrator = DeliveryOrchestrator::with_backend(
            ledger.clone(),
            registry.clone(),
            backend,
        )
        .with_renderer(ReportRenderer::new(&config.renderer, clock))
        .with_retry_policy(RetryPolicy::from(&config.retry));

        info!(
            channels = config.channels.len(),
            reset_schedule = %config.ledger.reset_schedule,
            max_retries = config.retry.max_retries,
            "Pun Distribution Network started"
        );

        Ok(Self {
            ledger,
            registry,
            orchestrator,
        })
    }

    /// Award an immunity token.
    pub fn award_token(&self, entity: &str, reason: &str) {
        self.ledger.award_token(entity, reason);
    }

    /// Current immunity balance.
    pub fn balance(&self, entity: &str) -> u32 {
        self.ledger.get_balance(entity)
    }

    /// Deliver a pun for `misbehavior`.
    pub async fn deliver(&self, misbehavior: &Misbehavior) -> std::result::Result<DeliveryOutcome, DeliveryError> {
        self.orchestrator.deliver(misbehavior).await
    }

    /// The ledger.
    pub fn ledger(&self) -> &Arc<ImmunityTokenLedger> {
        &self.ledger
    }

    /// The channel registry.
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Stop background tasks.
    pub fn shutdown(&self) {
        info!("Shutting down Pun Distribution Network");
        self.ledger.shutdown();
    }
}
