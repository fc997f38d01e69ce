//! Mock Punster backend for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::traits::*;
use crate::types::{Channel, DeliveryMetrics, DeliveryReport, Misbehavior, Pun};

/// Mock backend for testing.
///
/// Returns configured responses and can be told to fail a number of calls
/// before succeeding.
pub struct MockBackend {
    pun: Pun,
    report: DeliveryReport,
    creation_failures: AtomicU32,
    creation_error: PunsterError,
    evaluation_failures: AtomicU32,
    evaluation_error: PunsterError,
    create_calls: AtomicU32,
    evaluate_calls: AtomicU32,
}

impl MockBackend {
    /// Create a mock with canned responses.
    pub fn new() -> Self {
        Self {
            pun: sample_pun(),
            report: sample_report(),
            creation_failures: AtomicU32::new(0),
            creation_error: PunsterError::Fetch("Mock creation failure".to_string()),
            evaluation_failures: AtomicU32::new(0),
            evaluation_error: PunsterError::Fetch("Mock evaluation failure".to_string()),
            create_calls: AtomicU32::new(0),
            evaluate_calls: AtomicU32::new(0),
        }
    }

    /// Set the pun returned by `create_pun`.
    pub fn with_pun(mut self, pun: Pun) -> Self {
        self.pun = pun;
        self
    }

    /// Set the report returned by `evaluate_pun`.
    pub fn with_report(mut self, report: DeliveryReport) -> Self {
        self.report = report;
        self
    }

    /// Fail the next `times` creation calls with `error`.
    pub fn failing_creation(mut self, times: u32, error: PunsterError) -> Self {
        self.creation_failures = AtomicU32::new(times);
        self.creation_error = error;
        self
    }

    /// Fail the next `times` evaluation calls with `error`.
    pub fn failing_evaluation(mut self, times: u32, error: PunsterError) -> Self {
        self.evaluation_failures = AtomicU32::new(times);
        self.evaluation_error = error;
        self
    }

    /// Number of times `create_pun` was called.
    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of times `evaluate_pun` was called.
    pub fn evaluate_calls(&self) -> u32 {
        self.evaluate_calls.load(Ordering::SeqCst)
    }

    fn take_failure(remaining: &AtomicU32) -> bool {
        remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PunCreationService for MockBackend {
    async fn create_pun(&self, _misbehavior: &Misbehavior) -> Result<Pun, PunsterError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        if Self::take_failure(&self.creation_failures) {
            return Err(self.creation_error.clone());
        }

        Ok(self.pun.clone())
    }
}

#[async_trait]
impl PunEvaluationService for MockBackend {
    async fn evaluate_pun(
        &self,
        _pun: &Pun,
        _misbehavior: &Misbehavior,
        _channel: &Channel,
    ) -> Result<DeliveryReport, PunsterError> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);

        if Self::take_failure(&self.evaluation_failures) {
            return Err(self.evaluation_error.clone());
        }

        Ok(self.report.clone())
    }
}

fn sample_pun() -> Pun {
    Pun {
        setup: "Why did the tablet get sent to its room?".to_string(),
        punchline: "It kept having too many screen tantrums.".to_string(),
        groan_potential: 70,
    }
}

fn sample_report() -> DeliveryReport {
    DeliveryReport {
        executive_summary: "The pun was delivered cleanly and produced a sustained groan."
            .to_string(),
        delivery_narrative: "The setup was met with suspicion, the punchline with a long sigh."
            .to_string(),
        observations: vec![
            "Eyes rolled within two seconds of the punchline".to_string(),
            "Sibling laughed, which undermined the groan".to_string(),
        ],
        recommendations: vec!["Deliver before dessert for maximum captivity".to_string()],
        metrics: DeliveryMetrics {
            comprehension_rate: 85.0,
            reaction_intensity: 60.0,
            reaction_duration: Duration::from_secs(8),
            repeat_probability: 25.0,
            delivery_effectiveness: 72.0,
        },
    }
}
