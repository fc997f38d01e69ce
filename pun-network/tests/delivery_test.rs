//! End-to-end delivery through the assembled network.

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use pun_network::{
    ChannelDirectory, ChannelRegistry, ChannelSpec, DeliveryError, DeliveryOrchestrator,
    DeliveryOutcome, ImmunityLedger, ImmunityTokenLedger, ManualClock, NetworkConfig, PunNetwork,
    RetryPolicy,
};
use punster_agent::{ChannelType, Misbehavior, MockBackend, PunsterError, Severity};

fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 14, 18, 0, 0).unwrap()
}

fn misbehavior(child: &str, severity: u8) -> Misbehavior {
    Misbehavior::new(
        child,
        "GratuitousUseOfRedArrows",
        "Annotated every slide with bright red arrows",
        Severity::new(severity).unwrap(),
    )
}

struct Setup {
    clock: ManualClock,
    ledger: Arc<ImmunityTokenLedger>,
    registry: Arc<ChannelRegistry>,
    backend: Arc<MockBackend>,
    orchestrator: DeliveryOrchestrator,
}

fn setup(catalog: Vec<ChannelSpec>, backend: MockBackend, policy: RetryPolicy) -> Setup {
    let clock = ManualClock::new(start_time());
    let ledger = Arc::new(ImmunityTokenLedger::new());
    let registry = Arc::new(ChannelRegistry::new(catalog, Arc::new(clock.clone())).unwrap());
    let backend = Arc::new(backend);
    let orchestrator =
        DeliveryOrchestrator::with_backend(ledger.clone(), registry.clone(), backend.clone())
            .with_retry_policy(policy)
            .with_rng_seed(2025);

    Setup {
        clock,
        ledger,
        registry,
        backend,
        orchestrator,
    }
}

fn default_setup(backend: MockBackend) -> Setup {
    setup(ChannelSpec::default_catalog(), backend, RetryPolicy::immediate(3))
}

#[tokio::test]
async fn test_immune_child_skips_creation() {
    let s = default_setup(MockBackend::new());
    s.ledger.award_token("Sebastian", "Cron is actually a pretty cool module");

    let outcome = assert_ok!(s.orchestrator.deliver(&misbehavior("Sebastian", 2)).await);
    assert_eq!(
        outcome,
        DeliveryOutcome::Immune {
            child_name: "Sebastian".to_string(),
            remaining_tokens: 0
        }
    );
    assert_eq!(s.backend.create_calls(), 0);
    assert_eq!(s.backend.evaluate_calls(), 0);

    // The token is spent, so the next one goes through
    let outcome = assert_ok!(s.orchestrator.deliver(&misbehavior("Sebastian", 2)).await);
    assert!(matches!(outcome, DeliveryOutcome::Delivered { .. }));
    assert_eq!(s.backend.create_calls(), 1);
}

#[tokio::test]
async fn test_creation_exhausts_retries() {
    let s = default_setup(
        MockBackend::new().failing_creation(100, PunsterError::Fetch("connection refused".into())),
    );

    let error = assert_err!(s.orchestrator.deliver(&misbehavior("Johannes", 3)).await);
    assert_eq!(error, DeliveryError::PunCreationFailed { attempts: 4 });
    assert_eq!(s.backend.create_calls(), 4);
    assert_eq!(s.backend.evaluate_calls(), 0);
}

#[tokio::test]
async fn test_malformed_creation_fails_fast() {
    let s = default_setup(
        MockBackend::new().failing_creation(1, PunsterError::Malformed("missing setup".into())),
    );

    let error = assert_err!(s.orchestrator.deliver(&misbehavior("Johannes", 3)).await);
    assert_eq!(error, DeliveryError::PunCreationFailed { attempts: 1 });
    assert_eq!(s.backend.create_calls(), 1);
}

#[tokio::test]
async fn test_evaluation_failure_does_not_consume_cooldown() {
    let s = default_setup(MockBackend::new().failing_evaluation(4, PunsterError::RateLimited));

    let error = assert_err!(s.orchestrator.deliver(&misbehavior("Michael", 5)).await);
    assert_eq!(error, DeliveryError::PunEvaluationFailed { attempts: 4 });
    assert!(s.registry.snapshot().iter().all(|c| s.registry.is_available(c)));

    // Failures used up, the same channel is still first choice
    let outcome = assert_ok!(s.orchestrator.deliver(&misbehavior("Michael", 5)).await);
    let DeliveryOutcome::Delivered { channel, .. } = outcome else {
        panic!("expected delivery");
    };
    assert_eq!(channel.channel_type, ChannelType::FamilyGathering);
}

#[tokio::test]
async fn test_cooldowns_steer_and_block_delivery() {
    let catalog = vec![
        ChannelSpec::new(ChannelType::FamilyGathering, 90, Duration::from_secs(2 * 3600)),
        ChannelSpec::new(ChannelType::HomeworkSession, 45, Duration::from_secs(3 * 3600)),
    ];
    let s = setup(catalog, MockBackend::new(), RetryPolicy::immediate(0));

    let first = assert_ok!(s.orchestrator.deliver(&misbehavior("Michael", 5)).await);
    let second = assert_ok!(s.orchestrator.deliver(&misbehavior("Michael", 5)).await);
    let channel_of = |outcome: &DeliveryOutcome| match outcome {
        DeliveryOutcome::Delivered { channel, .. } => channel.channel_type,
        DeliveryOutcome::Immune { .. } => panic!("unexpected immunity"),
    };
    assert_eq!(channel_of(&first), ChannelType::FamilyGathering);
    assert_eq!(channel_of(&second), ChannelType::HomeworkSession);

    let error = assert_err!(s.orchestrator.deliver(&misbehavior("Michael", 1)).await);
    assert_eq!(
        error,
        DeliveryError::NoChannelAvailable {
            category: "GratuitousUseOfRedArrows".to_string()
        }
    );
    assert_eq!(s.backend.evaluate_calls(), 2);

    s.clock.advance(Duration::from_secs(2 * 3600));
    let third = assert_ok!(s.orchestrator.deliver(&misbehavior("Michael", 1)).await);
    assert_eq!(channel_of(&third), ChannelType::FamilyGathering);
}

#[tokio::test]
async fn test_concurrent_deliveries_share_tokens_safely() {
    let s = default_setup(MockBackend::new());
    for _ in 0..3 {
        s.ledger.award_token("Alice", "cleaned up after dinner");
    }

    let requests: Vec<_> = (0..8).map(|_| misbehavior("Alice", 2)).collect();
    let results = futures::future::join_all(requests.iter().map(|m| s.orchestrator.deliver(m))).await;

    let immune = results
        .iter()
        .filter(|r| matches!(r, Ok(DeliveryOutcome::Immune { .. })))
        .count();
    assert_eq!(immune, 3);
    assert_eq!(s.ledger.get_balance("Alice"), 0);
    assert_eq!(s.backend.create_calls(), 5);
}

#[tokio::test]
async fn test_network_from_config() {
    let yaml = r#"
retry:
  max_retries: 1
  retry_delay_ms: 0
renderer:
  width: 60
"#;
    let config = NetworkConfig::from_yaml(yaml).unwrap();
    let clock = ManualClock::new(start_time());
    let backend = Arc::new(MockBackend::new().failing_creation(1, PunsterError::Timeout));
    let network = PunNetwork::start(&config, backend.clone(), Arc::new(clock)).unwrap();
    assert!(network.ledger().has_reset_schedule());

    network.award_token("Bob", "good behavior");
    assert_eq!(network.balance("Bob"), 1);

    let outcome = assert_ok!(network.deliver(&misbehavior("Carol", 4)).await);
    let DeliveryOutcome::Delivered { rendered, .. } = outcome else {
        panic!("expected delivery");
    };
    assert_eq!(backend.create_calls(), 2);
    assert!(rendered.contains("Report generated at: 2025-06-14T18:00:00.000Z"));
    assert!(rendered.lines().all(|line| !line.contains(&"-".repeat(61))));
    assert!(network.registry().available().len() < 5);

    network.shutdown();
}
