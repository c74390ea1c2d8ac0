//! End-to-end settlement against in-memory collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use cognosis::core::hash::PaymentKeyHash;
use cognosis::crypto::{EncryptedEnvelope, EncryptionService};
use cognosis::proof::Commitment;
use cognosis::settlement::{
    ChainState, CollaboratorError, Collaborators, ContentStore, ErrorKind, OrchestratorConfig, OrchestratorState,
    PendingCommitment, RetryPolicy, RevealOrchestrator, RewardPoolState, Scorer, ScoringRequest, ScoringResponse,
    SettlementError, SettlementTx, TxSubmitter,
};

const POOL_BALANCE: u64 = 10_000;

// =============================================================================
// IN-MEMORY COLLABORATORS
// =============================================================================

/// Chain state plus submitter over one shared ledger.
struct MemoryLedger {
    pending: Mutex<Vec<PendingCommitment>>,
    pool: Mutex<RewardPoolState>,
    applied: Mutex<Vec<[u8; 32]>>,
    submissions: Mutex<Vec<[u8; 32]>>,
    submit_failures: AtomicU32,
}

impl MemoryLedger {
    fn new(pending: Vec<PendingCommitment>) -> Self {
        Self {
            pending: Mutex::new(pending),
            pool: Mutex::new(RewardPoolState {
                pool_ref: "pool#0".into(),
                balance: POOL_BALANCE,
                claim_count: 0,
            }),
            applied: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            submit_failures: AtomicU32::new(0),
        }
    }

    fn pool(&self) -> RewardPoolState {
        self.pool.lock().unwrap().clone()
    }

    fn submissions(&self) -> Vec<[u8; 32]> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainState for MemoryLedger {
    async fn pending_commitments(&self, now: DateTime<Utc>) -> Result<Vec<PendingCommitment>, CollaboratorError> {
        Ok(self
            .pending
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.matures_at <= now)
            .cloned()
            .collect())
    }

    async fn reward_pool(&self) -> Result<RewardPoolState, CollaboratorError> {
        Ok(self.pool())
    }
}

#[async_trait]
impl TxSubmitter for MemoryLedger {
    async fn submit(&self, tx: &SettlementTx) -> Result<(), CollaboratorError> {
        self.submissions.lock().unwrap().push(tx.tx_id);
        if self
            .submit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CollaboratorError::Unavailable("node busy".into()));
        }

        let mut applied = self.applied.lock().unwrap();
        if applied.contains(&tx.tx_id) {
            return Ok(());
        }
        let mut pool = self.pool.lock().unwrap();
        if pool.balance - tx.reward != tx.outputs.updated_pool.balance {
            return Err(CollaboratorError::Conflict("stale pool input".into()));
        }
        *pool = tx.outputs.updated_pool.clone();
        applied.push(tx.tx_id);
        self.pending
            .lock()
            .unwrap()
            .retain(|p| p.commitment_ref != tx.inputs.commitment_ref);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryStore {
    envelopes: Mutex<HashMap<String, EncryptedEnvelope>>,
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn fetch(&self, content_id: &str) -> Result<EncryptedEnvelope, CollaboratorError> {
        self.envelopes
            .lock()
            .unwrap()
            .get(content_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(content_id.to_string()))
    }
}

struct ScriptedScorer {
    score: f64,
    failures: AtomicU32,
    delay: Duration,
    calls: AtomicU32,
}

impl ScriptedScorer {
    fn new(score: f64) -> Self {
        Self {
            score,
            failures: AtomicU32::new(0),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    fn failing(mut self, failures: u32) -> Self {
        self.failures = AtomicU32::new(failures);
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for ScriptedScorer {
    async fn score(&self, request: &ScoringRequest) -> Result<ScoringResponse, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CollaboratorError::Unavailable("scorer overloaded".into()));
        }
        assert_eq!(request.commitment_hash.len(), 64);
        Ok(ScoringResponse {
            score: self.score,
            method: "semantic".into(),
            scoring_module_hash: "00".repeat(32),
        })
    }
}

// =============================================================================
// FIXTURE
// =============================================================================

struct Harness {
    orchestrator: Arc<RevealOrchestrator>,
    ledger: Arc<MemoryLedger>,
    store: Arc<MemoryStore>,
    scorer: Arc<ScriptedScorer>,
    encryption: Arc<EncryptionService>,
}

fn config(max_attempts: u32, io_timeout: Duration) -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval: Duration::from_millis(10),
        io_timeout,
        retry: RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..OrchestratorConfig::default()
    }
}

/// Seal a prediction, store its envelope and return the chain view.
fn seal(encryption: &EncryptionService, store: &MemoryStore, index: u8, prediction: &str) -> PendingCommitment {
    let (commitment, _) = Commitment::seal(format!("owner{}", index), prediction, b"{\"exp\":7}", encryption).unwrap();
    let content_id = commitment.id.to_string();
    store
        .envelopes
        .lock()
        .unwrap()
        .insert(content_id.clone(), commitment.encrypted_payload.clone());
    PendingCommitment {
        commitment_ref: format!("commit#{}", index),
        commitment_hash: commitment.commitment_hash,
        owner: PaymentKeyHash([index; 28]),
        content_id,
        target_ref: "target#7".into(),
        matures_at: Utc::now() - ChronoDuration::hours(1),
    }
}

fn harness(count: u8, scorer: ScriptedScorer, config: OrchestratorConfig) -> (Harness, Vec<PendingCommitment>) {
    let encryption = Arc::new(EncryptionService::new(b"settlement-flow"));
    let store = Arc::new(MemoryStore::default());
    let pending: Vec<_> = (1..=count)
        .map(|i| seal(&encryption, &store, i, &format!("prediction {}", i)))
        .collect();
    let ledger = Arc::new(MemoryLedger::new(pending.clone()));
    let scorer = Arc::new(scorer);

    let orchestrator = Arc::new(RevealOrchestrator::new(
        config,
        Arc::clone(&encryption),
        Collaborators {
            chain: ledger.clone(),
            content: store.clone(),
            scorer: scorer.clone(),
            submitter: ledger.clone(),
        },
    ));
    (
        Harness {
            orchestrator,
            ledger,
            store,
            scorer,
            encryption,
        },
        pending,
    )
}

// =============================================================================
// TESTS
// =============================================================================

#[tokio::test]
async fn test_end_to_end_settlement() {
    let (h, pending) = harness(1, ScriptedScorer::new(0.75), config(3, Duration::from_secs(1)));

    let report = h.orchestrator.run_once().await.unwrap();
    assert_eq!(report.found, 1);
    assert!(report.failed.is_empty());
    assert_eq!(report.settled.len(), 1);

    let outcome = &report.settled[0];
    assert_eq!(outcome.commitment_ref, pending[0].commitment_ref);
    assert_eq!(outcome.accuracy, 75.0);
    assert_eq!(outcome.reward, 246);
    assert_eq!(outcome.payout, 244);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.states.contains(&OrchestratorState::Submitted));
    assert_eq!(outcome.states.last(), Some(&OrchestratorState::Idle));

    let pool = h.ledger.pool();
    assert_eq!(pool.balance, POOL_BALANCE - 246);
    assert_eq!(pool.claim_count, 1);
    assert!(h.orchestrator.claims().is_settled(&pending[0].commitment_ref).await);

    // Settled commitments leave the chain's pending set and the registry
    let report = h.orchestrator.run_once().await.unwrap();
    assert_eq!(report.found, 0);
    assert_eq!(h.ledger.submissions().len(), 1);
    assert!(h.orchestrator.claims().is_empty().await);
}

#[tokio::test]
async fn test_concurrent_settlement_one_wins() {
    let scorer = ScriptedScorer::new(0.5).slow(Duration::from_millis(50));
    let (h, pending) = harness(1, scorer, config(3, Duration::from_secs(1)));

    let (a, b) = tokio::join!(
        h.orchestrator.settle(&pending[0]),
        h.orchestrator.settle(&pending[0])
    );

    let results = [a, b];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::StateConflict))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 1);

    assert_eq!(h.ledger.pool().claim_count, 1);
    assert_eq!(h.ledger.pool().balance, POOL_BALANCE - 153);
    assert_eq!(h.scorer.calls(), 1);

    // A settled commitment cannot be settled again
    let again = h.orchestrator.settle(&pending[0]).await.unwrap_err();
    assert!(matches!(again, SettlementError::AlreadyClaimed(_)));
}

#[tokio::test]
async fn test_transient_scorer_failure_retried() {
    let (h, pending) = harness(1, ScriptedScorer::new(1.0).failing(2), config(5, Duration::from_secs(1)));

    let outcome = h.orchestrator.settle(&pending[0]).await.unwrap();
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.reward, 400);
    assert_eq!(h.scorer.calls(), 3);
    assert_eq!(h.ledger.pool().claim_count, 1);
}

#[tokio::test]
async fn test_persistent_failure_escalates() {
    let (h, pending) = harness(1, ScriptedScorer::new(1.0).failing(u32::MAX), config(3, Duration::from_secs(1)));

    let err = h.orchestrator.settle(&pending[0]).await.unwrap_err();
    match &err {
        SettlementError::Escalated { attempts, last, .. } => {
            assert_eq!(*attempts, 3);
            assert!(matches!(**last, SettlementError::Collaborator { operation: "score", .. }));
        }
        other => panic!("expected escalation, got {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert!(!err.is_retryable());
    assert_eq!(h.scorer.calls(), 3);
    assert_eq!(h.ledger.pool().balance, POOL_BALANCE);
    assert!(h.ledger.submissions().is_empty());
}

#[tokio::test]
async fn test_timeout_is_retryable_then_escalates() {
    let scorer = ScriptedScorer::new(0.9).slow(Duration::from_millis(200));
    let (h, pending) = harness(1, scorer, config(2, Duration::from_millis(20)));

    let err = h.orchestrator.settle(&pending[0]).await.unwrap_err();
    match err {
        SettlementError::Escalated { attempts, last, .. } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, SettlementError::Timeout { operation: "score" }));
        }
        other => panic!("expected escalation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failure_does_not_block_next_commitment() {
    let (h, pending) = harness(2, ScriptedScorer::new(0.75), config(3, Duration::from_secs(1)));
    h.store
        .envelopes
        .lock()
        .unwrap()
        .remove(&pending[0].content_id);

    let report = h.orchestrator.run_once().await.unwrap();
    assert_eq!(report.found, 2);
    assert_eq!(report.settled.len(), 1);
    assert_eq!(report.settled[0].commitment_ref, pending[1].commitment_ref);

    assert_eq!(report.failed.len(), 1);
    let (failed_ref, err) = &report.failed[0];
    assert_eq!(failed_ref, &pending[0].commitment_ref);
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.scorer.calls(), 1);

    // Not-found is reported once, not retried on later polls
    let report = h.orchestrator.run_once().await.unwrap();
    assert_eq!(report.found, 1);
    assert_eq!(report.held, 1);
    assert!(report.failed.is_empty());
    assert_eq!(
        h.orchestrator.claims().held_kind(&pending[0].commitment_ref).await,
        Some(ErrorKind::NotFound)
    );
}

#[tokio::test]
async fn test_escalated_commitment_not_retried_by_later_polls() {
    let (h, pending) = harness(1, ScriptedScorer::new(1.0).failing(u32::MAX), config(3, Duration::from_secs(1)));

    let first = h.orchestrator.run_once().await.unwrap();
    assert_eq!(first.failed.len(), 1);
    assert!(matches!(first.failed[0].1, SettlementError::Escalated { attempts: 3, .. }));

    for _ in 0..3 {
        let report = h.orchestrator.run_once().await.unwrap();
        assert_eq!(report.found, 1);
        assert_eq!(report.held, 1);
        assert!(report.failed.is_empty());
        assert!(report.settled.is_empty());
    }
    assert_eq!(h.scorer.calls(), 3);

    let direct = h.orchestrator.settle(&pending[0]).await.unwrap_err();
    assert!(matches!(direct, SettlementError::Held(_)));
    assert_eq!(h.scorer.calls(), 3);
}

#[tokio::test]
async fn test_submit_retry_reuses_built_transaction() {
    let (h, pending) = harness(1, ScriptedScorer::new(0.75), config(3, Duration::from_secs(1)));
    h.ledger.submit_failures.store(1, Ordering::SeqCst);

    let outcome = h.orchestrator.settle(&pending[0]).await.unwrap();
    assert_eq!(outcome.attempts, 2);
    // Scoring is not repeated once a transaction exists
    assert_eq!(h.scorer.calls(), 1);

    let submissions = h.ledger.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0], submissions[1]);
    assert_eq!(hex::encode(submissions[0]), outcome.tx_id);
    assert_eq!(h.ledger.pool().claim_count, 1);
}

#[tokio::test]
async fn test_escalated_transaction_is_resubmitted_later() {
    let (h, pending) = harness(1, ScriptedScorer::new(0.75), config(2, Duration::from_secs(1)));
    h.ledger.submit_failures.store(2, Ordering::SeqCst);

    let err = h.orchestrator.settle(&pending[0]).await.unwrap_err();
    assert!(matches!(err, SettlementError::Escalated { .. }));
    let built = h.orchestrator.claims().built_tx(&pending[0].commitment_ref).await.unwrap();

    // Held until an operator reinstates it
    let report = h.orchestrator.run_once().await.unwrap();
    assert_eq!(report.held, 1);
    assert!(h.orchestrator.claims().reinstate(&pending[0].commitment_ref).await);

    let outcome = h.orchestrator.settle(&pending[0]).await.unwrap();
    assert_eq!(outcome.tx_id, built.tx_id_hex());
    assert_eq!(h.scorer.calls(), 1);
    assert!(h.ledger.submissions().iter().all(|id| *id == built.tx_id));
}

#[tokio::test]
async fn test_spent_pool_input_rebuilds_recorded_transaction() {
    let (h, pending) = harness(2, ScriptedScorer::new(0.75), config(2, Duration::from_secs(1)));
    h.ledger.submit_failures.store(2, Ordering::SeqCst);

    // First commitment builds against the initial pool, then escalates
    let err = h.orchestrator.settle(&pending[0]).await.unwrap_err();
    assert!(matches!(err, SettlementError::Escalated { .. }));
    let stale = h.orchestrator.claims().built_tx(&pending[0].commitment_ref).await.unwrap();

    // Second commitment moves the pool past the recorded input
    h.orchestrator.settle(&pending[1]).await.unwrap();
    assert_eq!(h.ledger.pool().balance, POOL_BALANCE - 246);
    assert_eq!(h.ledger.pool().claim_count, 1);

    assert!(h.orchestrator.claims().reinstate(&pending[0].commitment_ref).await);
    let report = h.orchestrator.run_once().await.unwrap();
    assert_eq!(report.found, 1);
    assert!(report.failed.is_empty());
    assert_eq!(report.settled.len(), 1);

    let outcome = &report.settled[0];
    assert_ne!(outcome.tx_id, stale.tx_id_hex());
    assert_eq!(outcome.reward, 246);
    // Rebuilt from the recorded score
    assert_eq!(h.scorer.calls(), 2);

    let pool = h.ledger.pool();
    assert_eq!(pool.balance, POOL_BALANCE - 2 * 246);
    assert_eq!(pool.claim_count, 2);
    assert!(h.orchestrator.claims().is_settled(&pending[0].commitment_ref).await);

    let report = h.orchestrator.run_once().await.unwrap();
    assert_eq!(report.found, 0);
}

#[tokio::test]
async fn test_swapped_payload_rejected() {
    let (h, pending) = harness(2, ScriptedScorer::new(0.75), config(3, Duration::from_secs(1)));
    let other = h
        .store
        .envelopes
        .lock()
        .unwrap()
        .get(&pending[1].content_id)
        .cloned()
        .unwrap();
    h.store
        .envelopes
        .lock()
        .unwrap()
        .insert(pending[0].content_id.clone(), other);

    let err = h.orchestrator.settle(&pending[0]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CryptographicMismatch);
    assert_eq!(h.scorer.calls(), 0);
}

#[tokio::test]
async fn test_wrong_key_payload_rejected() {
    let (h, pending) = harness(1, ScriptedScorer::new(0.75), config(3, Duration::from_secs(1)));
    let foreign = EncryptionService::new(b"someone-else");
    let (commitment, _) = Commitment::seal("x", "p", b"m", &foreign).unwrap();
    h.store
        .envelopes
        .lock()
        .unwrap()
        .insert(pending[0].content_id.clone(), commitment.encrypted_payload);

    let err = h.orchestrator.settle(&pending[0]).await.unwrap_err();
    assert!(matches!(err, SettlementError::Decryption(_)));
    assert_eq!(err.kind(), ErrorKind::CryptographicMismatch);
    // The harness key still opens its own commitments
    let (own, _) = Commitment::seal("y", "q", b"m", &h.encryption).unwrap();
    assert!(own.open(&h.encryption).is_ok());
}

#[tokio::test]
async fn test_invalid_score_rejected() {
    let (h, pending) = harness(1, ScriptedScorer::new(1.5), config(3, Duration::from_secs(1)));
    let err = h.orchestrator.settle(&pending[0]).await.unwrap_err();
    assert!(matches!(err, SettlementError::InvalidScore(_)));
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
    assert_eq!(h.scorer.calls(), 1);
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let (h, _) = harness(1, ScriptedScorer::new(0.75), config(3, Duration::from_secs(1)));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let orchestrator = Arc::clone(&h.orchestrator);
    let handle = tokio::spawn(async move { orchestrator.run(shutdown_rx).await });

    for _ in 0..100 {
        if h.ledger.pool().claim_count == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.ledger.pool().claim_count, 1);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("loop did not stop")
        .unwrap();
}
