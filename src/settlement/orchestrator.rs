//! Reveal Orchestrator
//!
//! Polls chain state for matured commitments and settles each one:
//! fetch → decrypt → check preimage → score → reward → build → submit.
//!
//! Every collaborator call runs under the I/O timeout. Pool updates are
//! serialized behind one lock held from pool read through submission, and
//! each commitment is claimed exclusively before any work starts.
//!
//! A commitment that escalates or fails permanently is held in the claim
//! registry and skipped by later polls until reinstated.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::claims::ClaimRegistry;
use super::collaborators::{
    ChainState, CollaboratorError, ContentStore, PendingCommitment, Scorer, ScoringRequest, ScoringResponse,
    TxSubmitter,
};
use super::error::SettlementError;
use super::retry::RetryPolicy;
use super::state::{OrchestratorState, StateTracker};
use super::transaction::{build_settlement, SettlementParams, SettlementTx};
use crate::core::config::AppConfig;
use crate::crypto::EncryptionService;
use crate::proof::{CommitmentError, PredictionPayload};
use crate::rewards::{reward, RewardCurveParams};

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Limit on every collaborator call.
    pub io_timeout: Duration,
    /// Retry limits per commitment.
    pub retry: RetryPolicy,
    /// Reward curve.
    pub curve: RewardCurveParams,
    /// Fee parameters.
    pub settlement: SettlementParams,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            io_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            curve: RewardCurveParams::default(),
            settlement: SettlementParams::default(),
        }
    }
}

impl From<&AppConfig> for OrchestratorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            io_timeout: config.io_timeout,
            retry: RetryPolicy {
                max_attempts: config.max_settlement_attempts,
                ..RetryPolicy::default()
            },
            curve: config.reward_curve,
            settlement: SettlementParams {
                fee_bps: config.settlement_fee_bps,
            },
        }
    }
}

/// The external services the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Chain reads.
    pub chain: Arc<dyn ChainState>,
    /// Payload storage.
    pub content: Arc<dyn ContentStore>,
    /// Scoring service.
    pub scorer: Arc<dyn Scorer>,
    /// Transaction submission.
    pub submitter: Arc<dyn TxSubmitter>,
}

/// A completed settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementOutcome {
    /// Settled commitment.
    pub commitment_ref: String,
    /// Submitted transaction id (hex).
    pub tx_id: String,
    /// Accuracy percentage.
    pub accuracy: f64,
    /// Reward drawn from the pool.
    pub reward: u64,
    /// Tokens paid to the participant.
    pub payout: u64,
    /// Attempts used.
    pub attempts: u32,
    /// States visited across all attempts.
    pub states: Vec<OrchestratorState>,
}

/// Result of one polling iteration.
#[derive(Debug, Default)]
pub struct IterationReport {
    /// Commitments returned by the poll.
    pub found: usize,
    /// Commitments settled this iteration.
    pub settled: Vec<SettlementOutcome>,
    /// Commitments that failed, with the final error.
    pub failed: Vec<(String, SettlementError)>,
    /// Commitments skipped because they were already settled or claimed.
    pub skipped: usize,
    /// Commitments skipped because an earlier failure holds them.
    pub held: usize,
}

/// Drives commitments from maturity to submitted settlement.
pub struct RevealOrchestrator {
    config: OrchestratorConfig,
    encryption: Arc<EncryptionService>,
    collaborators: Collaborators,
    claims: ClaimRegistry,
    pool_lock: Mutex<()>,
}

impl RevealOrchestrator {
    /// Create an orchestrator.
    pub fn new(config: OrchestratorConfig, encryption: Arc<EncryptionService>, collaborators: Collaborators) -> Self {
        Self {
            config,
            encryption,
            collaborators,
            claims: ClaimRegistry::new(),
            pool_lock: Mutex::new(()),
        }
    }

    /// Claim registry.
    pub fn claims(&self) -> &ClaimRegistry {
        &self.claims
    }

    /// Poll until `shutdown` flips to true.
    ///
    /// An iteration already running when shutdown arrives is finished.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval = ?self.config.poll_interval,
            io_timeout = ?self.config.io_timeout,
            "Reveal orchestrator started"
        );
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) if report.found > 0 => info!(
                            found = report.found,
                            settled = report.settled.len(),
                            failed = report.failed.len(),
                            skipped = report.skipped,
                            held = report.held,
                            "Iteration complete"
                        ),
                        Ok(_) => debug!("No matured commitments"),
                        Err(e) => warn!(error = %e, "Poll failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Reveal orchestrator stopped");
    }

    /// One poll over matured commitments.
    ///
    /// A failing commitment is logged and does not stop the others.
    pub async fn run_once(&self) -> Result<IterationReport, SettlementError> {
        let pending = self
            .io("poll", self.collaborators.chain.pending_commitments(Utc::now()))
            .await?;

        let pruned = self
            .claims
            .prune_settled(|id| pending.iter().any(|p| p.commitment_ref == id))
            .await;
        if pruned > 0 {
            debug!(pruned, "Pruned settled claims");
        }

        let mut report = IterationReport {
            found: pending.len(),
            ..Default::default()
        };

        for commitment in pending {
            if self.claims.is_settled(&commitment.commitment_ref).await {
                report.skipped += 1;
                continue;
            }
            if self.claims.held_kind(&commitment.commitment_ref).await.is_some() {
                report.held += 1;
                continue;
            }
            match self.settle(&commitment).await {
                Ok(outcome) => report.settled.push(outcome),
                Err(SettlementError::AlreadyClaimed(_)) => report.skipped += 1,
                Err(SettlementError::Held(_)) => report.held += 1,
                Err(e) => {
                    error!(commitment = %commitment.commitment_ref, kind = ?e.kind(), error = %e, "Settlement failed");
                    report.failed.push((commitment.commitment_ref.clone(), e));
                }
            }
        }
        Ok(report)
    }

    /// Settle one commitment with bounded retries.
    ///
    /// A terminal failure holds the commitment until
    /// `ClaimRegistry::reinstate` releases it.
    #[instrument(skip(self, pending), fields(commitment = %pending.commitment_ref))]
    pub async fn settle(&self, pending: &PendingCommitment) -> Result<SettlementOutcome, SettlementError> {
        let claim = self.claims.try_claim(&pending.commitment_ref).await?;
        let mut recorded = claim.built;
        let mut tracker = StateTracker::new(pending.commitment_ref.clone());
        tracker.advance(OrchestratorState::Polling)?;

        let mut attempt = 1;
        loop {
            tracker.advance(OrchestratorState::Found)?;
            match self.attempt(pending, recorded.as_ref(), &mut tracker).await {
                Ok(tx) => {
                    tracker.advance(OrchestratorState::Idle)?;
                    self.claims.mark_settled(&pending.commitment_ref, tx.tx_id_hex()).await;
                    info!(tx_id = %tx.tx_id_hex(), reward = tx.reward, attempts = attempt, "Settled");
                    return Ok(SettlementOutcome {
                        commitment_ref: pending.commitment_ref.clone(),
                        tx_id: tx.tx_id_hex(),
                        accuracy: tx.accuracy,
                        reward: tx.reward,
                        payout: tx.outputs.payout,
                        attempts: attempt,
                        states: tracker.history().to_vec(),
                    });
                }
                Err(e) => {
                    tracker.fail();
                    recorded = self.claims.built_tx(&pending.commitment_ref).await;

                    if self.config.retry.should_retry(attempt, &e) {
                        let delay = self.config.retry.backoff(attempt);
                        warn!(attempt, error = %e, delay = ?delay, "Settlement attempt failed, retrying");
                        tokio::time::sleep(delay).await;
                        tracker.advance(OrchestratorState::Polling)?;
                        attempt += 1;
                        continue;
                    }

                    tracker.advance(OrchestratorState::Idle)?;
                    self.claims.hold(&pending.commitment_ref, e.kind()).await;
                    if e.is_retryable() {
                        error!(attempts = attempt, error = %e, "Settlement escalated");
                        return Err(SettlementError::Escalated {
                            commitment_ref: pending.commitment_ref.clone(),
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }
                    return Err(e);
                }
            }
        }
    }

    /// One pass through the pipeline.
    async fn attempt(
        &self,
        pending: &PendingCommitment,
        recorded: Option<&SettlementTx>,
        tracker: &mut StateTracker,
    ) -> Result<SettlementTx, SettlementError> {
        if let Some(tx) = recorded {
            tracker.advance(OrchestratorState::TxBuilding)?;
            let _pool = self.pool_lock.lock().await;
            debug!(tx_id = %tx.tx_id_hex(), "Re-submitting recorded settlement");
            let landed = self.submit_or_rebuild(pending, tx).await?;
            tracker.advance(OrchestratorState::Submitted)?;
            return Ok(landed);
        }

        tracker.advance(OrchestratorState::Scoring)?;
        let payload = self.reveal(pending).await?;
        let scored = self.score(pending, &payload).await?;
        let accuracy = scored.accuracy();

        tracker.advance(OrchestratorState::RewardComputed)?;
        let amount = reward(accuracy, &self.config.curve);
        debug!(accuracy, reward = amount, method = %scored.method, "Reward computed");

        tracker.advance(OrchestratorState::TxBuilding)?;
        let _pool = self.pool_lock.lock().await;
        let pool = self.io("reward_pool", self.collaborators.chain.reward_pool()).await?;
        let tx = build_settlement(pending, &pool, accuracy, amount, &self.config.settlement)?;
        self.claims.record_built(&pending.commitment_ref, &tx).await;
        let landed = self.submit_or_rebuild(pending, &tx).await?;
        tracker.advance(OrchestratorState::Submitted)?;
        Ok(landed)
    }

    /// Submit `tx`; on a pool conflict, rebuild it against the current pool.
    ///
    /// Caller holds the pool lock. A conflicting transaction has a spent
    /// input and can never land, so replacing it cannot double-settle. The
    /// rebuild reuses the recorded accuracy and reward.
    async fn submit_or_rebuild(
        &self,
        pending: &PendingCommitment,
        tx: &SettlementTx,
    ) -> Result<SettlementTx, SettlementError> {
        match self.submit(tx).await {
            Ok(()) => return Ok(tx.clone()),
            Err(SettlementError::Collaborator {
                source: CollaboratorError::Conflict(reason),
                ..
            }) => debug!(tx_id = %tx.tx_id_hex(), %reason, "Submission conflicted"),
            Err(e) => return Err(e),
        }

        let still_pending = self
            .io("is_pending", self.collaborators.chain.is_pending(&pending.commitment_ref))
            .await?;
        if !still_pending {
            info!(tx_id = %tx.tx_id_hex(), "Recorded settlement already on chain");
            return Ok(tx.clone());
        }

        let pool = self.io("reward_pool", self.collaborators.chain.reward_pool()).await?;
        let rebuilt = build_settlement(pending, &pool, tx.accuracy, tx.reward, &self.config.settlement)?;
        warn!(
            stale = %tx.tx_id_hex(),
            tx_id = %rebuilt.tx_id_hex(),
            claim_count = pool.claim_count,
            "Pool input spent, rebuilt settlement"
        );
        self.claims.supersede_built(&pending.commitment_ref, &rebuilt).await;
        self.submit(&rebuilt).await?;
        Ok(rebuilt)
    }

    /// Fetch and decrypt the payload, and check it opens the commitment.
    async fn reveal(&self, pending: &PendingCommitment) -> Result<PredictionPayload, SettlementError> {
        let envelope = self
            .io("fetch", self.collaborators.content.fetch(&pending.content_id))
            .await?;

        let encryption = Arc::clone(&self.encryption);
        let payload = tokio::task::spawn_blocking(move || {
            encryption.decrypt_json::<PredictionPayload>(&envelope, None)
        })
        .await
        .map_err(|e| SettlementError::TaskFailed(e.to_string()))??;

        if !payload.opens(&pending.commitment_hash) {
            return Err(CommitmentError::PreimageMismatch.into());
        }
        Ok(payload)
    }

    async fn score(
        &self,
        pending: &PendingCommitment,
        payload: &PredictionPayload,
    ) -> Result<ScoringResponse, SettlementError> {
        let request = ScoringRequest {
            commitment_hash: hex::encode(pending.commitment_hash),
            content_id: pending.content_id.clone(),
            target_ref: pending.target_ref.clone(),
            response: payload.prediction.clone(),
        };
        let response = self.io("score", self.collaborators.scorer.score(&request)).await?;

        if !response.score.is_finite() || !(0.0..=1.0).contains(&response.score) {
            return Err(SettlementError::InvalidScore(response.score));
        }
        Ok(response)
    }

    async fn submit(&self, tx: &SettlementTx) -> Result<(), SettlementError> {
        self.io("submit", self.collaborators.submitter.submit(tx)).await
    }

    /// Run a collaborator call under the I/O timeout.
    async fn io<T, F>(&self, operation: &'static str, call: F) -> Result<T, SettlementError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        match timeout(self.config.io_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(SettlementError::Collaborator { operation, source }),
            Err(_) => Err(SettlementError::Timeout { operation }),
        }
    }
}
