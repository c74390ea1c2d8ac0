//! Settlement transactions.
//!
//! A settlement spends the commitment record and the shared pool record
//! and produces three outputs: the participant payout, the pool fee, and
//! the updated pool. The transaction id is the SHA-256 of the bincode
//! encoding of everything else, so rebuilding from the same inputs always
//! yields the same id.

use serde::{Deserialize, Serialize};

use super::collaborators::PendingCommitment;
use super::error::SettlementError;
use crate::core::hash::{serde_hex, sha256, Digest32, PaymentKeyHash};

/// Basis-point denominator.
const BPS_DENOMINATOR: u64 = 10_000;

/// Shared reward pool record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardPoolState {
    /// On-chain reference of the pool record.
    pub pool_ref: String,
    /// Tokens remaining.
    pub balance: u64,
    /// Settled claims so far.
    pub claim_count: u64,
}

/// Fee applied to every settlement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementParams {
    /// Fee in basis points of the reward.
    pub fee_bps: u16,
}

impl Default for SettlementParams {
    fn default() -> Self {
        Self { fee_bps: 100 }
    }
}

impl SettlementParams {
    /// Fee on `reward`, rounded down.
    pub fn fee_for(&self, reward: u64) -> u64 {
        let fee = reward as u128 * self.fee_bps.min(BPS_DENOMINATOR as u16) as u128 / BPS_DENOMINATOR as u128;
        fee as u64
    }
}

/// Records spent by a settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementInputs {
    /// Commitment record.
    pub commitment_ref: String,
    /// Pool record.
    pub pool_ref: String,
}

/// Outputs produced by a settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementOutputs {
    /// Payout recipient.
    pub recipient: PaymentKeyHash,
    /// Tokens paid to the participant (reward − fee).
    pub payout: u64,
    /// Tokens sent to the shared fee pool.
    pub pool_fee: u64,
    /// Pool record after the claim.
    pub updated_pool: RewardPoolState,
}

#[derive(Serialize)]
struct TxBody<'a> {
    inputs: &'a SettlementInputs,
    outputs: &'a SettlementOutputs,
    commitment_hash: &'a Digest32,
    accuracy: f64,
    reward: u64,
}

/// A settlement ready for signing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementTx {
    /// Content-derived transaction id.
    #[serde(with = "serde_hex")]
    pub tx_id: Digest32,
    /// Spent records.
    pub inputs: SettlementInputs,
    /// Produced outputs.
    pub outputs: SettlementOutputs,
    /// Commitment being settled.
    #[serde(with = "serde_hex")]
    pub commitment_hash: Digest32,
    /// Accuracy percentage the reward was computed from.
    pub accuracy: f64,
    /// Reward drawn from the pool.
    pub reward: u64,
}

impl SettlementTx {
    /// Hex transaction id.
    pub fn tx_id_hex(&self) -> String {
        hex::encode(self.tx_id)
    }

    /// Recompute the id from the body.
    pub fn compute_id(&self) -> Result<Digest32, SettlementError> {
        compute_tx_id(&self.inputs, &self.outputs, &self.commitment_hash, self.accuracy, self.reward)
    }
}

fn compute_tx_id(
    inputs: &SettlementInputs,
    outputs: &SettlementOutputs,
    commitment_hash: &Digest32,
    accuracy: f64,
    reward: u64,
) -> Result<Digest32, SettlementError> {
    let body = TxBody {
        inputs,
        outputs,
        commitment_hash,
        accuracy,
        reward,
    };
    let bytes = bincode::serialize(&body).map_err(|e| SettlementError::Encoding(e.to_string()))?;
    Ok(sha256(&bytes))
}

/// Build the settlement for `pending` against the current pool.
pub fn build_settlement(
    pending: &PendingCommitment,
    pool: &RewardPoolState,
    accuracy: f64,
    reward: u64,
    params: &SettlementParams,
) -> Result<SettlementTx, SettlementError> {
    let balance = pool
        .balance
        .checked_sub(reward)
        .ok_or(SettlementError::InsufficientPool {
            balance: pool.balance,
            reward,
        })?;

    let fee = params.fee_for(reward);
    let inputs = SettlementInputs {
        commitment_ref: pending.commitment_ref.clone(),
        pool_ref: pool.pool_ref.clone(),
    };
    let outputs = SettlementOutputs {
        recipient: pending.owner,
        payout: reward - fee,
        pool_fee: fee,
        updated_pool: RewardPoolState {
            pool_ref: pool.pool_ref.clone(),
            balance,
            claim_count: pool.claim_count.saturating_add(1),
        },
    };

    let tx_id = compute_tx_id(&inputs, &outputs, &pending.commitment_hash, accuracy, reward)?;
    Ok(SettlementTx {
        tx_id,
        inputs,
        outputs,
        commitment_hash: pending.commitment_hash,
        accuracy,
        reward,
    })
}
