//! Weighted Lottery
//!
//! Ticket counts blend a square-root term (rewards size) with a
//! logarithmic term (rewards participation):
//!
//! `tickets = floor(alpha * sqrt(w) + (1 - alpha) * 5 * ln(w + 1))`
//!
//! Two winner-selection policies exist and are kept separate. `Uniform`
//! ignores tickets entirely; `WeightedCumulative` walks the cumulative
//! ticket distribution.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::core::hash::{sha256, PaymentKeyHash};

/// Scale of the logarithmic ticket term.
const LOG_WEIGHT: f64 = 5.0;

/// 2^64 as f64, for mapping a seed into [0, 1).
const SEED_SPACE: f64 = 18_446_744_073_709_551_616.0;

/// Lottery errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LotteryError {
    /// Nobody entered.
    #[error("no participants")]
    NoParticipants,
    /// Weighted draw with zero total tickets.
    #[error("no tickets in draw")]
    NoTickets,
    /// Alpha outside [0, 1].
    #[error("alpha {0} outside [0, 1]")]
    InvalidAlpha(f64),
}

/// How the winner is picked from a seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// `seed mod participant_count`; tickets ignored.
    Uniform,
    /// Cumulative walk over ticket counts.
    WeightedCumulative,
}

/// One entrant in a drawing cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotteryParticipant {
    /// Entrant identity.
    pub payment_key_hash: PaymentKeyHash,
    /// Raw weight (e.g. stake or activity).
    pub weight_input: f64,
    /// Tickets for the current cycle.
    pub ticket_count: u64,
}

impl LotteryParticipant {
    /// Participant with tickets not yet computed.
    pub fn new(payment_key_hash: PaymentKeyHash, weight_input: f64) -> Self {
        Self {
            payment_key_hash,
            weight_input,
            ticket_count: 0,
        }
    }
}

/// Outcome of a draw.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawResult {
    /// Index of the winner in the participant list.
    pub winner_index: usize,
    /// Winner identity.
    pub payment_key_hash: PaymentKeyHash,
    /// Seed the draw used.
    pub seed: u64,
    /// Policy the draw used.
    pub policy: SelectionPolicy,
    /// Sum of tickets across participants.
    pub total_tickets: u64,
}

/// Ticket count for a weight.
pub fn calculate_tickets(weight_input: f64, alpha: f64) -> u64 {
    if weight_input.is_nan() || weight_input <= 0.0 {
        return 0;
    }
    let tickets = alpha * weight_input.sqrt() + (1.0 - alpha) * LOG_WEIGHT * weight_input.ln_1p();
    if tickets <= 0.0 {
        0
    } else {
        tickets.floor() as u64
    }
}

/// Uniform selection: `seed mod n`.
pub fn select_uniform(participant_count: usize, seed: u64) -> Result<usize, LotteryError> {
    if participant_count == 0 {
        return Err(LotteryError::NoParticipants);
    }
    Ok((seed % participant_count as u64) as usize)
}

/// Weighted selection over ticket counts.
///
/// The seed is mapped to [0, 1), scaled by the total, and the first
/// participant whose running ticket sum exceeds it wins.
pub fn select_weighted(participants: &[LotteryParticipant], seed: u64) -> Result<usize, LotteryError> {
    if participants.is_empty() {
        return Err(LotteryError::NoParticipants);
    }
    let total = total_tickets(participants);
    if total == 0 {
        return Err(LotteryError::NoTickets);
    }

    let target = (seed as f64 / SEED_SPACE) * total as f64;
    let mut running = 0u64;
    let mut last_with_tickets = 0;
    for (index, participant) in participants.iter().enumerate() {
        if participant.ticket_count == 0 {
            continue;
        }
        running = running.saturating_add(participant.ticket_count);
        last_with_tickets = index;
        if running as f64 > target {
            return Ok(index);
        }
    }
    // seed close to 2^64 can round target up to total
    Ok(last_with_tickets)
}

fn total_tickets(participants: &[LotteryParticipant]) -> u64 {
    participants
        .iter()
        .fold(0u64, |acc, p| acc.saturating_add(p.ticket_count))
}

/// Reduce an externally supplied VRF output to a draw seed.
pub fn seed_from_vrf_output(vrf_output: &[u8]) -> u64 {
    let digest = sha256(vrf_output);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Fresh seed from the OS CSPRNG.
pub fn random_seed() -> u64 {
    OsRng.next_u64()
}

/// Runs drawing cycles with fixed parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LotteryEngine {
    alpha: f64,
    policy: SelectionPolicy,
}

impl LotteryEngine {
    /// Create an engine; `alpha` must lie in [0, 1].
    pub fn new(alpha: f64, policy: SelectionPolicy) -> Result<Self, LotteryError> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(LotteryError::InvalidAlpha(alpha));
        }
        Ok(Self { alpha, policy })
    }

    /// Ticket blend factor.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Selection policy.
    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Recompute every participant's tickets from their weight.
    pub fn refresh_tickets(&self, participants: &mut [LotteryParticipant]) {
        for participant in participants.iter_mut() {
            participant.ticket_count = calculate_tickets(participant.weight_input, self.alpha);
        }
    }

    /// Refresh tickets and pick a winner from `seed`.
    pub fn draw(&self, participants: &mut [LotteryParticipant], seed: u64) -> Result<DrawResult, LotteryError> {
        self.refresh_tickets(participants);
        let winner_index = match self.policy {
            SelectionPolicy::Uniform => select_uniform(participants.len(), seed)?,
            SelectionPolicy::WeightedCumulative => select_weighted(participants, seed)?,
        };
        let result = DrawResult {
            winner_index,
            payment_key_hash: participants[winner_index].payment_key_hash,
            seed,
            policy: self.policy,
            total_tickets: total_tickets(participants),
        };
        info!(
            winner = %result.payment_key_hash,
            total_tickets = result.total_tickets,
            policy = ?result.policy,
            "Lottery drawn"
        );
        Ok(result)
    }

    /// Draw with a seed from the OS CSPRNG.
    pub fn draw_random(&self, participants: &mut [LotteryParticipant]) -> Result<DrawResult, LotteryError> {
        self.draw(participants, random_seed())
    }
}

// =============================================================================
// TESTS
// =============================================================================
