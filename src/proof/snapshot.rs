//! Reward Snapshots
//!
//! A snapshot freezes holder balances for one distribution period and
//! commits to them with a merkle root. The distribution collaborator
//! consumes the JSON export; holders later claim against the root.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::merkle::{HolderBalance, MerkleError, MerkleProof, MerkleTree};
use crate::core::hash::PaymentKeyHash;

/// Frozen holder set for one distribution period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardSnapshot {
    /// Hex merkle root over `holders`.
    pub merkle_root: String,
    /// Sum of all holder balances.
    pub total_supply: u64,
    /// Pool amount distributed this period.
    pub accumulated_pool: u64,
    /// When the balances were read.
    pub snapshot_timestamp: DateTime<Utc>,
    /// Distribution period number.
    pub period: u64,
    /// Holders in leaf order.
    pub holders: Vec<HolderBalance>,
}

impl RewardSnapshot {
    /// Build a snapshot and its merkle tree.
    pub fn build(
        holders: &[HolderBalance],
        accumulated_pool: u64,
        period: u64,
        snapshot_timestamp: DateTime<Utc>,
    ) -> Result<(Self, MerkleTree), MerkleError> {
        let tree = MerkleTree::build(holders)?;
        let total_supply = tree
            .holders()
            .iter()
            .fold(0u64, |acc, h| acc.saturating_add(h.balance));

        let snapshot = Self {
            merkle_root: tree.root_hex(),
            total_supply,
            accumulated_pool,
            snapshot_timestamp,
            period,
            holders: tree.holders().to_vec(),
        };

        info!(
            period,
            holders = snapshot.holders.len(),
            total_supply,
            root = %snapshot.merkle_root,
            "Built reward snapshot"
        );
        Ok((snapshot, tree))
    }

    /// Pro-rata share of the pool for `holder`, rounded down.
    pub fn holder_share(&self, holder: &HolderBalance) -> u64 {
        pro_rata(holder.balance, self.total_supply, self.accumulated_pool)
    }

    /// Serialize to the JSON export format.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// `balance * pool / supply` without intermediate overflow.
fn pro_rata(balance: u64, supply: u64, pool: u64) -> u64 {
    if supply == 0 {
        return 0;
    }
    let share = balance as u128 * pool as u128 / supply as u128;
    // share <= pool because balance <= supply
    u64::try_from(share).unwrap_or(pool)
}

/// A holder's claim for one period, with the proof it is checked against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardClaim {
    /// Claimant.
    pub holder: HolderBalance,
    /// Amount payable now, including carried-forward accruals.
    pub amount: u64,
    /// Inclusion proof against the snapshot root.
    pub proof: MerkleProof,
}

/// What happens to a sub-threshold accrual that is never topped up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarryForwardPolicy {
    /// Accruals carry over indefinitely.
    #[default]
    Persist,
    /// Accruals older than this many periods are forfeited.
    ExpireAfter(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Accrual {
    amount: u64,
    since_period: u64,
}

/// Result of settling one period against the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeriodSettlement {
    /// Claims at or above the minimum.
    pub claims: Vec<RewardClaim>,
    /// Holders whose share was carried forward.
    pub carried: usize,
    /// Total amount forfeited by expiry this period.
    pub expired: u64,
}

/// Carries sub-threshold shares between periods.
#[derive(Clone, Debug)]
pub struct AccrualLedger {
    min_claim: u64,
    policy: CarryForwardPolicy,
    entries: BTreeMap<PaymentKeyHash, Accrual>,
}

impl AccrualLedger {
    /// Create an empty ledger.
    pub fn new(min_claim: u64, policy: CarryForwardPolicy) -> Self {
        Self {
            min_claim,
            policy,
            entries: BTreeMap::new(),
        }
    }

    /// Amount currently carried for `holder`.
    pub fn carried(&self, holder: &PaymentKeyHash) -> u64 {
        self.entries.get(holder).map(|a| a.amount).unwrap_or(0)
    }

    /// Number of holders with a carried balance.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is carried.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply one period's snapshot.
    ///
    /// Each holder's share is added to their carried accrual. Totals at or
    /// above the minimum become claims and are cleared; the rest carry.
    pub fn settle_period(
        &mut self,
        snapshot: &RewardSnapshot,
        tree: &MerkleTree,
    ) -> Result<PeriodSettlement, MerkleError> {
        let mut result = PeriodSettlement {
            expired: self.expire(snapshot.period),
            ..Default::default()
        };

        for holder in &snapshot.holders {
            let share = snapshot.holder_share(holder);
            let previous = self.entries.remove(&holder.payment_key_hash);
            let amount = share.saturating_add(previous.map(|a| a.amount).unwrap_or(0));

            if amount == 0 {
                continue;
            }
            if amount >= self.min_claim {
                result.claims.push(RewardClaim {
                    holder: holder.clone(),
                    amount,
                    proof: tree.generate_proof(holder)?,
                });
            } else {
                let since_period = previous.map(|a| a.since_period).unwrap_or(snapshot.period);
                self.entries
                    .insert(holder.payment_key_hash, Accrual { amount, since_period });
                result.carried += 1;
            }
        }

        debug!(
            period = snapshot.period,
            claims = result.claims.len(),
            carried = result.carried,
            expired = result.expired,
            "Settled accrual period"
        );
        Ok(result)
    }

    fn expire(&mut self, period: u64) -> u64 {
        let max_age = match self.policy {
            CarryForwardPolicy::Persist => return 0,
            CarryForwardPolicy::ExpireAfter(n) => n,
        };
        let mut expired = 0u64;
        self.entries.retain(|_, accrual| {
            let keep = period.saturating_sub(accrual.since_period) < max_age;
            if !keep {
                expired = expired.saturating_add(accrual.amount);
            }
            keep
        });
        expired
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn holder(address: &str, pkh_byte: u8, balance: u64) -> HolderBalance {
        HolderBalance {
            address: address.to_string(),
            payment_key_hash: PaymentKeyHash([pkh_byte; 28]),
            balance,
        }
    }

    fn snapshot(holders: &[HolderBalance], pool: u64, period: u64) -> (RewardSnapshot, MerkleTree) {
        RewardSnapshot::build(holders, pool, period, Utc::now()).unwrap()
    }

    #[test]
    fn test_snapshot_fields() {
        let holders = vec![holder("addr_b", 2, 300), holder("addr_a", 1, 100)];
        let (snap, tree) = snapshot(&holders, 1_000, 4);

        assert_eq!(snap.total_supply, 400);
        assert_eq!(snap.period, 4);
        assert_eq!(snap.merkle_root, tree.root_hex());
        assert_eq!(snap.holders[0].address, "addr_a");

        let json: serde_json::Value = serde_json::from_str(&snap.to_json().unwrap()).unwrap();
        assert_eq!(json["merkleRoot"], snap.merkle_root);
        assert_eq!(json["accumulatedPool"], 1_000);
        assert!(json["snapshotTimestamp"].is_string());
    }

    #[test]
    fn test_holder_share_pro_rata() {
        let holders = vec![holder("a", 1, 1), holder("b", 2, 2)];
        let (snap, _) = snapshot(&holders, 100, 1);
        assert_eq!(snap.holder_share(&holders[0]), 33);
        assert_eq!(snap.holder_share(&holders[1]), 66);
    }

    #[test]
    fn test_holder_share_large_values() {
        let holders = vec![holder("a", 1, u64::MAX / 2), holder("b", 2, u64::MAX / 2)];
        let (snap, _) = snapshot(&holders, u64::MAX, 1);
        assert_eq!(snap.holder_share(&holders[0]), u64::MAX / 2);
    }

    #[test]
    fn test_zero_supply_share() {
        let holders = vec![holder("a", 1, 0)];
        let (snap, _) = snapshot(&holders, 100, 1);
        assert_eq!(snap.holder_share(&holders[0]), 0);
    }

    #[test]
    fn test_claims_carry_proofs() {
        let holders = vec![holder("a", 1, 50), holder("b", 2, 50)];
        let (snap, tree) = snapshot(&holders, 100, 1);
        let mut ledger = AccrualLedger::new(10, CarryForwardPolicy::Persist);

        let settled = ledger.settle_period(&snap, &tree).unwrap();
        assert_eq!(settled.claims.len(), 2);
        for claim in &settled.claims {
            assert_eq!(claim.amount, 50);
            assert!(claim.proof.verify_holder(&claim.holder));
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_sub_threshold_carries_forward() {
        let small = holder("a", 1, 1);
        let big = holder("b", 2, 99);
        let mut ledger = AccrualLedger::new(5, CarryForwardPolicy::Persist);

        // Period 1: small holder earns 3, below the minimum of 5
        let (snap, tree) = snapshot(&[small.clone(), big.clone()], 300, 1);
        let settled = ledger.settle_period(&snap, &tree).unwrap();
        assert_eq!(settled.carried, 1);
        assert_eq!(ledger.carried(&small.payment_key_hash), 3);

        // Period 2: 3 + 3 crosses the minimum
        let (snap, tree) = snapshot(&[small.clone(), big], 300, 2);
        let settled = ledger.settle_period(&snap, &tree).unwrap();
        let claim = settled
            .claims
            .iter()
            .find(|c| c.holder == small)
            .expect("small holder claim");
        assert_eq!(claim.amount, 6);
        assert_eq!(ledger.carried(&small.payment_key_hash), 0);
    }

    #[test]
    fn test_persist_never_expires() {
        let small = holder("a", 1, 1);
        let big = holder("b", 2, 999);
        let mut ledger = AccrualLedger::new(1_000, CarryForwardPolicy::Persist);

        for period in 1..=10 {
            let (snap, tree) = snapshot(&[small.clone(), big.clone()], 100, period);
            let settled = ledger.settle_period(&snap, &tree).unwrap();
            assert_eq!(settled.expired, 0);
        }
        assert!(ledger.carried(&big.payment_key_hash) > 0);
    }

    #[test]
    fn test_expire_after_forfeits() {
        let h = holder("a", 1, 10);
        let mut ledger = AccrualLedger::new(1_000, CarryForwardPolicy::ExpireAfter(2));

        let (snap, tree) = snapshot(&[h.clone()], 100, 1);
        ledger.settle_period(&snap, &tree).unwrap();
        let (snap, tree) = snapshot(&[h.clone()], 100, 2);
        ledger.settle_period(&snap, &tree).unwrap();
        assert_eq!(ledger.carried(&h.payment_key_hash), 200);

        // Accrual started in period 1; at period 3 it is two periods old
        let (snap, tree) = snapshot(&[h.clone()], 100, 3);
        let settled = ledger.settle_period(&snap, &tree).unwrap();
        assert_eq!(settled.expired, 200);
        assert_eq!(ledger.carried(&h.payment_key_hash), 100);
    }
}
