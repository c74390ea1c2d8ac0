//! Reward Computation
//!
//! - `curve.rs`   - accuracy to token reward
//! - `lottery.rs` - ticket weighting and winner selection

pub mod curve;
pub mod lottery;

pub use curve::{reward, CurveError, RewardCurveParams};
pub use lottery::{
    calculate_tickets, random_seed, seed_from_vrf_output, select_uniform, select_weighted, DrawResult,
    LotteryEngine, LotteryError, LotteryParticipant, SelectionPolicy,
};
