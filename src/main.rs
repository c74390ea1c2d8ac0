//! Cognosis Oracle CLI
//!
//! Offline operator tooling over the oracle core: snapshot export, claim
//! proofs, lottery draws, reward lookups and commitment sealing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cognosis::{
    proof::{Commitment, HolderBalance, MerkleTree, RewardSnapshot},
    rewards::{random_seed, reward, seed_from_vrf_output, LotteryParticipant, SelectionPolicy},
    AppConfig, EncryptionService, ServiceContext, VERSION,
};

#[derive(Parser, Debug)]
#[command(name = "cognosis-oracle", version)]
#[command(about = "Cognosis Oracle - commit/reveal settlement tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a reward snapshot from a holder list
    Snapshot {
        /// JSON array of holder balances
        holders: PathBuf,

        /// Accumulated pool to distribute
        pool: u64,

        /// Distribution period number
        period: u64,
    },

    /// Print the inclusion proof for one holder
    Proof {
        /// JSON array of holder balances
        holders: PathBuf,

        /// Holder address
        address: String,
    },

    /// Run a weighted lottery draw
    Draw {
        /// JSON array of lottery participants
        participants: PathBuf,

        /// VRF output (hex) to derive the seed from; random when omitted
        vrf: Option<String>,
    },

    /// Reward for an accuracy percentage under the configured curve
    Reward {
        /// Accuracy in percent
        accuracy: f64,
    },

    /// Issue a login challenge message
    Challenge {
        /// Wallet address (hex)
        address: String,
    },

    /// Seal a prediction commitment
    Commit {
        /// Owner reference
        owner: String,

        /// Prediction text
        prediction: String,

        /// Metadata recorded alongside the prediction
        metadata: String,
    },

    /// Generate encryption key material
    Keygen,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    info!("Cognosis Oracle v{}", VERSION);

    match cli.command {
        Command::Snapshot { holders, pool, period } => snapshot(&holders, pool, period),
        Command::Proof { holders, address } => proof(&holders, &address),
        Command::Draw { participants, vrf } => draw(&participants, vrf.as_deref()),
        Command::Reward { accuracy } => reward_for(accuracy),
        Command::Challenge { address } => challenge(&address),
        Command::Commit {
            owner,
            prediction,
            metadata,
        } => commit(&owner, &prediction, &metadata),
        Command::Keygen => {
            println!("{}", EncryptionService::generate_key());
            Ok(())
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

fn snapshot(holders: &Path, pool: u64, period: u64) -> Result<()> {
    let holders: Vec<HolderBalance> = read_json(holders)?;
    let (snapshot, _) = RewardSnapshot::build(&holders, pool, period, Utc::now())?;
    println!("{}", snapshot.to_json()?);
    Ok(())
}

fn proof(holders: &Path, address: &str) -> Result<()> {
    let holders: Vec<HolderBalance> = read_json(holders)?;
    let tree = MerkleTree::build(&holders)?;
    let holder = tree
        .holders()
        .iter()
        .find(|h| h.address == address)
        .with_context(|| format!("no holder with address {}", address))?;
    let proof = tree.generate_proof(holder)?;
    println!("{}", serde_json::to_string_pretty(&proof)?);
    Ok(())
}

fn draw(participants: &Path, vrf: Option<&str>) -> Result<()> {
    let mut participants: Vec<LotteryParticipant> = read_json(participants)?;
    let seed = match vrf {
        Some(vrf) => seed_from_vrf_output(&hex::decode(vrf).context("vrf output must be hex")?),
        None => random_seed(),
    };

    let ctx = ServiceContext::new(AppConfig::from_env()?);
    let engine = ctx.lottery(SelectionPolicy::WeightedCumulative)?;
    let result = engine.draw(&mut participants, seed)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn reward_for(accuracy: f64) -> Result<()> {
    let config = AppConfig::from_env()?;
    println!("{}", reward(accuracy, &config.reward_curve));
    Ok(())
}

fn challenge(address: &str) -> Result<()> {
    let ctx = ServiceContext::new(AppConfig::from_env()?);
    println!("{}", ctx.login.begin(address));
    Ok(())
}

fn commit(owner: &str, prediction: &str, metadata: &str) -> Result<()> {
    let ctx = ServiceContext::new(AppConfig::from_env()?);
    let (commitment, _) = Commitment::seal(owner, prediction, metadata.as_bytes(), &ctx.encryption)?;
    info!(id = %commitment.id, hash = %commitment.commitment_hash_hex(), "Sealed commitment");
    println!("{}", serde_json::to_string_pretty(&commitment)?);
    Ok(())
}
