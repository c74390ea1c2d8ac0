//! Runtime configuration and the injected service context.
//!
//! Everything is read from the environment once at startup. Key material
//! is required; every tuning knob has a default.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::auth::{LoginService, SessionConfig, SignatureVerifier};
use crate::crypto::EncryptionService;
use crate::rewards::{CurveError, LotteryEngine, LotteryError, RewardCurveParams, SelectionPolicy};
use crate::settlement::ErrorKind;

/// Configuration errors. All are fatal at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Required secret is not set.
    #[error("missing secret: {0}")]
    MissingSecret(&'static str),
    /// Variable is set but unparseable.
    #[error("invalid value for {var}: {value:?}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
    /// Reward curve parameters are inconsistent.
    #[error(transparent)]
    Curve(#[from] CurveError),
    /// Lottery parameters are inconsistent.
    #[error(transparent)]
    Lottery(#[from] LotteryError),
}

impl ConfigError {
    /// Handling class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingSecret(_) => ErrorKind::MissingSecret,
            Self::Invalid { .. } | Self::Curve(_) | Self::Lottery(_) => ErrorKind::MalformedInput,
        }
    }
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Key material for payload encryption.
    pub encryption_key: String,
    /// Session token settings.
    pub session: SessionConfig,
    /// Name shown in the challenge message.
    pub app_name: String,
    /// Delay between orchestrator polls.
    pub poll_interval: Duration,
    /// Limit on each collaborator call.
    pub io_timeout: Duration,
    /// Attempts per settlement before escalation.
    pub max_settlement_attempts: u32,
    /// Accuracy → reward curve.
    pub reward_curve: RewardCurveParams,
    /// Ticket blend factor.
    pub lottery_alpha: f64,
    /// Settlement fee in basis points.
    pub settlement_fee_bps: u16,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("app_name", &self.app_name)
            .field("poll_interval", &self.poll_interval)
            .field("io_timeout", &self.io_timeout)
            .field("max_settlement_attempts", &self.max_settlement_attempts)
            .field("reward_curve", &self.reward_curve)
            .field("lottery_alpha", &self.lottery_alpha)
            .field("settlement_fee_bps", &self.settlement_fee_bps)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let encryption_key = lookup("ENCRYPTION_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingSecret("ENCRYPTION_KEY"))?;

        let reward_curve = RewardCurveParams {
            base: parse_or(&lookup, "REWARD_BASE", 100)?,
            max: parse_or(&lookup, "REWARD_MAX", 400)?,
            steepness: parse_or(&lookup, "REWARD_STEEPNESS", 2.5)?,
        };
        reward_curve.validate()?;

        let config = Self {
            encryption_key,
            session: SessionConfig {
                secret: lookup("SESSION_SECRET"),
                ..SessionConfig::default()
            },
            app_name: lookup("APP_NAME").unwrap_or_else(|| "Cognosis".to_string()),
            poll_interval: Duration::from_secs(parse_or(&lookup, "POLL_INTERVAL_SECS", 30)?),
            io_timeout: Duration::from_secs(parse_or(&lookup, "IO_TIMEOUT_SECS", 10)?),
            max_settlement_attempts: parse_or(&lookup, "MAX_SETTLEMENT_ATTEMPTS", 5)?,
            reward_curve,
            lottery_alpha: parse_or(&lookup, "LOTTERY_ALPHA", 0.5)?,
            settlement_fee_bps: parse_or(&lookup, "SETTLEMENT_FEE_BPS", 100)?,
        };
        // Validate alpha up front rather than at the first draw
        LotteryEngine::new(config.lottery_alpha, SelectionPolicy::WeightedCumulative)?;
        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

/// Shared services built once from configuration and passed down.
#[derive(Clone)]
pub struct ServiceContext {
    /// Loaded configuration.
    pub config: Arc<AppConfig>,
    /// Payload encryption.
    pub encryption: Arc<EncryptionService>,
    /// Wallet login flow.
    pub login: Arc<LoginService>,
}

impl ServiceContext {
    /// Build the context.
    pub fn new(config: AppConfig) -> Self {
        let encryption = Arc::new(EncryptionService::new(config.encryption_key.as_bytes()));
        let verifier = SignatureVerifier::new(config.app_name.clone());
        let login = Arc::new(LoginService::new(verifier, config.session.clone()));
        Self {
            config: Arc::new(config),
            encryption,
            login,
        }
    }

    /// Lottery engine with the configured alpha.
    pub fn lottery(&self, policy: SelectionPolicy) -> Result<LotteryEngine, LotteryError> {
        LotteryEngine::new(self.config.lottery_alpha, policy)
    }
}
