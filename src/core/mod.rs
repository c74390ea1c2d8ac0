//! Shared primitives.
//!
//! Digests and hex boundaries used by every component, plus runtime
//! configuration.

pub mod config;
pub mod hash;

// Re-export core types
pub use config::{AppConfig, ConfigError, ServiceContext};
pub use hash::{sha256, ContentHasher, Digest32, HashError, PaymentKeyHash};
