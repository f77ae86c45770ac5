//! DeFi Position Hooks
//!
//! Reports a wallet's positions across DeFi protocols and builds the
//! transactions behind protocol shortcuts:
//! - Protocol adapters emit position definitions
//! - App tokens are resolved recursively, with deduplication and cycle detection
//! - Shortcut arguments are validated and turned into ordered transaction lists
//!   with approvals and simulated gas
//!
//! # Layout
//!
//! - [`positions`]: hook trait, token resolver and position assembly
//! - [`shortcuts`]: shortcut types, argument validation and the transaction builder
//! - [`registry`]: the immutable sets of registered hooks
//! - [`apps`]: built-in protocol adapters

pub mod apps;
pub mod cache;
pub mod chain;
pub mod config;
pub mod numbers;
pub mod positions;
pub mod registry;
pub mod shortcuts;
pub mod simulation;
pub mod tokens;

mod error;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use chain::{ChainClient, RpcChainClient};
pub use config::{Config, NetworkId, RpcConfig};
pub use error::{Error, Result};
pub use numbers::DecimalNumber;
pub use positions::{Position, PositionResolver, PositionsHook};
pub use registry::{HookRegistry, ShortcutRegistry};
pub use shortcuts::{trigger_shortcut, ShortcutsHook, TransactionBuilder, TriggerResult};
pub use simulation::{HttpSimulator, RpcSimulator, TransactionSimulator};
pub use tokens::{HttpTokenInfoSource, StaticTokenInfoSource, TokenInfoSource};
