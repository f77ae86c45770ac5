//! Position hooks and the position resolution engine
//!
//! A [`PositionsHook`] knows one protocol's contracts and emits
//! [`PositionDefinition`]s. [`PositionResolver`] runs every applicable hook,
//! resolves the tokens they reference through a request-scoped
//! [`TokenResolver`] and assembles valued [`Position`]s.

pub mod definitions;
pub mod output;
pub mod resolver;
pub mod runtime;

pub use definitions::{
    AppTokenPositionDefinition, ClaimType, ContractPositionDefinition, DataProps, Deferrable,
    DisplayProps, EarningItem, PositionDefinition, Risk, Safety, SafetyLevel, ShortcutTriggerArgs,
    YieldRate,
};
pub use output::{AppTokenPosition, ContractPosition, Position, Token};
pub use resolver::{Resolution, ResolutionError, TokenResolver};
pub use runtime::PositionResolver;

use crate::config::NetworkId;
use crate::error::{Error, Result};
use crate::tokens::{lowercase_address, TokenDefinition};
use alloy::primitives::Address;
use async_trait::async_trait;
use serde::Serialize;

/// Identity of a hook's app
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl AppInfo {
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// Protocol adapter reporting positions
#[async_trait]
pub trait PositionsHook: Send + Sync {
    fn info(&self) -> AppInfo;

    fn supports_network(&self, _network: NetworkId) -> bool {
        true
    }

    /// Positions the app may hold for `address`, or every position it knows of
    /// when no address is given
    async fn position_definitions(
        &self,
        network: NetworkId,
        address: Option<Address>,
    ) -> Result<Vec<PositionDefinition>>;

    /// Definition of an app token this hook owns.
    ///
    /// Fails with [`Error::UnknownAppToken`] for tokens owned by someone else.
    async fn app_token_definition(
        &self,
        token: &TokenDefinition,
    ) -> Result<AppTokenPositionDefinition> {
        Err(unknown_app_token(token))
    }
}

/// The "not mine" answer to [`PositionsHook::app_token_definition`]
pub fn unknown_app_token(token: &TokenDefinition) -> Error {
    Error::UnknownAppToken {
        network: token.network_id,
        address: lowercase_address(&token.address),
    }
}
