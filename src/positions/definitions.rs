//! Position definitions emitted by hooks
//!
//! Hooks describe positions without knowing anything about the tokens they
//! reference. Values that depend on resolved tokens (share prices, balances,
//! titles built from symbols) are deferred: pure functions over the resolved
//! token map, evaluated once every underlying token is resolved.

use crate::config::NetworkId;
use crate::error::Result;
use crate::numbers::DecimalNumber;
use crate::tokens::{ResolvedTokens, TokenDefinition, TokenId};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Pure function over the resolved tokens of a request
pub type DeferredFn<T> = Arc<dyn Fn(&ResolvedTokens) -> Result<T> + Send + Sync>;

/// A value given up front or computed once tokens are resolved
#[derive(Clone)]
pub enum Deferrable<T> {
    Fixed(T),
    Deferred(DeferredFn<T>),
}

impl<T: Clone> Deferrable<T> {
    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn(&ResolvedTokens) -> Result<T> + Send + Sync + 'static,
    {
        Deferrable::Deferred(Arc::new(f))
    }

    pub fn evaluate(&self, tokens: &ResolvedTokens) -> Result<T> {
        match self {
            Deferrable::Fixed(value) => Ok(value.clone()),
            Deferrable::Deferred(f) => f(tokens),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferrable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deferrable::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Deferrable::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl<T> From<T> for Deferrable<T> {
    fn from(value: T) -> Self {
        Deferrable::Fixed(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayProps {
    pub title: String,
    pub description: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClaimType {
    Earnings,
    Rewards,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldRate {
    /// Annual rate in percent
    pub percentage: DecimalNumber,
    pub label: String,
    pub token_id: TokenId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningItem {
    pub amount: DecimalNumber,
    pub label: String,
    pub token_id: TokenId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_in_total: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SafetyLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Risk {
    pub is_positive: bool,
    pub title: String,
    /// e.g. `security`, `liquidity`
    pub category: String,
}

/// Risk summary shown next to a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Safety {
    pub level: SafetyLevel,
    pub risks: Vec<Risk>,
}

/// Optional earning metadata attached to a position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataProps {
    #[serde(default)]
    pub yield_rates: Vec<YieldRate>,
    #[serde(default)]
    pub earning_items: Vec<EarningItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvl: Option<DecimalNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_token_id: Option<TokenId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdraw_token_id: Option<TokenId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_type: Option<ClaimType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cant_separate_compounded_interest: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety: Option<Safety>,
}

/// Arguments pre-bound to a shortcut, keyed by shortcut id
pub type ShortcutTriggerArgs = BTreeMap<String, serde_json::Map<String, serde_json::Value>>;

/// Position held through an ERC-20 token issued by the app
#[derive(Debug, Clone)]
pub struct AppTokenPositionDefinition {
    pub network_id: NetworkId,
    pub address: Address,
    /// Underlying tokens, one share price per token
    pub tokens: Vec<TokenDefinition>,
    /// Amount of each underlying token backing one share
    pub price_per_share: Deferrable<Vec<DecimalNumber>>,
    pub display_props: Deferrable<DisplayProps>,
    pub data_props: Option<Deferrable<DataProps>>,
    pub available_shortcut_ids: Vec<String>,
    pub shortcut_trigger_args: ShortcutTriggerArgs,
}

impl AppTokenPositionDefinition {
    pub fn token_id(&self) -> TokenId {
        TokenId::new(self.network_id, &self.address)
    }
}

/// Position held inside a contract rather than as a token
#[derive(Debug, Clone)]
pub struct ContractPositionDefinition {
    pub network_id: NetworkId,
    /// Position identifier; not necessarily a token address
    pub address: String,
    pub tokens: Vec<TokenDefinition>,
    /// Wallet balance of each underlying token
    pub balances: Deferrable<Vec<DecimalNumber>>,
    pub display_props: Deferrable<DisplayProps>,
    pub data_props: Option<Deferrable<DataProps>>,
    pub available_shortcut_ids: Vec<String>,
    pub shortcut_trigger_args: ShortcutTriggerArgs,
}

#[derive(Debug, Clone)]
pub enum PositionDefinition {
    AppToken(Arc<AppTokenPositionDefinition>),
    ContractPosition(ContractPositionDefinition),
}

impl PositionDefinition {
    pub fn network_id(&self) -> NetworkId {
        match self {
            PositionDefinition::AppToken(def) => def.network_id,
            PositionDefinition::ContractPosition(def) => def.network_id,
        }
    }

    /// Every token this definition needs resolved, the app token itself included
    pub fn referenced_tokens(&self) -> Vec<TokenDefinition> {
        match self {
            PositionDefinition::AppToken(def) => {
                let mut tokens = Vec::with_capacity(def.tokens.len() + 1);
                tokens.push(TokenDefinition::new(def.network_id, def.address));
                tokens.extend(def.tokens.iter().cloned());
                tokens
            }
            PositionDefinition::ContractPosition(def) => def.tokens.clone(),
        }
    }
}

impl From<AppTokenPositionDefinition> for PositionDefinition {
    fn from(def: AppTokenPositionDefinition) -> Self {
        PositionDefinition::AppToken(Arc::new(def))
    }
}

impl From<ContractPositionDefinition> for PositionDefinition {
    fn from(def: ContractPositionDefinition) -> Self {
        PositionDefinition::ContractPosition(def)
    }
}
