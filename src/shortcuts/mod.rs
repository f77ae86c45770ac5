//! Shortcuts: actions that build transactions for a position
//!
//! A [`ShortcutsHook`] exposes an app's shortcuts for a network. Triggering one
//! validates the raw arguments against its declared inputs, runs its
//! [`TriggerHandler`] and hands the result to the [`TransactionBuilder`], which
//! adds approvals and gas.

pub mod builder;
pub mod validation;

pub use builder::{trigger_shortcut, TransactionBuilder};
pub use validation::{
    validate_trigger_args, ArgValue, FieldError, FieldKind, InputField, TokenAmount, TriggerArgs,
    ValidationError,
};

use crate::config::NetworkId;
use crate::error::Result;
use crate::positions::DataProps;
use crate::tokens::lowercase_address;
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShortcutCategory {
    Claim,
    Deposit,
    Withdraw,
    SwapDeposit,
}

fn lowercase_hex<S: Serializer>(address: &Address, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&lowercase_address(address))
}

fn decimal_string<S, T>(value: &Option<T>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
    T: fmt::Display,
{
    match value {
        Some(value) => serializer.collect_str(value),
        None => serializer.serialize_none(),
    }
}

/// Unsigned transaction returned to the wallet
///
/// Addresses serialize lowercase; integers as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub network_id: NetworkId,
    #[serde(serialize_with = "lowercase_hex")]
    pub from: Address,
    #[serde(serialize_with = "lowercase_hex")]
    pub to: Address,
    pub data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "decimal_string")]
    pub value: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "decimal_string")]
    pub gas: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "decimal_string")]
    pub estimated_gas_use: Option<u64>,
}

impl Transaction {
    pub fn new(network_id: NetworkId, from: Address, to: Address, data: Bytes) -> Self {
        Self {
            network_id,
            from,
            to,
            data,
            value: None,
            gas: None,
            estimated_gas_use: None,
        }
    }
}

/// ERC-20 allowance a trigger's transactions rely on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSpend {
    pub token: Address,
    pub spender: Address,
    /// Raw token amount
    pub amount: U256,
}

/// What trigger logic produces, before approvals and gas
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerOutput {
    pub transactions: Vec<Transaction>,
    pub data_props: Option<DataProps>,
    pub spend: Option<TokenSpend>,
}

/// Response of a triggered shortcut
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResult {
    pub transactions: Vec<Transaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_props: Option<DataProps>,
}

/// Trigger logic of a shortcut
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    async fn on_trigger(&self, args: &TriggerArgs) -> Result<TriggerOutput>;
}

#[derive(Clone)]
pub struct Shortcut {
    pub id: String,
    pub name: String,
    pub description: String,
    pub network_ids: Vec<NetworkId>,
    pub category: ShortcutCategory,
    pub trigger_input_shape: Vec<InputField>,
    pub on_trigger: Arc<dyn TriggerHandler>,
    /// Gas used for each intent transaction when simulation is unavailable
    pub fallback_gas: Option<u64>,
}

impl Shortcut {
    pub fn supports_network(&self, network: NetworkId) -> bool {
        self.network_ids.contains(&network)
    }
}

impl fmt::Debug for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shortcut")
            .field("id", &self.id)
            .field("network_ids", &self.network_ids)
            .field("category", &self.category)
            .field("fallback_gas", &self.fallback_gas)
            .finish_non_exhaustive()
    }
}

/// Shortcut as listed to clients, without its trigger logic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutInfo {
    pub app_id: String,
    pub id: String,
    pub name: String,
    pub description: String,
    pub network_ids: Vec<NetworkId>,
    pub category: ShortcutCategory,
}

impl ShortcutInfo {
    pub fn new(app_id: &str, shortcut: &Shortcut) -> Self {
        Self {
            app_id: app_id.to_string(),
            id: shortcut.id.clone(),
            name: shortcut.name.clone(),
            description: shortcut.description.clone(),
            network_ids: shortcut.network_ids.clone(),
            category: shortcut.category,
        }
    }
}

/// App adapter exposing shortcuts
#[async_trait]
pub trait ShortcutsHook: Send + Sync {
    fn app_id(&self) -> &str;

    async fn shortcut_definitions(
        &self,
        network: NetworkId,
        address: Option<Address>,
    ) -> Result<Vec<Shortcut>>;
}
