//! Sommelier cellars (ERC-4626 vaults)

use crate::config::NetworkId;
use crate::error::{Error, Result};
use crate::shortcuts::{
    FieldKind, InputField, Shortcut, ShortcutCategory, ShortcutsHook, TokenSpend, Transaction,
    TriggerArgs, TriggerHandler, TriggerOutput,
};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;

pub const APP_ID: &str = "somm";

/// Used for the deposit when simulation is unavailable
pub const DEFAULT_DEPOSIT_GAS: u64 = 750_000;

sol! {
    interface ICellar {
        function deposit(uint256 assets, address receiver) external returns (uint256 shares);
        function redeem(uint256 shares, address receiver, address owner) external returns (uint256 assets);
    }
}

fn raw_amount(args: &TriggerArgs) -> Result<U256> {
    let decimals = args.decimals("tokenDecimals")?;
    match args.token_amounts("tokens")?.first() {
        Some(token) => Ok(token.amount.to_raw(decimals)?),
        None => Err(Error::InvalidArgument("no token amount".to_string())),
    }
}

struct Deposit;

#[async_trait]
impl TriggerHandler for Deposit {
    async fn on_trigger(&self, args: &TriggerArgs) -> Result<TriggerOutput> {
        let wallet = args.address;
        let cellar = args.address("positionAddress")?;
        let assets = raw_amount(args)?;

        let data = ICellar::depositCall {
            assets,
            receiver: wallet,
        }
        .abi_encode();
        Ok(TriggerOutput {
            transactions: vec![Transaction::new(args.network_id, wallet, cellar, Bytes::from(data))],
            data_props: None,
            spend: Some(TokenSpend {
                token: args.address("tokenAddress")?,
                spender: cellar,
                amount: assets,
            }),
        })
    }
}

struct Withdraw;

#[async_trait]
impl TriggerHandler for Withdraw {
    async fn on_trigger(&self, args: &TriggerArgs) -> Result<TriggerOutput> {
        let wallet = args.address;
        let cellar = args.address("positionAddress")?;

        // The amount is taken as given; maxRedeem is not consulted
        let data = ICellar::redeemCall {
            shares: raw_amount(args)?,
            receiver: wallet,
            owner: wallet,
        }
        .abi_encode();
        Ok(TriggerOutput {
            transactions: vec![Transaction::new(args.network_id, wallet, cellar, Bytes::from(data))],
            ..Default::default()
        })
    }
}

pub struct SommShortcuts;

#[async_trait]
impl ShortcutsHook for SommShortcuts {
    fn app_id(&self) -> &str {
        APP_ID
    }

    async fn shortcut_definitions(
        &self,
        network: NetworkId,
        _address: Option<Address>,
    ) -> Result<Vec<Shortcut>> {
        Ok(vec![
            Shortcut {
                id: "deposit".to_string(),
                name: "Deposit".to_string(),
                description: "Lend your assets to earn interest".to_string(),
                network_ids: vec![network],
                category: ShortcutCategory::Deposit,
                trigger_input_shape: vec![
                    InputField::token_amounts("tokens", 1),
                    InputField::new("positionAddress", FieldKind::Address),
                    InputField::new("tokenAddress", FieldKind::Address),
                    InputField::new("tokenDecimals", FieldKind::Integer),
                ],
                on_trigger: Arc::new(Deposit),
                fallback_gas: Some(DEFAULT_DEPOSIT_GAS),
            },
            Shortcut {
                id: "withdraw".to_string(),
                name: "Withdraw".to_string(),
                description: "Withdraw your assets".to_string(),
                network_ids: vec![network],
                category: ShortcutCategory::Withdraw,
                trigger_input_shape: vec![
                    InputField::token_amounts("tokens", 1),
                    InputField::new("positionAddress", FieldKind::Address),
                    InputField::new("tokenDecimals", FieldKind::Integer),
                ],
                on_trigger: Arc::new(Withdraw),
                fallback_gas: None,
            },
        ])
    }
}
