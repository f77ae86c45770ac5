//! stCELO liquid staking

use super::object;
use crate::chain::{erc20, ChainClient, ContractCall};
use crate::config::NetworkId;
use crate::error::Result;
use crate::numbers::DecimalNumber;
use crate::positions::{
    unknown_app_token, AppInfo, AppTokenPositionDefinition, ClaimType, DataProps, Deferrable,
    DisplayProps, PositionDefinition, PositionsHook, Risk, Safety, SafetyLevel,
    ShortcutTriggerArgs, YieldRate,
};
use crate::shortcuts::{
    InputField, FieldKind, Shortcut, ShortcutCategory, ShortcutsHook, Transaction, TriggerArgs,
    TriggerHandler, TriggerOutput,
};
use crate::tokens::{lowercase_address, TokenDefinition, TokenId};
use alloy::primitives::{address, Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const APP_ID: &str = "stcelo";

sol! {
    interface IStakedCelo {
        function exchangeRate() external view returns (uint256);
        function totalAssets() external view returns (uint256);
        function deposit(uint256 amount) external;
        function withdraw(uint256 amount) external;
    }
}

const MANAGE_URL: &str = "https://app.stcelo.xyz";

/// (stCELO, CELO) on networks where stCELO is deployed
fn addresses(network: NetworkId) -> Option<(Address, Address)> {
    match network {
        NetworkId::CeloMainnet => Some((
            address!("4aAD04D41FD7fd495503731C5a2579e19054C432"),
            address!("471EcE3750Da237f93B8E339c536989b8978a438"),
        )),
        NetworkId::CeloAlfajores => Some((
            address!("d11CC172D802c1a94e81c5F432471bD34d1828A1"),
            address!("F194afDf50B03e69Bd7D057c1Aa9e10c9954E4C9"),
        )),
        _ => None,
    }
}

fn one_ether() -> U256 {
    U256::from(10u64).pow(U256::from(18u64))
}

pub struct StCeloPositions {
    chain: Arc<dyn ChainClient>,
}

impl StCeloPositions {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }

    /// Exchange rate and total assets, defaulting to 1:1 and zero when unreadable
    async fn read_state(&self, network: NetworkId, stcelo: Address) -> (U256, U256) {
        let read = async {
            let results = self
                .chain
                .multicall(
                    network,
                    vec![
                        ContractCall::new(stcelo, &IStakedCelo::exchangeRateCall {}),
                        ContractCall::new(stcelo, &IStakedCelo::totalAssetsCall {}),
                    ],
                )
                .await?;
            let rate = results.first().map(|raw| {
                erc20::decode_return::<IStakedCelo::exchangeRateCall>(stcelo, raw)
            });
            let total = results.get(1).map(|raw| {
                erc20::decode_return::<IStakedCelo::totalAssetsCall>(stcelo, raw)
            });
            match (rate, total) {
                (Some(rate), Some(total)) => Ok((rate?, total?)),
                _ => Err(crate::Error::Chain("incomplete stCELO state".to_string())),
            }
        };

        match read.await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(network = %network, error = %e, "Failed to fetch stCELO contract data");
                (one_ether(), U256::ZERO)
            }
        }
    }

    async fn definition(&self, network: NetworkId, stcelo: Address, celo: Address) -> AppTokenPositionDefinition {
        let (exchange_rate, total_assets) = self.read_state(network, stcelo).await;
        let celo_id = TokenId::new(network, &celo);

        let mut trigger_args = ShortcutTriggerArgs::new();
        trigger_args.insert(
            "deposit".to_string(),
            object(json!({
                "tokenAddress": lowercase_address(&celo),
                "tokenDecimals": 18,
                "positionAddress": lowercase_address(&stcelo),
            })),
        );
        trigger_args.insert(
            "withdraw".to_string(),
            object(json!({
                "tokenDecimals": 18,
                "positionAddress": lowercase_address(&stcelo),
            })),
        );

        AppTokenPositionDefinition {
            network_id: network,
            address: stcelo,
            tokens: vec![TokenDefinition::new(network, celo).with_fallback_price(DecimalNumber::one())],
            price_per_share: Deferrable::Fixed(vec![DecimalNumber::from_raw(exchange_rate, 18)]),
            display_props: Deferrable::Fixed(DisplayProps {
                title: "stCELO".to_string(),
                description: "Liquid Staked CELO - Earn staking rewards while keeping your CELO liquid. Note: 3-day unstaking period applies.".to_string(),
                image_url: "https://app.stcelo.xyz/_next/static/media/token-stcelo.5935f866.svg".to_string(),
                manage_url: Some(MANAGE_URL.to_string()),
            }),
            data_props: Some(Deferrable::Fixed(DataProps {
                deposit_token_id: Some(celo_id.clone()),
                withdraw_token_id: Some(TokenId::new(network, &stcelo)),
                // Rewards show up as a rising exchange rate
                yield_rates: vec![YieldRate {
                    percentage: DecimalNumber::zero(),
                    label: "Variable rate from Celo epoch rewards (no protocol fees)".to_string(),
                    token_id: celo_id,
                }],
                earning_items: Vec::new(),
                tvl: Some(DecimalNumber::from_raw(total_assets, 18)),
                manage_url: Some(MANAGE_URL.to_string()),
                terms_url: Some("https://docs.stcelo.xyz/disclaimer".to_string()),
                claim_type: Some(ClaimType::Earnings),
                cant_separate_compounded_interest: Some(true),
                safety: Some(Safety {
                    level: SafetyLevel::Low,
                    risks: vec![
                        Risk {
                            is_positive: true,
                            title: "Non-custodial protocol".to_string(),
                            category: "security".to_string(),
                        },
                        Risk {
                            is_positive: true,
                            title: "No principal slashing risk".to_string(),
                            category: "security".to_string(),
                        },
                        Risk {
                            is_positive: false,
                            title: "3-day withdrawal period".to_string(),
                            category: "liquidity".to_string(),
                        },
                    ],
                }),
            })),
            available_shortcut_ids: vec!["deposit".to_string(), "withdraw".to_string()],
            shortcut_trigger_args: trigger_args,
        }
    }
}

#[async_trait]
impl PositionsHook for StCeloPositions {
    fn info(&self) -> AppInfo {
        AppInfo::new(APP_ID, "stCELO", "Liquid staked CELO")
    }

    fn supports_network(&self, network: NetworkId) -> bool {
        addresses(network).is_some()
    }

    async fn position_definitions(
        &self,
        network: NetworkId,
        address: Option<Address>,
    ) -> Result<Vec<PositionDefinition>> {
        let (Some((stcelo, celo)), Some(_)) = (addresses(network), address) else {
            return Ok(Vec::new());
        };
        Ok(vec![self.definition(network, stcelo, celo).await.into()])
    }

    async fn app_token_definition(
        &self,
        token: &TokenDefinition,
    ) -> Result<AppTokenPositionDefinition> {
        match addresses(token.network_id) {
            Some((stcelo, celo)) if stcelo == token.address => {
                Ok(self.definition(token.network_id, stcelo, celo).await)
            }
            _ => Err(unknown_app_token(token)),
        }
    }
}

enum StakeAction {
    Deposit,
    Withdraw,
}

struct StakeTrigger {
    stcelo: Address,
    action: StakeAction,
}

#[async_trait]
impl TriggerHandler for StakeTrigger {
    async fn on_trigger(&self, args: &TriggerArgs) -> Result<TriggerOutput> {
        let decimals = args.decimals("tokenDecimals")?;
        let tokens = args.token_amounts("tokens")?;
        let amount = match tokens.first() {
            Some(token) => token.amount.to_raw(decimals)?,
            None => return Err(crate::Error::InvalidArgument("no token amount".to_string())),
        };

        let data = match self.action {
            StakeAction::Deposit => IStakedCelo::depositCall { amount }.abi_encode(),
            StakeAction::Withdraw => IStakedCelo::withdrawCall { amount }.abi_encode(),
        };
        Ok(TriggerOutput {
            transactions: vec![Transaction::new(
                args.network_id,
                args.address,
                self.stcelo,
                Bytes::from(data),
            )],
            ..Default::default()
        })
    }
}

pub struct StCeloShortcuts;

#[async_trait]
impl ShortcutsHook for StCeloShortcuts {
    fn app_id(&self) -> &str {
        APP_ID
    }

    async fn shortcut_definitions(
        &self,
        network: NetworkId,
        _address: Option<Address>,
    ) -> Result<Vec<Shortcut>> {
        let Some((stcelo, _)) = addresses(network) else {
            return Ok(Vec::new());
        };

        Ok(vec![
            Shortcut {
                id: "deposit".to_string(),
                name: "Deposit".to_string(),
                description: "Stake CELO to earn rewards".to_string(),
                network_ids: vec![network],
                category: ShortcutCategory::Deposit,
                trigger_input_shape: vec![
                    InputField::token_amounts("tokens", 1),
                    InputField::new("tokenAddress", FieldKind::Address),
                    InputField::new("tokenDecimals", FieldKind::Integer),
                ],
                on_trigger: Arc::new(StakeTrigger {
                    stcelo,
                    action: StakeAction::Deposit,
                }),
                fallback_gas: None,
            },
            Shortcut {
                id: "withdraw".to_string(),
                name: "Withdraw".to_string(),
                description: "Unstake CELO (3-day waiting period)".to_string(),
                network_ids: vec![network],
                category: ShortcutCategory::Withdraw,
                trigger_input_shape: vec![
                    InputField::token_amounts("tokens", 1),
                    InputField::new("tokenDecimals", FieldKind::Integer),
                ],
                on_trigger: Arc::new(StakeTrigger {
                    stcelo,
                    action: StakeAction::Withdraw,
                }),
                fallback_gas: None,
            },
        ])
    }
}
