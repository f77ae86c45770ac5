//! Allbridge Core liquidity pools

use crate::cache::TtlCache;
use crate::chain::{erc20, ChainClient, ContractCall};
use crate::config::NetworkId;
use crate::error::{Error, Result};
use crate::numbers::DecimalNumber;
use crate::positions::{
    AppInfo, ClaimType, ContractPositionDefinition, DataProps, Deferrable, DisplayProps,
    EarningItem, PositionDefinition, PositionsHook, ShortcutTriggerArgs, YieldRate,
};
use crate::tokens::{lowercase_address, TokenDefinition, TokenId};
use alloy::primitives::{Address, U256};
use alloy::sol;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const APP_ID: &str = "allbridge";

const TOKEN_INFO_URL: &str = "https://core.api.allbridgecoreapi.net/token-info";
const IMAGE_URL: &str = "https://raw.githubusercontent.com/valora-inc/dapp-list/main/assets/allbridge.png";
const MANAGE_URL: &str = "https://core.allbridge.io/pools";

/// Pool LP amounts use 3 decimals regardless of the token
const LP_DECIMALS: u8 = 3;

sol! {
    interface IAllbridgePool {
        function balanceOf(address user) external view returns (uint256);
        function pendingReward(address user) external view returns (uint256);
    }
}

/// Allbridge's chain symbol for a network
fn chain_symbol(network: NetworkId) -> Option<&'static str> {
    match network {
        NetworkId::EthereumMainnet => Some("ETH"),
        NetworkId::CeloMainnet => Some("CEL"),
        NetworkId::PolygonPosMainnet => Some("POL"),
        NetworkId::ArbitrumOne => Some("ARB"),
        NetworkId::OpMainnet => Some("OPT"),
        NetworkId::BaseMainnet => Some("BAS"),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInfo {
    pub token_balance: String,
    pub v_usd_balance: String,
    pub total_lp_amount: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolToken {
    pub name: String,
    pub pool_address: Address,
    pub token_address: Address,
    pub decimals: u8,
    pub symbol: String,
    pub pool_info: PoolInfo,
    /// Annual rate as a fraction
    pub apr: DecimalNumber,
    pub lp_rate: Option<String>,
}

/// Allbridge deployment on one chain
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub tokens: Vec<PoolToken>,
    pub chain_id: u64,
    pub bridge_address: Option<String>,
}

enum FeedSource {
    Api { client: Client, timeout: Duration },
    Fixed(Value),
}

/// Token info feed covering every Allbridge chain, cached as a single entry
pub struct AllbridgeApi {
    source: FeedSource,
    cache: TtlCache<(), Arc<Value>>,
}

impl AllbridgeApi {
    pub fn new(ttl: Duration, timeout: Duration) -> Self {
        Self {
            source: FeedSource::Api {
                client: Client::new(),
                timeout,
            },
            cache: TtlCache::new(ttl, 1),
        }
    }

    pub fn with_feed(feed: Value) -> Self {
        Self {
            source: FeedSource::Fixed(feed),
            cache: TtlCache::new(Duration::from_secs(600), 1),
        }
    }

    async fn fetch(&self) -> Result<Arc<Value>> {
        match &self.source {
            FeedSource::Fixed(feed) => Ok(Arc::new(feed.clone())),
            FeedSource::Api { client, timeout } => {
                tracing::debug!(url = TOKEN_INFO_URL, "allbridge: requesting token info");
                let response = client.get(TOKEN_INFO_URL).timeout(*timeout).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    tracing::error!(status = %status, body = %body, "allbridge: request error");
                    return Err(Error::Upstream(format!(
                        "allbridge token info returned {}",
                        status
                    )));
                }
                tracing::debug!(status = %status, "allbridge: response received");
                Ok(Arc::new(response.json().await?))
            }
        }
    }

    /// Pools on `network`, or `None` where Allbridge is not deployed
    ///
    /// Chains are parsed on demand; the feed also lists non-EVM chains.
    pub async fn network_info(&self, network: NetworkId) -> Result<Option<NetworkInfo>> {
        let Some(symbol) = chain_symbol(network) else {
            return Ok(None);
        };
        let feed = self.cache.get_or_try_fetch((), || self.fetch()).await?;
        match feed.get(symbol) {
            Some(info) => Ok(Some(NetworkInfo::deserialize(info)?)),
            None => Ok(None),
        }
    }
}

pub struct AllbridgePositions {
    chain: Arc<dyn ChainClient>,
    api: AllbridgeApi,
}

impl AllbridgePositions {
    pub fn new(chain: Arc<dyn ChainClient>, api: AllbridgeApi) -> Self {
        Self { chain, api }
    }
}

fn pool_definition(
    network: NetworkId,
    pool: &PoolToken,
    lp_amount: U256,
    pending_reward: U256,
) -> Result<ContractPositionDefinition> {
    let token_id = TokenId::new(network, &pool.token_address);
    let percentage = pool.apr.checked_mul(&DecimalNumber::from_raw(U256::from(100u64), 0))?;

    Ok(ContractPositionDefinition {
        network_id: network,
        address: lowercase_address(&pool.pool_address),
        tokens: vec![TokenDefinition::new(network, pool.token_address)],
        balances: Deferrable::Fixed(vec![DecimalNumber::from_raw(lp_amount, LP_DECIMALS)]),
        display_props: Deferrable::Fixed(DisplayProps {
            title: pool.symbol.clone(),
            description: "Pool".to_string(),
            image_url: IMAGE_URL.to_string(),
            manage_url: Some(MANAGE_URL.to_string()),
        }),
        data_props: Some(Deferrable::Fixed(DataProps {
            yield_rates: vec![YieldRate {
                percentage,
                label: "Earnings APR".to_string(),
                token_id: token_id.clone(),
            }],
            earning_items: vec![EarningItem {
                amount: DecimalNumber::from_raw(pending_reward, pool.decimals),
                label: "Earnings".to_string(),
                token_id: token_id.clone(),
                include_in_total: Some(false),
            }],
            deposit_token_id: Some(token_id.clone()),
            withdraw_token_id: Some(token_id),
            manage_url: Some(MANAGE_URL.to_string()),
            claim_type: Some(ClaimType::Rewards),
            ..Default::default()
        })),
        available_shortcut_ids: Vec::new(),
        shortcut_trigger_args: ShortcutTriggerArgs::new(),
    })
}

#[async_trait]
impl PositionsHook for AllbridgePositions {
    fn info(&self) -> AppInfo {
        AppInfo::new(APP_ID, "Allbridge", "Allbridge Core pools")
    }

    fn supports_network(&self, network: NetworkId) -> bool {
        chain_symbol(network).is_some()
    }

    async fn position_definitions(
        &self,
        network: NetworkId,
        address: Option<Address>,
    ) -> Result<Vec<PositionDefinition>> {
        let Some(user) = address else {
            return Ok(Vec::new());
        };
        let Some(info) = self.api.network_info(network).await? else {
            return Ok(Vec::new());
        };
        if info.tokens.is_empty() {
            return Ok(Vec::new());
        }

        let calls = info
            .tokens
            .iter()
            .flat_map(|pool| {
                [
                    ContractCall::new(pool.pool_address, &IAllbridgePool::balanceOfCall { user }),
                    ContractCall::new(pool.pool_address, &IAllbridgePool::pendingRewardCall { user }),
                ]
            })
            .collect();
        let results = self.chain.multicall(network, calls).await?;
        if results.len() != info.tokens.len() * 2 {
            return Err(Error::Chain(format!(
                "expected {} allbridge results, got {}",
                info.tokens.len() * 2,
                results.len()
            )));
        }

        let mut definitions = Vec::new();
        for (pool, raw) in info.tokens.iter().zip(results.chunks(2)) {
            let lp_amount =
                erc20::decode_return::<IAllbridgePool::balanceOfCall>(pool.pool_address, &raw[0])?;
            let reward = erc20::decode_return::<IAllbridgePool::pendingRewardCall>(
                pool.pool_address,
                &raw[1],
            )?;
            if lp_amount.is_zero() && reward.is_zero() {
                continue;
            }
            definitions.push(pool_definition(network, pool, lp_amount, reward)?.into());
        }
        Ok(definitions)
    }
}
