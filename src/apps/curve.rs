//! Curve factory pools held as LP tokens

use crate::cache::TtlCache;
use crate::chain::erc20::{self, IERC20};
use crate::chain::{ChainClient, ContractCall};
use crate::config::NetworkId;
use crate::error::{Error, Result};
use crate::numbers::DecimalNumber;
use crate::positions::{
    unknown_app_token, AppInfo, AppTokenPositionDefinition, Deferrable, DisplayProps,
    PositionDefinition, PositionsHook, ShortcutTriggerArgs,
};
use crate::tokens::{ResolvedTokens, TokenDefinition};
use alloy::primitives::{Address, U256};
use alloy::sol;
use async_trait::async_trait;
use futures::future;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const APP_ID: &str = "curve";

const CURVE_API_URL: &str = "https://api.curve.fi/v1/getPools";
const IMAGE_URL: &str = "https://raw.githubusercontent.com/valora-inc/dapp-list/main/assets/curve.png";

sol! {
    interface ICurvePool {
        function coins(uint256 i) external view returns (address);
        function get_balances() external view returns (uint256[2]);
    }

    interface ICurveTripool {
        function get_balances() external view returns (uint256[3]);
    }
}

/// Curve's name for a network
fn curve_blockchain_id(network: NetworkId) -> Option<&'static str> {
    match network {
        NetworkId::CeloMainnet => Some("celo"),
        NetworkId::EthereumMainnet => Some("ethereum"),
        NetworkId::ArbitrumOne => Some("arbitrum"),
        NetworkId::OpMainnet => Some("optimism"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurvePool {
    pub address: Address,
    /// Number of coins, 2 or 3
    pub size: usize,
}

#[derive(Debug, Deserialize)]
struct PoolListResponse {
    data: PoolListData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolListData {
    pool_data: Vec<PoolEntry>,
}

#[derive(Debug, Deserialize)]
struct PoolEntry {
    address: Address,
    implementation: String,
}

fn parse_pool_list(body: &str) -> Result<Vec<CurvePool>> {
    let response: PoolListResponse = serde_json::from_str(body)?;
    Ok(response
        .data
        .pool_data
        .into_iter()
        .map(|entry| CurvePool {
            address: entry.address,
            size: if entry.implementation == "plain3basic" { 3 } else { 2 },
        })
        .collect())
}

enum PoolSource {
    Api { client: Client, timeout: Duration },
    Fixed(HashMap<NetworkId, Vec<CurvePool>>),
}

pub struct CurvePositions {
    chain: Arc<dyn ChainClient>,
    source: PoolSource,
    pools: TtlCache<NetworkId, Arc<Vec<CurvePool>>>,
}

impl CurvePositions {
    pub fn new(chain: Arc<dyn ChainClient>, pools_ttl: Duration, timeout: Duration) -> Self {
        Self {
            chain,
            source: PoolSource::Api {
                client: Client::new(),
                timeout,
            },
            pools: TtlCache::new(pools_ttl, NetworkId::ALL.len()),
        }
    }

    /// Use a fixed pool list instead of the Curve API
    pub fn with_pools(chain: Arc<dyn ChainClient>, pools: HashMap<NetworkId, Vec<CurvePool>>) -> Self {
        Self {
            chain,
            source: PoolSource::Fixed(pools),
            pools: TtlCache::new(Duration::from_secs(60), NetworkId::ALL.len()),
        }
    }

    async fn all_pools(&self, network: NetworkId) -> Result<Arc<Vec<CurvePool>>> {
        let Some(blockchain_id) = curve_blockchain_id(network) else {
            return Ok(Arc::new(Vec::new()));
        };
        self.pools
            .get_or_try_fetch(network, || async {
                match &self.source {
                    PoolSource::Fixed(pools) => {
                        Ok(Arc::new(pools.get(&network).cloned().unwrap_or_default()))
                    }
                    PoolSource::Api { client, timeout } => {
                        let url = format!("{}/{}/factory", CURVE_API_URL, blockchain_id);
                        tracing::debug!(url = %url, "Fetching Curve pools");
                        let body = client
                            .get(&url)
                            .timeout(*timeout)
                            .send()
                            .await?
                            .error_for_status()?
                            .text()
                            .await?;
                        parse_pool_list(&body).map(Arc::new)
                    }
                }
            })
            .await
    }

    /// Pool coins, reserves, supply and LP decimals in two round trips
    async fn pool_definition(&self, network: NetworkId, pool: CurvePool) -> Result<AppTokenPositionDefinition> {
        let coin_calls = (0..pool.size)
            .map(|i| ContractCall::new(pool.address, &ICurvePool::coinsCall { i: U256::from(i) }))
            .collect();
        let balances_call = if pool.size == 3 {
            ContractCall::new(pool.address, &ICurveTripool::get_balancesCall {})
        } else {
            ContractCall::new(pool.address, &ICurvePool::get_balancesCall {})
        };
        let (coins, state) = future::try_join(
            self.chain.multicall(network, coin_calls),
            self.chain.multicall(
                network,
                vec![
                    balances_call,
                    ContractCall::new(pool.address, &IERC20::totalSupplyCall {}),
                    ContractCall::new(pool.address, &IERC20::decimalsCall {}),
                ],
            ),
        )
        .await?;

        let coins = coins
            .iter()
            .map(|raw| erc20::decode_return::<ICurvePool::coinsCall>(pool.address, raw))
            .collect::<Result<Vec<Address>>>()?;
        let [balances, total_supply, decimals] = state.as_slice() else {
            return Err(Error::Chain(format!(
                "incomplete pool state for {}",
                pool.address
            )));
        };
        let reserves: Vec<U256> = if pool.size == 3 {
            erc20::decode_return::<ICurveTripool::get_balancesCall>(pool.address, balances)?.to_vec()
        } else {
            erc20::decode_return::<ICurvePool::get_balancesCall>(pool.address, balances)?.to_vec()
        };
        let total_supply = erc20::decode_return::<IERC20::totalSupplyCall>(pool.address, total_supply)?;
        let pool_decimals = erc20::decode_return::<IERC20::decimalsCall>(pool.address, decimals)?;

        let pps_coins = coins.clone();
        let price_per_share = Deferrable::deferred(move |tokens: &ResolvedTokens| {
            let supply = DecimalNumber::from_raw(total_supply, pool_decimals);
            pps_coins
                .iter()
                .zip(reserves.iter())
                .map(|(coin, reserve)| {
                    if supply.is_zero() {
                        return Ok(DecimalNumber::zero());
                    }
                    let token = tokens.get(network, coin)?;
                    Ok(DecimalNumber::from_raw(*reserve, token.decimals).checked_div(&supply)?)
                })
                .collect()
        });

        let title_coins = coins.clone();
        let display_props = Deferrable::deferred(move |tokens: &ResolvedTokens| {
            let symbols = title_coins
                .iter()
                .map(|coin| Ok(tokens.get(network, coin)?.symbol.clone()))
                .collect::<Result<Vec<String>>>()?;
            Ok(DisplayProps {
                title: symbols.join(" / "),
                description: "Pool".to_string(),
                image_url: IMAGE_URL.to_string(),
                manage_url: None,
            })
        });

        Ok(AppTokenPositionDefinition {
            network_id: network,
            address: pool.address,
            tokens: coins
                .into_iter()
                .map(|coin| TokenDefinition::new(network, coin))
                .collect(),
            price_per_share,
            display_props,
            data_props: None,
            available_shortcut_ids: Vec::new(),
            shortcut_trigger_args: ShortcutTriggerArgs::new(),
        })
    }
}

#[async_trait]
impl PositionsHook for CurvePositions {
    fn info(&self) -> AppInfo {
        AppInfo::new(APP_ID, "Curve", "Curve pools")
    }

    fn supports_network(&self, network: NetworkId) -> bool {
        curve_blockchain_id(network).is_some()
    }

    async fn position_definitions(
        &self,
        network: NetworkId,
        address: Option<Address>,
    ) -> Result<Vec<PositionDefinition>> {
        let Some(owner) = address else {
            return Ok(Vec::new());
        };
        let pools = self.all_pools(network).await?;
        if pools.is_empty() {
            return Ok(Vec::new());
        }

        let addresses: Vec<Address> = pools.iter().map(|pool| pool.address).collect();
        let balances = erc20::balances_of(self.chain.as_ref(), network, &addresses, owner).await?;
        let held = pools
            .iter()
            .zip(balances)
            .filter(|(_, balance)| !balance.is_zero())
            .map(|(pool, _)| self.pool_definition(network, *pool));

        Ok(future::try_join_all(held)
            .await?
            .into_iter()
            .map(PositionDefinition::from)
            .collect())
    }

    async fn app_token_definition(
        &self,
        token: &TokenDefinition,
    ) -> Result<AppTokenPositionDefinition> {
        let pools = self.all_pools(token.network_id).await?;
        match pools.iter().find(|pool| pool.address == token.address) {
            Some(pool) => self.pool_definition(token.network_id, *pool).await,
            None => Err(unknown_app_token(token)),
        }
    }
}
