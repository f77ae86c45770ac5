//! Uniswap v3 liquidity held as position NFTs

use crate::chain::{erc20, ChainClient};
use crate::config::NetworkId;
use crate::error::Result;
use crate::numbers::DecimalNumber;
use crate::positions::{
    AppInfo, ContractPositionDefinition, Deferrable, DisplayProps, PositionDefinition,
    PositionsHook, ShortcutTriggerArgs,
};
use crate::tokens::{lowercase_address, ResolvedTokens, TokenDefinition};
use alloy::primitives::{address, Address};
use alloy::sol;
use async_trait::async_trait;
use std::sync::Arc;

pub const APP_ID: &str = "uniswap";

const IMAGE_URL: &str = "https://raw.githubusercontent.com/valora-inc/dapp-list/ab12ab234b4a6e01eff599c6bd0b7d5b44d6f39d/assets/uniswap.png";

sol! {
    /// Read-only helper aggregating a wallet's v3 positions
    interface IUserPositionsMulticall {
        struct PositionInfo {
            address poolAddress;
            address token0;
            address token1;
            uint128 liquidity;
            uint256 amount0;
            uint256 amount1;
        }

        function getPositions(address nftPositions, address factory, address user)
            external
            view
            returns (PositionInfo[] memory);
    }
}

struct Deployment {
    factory: Address,
    nft_positions: Address,
    user_positions_multicall: Address,
}

fn deployment(network: NetworkId) -> Option<Deployment> {
    const FACTORY: Address = address!("1F98431c8aD98523631AE4a59f267346ea31F984");
    const NFT_POSITIONS: Address = address!("c36442b4a4522e871399cd717abdd847ab11fe88");

    match network {
        NetworkId::CeloMainnet => Some(Deployment {
            factory: address!("AfE208a311B21f13EF87E33A90049fC17A7acDEc"),
            nft_positions: address!("3d79EdAaBC0EaB6F08ED885C05Fc0B014290D95A"),
            user_positions_multicall: address!("DD1dC48fEA48B3DE667dD3595624d5af4Fb04694"),
        }),
        NetworkId::ArbitrumOne | NetworkId::OpMainnet => Some(Deployment {
            factory: FACTORY,
            nft_positions: NFT_POSITIONS,
            user_positions_multicall: address!("d3E0fd14a7d2a2f0E89D99bfc004eAcccfbEB2C1"),
        }),
        NetworkId::EthereumMainnet => Some(Deployment {
            factory: FACTORY,
            nft_positions: NFT_POSITIONS,
            user_positions_multicall: address!("d983fe1235a4c9006ef65eceed7c33069ad35ad0"),
        }),
        _ => None,
    }
}

pub struct UniswapPositions {
    chain: Arc<dyn ChainClient>,
}

impl UniswapPositions {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }
}

fn pool_definition(
    network: NetworkId,
    pool: IUserPositionsMulticall::PositionInfo,
) -> ContractPositionDefinition {
    let (token0, token1) = (pool.token0, pool.token1);
    let (amount0, amount1) = (pool.amount0, pool.amount1);

    ContractPositionDefinition {
        network_id: network,
        address: lowercase_address(&pool.poolAddress),
        tokens: vec![
            TokenDefinition::new(network, token0),
            TokenDefinition::new(network, token1),
        ],
        balances: Deferrable::deferred(move |tokens: &ResolvedTokens| {
            Ok(vec![
                DecimalNumber::from_raw(amount0, tokens.get(network, &token0)?.decimals),
                DecimalNumber::from_raw(amount1, tokens.get(network, &token1)?.decimals),
            ])
        }),
        display_props: Deferrable::deferred(move |tokens: &ResolvedTokens| {
            Ok(DisplayProps {
                title: format!(
                    "{} / {}",
                    tokens.get(network, &token0)?.symbol,
                    tokens.get(network, &token1)?.symbol
                ),
                description: "Pool".to_string(),
                image_url: IMAGE_URL.to_string(),
                manage_url: None,
            })
        }),
        data_props: None,
        available_shortcut_ids: Vec::new(),
        shortcut_trigger_args: ShortcutTriggerArgs::new(),
    }
}

#[async_trait]
impl PositionsHook for UniswapPositions {
    fn info(&self) -> AppInfo {
        AppInfo::new(APP_ID, "Uniswap", "Uniswap pools")
    }

    fn supports_network(&self, network: NetworkId) -> bool {
        deployment(network).is_some()
    }

    async fn position_definitions(
        &self,
        network: NetworkId,
        address: Option<Address>,
    ) -> Result<Vec<PositionDefinition>> {
        let (Some(deployment), Some(user)) = (deployment(network), address) else {
            return Ok(Vec::new());
        };

        let pools = erc20::read(
            self.chain.as_ref(),
            network,
            deployment.user_positions_multicall,
            IUserPositionsMulticall::getPositionsCall {
                nftPositions: deployment.nft_positions,
                factory: deployment.factory,
                user,
            },
        )
        .await?;

        Ok(pools
            .into_iter()
            .filter(|pool| pool.liquidity > 0)
            .map(|pool| pool_definition(network, pool).into())
            .collect())
    }
}
