//! ERC-20 reads and calldata

use super::{ChainClient, ContractCall};
use crate::config::NetworkId;
use crate::error::{Error, Result};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
    }
}

/// On-chain token metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc20Metadata {
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
}

/// Decode the return data of `C` called on `to`
pub fn decode_return<C: SolCall>(to: Address, data: &[u8]) -> Result<C::Return> {
    C::abi_decode_returns(data).map_err(|e| {
        Error::Chain(format!(
            "failed to decode {} returned by {}: {}",
            C::SIGNATURE,
            to,
            e
        ))
    })
}

/// Call `call` on `to` and decode its return value
pub async fn read<C: SolCall + Send + Sync>(
    chain: &dyn ChainClient,
    network: NetworkId,
    to: Address,
    call: C,
) -> Result<C::Return> {
    let raw = chain.call(network, ContractCall::new(to, &call)).await?;
    decode_return::<C>(to, &raw)
}

/// Read symbol, decimals and total supply in one multicall
pub async fn token_metadata(
    chain: &dyn ChainClient,
    network: NetworkId,
    token: Address,
) -> Result<Erc20Metadata> {
    let results = chain
        .multicall(
            network,
            vec![
                ContractCall::new(token, &IERC20::symbolCall {}),
                ContractCall::new(token, &IERC20::decimalsCall {}),
                ContractCall::new(token, &IERC20::totalSupplyCall {}),
            ],
        )
        .await?;

    let [symbol, decimals, total_supply] = results.as_slice() else {
        return Err(Error::Chain(format!(
            "expected 3 metadata results for {}, got {}",
            token,
            results.len()
        )));
    };

    Ok(Erc20Metadata {
        symbol: decode_return::<IERC20::symbolCall>(token, symbol)?,
        decimals: decode_return::<IERC20::decimalsCall>(token, decimals)?,
        total_supply: decode_return::<IERC20::totalSupplyCall>(token, total_supply)?,
    })
}

/// `owner`'s raw balance of each token, in the order given
pub async fn balances_of(
    chain: &dyn ChainClient,
    network: NetworkId,
    tokens: &[Address],
    owner: Address,
) -> Result<Vec<U256>> {
    let calls = tokens
        .iter()
        .map(|token| ContractCall::new(*token, &IERC20::balanceOfCall { owner }))
        .collect();
    let results = chain.multicall(network, calls).await?;

    tokens
        .iter()
        .zip(results.iter())
        .map(|(token, raw)| decode_return::<IERC20::balanceOfCall>(*token, raw))
        .collect()
}

pub async fn allowance(
    chain: &dyn ChainClient,
    network: NetworkId,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256> {
    read(chain, network, token, IERC20::allowanceCall { owner, spender }).await
}

/// Calldata for `approve(spender, amount)`
pub fn approve_calldata(spender: Address, amount: U256) -> Bytes {
    Bytes::from(IERC20::approveCall { spender, amount }.abi_encode())
}
