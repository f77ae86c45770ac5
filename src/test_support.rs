//! In-memory fakes shared by unit tests

use crate::chain::erc20::IERC20;
use crate::chain::{ChainClient, ContractCall};
use crate::config::NetworkId;
use crate::error::{Error, Result};
use crate::numbers::DecimalNumber;
use crate::positions::{
    unknown_app_token, AppInfo, AppTokenPositionDefinition, PositionDefinition, PositionsHook,
};
use crate::shortcuts::{
    Shortcut, ShortcutCategory, ShortcutsHook, Transaction, TriggerArgs, TriggerHandler,
    TriggerOutput,
};
use crate::simulation::{SimulatedTransaction, SimulationError, TransactionSimulator};
use crate::tokens::{TokenDefinition, TokenId, TokenInfo, TokenInfoSource};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolInterface, SolValue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeToken {
    symbol: String,
    decimals: u8,
    total_supply: U256,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

#[derive(Default)]
struct ChainState {
    tokens: HashMap<(NetworkId, Address), FakeToken>,
    responses: HashMap<(NetworkId, Address, Bytes), Bytes>,
    calls: Vec<(Address, [u8; 4])>,
}

/// Chain with an ERC-20 ledger and canned responses for other contracts
#[derive(Clone, Default)]
pub struct FakeChain {
    state: Arc<Mutex<ChainState>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_token(
        &self,
        network: NetworkId,
        token: Address,
        symbol: &str,
        decimals: u8,
        total_supply: U256,
    ) {
        let mut state = self.state.lock().unwrap();
        let entry = state.tokens.entry((network, token)).or_default();
        entry.symbol = symbol.to_string();
        entry.decimals = decimals;
        entry.total_supply = total_supply;
    }

    pub fn set_balance(&self, network: NetworkId, token: Address, owner: Address, amount: U256) {
        let mut state = self.state.lock().unwrap();
        state
            .tokens
            .entry((network, token))
            .or_default()
            .balances
            .insert(owner, amount);
    }

    pub fn set_allowance(
        &self,
        network: NetworkId,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) {
        let mut state = self.state.lock().unwrap();
        state
            .tokens
            .entry((network, token))
            .or_default()
            .allowances
            .insert((owner, spender), amount);
    }

    /// Answer `call` on `to` with the ABI-encoded `returns`
    pub fn respond<C: SolCall>(&self, network: NetworkId, to: Address, call: &C, returns: Vec<u8>) {
        let data = Bytes::from(call.abi_encode());
        self.state
            .lock()
            .unwrap()
            .responses
            .insert((network, to, data), Bytes::from(returns));
    }

    /// Number of `symbol()` reads of `token`
    pub fn metadata_reads(&self, token: Address) -> usize {
        self.calls_to(token, IERC20::symbolCall::SELECTOR)
    }

    pub fn calls_to(&self, to: Address, selector: [u8; 4]) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(address, s)| *address == to && *s == selector)
            .count()
    }

    fn answer(&self, network: NetworkId, call: &ContractCall) -> Result<Bytes> {
        let mut state = self.state.lock().unwrap();
        let selector: [u8; 4] = call
            .data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .unwrap_or_default();
        state.calls.push((call.to, selector));

        if let Some(response) = state.responses.get(&(network, call.to, call.data.clone())) {
            return Ok(response.clone());
        }

        let no_contract = || Error::Chain(format!("no contract at {} on {}", call.to, network));
        let token = state.tokens.get(&(network, call.to)).ok_or_else(no_contract)?;
        let decoded = IERC20::IERC20Calls::abi_decode(&call.data).map_err(|_| no_contract())?;
        let encoded = match decoded {
            IERC20::IERC20Calls::symbol(_) => (token.symbol.clone(),).abi_encode_params(),
            IERC20::IERC20Calls::decimals(_) => <alloy::sol_types::sol_data::Uint<8> as alloy::sol_types::SolType>::abi_encode(&token.decimals),
            IERC20::IERC20Calls::totalSupply(_) => token.total_supply.abi_encode(),
            IERC20::IERC20Calls::balanceOf(c) => token
                .balances
                .get(&c.owner)
                .copied()
                .unwrap_or_default()
                .abi_encode(),
            IERC20::IERC20Calls::allowance(c) => token
                .allowances
                .get(&(c.owner, c.spender))
                .copied()
                .unwrap_or_default()
                .abi_encode(),
            IERC20::IERC20Calls::approve(_) => true.abi_encode(),
        };
        Ok(Bytes::from(encoded))
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn call(&self, network: NetworkId, call: ContractCall) -> Result<Bytes> {
        self.answer(network, &call)
    }

    async fn multicall(&self, network: NetworkId, calls: Vec<ContractCall>) -> Result<Vec<Bytes>> {
        calls.iter().map(|call| self.answer(network, call)).collect()
    }
}

/// Per-token call counts of a [`CountingTokenInfo`]
#[derive(Clone, Default)]
pub struct TokenInfoCalls(Arc<Mutex<HashMap<TokenId, usize>>>);

impl TokenInfoCalls {
    pub fn count(&self, token_id: &TokenId) -> usize {
        self.0.lock().unwrap().get(token_id).copied().unwrap_or(0)
    }
}

/// Static token info that counts lookups
#[derive(Default)]
pub struct CountingTokenInfo {
    tokens: HashMap<TokenId, TokenInfo>,
    calls: TokenInfoCalls,
}

impl CountingTokenInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(
        mut self,
        network: NetworkId,
        address: Address,
        symbol: &str,
        decimals: u8,
        price_usd: Option<DecimalNumber>,
    ) -> Self {
        self.tokens.insert(
            TokenId::new(network, &address),
            TokenInfo {
                symbol: symbol.to_string(),
                decimals,
                price_usd,
            },
        );
        self
    }

    pub fn calls(&self) -> TokenInfoCalls {
        self.calls.clone()
    }
}

#[async_trait]
impl TokenInfoSource for CountingTokenInfo {
    async fn token_info(&self, token_id: &TokenId) -> Result<Option<TokenInfo>> {
        *self.calls.0.lock().unwrap().entry(token_id.clone()).or_default() += 1;
        Ok(self.tokens.get(token_id).cloned())
    }
}

/// Positions hook returning fixed definitions
pub struct ScriptedPositionsHook {
    info: AppInfo,
    positions: Vec<PositionDefinition>,
    app_tokens: Vec<AppTokenPositionDefinition>,
    failing_positions: Option<String>,
    failing_app_tokens: Option<String>,
    delay: Option<Duration>,
    networks: Option<Vec<NetworkId>>,
}

impl ScriptedPositionsHook {
    pub fn new(id: &str) -> Self {
        Self {
            info: AppInfo::new(id, &id.to_uppercase(), ""),
            positions: Vec::new(),
            app_tokens: Vec::new(),
            failing_positions: None,
            failing_app_tokens: None,
            delay: None,
            networks: None,
        }
    }

    pub fn with_position(mut self, definition: impl Into<PositionDefinition>) -> Self {
        self.positions.push(definition.into());
        self
    }

    /// Claim `definition`'s token when the resolver asks
    pub fn with_app_token(mut self, definition: AppTokenPositionDefinition) -> Self {
        self.app_tokens.push(definition);
        self
    }

    pub fn failing_positions(mut self, message: &str) -> Self {
        self.failing_positions = Some(message.to_string());
        self
    }

    pub fn failing_app_tokens(mut self, message: &str) -> Self {
        self.failing_app_tokens = Some(message.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn only_on(mut self, network: NetworkId) -> Self {
        self.networks = Some(vec![network]);
        self
    }
}

#[async_trait]
impl PositionsHook for ScriptedPositionsHook {
    fn info(&self) -> AppInfo {
        self.info.clone()
    }

    fn supports_network(&self, network: NetworkId) -> bool {
        self.networks
            .as_ref()
            .map_or(true, |networks| networks.contains(&network))
    }

    async fn position_definitions(
        &self,
        _network: NetworkId,
        _address: Option<Address>,
    ) -> Result<Vec<PositionDefinition>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failing_positions {
            return Err(Error::Upstream(message.clone()));
        }
        Ok(self.positions.clone())
    }

    async fn app_token_definition(
        &self,
        token: &TokenDefinition,
    ) -> Result<AppTokenPositionDefinition> {
        if let Some(message) = &self.failing_app_tokens {
            return Err(Error::Upstream(message.clone()));
        }
        self.app_tokens
            .iter()
            .find(|def| def.network_id == token.network_id && def.address == token.address)
            .cloned()
            .ok_or_else(|| unknown_app_token(token))
    }
}

/// Trigger logic returning a fixed output
pub struct FixedTrigger(TriggerOutput);

impl FixedTrigger {
    pub fn new(output: TriggerOutput) -> Self {
        Self(output)
    }
}

#[async_trait]
impl TriggerHandler for FixedTrigger {
    async fn on_trigger(&self, _args: &TriggerArgs) -> Result<TriggerOutput> {
        Ok(self.0.clone())
    }
}

/// Shortcuts hook returning fixed shortcuts
pub struct ScriptedShortcutsHook {
    app_id: String,
    shortcuts: Vec<Shortcut>,
    failing: Option<String>,
}

impl ScriptedShortcutsHook {
    pub fn new(app_id: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            shortcuts: Vec::new(),
            failing: None,
        }
    }

    pub fn with_shortcut(mut self, shortcut: Shortcut) -> Self {
        self.shortcuts.push(shortcut);
        self
    }

    /// A `claim` shortcut on `network` that builds one empty transaction
    pub fn with_claim_shortcut(self, network: NetworkId) -> Self {
        self.with_shortcut(Shortcut {
            id: "claim".to_string(),
            name: "Claim".to_string(),
            description: "Claim rewards".to_string(),
            network_ids: vec![network],
            category: ShortcutCategory::Claim,
            trigger_input_shape: Vec::new(),
            on_trigger: Arc::new(FixedTrigger::new(TriggerOutput {
                transactions: vec![Transaction::new(
                    network,
                    Address::ZERO,
                    Address::ZERO,
                    Bytes::new(),
                )],
                ..Default::default()
            })),
            fallback_gas: None,
        })
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failing = Some(message.to_string());
        self
    }
}

#[async_trait]
impl ShortcutsHook for ScriptedShortcutsHook {
    fn app_id(&self) -> &str {
        &self.app_id
    }

    async fn shortcut_definitions(
        &self,
        _network: NetworkId,
        _address: Option<Address>,
    ) -> Result<Vec<Shortcut>> {
        if let Some(message) = &self.failing {
            return Err(Error::Upstream(message.clone()));
        }
        Ok(self.shortcuts.clone())
    }
}

/// Transaction lists a [`ScriptedSimulator`] was asked to simulate
#[derive(Clone, Default)]
pub struct SimulatorRequests(Arc<Mutex<Vec<Vec<Transaction>>>>);

impl SimulatorRequests {
    pub fn all(&self) -> Vec<Vec<Transaction>> {
        self.0.lock().unwrap().clone()
    }
}

/// Simulator with a fixed answer
pub struct ScriptedSimulator {
    result: std::result::Result<Vec<SimulatedTransaction>, SimulationError>,
    requests: SimulatorRequests,
}

impl ScriptedSimulator {
    pub fn returning(simulated: Vec<SimulatedTransaction>) -> Self {
        Self {
            result: Ok(simulated),
            requests: SimulatorRequests::default(),
        }
    }

    pub fn failing(error: SimulationError) -> Self {
        Self {
            result: Err(error),
            requests: SimulatorRequests::default(),
        }
    }

    pub fn unsupported() -> Self {
        Self::failing(SimulationError::Unsupported("not enabled".to_string()))
    }

    pub fn requests(&self) -> SimulatorRequests {
        self.requests.clone()
    }
}

#[async_trait]
impl TransactionSimulator for ScriptedSimulator {
    async fn simulate(
        &self,
        _network: NetworkId,
        transactions: &[Transaction],
    ) -> std::result::Result<Vec<SimulatedTransaction>, SimulationError> {
        self.requests.0.lock().unwrap().push(transactions.to_vec());
        self.result.clone()
    }
}
