//! Position resolution for one (network, wallet) request

use super::definitions::{
    AppTokenPositionDefinition, ContractPositionDefinition, DataProps, Deferrable,
    PositionDefinition,
};
use super::output::{
    label, token_view, total_usd, underlying_tokens, AppTokenPosition, ContractPosition, Position,
};
use super::resolver::{Resolution, TokenResolver};
use super::{AppInfo, PositionsHook};
use crate::chain::{erc20, ChainClient};
use crate::config::NetworkId;
use crate::error::{with_timeout, Error, Result};
use crate::numbers::DecimalNumber;
use crate::registry::HookRegistry;
use crate::tokens::{lowercase_address, TokenDefinition, TokenId, TokenInfoSource, TokenKind};
use alloy::primitives::{Address, U256};
use futures::future;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Runs hooks and turns their definitions into valued positions
pub struct PositionResolver {
    registry: Arc<HookRegistry>,
    chain: Arc<dyn ChainClient>,
    token_info: Arc<dyn TokenInfoSource>,
    timeout: Duration,
}

impl PositionResolver {
    pub fn new(
        registry: Arc<HookRegistry>,
        chain: Arc<dyn ChainClient>,
        token_info: Arc<dyn TokenInfoSource>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            chain,
            token_info,
            timeout,
        }
    }

    /// Positions held by `wallet` on `network`, in registry order then definition order
    pub async fn get_positions(&self, network: NetworkId, wallet: Address) -> Result<Vec<Position>> {
        let hooks = self.registry.hooks_for(network);
        let definitions = self.collect_definitions(&hooks, network, wallet).await;

        let mut resolver = TokenResolver::new(
            hooks,
            Arc::clone(&self.chain),
            Arc::clone(&self.token_info),
            self.timeout,
        );
        for (app, definition) in &definitions {
            if let PositionDefinition::AppToken(def) = definition {
                resolver = resolver.with_seed(app.clone(), Arc::clone(def));
            }
        }

        let token_definitions = union_token_definitions(definitions.iter().map(|(_, d)| d));
        tracing::debug!(
            network = %network,
            definitions = definitions.len(),
            tokens = token_definitions.len(),
            "Resolving tokens"
        );
        let resolution = Arc::new(resolver).resolve_all(token_definitions).await;
        for (token_id, error) in &resolution.failures {
            tracing::warn!(token_id = %token_id, error = %error, "Token resolution failed");
        }

        let balances = self
            .app_token_balances(network, wallet, &definitions, &resolution)
            .await;

        let mut positions = Vec::new();
        for (app, definition) in &definitions {
            let built = match definition {
                PositionDefinition::AppToken(def) => {
                    app_token_position(app, def, &resolution, &balances)
                }
                PositionDefinition::ContractPosition(def) => {
                    contract_position(app, def, &resolution).map(Some)
                }
            };
            match built {
                Ok(Some(position)) => positions.push(position),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        app_id = %app.id,
                        error = %e,
                        "Dropping position that could not be valued"
                    );
                }
            }
        }

        tracing::info!(
            network = %network,
            wallet = %wallet,
            positions = positions.len(),
            "Resolved positions"
        );
        Ok(positions)
    }

    /// Definitions of every hook, each hook bounded and isolated
    async fn collect_definitions(
        &self,
        hooks: &[Arc<dyn PositionsHook>],
        network: NetworkId,
        wallet: Address,
    ) -> Vec<(AppInfo, PositionDefinition)> {
        let results = future::join_all(hooks.iter().map(|hook| async move {
            let app = hook.info();
            let result = with_timeout(
                self.timeout,
                hook.position_definitions(network, Some(wallet)),
            )
            .await;
            (app, result)
        }))
        .await;

        let mut definitions = Vec::new();
        for (app, result) in results {
            match result {
                Ok(defs) => {
                    tracing::debug!(app_id = %app.id, count = defs.len(), "Hook returned definitions");
                    for def in defs {
                        if def.network_id() != network {
                            tracing::warn!(
                                app_id = %app.id,
                                expected = %network,
                                got = %def.network_id(),
                                "Skipping definition for another network"
                            );
                            continue;
                        }
                        definitions.push((app.clone(), def));
                    }
                }
                Err(e) => {
                    tracing::warn!(app_id = %app.id, error = %e, "Hook failed to return positions");
                }
            }
        }
        definitions
    }

    /// Raw wallet balance of every resolved top-level app token, in one multicall
    async fn app_token_balances(
        &self,
        network: NetworkId,
        wallet: Address,
        definitions: &[(AppInfo, PositionDefinition)],
        resolution: &Resolution,
    ) -> HashMap<TokenId, U256> {
        let mut tokens: Vec<Address> = Vec::new();
        for (_, definition) in definitions {
            if let PositionDefinition::AppToken(def) = definition {
                if resolution.tokens.contains(&def.token_id()) && !tokens.contains(&def.address) {
                    tokens.push(def.address);
                }
            }
        }
        if tokens.is_empty() {
            return HashMap::new();
        }

        let read = with_timeout(
            self.timeout,
            erc20::balances_of(self.chain.as_ref(), network, &tokens, wallet),
        )
        .await;
        match read {
            Ok(balances) => tokens
                .iter()
                .zip(balances)
                .map(|(address, balance)| (TokenId::new(network, address), balance))
                .collect(),
            Err(e) => {
                tracing::warn!(network = %network, error = %e, "Failed to read app token balances");
                HashMap::new()
            }
        }
    }
}

/// Every referenced token once, in first-seen order. Fallback prices merge.
fn union_token_definitions<'a>(
    definitions: impl Iterator<Item = &'a PositionDefinition>,
) -> Vec<TokenDefinition> {
    let mut index: HashMap<TokenId, usize> = HashMap::new();
    let mut tokens: Vec<TokenDefinition> = Vec::new();
    for definition in definitions {
        for token in definition.referenced_tokens() {
            match index.get(&token.token_id()) {
                Some(&i) => {
                    if tokens[i].fallback_price_usd.is_none() {
                        tokens[i].fallback_price_usd = token.fallback_price_usd;
                    }
                }
                None => {
                    index.insert(token.token_id(), tokens.len());
                    tokens.push(token);
                }
            }
        }
    }
    tokens
}

fn app_token_position(
    app: &AppInfo,
    definition: &AppTokenPositionDefinition,
    resolution: &Resolution,
    balances: &HashMap<TokenId, U256>,
) -> Result<Option<Position>> {
    let token_id = definition.token_id();
    let token = resolution.require(&token_id)?;
    let TokenKind::App(details) = &token.kind else {
        return Err(Error::Definition(format!("{} resolved as a base token", token_id)));
    };
    let Some(raw_balance) = balances.get(&token_id) else {
        return Err(Error::Chain(format!("no wallet balance read for {}", token_id)));
    };

    let balance = DecimalNumber::from_raw(*raw_balance, token.decimals);
    if balance.is_zero() {
        return Ok(None);
    }

    let display_props = definition.display_props.evaluate(&resolution.tokens)?;
    let data_props = evaluate_data_props(definition.data_props.as_ref(), resolution)?;
    let tokens = underlying_tokens(
        &resolution.tokens,
        &details.tokens,
        &details.price_per_share,
        &balance,
    )?;

    Ok(Some(Position::AppToken(AppTokenPosition {
        app_id: app.id.clone(),
        app_name: app.name.clone(),
        network_id: definition.network_id,
        address: lowercase_address(&definition.address),
        token_id,
        symbol: token.symbol.clone(),
        decimals: token.decimals,
        label: label(&display_props),
        display_props,
        tokens,
        price_per_share: details.price_per_share.clone(),
        price_usd: token.price_usd.clone(),
        balance,
        supply: details.supply.clone(),
        available_shortcut_ids: definition.available_shortcut_ids.clone(),
        shortcut_trigger_args: definition.shortcut_trigger_args.clone(),
        data_props,
    })))
}

fn contract_position(
    app: &AppInfo,
    definition: &ContractPositionDefinition,
    resolution: &Resolution,
) -> Result<Position> {
    let resolved = definition
        .tokens
        .iter()
        .map(|token| resolution.require(&token.token_id()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let balances = definition.balances.evaluate(&resolution.tokens)?;
    if balances.len() != resolved.len() {
        return Err(Error::Definition(format!(
            "contract position {} has {} balances for {} tokens",
            definition.address,
            balances.len(),
            resolved.len()
        )));
    }

    let display_props = definition.display_props.evaluate(&resolution.tokens)?;
    let data_props = evaluate_data_props(definition.data_props.as_ref(), resolution)?;
    let tokens = resolved
        .into_iter()
        .zip(balances)
        .map(|(token, balance)| token_view(&resolution.tokens, token, balance))
        .collect::<Result<Vec<_>>>()?;
    let balance_usd = total_usd(&tokens)?;

    Ok(Position::ContractPosition(ContractPosition {
        app_id: app.id.clone(),
        app_name: app.name.clone(),
        network_id: definition.network_id,
        address: definition.address.clone(),
        label: label(&display_props),
        display_props,
        tokens,
        balance_usd,
        available_shortcut_ids: definition.available_shortcut_ids.clone(),
        shortcut_trigger_args: definition.shortcut_trigger_args.clone(),
        data_props,
    }))
}

fn evaluate_data_props(
    data_props: Option<&Deferrable<DataProps>>,
    resolution: &Resolution,
) -> Result<Option<DataProps>> {
    data_props
        .map(|props| props.evaluate(&resolution.tokens))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::positions::definitions::{DisplayProps, ShortcutTriggerArgs};
    use crate::positions::output::Token;
    use crate::test_support::{CountingTokenInfo, FakeChain, ScriptedPositionsHook};
    use alloy::primitives::address;

    const NETWORK: NetworkId = NetworkId::CeloMainnet;
    const WALLET: Address = address!("2b8441ef13333ffa955c9ea5ab5b3692da95260d");
    const ULP: Address = address!("31f9dee850b4284b81b52b25a3194f2fc8ff18cf");
    const GDOLLAR: Address = address!("62b8b11039fcfe5ab0c56e502b1c372a3d2a9c7a");
    const CUSD: Address = address!("765de816845861e75a25fca122bb6898b8b1282a");

    fn d(s: &str) -> DecimalNumber {
        s.parse().unwrap()
    }

    fn raw(s: &str) -> U256 {
        s.parse().unwrap()
    }

    fn pool_definition() -> AppTokenPositionDefinition {
        AppTokenPositionDefinition {
            network_id: NETWORK,
            address: ULP,
            tokens: vec![
                TokenDefinition::new(NETWORK, GDOLLAR),
                TokenDefinition::new(NETWORK, CUSD),
            ],
            price_per_share: Deferrable::Fixed(vec![
                d("77.77845724145984437582"),
                d("0.0128827016512212377"),
            ]),
            display_props: Deferrable::deferred(|tokens| {
                let g = tokens.get(NETWORK, &GDOLLAR)?;
                let c = tokens.get(NETWORK, &CUSD)?;
                Ok(DisplayProps {
                    title: format!("{} / {}", g.symbol, c.symbol),
                    description: "Pool".to_string(),
                    image_url: "https://example.com/ubeswap.png".to_string(),
                    manage_url: None,
                })
            }),
            data_props: None,
            available_shortcut_ids: Vec::new(),
            shortcut_trigger_args: ShortcutTriggerArgs::new(),
        }
    }

    fn pool_chain() -> FakeChain {
        let chain = FakeChain::new();
        chain.add_token(NETWORK, ULP, "ULP", 18, raw("170324243277473535226"));
        chain.set_balance(NETWORK, ULP, WALLET, raw("160006517430032680046"));
        chain
    }

    fn pool_token_info() -> CountingTokenInfo {
        CountingTokenInfo::new()
            .with_token(NETWORK, GDOLLAR, "G$", 18, Some(d("0.00015738574843135427")))
            .with_token(NETWORK, CUSD, "cUSD", 18, Some(d("1")))
    }

    fn position_resolver(
        hooks: Vec<Arc<dyn PositionsHook>>,
        chain: FakeChain,
        info: CountingTokenInfo,
    ) -> PositionResolver {
        PositionResolver::new(
            Arc::new(HookRegistry::new(hooks)),
            Arc::new(chain),
            Arc::new(info),
            Duration::from_secs(5),
        )
    }

    fn contract_definition(address: &str, balance: &str) -> ContractPositionDefinition {
        ContractPositionDefinition {
            network_id: NETWORK,
            address: address.to_string(),
            tokens: vec![TokenDefinition::new(NETWORK, CUSD)],
            balances: Deferrable::Fixed(vec![d(balance)]),
            display_props: Deferrable::Fixed(DisplayProps {
                title: "cUSD".to_string(),
                description: "Lending".to_string(),
                image_url: String::new(),
                manage_url: None,
            }),
            data_props: None,
            available_shortcut_ids: vec!["withdraw".to_string()],
            shortcut_trigger_args: ShortcutTriggerArgs::new(),
        }
    }

    #[tokio::test]
    async fn test_app_token_over_two_base_tokens() {
        let hook = ScriptedPositionsHook::new("ubeswap").with_position(pool_definition());
        let resolver = position_resolver(vec![Arc::new(hook)], pool_chain(), pool_token_info());

        let positions = resolver.get_positions(NETWORK, WALLET).await.unwrap();
        assert_eq!(positions.len(), 1);
        let Position::AppToken(position) = &positions[0] else {
            panic!("expected an app token position");
        };

        assert_eq!(position.app_id, "ubeswap");
        assert_eq!(position.label, "Pool: G$ / cUSD");
        assert_eq!(position.symbol, "ULP");
        assert_eq!(
            position.price_per_share,
            vec![d("77.77845724145984437582"), d("0.0128827016512212377")]
        );
        assert_eq!(position.balance, d("160.006517430032680046"));
        assert_eq!(position.supply, d("170.324243277473535226"));
        assert_eq!(
            position.price_usd,
            Some(d("0.0251239223560044815641681487184054417514"))
        );
        assert_eq!(
            position.tokens[0].balance(),
            &d("12445.06007428669611132519024136395463888772")
        );
        assert_eq!(
            position.tokens[1].balance(),
            &d("2.0613162263020417581137892970042129342")
        );

        let json = serde_json::to_value(&positions[0]).unwrap();
        assert_eq!(json["type"], "app-token");
        assert_eq!(json["balance"], "160.006517430032680046");
        assert_eq!(json["tokens"][0]["type"], "base-token");
        assert_eq!(json["tokens"][0]["priceUsd"], "0.00015738574843135427");
    }

    #[tokio::test]
    async fn test_results_are_deterministic() {
        let build = || {
            let first = ScriptedPositionsHook::new("ubeswap").with_position(pool_definition());
            let second = ScriptedPositionsHook::new("lending")
                .with_position(contract_definition("0xlend", "5"))
                .with_delay(Duration::from_millis(20));
            position_resolver(
                vec![Arc::new(second), Arc::new(first)],
                pool_chain(),
                pool_token_info(),
            )
        };

        let a = build().get_positions(NETWORK, WALLET).await.unwrap();
        let b = build().get_positions(NETWORK, WALLET).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        // Registry order, not completion order
        assert_eq!(a[0].app_id(), "lending");
        assert_eq!(a[1].app_id(), "ubeswap");
    }

    #[tokio::test]
    async fn test_tokens_are_fetched_once_per_request() {
        let first = ScriptedPositionsHook::new("ubeswap").with_position(pool_definition());
        let second = ScriptedPositionsHook::new("mirror").with_position(pool_definition());
        let third = ScriptedPositionsHook::new("lending")
            .with_position(contract_definition("0xa", "1"))
            .with_position(contract_definition("0xb", "2"));
        let chain = pool_chain();
        let info = pool_token_info();
        let calls = info.calls();

        let resolver = position_resolver(
            vec![Arc::new(first), Arc::new(second), Arc::new(third)],
            chain.clone(),
            info,
        );
        let positions = resolver.get_positions(NETWORK, WALLET).await.unwrap();

        assert_eq!(positions.len(), 4);
        assert_eq!(calls.count(&TokenId::new(NETWORK, &CUSD)), 1);
        assert_eq!(calls.count(&TokenId::new(NETWORK, &GDOLLAR)), 1);
        assert_eq!(chain.metadata_reads(ULP), 1);
    }

    #[tokio::test]
    async fn test_failing_hook_is_isolated() {
        let good = ScriptedPositionsHook::new("lending").with_position(contract_definition("0xa", "3"));
        let bad = ScriptedPositionsHook::new("broken").failing_positions("upstream down");
        let resolver = position_resolver(
            vec![Arc::new(bad), Arc::new(good)],
            FakeChain::new(),
            pool_token_info(),
        );

        let positions = resolver.get_positions(NETWORK, WALLET).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].app_id(), "lending");
    }

    #[tokio::test]
    async fn test_hook_failing_to_define_tokens_keeps_other_positions() {
        // Asked first about cUSD, the broken hook must not take the lending position down
        let bad = ScriptedPositionsHook::new("broken")
            .failing_positions("upstream down")
            .failing_app_tokens("pool list down");
        let good = ScriptedPositionsHook::new("lending").with_position(contract_definition("0xa", "3"));
        let resolver = position_resolver(
            vec![Arc::new(bad), Arc::new(good)],
            FakeChain::new(),
            pool_token_info(),
        );

        let positions = resolver.get_positions(NETWORK, WALLET).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].app_id(), "lending");
        let Position::ContractPosition(position) = &positions[0] else {
            panic!("expected a contract position");
        };
        assert_eq!(position.balance_usd, Some(d("3")));
    }

    #[tokio::test]
    async fn test_data_props_computed_from_resolved_tokens() {
        let mut definition = contract_definition("0xa", "2");
        definition.data_props = Some(Deferrable::deferred(|tokens| {
            let cusd = tokens.get(NETWORK, &CUSD)?;
            let price = cusd.price_usd.clone().unwrap_or_default();
            Ok(DataProps {
                tvl: Some(price.checked_mul(&DecimalNumber::from(1000u64))?),
                manage_url: Some(format!("https://example.com/{}", cusd.symbol)),
                ..Default::default()
            })
        }));
        let hook = ScriptedPositionsHook::new("lending").with_position(definition);
        let resolver = position_resolver(vec![Arc::new(hook)], FakeChain::new(), pool_token_info());

        let positions = resolver.get_positions(NETWORK, WALLET).await.unwrap();
        let Position::ContractPosition(position) = &positions[0] else {
            panic!("expected a contract position");
        };
        let data_props = position.data_props.as_ref().unwrap();
        assert_eq!(data_props.tvl, Some(d("1000")));
        assert_eq!(data_props.manage_url.as_deref(), Some("https://example.com/cUSD"));
    }

    #[tokio::test]
    async fn test_failing_data_props_drop_the_position() {
        let mut broken = contract_definition("0xbroken", "1");
        broken.data_props = Some(Deferrable::deferred(|_| {
            Err(Error::Definition("no tvl".to_string()))
        }));
        let hook = ScriptedPositionsHook::new("lending")
            .with_position(broken)
            .with_position(contract_definition("0xa", "2"));
        let resolver = position_resolver(vec![Arc::new(hook)], FakeChain::new(), pool_token_info());

        let positions = resolver.get_positions(NETWORK, WALLET).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].address(), "0xa");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_hook_times_out_alone() {
        let good = ScriptedPositionsHook::new("lending").with_position(contract_definition("0xa", "3"));
        let slow = ScriptedPositionsHook::new("slow")
            .with_position(contract_definition("0xslow", "1"))
            .with_delay(Duration::from_secs(60));
        let resolver = position_resolver(
            vec![Arc::new(slow), Arc::new(good)],
            FakeChain::new(),
            pool_token_info(),
        );

        let positions = resolver.get_positions(NETWORK, WALLET).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].address(), "0xa");
    }

    #[tokio::test]
    async fn test_zero_balances() {
        let chain = pool_chain();
        chain.set_balance(NETWORK, ULP, WALLET, U256::ZERO);
        let hook = ScriptedPositionsHook::new("mixed")
            .with_position(pool_definition())
            .with_position(contract_definition("0xa", "0"));
        let resolver = position_resolver(vec![Arc::new(hook)], chain, pool_token_info());

        let positions = resolver.get_positions(NETWORK, WALLET).await.unwrap();
        assert_eq!(positions.len(), 1);
        let Position::ContractPosition(position) = &positions[0] else {
            panic!("expected a contract position");
        };
        assert_eq!(position.balance_usd, Some(DecimalNumber::zero()));
    }

    #[tokio::test]
    async fn test_unknown_token_drops_only_its_position() {
        let mut orphan = contract_definition("0xorphan", "1");
        orphan.tokens = vec![TokenDefinition::new(NETWORK, Address::repeat_byte(0x99))];
        let hook = ScriptedPositionsHook::new("lending")
            .with_position(orphan)
            .with_position(contract_definition("0xa", "2"));
        let resolver = position_resolver(vec![Arc::new(hook)], FakeChain::new(), pool_token_info());

        let positions = resolver.get_positions(NETWORK, WALLET).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].address(), "0xa");
    }

    #[tokio::test]
    async fn test_mismatched_balances_drop_the_position() {
        let mut broken = contract_definition("0xbroken", "1");
        broken.balances = Deferrable::Fixed(vec![d("1"), d("2")]);
        let hook = ScriptedPositionsHook::new("lending").with_position(broken);
        let resolver = position_resolver(vec![Arc::new(hook)], FakeChain::new(), pool_token_info());

        assert!(resolver.get_positions(NETWORK, WALLET).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_price_for_token_without_info() {
        let token = Address::repeat_byte(0x77);
        let chain = FakeChain::new();
        chain.add_token(NETWORK, token, "XYZ", 18, U256::ZERO);
        let mut definition = contract_definition("0xa", "4");
        definition.tokens = vec![TokenDefinition::new(NETWORK, token).with_fallback_price(d("0.5"))];
        let hook = ScriptedPositionsHook::new("lending").with_position(definition);
        let resolver = position_resolver(vec![Arc::new(hook)], chain, CountingTokenInfo::new());

        let positions = resolver.get_positions(NETWORK, WALLET).await.unwrap();
        let Position::ContractPosition(position) = &positions[0] else {
            panic!("expected a contract position");
        };
        let Token::BaseToken(base) = &position.tokens[0] else {
            panic!("expected a base token");
        };
        assert_eq!(base.symbol, "XYZ");
        assert_eq!(position.balance_usd, Some(d("2")));
    }
}
