//! Transaction assembly for triggered shortcuts

use super::validation::{parse_network_id, validate_trigger_args, FieldError, ValidationError};
use super::{Shortcut, TokenSpend, Transaction, TriggerArgs, TriggerResult};
use crate::chain::{erc20, ChainClient};
use crate::error::{with_timeout, Error, Result};
use crate::registry::ShortcutRegistry;
use crate::simulation::{SimulatedTransaction, SimulationError, TransactionSimulator};
use alloy::primitives::Address;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Buffer applied to simulated gas, in percent
const GAS_BUFFER_PERCENT: u64 = 115;

/// Turns trigger output into a self-contained, ordered transaction list
pub struct TransactionBuilder {
    chain: Arc<dyn ChainClient>,
    simulator: Arc<dyn TransactionSimulator>,
    timeout: Duration,
}

impl TransactionBuilder {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        simulator: Arc<dyn TransactionSimulator>,
        timeout: Duration,
    ) -> Self {
        Self {
            chain,
            simulator,
            timeout,
        }
    }

    /// Run `shortcut` with validated `args`
    pub async fn build(&self, shortcut: &Shortcut, args: &TriggerArgs) -> Result<TriggerResult> {
        let output = with_timeout(self.timeout, shortcut.on_trigger.on_trigger(args)).await?;

        let mut transactions = Vec::with_capacity(output.transactions.len() + 1);
        if let Some(spend) = &output.spend {
            if let Some(approve) = self.approval(args, spend).await? {
                transactions.push(approve);
            }
        }
        let intent_start = transactions.len();
        transactions.extend(output.transactions);

        self.apply_gas(shortcut, args, &mut transactions, intent_start)
            .await;

        Ok(TriggerResult {
            transactions,
            data_props: output.data_props,
        })
    }

    /// `approve(spender, amount)` when the current allowance is short
    async fn approval(&self, args: &TriggerArgs, spend: &TokenSpend) -> Result<Option<Transaction>> {
        let allowance = with_timeout(
            self.timeout,
            erc20::allowance(
                self.chain.as_ref(),
                args.network_id,
                spend.token,
                args.address,
                spend.spender,
            ),
        )
        .await?;

        if allowance >= spend.amount {
            return Ok(None);
        }
        tracing::debug!(
            token = %spend.token,
            spender = %spend.spender,
            allowance = %allowance,
            amount = %spend.amount,
            "Adding approval"
        );
        Ok(Some(Transaction::new(
            args.network_id,
            args.address,
            spend.token,
            erc20::approve_calldata(spend.spender, spend.amount),
        )))
    }

    async fn simulate(
        &self,
        args: &TriggerArgs,
        transactions: &[Transaction],
    ) -> std::result::Result<Vec<SimulatedTransaction>, SimulationError> {
        let simulated = match tokio::time::timeout(
            self.timeout,
            self.simulator.simulate(args.network_id, transactions),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(SimulationError::Timeout(self.timeout.as_millis() as u64)),
        };
        if simulated.len() != transactions.len() {
            return Err(SimulationError::Failed(format!(
                "{} results for {} transactions",
                simulated.len(),
                transactions.len()
            )));
        }
        Ok(simulated)
    }

    /// Set `gas`/`estimatedGasUse` on the intent transactions
    async fn apply_gas(
        &self,
        shortcut: &Shortcut,
        args: &TriggerArgs,
        transactions: &mut [Transaction],
        intent_start: usize,
    ) {
        if transactions.len() == intent_start {
            return;
        }

        match self.simulate(args, transactions).await {
            Ok(simulated) => {
                for (tx, gas) in transactions.iter_mut().zip(simulated).skip(intent_start) {
                    tx.gas = Some(gas.gas_needed.saturating_mul(GAS_BUFFER_PERCENT) / 100);
                    tx.estimated_gas_use = Some(gas.gas_used);
                }
            }
            Err(e) => {
                if !matches!(e, SimulationError::Unsupported(_)) {
                    tracing::warn!(
                        shortcut_id = %shortcut.id,
                        error = %e,
                        "Unexpected error during transaction simulation"
                    );
                }
                if let Some(fallback) = shortcut.fallback_gas {
                    for tx in transactions.iter_mut().skip(intent_start) {
                        tx.gas = Some(fallback);
                        tx.estimated_gas_use = Some(fallback / 3);
                    }
                }
            }
        }
    }
}

/// Look up, validate and build a shortcut of `app_id`
pub async fn trigger_shortcut(
    registry: &ShortcutRegistry,
    builder: &TransactionBuilder,
    app_id: &str,
    shortcut_id: &str,
    raw_args: &Map<String, Value>,
) -> Result<TriggerResult> {
    let network = match parse_network_id(raw_args) {
        Ok(network) => network,
        Err(e) => {
            let mut errors = vec![e];
            if let Err(e) = validate_trigger_args(&[], raw_args) {
                errors.extend(e.0.into_iter().filter(|f: &FieldError| f.path != "networkId"));
            }
            return Err(ValidationError(errors).into());
        }
    };
    let wallet = raw_args
        .get("address")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Address>().ok());

    let shortcuts = registry.shortcuts(app_id, network, wallet).await?;
    let Some(shortcut) = shortcuts
        .iter()
        .find(|s| s.id == shortcut_id && s.supports_network(network))
    else {
        return Err(Error::UnknownShortcut {
            id: shortcut_id.to_string(),
            app_id: app_id.to_string(),
            available: shortcuts
                .iter()
                .filter(|s| s.supports_network(network))
                .map(|s| s.id.clone())
                .collect(),
        });
    };

    let args = validate_trigger_args(&shortcut.trigger_input_shape, raw_args)?;
    tracing::info!(
        app_id = %app_id,
        shortcut_id = %shortcut_id,
        network = %network,
        "Triggering shortcut"
    );
    builder.build(shortcut, &args).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkId;
    use crate::shortcuts::{ShortcutCategory, TriggerOutput};
    use crate::test_support::{FakeChain, FixedTrigger, ScriptedShortcutsHook, ScriptedSimulator};
    use alloy::primitives::{address, Bytes, U256};
    use serde_json::json;

    const NETWORK: NetworkId = NetworkId::ArbitrumOne;
    const WALLET: Address = address!("0000000000000000000000000000000000007e57");
    const TOKEN: Address = address!("af88d065e77c8cc2239327c5edb3a432268e5831");
    const VAULT: Address = address!("392b1e6905bb8449d26af701cdea6ff47bf6e5a8");

    fn deposit_tx() -> Transaction {
        Transaction::new(NETWORK, WALLET, VAULT, Bytes::from(vec![0x6e, 0x55, 0x3f, 0x65]))
    }

    fn deposit_shortcut(fallback_gas: Option<u64>) -> Shortcut {
        Shortcut {
            id: "deposit".to_string(),
            name: "Deposit".to_string(),
            description: "Lend your assets to earn interest".to_string(),
            network_ids: vec![NETWORK],
            category: ShortcutCategory::Deposit,
            trigger_input_shape: Vec::new(),
            on_trigger: Arc::new(FixedTrigger::new(TriggerOutput {
                transactions: vec![deposit_tx()],
                data_props: None,
                spend: Some(TokenSpend {
                    token: TOKEN,
                    spender: VAULT,
                    amount: U256::from(1_000_000u64),
                }),
            })),
            fallback_gas,
        }
    }

    fn chain_with_allowance(allowance: u64) -> FakeChain {
        let chain = FakeChain::new();
        chain.add_token(NETWORK, TOKEN, "USDC", 6, U256::ZERO);
        chain.set_allowance(NETWORK, TOKEN, WALLET, VAULT, U256::from(allowance));
        chain
    }

    fn builder(chain: FakeChain, simulator: ScriptedSimulator) -> TransactionBuilder {
        TransactionBuilder::new(Arc::new(chain), Arc::new(simulator), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_insufficient_allowance_prepends_approval() {
        let simulator = ScriptedSimulator::returning(vec![
            SimulatedTransaction {
                gas_needed: 50_000,
                gas_used: 45_000,
            },
            SimulatedTransaction {
                gas_needed: 200_000,
                gas_used: 150_000,
            },
        ]);
        let requests = simulator.requests();
        let builder = builder(chain_with_allowance(10), simulator);

        let result = builder
            .build(&deposit_shortcut(Some(750_000)), &TriggerArgs::new(NETWORK, WALLET))
            .await
            .unwrap();

        assert_eq!(result.transactions.len(), 2);
        let approve = &result.transactions[0];
        assert_eq!(approve.to, TOKEN);
        assert_eq!(approve.data, erc20::approve_calldata(VAULT, U256::from(1_000_000u64)));
        assert_eq!(approve.gas, None);

        let deposit = &result.transactions[1];
        assert_eq!(deposit.to, VAULT);
        assert_eq!(deposit.gas, Some(230_000));
        assert_eq!(deposit.estimated_gas_use, Some(150_000));

        // The simulator saw the full list, approval first
        assert_eq!(requests.all()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_sufficient_allowance_skips_approval() {
        let simulator = ScriptedSimulator::returning(vec![SimulatedTransaction {
            gas_needed: 100,
            gas_used: 90,
        }]);
        let builder = builder(chain_with_allowance(1_000_000), simulator);

        let result = builder
            .build(&deposit_shortcut(None), &TriggerArgs::new(NETWORK, WALLET))
            .await
            .unwrap();
        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.transactions[0].gas, Some(115));
    }

    #[tokio::test]
    async fn test_unsupported_simulation_uses_fallback_gas() {
        let builder = builder(chain_with_allowance(0), ScriptedSimulator::unsupported());

        let result = builder
            .build(&deposit_shortcut(Some(750_000)), &TriggerArgs::new(NETWORK, WALLET))
            .await
            .unwrap();
        let deposit = &result.transactions[1];
        assert_eq!(deposit.gas, Some(750_000));
        assert_eq!(deposit.estimated_gas_use, Some(250_000));
    }

    #[tokio::test]
    async fn test_failed_simulation_uses_fallback_gas() {
        let builder = builder(
            chain_with_allowance(0),
            ScriptedSimulator::failing(SimulationError::Failed("reverted".to_string())),
        );
        let result = builder
            .build(&deposit_shortcut(Some(300)), &TriggerArgs::new(NETWORK, WALLET))
            .await
            .unwrap();
        assert_eq!(result.transactions[1].gas, Some(300));
        assert_eq!(result.transactions[1].estimated_gas_use, Some(100));

        // Without a fallback the gas is left to the wallet
        let result = builder
            .build(&deposit_shortcut(None), &TriggerArgs::new(NETWORK, WALLET))
            .await
            .unwrap();
        assert_eq!(result.transactions[1].gas, None);
    }

    fn ubeswap_registry() -> ShortcutRegistry {
        let claim = Shortcut {
            id: "claim-reward".to_string(),
            name: "Claim".to_string(),
            description: "Claim rewards for staked liquidity".to_string(),
            network_ids: vec![NetworkId::CeloMainnet],
            category: ShortcutCategory::Claim,
            trigger_input_shape: vec![crate::shortcuts::InputField::new(
                "positionAddress",
                crate::shortcuts::FieldKind::Address,
            )],
            on_trigger: Arc::new(FixedTrigger::new(TriggerOutput {
                transactions: vec![Transaction::new(
                    NetworkId::CeloMainnet,
                    WALLET,
                    address!("31f9dee850b4284b81b52b25a3194f2fc8ff18cf"),
                    Bytes::from(vec![0x4e, 0x71, 0xd9, 0x2d]),
                )],
                data_props: None,
                spend: None,
            })),
            fallback_gas: None,
        };
        ShortcutRegistry::new(vec![Arc::new(
            ScriptedShortcutsHook::new("ubeswap").with_shortcut(claim),
        )])
    }

    fn raw(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[tokio::test]
    async fn test_unknown_shortcut_message() {
        let builder = builder(FakeChain::new(), ScriptedSimulator::unsupported());
        let err = trigger_shortcut(
            &ubeswap_registry(),
            &builder,
            "ubeswap",
            "flarf",
            &raw(json!({
                "networkId": "celo-mainnet",
                "address": "0x0000000000000000000000000000000000007E57",
                "positionAddress": "0x31f9dee850b4284b81b52b25a3194f2fc8ff18cf"
            })),
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "No shortcut found with id 'flarf' for app 'ubeswap', available shortcuts: claim-reward"
        );
    }

    #[tokio::test]
    async fn test_shortcut_on_another_network_is_unknown() {
        let builder = builder(FakeChain::new(), ScriptedSimulator::unsupported());
        let err = trigger_shortcut(
            &ubeswap_registry(),
            &builder,
            "ubeswap",
            "claim-reward",
            &raw(json!({
                "networkId": "op-mainnet",
                "address": "0x0000000000000000000000000000000000007e57"
            })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::UnknownShortcut { ref available, .. } if available.is_empty()));
    }

    #[tokio::test]
    async fn test_trigger_validates_then_builds() {
        let builder = builder(FakeChain::new(), ScriptedSimulator::unsupported());
        let registry = ubeswap_registry();

        let err = trigger_shortcut(
            &registry,
            &builder,
            "ubeswap",
            "claim-reward",
            &raw(json!({ "networkId": "celo-mainnet", "address": "0x0000000000000000000000000000000000007E57" })),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid shortcut arguments: positionAddress: Required"
        );

        let result = trigger_shortcut(
            &registry,
            &builder,
            "ubeswap",
            "claim-reward",
            &raw(json!({
                "networkId": "celo-mainnet",
                "address": "0x0000000000000000000000000000000000007E57",
                "positionAddress": "0x31f9dee850b4284b81b52b25a3194f2fc8ff18cf"
            })),
        )
        .await
        .unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["transactions"][0]["from"], "0x0000000000000000000000000000000000007e57");
        assert_eq!(json["transactions"][0]["to"], "0x31f9dee850b4284b81b52b25a3194f2fc8ff18cf");
        assert!(json.get("dataProps").is_none());
    }

    #[tokio::test]
    async fn test_missing_network_is_a_validation_error() {
        let builder = builder(FakeChain::new(), ScriptedSimulator::unsupported());
        let err = trigger_shortcut(&ubeswap_registry(), &builder, "ubeswap", "claim-reward", &Map::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid shortcut arguments: networkId: Required; address: Required"
        );
    }
}
