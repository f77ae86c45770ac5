//! Built-in protocol adapters
//!
//! Registration order here is the order positions are reported in.

pub mod allbridge;
pub mod curve;
pub mod somm;
pub mod stcelo;
pub mod uniswap;

use crate::chain::ChainClient;
use crate::config::Config;
use crate::positions::PositionsHook;
use crate::shortcuts::ShortcutsHook;
use serde_json::{Map, Value};
use std::sync::Arc;

pub fn position_hooks(config: &Config, chain: Arc<dyn ChainClient>) -> Vec<Arc<dyn PositionsHook>> {
    vec![
        Arc::new(stcelo::StCeloPositions::new(chain.clone())),
        Arc::new(curve::CurvePositions::new(
            chain.clone(),
            config.curve_pools_ttl(),
            config.call_timeout(),
        )),
        Arc::new(uniswap::UniswapPositions::new(chain.clone())),
        Arc::new(allbridge::AllbridgePositions::new(
            chain,
            allbridge::AllbridgeApi::new(config.allbridge_ttl(), config.call_timeout()),
        )),
    ]
}

pub fn shortcut_hooks() -> Vec<Arc<dyn ShortcutsHook>> {
    vec![Arc::new(stcelo::StCeloShortcuts), Arc::new(somm::SommShortcuts)]
}

/// Trigger args literal as a JSON object
fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
