//! Registered position and shortcut hooks
//!
//! Both registries are built once at start-up and never mutated; share them
//! behind an `Arc`.

use crate::apps;
use crate::chain::ChainClient;
use crate::config::{Config, NetworkId};
use crate::error::{with_timeout, Result};
use crate::positions::{AppInfo, PositionsHook};
use crate::shortcuts::{Shortcut, ShortcutInfo, ShortcutsHook};
use alloy::primitives::Address;
use futures::future;
use std::sync::Arc;
use std::time::Duration;

fn is_enabled(enabled: &[String], app_id: &str) -> bool {
    enabled.is_empty() || enabled.iter().any(|id| id == app_id)
}

/// Ordered set of position hooks
pub struct HookRegistry {
    hooks: Vec<Arc<dyn PositionsHook>>,
}

impl HookRegistry {
    pub fn new(hooks: Vec<Arc<dyn PositionsHook>>) -> Self {
        Self { hooks }
    }

    /// Built-in hooks, filtered by `config.position_ids`
    pub fn builtin(config: &Config, chain: Arc<dyn ChainClient>) -> Self {
        Self::new(apps::position_hooks(config, chain)).enabled(&config.position_ids)
    }

    /// Keep only the hooks whose app id is listed; an empty list keeps all
    pub fn enabled(self, ids: &[String]) -> Self {
        Self {
            hooks: self
                .hooks
                .into_iter()
                .filter(|hook| is_enabled(ids, &hook.info().id))
                .collect(),
        }
    }

    /// Hooks applicable to `network`, in registration order
    pub fn hooks_for(&self, network: NetworkId) -> Vec<Arc<dyn PositionsHook>> {
        self.hooks
            .iter()
            .filter(|hook| hook.supports_network(network))
            .cloned()
            .collect()
    }

    pub fn apps(&self) -> Vec<AppInfo> {
        self.hooks.iter().map(|hook| hook.info()).collect()
    }
}

/// Ordered set of shortcut hooks
pub struct ShortcutRegistry {
    hooks: Vec<Arc<dyn ShortcutsHook>>,
    timeout: Duration,
}

impl ShortcutRegistry {
    pub fn new(hooks: Vec<Arc<dyn ShortcutsHook>>) -> Self {
        Self {
            hooks,
            timeout: Config::default().call_timeout(),
        }
    }

    /// Built-in hooks, filtered by `config.shortcut_ids`
    pub fn builtin(config: &Config) -> Self {
        Self::new(apps::shortcut_hooks())
            .with_timeout(config.call_timeout())
            .enabled(&config.shortcut_ids)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn enabled(self, ids: &[String]) -> Self {
        Self {
            hooks: self
                .hooks
                .into_iter()
                .filter(|hook| is_enabled(ids, hook.app_id()))
                .collect(),
            timeout: self.timeout,
        }
    }

    pub fn get(&self, app_id: &str) -> Option<&Arc<dyn ShortcutsHook>> {
        self.hooks.iter().find(|hook| hook.app_id() == app_id)
    }

    /// Shortcuts of `app_id` on `network`; an unknown app has none
    pub async fn shortcuts(
        &self,
        app_id: &str,
        network: NetworkId,
        address: Option<Address>,
    ) -> Result<Vec<Shortcut>> {
        match self.get(app_id) {
            Some(hook) => {
                with_timeout(self.timeout, hook.shortcut_definitions(network, address)).await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Every app's shortcuts on `network`, without trigger logic
    ///
    /// A failing hook is logged and skipped.
    pub async fn list_shortcuts(
        &self,
        network: NetworkId,
        address: Option<Address>,
    ) -> Vec<ShortcutInfo> {
        let results = future::join_all(self.hooks.iter().map(|hook| async move {
            let result =
                with_timeout(self.timeout, hook.shortcut_definitions(network, address)).await;
            (hook.app_id(), result)
        }))
        .await;

        let mut listed = Vec::new();
        for (app_id, result) in results {
            match result {
                Ok(shortcuts) => listed.extend(
                    shortcuts
                        .iter()
                        .filter(|s| s.supports_network(network))
                        .map(|s| ShortcutInfo::new(app_id, s)),
                ),
                Err(e) => {
                    tracing::warn!(app_id = %app_id, error = %e, "Failed to load shortcuts");
                }
            }
        }
        listed
    }
}
