//! Per-request token resolution
//!
//! Every token referenced while answering one request is resolved at most once.
//! The arena maps each [`TokenId`] to its state:
//!
//! - `Pending`: a shared in-flight future every dependent awaits
//! - `Resolved`: the finished token
//! - `Failed`: the error, replayed to every later requester
//!
//! Alongside the slots the arena keeps a wait-for graph (`waits_on`): an edge
//! `a -> b` means `a`'s resolution is awaiting `b`. Before a pending token is
//! awaited, the requester checks whether that token already (transitively)
//! waits on the requester. If it does, awaiting would deadlock, so the branch
//! fails with [`ResolutionError::Cycle`] instead.

use super::definitions::AppTokenPositionDefinition;
use super::{AppInfo, PositionsHook};
use crate::chain::{erc20, ChainClient};
use crate::error::{with_timeout, Error};
use crate::numbers::DecimalNumber;
use crate::tokens::{
    AppTokenDetails, ResolvedToken, ResolvedTokens, TokenDefinition, TokenId, TokenInfoSource,
    TokenKind,
};
use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Why a token could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("unknown token {0}: no token info and no fallback price")]
    UnknownToken(TokenId),

    #[error("cycle detected at {0}")]
    Cycle(TokenId),

    #[error("{token} depends on {dependency}: {cause}")]
    Dependency {
        token: TokenId,
        dependency: TokenId,
        cause: Box<ResolutionError>,
    },

    #[error("failed to resolve {token}: {message}")]
    Failed { token: TokenId, message: String },

    #[error("token {0} was not resolved")]
    NotResolved(TokenId),
}

impl ResolutionError {
    fn failed(token: &TokenId, error: impl std::fmt::Display) -> Self {
        ResolutionError::Failed {
            token: token.clone(),
            message: error.to_string(),
        }
    }

    /// Innermost error of a dependency chain
    pub fn root_cause(&self) -> &ResolutionError {
        match self {
            ResolutionError::Dependency { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self.root_cause(), ResolutionError::Cycle(_))
    }
}

type ResolutionResult = Result<Arc<ResolvedToken>, ResolutionError>;
type SharedResolution = Shared<BoxFuture<'static, ResolutionResult>>;

#[derive(Clone)]
enum Slot {
    Pending(SharedResolution),
    Resolved(Arc<ResolvedToken>),
    Failed(ResolutionError),
}

#[derive(Default)]
struct Arena {
    slots: HashMap<TokenId, Slot>,
    waits_on: HashMap<TokenId, HashSet<TokenId>>,
}

impl Arena {
    /// Whether `from` is (transitively) waiting on `to`
    fn reaches(&self, from: &TokenId, to: &TokenId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            if let Some(next) = self.waits_on.get(node) {
                stack.extend(next.iter());
            }
        }
        false
    }
}

/// App token definition together with the hook that owns it
#[derive(Clone)]
pub struct ClaimedDefinition {
    pub app: AppInfo,
    pub definition: Arc<AppTokenPositionDefinition>,
}

/// Outcome of resolving a set of tokens
#[derive(Debug, Default)]
pub struct Resolution {
    pub tokens: ResolvedTokens,
    pub failures: HashMap<TokenId, ResolutionError>,
}

impl Resolution {
    /// The resolved token, or why it is missing
    pub fn require(&self, token_id: &TokenId) -> Result<&Arc<ResolvedToken>, ResolutionError> {
        if let Some(error) = self.failures.get(token_id) {
            return Err(error.clone());
        }
        self.tokens
            .get_by_id(token_id)
            .map_err(|_| ResolutionError::NotResolved(token_id.clone()))
    }
}

/// Request-scoped token resolver
pub struct TokenResolver {
    hooks: Vec<Arc<dyn PositionsHook>>,
    chain: Arc<dyn ChainClient>,
    token_info: Arc<dyn TokenInfoSource>,
    timeout: Duration,
    seeds: HashMap<TokenId, ClaimedDefinition>,
    arena: Mutex<Arena>,
}

impl TokenResolver {
    pub fn new(
        hooks: Vec<Arc<dyn PositionsHook>>,
        chain: Arc<dyn ChainClient>,
        token_info: Arc<dyn TokenInfoSource>,
        timeout: Duration,
    ) -> Self {
        Self {
            hooks,
            chain,
            token_info,
            timeout,
            seeds: HashMap::new(),
            arena: Mutex::new(Arena::default()),
        }
    }

    /// Use `definition` for its token instead of asking the hooks. The first seed wins.
    pub fn with_seed(mut self, app: AppInfo, definition: Arc<AppTokenPositionDefinition>) -> Self {
        self.seeds
            .entry(definition.token_id())
            .or_insert(ClaimedDefinition { app, definition });
        self
    }

    /// Resolve `definitions` and everything they depend on.
    ///
    /// Consumes the arena: the returned [`Resolution`] holds every token touched.
    pub async fn resolve_all(self: Arc<Self>, definitions: Vec<TokenDefinition>) -> Resolution {
        let pending: Vec<_> = definitions
            .into_iter()
            .map(|definition| self.resolve_one(definition, None))
            .collect();
        future::join_all(pending).await;
        self.drain()
    }

    fn lock_arena(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn drain(&self) -> Resolution {
        let arena = std::mem::take(&mut *self.lock_arena());
        let mut resolution = Resolution::default();
        for (token_id, slot) in arena.slots {
            match slot {
                Slot::Resolved(token) => resolution.tokens.insert(token),
                Slot::Failed(error) => {
                    resolution.failures.insert(token_id, error);
                }
                Slot::Pending(_) => {
                    resolution
                        .failures
                        .insert(token_id.clone(), ResolutionError::NotResolved(token_id));
                }
            }
        }
        resolution
    }

    /// Memoized resolution of one token on behalf of `requester`
    fn resolve_one(
        self: &Arc<Self>,
        definition: TokenDefinition,
        requester: Option<&TokenId>,
    ) -> BoxFuture<'static, ResolutionResult> {
        let token_id = definition.token_id();
        let mut guard = self.lock_arena();
        let arena = &mut *guard;

        if let Some(slot) = arena.slots.get(&token_id).cloned() {
            return match slot {
                Slot::Resolved(token) => future::ready(Ok(token)).boxed(),
                Slot::Failed(error) => future::ready(Err(error)).boxed(),
                Slot::Pending(shared) => {
                    if let Some(requester) = requester {
                        if arena.reaches(&token_id, requester) {
                            tracing::warn!(token_id = %token_id, requester = %requester, "Token dependency cycle");
                            return future::ready(Err(ResolutionError::Cycle(token_id))).boxed();
                        }
                        arena
                            .waits_on
                            .entry(requester.clone())
                            .or_default()
                            .insert(token_id);
                    }
                    shared.boxed()
                }
            };
        }

        if let Some(requester) = requester {
            arena
                .waits_on
                .entry(requester.clone())
                .or_default()
                .insert(token_id.clone());
        }

        let this = Arc::clone(self);
        let id = token_id.clone();
        let shared = async move {
            let result = this.resolve_uncached(definition).await;
            this.settle(&id, &result);
            result
        }
        .boxed()
        .shared();

        arena.slots.insert(token_id, Slot::Pending(shared.clone()));
        shared.boxed()
    }

    fn settle(&self, token_id: &TokenId, result: &ResolutionResult) {
        let mut arena = self.lock_arena();
        let slot = match result {
            Ok(token) => Slot::Resolved(Arc::clone(token)),
            Err(error) => Slot::Failed(error.clone()),
        };
        arena.slots.insert(token_id.clone(), slot);
        arena.waits_on.remove(token_id);
    }

    async fn resolve_uncached(self: &Arc<Self>, definition: TokenDefinition) -> ResolutionResult {
        let token_id = definition.token_id();
        let claimed = match self.seeds.get(&token_id) {
            Some(claimed) => Some(claimed.clone()),
            None => self.claim(&definition).await,
        };

        let token = match claimed {
            Some(claimed) => self.resolve_app_token(&token_id, claimed).await?,
            None => self.resolve_base_token(&token_id, &definition).await?,
        };

        tracing::debug!(
            token_id = %token_id,
            symbol = %token.symbol,
            app_token = token.is_app_token(),
            "Resolved token"
        );
        Ok(Arc::new(token))
    }

    /// Ask each hook in order; the first that does not answer "unknown app token" owns it.
    async fn claim(
        &self,
        definition: &TokenDefinition,
    ) -> Option<ClaimedDefinition> {
        for hook in &self.hooks {
            let app = hook.info();
            match with_timeout(self.timeout, hook.app_token_definition(definition)).await {
                Ok(claimed) => {
                    return Some(ClaimedDefinition {
                        app,
                        definition: Arc::new(claimed),
                    })
                }
                Err(e) if e.is_unknown_app_token() => continue,
                // A broken hook claims nothing; the next hook or the base path gets the token
                Err(e) => {
                    tracing::warn!(
                        app_id = %app.id,
                        token = %definition.token_id(),
                        error = %e,
                        "Hook failed to define token, skipping"
                    );
                }
            }
        }
        None
    }

    async fn resolve_base_token(
        &self,
        token_id: &TokenId,
        definition: &TokenDefinition,
    ) -> Result<ResolvedToken, ResolutionError> {
        let info = with_timeout(self.timeout, self.token_info.token_info(token_id))
            .await
            .map_err(|e| ResolutionError::failed(token_id, e))?;

        let (symbol, decimals, price_usd) = match (info, &definition.fallback_price_usd) {
            (Some(info), fallback) => (
                info.symbol,
                info.decimals,
                info.price_usd.or_else(|| fallback.clone()),
            ),
            // No token info: read what the chain knows and price it with the fallback.
            (None, Some(fallback)) => {
                let metadata = with_timeout(
                    self.timeout,
                    erc20::token_metadata(
                        self.chain.as_ref(),
                        definition.network_id,
                        definition.address,
                    ),
                )
                .await
                .map_err(|e| ResolutionError::failed(token_id, e))?;
                (metadata.symbol, metadata.decimals, Some(fallback.clone()))
            }
            (None, None) => return Err(ResolutionError::UnknownToken(token_id.clone())),
        };

        Ok(ResolvedToken {
            token_id: token_id.clone(),
            network_id: definition.network_id,
            address: definition.address,
            symbol,
            decimals,
            price_usd,
            kind: TokenKind::Base,
        })
    }

    async fn resolve_app_token(
        self: &Arc<Self>,
        token_id: &TokenId,
        claimed: ClaimedDefinition,
    ) -> Result<ResolvedToken, ResolutionError> {
        let definition = &claimed.definition;
        let children = future::join_all(
            definition
                .tokens
                .iter()
                .map(|child| self.resolve_one(child.clone(), Some(token_id))),
        );
        let metadata = with_timeout(
            self.timeout,
            erc20::token_metadata(self.chain.as_ref(), definition.network_id, definition.address),
        );
        let (children, metadata) = future::join(children, metadata).await;

        let mut underlying = Vec::with_capacity(definition.tokens.len());
        let mut resolved = ResolvedTokens::new();
        for (child, result) in definition.tokens.iter().zip(children) {
            let token = result.map_err(|cause| ResolutionError::Dependency {
                token: token_id.clone(),
                dependency: child.token_id(),
                cause: Box::new(cause),
            })?;
            underlying.push(token.token_id.clone());
            resolved.insert(token);
        }
        let metadata = metadata.map_err(|e| ResolutionError::failed(token_id, e))?;

        let price_per_share = definition
            .price_per_share
            .evaluate(&resolved)
            .map_err(|e| ResolutionError::failed(token_id, e))?;
        if price_per_share.len() != underlying.len() {
            return Err(ResolutionError::failed(
                token_id,
                format!(
                    "{} share prices for {} underlying tokens",
                    price_per_share.len(),
                    underlying.len()
                ),
            ));
        }

        let price_usd = share_price_usd(&resolved, &underlying, &price_per_share)
            .map_err(|e| ResolutionError::failed(token_id, e))?;

        Ok(ResolvedToken {
            token_id: token_id.clone(),
            network_id: definition.network_id,
            address: definition.address,
            symbol: metadata.symbol,
            decimals: metadata.decimals,
            price_usd,
            kind: TokenKind::App(AppTokenDetails {
                app_id: claimed.app.id.clone(),
                tokens: underlying,
                price_per_share,
                supply: DecimalNumber::from_raw(metadata.total_supply, metadata.decimals),
            }),
        })
    }
}

/// Σ pricePerShare[i] × price(token[i]); `None` when any price is unknown
fn share_price_usd(
    resolved: &ResolvedTokens,
    underlying: &[TokenId],
    price_per_share: &[DecimalNumber],
) -> Result<Option<DecimalNumber>, Error> {
    let mut total = DecimalNumber::zero();
    for (token_id, pps) in underlying.iter().zip(price_per_share) {
        let Some(price) = &resolved.get_by_id(token_id)?.price_usd else {
            return Ok(None);
        };
        total = total.checked_add(&pps.checked_mul(price)?)?;
    }
    Ok(Some(total))
}
