//! Valued positions returned to callers
//!
//! Serialized as camelCase JSON tagged by `type`; every number is an exact
//! decimal string.

use super::definitions::{DataProps, DisplayProps, ShortcutTriggerArgs};
use crate::config::NetworkId;
use crate::error::Result;
use crate::numbers::DecimalNumber;
use crate::tokens::{lowercase_address, ResolvedToken, ResolvedTokens, TokenId, TokenKind};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Position {
    AppToken(AppTokenPosition),
    ContractPosition(ContractPosition),
}

impl Position {
    pub fn app_id(&self) -> &str {
        match self {
            Position::AppToken(p) => &p.app_id,
            Position::ContractPosition(p) => &p.app_id,
        }
    }

    pub fn address(&self) -> &str {
        match self {
            Position::AppToken(p) => &p.address,
            Position::ContractPosition(p) => &p.address,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppTokenPosition {
    pub app_id: String,
    pub app_name: String,
    pub network_id: NetworkId,
    pub address: String,
    pub token_id: TokenId,
    pub symbol: String,
    pub decimals: u8,
    pub label: String,
    pub display_props: DisplayProps,
    pub tokens: Vec<Token>,
    pub price_per_share: Vec<DecimalNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<DecimalNumber>,
    pub balance: DecimalNumber,
    pub supply: DecimalNumber,
    pub available_shortcut_ids: Vec<String>,
    #[serde(skip_serializing_if = "ShortcutTriggerArgs::is_empty")]
    pub shortcut_trigger_args: ShortcutTriggerArgs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_props: Option<DataProps>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractPosition {
    pub app_id: String,
    pub app_name: String,
    pub network_id: NetworkId,
    pub address: String,
    pub label: String,
    pub display_props: DisplayProps,
    pub tokens: Vec<Token>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_usd: Option<DecimalNumber>,
    pub available_shortcut_ids: Vec<String>,
    #[serde(skip_serializing_if = "ShortcutTriggerArgs::is_empty")]
    pub shortcut_trigger_args: ShortcutTriggerArgs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_props: Option<DataProps>,
}

/// Token held by a position, with the position's balance of it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Token {
    BaseToken(BaseToken),
    AppToken(AppToken),
}

impl Token {
    pub fn balance(&self) -> &DecimalNumber {
        match self {
            Token::BaseToken(t) => &t.balance,
            Token::AppToken(t) => &t.balance,
        }
    }

    pub fn price_usd(&self) -> Option<&DecimalNumber> {
        match self {
            Token::BaseToken(t) => t.price_usd.as_ref(),
            Token::AppToken(t) => t.price_usd.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseToken {
    pub network_id: NetworkId,
    pub address: String,
    pub token_id: TokenId,
    pub symbol: String,
    pub decimals: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<DecimalNumber>,
    pub balance: DecimalNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppToken {
    pub app_id: String,
    pub network_id: NetworkId,
    pub address: String,
    pub token_id: TokenId,
    pub symbol: String,
    pub decimals: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<DecimalNumber>,
    pub balance: DecimalNumber,
    pub tokens: Vec<Token>,
    pub price_per_share: Vec<DecimalNumber>,
    pub supply: DecimalNumber,
}

/// Label shown for a position: `"{description}: {title}"`
pub fn label(display_props: &DisplayProps) -> String {
    format!("{}: {}", display_props.description, display_props.title)
}

/// Underlying token views for `balance` shares of an app token
pub fn underlying_tokens(
    resolved: &ResolvedTokens,
    underlying: &[TokenId],
    price_per_share: &[DecimalNumber],
    balance: &DecimalNumber,
) -> Result<Vec<Token>> {
    underlying
        .iter()
        .zip(price_per_share)
        .map(|(token_id, pps)| {
            let child = resolved.get_by_id(token_id)?;
            token_view(resolved, child, balance.checked_mul(pps)?)
        })
        .collect()
}

/// Output view of `token` holding `balance`, expanding app tokens recursively
pub fn token_view(
    resolved: &ResolvedTokens,
    token: &ResolvedToken,
    balance: DecimalNumber,
) -> Result<Token> {
    match &token.kind {
        TokenKind::Base => Ok(Token::BaseToken(BaseToken {
            network_id: token.network_id,
            address: lowercase_address(&token.address),
            token_id: token.token_id.clone(),
            symbol: token.symbol.clone(),
            decimals: token.decimals,
            price_usd: token.price_usd.clone(),
            balance,
        })),
        TokenKind::App(details) => {
            let tokens =
                underlying_tokens(resolved, &details.tokens, &details.price_per_share, &balance)?;
            Ok(Token::AppToken(AppToken {
                app_id: details.app_id.clone(),
                network_id: token.network_id,
                address: lowercase_address(&token.address),
                token_id: token.token_id.clone(),
                symbol: token.symbol.clone(),
                decimals: token.decimals,
                price_usd: token.price_usd.clone(),
                balance,
                tokens,
                price_per_share: details.price_per_share.clone(),
                supply: details.supply.clone(),
            }))
        }
    }
}

/// Σ balance × price over `tokens`; `None` when any price is unknown
pub fn total_usd(tokens: &[Token]) -> Result<Option<DecimalNumber>> {
    let mut total = DecimalNumber::zero();
    for token in tokens {
        let Some(price) = token.price_usd() else {
            return Ok(None);
        };
        let value = token.balance().checked_mul(price)?;
        total = total.checked_add(&value)?;
    }
    Ok(Some(total))
}
