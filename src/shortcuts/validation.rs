//! Trigger argument validation
//!
//! Raw trigger arguments arrive as a JSON object, mostly strings. Each declared
//! field is coerced to its kind; every failure is collected with its field path
//! so callers see all problems at once. `networkId` and `address` are always
//! required.

use crate::config::NetworkId;
use crate::error::{Error, Result};
use crate::numbers::DecimalNumber;
use crate::tokens::TokenId;
use alloy::primitives::Address;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Kind of a declared trigger input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// `[{tokenId, amount}]`, optionally of an exact length
    TokenAmounts { length: Option<usize> },
    /// `0x` address, stored lowercase
    Address,
    /// Number or numeric string
    Integer,
    String,
    Decimal,
}

/// Named input a shortcut declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputField {
    pub name: String,
    pub kind: FieldKind,
    pub optional: bool,
}

impl InputField {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            optional: false,
        }
    }

    pub fn token_amounts(name: &str, length: usize) -> Self {
        Self::new(
            name,
            FieldKind::TokenAmounts {
                length: Some(length),
            },
        )
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// One validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every field error of one trigger request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub Vec<FieldError>);

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(e.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAmount {
    pub token_id: TokenId,
    pub amount: DecimalNumber,
}

/// A coerced argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    TokenAmounts(Vec<TokenAmount>),
    Address(Address),
    Integer(u64),
    String(String),
    Decimal(DecimalNumber),
}

/// Validated trigger arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerArgs {
    pub network_id: NetworkId,
    /// Wallet the transactions are built for
    pub address: Address,
    values: HashMap<String, ArgValue>,
}

impl TriggerArgs {
    pub fn new(network_id: NetworkId, address: Address) -> Self {
        Self {
            network_id,
            address,
            values: HashMap::new(),
        }
    }

    pub fn with_value(mut self, name: &str, value: ArgValue) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    fn missing(name: &str) -> Error {
        Error::InvalidArgument(format!("Missing trigger argument '{}'", name))
    }

    fn mismatch(name: &str, expected: &str) -> Error {
        Error::InvalidArgument(format!("Trigger argument '{}' is not {}", name, expected))
    }

    pub fn token_amounts(&self, name: &str) -> Result<&[TokenAmount]> {
        match self.get(name) {
            Some(ArgValue::TokenAmounts(amounts)) => Ok(amounts),
            Some(_) => Err(Self::mismatch(name, "a token amount list")),
            None => Err(Self::missing(name)),
        }
    }

    pub fn address(&self, name: &str) -> Result<Address> {
        match self.get(name) {
            Some(ArgValue::Address(address)) => Ok(*address),
            Some(_) => Err(Self::mismatch(name, "an address")),
            None => Err(Self::missing(name)),
        }
    }

    pub fn integer(&self, name: &str) -> Result<u64> {
        match self.get(name) {
            Some(ArgValue::Integer(value)) => Ok(*value),
            Some(_) => Err(Self::mismatch(name, "an integer")),
            None => Err(Self::missing(name)),
        }
    }

    /// Integer argument holding a token's decimals
    pub fn decimals(&self, name: &str) -> Result<u8> {
        let value = self.integer(name)?;
        u8::try_from(value).map_err(|_| {
            Error::InvalidArgument(format!("Trigger argument '{}' is out of range: {}", name, value))
        })
    }

    pub fn string(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(ArgValue::String(value)) => Ok(value),
            Some(_) => Err(Self::mismatch(name, "a string")),
            None => Err(Self::missing(name)),
        }
    }

    pub fn decimal(&self, name: &str) -> Result<&DecimalNumber> {
        match self.get(name) {
            Some(ArgValue::Decimal(value)) => Ok(value),
            Some(_) => Err(Self::mismatch(name, "a decimal")),
            None => Err(Self::missing(name)),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn expected(kind: &str, value: &Value) -> String {
    format!("Expected {}, received {}", kind, type_name(value))
}

/// Parse the request's network id
pub fn parse_network_id(raw: &Map<String, Value>) -> std::result::Result<NetworkId, FieldError> {
    match raw.get("networkId") {
        None | Some(Value::Null) => Err(FieldError::new("networkId", "Required")),
        Some(Value::String(s)) => s.parse().map_err(|_| {
            FieldError::new("networkId", format!("Invalid network id '{}'", s))
        }),
        Some(other) => Err(FieldError::new("networkId", expected("string", other))),
    }
}

fn coerce_address(value: &Value) -> std::result::Result<Address, String> {
    match value {
        Value::String(s) if s.len() == 42 && s.starts_with("0x") => {
            s.parse().map_err(|_| "Invalid address".to_string())
        }
        Value::String(_) => Err("Invalid address".to_string()),
        other => Err(expected("string", other)),
    }
}

fn coerce_integer(value: &Value) -> std::result::Result<u64, String> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    match number {
        None => Err("Expected number, received nan".to_string()),
        Some(n) if n.is_nan() => Err("Expected number, received nan".to_string()),
        Some(n) if n.fract() != 0.0 => Err("Expected integer, received float".to_string()),
        Some(n) if n < 0.0 => Err("Number must be greater than or equal to 0".to_string()),
        Some(n) if n > u64::MAX as f64 => Err("Number is too large".to_string()),
        Some(n) => Ok(n as u64),
    }
}

fn coerce_decimal(value: &Value) -> std::result::Result<DecimalNumber, String> {
    match value {
        Value::String(s) => s.parse().map_err(|_| "Invalid decimal number".to_string()),
        Value::Number(n) => n
            .to_string()
            .parse()
            .map_err(|_| "Invalid decimal number".to_string()),
        other => Err(expected("string", other)),
    }
}

fn coerce_token_amounts(
    path: &str,
    value: &Value,
    length: Option<usize>,
    errors: &mut Vec<FieldError>,
) -> Option<Vec<TokenAmount>> {
    let Value::Array(items) = value else {
        errors.push(FieldError::new(path, expected("array", value)));
        return None;
    };
    let before = errors.len();
    if let Some(length) = length {
        if items.len() != length {
            errors.push(FieldError::new(
                path,
                format!("Array must contain exactly {} element(s)", length),
            ));
        }
    }

    let mut amounts = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Value::Object(item) = item else {
            errors.push(FieldError::new(format!("{}.{}", path, i), expected("object", item)));
            continue;
        };

        let token_id = match item.get("tokenId") {
            None | Some(Value::Null) => {
                errors.push(FieldError::new(format!("{}.{}.tokenId", path, i), "Required"));
                None
            }
            Some(Value::String(s)) => match TokenId::parse(s) {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.push(FieldError::new(
                        format!("{}.{}.tokenId", path, i),
                        "Invalid token id",
                    ));
                    None
                }
            },
            Some(other) => {
                errors.push(FieldError::new(
                    format!("{}.{}.tokenId", path, i),
                    expected("string", other),
                ));
                None
            }
        };

        let amount = match item.get("amount") {
            None | Some(Value::Null) => {
                errors.push(FieldError::new(format!("{}.{}.amount", path, i), "Required"));
                None
            }
            Some(raw) => match coerce_decimal(raw) {
                Ok(amount) if amount.is_negative() => {
                    errors.push(FieldError::new(
                        format!("{}.{}.amount", path, i),
                        "Amount must not be negative",
                    ));
                    None
                }
                Ok(amount) => Some(amount),
                Err(message) => {
                    errors.push(FieldError::new(format!("{}.{}.amount", path, i), message));
                    None
                }
            },
        };

        if let (Some(token_id), Some(amount)) = (token_id, amount) {
            amounts.push(TokenAmount { token_id, amount });
        }
    }

    (errors.len() == before).then_some(amounts)
}

fn coerce_field(field: &InputField, value: &Value, errors: &mut Vec<FieldError>) -> Option<ArgValue> {
    let path = field.name.as_str();
    let result = match &field.kind {
        FieldKind::TokenAmounts { length } => {
            return coerce_token_amounts(path, value, *length, errors).map(ArgValue::TokenAmounts)
        }
        FieldKind::Address => coerce_address(value).map(ArgValue::Address),
        FieldKind::Integer => coerce_integer(value).map(ArgValue::Integer),
        FieldKind::String => match value {
            Value::String(s) => Ok(ArgValue::String(s.clone())),
            other => Err(expected("string", other)),
        },
        FieldKind::Decimal => coerce_decimal(value).map(ArgValue::Decimal),
    };
    match result {
        Ok(value) => Some(value),
        Err(message) => {
            errors.push(FieldError::new(path, message));
            None
        }
    }
}

/// Coerce `raw` against `fields`, collecting every failure
pub fn validate_trigger_args(
    fields: &[InputField],
    raw: &Map<String, Value>,
) -> std::result::Result<TriggerArgs, ValidationError> {
    let mut errors = Vec::new();

    let network_id = parse_network_id(raw).map_err(|e| errors.push(e)).ok();
    let address = match raw.get("address") {
        None | Some(Value::Null) => {
            errors.push(FieldError::new("address", "Required"));
            None
        }
        Some(value) => coerce_address(value)
            .map_err(|message| errors.push(FieldError::new("address", message)))
            .ok(),
    };

    let mut values = HashMap::new();
    for field in fields {
        match raw.get(&field.name) {
            None | Some(Value::Null) => {
                if !field.optional {
                    errors.push(FieldError::new(field.name.as_str(), "Required"));
                }
            }
            Some(value) => {
                if let Some(coerced) = coerce_field(field, value, &mut errors) {
                    values.insert(field.name.clone(), coerced);
                }
            }
        }
    }

    match (network_id, address) {
        (Some(network_id), Some(address)) if errors.is_empty() => Ok(TriggerArgs {
            network_id,
            address,
            values,
        }),
        _ => Err(ValidationError(errors)),
    }
}
