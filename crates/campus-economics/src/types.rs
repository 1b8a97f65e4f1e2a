//! Identities shared by every ledger component.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fixed_point::{FixedPointAmount, FixedPointError, Scale};

/// Ledger account (user wallet, contract-equivalent spender, pool, treasury).
///
/// Identities compare case-insensitively, so they are normalized to lower case
/// on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl AsRef<str>) -> Self {
        AccountId(id.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last `n` characters, used when deriving identifiers from an account
    pub fn suffix(&self, n: usize) -> &str {
        let start = self.0.len().saturating_sub(n);
        self.0.get(start..).unwrap_or(&self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        AccountId::new(id)
    }
}

/// Asset identifier (e.g. "eth", "yd", "usdt", "link")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl AsRef<str>) -> Self {
        AssetId(id.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(id: &str) -> Self {
        AssetId::new(id)
    }
}

/// Staking track identifier; one pool instance exists per track
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl AsRef<str>) -> Self {
        TrackId(id.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        TrackId::new(id)
    }
}

/// An asset together with its declared decimal scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub id: AssetId,
    pub symbol: String,
    pub scale: Scale,
}

impl AssetSpec {
    pub fn new(id: &str, symbol: &str, scale: Scale) -> Self {
        AssetSpec {
            id: AssetId::new(id),
            symbol: symbol.to_string(),
            scale,
        }
    }

    pub fn amount(&self, raw: u128) -> FixedPointAmount {
        FixedPointAmount::new(raw, self.scale)
    }

    pub fn parse(&self, literal: &str) -> Result<FixedPointAmount, FixedPointError> {
        FixedPointAmount::parse(literal, self.scale)
    }

    /// Human-readable rendering, e.g. `1.5 USDT`
    pub fn display(&self, raw: u128) -> String {
        format!("{} {}", self.amount(raw), self.symbol)
    }
}
