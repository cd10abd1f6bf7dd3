/// Wallet account identifiers and approval state

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use primitive_types::H160;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{StakeError, StakeResult};

// ============================================================================
// Address
// ============================================================================

/// 20-byte account identifier, displayed as lowercase `0x` hex
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(H160);

impl Address {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(H160(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        self.0.as_fixed_bytes()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl FromStr for Address {
    type Err = StakeError;

    fn from_str(input: &str) -> StakeResult<Self> {
        let trimmed = input.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if hex.len() != 40 {
            return Err(StakeError::invalid_address(input, "expected 40 hex digits"));
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StakeError::invalid_address(input, "non-hex character"));
        }

        let mut bytes = [0u8; 20];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| StakeError::invalid_address(input, "non-hex character"))?;
        }
        Ok(Self::from_bytes(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Approval State
// ============================================================================

/// Whether the staking contract may move the user's token balance
///
/// Cached copies are advisory only; the on-chain allowance is authoritative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalState {
    pub is_approved: bool,
    pub as_of: DateTime<Utc>,
}

impl ApprovalState {
    pub fn new(is_approved: bool) -> Self {
        Self {
            is_approved,
            as_of: Utc::now(),
        }
    }

    /// Neutral state used when no address is connected
    pub fn unknown() -> Self {
        Self {
            is_approved: false,
            as_of: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}
