//! Base-unit token amounts and their decimal presentation.
//!
//! Amounts cross the chain boundary as integer base units. The decimal form
//! exists only at the presentation edge: [`TokenAmount::parse_decimal`] turns
//! user input into base units and [`TokenAmount::to_decimal_string`] renders
//! base units for display. Keeping the two forms in different types means a
//! figure cannot be converted twice.

use std::fmt;
use std::str::FromStr;

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{StakeError, StakeResult, TOKEN_DECIMALS};

/// Token amount in base units (10^-18 of the display unit)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(U256);

/// 10^TOKEN_DECIMALS
fn unit_scale() -> U256 {
    U256::exp10(TOKEN_DECIMALS as usize)
}

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(U256([0; 4]));
    pub const MAX: TokenAmount = TokenAmount(U256([u64::MAX; 4]));

    pub const fn from_base_units(value: U256) -> Self {
        Self(value)
    }

    pub fn from_u128(value: u128) -> Self {
        Self(U256::from(value))
    }

    pub fn base_units(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Whole display units (`whole * 10^18` base units)
    pub fn from_whole_tokens(whole: u64) -> Self {
        Self(U256::from(whole) * unit_scale())
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Parse a human decimal string ("10", "1.5", ".25") into base units
    pub fn parse_decimal(input: &str) -> StakeResult<Self> {
        let text = input.trim();
        if text.is_empty() {
            return Err(StakeError::invalid_amount(input, "empty"));
        }

        let (whole, fraction) = match text.split_once('.') {
            Some((w, f)) => (w, f),
            None => (text, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(StakeError::invalid_amount(input, "no digits"));
        }
        if text.ends_with('.') {
            return Err(StakeError::invalid_amount(input, "missing fractional digits"));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StakeError::invalid_amount(input, "not a decimal number"));
        }
        if fraction.len() > TOKEN_DECIMALS as usize {
            return Err(StakeError::invalid_amount(
                input,
                &format!("more than {} fractional digits", TOKEN_DECIMALS),
            ));
        }

        let whole_units = if whole.is_empty() {
            U256::zero()
        } else {
            U256::from_dec_str(whole).map_err(|_| StakeError::invalid_amount(input, "too large"))?
        };

        let fraction_units = if fraction.is_empty() {
            U256::zero()
        } else {
            let digits = U256::from_dec_str(fraction)
                .map_err(|_| StakeError::invalid_amount(input, "not a decimal number"))?;
            digits * U256::exp10(TOKEN_DECIMALS as usize - fraction.len())
        };

        whole_units
            .checked_mul(unit_scale())
            .and_then(|scaled| scaled.checked_add(fraction_units))
            .map(Self)
            .ok_or_else(|| StakeError::invalid_amount(input, "too large"))
    }

    /// Render base units as a human decimal string with trailing zeros trimmed
    pub fn to_decimal_string(&self) -> String {
        let scale = unit_scale();
        let whole = self.0 / scale;
        let fraction = self.0 % scale;

        if fraction.is_zero() {
            return whole.to_string();
        }

        let padded = format!("{:0>width$}", fraction.to_string(), width = TOKEN_DECIMALS as usize);
        format!("{}.{}", whole, padded.trim_end_matches('0'))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = StakeError;

    /// Parse a base-unit integer string
    fn from_str(s: &str) -> StakeResult<Self> {
        U256::from_dec_str(s.trim())
            .map(Self)
            .map_err(|_| StakeError::invalid_amount(s, "not a base-unit integer"))
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TokenAmount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_decimal_forms() {
        assert_eq!(TokenAmount::parse_decimal("10").unwrap(), TokenAmount::from_whole_tokens(10));
        assert_eq!(
            TokenAmount::parse_decimal("1.5").unwrap(),
            TokenAmount::from_u128(1_500_000_000_000_000_000)
        );
        assert_eq!(
            TokenAmount::parse_decimal(".25").unwrap(),
            TokenAmount::from_u128(250_000_000_000_000_000)
        );
        assert_eq!(
            TokenAmount::parse_decimal("0.000000000000000001").unwrap(),
            TokenAmount::from_u128(1)
        );
        assert_eq!(TokenAmount::parse_decimal(" 0 ").unwrap(), TokenAmount::ZERO);
    }

    #[test]
    fn test_parse_decimal_rejects_malformed() {
        for bad in ["", ".", "abc", "1.", "-1", "1e18", "1.2.3", "0.0000000000000000001", "NaN"] {
            assert!(TokenAmount::parse_decimal(bad).is_err(), "accepted {:?}", bad);
        }
        let too_big = format!("{}", U256::MAX);
        assert!(TokenAmount::parse_decimal(&too_big).is_err());
    }

    #[test]
    fn test_to_decimal_string() {
        assert_eq!(TokenAmount::ZERO.to_decimal_string(), "0");
        assert_eq!(TokenAmount::from_whole_tokens(10).to_decimal_string(), "10");
        assert_eq!(TokenAmount::from_u128(1_500_000_000_000_000_000).to_decimal_string(), "1.5");
        assert_eq!(TokenAmount::from_u128(1).to_decimal_string(), "0.000000000000000001");
        assert_eq!(
            TokenAmount::MAX.to_decimal_string(),
            "115792089237316195423570985008687907853269984665640564039457.584007913129639935"
        );
    }

    #[test]
    fn test_serde_uses_base_unit_strings() {
        let amount = TokenAmount::from_whole_tokens(3);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"3000000000000000000\"");
        assert_eq!(serde_json::from_str::<TokenAmount>(&json).unwrap(), amount);
    }

    proptest! {
        #[test]
        fn prop_decimal_round_trip_u128(raw in any::<u128>()) {
            let amount = TokenAmount::from_u128(raw);
            let text = amount.to_decimal_string();
            prop_assert_eq!(TokenAmount::parse_decimal(&text).unwrap(), amount);
        }

        #[test]
        fn prop_decimal_round_trip_u256(words in any::<[u64; 4]>()) {
            let amount = TokenAmount::from_base_units(U256(words));
            let text = amount.to_decimal_string();
            prop_assert_eq!(TokenAmount::parse_decimal(&text).unwrap(), amount);
        }
    }
}
