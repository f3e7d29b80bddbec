//! Value Objects for the storefront

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Decimal places every displayed amount is rounded to.
const MONEY_DP: u32 = 2;

/// Non-negative shop price. All price arithmetic goes through here so the
/// rounding rule lives in one place.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    pub const ZERO: Price = Price(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() { return Err(PriceError::Negative(amount)); }
        Ok(Self(amount))
    }

    /// Whole currency units, e.g. `Price::units(1900)`.
    pub fn units(units: u32) -> Self { Self(Decimal::from(units)) }

    pub fn amount(&self) -> Decimal { self.0 }

    /// 2 decimal places, half away from zero.
    pub fn rounded(&self) -> Self {
        Self(self.0.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero))
    }

    /// `price - price * percent / 100`, rounded.
    pub fn less_percent(&self, percent: Percent) -> Self {
        let cut = self.0 * percent.value() / Decimal::ONE_HUNDRED;
        Self((self.0 - cut).max(Decimal::ZERO)).rounded()
    }

    pub fn add(&self, other: Price) -> Self { Self(self.0 + other.0) }
    pub fn multiply(&self, qty: Quantity) -> Self { Self(self.0 * Decimal::from(qty.value())) }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Price> for Decimal {
    fn from(p: Price) -> Self { p.0 }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.rounded().0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    #[error("price cannot be negative: {0}")]
    Negative(Decimal),
}

/// Discount percentage in `0..=100`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percent(Decimal);

impl Percent {
    pub fn new(value: Decimal) -> Result<Self, PercentError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED { return Err(PercentError::OutOfRange(value)); }
        Ok(Self(value))
    }
    pub fn value(&self) -> Decimal { self.0 }
}

impl TryFrom<Decimal> for Percent {
    type Error = PercentError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Percent> for Decimal {
    fn from(p: Percent) -> Self { p.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PercentError {
    #[error("percentage must be within 0..=100, got {0}")]
    OutOfRange(Decimal),
}

/// Variant colour swatch, `#rgb` or `#rrggbb`, stored lowercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(String);

impl HexColor {
    pub fn new(value: impl Into<String>) -> Result<Self, ColorError> {
        let value = value.into().trim().to_lowercase();
        let digits = value.strip_prefix('#').ok_or(ColorError::MissingHash)?;
        if !matches!(digits.len(), 3 | 6) || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorError::Malformed(value));
        }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for HexColor {
    type Error = ColorError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<HexColor> for String {
    fn from(c: HexColor) -> Self { c.0 }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    #[error("colour must start with '#'")]
    MissingHash,
    #[error("malformed colour {0}")]
    Malformed(String),
}

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0)) }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}
