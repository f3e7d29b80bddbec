//! Discount Rule Aggregate
//!
//! A percentage-off promotion for every price inside an inclusive band,
//! valid between two instants (both inclusive).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{Percent, Price};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDiscountRule")]
pub struct DiscountRule {
    id: Uuid,
    min_price: Price,
    max_price: Price,
    discount: Percent,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

impl DiscountRule {
    pub fn new(
        min_price: Price, max_price: Price, discount: Percent,
        start_date: DateTime<Utc>, end_date: DateTime<Utc>,
    ) -> Result<Self, DiscountRuleError> {
        Self::restore(Uuid::new_v4(), min_price, max_price, discount, start_date, end_date)
    }

    /// Rebuilds a stored rule, re-checking its invariants.
    pub fn restore(
        id: Uuid, min_price: Price, max_price: Price, discount: Percent,
        start_date: DateTime<Utc>, end_date: DateTime<Utc>,
    ) -> Result<Self, DiscountRuleError> {
        if min_price > max_price { return Err(DiscountRuleError::InvertedBand { min: min_price, max: max_price }); }
        if start_date >= end_date { return Err(DiscountRuleError::EmptyWindow { start: start_date, end: end_date }); }
        Ok(Self { id, min_price, max_price, discount, start_date, end_date })
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn min_price(&self) -> Price { self.min_price }
    pub fn max_price(&self) -> Price { self.max_price }
    pub fn discount(&self) -> Percent { self.discount }
    pub fn start_date(&self) -> DateTime<Utc> { self.start_date }
    pub fn end_date(&self) -> DateTime<Utc> { self.end_date }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool { self.start_date <= now && now <= self.end_date }
    pub fn covers(&self, price: Price) -> bool { self.min_price <= price && price <= self.max_price }
}

#[derive(Deserialize)]
struct RawDiscountRule {
    id: Uuid,
    min_price: Price,
    max_price: Price,
    discount: Percent,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

impl TryFrom<RawDiscountRule> for DiscountRule {
    type Error = DiscountRuleError;
    fn try_from(r: RawDiscountRule) -> Result<Self, Self::Error> {
        Self::restore(r.id, r.min_price, r.max_price, r.discount, r.start_date, r.end_date)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiscountRuleError {
    #[error("min price {min} exceeds max price {max}")]
    InvertedBand { min: Price, max: Price },
    #[error("start date {start} is not before end date {end}")]
    EmptyWindow { start: DateTime<Utc>, end: DateTime<Utc> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    fn ten() -> Percent { Percent::new(Decimal::new(10, 0)).unwrap() }

    #[test]
    fn test_rule_invariants() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(7);
        assert!(matches!(
            DiscountRule::new(Price::units(200), Price::units(100), ten(), start, end),
            Err(DiscountRuleError::InvertedBand { .. })
        ));
        assert!(matches!(
            DiscountRule::new(Price::units(100), Price::units(200), ten(), end, start),
            Err(DiscountRuleError::EmptyWindow { .. })
        ));
        assert!(DiscountRule::new(Price::units(100), Price::units(100), ten(), start, end).is_ok());
    }

    #[test]
    fn test_window_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(1);
        let rule = DiscountRule::new(Price::units(0), Price::units(10), ten(), start, end).unwrap();
        assert!(rule.is_active_at(start));
        assert!(rule.is_active_at(end));
        assert!(!rule.is_active_at(end + Duration::seconds(1)));
        assert!(!rule.is_active_at(start - Duration::seconds(1)));
    }

    #[test]
    fn test_deserialize_checks_invariants() {
        let json = serde_json::json!({
            "id": Uuid::nil(), "min_price": "500", "max_price": "100", "discount": "5",
            "start_date": "2026-01-01T00:00:00Z", "end_date": "2026-02-01T00:00:00Z",
        });
        assert!(serde_json::from_value::<DiscountRule>(json).is_err());
    }
}
