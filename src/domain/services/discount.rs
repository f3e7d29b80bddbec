//! Discount resolution
//!
//! Given a price and an instant, finds the first rule whose window contains
//! the instant and whose band contains the price. Rules have no priority
//! field; storage order decides when bands overlap.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::DiscountRule;
use crate::domain::value_objects::{Percent, Price};
use crate::store::DiscountRuleStore;
use crate::Clock;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiscountQuote {
    pub rule_id: Uuid,
    pub discount_percent: Percent,
    pub original_price: Price,
    pub final_price: Price,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl DiscountQuote {
    /// Time left until the rule expires, zero once it has.
    pub fn remaining(&self, now: DateTime<Utc>) -> Countdown {
        Countdown::from_seconds((self.end_date - now).num_seconds())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Countdown { pub days: i64, pub hours: i64, pub minutes: i64, pub seconds: i64 }

impl Countdown {
    fn from_seconds(total: i64) -> Self {
        let total = total.max(0);
        Self { days: total / 86_400, hours: total % 86_400 / 3_600, minutes: total % 3_600 / 60, seconds: total % 60 }
    }

    pub fn is_over(&self) -> bool { *self == Self::default() }
}

/// Pure. `None` means no discount, never an error.
pub fn resolve_discount(price: Price, now: DateTime<Utc>, rules: &[DiscountRule]) -> Option<DiscountQuote> {
    let rule = rules.iter().filter(|r| r.is_active_at(now)).find(|r| r.covers(price))?;
    Some(DiscountQuote {
        rule_id: rule.id(),
        discount_percent: rule.discount(),
        original_price: price,
        final_price: price.less_percent(rule.discount()),
        start_date: rule.start_date(),
        end_date: rule.end_date(),
    })
}

/// Loads rules for callers that price many items at one instant.
#[derive(Clone)]
pub struct DiscountService {
    rules: Arc<dyn DiscountRuleStore>,
    clock: Arc<dyn Clock>,
}

impl DiscountService {
    pub fn new(rules: Arc<dyn DiscountRuleStore>, clock: Arc<dyn Clock>) -> Self { Self { rules, clock } }

    pub fn now(&self) -> DateTime<Utc> { self.clock.now() }

    /// A rule store that cannot be read means no promotions, not a failure.
    pub async fn rules(&self) -> Vec<DiscountRule> {
        match self.rules.all().await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!(error = %e, "discount rules unavailable, pricing without discounts");
                vec![]
            }
        }
    }

    pub async fn quote(&self, price: Price) -> Option<DiscountQuote> {
        let rules = self.rules().await;
        resolve_discount(price, self.now(), &rules)
    }
}
