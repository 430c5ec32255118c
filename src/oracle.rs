// Price Oracle
//
// Settlement needs exactly one number from the outside world: the realized
// percentage change of the tracked stock on a given date. This module defines
// that seam. Any quote vendor can sit behind it as long as it answers with a
// value or "not yet", and never fails loudly in the middle of a settlement.

use crate::types::{GameDate, Percent};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Source of the realized daily change.
///
/// Implementations must be side-effect free from the engine's point of view and
/// must report transient problems (network, data not published yet) as `None`.
pub trait PriceOracle: Send + Sync {
    /// Realized percentage change for `date`, rounded to two decimals.
    fn get_change(&self, date: GameDate) -> Option<Percent>;

    /// Human readable name for logs
    fn name(&self) -> &str;
}

/// A quote as most vendors publish it: latest price and previous close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub current: Decimal,
    pub previous_close: Decimal,
}

impl QuoteSnapshot {
    pub fn new(current: Decimal, previous_close: Decimal) -> Self {
        Self { current, previous_close }
    }

    pub fn change(&self) -> Option<Percent> {
        percent_change(self.previous_close, self.current)
    }
}

/// `(current - previous) / previous * 100`, rounded. `None` when the base is not positive.
pub fn percent_change(previous: Decimal, current: Decimal) -> Option<Percent> {
    if previous <= Decimal::ZERO {
        return None;
    }
    let change = (current - previous) / previous * Decimal::ONE_HUNDRED;
    Some(Percent::new(change))
}

/// Oracle backed by values pushed in by an operator or a test.
#[derive(Debug, Default)]
pub struct StaticOracle {
    changes: RwLock<HashMap<GameDate, Percent>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_change(self, date: GameDate, change: Percent) -> Self {
        self.set_change(date, change);
        self
    }

    pub fn set_change(&self, date: GameDate, change: Percent) {
        self.changes.write().insert(date, change);
    }

    /// Record the change implied by a quote. Ignored if the quote is unusable.
    pub fn set_quote(&self, date: GameDate, quote: QuoteSnapshot) -> bool {
        match quote.change() {
            Some(change) => {
                self.set_change(date, change);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self, date: GameDate) {
        self.changes.write().remove(&date);
    }
}

impl PriceOracle for StaticOracle {
    fn get_change(&self, date: GameDate) -> Option<Percent> {
        self.changes.read().get(&date).copied()
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Oracle that never has data. Settlements through it stay retryable.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableOracle;

impl PriceOracle for UnavailableOracle {
    fn get_change(&self, _date: GameDate) -> Option<Percent> {
        None
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

impl<T: PriceOracle + ?Sized> PriceOracle for std::sync::Arc<T> {
    fn get_change(&self, date: GameDate) -> Option<Percent> {
        (**self).get_change(date)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
