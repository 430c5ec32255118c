// 1.0: all the primitives live here. participants, points, percentages, week keys.
// each is a newtype so the compiler catches a percentage handed over where points belong.

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub i64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settlement and betting key. Always a calendar date in market-local time.
pub type GameDate = NaiveDate;

// 1.1: every amount in the game has two decimals. half-even, same as the float
// rounding the balances were historically computed with.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

// 1.2: storage form. hundredths as a plain integer so SQL upserts stay exact.
// None when the amount does not fit a signed 64-bit column; never clamp.
pub fn to_cents(value: Decimal) -> Option<i64> {
    let mut scaled = round2(value);
    scaled.rescale(2);
    i64::try_from(scaled.mantissa()).ok()
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

// 1.3: Monday of the ISO week containing `date`. the only week key the pot uses.
pub fn week_start(date: GameDate) -> GameDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

// 1.4: virtual currency. balances, prizes, penalties, pot amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Points(Decimal);

impl Points {
    pub fn new(value: Decimal) -> Self {
        Self(round2(value))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(from_cents(cents))
    }

    pub fn cents(&self) -> Option<i64> {
        to_cents(self.0)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn add(&self, other: Points) -> Self {
        Self::new(self.0 + other.0)
    }

    pub fn sub(&self, other: Points) -> Self {
        Self::new(self.0 - other.0)
    }

    pub fn negate(&self) -> Self {
        Self(-self.0)
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl PartialOrd for Points {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Points {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Sum for Points {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, p| acc.add(p))
    }
}

impl<'a> Sum<&'a Points> for Points {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, p| acc.add(*p))
    }
}

// 1.5: signed percentage change, e.g. -3.27. predictions and realized moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Percent(Decimal);

impl Percent {
    pub fn new(value: Decimal) -> Self {
        Self(round2(value))
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(from_cents(cents))
    }

    pub fn cents(&self) -> Option<i64> {
        to_cents(self.0)
    }

    /// True when the value survives the round trip through integer hundredths.
    pub fn is_storable(&self) -> bool {
        self.cents().is_some()
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Rounded absolute error against a realized move.
    pub fn distance(&self, realized: Percent) -> Decimal {
        round2((self.0 - realized.0).abs())
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

// 1.6: one participant's guess for one date. immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub value: Percent,
    pub date: GameDate,
}

impl Prediction {
    pub fn new(participant_id: ParticipantId, display_name: impl Into<String>, value: Percent, date: GameDate) -> Self {
        Self {
            participant_id,
            display_name: display_name.into(),
            value,
            date,
        }
    }
}
