// 7.0: bet submission rules. what a prediction has to pass before it is recorded.
// 7.1 the error taxonomy, 7.2 the pure gate checks, 7.3 how the day's bets are shown.
// the engine runs these inside one transaction together with the insert (engine/bets.rs).

use crate::bans::is_active;
use crate::calendar::TradingCalendar;
use crate::store::StoreError;
use crate::types::{GameDate, Percent, Prediction};
use chrono::{NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// 7.1
#[derive(Debug, thiserror::Error)]
pub enum BetError {
    #[error("participant is banned until {until}")]
    Banned { until: GameDate },

    #[error("a display name is required to bet")]
    MissingName,

    #[error("market is closed on {date}, bets reopen on {reopens}")]
    MarketClosed { date: GameDate, reopens: GameDate },

    #[error("bets are accepted between {opens} and {closes}")]
    OutsideWindow { opens: NaiveTime, closes: NaiveTime },

    #[error("a bet for {date} was already placed and cannot be changed")]
    AlreadyPlaced { date: GameDate },

    #[error("value {value} is outside the range a prediction can hold")]
    ValueOutOfRange { value: Decimal },

    #[error("value {value} is already taken for {date}")]
    ValueTaken { value: Percent, date: GameDate },

    #[error("ledger store failure: {0}")]
    Store(#[from] StoreError),
}

// 7.2: checks that need no storage, in the order they are reported.
pub fn check_banned(ban_until: Option<GameDate>, today: GameDate) -> Result<(), BetError> {
    match ban_until {
        Some(until) if is_active(until, today) => Err(BetError::Banned { until }),
        _ => Ok(()),
    }
}

pub fn check_name(display_name: &str) -> Result<(), BetError> {
    if display_name.trim().is_empty() {
        return Err(BetError::MissingName);
    }
    Ok(())
}

pub fn check_market_open(calendar: &TradingCalendar, now: NaiveDateTime) -> Result<(), BetError> {
    let today = now.date();
    if !calendar.is_trading_day(today) {
        return Err(BetError::MarketClosed {
            date: today,
            reopens: calendar.next_trading_day(today),
        });
    }
    if !calendar.betting_open(now) {
        let cfg = calendar.config();
        return Err(BetError::OutsideWindow {
            opens: cfg.window_open,
            closes: cfg.cutoff,
        });
    }
    Ok(())
}

/// The submitted value, rounded, if it can be stored as integer hundredths.
pub fn check_value(raw: Decimal) -> Result<Percent, BetError> {
    let value = Percent::new(raw);
    if !value.is_storable() {
        return Err(BetError::ValueOutOfRange { value: raw });
    }
    Ok(value)
}

// 7.3: one line of the day's bet list. values stay hidden until the cutoff passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetView {
    pub display_name: String,
    pub value: Option<Percent>,
}

/// Before cutoff: names only, submission order. after: values shown, sorted ascending.
pub fn bet_views(predictions: &[Prediction], reveal: bool) -> Vec<BetView> {
    let mut views: Vec<BetView> = predictions
        .iter()
        .map(|p| BetView {
            display_name: p.display_name.clone(),
            value: reveal.then_some(p.value),
        })
        .collect();
    if reveal {
        views.sort_by(|a, b| a.value.cmp(&b.value));
    }
    views
}
