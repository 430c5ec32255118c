// 2.0: trading calendar and market clock.
// 2.1 decides which dates trade, 2.2 the betting window and market close, 2.3 the clocks.
// everything is expressed in market-local naive time; the clock owns the timezone.

use crate::types::GameDate;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    // first moment a bet is accepted on a trading day
    pub window_open: NaiveTime,
    // last moment a bet is accepted; reminders count down to this
    pub cutoff: NaiveTime,
    // realized change is final after this time
    pub market_close: NaiveTime,
    // weekday on which the weekly pot is paid out
    pub payout_weekday: Weekday,
    // exchange holidays on top of weekends
    pub holidays: BTreeSet<NaiveDate>,
    // zone the window, cutoff and close are read in. DST follows the zone
    pub timezone: Tz,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            window_open: NaiveTime::from_hms_opt(0, 0, 0).unwrap_or(NaiveTime::MIN),
            cutoff: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
            market_close: NaiveTime::from_hms_opt(22, 10, 0).unwrap_or(NaiveTime::MIN),
            payout_weekday: Weekday::Fri,
            holidays: default_holidays(),
            timezone: chrono_tz::Europe::Rome,
        }
    }
}

/// US exchange closures for 2025 and 2026. later years come from configuration.
pub fn default_holidays() -> BTreeSet<NaiveDate> {
    [
        (2025, 1, 1),
        (2025, 4, 18),
        (2025, 5, 26),
        (2025, 6, 19),
        (2025, 7, 4),
        (2025, 9, 1),
        (2025, 11, 27),
        (2025, 12, 25),
        (2025, 12, 26),
        (2026, 1, 1),
        (2026, 1, 19),
        (2026, 2, 16),
        (2026, 4, 3),
        (2026, 5, 25),
        (2026, 6, 19),
        (2026, 7, 3),
        (2026, 9, 7),
        (2026, 11, 26),
        (2026, 12, 25),
    ]
    .into_iter()
    .filter_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
    .collect()
}

#[derive(Debug, Clone)]
pub struct TradingCalendar {
    config: CalendarConfig,
}

impl TradingCalendar {
    pub fn new(config: CalendarConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    pub fn is_holiday(&self, date: GameDate) -> bool {
        self.config.holidays.contains(&date)
    }

    pub fn is_weekend(date: GameDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    // 2.1: weekends and listed holidays don't trade
    pub fn is_trading_day(&self, date: GameDate) -> bool {
        !Self::is_weekend(date) && !self.is_holiday(date)
    }

    pub fn is_payout_day(&self, date: GameDate) -> bool {
        date.weekday() == self.config.payout_weekday && self.is_trading_day(date)
    }

    // first trading day on or after `date`
    pub fn next_trading_day(&self, date: GameDate) -> GameDate {
        let mut day = date;
        while !self.is_trading_day(day) {
            day += Duration::days(1);
        }
        day
    }

    // 2.2: betting window is inclusive on both ends
    pub fn betting_open(&self, now: NaiveDateTime) -> bool {
        let t = now.time();
        self.config.window_open <= t && t <= self.config.cutoff
    }

    pub fn cutoff_at(&self, date: GameDate) -> NaiveDateTime {
        date.and_time(self.config.cutoff)
    }

    // values are public from the cutoff instant on, the same instant the last bet is taken
    pub fn is_past_cutoff(&self, date: GameDate, now: NaiveDateTime) -> bool {
        now >= self.cutoff_at(date)
    }

    pub fn market_close_at(&self, date: GameDate) -> NaiveDateTime {
        date.and_time(self.config.market_close)
    }

    pub fn has_market_closed(&self, date: GameDate, now: NaiveDateTime) -> bool {
        now >= self.market_close_at(date)
    }
}

// 2.3: where "now" comes from. the engine never reads the system time directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> GameDate {
        self.now().date()
    }
}

/// Wall clock read in the market's timezone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    timezone: Tz,
}

impl SystemClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Market-local wall time of a UTC instant, with the zone's offset on that date.
    pub fn local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.timezone).naive_local()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        self.local(Utc::now())
    }
}

/// Settable clock for simulations and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}
