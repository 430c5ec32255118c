// 9.0: countdown reminders before the betting cutoff.
// the schedule owns which offsets already fired, per date. nothing here is shared engine state;
// whoever drives the ticks owns a ReminderSchedule and asks it what is due.

use crate::calendar::TradingCalendar;
use crate::types::GameDate;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Offsets in minutes before the cutoff, with the text each reminder leads with.
pub const DEFAULT_OFFSETS: [(i64, &str); 4] = [
    (180, "3 hours left"),
    (120, "2 hours left"),
    (60, "1 hour left"),
    (10, "10 minutes left"),
];

// a reminder fires if a tick lands inside this window after its scheduled time
const FIRE_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub date: GameDate,
    pub minutes_before: i64,
    pub label: String,
    pub cutoff: NaiveDateTime,
}

impl Reminder {
    pub fn message(&self, bets_so_far: usize) -> String {
        format!(
            "{}: bets close at {}. {} bets so far for {}.",
            self.label,
            self.cutoff.format("%H:%M"),
            bets_so_far,
            self.date
        )
    }
}

#[derive(Debug, Clone)]
pub struct ReminderSchedule {
    offsets: Vec<(i64, String)>,
    sent: HashMap<GameDate, BTreeSet<i64>>,
}

impl Default for ReminderSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_OFFSETS.iter().map(|(m, l)| (*m, l.to_string())).collect())
    }
}

impl ReminderSchedule {
    pub fn new(offsets: Vec<(i64, String)>) -> Self {
        Self {
            offsets,
            sent: HashMap::new(),
        }
    }

    /// Next cutoff a reminder can count down to: today's, or tomorrow's once today's has passed.
    pub fn target_cutoff(calendar: &TradingCalendar, now: NaiveDateTime) -> NaiveDateTime {
        let today = calendar.cutoff_at(now.date());
        if now > today {
            calendar.cutoff_at(now.date() + Duration::days(1))
        } else {
            today
        }
    }

    /// Reminders due at `now`. each (date, offset) fires at most once.
    pub fn due(&mut self, calendar: &TradingCalendar, now: NaiveDateTime) -> Vec<Reminder> {
        if TradingCalendar::is_weekend(now.date()) {
            return Vec::new();
        }
        let cutoff = Self::target_cutoff(calendar, now);
        let date = cutoff.date();
        if !calendar.is_trading_day(date) {
            return Vec::new();
        }

        let sent = self.sent.entry(date).or_default();
        let mut out = Vec::new();
        for (minutes, label) in &self.offsets {
            if sent.contains(minutes) {
                continue;
            }
            let at = cutoff - Duration::minutes(*minutes);
            if at <= now && now < at + Duration::seconds(FIRE_WINDOW_SECS) {
                sent.insert(*minutes);
                out.push(Reminder {
                    date,
                    minutes_before: *minutes,
                    label: label.clone(),
                    cutoff,
                });
            }
        }
        out
    }

    /// Forget bookkeeping for dates before `date`.
    pub fn prune_before(&mut self, date: GameDate) {
        self.sent.retain(|d, _| *d >= date);
    }

    pub fn tracked_dates(&self) -> usize {
        self.sent.len()
    }
}
