// predictor-core: daily price-change prediction game.
// settlement-first architecture: scoring and the ledger take priority.
// scoring is pure; every balance change happens inside one store transaction per date.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ParticipantId, Points, Percent, Prediction
//   2.x  calendar.rs: trading days, betting window, market close, clocks
//   3.x  scoring.rs: accuracy ranking, fixed and variable prizes, perfect guess
//   4.x  oracle.rs: realized-change seam (static and unavailable impls)
//   5.x  store.rs: sqlite ledger: predictions, balances, results, bans, pot
//   6.x  pot.rs: weekly pot accrual and payout
//   7.x  betting.rs: bet submission rules and the day's bet list
//   8.x  bans.rs: ban windows and name normalization
//   9.x  reminders.rs: countdown reminders before the cutoff
//   10.x engine/: settlement engine: settle, bets, bans, queries
//   11.x config.rs: process settings, env loading, validation

// game core
pub mod calendar;
pub mod engine;
pub mod scoring;
pub mod types;

// ledger
pub mod pot;
pub mod store;

// participant-facing rules
pub mod bans;
pub mod betting;
pub mod reminders;

// integration
pub mod config;
pub mod oracle;

// re exports for convenience
pub use bans::{ActiveBan, BanError};
pub use betting::{BetError, BetView};
pub use calendar::{CalendarConfig, Clock, ManualClock, SystemClock, TradingCalendar};
pub use config::{AppConfig, ConfigError};
pub use engine::*;
pub use oracle::{PriceOracle, QuoteSnapshot, StaticOracle, UnavailableOracle};
pub use reminders::{Reminder, ReminderSchedule};
pub use scoring::{score, ScoreKind, ScoredEntry, Scoreboard, ScoringParams};
pub use store::{BalanceRow, BanRecord, Store, StoreError};
pub use types::*;
