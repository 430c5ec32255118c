// 10.0: settlement engine. coordinates bet intake, daily settlement, the
// weekly pot and bans over one ledger store.
// all writes go through store transactions; the clock and the oracle are injected.

mod admin;
mod bets;
mod config;
mod core;
mod results;
mod settle;

pub use config::EngineConfig;
pub use core::SettlementEngine;
pub use results::{NonBettor, PotAward, SettleError, Settlement, SettlementReport};
