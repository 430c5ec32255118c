//! Engine configuration options.

use crate::calendar::CalendarConfig;
use crate::scoring::ScoringParams;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed and variable prize schedule.
    pub scoring: ScoringParams,
    /// Trading days, betting window, market close, payout weekday.
    pub calendar: CalendarConfig,
    /// Charged to every known participant who skipped the day; funds the weekly pot.
    pub non_bettor_penalty: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringParams::default(),
            calendar: CalendarConfig::default(),
            non_bettor_penalty: dec!(10),
        }
    }
}
