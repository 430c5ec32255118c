// 10.0 engine/core.rs: the settlement engine. holds the store, the oracle, the clock and the calendar.

use super::config::EngineConfig;
use super::results::SettlementReport;
use crate::calendar::{Clock, TradingCalendar};
use crate::oracle::PriceOracle;
use crate::pot::WeeklyPot;
use crate::store::{self, BalanceRow, Store, StoreError};
use crate::types::{GameDate, ParticipantId, Points};
use std::sync::Arc;

/** 10.1: main engine struct. all state lives in the store; this only wires collaborators */
pub struct SettlementEngine {
    pub(super) config: EngineConfig,
    pub(super) calendar: TradingCalendar,
    pub(super) store: Arc<Store>,
    pub(super) oracle: Arc<dyn PriceOracle>,
    pub(super) clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SettlementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementEngine")
            .field("config", &self.config)
            .field("oracle", &self.oracle.name())
            .finish_non_exhaustive()
    }
}

impl SettlementEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<Store>,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let calendar = TradingCalendar::new(config.calendar.clone());
        Self {
            config,
            calendar,
            store,
            oracle,
            clock,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn today(&self) -> GameDate {
        self.clock.today()
    }

    // read-only: a participant with no row has a zero balance and stays unknown
    pub fn get_balance(&self, participant_id: ParticipantId) -> Result<Points, StoreError> {
        Ok(self.store.balance(participant_id)?.unwrap_or_default())
    }

    /// Balance as shown to its owner. the first view registers the participant at zero,
    /// which also makes them liable for non-bettor penalties from then on.
    pub fn view_balance(&self, participant_id: ParticipantId, display_name: &str) -> Result<Points, StoreError> {
        self.store.with_conn(|c| store::ensure_balance(c, participant_id, display_name))
    }

    pub fn get_leaderboard(&self) -> Result<Vec<BalanceRow>, StoreError> {
        self.store.leaderboard()
    }

    pub fn pot_for(&self, date: GameDate) -> Result<Points, StoreError> {
        self.store.with_conn(|c| WeeklyPot::new(c).peek(date))
    }

    pub fn current_pot(&self) -> Result<Points, StoreError> {
        self.pot_for(self.today())
    }

    pub fn prediction_count(&self, date: GameDate) -> Result<usize, StoreError> {
        self.store.prediction_count(date)
    }

    /// The cached outcome for `date`, if it was ever settled.
    pub fn settlement_report(&self, date: GameDate) -> Result<Option<SettlementReport>, StoreError> {
        self.store
            .settlement_result(date)?
            .map(|raw| decode_report(&raw))
            .transpose()
    }
}

pub(super) fn decode_report(raw: &str) -> Result<SettlementReport, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

pub(super) fn encode_report(report: &SettlementReport) -> Result<String, StoreError> {
    Ok(serde_json::to_string(report)?)
}
