//! Daily settlement.
//!
//! `settle` is the only path that mutates balances. Preconditions and the cache
//! are checked first without taking the write lock; the oracle is asked
//! outside any lock; everything that writes (non-bettor penalties, pot accrual
//! and payout, bettor deltas, the cache row) happens in one IMMEDIATE
//! transaction that re-checks the cache before touching anything.

use super::core::{decode_report, encode_report, SettlementEngine};
use super::results::{NonBettor, PotAward, SettleError, Settlement, SettlementReport};
use crate::pot::WeeklyPot;
use crate::scoring;
use crate::store;
use crate::types::{GameDate, ParticipantId, Percent, Points, Prediction};
use rust_decimal::Decimal;
use rusqlite::Connection;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

impl SettlementEngine {
    /// Settle `date`. Once a date has a cached result every later call returns it verbatim.
    pub fn settle(&self, date: GameDate, retroactive: bool) -> Result<Settlement, SettleError> {
        if !retroactive {
            let now = self.clock.now();
            if !self.calendar.has_market_closed(date, now) {
                let closes_at = self.calendar.market_close_at(date);
                debug!(%date, %closes_at, "settle refused, market still open");
                return Err(SettleError::MarketStillOpen { date, closes_at });
            }
        }

        if !self.calendar.is_trading_day(date) {
            debug!(%date, "settle refused, non-trading day");
            return Err(SettleError::MarketClosed { date });
        }

        if let Some(report) = self.settlement_report(date)? {
            info!(%date, "settlement served from cache");
            return Ok(Settlement {
                report,
                from_cache: true,
            });
        }

        if self.store.prediction_count(date)? == 0 {
            return Err(SettleError::NoPredictions { date });
        }

        let Some(realized) = self.oracle.get_change(date) else {
            warn!(%date, oracle = self.oracle.name(), "realized change unavailable");
            return Err(SettleError::OracleUnavailable { date });
        };

        let settlement = match self.store.transaction(|tx| self.settle_in_tx(tx, date, realized)) {
            Ok(settlement) => settlement,
            Err(e) => {
                if let SettleError::Store(inner) = &e {
                    error!(%date, error = %inner, "settlement rolled back");
                }
                return Err(e);
            }
        };

        if !settlement.from_cache {
            let report = &settlement.report;
            info!(
                %date,
                realized = %report.realized_change,
                bettors = report.scoreboard.entries.len(),
                non_bettors = report.non_bettors.len(),
                perfect_guess = report.scoreboard.is_perfect_guess(),
                pot_award = ?report.pot_award.as_ref().map(|a| a.amount),
                "settlement committed"
            );
        }
        Ok(settlement)
    }

    fn settle_in_tx(&self, tx: &Connection, date: GameDate, realized: Percent) -> Result<Settlement, SettleError> {
        // another caller may have won the race while we were asking the oracle
        if let Some(raw) = store::settlement_result(tx, date)? {
            info!(%date, "settlement completed concurrently, returning cached result");
            return Ok(Settlement {
                report: decode_report(&raw)?,
                from_cache: true,
            });
        }

        let predictions = store::predictions_for(tx, date)?;
        if predictions.is_empty() {
            return Err(SettleError::NoPredictions { date });
        }
        let scoreboard = scoring::score(&predictions, realized, &self.config.scoring);

        let non_bettor_penalty = Points::new(self.config.non_bettor_penalty);
        let non_bettors = self.charge_non_bettors(tx, &bettor_ids(&predictions), non_bettor_penalty)?;

        let pot = WeeklyPot::new(tx);
        let pot_accrued = Points::new(non_bettor_penalty.value() * Decimal::from(non_bettors.len()));
        pot.accrue(date, pot_accrued)?;
        let pot_after_accrual = pot.peek(date)?;

        let mut pot_award = None;
        if self.calendar.is_payout_day(date) && pot_after_accrual.is_positive() {
            if let Some(winner) = scoreboard.winner() {
                let amount = pot.drain(date)?;
                pot_award = Some(PotAward {
                    participant_id: winner.participant_id,
                    display_name: winner.display_name.clone(),
                    amount,
                });
            }
        }

        let report = SettlementReport {
            date,
            realized_change: realized,
            scoreboard,
            non_bettors,
            non_bettor_penalty,
            pot_accrued,
            pot_after_accrual,
            pot_award,
        };

        for (participant_id, display_name, delta) in report.bettor_deltas() {
            store::apply_delta(tx, participant_id, display_name, delta)?;
        }

        store::insert_settlement_result(tx, date, &encode_report(&report)?)?;

        Ok(Settlement {
            report,
            from_cache: false,
        })
    }

    // every balance row without a prediction today pays the flat penalty
    fn charge_non_bettors(
        &self,
        tx: &Connection,
        bettors: &HashSet<ParticipantId>,
        penalty: Points,
    ) -> Result<Vec<NonBettor>, SettleError> {
        let mut charged = Vec::new();
        for (participant_id, display_name) in store::known_participants(tx)? {
            if bettors.contains(&participant_id) {
                continue;
            }
            store::adjust_existing(tx, participant_id, penalty.negate())?;
            charged.push(NonBettor {
                participant_id,
                display_name,
            });
        }
        if !charged.is_empty() {
            debug!(count = charged.len(), penalty = %penalty, "non-bettors charged");
        }
        Ok(charged)
    }
}

fn bettor_ids(predictions: &[Prediction]) -> HashSet<ParticipantId> {
    predictions.iter().map(|p| p.participant_id).collect()
}
