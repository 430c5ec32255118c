// 10.0.2: result types and errors for engine operations.

use crate::scoring::{ScoreKind, Scoreboard};
use crate::store::StoreError;
use crate::types::{GameDate, ParticipantId, Percent, Points};
use rust_decimal::Decimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonBettor {
    pub participant_id: ParticipantId,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotAward {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub amount: Points,
}

/// Everything one settlement decided. this is what gets cached per date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub date: GameDate,
    pub realized_change: Percent,
    pub scoreboard: Scoreboard,
    pub non_bettors: Vec<NonBettor>,
    pub non_bettor_penalty: Points,
    // what today's non-bettors added to the pot
    pub pot_accrued: Points,
    // pot of the week after today's accrual, before any payout
    pub pot_after_accrual: Points,
    pub pot_award: Option<PotAward>,
}

impl SettlementReport {
    /// Day total for a bettor, weekly pot included.
    pub fn total_for(&self, participant_id: ParticipantId) -> Option<Points> {
        let entry = self.scoreboard.entry(participant_id)?;
        let bonus = self
            .pot_award
            .as_ref()
            .filter(|a| a.participant_id == participant_id)
            .map(|a| a.amount)
            .unwrap_or_default();
        Some(entry.total().add(bonus))
    }

    /// Ledger delta per bettor, in rank order.
    pub fn bettor_deltas(&self) -> Vec<(ParticipantId, &str, Points)> {
        self.scoreboard
            .entries
            .iter()
            .map(|e| {
                let total = self.total_for(e.participant_id).unwrap_or_else(|| e.total());
                (e.participant_id, e.display_name.as_str(), total)
            })
            .collect()
    }

    /// Net change this settlement made to the sum of all balances.
    pub fn net_ledger_change(&self) -> Points {
        let bettors: Points = self.bettor_deltas().iter().map(|(_, _, d)| *d).sum();
        let penalties = Points::new(self.non_bettor_penalty.value() * Decimal::from(self.non_bettors.len()));
        bettors.sub(penalties)
    }
}

impl fmt::Display for SettlementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Settlement {}: realized change {}", self.date, self.realized_change)?;
        writeln!(f, "Weekly pot: {}", self.pot_after_accrual)?;

        if let ScoreKind::PerfectGuess { participant_id, variable_pool } = &self.scoreboard.kind {
            if let Some(entry) = self.scoreboard.entry(*participant_id) {
                writeln!(f, "Perfect guess by @{}: {} fixed + {} pool", entry.display_name, entry.fixed, variable_pool)?;
            }
        }

        for entry in &self.scoreboard.entries {
            writeln!(
                f,
                "  {:>2}. @{} {} (diff {:.2}) | fixed {}, variable {}, total {}",
                entry.rank,
                entry.display_name,
                entry.prediction,
                entry.diff,
                entry.fixed,
                entry.variable,
                entry.total()
            )?;
        }

        let standings: Vec<String> = self
            .scoreboard
            .by_total()
            .iter()
            .map(|e| format!("@{} {}", e.display_name, e.total()))
            .collect();
        writeln!(f, "By total: {}", standings.join(", "))?;

        if !self.non_bettors.is_empty() {
            let names: Vec<String> = self.non_bettors.iter().map(|n| format!("@{}", n.display_name)).collect();
            writeln!(f, "No bet, -{} each: {}", self.non_bettor_penalty, names.join(", "))?;
        }

        if let Some(award) = &self.pot_award {
            let day_total = self.total_for(award.participant_id).unwrap_or(award.amount);
            writeln!(
                f,
                "Weekly pot: @{} receives {} extra, day total {}",
                award.display_name, award.amount, day_total
            )?;
        }
        Ok(())
    }
}

/// Returned by a successful settle call, fresh or from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub report: SettlementReport,
    pub from_cache: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SettleError {
    #[error("market for {date} is still open, settle after {closes_at}")]
    MarketStillOpen { date: GameDate, closes_at: NaiveDateTime },

    #[error("market was closed on {date}")]
    MarketClosed { date: GameDate },

    #[error("no predictions for {date}")]
    NoPredictions { date: GameDate },

    #[error("realized change for {date} is not available yet")]
    OracleUnavailable { date: GameDate },

    #[error("ledger store failure: {0}")]
    Store(#[from] StoreError),
}

impl SettleError {
    /// Outcomes that left the ledger untouched and can simply be tried again later.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SettleError::Store(_))
    }
}
