// 10.2: bet submission and the day's bet list.
// every gate runs inside the same IMMEDIATE transaction as the insert, so two
// submissions racing for one value cannot both pass the uniqueness check.

use super::core::SettlementEngine;
use crate::betting::{self, bet_views, BetError, BetView};
use crate::store::{self, StoreError};
use crate::types::{GameDate, ParticipantId, Prediction};
use rust_decimal::Decimal;
use tracing::{debug, info};

impl SettlementEngine {
    /// Record a prediction for today. bets never touch balances.
    pub fn place_bet(&self, participant_id: ParticipantId, display_name: &str, value: Decimal) -> Result<Prediction, BetError> {
        let now = self.clock.now();
        let today = now.date();

        let prediction = self.store.transaction(|tx| -> Result<Prediction, BetError> {
            betting::check_banned(store::ban_until(tx, participant_id)?, today)?;
            betting::check_name(display_name)?;
            betting::check_market_open(&self.calendar, now)?;
            // two decimals before any comparison; 1.5 and 1.50 are the same bet
            let value = betting::check_value(value)?;

            if store::has_prediction(tx, participant_id, today)? {
                return Err(BetError::AlreadyPlaced { date: today });
            }
            if store::value_taken(tx, value, today)? {
                return Err(BetError::ValueTaken { value, date: today });
            }

            let prediction = Prediction::new(participant_id, display_name.trim(), value, today);
            store::insert_prediction(tx, &prediction)?;
            Ok(prediction)
        });

        match &prediction {
            Ok(p) => info!(participant = %participant_id, value = %p.value, date = %today, "bet placed"),
            Err(e) => debug!(participant = %participant_id, error = %e, "bet rejected"),
        }
        prediction
    }

    /// The day's bets as participants see them: names only until the cutoff passes.
    pub fn bets_for(&self, date: GameDate) -> Result<Vec<BetView>, StoreError> {
        let predictions = self.store.predictions_for(date)?;
        let reveal = self.calendar.is_past_cutoff(date, self.clock.now());
        Ok(bet_views(&predictions, reveal))
    }

    pub fn todays_bets(&self) -> Result<Vec<BetView>, StoreError> {
        self.bets_for(self.today())
    }
}
