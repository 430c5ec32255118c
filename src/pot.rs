// 6.0: weekly pot. non-bettor penalties accumulate per ISO week and are paid out whole.
// rows are keyed by the Monday of the week; callers pass any date and the key is derived here,
// so nobody can fragment the pot with a differently computed week start.

use crate::store::{date_key, points_cents, StoreError};
use crate::types::{week_start, GameDate, Points};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

/// Pot accessors bound to a connection or an open transaction.
pub struct WeeklyPot<'c> {
    conn: &'c Connection,
}

impl<'c> WeeklyPot<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Additive upsert into the week containing `date`. Non-positive amounts are ignored.
    pub fn accrue(&self, date: GameDate, amount: Points) -> Result<(), StoreError> {
        if !amount.is_positive() {
            return Ok(());
        }
        let week = week_start(date);
        self.conn.execute(
            "INSERT INTO weekly_pot (week_start, amount_cents) VALUES (?1, ?2)
             ON CONFLICT(week_start) DO UPDATE SET amount_cents = amount_cents + excluded.amount_cents",
            params![date_key(week), points_cents("amount_cents", amount)?],
        )?;
        debug!(week = %week, amount = %amount, "pot accrued");
        Ok(())
    }

    /// Current amount for the week containing `date`; zero when there is no row.
    pub fn peek(&self, date: GameDate) -> Result<Points, StoreError> {
        let cents: Option<i64> = self
            .conn
            .query_row(
                "SELECT amount_cents FROM weekly_pot WHERE week_start = ?1",
                params![date_key(week_start(date))],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cents.map(Points::from_cents).unwrap_or_default())
    }

    /// Delete the week's row and return what it held.
    pub fn drain(&self, date: GameDate) -> Result<Points, StoreError> {
        let amount = self.peek(date)?;
        let week = week_start(date);
        self.conn
            .execute("DELETE FROM weekly_pot WHERE week_start = ?1", params![date_key(week)])?;
        info!(week = %week, amount = %amount, "pot drained");
        Ok(amount)
    }

    pub fn has_row(&self, date: GameDate) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM weekly_pot WHERE week_start = ?1",
                params![date_key(week_start(date))],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
