//! Ledger store.
//!
//! One SQLite database holds the five tables the game needs: predictions,
//! balances, cached settlement results, bans and the weekly pot. Amounts are
//! INTEGER hundredths so additive upserts stay exact; dates are `YYYY-MM-DD`.
//!
//! Every accessor is a free function over `&Connection` so the same code runs
//! against the shared connection or inside an open settlement transaction.

use crate::types::{GameDate, ParticipantId, Percent, Points, Prediction};
use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS predictions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    participant_id INTEGER NOT NULL,
    display_name TEXT NOT NULL,
    value_cents INTEGER NOT NULL,
    date TEXT NOT NULL,
    UNIQUE(participant_id, date),
    UNIQUE(date, value_cents)
);

CREATE TABLE IF NOT EXISTS balances (
    participant_id INTEGER PRIMARY KEY,
    display_name TEXT NOT NULL,
    balance_cents INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS settlement_results (
    date TEXT PRIMARY KEY,
    outcome_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bans (
    participant_id INTEGER PRIMARY KEY,
    ban_until TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS weekly_pot (
    week_start TEXT PRIMARY KEY,
    amount_cents INTEGER NOT NULL DEFAULT 0 CHECK (amount_cents >= 0)
);

CREATE INDEX IF NOT EXISTS idx_predictions_date ON predictions(date, seq);
"#;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("outcome encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt {table} row: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("{column} value {value} does not fit in integer hundredths")]
    OutOfRange { column: &'static str, value: String },
}

impl StoreError {
    /// True when a UNIQUE / CHECK / PRIMARY KEY constraint rejected the write.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRow {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub balance: Points,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub participant_id: ParticipantId,
    pub ban_until: GameDate,
}

/// Owns the single connection. Opened once at startup, closed on drop.
pub struct Store {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;

        let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            warn!(journal_mode = %journal_mode, "WAL mode not active");
        }
        conn.busy_timeout(Duration::from_secs(5))?;

        let store = Self::init(conn)?;
        info!(path = %path.display(), "ledger store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` against the shared connection outside any transaction.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` in an IMMEDIATE transaction. Commits on `Ok`, rolls back on `Err`.
    /// The connection stays locked for the whole closure, so writers are serialized.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    pub fn insert_prediction(&self, prediction: &Prediction) -> Result<(), StoreError> {
        self.with_conn(|c| insert_prediction(c, prediction))
    }

    pub fn predictions_for(&self, date: GameDate) -> Result<Vec<Prediction>, StoreError> {
        self.with_conn(|c| predictions_for(c, date))
    }

    pub fn prediction_count(&self, date: GameDate) -> Result<usize, StoreError> {
        self.with_conn(|c| prediction_count(c, date))
    }

    pub fn balance(&self, participant_id: ParticipantId) -> Result<Option<Points>, StoreError> {
        self.with_conn(|c| balance(c, participant_id))
    }

    pub fn leaderboard(&self) -> Result<Vec<BalanceRow>, StoreError> {
        self.with_conn(leaderboard)
    }

    pub fn settlement_result(&self, date: GameDate) -> Result<Option<String>, StoreError> {
        self.with_conn(|c| settlement_result(c, date))
    }
}

pub fn date_key(date: GameDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(table: &'static str, raw: &str) -> Result<GameDate, StoreError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| StoreError::Corrupt {
        table,
        detail: format!("bad date {raw:?}: {e}"),
    })
}

// integer hundredths for the *_cents columns. refuse, never clamp.
pub fn percent_cents(column: &'static str, value: Percent) -> Result<i64, StoreError> {
    value.cents().ok_or_else(|| StoreError::OutOfRange {
        column,
        value: value.to_string(),
    })
}

pub fn points_cents(column: &'static str, amount: Points) -> Result<i64, StoreError> {
    amount.cents().ok_or_else(|| StoreError::OutOfRange {
        column,
        value: amount.to_string(),
    })
}

// predictions

pub fn insert_prediction(conn: &Connection, prediction: &Prediction) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO predictions (participant_id, display_name, value_cents, date) VALUES (?1, ?2, ?3, ?4)",
        params![
            prediction.participant_id.0,
            prediction.display_name,
            percent_cents("value_cents", prediction.value)?,
            date_key(prediction.date),
        ],
    )?;
    debug!(participant = %prediction.participant_id, date = %prediction.date, "prediction stored");
    Ok(())
}

/// Predictions for `date` in submission order.
pub fn predictions_for(conn: &Connection, date: GameDate) -> Result<Vec<Prediction>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT participant_id, display_name, value_cents FROM predictions WHERE date = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map(params![date_key(date)], |row| {
        Ok(Prediction {
            participant_id: ParticipantId(row.get(0)?),
            display_name: row.get(1)?,
            value: Percent::from_cents(row.get(2)?),
            date,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn prediction_count(conn: &Connection, date: GameDate) -> Result<usize, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM predictions WHERE date = ?1",
        params![date_key(date)],
        |row| row.get(0),
    )?;
    Ok(usize::try_from(count).unwrap_or(0))
}

pub fn has_prediction(conn: &Connection, participant_id: ParticipantId, date: GameDate) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM predictions WHERE participant_id = ?1 AND date = ?2",
            params![participant_id.0, date_key(date)],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn value_taken(conn: &Connection, value: Percent, date: GameDate) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM predictions WHERE value_cents = ?1 AND date = ?2",
            params![percent_cents("value_cents", value)?, date_key(date)],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

// balances

pub fn balance(conn: &Connection, participant_id: ParticipantId) -> Result<Option<Points>, StoreError> {
    let cents: Option<i64> = conn
        .query_row(
            "SELECT balance_cents FROM balances WHERE participant_id = ?1",
            params![participant_id.0],
            |row| row.get(0),
        )
        .optional()?;
    Ok(cents.map(Points::from_cents))
}

/// Create the row at zero if missing, refresh the display name, return the balance.
pub fn ensure_balance(conn: &Connection, participant_id: ParticipantId, display_name: &str) -> Result<Points, StoreError> {
    conn.execute(
        "INSERT INTO balances (participant_id, display_name, balance_cents) VALUES (?1, ?2, 0)
         ON CONFLICT(participant_id) DO UPDATE SET display_name = excluded.display_name",
        params![participant_id.0, display_name],
    )?;
    Ok(balance(conn, participant_id)?.unwrap_or_default())
}

/// Additive upsert. Missing rows start at zero; the display name always follows the latest touch.
pub fn apply_delta(conn: &Connection, participant_id: ParticipantId, display_name: &str, delta: Points) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO balances (participant_id, display_name, balance_cents) VALUES (?1, ?2, ?3)
         ON CONFLICT(participant_id) DO UPDATE SET
             balance_cents = balance_cents + excluded.balance_cents,
             display_name = excluded.display_name",
        params![participant_id.0, display_name, points_cents("balance_cents", delta)?],
    )?;
    Ok(())
}

/// Delta for a participant who already has a row. Leaves the display name alone.
pub fn adjust_existing(conn: &Connection, participant_id: ParticipantId, delta: Points) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE balances SET balance_cents = balance_cents + ?2 WHERE participant_id = ?1",
        params![participant_id.0, points_cents("balance_cents", delta)?],
    )?;
    Ok(changed > 0)
}

/// Everyone who ever got a balance row, ordered by id.
pub fn known_participants(conn: &Connection) -> Result<Vec<(ParticipantId, String)>, StoreError> {
    let mut stmt = conn.prepare_cached("SELECT participant_id, display_name FROM balances ORDER BY participant_id ASC")?;
    let rows = stmt.query_map([], |row| Ok((ParticipantId(row.get(0)?), row.get::<_, String>(1)?)))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn participant_by_name(conn: &Connection, display_name: &str) -> Result<Option<ParticipantId>, StoreError> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT participant_id FROM balances WHERE display_name = ?1 ORDER BY participant_id ASC LIMIT 1",
            params![display_name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id.map(ParticipantId))
}

pub fn display_name(conn: &Connection, participant_id: ParticipantId) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT display_name FROM balances WHERE participant_id = ?1",
            params![participant_id.0],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn leaderboard(conn: &Connection) -> Result<Vec<BalanceRow>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT participant_id, display_name, balance_cents FROM balances
         ORDER BY balance_cents DESC, participant_id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(BalanceRow {
            participant_id: ParticipantId(row.get(0)?),
            display_name: row.get(1)?,
            balance: Points::from_cents(row.get(2)?),
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

// settlement cache

pub fn settlement_result(conn: &Connection, date: GameDate) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT outcome_json FROM settlement_results WHERE date = ?1",
            params![date_key(date)],
            |row| row.get(0),
        )
        .optional()?)
}

/// Plain insert: a second row for the same date is a constraint violation, never an overwrite.
pub fn insert_settlement_result(conn: &Connection, date: GameDate, outcome_json: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO settlement_results (date, outcome_json) VALUES (?1, ?2)",
        params![date_key(date), outcome_json],
    )?;
    Ok(())
}

// bans

pub fn set_ban(conn: &Connection, participant_id: ParticipantId, ban_until: GameDate) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO bans (participant_id, ban_until) VALUES (?1, ?2)",
        params![participant_id.0, date_key(ban_until)],
    )?;
    Ok(())
}

pub fn remove_ban(conn: &Connection, participant_id: ParticipantId) -> Result<bool, StoreError> {
    let removed = conn.execute("DELETE FROM bans WHERE participant_id = ?1", params![participant_id.0])?;
    Ok(removed > 0)
}

pub fn ban_until(conn: &Connection, participant_id: ParticipantId) -> Result<Option<GameDate>, StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT ban_until FROM bans WHERE participant_id = ?1",
            params![participant_id.0],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|s| parse_date("bans", &s)).transpose()
}

pub fn bans(conn: &Connection) -> Result<Vec<BanRecord>, StoreError> {
    let mut stmt = conn.prepare_cached("SELECT participant_id, ban_until FROM bans ORDER BY participant_id ASC")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

    let mut out = Vec::new();
    for row in rows {
        let (id, raw) = row?;
        out.push(BanRecord {
            participant_id: ParticipantId(id),
            ban_until: parse_date("bans", &raw)?,
        });
    }
    Ok(out)
}
