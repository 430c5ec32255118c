// 11.0 config.rs: process-level settings. where the ledger lives, how loud the logs are,
// and the engine settings underneath.
// 11.1 env loading reads a .env file first, then PREDICTOR_* variables override defaults.

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use crate::engine::EngineConfig;

pub const ENV_DB_PATH: &str = "PREDICTOR_DB_PATH";
pub const ENV_LOG: &str = "PREDICTOR_LOG";
pub const ENV_TIMEZONE: &str = "PREDICTOR_TIMEZONE";
pub const ENV_HOLIDAYS: &str = "PREDICTOR_HOLIDAYS";
pub const ENV_CUTOFF: &str = "PREDICTOR_CUTOFF";
pub const ENV_MARKET_CLOSE: &str = "PREDICTOR_MARKET_CLOSE";
pub const ENV_NON_BETTOR_PENALTY: &str = "PREDICTOR_NON_BETTOR_PENALTY";

const TIME_FORMAT: &str = "%H:%M";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    // sqlite file holding the ledger
    pub db_path: PathBuf,
    // tracing EnvFilter directive, e.g. "info" or "predictor_core=debug"
    pub log_filter: String,
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("predictor.db"),
            log_filter: "info".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /** 11.1: load .env (if any) then read the process environment */
    pub fn from_env() -> Result<Self, ConfigError> {
        // a missing .env is normal outside development
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    // same as from_env but over any key lookup, so tests don't touch the process env
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(filter) = lookup(ENV_LOG) {
            config.log_filter = filter;
        }
        if let Some(raw) = lookup(ENV_TIMEZONE) {
            config.engine.calendar.timezone = parse::<Tz>(ENV_TIMEZONE, &raw)?;
        }
        // replaces the built-in closures outright; an empty value means weekends only
        if let Some(raw) = lookup(ENV_HOLIDAYS) {
            config.engine.calendar.holidays = parse_holidays(ENV_HOLIDAYS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CUTOFF) {
            config.engine.calendar.cutoff = parse_time(ENV_CUTOFF, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MARKET_CLOSE) {
            config.engine.calendar.market_close = parse_time(ENV_MARKET_CLOSE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_NON_BETTOR_PENALTY) {
            config.engine.non_bettor_penalty = parse::<Decimal>(ENV_NON_BETTOR_PENALTY, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    // 11.2: internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidStorage {
                reason: "database path is empty".to_string(),
            });
        }

        let cal = &self.engine.calendar;
        if cal.window_open > cal.cutoff {
            return Err(ConfigError::InvalidCalendar {
                reason: "betting window opens after the cutoff".to_string(),
            });
        }
        // settlement needs a final close after bets are locked
        if cal.cutoff >= cal.market_close {
            return Err(ConfigError::InvalidCalendar {
                reason: "cutoff must come before market close".to_string(),
            });
        }

        let scoring = &self.engine.scoring;
        let prizes = scoring
            .top_rewards
            .iter()
            .chain(scoring.bottom_penalties.iter())
            .chain(std::iter::once(&scoring.perfect_prize));
        if prizes.copied().any(|p| p < Decimal::ZERO) {
            return Err(ConfigError::InvalidScoring {
                reason: "prizes and penalties are magnitudes and must not be negative".to_string(),
            });
        }
        if scoring.risk_multiplier <= Decimal::ZERO {
            return Err(ConfigError::InvalidScoring {
                reason: "risk multiplier must be positive".to_string(),
            });
        }
        if self.engine.non_bettor_penalty < Decimal::ZERO {
            return Err(ConfigError::InvalidScoring {
                reason: "non-bettor penalty must not be negative".to_string(),
            });
        }

        Ok(())
    }
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

fn parse_time(key: &'static str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT).map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

// comma-separated YYYY-MM-DD list
fn parse_holidays(key: &'static str, raw: &str) -> Result<BTreeSet<NaiveDate>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            NaiveDate::parse_from_str(item, DATE_FORMAT).map_err(|_| ConfigError::InvalidValue {
                key,
                value: item.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid storage config: {reason}")]
    InvalidStorage { reason: String },

    #[error("invalid calendar config: {reason}")]
    InvalidCalendar { reason: String },

    #[error("invalid scoring config: {reason}")]
    InvalidScoring { reason: String },
}
