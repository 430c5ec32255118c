//! Administrative bans.
//!
//! A ban blocks bet submission through its last day inclusive. Settlement never
//! looks at bans: a banned participant who has a balance row is still a known
//! participant and still pays the non-bettor penalty.

use crate::store::StoreError;
use crate::types::{GameDate, ParticipantId};
use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum BanError {
    #[error("no participant named {name}")]
    UnknownParticipant { name: String },

    #[error("ban length must be zero or more days, got {days}")]
    InvalidDuration { days: i64 },

    #[error("ledger store failure: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveBan {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub ban_until: GameDate,
    pub days_remaining: i64,
}

/// Names arrive as typed in chat; a leading `@` is not part of the name.
pub fn normalize_name(raw: &str) -> &str {
    raw.trim().trim_start_matches('@')
}

pub fn ban_end(today: GameDate, days: i64) -> Result<GameDate, BanError> {
    if days < 0 {
        return Err(BanError::InvalidDuration { days });
    }
    Duration::try_days(days)
        .and_then(|d| today.checked_add_signed(d))
        .ok_or(BanError::InvalidDuration { days })
}

pub fn is_active(ban_until: GameDate, today: GameDate) -> bool {
    today <= ban_until
}
