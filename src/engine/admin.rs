// 10.3: bans. the engine resolves names through the balances table; a participant
// who never viewed a balance or got settled cannot be banned by name.

use super::core::SettlementEngine;
use crate::bans::{ban_end, is_active, normalize_name, ActiveBan, BanError};
use crate::store::{self, BanRecord, StoreError};
use crate::types::{GameDate, ParticipantId};
use rusqlite::Connection;
use tracing::info;

impl SettlementEngine {
    /// Ban `name` through `today + days`. an existing ban is overwritten, not extended.
    pub fn ban(&self, name: &str, days: i64) -> Result<BanRecord, BanError> {
        let name = normalize_name(name);
        let ban_until = ban_end(self.today(), days)?;

        let record = self.store.transaction(|tx| -> Result<BanRecord, BanError> {
            let participant_id = resolve(tx, name)?;
            store::set_ban(tx, participant_id, ban_until)?;
            Ok(BanRecord {
                participant_id,
                ban_until,
            })
        })?;

        info!(participant = %record.participant_id, name, %ban_until, "participant banned");
        Ok(record)
    }

    /// Lift a ban. `Ok(false)` when the participant exists but was not banned.
    pub fn unban(&self, name: &str) -> Result<bool, BanError> {
        let name = normalize_name(name);
        let removed = self.store.transaction(|tx| -> Result<bool, BanError> {
            let participant_id = resolve(tx, name)?;
            Ok(store::remove_ban(tx, participant_id)?)
        })?;
        if removed {
            info!(name, "ban lifted");
        }
        Ok(removed)
    }

    pub fn active_bans(&self) -> Result<Vec<ActiveBan>, StoreError> {
        self.active_bans_on(self.today())
    }

    pub fn active_bans_on(&self, today: GameDate) -> Result<Vec<ActiveBan>, StoreError> {
        self.store.with_conn(|c| {
            let mut out = Vec::new();
            for record in store::bans(c)? {
                if !is_active(record.ban_until, today) {
                    continue;
                }
                let display_name = store::display_name(c, record.participant_id)?
                    .unwrap_or_else(|| format!("ID {}", record.participant_id));
                out.push(ActiveBan {
                    participant_id: record.participant_id,
                    display_name,
                    ban_until: record.ban_until,
                    days_remaining: (record.ban_until - today).num_days(),
                });
            }
            Ok(out)
        })
    }
}

fn resolve(conn: &Connection, name: &str) -> Result<ParticipantId, BanError> {
    store::participant_by_name(conn, name)?.ok_or_else(|| BanError::UnknownParticipant { name: name.to_string() })
}
