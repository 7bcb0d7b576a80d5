//! Lead activity log — one row per notable contact event.

use rusqlite::params;

use dialclaw_core::error::Result;
use dialclaw_core::traits::ActivityStore;
use dialclaw_core::types::ActivityEntry;

use crate::{CadenceDb, db_err};

impl ActivityStore for CadenceDb {
    fn record(&self, entry: &ActivityEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO activity_log (lead_id, campaign_id, activity_type, to_disposition, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.lead_id,
                entry.campaign_id,
                entry.activity_type,
                entry.to_disposition,
                entry.created_at.to_rfc3339()
            ],
        )
        .map_err(|e| db_err("record activity", e))?;
        Ok(())
    }
}

impl CadenceDb {
    /// Recent activity for a campaign, newest first.
    pub fn recent_activity(&self, campaign_id: &str, limit: usize) -> Result<Vec<ActivityEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT lead_id, campaign_id, activity_type, to_disposition, created_at
                 FROM activity_log WHERE campaign_id = ?1
                 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(|e| db_err("prepare activity", e))?;
        let rows = stmt
            .query_map(params![campaign_id, limit as i64], |row| {
                Ok(ActivityEntry {
                    lead_id: row.get(0)?,
                    campaign_id: row.get(1)?,
                    activity_type: row.get(2)?,
                    to_disposition: row.get(3)?,
                    created_at: crate::parse_ts_req(row.get(4)?),
                })
            })
            .map_err(|e| db_err("query activity", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("read activity", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_record_and_list() {
        let db = CadenceDb::open_in_memory().unwrap();
        let c = db.create_campaign("log").unwrap();
        for i in 0..3 {
            db.record(&ActivityEntry {
                lead_id: format!("lead-{i}"),
                campaign_id: c.id.clone(),
                activity_type: "CALL_ATTEMPT".into(),
                to_disposition: "API Error: timeout".into(),
                created_at: Utc::now(),
            })
            .unwrap();
        }
        let recent = db.recent_activity(&c.id, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].lead_id, "lead-2");
    }
}
