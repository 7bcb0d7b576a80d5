//! The progress ledger — append-only, idempotent on the slot key.

use rusqlite::{Row, params};

use dialclaw_core::error::Result;
use dialclaw_core::traits::ProgressStore;
use dialclaw_core::types::CadenceProgress;

use crate::{CadenceDb, db_err, parse_ts_req};

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<CadenceProgress> {
    Ok(CadenceProgress {
        campaign_id: row.get(0)?,
        cadence_id: row.get(1)?,
        day: row.get::<_, i64>(2)? as u32,
        attempt: row.get::<_, i64>(3)? as u32,
        time_window: row.get(4)?,
        executed_at: parse_ts_req(row.get(5)?),
    })
}

impl ProgressStore for CadenceDb {
    fn count(&self, campaign_id: &str, cadence_id: &str, day: Option<u32>) -> Result<u32> {
        let conn = self.lock()?;
        let n: i64 = match day {
            Some(day) => conn
                .query_row(
                    "SELECT COUNT(*) FROM cadence_progress
                     WHERE campaign_id = ?1 AND cadence_id = ?2 AND day = ?3",
                    params![campaign_id, cadence_id, day],
                    |r| r.get(0),
                )
                .map_err(|e| db_err("count progress", e))?,
            None => conn
                .query_row(
                    "SELECT COUNT(*) FROM cadence_progress
                     WHERE campaign_id = ?1 AND cadence_id = ?2",
                    params![campaign_id, cadence_id],
                    |r| r.get(0),
                )
                .map_err(|e| db_err("count progress", e))?,
        };
        Ok(n as u32)
    }

    fn find_latest(
        &self,
        campaign_id: &str,
        cadence_id: &str,
        day: Option<u32>,
    ) -> Result<Option<CadenceProgress>> {
        let conn = self.lock()?;
        let base = "SELECT campaign_id, cadence_id, day, attempt, time_window, executed_at
                    FROM cadence_progress
                    WHERE campaign_id = ?1 AND cadence_id = ?2";
        let (sql, with_day) = match day {
            Some(_) => (
                format!("{base} AND day = ?3 ORDER BY executed_at DESC, id DESC LIMIT 1"),
                true,
            ),
            None => (
                format!("{base} ORDER BY executed_at DESC, id DESC LIMIT 1"),
                false,
            ),
        };
        let mut stmt = conn.prepare(&sql).map_err(|e| db_err("prepare latest", e))?;
        let mut rows = if with_day {
            stmt.query_map(params![campaign_id, cadence_id, day.unwrap()], progress_from_row)
        } else {
            stmt.query_map(params![campaign_id, cadence_id], progress_from_row)
        }
        .map_err(|e| db_err("query latest", e))?;
        rows.next()
            .transpose()
            .map_err(|e| db_err("read latest", e))
    }

    fn count_for_window(
        &self,
        campaign_id: &str,
        cadence_id: &str,
        day: u32,
        time_window: &str,
    ) -> Result<u32> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM cadence_progress
                 WHERE campaign_id = ?1 AND cadence_id = ?2 AND day = ?3 AND time_window = ?4",
                params![campaign_id, cadence_id, day, time_window],
                |r| r.get(0),
            )
            .map_err(|e| db_err("count window", e))?;
        Ok(n as u32)
    }

    fn insert_if_absent(&self, record: &CadenceProgress) -> Result<bool> {
        let conn = self.lock()?;
        // The UNIQUE index on the slot key turns duplicates into no-ops
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO cadence_progress
                 (campaign_id, cadence_id, day, attempt, time_window, executed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.campaign_id,
                    record.cadence_id,
                    record.day,
                    record.attempt,
                    record.time_window,
                    record.executed_at.to_rfc3339()
                ],
            )
            .map_err(|e| db_err("insert progress", e))?;
        Ok(inserted == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(campaign: &str, day: u32, attempt: u32, window: &str) -> CadenceProgress {
        CadenceProgress {
            campaign_id: campaign.into(),
            cadence_id: "cad-1".into(),
            day,
            attempt,
            time_window: window.into(),
            executed_at: Utc::now(),
        }
    }

    fn db_with_campaign() -> (CadenceDb, String) {
        let db = CadenceDb::open_in_memory().unwrap();
        let c = db.create_campaign("ledger").unwrap();
        (db, c.id)
    }

    #[test]
    fn test_duplicate_slot_is_single_row() {
        let (db, id) = db_with_campaign();
        let r = record(&id, 1, 1, "09:00-12:00");
        assert!(db.insert_if_absent(&r).unwrap());
        // Same slot key again — even with a different timestamp
        let mut dup = record(&id, 1, 1, "09:00-12:00");
        dup.executed_at = Utc::now() + chrono::Duration::seconds(30);
        assert!(!db.insert_if_absent(&dup).unwrap());
        assert_eq!(db.count(&id, "cad-1", Some(1)).unwrap(), 1);
    }

    #[test]
    fn test_counts_by_day_and_window() {
        let (db, id) = db_with_campaign();
        db.insert_if_absent(&record(&id, 1, 1, "09:00-12:00")).unwrap();
        db.insert_if_absent(&record(&id, 1, 2, "13:00-17:00")).unwrap();
        db.insert_if_absent(&record(&id, 2, 1, "09:00-12:00")).unwrap();

        assert_eq!(db.count(&id, "cad-1", None).unwrap(), 3);
        assert_eq!(db.count(&id, "cad-1", Some(1)).unwrap(), 2);
        assert_eq!(
            db.count_for_window(&id, "cad-1", 1, "09:00-12:00").unwrap(),
            1
        );
        assert_eq!(
            db.count_for_window(&id, "cad-1", 1, "13:00-17:00").unwrap(),
            1
        );
    }

    #[test]
    fn test_find_latest_orders_by_executed_at() {
        let (db, id) = db_with_campaign();
        let mut first = record(&id, 3, 1, "09:00-12:00");
        first.executed_at = Utc::now() - chrono::Duration::hours(2);
        db.insert_if_absent(&first).unwrap();
        db.insert_if_absent(&record(&id, 3, 2, "13:00-17:00")).unwrap();

        let latest = db.find_latest(&id, "cad-1", Some(3)).unwrap().unwrap();
        assert_eq!(latest.attempt, 2);
        let overall = db.find_latest(&id, "cad-1", None).unwrap().unwrap();
        assert_eq!(overall.day, 3);
        assert!(db.find_latest(&id, "cad-1", Some(9)).unwrap().is_none());
    }
}
