//! Lead rows and the transactional contact-outcome write.

use chrono::Utc;
use rusqlite::{Row, params};

use dialclaw_core::error::{DialClawError, Result};
use dialclaw_core::traits::{CounterDeltas, LeadStore};
use dialclaw_core::types::{Lead, LeadStatus};

use crate::{CadenceDb, db_err, parse_ts_req};

const LEAD_COLS: &str =
    "id, campaign_id, name, phone_number, phone_id, status, disposition, created_at";

fn lead_from_row(row: &Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        name: row.get(2)?,
        phone_number: row.get(3)?,
        phone_id: row.get(4)?,
        status: LeadStatus::parse(&row.get::<_, String>(5)?),
        disposition: row.get(6)?,
        created_at: parse_ts_req(row.get(7)?),
    })
}

/// Input shape for bulk lead import.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub name: String,
    pub phone_number: String,
    pub phone_id: Option<String>,
}

impl CadenceDb {
    /// Bulk-insert leads into a campaign, then recompute its counters
    /// from the actual rows (the import may race with call outcomes).
    pub fn add_leads(&self, campaign_id: &str, leads: &[NewLead]) -> Result<u32> {
        if leads.is_empty() {
            return Err(DialClawError::Invalid("no leads to add".into()));
        }
        {
            let mut conn = self.lock()?;
            let tx = conn
                .transaction()
                .map_err(|e| db_err("begin add_leads", e))?;
            for lead in leads {
                tx.execute(
                    "INSERT INTO leads (id, campaign_id, name, phone_number, phone_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        uuid::Uuid::new_v4().to_string(),
                        campaign_id,
                        lead.name,
                        lead.phone_number,
                        lead.phone_id,
                        Utc::now().to_rfc3339()
                    ],
                )
                .map_err(|e| db_err("insert lead", e))?;
            }
            tx.commit().map_err(|e| db_err("commit add_leads", e))?;
        }
        use dialclaw_core::traits::CampaignStore;
        self.reconcile_counters(campaign_id)?;
        Ok(leads.len() as u32)
    }
}

impl LeadStore for CadenceDb {
    fn lead(&self, lead_id: &str) -> Result<Option<Lead>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {LEAD_COLS} FROM leads WHERE id = ?1"))
            .map_err(|e| db_err("prepare lead", e))?;
        let mut rows = stmt
            .query_map(params![lead_id], lead_from_row)
            .map_err(|e| db_err("query lead", e))?;
        rows.next().transpose().map_err(|e| db_err("read lead", e))
    }

    fn leads_by_status(&self, campaign_id: &str, status: LeadStatus) -> Result<Vec<Lead>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {LEAD_COLS} FROM leads
                 WHERE campaign_id = ?1 AND status = ?2
                 ORDER BY created_at DESC, id DESC"
            ))
            .map_err(|e| db_err("prepare leads", e))?;
        let rows = stmt
            .query_map(params![campaign_id, status.as_str()], lead_from_row)
            .map_err(|e| db_err("query leads", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("read leads", e))
    }

    fn leads_by_disposition(
        &self,
        campaign_id: &str,
        dispositions: &[String],
    ) -> Result<Vec<Lead>> {
        if dispositions.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        // rusqlite has no array binds; build the placeholder list
        let placeholders = (0..dispositions.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {LEAD_COLS} FROM leads
             WHERE campaign_id = ?1 AND disposition IN ({placeholders})
             ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| db_err("prepare leads", e))?;
        let mut bound: Vec<&dyn rusqlite::ToSql> = vec![&campaign_id];
        for d in dispositions {
            bound.push(d);
        }
        let rows = stmt
            .query_map(bound.as_slice(), lead_from_row)
            .map_err(|e| db_err("query leads", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("read leads", e))
    }

    fn record_contact_outcome(
        &self,
        lead_id: &str,
        status: LeadStatus,
        disposition: &str,
        deltas: CounterDeltas,
    ) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| db_err("begin outcome", e))?;
        let campaign_id: String = tx
            .query_row(
                "SELECT campaign_id FROM leads WHERE id = ?1",
                params![lead_id],
                |r| r.get(0),
            )
            .map_err(|e| db_err("lead campaign lookup", e))?;
        tx.execute(
            "UPDATE leads SET status = ?1, disposition = ?2 WHERE id = ?3",
            params![status.as_str(), disposition, lead_id],
        )
        .map_err(|e| db_err("update lead", e))?;
        tx.execute(
            "UPDATE campaigns SET
                completed = completed + ?1,
                in_progress = in_progress + ?2,
                remaining = remaining + ?3,
                failed = failed + ?4
             WHERE id = ?5",
            params![
                deltas.completed,
                deltas.in_progress,
                deltas.remaining,
                deltas.failed,
                campaign_id
            ],
        )
        .map_err(|e| db_err("update counters", e))?;
        tx.commit().map_err(|e| db_err("commit outcome", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialclaw_core::traits::CampaignStore;

    fn seed(db: &CadenceDb, n: usize) -> String {
        let c = db.create_campaign("seeded").unwrap();
        let leads: Vec<NewLead> = (0..n)
            .map(|i| NewLead {
                name: format!("lead-{i}"),
                phone_number: format!("+1555000{i:04}"),
                phone_id: Some("line-1".into()),
            })
            .collect();
        db.add_leads(&c.id, &leads).unwrap();
        c.id
    }

    #[test]
    fn test_add_leads_sets_counters() {
        let db = CadenceDb::open_in_memory().unwrap();
        let id = seed(&db, 5);
        let c = db.campaign(&id).unwrap().unwrap();
        assert_eq!(c.counters.leads_count, 5);
        assert_eq!(c.counters.remaining, 5);
        assert!(c.counters.balanced());
    }

    #[test]
    fn test_contact_outcome_is_transactional() {
        let db = CadenceDb::open_in_memory().unwrap();
        let id = seed(&db, 3);
        let lead = &db.leads_by_status(&id, LeadStatus::Pending).unwrap()[0];
        db.record_contact_outcome(
            &lead.id,
            LeadStatus::InProgress,
            "Call initiated",
            CounterDeltas {
                in_progress: 1,
                remaining: -1,
                ..Default::default()
            },
        )
        .unwrap();
        let c = db.campaign(&id).unwrap().unwrap();
        assert_eq!(c.counters.in_progress, 1);
        assert_eq!(c.counters.remaining, 2);
        assert!(c.counters.balanced());
    }

    #[test]
    fn test_disposition_selection_order() {
        let db = CadenceDb::open_in_memory().unwrap();
        let id = seed(&db, 3);
        for lead in db.leads_by_status(&id, LeadStatus::Pending).unwrap() {
            db.record_contact_outcome(
                &lead.id,
                LeadStatus::Failed,
                "No Answer",
                CounterDeltas {
                    failed: 1,
                    remaining: -1,
                    ..Default::default()
                },
            )
            .unwrap();
        }
        let eligible = db
            .leads_by_disposition(&id, &["No Answer".to_string()])
            .unwrap();
        assert_eq!(eligible.len(), 3);
        // Stable: created_at desc then id desc
        let mut sorted = eligible.clone();
        sorted.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        let ids: Vec<_> = eligible.iter().map(|l| &l.id).collect();
        let want: Vec<_> = sorted.iter().map(|l| &l.id).collect();
        assert_eq!(ids, want);
    }
}
