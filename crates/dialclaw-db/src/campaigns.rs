//! Campaign rows: CRUD, cadence field transitions, counter upkeep.

use chrono::Utc;
use rusqlite::{Row, params};

use dialclaw_core::error::{DialClawError, Result};
use dialclaw_core::traits::{CampaignStore, TemplateStore};
use dialclaw_core::types::{Campaign, CampaignCounters, ExecutionStatus, LeadStatus};

use crate::{CadenceDb, db_err, parse_ts, parse_ts_req};

const CAMPAIGN_COLS: &str = "id, name, status, leads_count, completed, in_progress, remaining, \
     failed, execution_status, cadence_template_id, cadence_start_date, cadence_stopped, \
     cadence_completed, cadence_paused_at, cadence_resume_from_date, cadence_resume_day, \
     created_at";

fn campaign_from_row(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
        counters: CampaignCounters {
            leads_count: row.get(3)?,
            completed: row.get(4)?,
            in_progress: row.get(5)?,
            remaining: row.get(6)?,
            failed: row.get(7)?,
        },
        execution_status: ExecutionStatus::parse(&row.get::<_, String>(8)?),
        cadence_template_id: row.get(9)?,
        cadence_start_date: parse_ts(row.get(10)?),
        cadence_stopped: row.get::<_, i64>(11)? != 0,
        cadence_completed: row.get::<_, i64>(12)? != 0,
        cadence_paused_at: parse_ts(row.get(13)?),
        cadence_resume_from_date: parse_ts(row.get(14)?),
        cadence_resume_day: row.get::<_, Option<i64>>(15)?.map(|d| d as u32),
        created_at: parse_ts_req(row.get(16)?),
    })
}

impl CadenceDb {
    /// Create a campaign with zeroed counters and no cadence attached.
    pub fn create_campaign(&self, name: &str) -> Result<Campaign> {
        if name.trim().is_empty() {
            return Err(DialClawError::Invalid("campaign name is required".into()));
        }
        let conn = self.lock()?;
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM campaigns WHERE name = ?1 COLLATE NOCASE)",
                params![name],
                |r| r.get(0),
            )
            .map_err(|e| db_err("campaign name check", e))?;
        if exists {
            return Err(DialClawError::Invalid(format!(
                "a campaign named '{name}' already exists"
            )));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO campaigns (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![id, name, now.to_rfc3339()],
        )
        .map_err(|e| db_err("create campaign", e))?;
        drop(conn);
        self.campaign(&id)?
            .ok_or_else(|| DialClawError::NotFound(format!("campaign {id}")))
    }

    /// Attach a cadence template to a campaign and arm the start date.
    pub fn attach_cadence(
        &self,
        campaign_id: &str,
        cadence_id: &str,
        start_date: chrono::DateTime<Utc>,
    ) -> Result<()> {
        if self.campaign(campaign_id)?.is_none() {
            return Err(DialClawError::NotFound(format!("campaign {campaign_id}")));
        }
        if self.template(cadence_id)?.is_none() {
            return Err(DialClawError::NotFound(format!(
                "cadence template {cadence_id}"
            )));
        }
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaigns SET cadence_template_id = ?1, cadence_start_date = ?2,
             cadence_stopped = 0, cadence_completed = 0,
             cadence_paused_at = NULL, cadence_resume_from_date = NULL,
             cadence_resume_day = NULL
             WHERE id = ?3",
            params![cadence_id, start_date.to_rfc3339(), campaign_id],
        )
        .map_err(|e| db_err("attach cadence", e))?;
        Ok(())
    }

    /// Counter snapshot for dashboards and the `stats` CLI command.
    pub fn campaign_stats(&self, campaign_id: &str) -> Result<CampaignCounters> {
        self.campaign(campaign_id)?
            .map(|c| c.counters)
            .ok_or_else(|| DialClawError::NotFound(format!("campaign {campaign_id}")))
    }
}

impl CampaignStore for CadenceDb {
    fn campaign(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {CAMPAIGN_COLS} FROM campaigns WHERE id = ?1"))
            .map_err(|e| db_err("prepare campaign", e))?;
        let mut rows = stmt
            .query_map(params![campaign_id], campaign_from_row)
            .map_err(|e| db_err("query campaign", e))?;
        rows.next()
            .transpose()
            .map_err(|e| db_err("read campaign", e))
    }

    fn cadence_candidates(&self) -> Result<Vec<Campaign>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CAMPAIGN_COLS} FROM campaigns
                 WHERE cadence_template_id IS NOT NULL
                   AND cadence_stopped = 0
                   AND cadence_completed = 0
                   AND cadence_start_date <= ?1
                   AND execution_status = 'idle'
                 ORDER BY created_at"
            ))
            .map_err(|e| db_err("prepare candidates", e))?;
        let rows = stmt
            .query_map(params![Utc::now().to_rfc3339()], campaign_from_row)
            .map_err(|e| db_err("query candidates", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("read candidates", e))
    }

    fn set_execution_status(&self, campaign_id: &str, status: ExecutionStatus) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaigns SET execution_status = ?1 WHERE id = ?2",
            params![status.as_str(), campaign_id],
        )
        .map_err(|e| db_err("set execution status", e))?;
        Ok(())
    }

    fn try_mark_executing(&self, campaign_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE campaigns SET execution_status = 'executing'
                 WHERE id = ?1 AND execution_status = 'idle'",
                params![campaign_id],
            )
            .map_err(|e| db_err("mark executing", e))?;
        Ok(changed == 1)
    }

    fn mark_cadence_completed(&self, campaign_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaigns SET cadence_completed = 1 WHERE id = ?1",
            params![campaign_id],
        )
        .map_err(|e| db_err("mark completed", e))?;
        Ok(())
    }

    fn mark_cadence_stopped(&self, campaign_id: &str, resume_day: u32) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaigns SET cadence_stopped = 1, cadence_paused_at = ?1,
             cadence_resume_day = ?2 WHERE id = ?3",
            params![Utc::now().to_rfc3339(), resume_day, campaign_id],
        )
        .map_err(|e| db_err("mark stopped", e))?;
        Ok(())
    }

    fn mark_cadence_resumed(&self, campaign_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaigns SET cadence_stopped = 0, cadence_resume_from_date = ?1
             WHERE id = ?2",
            params![Utc::now().to_rfc3339(), campaign_id],
        )
        .map_err(|e| db_err("mark resumed", e))?;
        Ok(())
    }

    fn reconcile_counters(&self, campaign_id: &str) -> Result<CampaignCounters> {
        let conn = self.lock()?;
        let count_status = |status: LeadStatus| -> Result<i64> {
            conn.query_row(
                "SELECT COUNT(*) FROM leads WHERE campaign_id = ?1 AND status = ?2",
                params![campaign_id, status.as_str()],
                |r| r.get(0),
            )
            .map_err(|e| db_err("count leads", e))
        };
        let counters = CampaignCounters {
            leads_count: conn
                .query_row(
                    "SELECT COUNT(*) FROM leads WHERE campaign_id = ?1",
                    params![campaign_id],
                    |r| r.get(0),
                )
                .map_err(|e| db_err("count leads", e))?,
            completed: count_status(LeadStatus::Completed)?,
            in_progress: count_status(LeadStatus::InProgress)?,
            remaining: count_status(LeadStatus::Pending)?,
            failed: count_status(LeadStatus::Failed)?,
        };
        conn.execute(
            "UPDATE campaigns SET leads_count = ?1, completed = ?2, in_progress = ?3,
             remaining = ?4, failed = ?5 WHERE id = ?6",
            params![
                counters.leads_count,
                counters.completed,
                counters.in_progress,
                counters.remaining,
                counters.failed,
                campaign_id
            ],
        )
        .map_err(|e| db_err("write counters", e))?;
        Ok(counters)
    }
}
