//! Periodic trigger — scans eligible campaigns and feeds the queue.
//!
//! Every tick it pulls the candidate set from the store, applies a
//! cheap budget pre-filter (is today a configured day with attempts
//! left?) and enqueues the survivors. The heavy lifting — windows,
//! quotas, dispatch — stays in the engine; the pre-filter only exists
//! to keep obviously-dead campaigns out of the queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use dialclaw_core::error::Result;
use dialclaw_core::traits::{CampaignStore, ProgressStore, TemplateStore};
use dialclaw_core::types::Campaign;

use crate::day::cadence_day;
use crate::engine::EngineStore;
use crate::queue::JobQueue;

pub struct CadenceTrigger<S: EngineStore> {
    store: Arc<S>,
    queue: Arc<JobQueue>,
    tick: Duration,
}

impl<S: EngineStore> CadenceTrigger<S> {
    pub fn new(store: Arc<S>, queue: Arc<JobQueue>, tick_minutes: u64) -> Self {
        Self {
            store,
            queue,
            tick: Duration::from_secs(tick_minutes * 60),
        }
    }

    /// Tick loop; returns when `shutdown` flips to true. The first scan
    /// happens immediately, not one tick in.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.tick);
        tracing::info!("🔁 Cadence trigger running every {:?}", self.tick);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once() {
                        tracing::error!("❌ Trigger scan failed: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Cadence trigger shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// One scan: enqueue every candidate that plausibly has work today.
    pub fn scan_once(&self) -> Result<usize> {
        let candidates = self.store.cadence_candidates()?;
        let mut enqueued = 0;
        for campaign in &candidates {
            match self.has_budget_today(campaign) {
                Ok(true) => {
                    self.queue.enqueue(&campaign.id, campaign.is_resumed());
                    enqueued += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("⚠️ Skipping campaign {} in scan: {e}", campaign.id);
                }
            }
        }
        if enqueued > 0 {
            tracing::info!("📤 Trigger scan enqueued {enqueued}/{} campaign(s)", candidates.len());
        } else {
            tracing::debug!("Trigger scan found no work ({} candidate(s))", candidates.len());
        }
        Ok(enqueued)
    }

    /// Cheap pre-filter mirroring the engine's day/budget checks. A
    /// campaign with spent budget still passes once its retry pool may
    /// matter — false positives are fine, the engine re-checks.
    fn has_budget_today(&self, campaign: &Campaign) -> Result<bool> {
        let Some(template_id) = campaign.cadence_template_id.as_deref() else {
            return Ok(false);
        };
        let Some(template) = self.store.template(template_id)? else {
            return Ok(false);
        };
        let (base, offset) = if campaign.is_resumed() {
            match (campaign.cadence_resume_from_date, campaign.cadence_resume_day) {
                (Some(b), Some(d)) => (b, d),
                _ => return Ok(false),
            }
        } else {
            match campaign.cadence_start_date {
                Some(b) => (b, 1),
                None => return Ok(false),
            }
        };
        let Some(day) = cadence_day(base, Utc::now(), offset) else {
            return Ok(false);
        };
        let Some(day_config) = template.days.get(&day) else {
            // No work today, but the completion check still needs a
            // pass once the whole schedule is behind us.
            return Ok(template.last_day().is_some_and(|last| day > last));
        };
        let done = self.store.count(&campaign.id, &template.id, Some(day))?;
        Ok(done < day_config.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::Duration as ChronoDuration;

    use dialclaw_core::types::{CadenceProgress, DayConfig};
    use dialclaw_db::CadenceDb;

    use crate::queue::QueuePolicy;

    fn day_map(entries: &[(u32, u32)]) -> BTreeMap<u32, DayConfig> {
        entries
            .iter()
            .map(|(d, a)| {
                (
                    *d,
                    DayConfig {
                        attempts: *a,
                        time_windows: vec!["00:00-23:59".into()],
                    },
                )
            })
            .collect()
    }

    fn setup(day_entries: &[(u32, u32)], started_hours_ago: i64) -> (Arc<CadenceDb>, String, String) {
        let db = Arc::new(CadenceDb::open_in_memory().unwrap());
        let tpl = db
            .create_cadence_template("tpl", vec!["No Answer".into()], day_map(day_entries))
            .unwrap();
        let c = db.create_campaign("camp").unwrap();
        db.attach_cadence(&c.id, &tpl.id, Utc::now() - ChronoDuration::hours(started_hours_ago))
            .unwrap();
        (db, c.id, tpl.id)
    }

    fn trigger(db: &Arc<CadenceDb>) -> (CadenceTrigger<CadenceDb>, Arc<JobQueue>) {
        let queue = JobQueue::new(QueuePolicy::default());
        (
            CadenceTrigger::new(Arc::clone(db), Arc::clone(&queue), 25),
            queue,
        )
    }

    #[tokio::test]
    async fn test_scan_enqueues_campaign_with_budget() {
        let (db, campaign_id, _) = setup(&[(1, 2)], 1);
        let (t, queue) = trigger(&db);
        assert_eq!(t.scan_once().unwrap(), 1);
        let job = queue.try_next().unwrap();
        assert_eq!(job.campaign_id, campaign_id);
        assert!(!job.resume);
    }

    #[tokio::test]
    async fn test_scan_skips_spent_budget() {
        let (db, campaign_id, template_id) = setup(&[(1, 1)], 1);
        db.insert_if_absent(&CadenceProgress {
            campaign_id,
            cadence_id: template_id,
            day: 1,
            attempt: 1,
            time_window: "00:00-23:59".into(),
            executed_at: Utc::now(),
        })
        .unwrap();
        let (t, queue) = trigger(&db);
        assert_eq!(t.scan_once().unwrap(), 0);
        assert!(queue.try_next().is_none());
    }

    #[tokio::test]
    async fn test_scan_skips_unconfigured_mid_schedule_day() {
        // Day 2 of a 1-and-5 schedule: nothing to do, nothing queued
        let (db, _, _) = setup(&[(1, 1), (5, 2)], 26);
        let (t, _) = trigger(&db);
        assert_eq!(t.scan_once().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scan_enqueues_past_schedule_for_completion() {
        // Day 3 of a schedule ending on day 1: the engine still owes
        // the completion check.
        let (db, _, _) = setup(&[(1, 1)], 50);
        let (t, queue) = trigger(&db);
        assert_eq!(t.scan_once().unwrap(), 1);
        assert!(queue.try_next().is_some());
    }

    #[tokio::test]
    async fn test_scan_flags_resumed_campaigns() {
        let (db, campaign_id, _) = setup(&[(2, 1), (6, 1)], 1);
        db.mark_cadence_stopped(&campaign_id, 2).unwrap();
        // Resume re-bases to day 2, which is configured and unspent
        db.mark_cadence_resumed(&campaign_id).unwrap();
        let (t, queue) = trigger(&db);
        assert_eq!(t.scan_once().unwrap(), 1);
        let job = queue.try_next().unwrap();
        assert!(job.resume);
    }

    #[tokio::test]
    async fn test_scan_ignores_stopped_campaigns() {
        let (db, campaign_id, _) = setup(&[(1, 1)], 1);
        db.mark_cadence_stopped(&campaign_id, 1).unwrap();
        let (t, queue) = trigger(&db);
        assert_eq!(t.scan_once().unwrap(), 0);
        assert!(queue.try_next().is_none());
    }
}
