//! Queue consumer — drains jobs into engine passes, one at a time.
//!
//! Per-campaign serialization lives in the engine (guard + persisted
//! status), so a single worker task is the simplest correct shape: it
//! also caps provider concurrency at one in-flight pass.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::{CadenceEngine, EngineStore, PassOutcome};
use crate::queue::{CadenceJob, JobQueue};

pub fn spawn_worker<S: EngineStore + 'static>(
    queue: Arc<JobQueue>,
    engine: Arc<CadenceEngine<S>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("👷 Cadence worker started");
        loop {
            let job = tokio::select! {
                job = queue.next() => job,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Cadence worker shutting down");
                        return;
                    }
                    continue;
                }
            };
            process(&queue, &engine, job).await;
        }
    })
}

async fn process<S: EngineStore>(
    queue: &Arc<JobQueue>,
    engine: &Arc<CadenceEngine<S>>,
    job: CadenceJob,
) {
    let result = if job.resume {
        engine.execute_resume_cadence(&job.campaign_id).await
    } else {
        engine.execute_campaign_cadence(&job.campaign_id).await
    };
    match result {
        Ok(outcome) => {
            if let PassOutcome::Ran { day, contacted } = outcome {
                tracing::info!(
                    "✅ Pass done for campaign {}: day {day}, {contacted} contacted",
                    job.campaign_id
                );
            }
            queue.record_success(&job);
        }
        Err(e) => {
            // The queue decides whether this redelivers or goes terminal
            queue.record_failure(&job, &e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};

    use dialclaw_core::config::CadenceConfig;
    use dialclaw_core::error::Result;
    use dialclaw_core::traits::{CallDispatcher, DispatchReceipt, LeadStore};
    use dialclaw_core::types::{DayConfig, Lead, LeadStatus};
    use dialclaw_db::{CadenceDb, NewLead};

    use crate::queue::{JobOutcome, QueuePolicy};

    struct CountingDispatcher(Mutex<usize>);

    #[async_trait]
    impl CallDispatcher for CountingDispatcher {
        async fn trigger(&self, _lead_id: &str) -> Result<DispatchReceipt> {
            *self.0.lock().unwrap() += 1;
            Ok(DispatchReceipt::default())
        }
        async fn trigger_retry(&self, _lead: &Lead) -> Result<DispatchReceipt> {
            *self.0.lock().unwrap() += 1;
            Ok(DispatchReceipt::default())
        }
    }

    fn engine_with_campaign() -> (Arc<CadenceEngine<CadenceDb>>, String) {
        let db = Arc::new(CadenceDb::open_in_memory().unwrap());
        let days: BTreeMap<u32, DayConfig> = [(
            1,
            DayConfig {
                attempts: 2,
                time_windows: vec!["00:00-23:59".into()],
            },
        )]
        .into_iter()
        .collect();
        let tpl = db.create_cadence_template("tpl", vec![], days).unwrap();
        let c = db.create_campaign("camp").unwrap();
        db.add_leads(
            &c.id,
            &[NewLead {
                name: "lead-0".into(),
                phone_number: "+15550000000".into(),
                phone_id: None,
            }],
        )
        .unwrap();
        db.attach_cadence(&c.id, &tpl.id, Utc::now() - ChronoDuration::hours(1))
            .unwrap();
        let config = CadenceConfig {
            pacing_ms: 0,
            ..CadenceConfig::default()
        };
        let engine = Arc::new(CadenceEngine::new(
            db,
            Arc::new(CountingDispatcher(Mutex::new(0))),
            config,
        ));
        (engine, c.id)
    }

    #[tokio::test]
    async fn test_worker_runs_job_and_records_success() {
        let (engine, campaign_id) = engine_with_campaign();
        let queue = JobQueue::new(QueuePolicy::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_worker(Arc::clone(&queue), Arc::clone(&engine), shutdown_rx);

        queue.enqueue(&campaign_id, false);
        // Wait for the job to land in history
        for _ in 0..100 {
            if !queue.history().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let history = queue.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, JobOutcome::Succeeded);

        let lead_status = engine
            .store()
            .leads_by_status(&campaign_id, LeadStatus::InProgress)
            .unwrap();
        assert_eq!(lead_status.len(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_records_failure_for_missing_campaign() {
        let (engine, _) = engine_with_campaign();
        let policy = QueuePolicy {
            max_attempts: 1,
            ..QueuePolicy::default()
        };
        let queue = JobQueue::new(policy);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_worker(Arc::clone(&queue), engine, shutdown_rx);

        queue.enqueue("no-such-campaign", false);
        for _ in 0..100 {
            if !queue.history().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let history = queue.history();
        assert_eq!(history.len(), 1);
        assert!(matches!(history[0].outcome, JobOutcome::Failed(_)));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
