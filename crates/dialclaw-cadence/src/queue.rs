//! In-process job queue for cadence execution.
//!
//! One job per eligible campaign per trigger scan. Failed jobs are
//! re-enqueued after an exponential backoff (floor × 2^(attempt−1))
//! until `max_attempts` is exhausted; finished jobs land in a bounded
//! history ring for diagnostics. No Redis, no broker — a mutex-guarded
//! deque plus a `Notify` is plenty at this scale.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

/// One unit of work: run an execution pass for a campaign.
#[derive(Debug, Clone)]
pub struct CadenceJob {
    pub campaign_id: String,
    /// Run through the resume entry point (re-based day math).
    pub resume: bool,
    /// 1-based delivery attempt.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Terminal record of a job, kept in the retention ring.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub campaign_id: String,
    pub attempts: u32,
    pub outcome: JobOutcome,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
}

/// Retry and retention policy, set once at construction.
#[derive(Debug, Clone)]
pub struct QueuePolicy {
    /// Total delivery attempts per job (2 = one automatic retry).
    pub max_attempts: u32,
    /// Backoff floor for the first retry; doubles per attempt.
    pub backoff: Duration,
    /// How many terminal job records to retain.
    pub retention: usize,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(5),
            retention: 100,
        }
    }
}

pub struct JobQueue {
    jobs: Mutex<VecDeque<CadenceJob>>,
    notify: Notify,
    policy: QueuePolicy,
    history: Mutex<VecDeque<JobRecord>>,
}

impl JobQueue {
    pub fn new(policy: QueuePolicy) -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            policy,
            history: Mutex::new(VecDeque::new()),
        })
    }

    /// Enqueue a fresh job (attempt 1).
    pub fn enqueue(&self, campaign_id: &str, resume: bool) {
        self.push(CadenceJob {
            campaign_id: campaign_id.to_string(),
            resume,
            attempt: 1,
            enqueued_at: Utc::now(),
        });
    }

    fn push(&self, job: CadenceJob) {
        if let Ok(mut jobs) = self.jobs.lock() {
            tracing::debug!(
                "📥 Enqueue campaign {} (attempt {}, queued: {})",
                job.campaign_id,
                job.attempt,
                jobs.len() + 1
            );
            jobs.push_back(job);
        }
        self.notify.notify_one();
    }

    /// Wait for and take the next job.
    pub async fn next(&self) -> CadenceJob {
        loop {
            if let Some(job) = self.jobs.lock().ok().and_then(|mut j| j.pop_front()) {
                return job;
            }
            self.notify.notified().await;
        }
    }

    /// Non-blocking take, used by tests and drain loops.
    pub fn try_next(&self) -> Option<CadenceJob> {
        self.jobs.lock().ok().and_then(|mut j| j.pop_front())
    }

    /// Record a successful job.
    pub fn record_success(&self, job: &CadenceJob) {
        self.retain(JobRecord {
            campaign_id: job.campaign_id.clone(),
            attempts: job.attempt,
            outcome: JobOutcome::Succeeded,
            finished_at: Utc::now(),
        });
    }

    /// Report a failed job. Schedules a delayed redelivery while
    /// attempts remain, otherwise records the terminal failure.
    pub fn record_failure(self: &Arc<Self>, job: &CadenceJob, error: &str) {
        if job.attempt < self.policy.max_attempts {
            let delay = self.policy.backoff * 2u32.saturating_pow(job.attempt - 1);
            tracing::warn!(
                "🔁 Job for campaign {} failed (attempt {}), retrying in {:?}: {error}",
                job.campaign_id,
                job.attempt,
                delay
            );
            let queue = Arc::clone(self);
            let mut retry = job.clone();
            retry.attempt += 1;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                queue.push(retry);
            });
        } else {
            tracing::error!(
                "❌ Job for campaign {} failed after {} attempts: {error}",
                job.campaign_id,
                job.attempt
            );
            self.retain(JobRecord {
                campaign_id: job.campaign_id.clone(),
                attempts: job.attempt,
                outcome: JobOutcome::Failed(error.to_string()),
                finished_at: Utc::now(),
            });
        }
    }

    fn retain(&self, record: JobRecord) {
        if let Ok(mut history) = self.history.lock() {
            history.push_back(record);
            while history.len() > self.policy.retention {
                history.pop_front();
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.jobs.lock().map(|j| j.len()).unwrap_or(0)
    }

    pub fn history(&self) -> Vec<JobRecord> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let q = JobQueue::new(QueuePolicy::default());
        q.enqueue("a", false);
        q.enqueue("b", true);
        assert_eq!(q.try_next().unwrap().campaign_id, "a");
        let b = q.try_next().unwrap();
        assert_eq!(b.campaign_id, "b");
        assert!(b.resume);
        assert!(q.try_next().is_none());
    }

    #[tokio::test]
    async fn test_next_wakes_on_enqueue() {
        let q = JobQueue::new(QueuePolicy::default());
        let q2 = Arc::clone(&q);
        let waiter = tokio::spawn(async move { q2.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.enqueue("woken", false);
        let job = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.campaign_id, "woken");
    }

    #[tokio::test]
    async fn test_failure_redelivers_with_backoff() {
        tokio::time::pause();
        let q = JobQueue::new(QueuePolicy {
            max_attempts: 2,
            backoff: Duration::from_secs(5),
            retention: 10,
        });
        q.enqueue("flaky", false);
        let job = q.try_next().unwrap();
        q.record_failure(&job, "boom");

        // Not redelivered before the backoff elapses
        tokio::task::yield_now().await;
        assert_eq!(q.pending(), 0);
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        let retry = q.try_next().expect("redelivered");
        assert_eq!(retry.attempt, 2);

        // Second failure is terminal
        q.record_failure(&retry, "boom again");
        tokio::time::advance(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(q.pending(), 0);
        let history = q.history();
        assert_eq!(history.len(), 1);
        assert!(matches!(history[0].outcome, JobOutcome::Failed(_)));
    }

    #[test]
    fn test_history_ring_is_bounded() {
        let q = JobQueue::new(QueuePolicy {
            retention: 3,
            ..QueuePolicy::default()
        });
        for i in 0..6 {
            let job = CadenceJob {
                campaign_id: format!("c{i}"),
                resume: false,
                attempt: 1,
                enqueued_at: Utc::now(),
            };
            q.record_success(&job);
        }
        let history = q.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].campaign_id, "c3");
    }
}
