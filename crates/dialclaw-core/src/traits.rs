//! Collaborator traits — the seams between the cadence engine and its
//! surroundings (persistence, outbound call dispatch).
//!
//! Store traits are synchronous: the SQLite backend does blocking reads
//! and writes and the engine treats them as such. Only the dispatcher
//! is async (it crosses the network).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    ActivityEntry, CadenceProgress, CadenceTemplate, Campaign, CampaignCounters, ExecutionStatus,
    Lead, LeadStatus,
};

/// Lead lookup and mutation.
pub trait LeadStore: Send + Sync {
    fn lead(&self, lead_id: &str) -> Result<Option<Lead>>;

    /// Leads of a campaign in a given status, most-recently-created
    /// first, tie-broken by id descending.
    fn leads_by_status(&self, campaign_id: &str, status: LeadStatus) -> Result<Vec<Lead>>;

    /// Leads of a campaign whose disposition is in `dispositions`,
    /// same ordering as `leads_by_status`.
    fn leads_by_disposition(&self, campaign_id: &str, dispositions: &[String])
    -> Result<Vec<Lead>>;

    /// Update a lead's status and disposition, and apply the paired
    /// campaign counter deltas, in one transaction.
    fn record_contact_outcome(
        &self,
        lead_id: &str,
        status: LeadStatus,
        disposition: &str,
        counter_deltas: CounterDeltas,
    ) -> Result<()>;
}

/// Signed adjustments applied to a campaign's counters together with a
/// lead status write. Positive increments, negative decrements.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterDeltas {
    pub completed: i64,
    pub in_progress: i64,
    pub remaining: i64,
    pub failed: i64,
}

/// Campaign cadence-field reads and writes.
pub trait CampaignStore: Send + Sync {
    fn campaign(&self, campaign_id: &str) -> Result<Option<Campaign>>;

    /// Campaigns eligible for a trigger scan: cadence attached, not
    /// stopped, not completed, start date in the past, currently idle.
    fn cadence_candidates(&self) -> Result<Vec<Campaign>>;

    fn set_execution_status(&self, campaign_id: &str, status: ExecutionStatus) -> Result<()>;

    /// Compare-and-set: Idle → Executing. Returns false when the
    /// campaign was already executing (the caller must skip).
    fn try_mark_executing(&self, campaign_id: &str) -> Result<bool>;

    fn mark_cadence_completed(&self, campaign_id: &str) -> Result<()>;

    /// Record a user-initiated stop: resume day, paused-at, stopped flag.
    fn mark_cadence_stopped(&self, campaign_id: &str, resume_day: u32) -> Result<()>;

    /// Clear the stop and re-base day math on the resume instant.
    fn mark_cadence_resumed(&self, campaign_id: &str) -> Result<()>;

    /// Recompute counters from actual lead rows (self-healing).
    fn reconcile_counters(&self, campaign_id: &str) -> Result<CampaignCounters>;
}

/// Cadence template lookup.
pub trait TemplateStore: Send + Sync {
    fn template(&self, template_id: &str) -> Result<Option<CadenceTemplate>>;
}

/// The append-only progress ledger.
pub trait ProgressStore: Send + Sync {
    /// Count recorded slots for (campaign, cadence), optionally
    /// restricted to one day.
    fn count(&self, campaign_id: &str, cadence_id: &str, day: Option<u32>) -> Result<u32>;

    /// Latest record for (campaign, cadence), optionally restricted to
    /// one day, by executed_at descending.
    fn find_latest(
        &self,
        campaign_id: &str,
        cadence_id: &str,
        day: Option<u32>,
    ) -> Result<Option<CadenceProgress>>;

    /// Count recorded attempts for one (day, time_window) pair.
    fn count_for_window(
        &self,
        campaign_id: &str,
        cadence_id: &str,
        day: u32,
        time_window: &str,
    ) -> Result<u32>;

    /// Insert unless an identical (campaign, cadence, day, window,
    /// attempt) row already exists. Returns true when a row was written.
    fn insert_if_absent(&self, record: &CadenceProgress) -> Result<bool>;
}

/// Lead activity logging (failed contact attempts and the like).
pub trait ActivityStore: Send + Sync {
    fn record(&self, entry: &ActivityEntry) -> Result<()>;
}

/// Raw response from the call provider, passed through for logging.
#[derive(Debug, Clone, Default)]
pub struct DispatchReceipt {
    pub provider_call_id: Option<String>,
    pub raw: Option<serde_json::Value>,
}

/// Outbound call dispatch to the voice provider.
///
/// Both methods must surface rate limiting as
/// `DialClawError::RateLimited` so the engine can apply its one-shot
/// backoff; every other failure is `DialClawError::Dispatch`.
#[async_trait]
pub trait CallDispatcher: Send + Sync {
    /// Direct call path — used on a campaign's first-ever cadence pass.
    async fn trigger(&self, lead_id: &str) -> Result<DispatchReceipt>;

    /// Cadence retry path — the caller is responsible for moving the
    /// lead back into in-progress accounting.
    async fn trigger_retry(&self, lead: &Lead) -> Result<DispatchReceipt>;
}
