//! Domain types — campaigns, leads, cadence templates, progress records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lead contact status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Pending => "Pending",
            LeadStatus::InProgress => "In Progress",
            LeadStatus::Completed => "Completed",
            LeadStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "In Progress" | "InProgress" => LeadStatus::InProgress,
            "Completed" => LeadStatus::Completed,
            "Failed" => LeadStatus::Failed,
            _ => LeadStatus::Pending,
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contact record owned by a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub campaign_id: String,
    pub name: String,
    pub phone_number: String,
    /// Provider-side phone line id used to place the call.
    pub phone_id: Option<String>,
    pub status: LeadStatus,
    /// Categorized outcome of the last contact attempt ("No Answer",
    /// "Not Interested", "Call initiated"...).
    pub disposition: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Campaign execution status — prevents concurrent passes per campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Idle,
    Executing,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Idle => "idle",
            ExecutionStatus::Executing => "executing",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "executing" {
            ExecutionStatus::Executing
        } else {
            ExecutionStatus::Idle
        }
    }
}

/// Aggregate lead counters carried on a campaign.
///
/// Invariant: `completed + in_progress + remaining + failed == leads_count`.
/// Every counter mutation goes through the store in the same transaction
/// as the lead status write; `reconcile` recomputes from lead rows to
/// self-heal any drift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignCounters {
    pub leads_count: i64,
    pub completed: i64,
    pub in_progress: i64,
    pub remaining: i64,
    pub failed: i64,
}

impl CampaignCounters {
    /// Check the counter-sum invariant.
    pub fn balanced(&self) -> bool {
        self.completed + self.in_progress + self.remaining + self.failed == self.leads_count
    }
}

/// An outbound-contact campaign with an optional attached cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub status: String,
    pub counters: CampaignCounters,
    pub execution_status: ExecutionStatus,
    pub cadence_template_id: Option<String>,
    pub cadence_start_date: Option<DateTime<Utc>>,
    pub cadence_stopped: bool,
    pub cadence_completed: bool,
    pub cadence_paused_at: Option<DateTime<Utc>>,
    pub cadence_resume_from_date: Option<DateTime<Utc>>,
    /// Cadence day to re-base the counter to after a resume.
    pub cadence_resume_day: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Whether the next execution pass should run in resume mode
    /// (day math re-based on `cadence_resume_from_date`).
    pub fn is_resumed(&self) -> bool {
        self.cadence_resume_from_date.is_some() && self.cadence_resume_day.is_some()
    }
}

/// Per-day schedule: how many attempts, spread over which windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayConfig {
    /// Attempt budget for the day (≥ 1).
    pub attempts: u32,
    /// Ordered time windows, "9:00AM-12:30PM" or "09:00-12:30".
    pub time_windows: Vec<String>,
}

/// Reusable multi-day retry schedule.
///
/// `days` is keyed by 1-based cadence-day number; day numbers may be
/// sparse (a template need not define every day up to its max).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceTemplate {
    pub id: String,
    pub name: String,
    /// Dispositions that make a lead eligible for a retry pass.
    pub retry_dispositions: Vec<String>,
    pub days: BTreeMap<u32, DayConfig>,
    pub created_at: DateTime<Utc>,
}

impl CadenceTemplate {
    pub fn new(name: &str, retry_dispositions: Vec<String>, days: BTreeMap<u32, DayConfig>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            retry_dispositions,
            days,
            created_at: Utc::now(),
        }
    }

    /// Highest configured day number, if any day is configured at all.
    pub fn last_day(&self) -> Option<u32> {
        self.days.keys().next_back().copied()
    }
}

/// Append-only record of one executed cadence slot.
///
/// The (campaign, cadence, day, time_window, attempt) tuple is the
/// idempotency key: inserting a duplicate is a no-op at the store level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceProgress {
    pub campaign_id: String,
    pub cadence_id: String,
    pub day: u32,
    /// 1-based attempt ordinal within the day.
    pub attempt: u32,
    pub time_window: String,
    pub executed_at: DateTime<Utc>,
}

/// Activity log entry written when a contact attempt fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub lead_id: String,
    pub campaign_id: String,
    /// "CALL_ATTEMPT" for dispatch outcomes.
    pub activity_type: String,
    pub to_disposition: String,
    pub created_at: DateTime<Utc>,
}
