//! Cadence execution engine — one pass per (campaign, tick).
//!
//! A pass decides whether today is a valid cadence day, which time
//! window applies, how many attempts that slot still allows, which
//! leads are eligible, contacts them through the dispatcher, and
//! records exactly one progress row for the slot. Passes are serialized
//! per campaign by the persisted `execution_status` column plus the
//! in-process keyed guard; a pass that errors always restores the
//! campaign to idle before re-raising.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use dialclaw_core::config::CadenceConfig;
use dialclaw_core::error::{DialClawError, Result};
use dialclaw_core::traits::{
    ActivityStore, CallDispatcher, CampaignStore, CounterDeltas, LeadStore, ProgressStore,
    TemplateStore,
};
use dialclaw_core::types::{
    ActivityEntry, CadenceProgress, CadenceTemplate, Campaign, ExecutionStatus, Lead, LeadStatus,
};

use crate::day::cadence_day;
use crate::guard::ExecutionGuard;
use crate::slots::{attempt_quotas, pick_slot};

/// Everything the engine needs from persistence, as one bound.
pub trait EngineStore:
    LeadStore + CampaignStore + TemplateStore + ProgressStore + ActivityStore
{
}
impl<T> EngineStore for T where
    T: LeadStore + CampaignStore + TemplateStore + ProgressStore + ActivityStore
{
}

/// What one execution pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// A slot was assigned and the pass ran; `contacted` may be zero.
    Ran { day: u32, contacted: usize },
    /// The cadence is exhausted; the campaign was marked completed.
    Completed,
    /// Nothing to do this tick (not an error).
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pass holds this campaign right now.
    AlreadyExecuting,
    /// No template attached, or the attached template is gone.
    NoTemplate,
    /// No start (or resume) instant to count days from.
    NoStartDate,
    /// The template defines nothing for today's cadence day.
    NoDayConfig,
    /// Today's attempt budget is already spent.
    BudgetExhausted,
    /// No window is open with spare quota right now.
    NoOpenSlot,
}

pub struct CadenceEngine<S: EngineStore> {
    store: Arc<S>,
    dispatcher: Arc<dyn CallDispatcher>,
    guard: ExecutionGuard,
    config: CadenceConfig,
}

impl<S: EngineStore> CadenceEngine<S> {
    pub fn new(store: Arc<S>, dispatcher: Arc<dyn CallDispatcher>, config: CadenceConfig) -> Self {
        Self {
            store,
            dispatcher,
            guard: ExecutionGuard::new(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Normal entry point: day math counts from `cadence_start_date`.
    pub async fn execute_campaign_cadence(&self, campaign_id: &str) -> Result<PassOutcome> {
        self.execute(campaign_id, false).await
    }

    /// Resume entry point: day math re-bases on the resume instant and
    /// continues from the recorded resume day.
    pub async fn execute_resume_cadence(&self, campaign_id: &str) -> Result<PassOutcome> {
        self.execute(campaign_id, true).await
    }

    async fn execute(&self, campaign_id: &str, resume: bool) -> Result<PassOutcome> {
        let campaign = self
            .store
            .campaign(campaign_id)?
            .ok_or_else(|| DialClawError::NotFound(format!("campaign {campaign_id}")))?;

        // Re-entrancy: in-process keyed lock first, then the persisted
        // compare-and-set. Either losing means another pass is running.
        let Some(_token) = self.guard.try_acquire(campaign_id) else {
            tracing::debug!("Campaign {campaign_id} already executing (in-process), skipping");
            return Ok(PassOutcome::Skipped(SkipReason::AlreadyExecuting));
        };
        if !self.store.try_mark_executing(campaign_id)? {
            tracing::debug!("Campaign {campaign_id} already executing (persisted), skipping");
            return Ok(PassOutcome::Skipped(SkipReason::AlreadyExecuting));
        }

        let result = self.run_pass(&campaign, resume).await;

        // The campaign must never stay stuck in `executing`, success or not
        if let Err(e) = self
            .store
            .set_execution_status(campaign_id, ExecutionStatus::Idle)
        {
            tracing::error!("⚠️ Failed to reset execution status for {campaign_id}: {e}");
        }
        if let Err(e) = &result {
            tracing::error!("❌ Cadence pass for campaign {campaign_id} failed: {e}");
        }
        result
    }

    async fn run_pass(&self, campaign: &Campaign, resume: bool) -> Result<PassOutcome> {
        let Some(template_id) = campaign.cadence_template_id.as_deref() else {
            tracing::debug!("Campaign {} has no cadence template", campaign.id);
            return Ok(PassOutcome::Skipped(SkipReason::NoTemplate));
        };
        let Some(template) = self.store.template(template_id)? else {
            tracing::warn!("⚠️ Campaign {} references missing template {template_id}", campaign.id);
            return Ok(PassOutcome::Skipped(SkipReason::NoTemplate));
        };

        let first_execution = self.store.count(&campaign.id, &template.id, None)? == 0;
        let leads = self.select_leads(campaign, &template, first_execution)?;

        let mut contacted = 0usize;
        let mut slot_day = 0u32;
        let skip = 'slot: {
            // Day math: a resumed campaign counts from the resume
            // instant, offset by the day it was paused on.
            let (base, offset) = if resume {
                match (campaign.cadence_resume_from_date, campaign.cadence_resume_day) {
                    (Some(b), Some(d)) => (b, d),
                    _ => {
                        tracing::debug!("Campaign {} has no resume point", campaign.id);
                        break 'slot Some(SkipReason::NoStartDate);
                    }
                }
            } else {
                match campaign.cadence_start_date {
                    Some(b) => (b, 1),
                    None => {
                        tracing::debug!("Campaign {} cadence has not started", campaign.id);
                        break 'slot Some(SkipReason::NoStartDate);
                    }
                }
            };
            let now = Utc::now();
            let Some(day) = cadence_day(base, now, offset) else {
                break 'slot Some(SkipReason::NoStartDate);
            };
            let Some(day_config) = template.days.get(&day) else {
                tracing::debug!("No cadence config for day {day} on campaign {}", campaign.id);
                break 'slot Some(SkipReason::NoDayConfig);
            };

            let attempts_done = self.store.count(&campaign.id, &template.id, Some(day))?;
            if attempts_done >= day_config.attempts {
                tracing::debug!(
                    "Day {day} budget spent ({attempts_done}/{}) on campaign {}",
                    day_config.attempts,
                    campaign.id
                );
                break 'slot Some(SkipReason::BudgetExhausted);
            }

            let quotas = attempt_quotas(day_config.attempts, day_config.time_windows.len());
            let now_local = now.with_timezone(&self.config.timezone);
            let Some(slot) = pick_slot(&day_config.time_windows, &quotas, now_local, |win| {
                self.store
                    .count_for_window(&campaign.id, &template.id, day, win)
            })?
            else {
                tracing::debug!("No open slot with capacity for campaign {}", campaign.id);
                break 'slot Some(SkipReason::NoOpenSlot);
            };

            slot_day = day;
            tracing::info!(
                "📆 Campaign {} day {day} slot {slot}: attempt {} of {}, {} lead(s) eligible",
                campaign.id,
                attempts_done + 1,
                day_config.attempts,
                leads.len()
            );

            for (i, lead) in leads.iter().enumerate() {
                self.contact_lead(campaign, lead, first_execution).await?;
                contacted += 1;
                if i + 1 < leads.len() {
                    // Pacing: avoid flooding the voice provider
                    tokio::time::sleep(Duration::from_millis(self.config.pacing_ms)).await;
                }
            }

            // Exactly one ledger row per executed slot, even with zero
            // contactable leads. The unique slot key absorbs duplicates.
            let written = self.store.insert_if_absent(&CadenceProgress {
                campaign_id: campaign.id.clone(),
                cadence_id: template.id.clone(),
                day,
                attempt: attempts_done + 1,
                time_window: slot.to_string(),
                executed_at: now,
            })?;
            if !written {
                tracing::warn!(
                    "Slot (day {day}, {slot}, attempt {}) already recorded for campaign {}",
                    attempts_done + 1,
                    campaign.id
                );
            }

            if contacted > 0 {
                return Ok(PassOutcome::Ran { day, contacted });
            }
            None
        };

        // Zero contact attempts: the cadence may simply be over. The
        // campaign is complete once the last configured day has burned
        // its whole budget.
        if self.cadence_exhausted(&campaign.id, &template)? {
            self.store.mark_cadence_completed(&campaign.id)?;
            tracing::info!("🏁 Cadence completed for campaign {}", campaign.id);
            return Ok(PassOutcome::Completed);
        }

        match skip {
            Some(reason) => Ok(PassOutcome::Skipped(reason)),
            // Slot executed but nobody was contactable
            None => Ok(PassOutcome::Ran { day: slot_day, contacted }),
        }
    }

    /// First-ever execution works the Pending pool; later passes work
    /// the retry-disposition pool. Order is stable and each lead
    /// appears at most once per pass.
    fn select_leads(
        &self,
        campaign: &Campaign,
        template: &CadenceTemplate,
        first_execution: bool,
    ) -> Result<Vec<Lead>> {
        let mut leads = if first_execution {
            self.store.leads_by_status(&campaign.id, LeadStatus::Pending)?
        } else {
            self.store
                .leads_by_disposition(&campaign.id, &template.retry_dispositions)?
        };
        let mut seen = HashSet::with_capacity(leads.len());
        leads.retain(|l| seen.insert(l.id.clone()));
        Ok(leads)
    }

    /// Dispatch one lead and record the outcome. Rate limits get one
    /// fixed-backoff retry; any final failure marks the lead Failed and
    /// lets the pass continue. Storage errors propagate.
    async fn contact_lead(
        &self,
        campaign: &Campaign,
        lead: &Lead,
        first_execution: bool,
    ) -> Result<()> {
        let mut outcome = if first_execution {
            self.dispatcher.trigger(&lead.id).await
        } else {
            self.dispatcher.trigger_retry(lead).await
        };

        if matches!(&outcome, Err(e) if e.is_rate_limit()) {
            tracing::warn!(
                "⏳ Rate limited on lead {}, retrying once in {}s",
                lead.id,
                self.config.rate_limit_backoff_secs
            );
            tokio::time::sleep(Duration::from_secs(self.config.rate_limit_backoff_secs)).await;
            outcome = if first_execution {
                self.dispatcher.trigger(&lead.id).await
            } else {
                self.dispatcher.trigger_retry(lead).await
            };
        }

        match outcome {
            Ok(_receipt) => {
                if lead.status == LeadStatus::InProgress {
                    // Already counted by a prior slot; don't double count
                    tracing::debug!("Lead {} already in progress", lead.id);
                    return Ok(());
                }
                self.store.record_contact_outcome(
                    &lead.id,
                    LeadStatus::InProgress,
                    "Call initiated",
                    transition_deltas(lead.status, LeadStatus::InProgress),
                )
            }
            Err(e) => {
                tracing::warn!("☎️ Call dispatch failed for lead {}: {e}", lead.id);
                let disposition = format!("API Error: {e}");
                self.store.record_contact_outcome(
                    &lead.id,
                    LeadStatus::Failed,
                    &disposition,
                    transition_deltas(lead.status, LeadStatus::Failed),
                )?;
                self.store.record(&ActivityEntry {
                    lead_id: lead.id.clone(),
                    campaign_id: campaign.id.clone(),
                    activity_type: "CALL_ATTEMPT".into(),
                    to_disposition: disposition,
                    created_at: Utc::now(),
                })
            }
        }
    }

    /// The sole normal termination condition: the latest ledger row on
    /// the template's last configured day has reached that day's budget.
    fn cadence_exhausted(&self, campaign_id: &str, template: &CadenceTemplate) -> Result<bool> {
        let Some(last_day) = template.last_day() else {
            return Ok(false);
        };
        let budget = template.days[&last_day].attempts;
        let latest_attempt = self
            .store
            .find_latest(campaign_id, &template.id, Some(last_day))?
            .map(|r| r.attempt)
            .unwrap_or(0);
        Ok(latest_attempt >= budget)
    }

    // ─── Pause / resume ──────────────────────────────────────

    /// User-initiated stop: record where to pick back up, flag the
    /// campaign out of trigger scans. An in-flight pass is not
    /// interrupted; it just won't be rescheduled.
    pub fn stop_cadence(&self, campaign_id: &str) -> Result<()> {
        let campaign = self
            .store
            .campaign(campaign_id)?
            .ok_or_else(|| DialClawError::NotFound(format!("campaign {campaign_id}")))?;
        let template_id = campaign.cadence_template_id.as_deref().ok_or_else(|| {
            DialClawError::Invalid(format!("campaign {campaign_id} has no cadence attached"))
        })?;
        let resume_day = self
            .store
            .find_latest(campaign_id, template_id, None)?
            .map(|r| r.day)
            .unwrap_or(1);
        self.store.mark_cadence_stopped(campaign_id, resume_day)?;
        tracing::info!("⏸️ Cadence stopped for campaign {campaign_id} (resume day {resume_day})");
        Ok(())
    }

    /// Clear the stop; day math re-bases on now so the elapsed-time
    /// clock doesn't silently burn days that were spent paused.
    pub fn resume_cadence(&self, campaign_id: &str) -> Result<()> {
        let campaign = self
            .store
            .campaign(campaign_id)?
            .ok_or_else(|| DialClawError::NotFound(format!("campaign {campaign_id}")))?;
        if !campaign.cadence_stopped {
            return Err(DialClawError::Invalid(format!(
                "campaign {campaign_id} is not stopped"
            )));
        }
        self.store.mark_cadence_resumed(campaign_id)?;
        tracing::info!("▶️ Cadence resumed for campaign {campaign_id}");
        Ok(())
    }
}

/// Counter deltas for moving a lead between status buckets: decrement
/// the old bucket, increment the new one. Identical buckets cancel out,
/// which is what keeps the sum invariant intact.
pub fn transition_deltas(from: LeadStatus, to: LeadStatus) -> CounterDeltas {
    let mut d = CounterDeltas::default();
    let bucket = |d: &mut CounterDeltas, status: LeadStatus, amount: i64| match status {
        LeadStatus::Pending => d.remaining += amount,
        LeadStatus::InProgress => d.in_progress += amount,
        LeadStatus::Completed => d.completed += amount,
        LeadStatus::Failed => d.failed += amount,
    };
    bucket(&mut d, from, -1);
    bucket(&mut d, to, 1);
    d
}
