//! Outbound call dispatch to the voice provider over HTTP.
//!
//! One POST per call. HTTP 429 surfaces as `RateLimited` so the engine
//! can apply its single-shot backoff; everything else is a plain
//! dispatch failure attributed to the lead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use dialclaw_core::config::VoiceApiConfig;
use dialclaw_core::error::{DialClawError, Result};
use dialclaw_core::traits::{CallDispatcher, DispatchReceipt, LeadStore};
use dialclaw_core::types::Lead;

pub struct VoiceApiDispatcher {
    client: reqwest::Client,
    config: VoiceApiConfig,
    leads: Arc<dyn LeadStore>,
}

impl VoiceApiDispatcher {
    pub fn new(config: VoiceApiConfig, leads: Arc<dyn LeadStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            leads,
        }
    }

    async fn place_call(&self, lead: &Lead) -> Result<DispatchReceipt> {
        let phone_id = lead.phone_id.as_deref().ok_or_else(|| {
            DialClawError::Invalid(format!("lead {} has no phone id assigned", lead.id))
        })?;

        let payload = serde_json::json!({
            "assistantId": self.config.default_assistant_id,
            "assistantOverrides": {
                "variableValues": {
                    "Name": lead.name,
                    "Phone": lead.phone_number,
                },
                "metadata": { "contactId": lead.id },
            },
            "phoneNumberId": phone_id,
            "customer": {
                "name": lead.name,
                "number": lead.phone_number,
            },
        });

        let resp = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| DialClawError::Dispatch(format!("voice API request: {e}")))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(DialClawError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DialClawError::Dispatch(format!(
                "voice API {status}: {body}"
            )));
        }

        let raw: serde_json::Value = resp.json().await.unwrap_or_default();
        let provider_call_id = raw
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        tracing::info!(
            "📞 Call placed for lead {} (provider call {:?})",
            lead.id,
            provider_call_id
        );
        Ok(DispatchReceipt {
            provider_call_id,
            raw: Some(raw),
        })
    }
}

#[async_trait]
impl CallDispatcher for VoiceApiDispatcher {
    async fn trigger(&self, lead_id: &str) -> Result<DispatchReceipt> {
        let lead = self
            .leads
            .lead(lead_id)?
            .ok_or_else(|| DialClawError::NotFound(format!("lead {lead_id}")))?;
        self.place_call(&lead).await
    }

    async fn trigger_retry(&self, lead: &Lead) -> Result<DispatchReceipt> {
        self.place_call(lead).await
    }
}
