//! Fire-and-forget notification client.
//!
//! Two outbound side-channels: cache revalidation per tenant, and root-job
//! completion. Both run on detached tasks with their own 10-second budget
//! and never surface errors to callers; an empty target URL is a silent
//! no-op. The detached task must not inherit the caller's cancellation
//! scope, otherwise a cancelled parent would lose its notification.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::jobs::JobEnvelope;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ApiClient {
    revalidation_url: String,
    job_completion_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(revalidation_url: &str, job_completion_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .context("failed to create notification HTTP client")?;

        Ok(Self {
            revalidation_url: revalidation_url.to_string(),
            job_completion_url: job_completion_url.to_string(),
            http,
        })
    }

    pub fn revalidation_url(&self) -> &str {
        &self.revalidation_url
    }

    pub fn job_completion_url(&self) -> &str {
        &self.job_completion_url
    }

    /// POST `{"userId": ...}` to the revalidation endpoint.
    pub fn notify_revalidation(&self, user_id: &str) {
        if self.revalidation_url.is_empty() || user_id.is_empty() {
            debug!(
                user_id = %user_id,
                "skipping revalidation notification: no target or no tenant"
            );
            return;
        }

        let url = self.revalidation_url.clone();
        let http = self.http.clone();
        let body = json!({ "userId": user_id });
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            match http.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(user_id = %user_id, "revalidation notification delivered");
                }
                Ok(resp) => {
                    warn!(user_id = %user_id, status = %resp.status(), "revalidation notification rejected");
                }
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "revalidation notification failed");
                }
            }
        });
    }

    /// POST `{"jobId", "userId", "organizationId"}` for a finished root.
    ///
    /// The tenant is pulled out of the root's stored payload leniently: a
    /// payload that no longer decodes must not block the notification.
    pub fn notify_job_completion(&self, job_id: Uuid, payload: Value) {
        if self.job_completion_url.is_empty() {
            return;
        }

        let url = self.job_completion_url.clone();
        let http = self.http.clone();

        tokio::spawn(async move {
            let (owner_id, organization_id) = match JobEnvelope::from_payload(&payload) {
                Ok(envelope) => envelope.tenant_hints(),
                Err(err) => {
                    warn!(job_id = %job_id, error = %err, "completion payload did not decode");
                    (String::new(), String::new())
                }
            };

            let body = json!({
                "jobId": job_id.to_string(),
                "userId": owner_id,
                "organizationId": organization_id,
            });

            match http.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(job_id = %job_id, "completion notification delivered");
                }
                Ok(resp) => {
                    warn!(job_id = %job_id, status = %resp.status(), "completion notification rejected");
                }
                Err(err) => {
                    warn!(job_id = %job_id, error = %err, "completion notification failed");
                }
            }
        });
    }
}
