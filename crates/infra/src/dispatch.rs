//! Campaign dispatch worker.
//!
//! One tokio task per started campaign walks the frozen contact list once, in
//! order, making one outbound call per contact followed by the fixed delay.
//! Before each contact it re-reads the campaign status (a pause stops it) and
//! checks the process shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use outreach_campaigns::{Campaign, CampaignStatus, DispatchStatus, JobConfig, ResultUpdate};
use outreach_core::{CampaignId, ContactId};
use outreach_events::{Actor, AuditAction, AuditEvent, AuditRecorder};

use crate::audit;
use crate::engine::EngineError;
use crate::outbound::{CallOutcome, OutboundCaller};
use crate::store::{AppliedUpdate, CampaignStore, Lifecycle, StoreError};

/// Dispatch worker configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Pause between two outbound calls.
    pub delay: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            name: "campaign-dispatch".to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

}

/// Why a worker stopped before reaching the end of the contact list.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The campaign left `running` (paused).
    NotRunning,
    Shutdown,
    CampaignGone,
}

/// Summary of one worker run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub campaign_id: CampaignId,
    pub attempted: usize,
    /// Calls the endpoint acknowledged.
    pub sent: usize,
    /// Calls that failed (or contacts that could not be dispatched).
    pub failed: usize,
    /// Writes rejected because a callback already settled the row.
    pub superseded: usize,
    pub final_status: Option<CampaignStatus>,
    pub stopped: Option<StopReason>,
}

impl DispatchReport {
    fn new(campaign_id: CampaignId) -> Self {
        Self {
            campaign_id,
            attempted: 0,
            sent: 0,
            failed: 0,
            superseded: 0,
            final_status: None,
            stopped: None,
        }
    }
}

/// Handle to a running worker. Dropping it detaches the worker.
#[derive(Debug)]
pub struct DispatchHandle {
    campaign_id: CampaignId,
    join: JoinHandle<DispatchReport>,
}

impl DispatchHandle {
    pub fn campaign_id(&self) -> CampaignId {
        self.campaign_id
    }

    /// Wait for the worker to finish and return its report.
    pub async fn wait(self) -> Result<DispatchReport, EngineError> {
        self.join
            .await
            .map_err(|e| EngineError::Worker(format!("dispatch worker failed: {e}")))
    }
}

pub(crate) struct DispatchWorker {
    pub(crate) store: Arc<dyn CampaignStore>,
    pub(crate) outbound: Arc<dyn OutboundCaller>,
    pub(crate) audit: Arc<dyn AuditRecorder>,
    pub(crate) config: DispatchConfig,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl DispatchWorker {
    pub(crate) fn spawn(self, campaign: Campaign, job: JobConfig) -> DispatchHandle {
        let campaign_id = campaign.id();
        let span = info_span!(
            "dispatch",
            worker = %self.config.name,
            campaign_id = %campaign_id,
            job = %job.name
        );
        let join = tokio::spawn(self.run(campaign, job).instrument(span));
        DispatchHandle { campaign_id, join }
    }

    async fn run(mut self, campaign: Campaign, job: JobConfig) -> DispatchReport {
        let campaign_id = campaign.id();
        let contacts = campaign.contact_ids().to_vec();
        let mut report = DispatchReport::new(campaign_id);
        info!(contacts = contacts.len(), "dispatch started");

        for contact_id in contacts.iter().copied() {
            // A dropped engine counts as shutdown.
            if *self.shutdown.borrow() || self.shutdown.has_changed().is_err() {
                report.stopped = Some(StopReason::Shutdown);
                break;
            }
            match self.store.campaign(campaign_id).await {
                Ok(Some(current)) if current.status() == CampaignStatus::Running => {}
                Ok(Some(current)) => {
                    info!(status = %current.status(), "campaign no longer running, stopping");
                    report.stopped = Some(StopReason::NotRunning);
                    break;
                }
                Ok(None) => {
                    report.stopped = Some(StopReason::CampaignGone);
                    break;
                }
                Err(e) => warn!(error = %e, "could not re-read campaign status, continuing"),
            }

            report.attempted += 1;
            match self.dispatch_one(&campaign, &job, contact_id).await {
                Ok((call_succeeded, applied)) => {
                    if call_succeeded {
                        report.sent += 1;
                    } else {
                        report.failed += 1;
                    }
                    if applied.effect.outcome.is_rejected() {
                        report.superseded += 1;
                    }
                    audit::emit(self.audit.as_ref(), audit::result_update(&Actor::Dispatcher, &applied));
                }
                Err(e) => {
                    report.failed += 1;
                    self.record_fault(campaign_id, contact_id, &e).await;
                }
            }

            if !self.config.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.delay) => {}
                    changed = self.shutdown.changed() => {
                        if changed.is_err() {
                            debug!("engine dropped, stopping");
                            report.stopped = Some(StopReason::Shutdown);
                            break;
                        }
                    }
                }
            }
        }

        report.final_status = self.finish(campaign_id, report.stopped).await;
        info!(
            attempted = report.attempted,
            sent = report.sent,
            failed = report.failed,
            superseded = report.superseded,
            final_status = ?report.final_status,
            stopped = ?report.stopped,
            "dispatch finished"
        );
        report
    }

    /// Steps (a)-(e) for one contact. Returns whether the call succeeded.
    async fn dispatch_one(
        &self,
        campaign: &Campaign,
        job: &JobConfig,
        contact_id: ContactId,
    ) -> Result<(bool, AppliedUpdate), StoreError> {
        let (result, created) = self.store.ensure_result(campaign.id(), contact_id).await?;
        if created {
            debug!(contact_id = %contact_id, result_id = %result.id, "pending result created");
            audit::emit(
                self.audit.as_ref(),
                [AuditEvent::new(Actor::Dispatcher, AuditAction::ResultCreated, audit::RESULTS)
                    .subject(result.id)
                    .after(audit::snapshot(&result))],
            );
        }

        let update = match self.store.contact(contact_id).await {
            Ok(Some(contact)) => {
                let payload = json!({
                    "campaign_id": campaign.id(),
                    "contact_id": contact_id,
                    "result_id": result.id,
                    "contact_data": contact.profile(),
                    "campaign_settings": campaign.settings(),
                });
                let outcome = self.outbound.call(job, &payload).await;
                outcome_to_update(outcome)
            }
            Ok(None) => ResultUpdate::new(DispatchStatus::Failed).with_error("contact not found"),
            Err(e) => ResultUpdate::new(DispatchStatus::Failed)
                .with_error(format!("contact lookup failed: {e}")),
        };

        let call_succeeded = update.status == DispatchStatus::Sent;
        if !call_succeeded {
            warn!(
                contact_id = %contact_id,
                error = update.error_message.as_deref().unwrap_or_default(),
                "dispatch failed for contact"
            );
        }

        let applied = self
            .store
            .apply_result_update(campaign.id(), contact_id, update)
            .await?;
        Ok((call_succeeded, applied))
    }

    /// Store trouble for one contact: record it as a failed result if possible.
    async fn record_fault(&self, campaign_id: CampaignId, contact_id: ContactId, err: &StoreError) {
        warn!(contact_id = %contact_id, error = %err, "dispatch step failed");
        let update =
            ResultUpdate::new(DispatchStatus::Failed).with_error(format!("dispatch error: {err}"));
        match self
            .store
            .apply_result_update(campaign_id, contact_id, update)
            .await
        {
            Ok(applied) => {
                audit::emit(self.audit.as_ref(), audit::result_update(&Actor::Dispatcher, &applied))
            }
            Err(e) => error!(contact_id = %contact_id, error = %e, "could not record dispatch failure"),
        }
    }

    async fn finish(
        &self,
        campaign_id: CampaignId,
        stopped: Option<StopReason>,
    ) -> Option<CampaignStatus> {
        if stopped.is_none() {
            match self
                .store
                .transition_campaign(campaign_id, Lifecycle::Complete { at: Utc::now() })
                .await
            {
                Ok(transition) => {
                    audit::emit(
                        self.audit.as_ref(),
                        [audit::campaign_transition(
                            Actor::Dispatcher,
                            AuditAction::CampaignCompleted,
                            &transition,
                        )],
                    );
                    return Some(transition.after.status());
                }
                Err(e) => warn!(error = %e, "could not complete campaign"),
            }
        }

        match self.store.campaign(campaign_id).await {
            Ok(campaign) => campaign.map(|c| c.status()),
            Err(e) => {
                warn!(error = %e, "could not read final campaign status");
                None
            }
        }
    }
}

fn outcome_to_update(outcome: CallOutcome) -> ResultUpdate {
    match outcome {
        CallOutcome::Success { body, .. } => {
            ResultUpdate::new(DispatchStatus::Sent).with_external_response(body)
        }
        other => {
            let detail = other.error_detail().unwrap_or_default();
            ResultUpdate::new(DispatchStatus::Failed).with_error(detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_maps_to_sent_with_response() {
        let update = outcome_to_update(CallOutcome::Success {
            status: 200,
            body: json!({"execution": "abc"}),
        });
        assert_eq!(update.status, DispatchStatus::Sent);
        assert_eq!(update.external_response, Some(json!({"execution": "abc"})));
        assert!(update.error_message.is_none());
    }

    #[test]
    fn failures_map_to_failed_with_detail() {
        let remote = outcome_to_update(CallOutcome::RemoteError {
            status: 404,
            body: "no such scenario".into(),
        });
        assert_eq!(remote.status, DispatchStatus::Failed);
        assert_eq!(remote.error_message.as_deref(), Some("HTTP 404: no such scenario"));

        let transport = outcome_to_update(CallOutcome::TransportError {
            description: "connection refused".into(),
        });
        assert_eq!(transport.error_message.as_deref(), Some("connection refused"));
    }
}
