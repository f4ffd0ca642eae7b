//! Campaign engine façade: creation, lifecycle, status queries and callbacks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use outreach_campaigns::{
    Campaign, CampaignCounters, CampaignDefinition, CampaignStatus, SampleRequest, SetupFault,
};
use outreach_core::{CampaignId, DomainError, SampleRequestId};
use outreach_events::{Actor, AuditAction, AuditEvent, AuditRecorder};

use crate::audit;
use crate::dispatch::{DispatchConfig, DispatchHandle, DispatchWorker};
use crate::outbound::OutboundCaller;
use crate::reconciler::{ReconcileReport, ResultReconciler};
use crate::store::{CampaignStore, CampaignTransition, Lifecycle, ResultPage, ResultQuery, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("setup fault: {0}")]
    SetupFault(#[from] SetupFault),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("{0}")]
    Worker(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CampaignNotFound(id) => EngineError::NotFound(format!("campaign {id}")),
            StoreError::Domain(domain) => domain.into(),
            other => EngineError::Store(other),
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        if !err.is_client_error() {
            tracing::error!(error = %err, "campaign invariant violated");
        }
        match err {
            DomainError::Conflict(msg) => EngineError::Conflict(msg),
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                EngineError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => EngineError::Conflict(msg),
        }
    }
}

/// Polled progress snapshot of one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignStatusView {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    pub progress: CampaignCounters,
    pub execution_start_time: Option<DateTime<Utc>>,
    pub execution_end_time: Option<DateTime<Utc>>,
}

impl From<&Campaign> for CampaignStatusView {
    fn from(campaign: &Campaign) -> Self {
        Self {
            campaign_id: campaign.id(),
            status: campaign.status(),
            progress: campaign.counters(),
            execution_start_time: campaign.started_at(),
            execution_end_time: campaign.ended_at(),
        }
    }
}

/// Entry point used by the HTTP layer.
pub struct CampaignEngine {
    store: Arc<dyn CampaignStore>,
    outbound: Arc<dyn OutboundCaller>,
    audit: Arc<dyn AuditRecorder>,
    reconciler: ResultReconciler,
    dispatch: DispatchConfig,
    shutdown: watch::Sender<bool>,
}

impl CampaignEngine {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        outbound: Arc<dyn OutboundCaller>,
        audit: Arc<dyn AuditRecorder>,
        dispatch: DispatchConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            reconciler: ResultReconciler::new(store.clone(), audit.clone()),
            store,
            outbound,
            audit,
            dispatch,
            shutdown,
        }
    }

    pub fn store(&self) -> &Arc<dyn CampaignStore> {
        &self.store
    }

    pub fn audit(&self) -> &Arc<dyn AuditRecorder> {
        &self.audit
    }

    /// Create a draft campaign. Referenced contacts must exist and the job must
    /// be known and active; an empty contact list is accepted here and fails
    /// at start.
    #[instrument(skip(self, definition), fields(name = %definition.name), err)]
    pub async fn create_campaign(
        &self,
        definition: CampaignDefinition,
    ) -> Result<Campaign, EngineError> {
        let campaign = Campaign::new(definition, Utc::now())?;

        match self.store.job(campaign.job_name()).await? {
            None => {
                return Err(EngineError::Validation(format!(
                    "unknown job: {}",
                    campaign.job_name()
                )));
            }
            Some(job) if !job.is_active => {
                return Err(EngineError::Validation(format!("job is inactive: {}", job.name)));
            }
            Some(_) => {}
        }

        let missing = self.store.missing_contacts(campaign.contact_ids()).await?;
        if let Some(first) = missing.first() {
            return Err(EngineError::Validation(format!(
                "{} unknown contact(s), first: {first}",
                missing.len()
            )));
        }

        self.store.insert_campaign(&campaign).await?;
        let actor = Actor::Api(campaign.definition().created_by.clone());
        audit::emit(self.audit.as_ref(), [audit::campaign_created(actor, &campaign)]);
        info!(campaign_id = %campaign.id(), contacts = campaign.contact_ids().len(), "campaign created");
        Ok(campaign)
    }

    pub async fn campaign(&self, id: CampaignId) -> Result<Campaign, EngineError> {
        self.store
            .campaign(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("campaign {id}")))
    }

    /// `draft → running`, setup checks, then spawn the dispatch worker.
    ///
    /// A setup fault moves the campaign to `failed` before any contact is
    /// touched and is returned as `EngineError::SetupFault`.
    #[instrument(skip(self, actor), fields(campaign_id = %id), err)]
    pub async fn start_campaign(
        &self,
        id: CampaignId,
        actor: Actor,
    ) -> Result<DispatchHandle, EngineError> {
        let started = self
            .store
            .transition_campaign(id, Lifecycle::Start { at: Utc::now() })
            .await?;
        audit::emit(
            self.audit.as_ref(),
            [audit::campaign_transition(actor.clone(), AuditAction::CampaignStarted, &started)],
        );

        let job = match self.store.job(started.after.job_name()).await {
            Ok(job) => job,
            Err(e) => {
                warn!(campaign_id = %id, error = %e, "job lookup failed after start");
                let detail = serde_json::json!({ "error": e.to_string() });
                self.mark_failed(id, actor, detail).await;
                return Err(e.into());
            }
        };
        let job = match (started.after.check_setup(job.as_ref()), job) {
            (Ok(()), Some(job)) => job,
            (Err(fault), _) => return Err(self.fail_setup(id, actor, fault).await),
            (Ok(()), None) => {
                let fault = SetupFault::JobNotFound(started.after.job_name().to_string());
                return Err(self.fail_setup(id, actor, fault).await);
            }
        };

        let worker = DispatchWorker {
            store: self.store.clone(),
            outbound: self.outbound.clone(),
            audit: self.audit.clone(),
            config: self.dispatch.clone(),
            shutdown: self.shutdown.subscribe(),
        };
        info!(job = %job.name, contacts = started.after.contact_ids().len(), "campaign running");
        Ok(worker.spawn(started.after, job))
    }

    async fn fail_setup(&self, id: CampaignId, actor: Actor, fault: SetupFault) -> EngineError {
        warn!(campaign_id = %id, fault = %fault, "campaign setup failed");
        self.mark_failed(id, actor, serde_json::json!({ "fault": audit::snapshot(&fault) }))
            .await;
        EngineError::SetupFault(fault)
    }

    /// `running → failed` for a campaign whose worker never starts.
    async fn mark_failed(&self, id: CampaignId, actor: Actor, reason: JsonValue) {
        match self
            .store
            .transition_campaign(id, Lifecycle::Fail { at: Utc::now() })
            .await
        {
            Ok(failed) => audit::emit(
                self.audit.as_ref(),
                [start_failed_event(actor, &failed, reason)],
            ),
            Err(e) => warn!(campaign_id = %id, error = %e, "could not mark campaign failed"),
        }
    }

    /// `running → paused`. An in-flight call finishes; no further contacts are
    /// dispatched.
    #[instrument(skip(self, actor), fields(campaign_id = %id), err)]
    pub async fn pause_campaign(&self, id: CampaignId, actor: Actor) -> Result<Campaign, EngineError> {
        let paused = self.store.transition_campaign(id, Lifecycle::Pause).await?;
        audit::emit(
            self.audit.as_ref(),
            [audit::campaign_transition(actor, AuditAction::CampaignPaused, &paused)],
        );
        Ok(paused.after)
    }

    pub async fn status(&self, id: CampaignId) -> Result<CampaignStatusView, EngineError> {
        Ok(CampaignStatusView::from(&self.campaign(id).await?))
    }

    pub async fn results(
        &self,
        id: CampaignId,
        query: &ResultQuery,
    ) -> Result<ResultPage, EngineError> {
        Ok(self.store.list_results(id, query).await?)
    }

    pub async fn sample_request(&self, id: SampleRequestId) -> Result<SampleRequest, EngineError> {
        self.store
            .sample_request(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("sample request {id}")))
    }

    pub async fn reconcile(&self, body: &JsonValue) -> Result<ReconcileReport, EngineError> {
        self.reconciler.reconcile(body).await
    }

    /// Most recent callback activity, newest first.
    pub fn recent_callbacks(&self, limit: usize) -> Vec<AuditEvent> {
        let mut events = self.audit.recent(AuditAction::CallbackReceived, limit);
        events.extend(self.audit.recent(AuditAction::CallbackSkipped, limit));
        events.sort_by_key(|e| std::cmp::Reverse(e.occurred_at()));
        events.truncate(limit);
        events
    }

    /// Ask every dispatch worker to stop before its next contact.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

fn start_failed_event(actor: Actor, transition: &CampaignTransition, reason: JsonValue) -> AuditEvent {
    let mut after = serde_json::json!({ "progress": audit::snapshot(&transition.after.progress()) });
    if let (JsonValue::Object(after), JsonValue::Object(reason)) = (&mut after, reason) {
        after.extend(reason);
    }
    AuditEvent::new(actor, AuditAction::CampaignFailed, audit::CAMPAIGNS)
        .subject(transition.after.id())
        .before(audit::snapshot(&transition.before.progress()))
        .after(after)
}
