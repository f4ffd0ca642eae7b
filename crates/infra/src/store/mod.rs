//! Campaign storage: the contact/job collaborators plus campaigns, results and
//! sample requests.
//!
//! Every write that touches a campaign's counters goes through one method that
//! holds the campaign row for its whole duration: [`CampaignStore::apply_result_update`]
//! (Postgres: a transaction with `SELECT … FOR UPDATE`, in memory: one write
//! lock). Lifecycle changes go through [`CampaignStore::transition_campaign`]
//! under the same lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use outreach_campaigns::{
    Campaign, Contact, DispatchResult, DispatchStatus, JobConfig, ResultUpdate, SampleRequest,
    UpdateEffect,
};
use outreach_core::{CampaignId, ContactId, DomainError, SampleRequestId};

pub mod in_memory;
pub mod postgres;

/// Store error.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Lifecycle change requested on a campaign.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Lifecycle {
    Start { at: DateTime<Utc> },
    Fail { at: DateTime<Utc> },
    Complete { at: DateTime<Utc> },
    Pause,
}

impl Lifecycle {
    pub fn apply(&self, campaign: &mut Campaign) -> Result<(), DomainError> {
        match *self {
            Lifecycle::Start { at } => campaign.start(at),
            Lifecycle::Fail { at } => campaign.fail(at),
            Lifecycle::Complete { at } => campaign.complete(at),
            Lifecycle::Pause => campaign.pause(),
        }
    }
}

/// Campaign before and after a committed lifecycle change.
#[derive(Debug, Clone)]
pub struct CampaignTransition {
    pub before: Campaign,
    pub after: Campaign,
}

/// Outcome of one committed result unit of work.
#[derive(Debug, Clone)]
pub struct AppliedUpdate {
    /// Row as it was before the merge; `None` if this call created it.
    pub before: Option<DispatchResult>,
    pub result: DispatchResult,
    pub effect: UpdateEffect,
    /// Campaign after counters were adjusted.
    pub campaign: Campaign,
}

impl AppliedUpdate {
    pub fn created_result(&self) -> bool {
        self.before.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResultQuery {
    pub status: Option<DispatchStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ResultQuery {
    pub const DEFAULT_PER_PAGE: u32 = 50;
    pub const MAX_PER_PAGE: u32 = 500;

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.per_page())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultPage {
    pub items: Vec<DispatchResult>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

/// Storage for everything the engine reads and writes.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn save_contact(&self, contact: Contact) -> Result<(), StoreError>;

    async fn contact(&self, id: ContactId) -> Result<Option<Contact>, StoreError>;

    /// Ids from `ids` with no contact record.
    async fn missing_contacts(&self, ids: &[ContactId]) -> Result<Vec<ContactId>, StoreError>;

    async fn save_job(&self, job: JobConfig) -> Result<(), StoreError>;

    async fn job(&self, name: &str) -> Result<Option<JobConfig>, StoreError>;

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), StoreError>;

    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError>;

    /// Apply a lifecycle change atomically. A refused change leaves the row as is
    /// and surfaces as `StoreError::Domain`.
    async fn transition_campaign(
        &self,
        id: CampaignId,
        change: Lifecycle,
    ) -> Result<CampaignTransition, StoreError>;

    /// Get the result row for the pair, creating it in `pending` if absent.
    /// Returns the row and whether it was created.
    async fn ensure_result(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<(DispatchResult, bool), StoreError>;

    /// One atomic unit of work: upsert the pending row, merge `update`, create
    /// a sample request if one is due, and fold the counter delta into the
    /// campaign.
    async fn apply_result_update(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        update: ResultUpdate,
    ) -> Result<AppliedUpdate, StoreError>;

    async fn list_results(
        &self,
        campaign_id: CampaignId,
        query: &ResultQuery,
    ) -> Result<ResultPage, StoreError>;

    async fn sample_request(&self, id: SampleRequestId)
    -> Result<Option<SampleRequest>, StoreError>;
}
