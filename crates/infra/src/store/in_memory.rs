use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use outreach_campaigns::{
    Campaign, Contact, DispatchResult, JobConfig, ResultUpdate, SampleRequest, apply_update,
};
use outreach_core::{CampaignId, ContactId, SampleRequestId};

use super::{
    AppliedUpdate, CampaignStore, CampaignTransition, Lifecycle, ResultPage, ResultQuery,
    StoreError,
};

#[derive(Debug, Default)]
struct State {
    contacts: HashMap<ContactId, Contact>,
    jobs: HashMap<String, JobConfig>,
    campaigns: HashMap<CampaignId, Campaign>,
    results: HashMap<(CampaignId, ContactId), DispatchResult>,
    samples: HashMap<SampleRequestId, SampleRequest>,
}

impl State {
    fn ensure_result(
        &mut self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<(DispatchResult, bool), StoreError> {
        if !self.campaigns.contains_key(&campaign_id) {
            return Err(StoreError::CampaignNotFound(campaign_id));
        }
        let mut created = false;
        let row = self
            .results
            .entry((campaign_id, contact_id))
            .or_insert_with(|| {
                created = true;
                DispatchResult::pending(campaign_id, contact_id, Utc::now())
            });
        Ok((row.clone(), created))
    }
}

/// In-memory campaign store.
///
/// Intended for tests/dev. A single write lock covers each unit of work.
#[derive(Debug, Default)]
pub struct InMemoryCampaignStore {
    state: RwLock<State>,
}

impl InMemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a contact record (contact lifecycle is owned elsewhere).
    pub fn remove_contact(&self, id: ContactId) -> Result<(), StoreError> {
        self.write()?.contacts.remove(&id);
        Ok(())
    }

    pub fn remove_job(&self, name: &str) -> Result<(), StoreError> {
        self.write()?.jobs.remove(name);
        Ok(())
    }

    /// Number of sample requests across all campaigns.
    pub fn sample_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.samples.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn save_contact(&self, contact: Contact) -> Result<(), StoreError> {
        self.write()?.contacts.insert(contact.id, contact);
        Ok(())
    }

    async fn contact(&self, id: ContactId) -> Result<Option<Contact>, StoreError> {
        Ok(self.read()?.contacts.get(&id).cloned())
    }

    async fn missing_contacts(&self, ids: &[ContactId]) -> Result<Vec<ContactId>, StoreError> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .filter(|id| !state.contacts.contains_key(id))
            .copied()
            .collect())
    }

    async fn save_job(&self, job: JobConfig) -> Result<(), StoreError> {
        self.write()?.jobs.insert(job.name.clone(), job);
        Ok(())
    }

    async fn job(&self, name: &str) -> Result<Option<JobConfig>, StoreError> {
        Ok(self.read()?.jobs.get(name).cloned())
    }

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.campaigns.contains_key(&campaign.id()) {
            return Err(StoreError::Conflict(format!(
                "campaign already exists: {}",
                campaign.id()
            )));
        }
        state.campaigns.insert(campaign.id(), campaign.clone());
        Ok(())
    }

    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        Ok(self.read()?.campaigns.get(&id).cloned())
    }

    async fn transition_campaign(
        &self,
        id: CampaignId,
        change: Lifecycle,
    ) -> Result<CampaignTransition, StoreError> {
        let mut state = self.write()?;
        let stored = state
            .campaigns
            .get_mut(&id)
            .ok_or(StoreError::CampaignNotFound(id))?;

        let before = stored.clone();
        let mut after = stored.clone();
        change.apply(&mut after)?;
        *stored = after.clone();

        Ok(CampaignTransition { before, after })
    }

    async fn ensure_result(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<(DispatchResult, bool), StoreError> {
        self.write()?.ensure_result(campaign_id, contact_id)
    }

    async fn apply_result_update(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        update: ResultUpdate,
    ) -> Result<AppliedUpdate, StoreError> {
        let mut state = self.write()?;
        let (mut result, created) = state.ensure_result(campaign_id, contact_id)?;
        let before = (!created).then(|| result.clone());

        let contact = state.contacts.get(&contact_id).cloned();
        let mut campaign = state
            .campaigns
            .get(&campaign_id)
            .cloned()
            .ok_or(StoreError::CampaignNotFound(campaign_id))?;

        let effect = apply_update(&mut campaign, &mut result, update, contact.as_ref(), Utc::now());

        if effect.touched_result() {
            state
                .results
                .insert((campaign_id, contact_id), result.clone());
            if let Some(sample) = &effect.sample_request {
                state.samples.insert(sample.id, sample.clone());
            }
            state.campaigns.insert(campaign_id, campaign.clone());
        }

        Ok(AppliedUpdate {
            before,
            result,
            effect,
            campaign,
        })
    }

    async fn list_results(
        &self,
        campaign_id: CampaignId,
        query: &ResultQuery,
    ) -> Result<ResultPage, StoreError> {
        let state = self.read()?;
        if !state.campaigns.contains_key(&campaign_id) {
            return Err(StoreError::CampaignNotFound(campaign_id));
        }

        let mut matching: Vec<&DispatchResult> = state
            .results
            .values()
            .filter(|r| r.campaign_id == campaign_id)
            .filter(|r| query.status.is_none_or(|s| r.status() == s))
            .collect();
        matching.sort_by_key(|r| (r.created_at, r.id));

        let items = matching
            .iter()
            .skip(query.offset() as usize)
            .take(query.per_page() as usize)
            .map(|r| (*r).clone())
            .collect();

        Ok(ResultPage {
            items,
            total: matching.len() as u64,
            page: query.page(),
            per_page: query.per_page(),
        })
    }

    async fn sample_request(
        &self,
        id: SampleRequestId,
    ) -> Result<Option<SampleRequest>, StoreError> {
        Ok(self.read()?.samples.get(&id).cloned())
    }
}
