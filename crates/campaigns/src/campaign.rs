//! Campaign aggregate: lifecycle and aggregate counters.
//!
//! ```text
//! draft ──► running ──► completed
//!              │  └───► failed
//!              └──────► paused
//! ```

use core::fmt;
use core::str::FromStr;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use outreach_core::{CampaignId, ContactId, DomainError, DomainResult};

use crate::dispatch::CounterDelta;
use crate::job::JobConfig;

/// Free-form campaign settings, merged into every outbound payload.
pub type CampaignSettings = Map<String, JsonValue>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Running,
    Completed,
    Failed,
    Paused,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            other => Err(DomainError::validation(format!(
                "unknown campaign status: {other}"
            ))),
        }
    }
}

/// Precondition failures found right after `draft → running`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "fault", content = "detail", rename_all = "snake_case")]
pub enum SetupFault {
    #[error("campaign has no contacts")]
    EmptyContactList,

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job is inactive: {0}")]
    JobInactive(String),
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignCounters {
    pub total: u32,
    pub processed: u32,
    pub successful: u32,
    pub failed: u32,
}

impl CampaignCounters {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Apply a delta. Decrements clamp at zero; `total` never moves.
    pub fn apply(&mut self, delta: CounterDelta) {
        fn shift(value: u32, by: i64) -> u32 {
            (i64::from(value) + by).clamp(0, i64::from(u32::MAX)) as u32
        }

        self.processed = shift(self.processed, delta.processed);
        self.successful = shift(self.successful, delta.successful);
        self.failed = shift(self.failed, delta.failed);
    }

    /// `processed == successful + failed` and `processed <= total`.
    pub fn check(&self) -> DomainResult<()> {
        if self.processed != self.successful + self.failed {
            return Err(DomainError::invariant(format!(
                "processed ({}) != successful ({}) + failed ({})",
                self.processed, self.successful, self.failed
            )));
        }
        if self.processed > self.total {
            return Err(DomainError::invariant(format!(
                "processed ({}) exceeds total ({})",
                self.processed, self.total
            )));
        }
        Ok(())
    }
}

/// What the operator supplies when creating a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_by: String,
    pub job_name: String,
    pub contact_ids: Vec<ContactId>,
    #[serde(default)]
    pub settings: CampaignSettings,
}

impl CampaignDefinition {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("campaign name cannot be empty"));
        }
        if self.created_by.trim().is_empty() {
            return Err(DomainError::validation("created_by cannot be empty"));
        }
        if self.job_name.trim().is_empty() {
            return Err(DomainError::validation("job_name cannot be empty"));
        }

        let mut seen = HashSet::with_capacity(self.contact_ids.len());
        for id in &self.contact_ids {
            if !seen.insert(id) {
                return Err(DomainError::validation(format!(
                    "duplicate contact id in campaign: {id}"
                )));
            }
        }
        if u32::try_from(self.contact_ids.len()).is_err() {
            return Err(DomainError::validation("too many contacts for one campaign"));
        }
        Ok(())
    }
}

/// Mutable part of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignProgress {
    pub status: CampaignStatus,
    pub counters: CampaignCounters,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Campaign {
    id: CampaignId,
    #[serde(flatten)]
    definition: CampaignDefinition,
    #[serde(flatten)]
    progress: CampaignProgress,
    created_at: DateTime<Utc>,
}

impl Campaign {
    /// New draft campaign. The contact list is frozen from here on.
    pub fn new(definition: CampaignDefinition, now: DateTime<Utc>) -> DomainResult<Self> {
        definition.validate()?;
        let total = definition.contact_ids.len() as u32;

        Ok(Self {
            id: CampaignId::new(),
            definition,
            progress: CampaignProgress {
                status: CampaignStatus::Draft,
                counters: CampaignCounters::new(total),
                started_at: None,
                ended_at: None,
            },
            created_at: now,
        })
    }

    /// Rebuild from storage.
    pub fn restore(
        id: CampaignId,
        definition: CampaignDefinition,
        progress: CampaignProgress,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            definition,
            progress,
            created_at,
        }
    }

    pub fn id(&self) -> CampaignId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &CampaignDefinition {
        &self.definition
    }

    pub fn job_name(&self) -> &str {
        &self.definition.job_name
    }

    pub fn contact_ids(&self) -> &[ContactId] {
        &self.definition.contact_ids
    }

    pub fn includes_contact(&self, contact_id: ContactId) -> bool {
        self.definition.contact_ids.contains(&contact_id)
    }

    pub fn settings(&self) -> &CampaignSettings {
        &self.definition.settings
    }

    pub fn progress(&self) -> &CampaignProgress {
        &self.progress
    }

    pub fn status(&self) -> CampaignStatus {
        self.progress.status
    }

    pub fn counters(&self) -> CampaignCounters {
        self.progress.counters
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.progress.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.progress.ended_at
    }

    /// `draft → running`.
    pub fn start(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.expect_status(CampaignStatus::Draft, "start")?;
        self.progress.status = CampaignStatus::Running;
        self.progress.started_at = Some(now);
        Ok(())
    }

    /// Preconditions checked once the campaign is running, before any dispatch.
    pub fn check_setup(&self, job: Option<&JobConfig>) -> Result<(), SetupFault> {
        if self.definition.contact_ids.is_empty() {
            return Err(SetupFault::EmptyContactList);
        }
        match job {
            None => Err(SetupFault::JobNotFound(self.definition.job_name.clone())),
            Some(job) if !job.is_active => Err(SetupFault::JobInactive(job.name.clone())),
            Some(_) => Ok(()),
        }
    }

    /// `running → failed`.
    pub fn fail(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.expect_status(CampaignStatus::Running, "fail")?;
        self.progress.status = CampaignStatus::Failed;
        self.progress.ended_at = Some(now);
        Ok(())
    }

    /// `running → completed`.
    pub fn complete(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.expect_status(CampaignStatus::Running, "complete")?;
        self.progress.status = CampaignStatus::Completed;
        self.progress.ended_at = Some(now);
        Ok(())
    }

    /// `running → paused`. The dispatch loop notices between contacts.
    pub fn pause(&mut self) -> DomainResult<()> {
        self.expect_status(CampaignStatus::Running, "pause")?;
        self.progress.status = CampaignStatus::Paused;
        Ok(())
    }

    pub fn apply_delta(&mut self, delta: CounterDelta) {
        self.progress.counters.apply(delta);
    }

    fn expect_status(&self, expected: CampaignStatus, action: &str) -> DomainResult<()> {
        if self.progress.status != expected {
            return Err(DomainError::conflict(format!(
                "cannot {action} campaign in status {}, expected {expected}",
                self.progress.status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(contacts: Vec<ContactId>) -> CampaignDefinition {
        CampaignDefinition {
            name: "Spring launch".into(),
            description: None,
            created_by: "ops".into(),
            job_name: "launch-webhook".into(),
            contact_ids: contacts,
            settings: CampaignSettings::new(),
        }
    }

    #[test]
    fn new_campaign_is_draft_with_frozen_total() {
        let c = Campaign::new(definition(vec![ContactId::new(), ContactId::new()]), Utc::now())
            .unwrap();
        assert_eq!(c.status(), CampaignStatus::Draft);
        assert_eq!(c.counters(), CampaignCounters::new(2));
        assert!(c.started_at().is_none());
    }

    #[test]
    fn duplicate_contacts_are_rejected() {
        let id = ContactId::new();
        let err = Campaign::new(definition(vec![id, id]), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut def = definition(vec![]);
        def.name = "  ".into();
        assert!(Campaign::new(def, Utc::now()).is_err());
    }

    #[test]
    fn start_only_from_draft() {
        let mut c = Campaign::new(definition(vec![ContactId::new()]), Utc::now()).unwrap();
        let now = Utc::now();
        c.start(now).unwrap();
        assert_eq!(c.status(), CampaignStatus::Running);
        assert_eq!(c.started_at(), Some(now));

        let err = c.start(Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(c.started_at(), Some(now));
    }

    #[test]
    fn setup_checks() {
        let job = JobConfig::new("launch-webhook", "http://localhost/hook");

        let empty = Campaign::new(definition(vec![]), Utc::now()).unwrap();
        assert_eq!(empty.check_setup(Some(&job)), Err(SetupFault::EmptyContactList));

        let c = Campaign::new(definition(vec![ContactId::new()]), Utc::now()).unwrap();
        assert_eq!(
            c.check_setup(None),
            Err(SetupFault::JobNotFound("launch-webhook".into()))
        );
        assert_eq!(
            c.check_setup(Some(&job.clone().inactive())),
            Err(SetupFault::JobInactive("launch-webhook".into()))
        );
        assert_eq!(c.check_setup(Some(&job)), Ok(()));
    }

    #[test]
    fn terminal_transitions_set_end_time() {
        let mut c = Campaign::new(definition(vec![ContactId::new()]), Utc::now()).unwrap();
        assert!(c.complete(Utc::now()).is_err());
        c.start(Utc::now()).unwrap();
        c.complete(Utc::now()).unwrap();
        assert_eq!(c.status(), CampaignStatus::Completed);
        assert!(c.ended_at().is_some());
        assert!(c.pause().is_err());
    }

    #[test]
    fn counters_clamp_at_zero() {
        let mut counters = CampaignCounters::new(1);
        counters.apply(CounterDelta {
            processed: 0,
            successful: 1,
            failed: -1,
        });
        assert_eq!(counters.failed, 0);
        assert_eq!(counters.successful, 1);
    }

    #[test]
    fn counter_check_detects_drift() {
        let counters = CampaignCounters {
            total: 2,
            processed: 2,
            successful: 1,
            failed: 0,
        };
        assert!(counters.check().is_err());
        assert!(CampaignCounters::new(3).check().is_ok());
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            CampaignStatus::Draft,
            CampaignStatus::Running,
            CampaignStatus::Completed,
            CampaignStatus::Failed,
            CampaignStatus::Paused,
        ] {
            assert_eq!(s.to_string().parse::<CampaignStatus>().unwrap(), s);
        }
    }
}
