//! Per-(campaign, contact) dispatch results and the unit of work that both
//! writers go through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use outreach_core::{CampaignId, ContactId, DispatchResultId, SampleRequestId};

use crate::campaign::Campaign;
use crate::contact::Contact;
use crate::dispatch::{CounterDelta, DispatchStatus, MergeOutcome, merge};
use crate::sample::{SampleDetails, SampleRequest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub id: DispatchResultId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    status: DispatchStatus,
    pub error_message: Option<String>,
    /// Acknowledgment body returned by the dispatch call.
    pub external_response: Option<JsonValue>,
    /// Data carried by result callbacks.
    pub response_data: Option<JsonValue>,
    pub execution_id: Option<String>,
    pub sample_requested: bool,
    pub sample_request_id: Option<SampleRequestId>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl DispatchResult {
    /// Fresh row, created by whichever writer touches the pair first.
    pub fn pending(campaign_id: CampaignId, contact_id: ContactId, now: DateTime<Utc>) -> Self {
        Self {
            id: DispatchResultId::new(),
            campaign_id,
            contact_id,
            status: DispatchStatus::Pending,
            error_message: None,
            external_response: None,
            response_data: None,
            execution_id: None,
            sample_requested: false,
            sample_request_id: None,
            created_at: now,
            processed_at: None,
            delivered_at: None,
        }
    }

    /// Same row with a stored status; used when loading from storage.
    pub fn restored(self, status: DispatchStatus) -> Self {
        Self { status, ..self }
    }

    pub fn status(&self) -> DispatchStatus {
        self.status
    }
}

/// An incoming status plus the fields that travel with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultUpdate {
    pub status: DispatchStatus,
    pub error_message: Option<String>,
    pub external_response: Option<JsonValue>,
    pub response_data: Option<JsonValue>,
    pub execution_id: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// `Some` when the record asks for a sample.
    pub sample: Option<SampleDetails>,
}

impl ResultUpdate {
    pub fn new(status: DispatchStatus) -> Self {
        Self {
            status,
            error_message: None,
            external_response: None,
            response_data: None,
            execution_id: None,
            delivered_at: None,
            sample: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_external_response(mut self, body: JsonValue) -> Self {
        self.external_response = Some(body);
        self
    }

    pub fn with_response_data(mut self, data: JsonValue) -> Self {
        self.response_data = Some(data);
        self
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn with_delivered_at(mut self, at: DateTime<Utc>) -> Self {
        self.delivered_at = Some(at);
        self
    }

    pub fn with_sample(mut self, details: SampleDetails) -> Self {
        self.sample = Some(details);
        self
    }
}

/// What one unit of work changed.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEffect {
    pub outcome: MergeOutcome,
    pub delta: CounterDelta,
    /// Newly created sample request, if any.
    pub sample_request: Option<SampleRequest>,
}

impl UpdateEffect {
    /// Whether anything on the result row changed.
    pub fn touched_result(&self) -> bool {
        !self.outcome.is_rejected()
    }
}

/// Merge `update` into `result` and fold the counter delta into `campaign`.
///
/// Callers must hold the campaign row (and the result row) for the duration
/// and persist all three together. A rejected merge leaves everything as is.
pub fn apply_update(
    campaign: &mut Campaign,
    result: &mut DispatchResult,
    update: ResultUpdate,
    contact: Option<&Contact>,
    now: DateTime<Utc>,
) -> UpdateEffect {
    let outcome = merge(result.status, update.status);
    if outcome.is_rejected() {
        return UpdateEffect {
            outcome,
            delta: CounterDelta::default(),
            sample_request: None,
        };
    }

    if let MergeOutcome::Applied { from, to } = outcome {
        result.status = to;
        if from == DispatchStatus::Pending {
            result.processed_at = Some(now);
        }
    }

    if let Some(at) = update.delivered_at {
        result.delivered_at = Some(at);
    } else if result.status == DispatchStatus::Delivered && result.delivered_at.is_none() {
        result.delivered_at = Some(now);
    }
    if update.error_message.is_some() {
        result.error_message = update.error_message;
    }
    if update.external_response.is_some() {
        result.external_response = update.external_response;
    }
    if update.response_data.is_some() {
        result.response_data = update.response_data;
    }
    if update.execution_id.is_some() {
        result.execution_id = update.execution_id;
    }

    let mut sample_request = None;
    if let Some(details) = update.sample {
        result.sample_requested = true;
        if result.sample_request_id.is_none() {
            let sample = SampleRequest::new(
                result.id,
                result.campaign_id,
                result.contact_id,
                &details,
                contact,
                now,
            );
            result.sample_request_id = Some(sample.id);
            sample_request = Some(sample);
        }
    }

    let delta = outcome.delta();
    campaign.apply_delta(delta);

    UpdateEffect {
        outcome,
        delta,
        sample_request,
    }
}
