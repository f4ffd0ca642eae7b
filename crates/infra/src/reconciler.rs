//! Result reconciler: merges inbound result callbacks into dispatch results.
//!
//! A callback body is either one record or a batch
//! `{"execution_id": …, "results": [record, …]}`. Records are independent:
//! a malformed one is skipped with a reason while the rest are processed, and
//! each accepted record is committed as its own unit of work.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, info, instrument, warn};

use outreach_campaigns::{DispatchStatus, ResultUpdate, SampleDetails};
use outreach_core::{CampaignId, ContactId};
use outreach_events::{Actor, AuditAction, AuditEvent, AuditRecorder};

use crate::audit;
use crate::engine::EngineError;
use crate::store::{CampaignStore, StoreError};

/// Largest quantity a sample row can hold (an `INTEGER` column).
const MAX_SAMPLE_QUANTITY: u32 = i32::MAX as u32;

/// One record that was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub success: bool,
    /// Records whose merge was applied or was an idempotent repeat.
    pub updated_contacts: usize,
    pub total_results: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// A validated callback record.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackRecord {
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub status: DispatchStatus,
    pub result_date: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub response_data: Option<JsonValue>,
    pub execution_id: Option<String>,
    pub sample_requested: bool,
    pub sample_details: Option<SampleDetails>,
}

impl CallbackRecord {
    /// Validate one raw record. The error is the skip reason.
    pub fn parse(value: &JsonValue) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| "record is not a JSON object".to_string())?;

        let campaign_id = required_str(obj, "campaign_id")?
            .parse()
            .map_err(|_| "invalid campaign_id".to_string())?;
        let contact_id = required_str(obj, "contact_id")?
            .parse()
            .map_err(|_| "invalid contact_id".to_string())?;
        let status = required_str(obj, "status")?
            .parse()
            .map_err(|_| format!("unknown status: {}", obj["status"]))?;

        let result_date = match optional_str(obj, &["result_date", "delivery_timestamp"])? {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|_| "invalid result_date".to_string())?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        let error_code = match obj.get("error_code") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            Some(_) => return Err("invalid error_code".to_string()),
        };

        let sample_requested = match obj.get("sample_requested") {
            None | Some(JsonValue::Null) => false,
            Some(JsonValue::Bool(b)) => *b,
            Some(_) => return Err("invalid sample_requested".to_string()),
        };

        let sample_details = match obj.get("sample_details") {
            None | Some(JsonValue::Null) => None,
            Some(v) => Some(
                serde_json::from_value::<SampleDetails>(v.clone())
                    .ok()
                    .filter(|d| d.quantity.is_none_or(|q| (1..=MAX_SAMPLE_QUANTITY).contains(&q)))
                    .ok_or_else(|| "invalid sample_details".to_string())?,
            ),
        };

        Ok(Self {
            campaign_id,
            contact_id,
            status,
            result_date,
            error_code,
            response_data: obj.get("response_data").filter(|v| !v.is_null()).cloned(),
            execution_id: optional_str(obj, &["execution_id", "scenario_execution_id"])?
                .map(str::to_string),
            sample_requested,
            sample_details,
        })
    }

    /// The update to merge. A batch-level execution id wins over the record's.
    pub fn into_update(self, batch_execution_id: Option<&str>) -> ResultUpdate {
        let mut update = ResultUpdate::new(self.status);
        if let Some(at) = self.result_date {
            update = update.with_delivered_at(at);
        }
        if let Some(code) = self.error_code {
            update = update.with_error(code);
        }
        if let Some(data) = self.response_data {
            update = update.with_response_data(data);
        }
        if let Some(execution_id) = batch_execution_id.map(str::to_string).or(self.execution_id) {
            update = update.with_execution_id(execution_id);
        }
        if self.sample_requested {
            update = update.with_sample(self.sample_details.unwrap_or_default());
        }
        update
    }
}

fn required_str<'a>(obj: &'a Map<String, JsonValue>, key: &str) -> Result<&'a str, String> {
    match obj.get(key) {
        None | Some(JsonValue::Null) => Err(format!("missing {key}")),
        Some(JsonValue::String(s)) => Ok(s),
        Some(_) => Err(format!("invalid {key}")),
    }
}

/// First present key among `keys`.
fn optional_str<'a>(
    obj: &'a Map<String, JsonValue>,
    keys: &[&str],
) -> Result<Option<&'a str>, String> {
    for key in keys {
        match obj.get(*key) {
            None | Some(JsonValue::Null) => continue,
            Some(JsonValue::String(s)) => return Ok(Some(s)),
            Some(_) => return Err(format!("invalid {key}")),
        }
    }
    Ok(None)
}

fn contact_hint(value: &JsonValue) -> Option<String> {
    match value.get("contact_id")? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Null => None,
        other => Some(other.to_string()),
    }
}

/// Consumes callbacks and merges them through the store.
#[derive(Clone)]
pub struct ResultReconciler {
    store: Arc<dyn CampaignStore>,
    audit: Arc<dyn AuditRecorder>,
}

impl ResultReconciler {
    pub fn new(store: Arc<dyn CampaignStore>, audit: Arc<dyn AuditRecorder>) -> Self {
        Self { store, audit }
    }

    /// Reconcile one callback body (single record or batch).
    #[instrument(
        skip(self, body),
        fields(
            total_results = tracing::field::Empty,
            updated_contacts = tracing::field::Empty
        ),
        err
    )]
    pub async fn reconcile(&self, body: &JsonValue) -> Result<ReconcileReport, EngineError> {
        let (records, execution_id): (Vec<&JsonValue>, Option<&str>) = match body {
            JsonValue::Object(map) if map.contains_key("results") => {
                let results = map.get("results").and_then(JsonValue::as_array).ok_or_else(|| {
                    EngineError::Validation("results must be an array".to_string())
                })?;
                let execution_id = map.get("execution_id").and_then(JsonValue::as_str);
                (results.iter().collect(), execution_id)
            }
            JsonValue::Object(_) => (vec![body], None),
            _ => {
                return Err(EngineError::Validation(
                    "callback body must be a JSON object".to_string(),
                ));
            }
        };

        audit::emit(
            self.audit.as_ref(),
            [AuditEvent::new(Actor::Webhook, AuditAction::CallbackReceived, audit::CALLBACKS)
                .after(json!({ "total_results": records.len(), "execution_id": execution_id }))],
        );

        let mut report = ReconcileReport {
            success: true,
            updated_contacts: 0,
            total_results: records.len(),
            skipped: Vec::new(),
        };

        for (index, raw) in records.into_iter().enumerate() {
            match self.reconcile_record(raw, execution_id).await {
                Ok(true) => report.updated_contacts += 1,
                Ok(false) => {}
                Err(reason) => {
                    let skipped = SkippedRecord {
                        index,
                        contact_id: contact_hint(raw),
                        reason,
                    };
                    debug!(index, reason = %skipped.reason, "callback record skipped");
                    audit::emit(
                        self.audit.as_ref(),
                        [AuditEvent::new(Actor::Webhook, AuditAction::CallbackSkipped, audit::CALLBACKS)
                            .after(audit::snapshot(&skipped))],
                    );
                    report.skipped.push(skipped);
                }
            }
        }

        let span = tracing::Span::current();
        span.record("total_results", report.total_results);
        span.record("updated_contacts", report.updated_contacts);
        info!(
            total_results = report.total_results,
            updated_contacts = report.updated_contacts,
            skipped = report.skipped.len(),
            "callback reconciled"
        );
        Ok(report)
    }

    /// `Ok(true)` when the row was updated (or the record repeated the stored
    /// status), `Ok(false)` when the merge was rejected, `Err(reason)` to skip.
    async fn reconcile_record(
        &self,
        raw: &JsonValue,
        batch_execution_id: Option<&str>,
    ) -> Result<bool, String> {
        let record = CallbackRecord::parse(raw)?;
        let campaign_id = record.campaign_id;
        let contact_id = record.contact_id;

        let campaign = match self.store.campaign(campaign_id).await {
            Ok(Some(campaign)) => campaign,
            Ok(None) => return Err("campaign not found".to_string()),
            Err(e) => return Err(format!("storage error: {e}")),
        };
        if !campaign.includes_contact(contact_id) {
            return Err("contact not in campaign".to_string());
        }

        let update = record.into_update(batch_execution_id);
        let applied = match self
            .store
            .apply_result_update(campaign_id, contact_id, update)
            .await
        {
            Ok(applied) => applied,
            Err(StoreError::CampaignNotFound(_)) => return Err("campaign not found".to_string()),
            Err(e) => {
                warn!(campaign_id = %campaign_id, contact_id = %contact_id, error = %e, "callback write failed");
                return Err(format!("storage error: {e}"));
            }
        };

        if applied.effect.outcome.is_rejected() {
            info!(
                campaign_id = %campaign_id,
                contact_id = %contact_id,
                outcome = ?applied.effect.outcome,
                "callback conflicts with stored outcome, rejected"
            );
        }
        audit::emit(self.audit.as_ref(), audit::result_update(&Actor::Webhook, &applied));

        Ok(applied.effect.touched_result())
    }
}
