use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Who performed a state-changing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// Internal bookkeeping (creation, setup checks).
    System,
    /// A campaign dispatch worker.
    Dispatcher,
    /// An inbound result callback.
    Webhook,
    /// An API caller, identified by a free-form label.
    Api(String),
}

impl Actor {
    pub fn as_str(&self) -> &str {
        match self {
            Actor::System => "system",
            Actor::Dispatcher => "dispatcher",
            Actor::Webhook => "webhook",
            Actor::Api(label) => label,
        }
    }
}

/// What happened.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CampaignCreated,
    CampaignStarted,
    CampaignCompleted,
    CampaignFailed,
    CampaignPaused,
    ResultCreated,
    TransitionApplied,
    TransitionRejected,
    TransitionUnchanged,
    SampleRequested,
    CallbackReceived,
    CallbackSkipped,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CampaignCreated => "campaign_created",
            AuditAction::CampaignStarted => "campaign_started",
            AuditAction::CampaignCompleted => "campaign_completed",
            AuditAction::CampaignFailed => "campaign_failed",
            AuditAction::CampaignPaused => "campaign_paused",
            AuditAction::ResultCreated => "result_created",
            AuditAction::TransitionApplied => "transition_applied",
            AuditAction::TransitionRejected => "transition_rejected",
            AuditAction::TransitionUnchanged => "transition_unchanged",
            AuditAction::SampleRequested => "sample_requested",
            AuditAction::CallbackReceived => "callback_received",
            AuditAction::CallbackSkipped => "callback_skipped",
        }
    }
}

/// Immutable audit record of one state-changing operation.
///
/// `before`/`after` are JSON snapshots of the subject; either may be absent
/// (creation has no `before`, a skipped callback has no subject at all).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    event_id: Uuid,
    actor: Actor,
    action: AuditAction,
    subject_table: String,
    subject_id: Option<String>,
    before: Option<JsonValue>,
    after: Option<JsonValue>,
    occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(actor: Actor, action: AuditAction, subject_table: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            actor,
            action,
            subject_table: subject_table.into(),
            subject_id: None,
            before: None,
            after: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn subject(mut self, id: impl ToString) -> Self {
        self.subject_id = Some(id.to_string());
        self
    }

    pub fn before(mut self, snapshot: JsonValue) -> Self {
        self.before = Some(snapshot);
        self
    }

    pub fn after(mut self, snapshot: JsonValue) -> Self {
        self.after = Some(snapshot);
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    pub fn subject_table(&self) -> &str {
        &self.subject_table
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.subject_id.as_deref()
    }

    pub fn before_snapshot(&self) -> Option<&JsonValue> {
        self.before.as_ref()
    }

    pub fn after_snapshot(&self) -> Option<&JsonValue> {
        self.after.as_ref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_subject_and_snapshots() {
        let ev = AuditEvent::new(Actor::Webhook, AuditAction::TransitionRejected, "dispatch_results")
            .subject(42)
            .before(serde_json::json!({"status": "delivered"}))
            .after(serde_json::json!({"status": "failed"}));

        assert_eq!(ev.subject_id(), Some("42"));
        assert_eq!(ev.action().as_str(), "transition_rejected");
        assert_eq!(ev.actor().as_str(), "webhook");
        assert_eq!(ev.before_snapshot().unwrap()["status"], "delivered");
    }

    #[test]
    fn action_serializes_as_snake_case() {
        let json = serde_json::to_value(AuditAction::CallbackSkipped).unwrap();
        assert_eq!(json, serde_json::json!("callback_skipped"));
    }
}
