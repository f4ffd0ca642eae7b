//! Audit events produced by committed store operations.

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use outreach_campaigns::{Campaign, MergeOutcome};
use outreach_events::{Actor, AuditAction, AuditEvent, AuditRecorder};

use crate::store::{AppliedUpdate, CampaignTransition};

pub(crate) const CAMPAIGNS: &str = "campaigns";
pub(crate) const RESULTS: &str = "dispatch_results";
pub(crate) const SAMPLES: &str = "sample_requests";
pub(crate) const CALLBACKS: &str = "callbacks";

pub(crate) fn snapshot<T: Serialize>(value: &T) -> JsonValue {
    serde_json::to_value(value).unwrap_or(JsonValue::Null)
}

/// Hand events to the recorder. Audit failures never undo a committed write.
pub(crate) fn emit(recorder: &dyn AuditRecorder, events: impl IntoIterator<Item = AuditEvent>) {
    for event in events {
        let action = event.action();
        if let Err(e) = recorder.record(event) {
            warn!(action = action.as_str(), error = %e, "failed to record audit event");
        }
    }
}

pub(crate) fn campaign_created(actor: Actor, campaign: &Campaign) -> AuditEvent {
    AuditEvent::new(actor, AuditAction::CampaignCreated, CAMPAIGNS)
        .subject(campaign.id())
        .after(snapshot(campaign))
}

pub(crate) fn campaign_transition(
    actor: Actor,
    action: AuditAction,
    transition: &CampaignTransition,
) -> AuditEvent {
    AuditEvent::new(actor, action, CAMPAIGNS)
        .subject(transition.after.id())
        .before(snapshot(&transition.before.progress()))
        .after(snapshot(&transition.after.progress()))
}

/// Events for one result unit of work, including rejected and duplicate merges.
pub(crate) fn result_update(actor: &Actor, applied: &AppliedUpdate) -> Vec<AuditEvent> {
    let mut events = Vec::new();

    if applied.created_result() {
        events.push(
            AuditEvent::new(actor.clone(), AuditAction::ResultCreated, RESULTS)
                .subject(applied.result.id)
                .after(snapshot(&applied.result)),
        );
    }

    let action = match applied.effect.outcome {
        MergeOutcome::Applied { .. } => AuditAction::TransitionApplied,
        MergeOutcome::Rejected { .. } => AuditAction::TransitionRejected,
        MergeOutcome::Unchanged { .. } => AuditAction::TransitionUnchanged,
    };
    let mut transition = AuditEvent::new(actor.clone(), action, RESULTS)
        .subject(applied.result.id)
        .after(serde_json::json!({
            "outcome": snapshot(&applied.effect.outcome),
            "delta": snapshot(&applied.effect.delta),
            "result": snapshot(&applied.result),
        }));
    if let Some(before) = &applied.before {
        transition = transition.before(snapshot(before));
    }
    events.push(transition);

    if let Some(sample) = &applied.effect.sample_request {
        events.push(
            AuditEvent::new(actor.clone(), AuditAction::SampleRequested, SAMPLES)
                .subject(sample.id)
                .after(snapshot(sample)),
        );
    }

    events
}
