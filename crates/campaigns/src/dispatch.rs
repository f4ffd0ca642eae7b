//! Per-(campaign, contact) dispatch state machine.
//!
//! ```text
//! pending ──► sent ──► delivered
//!    │          │
//!    │          └────► bounced
//!    └──► failed ─────► delivered | bounced   (late definitive callback)
//! ```
//!
//! Both writers (the dispatch loop and the result reconciler) go through
//! [`merge`]. The rule is rank based so that the final state does not depend on
//! the order in which the writers arrive:
//!
//! - same status again: no-op
//! - higher rank: applied
//! - lower rank, or a different definitive outcome: rejected

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use outreach_core::DomainError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Row exists, no outcome yet.
    Pending,
    /// The endpoint acknowledged the dispatch call.
    Sent,
    /// Callback: the outreach reached the contact.
    Delivered,
    /// The dispatch call errored, timed out or was refused.
    Failed,
    /// Callback: the outreach was returned undelivered.
    Bounced,
}

impl DispatchStatus {
    pub const ALL: [DispatchStatus; 5] = [
        DispatchStatus::Pending,
        DispatchStatus::Sent,
        DispatchStatus::Delivered,
        DispatchStatus::Failed,
        DispatchStatus::Bounced,
    ];

    /// No further legitimate transition is expected (a `failed` row can still be
    /// overridden by a definitive callback).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Bounced | Self::Failed)
    }

    /// Outcome reported by the endpoint after the fact; never overridden.
    pub fn is_definitive(&self) -> bool {
        matches!(self, Self::Delivered | Self::Bounced)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Sent => 1,
            Self::Failed => 2,
            Self::Delivered | Self::Bounced => 3,
        }
    }

    pub fn bucket(&self) -> Bucket {
        match self {
            Self::Pending => Bucket::Neither,
            Self::Sent | Self::Delivered => Bucket::Successful,
            Self::Failed | Self::Bounced => Bucket::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Bounced => "bounced",
        }
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            "bounced" => Ok(Self::Bounced),
            other => Err(DomainError::validation(format!(
                "unknown dispatch status: {other}"
            ))),
        }
    }
}

/// Result of merging an incoming status into a stored one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Incoming equals stored.
    Unchanged { status: DispatchStatus },
    Applied {
        from: DispatchStatus,
        to: DispatchStatus,
    },
    /// Incoming would regress (or contradict) the stored outcome.
    Rejected {
        stored: DispatchStatus,
        attempted: DispatchStatus,
    },
}

impl MergeOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MergeOutcome::Applied { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, MergeOutcome::Rejected { .. })
    }

    /// Status held after the merge.
    pub fn resulting_status(&self) -> DispatchStatus {
        match *self {
            MergeOutcome::Unchanged { status } => status,
            MergeOutcome::Applied { to, .. } => to,
            MergeOutcome::Rejected { stored, .. } => stored,
        }
    }

    /// Net counter change implied by the merge.
    pub fn delta(&self) -> CounterDelta {
        match *self {
            MergeOutcome::Applied { from, to } => CounterDelta::between(from.bucket(), to.bucket()),
            _ => CounterDelta::default(),
        }
    }
}

/// Decide how `incoming` combines with `stored`.
pub fn merge(stored: DispatchStatus, incoming: DispatchStatus) -> MergeOutcome {
    if stored == incoming {
        return MergeOutcome::Unchanged { status: stored };
    }

    if incoming.rank() > stored.rank() {
        MergeOutcome::Applied {
            from: stored,
            to: incoming,
        }
    } else {
        MergeOutcome::Rejected {
            stored,
            attempted: incoming,
        }
    }
}

/// Which campaign counter a result currently contributes to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Neither,
    Successful,
    Failed,
}

/// Net change to apply to a campaign's counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub processed: i64,
    pub successful: i64,
    pub failed: i64,
}

impl CounterDelta {
    /// Only the net bucket membership change, never a blind increment.
    pub fn between(old: Bucket, new: Bucket) -> Self {
        let mut delta = CounterDelta::default();
        if old == new {
            return delta;
        }

        match old {
            Bucket::Neither => delta.processed += 1,
            Bucket::Successful => delta.successful -= 1,
            Bucket::Failed => delta.failed -= 1,
        }
        match new {
            Bucket::Neither => delta.processed -= 1,
            Bucket::Successful => delta.successful += 1,
            Bucket::Failed => delta.failed += 1,
        }
        delta
    }

    pub fn is_zero(&self) -> bool {
        *self == CounterDelta::default()
    }
}
