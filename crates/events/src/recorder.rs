//! Audit recording abstraction (mechanics only).
//!
//! Recording is append-only: an [`AuditRecorder`] accepts events and never
//! mutates them. Subscribers get a copy of every recorded event (broadcast
//! semantics), which is how tests and observers follow the audit trail.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use thiserror::Error;

use crate::audit::{AuditAction, AuditEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// Recording failed due to internal lock poisoning.
    #[error("audit recorder poisoned")]
    Poisoned,
}

/// A subscription to the audit trail.
///
/// Designed for single-threaded consumption, like any `mpsc` receiver.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Append-only audit sink.
///
/// The trait requires `Send + Sync`: the dispatch workers and the callback
/// handlers record concurrently.
pub trait AuditRecorder: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;

    /// Most recent events for an action, newest first.
    ///
    /// Write-only sinks may return nothing.
    fn recent(&self, _action: AuditAction, _limit: usize) -> Vec<AuditEvent> {
        Vec::new()
    }

    fn subscribe(&self) -> Subscription<AuditEvent>;
}

impl<R> AuditRecorder for Arc<R>
where
    R: AuditRecorder + ?Sized,
{
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        (**self).record(event)
    }

    fn recent(&self, action: AuditAction, limit: usize) -> Vec<AuditEvent> {
        (**self).recent(action, limit)
    }

    fn subscribe(&self) -> Subscription<AuditEvent> {
        (**self).subscribe()
    }
}

/// Decorator that emits every recorded event as a structured log line before
/// handing it to the inner recorder.
#[derive(Debug)]
pub struct TracingAuditRecorder<R> {
    inner: R,
}

impl<R> TracingAuditRecorder<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: AuditRecorder> AuditRecorder for TracingAuditRecorder<R> {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            actor = event.actor().as_str(),
            action = event.action().as_str(),
            table = event.subject_table(),
            subject_id = event.subject_id().unwrap_or("-"),
            "audit event"
        );
        self.inner.record(event)
    }

    fn recent(&self, action: AuditAction, limit: usize) -> Vec<AuditEvent> {
        self.inner.recent(action, limit)
    }

    fn subscribe(&self) -> Subscription<AuditEvent> {
        self.inner.subscribe()
    }
}
