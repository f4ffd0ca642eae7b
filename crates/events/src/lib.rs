//! Audit events emitted by the campaign engine.
//!
//! The engine never owns audit storage: it produces immutable [`AuditEvent`]s
//! and hands them to an [`AuditRecorder`] (append-only, write-mostly).

pub mod audit;
pub mod in_memory;
pub mod recorder;

pub use audit::{Actor, AuditAction, AuditEvent};
pub use in_memory::{DEFAULT_AUDIT_CAPACITY, InMemoryAuditRecorder};
pub use recorder::{AuditError, AuditRecorder, Subscription, TracingAuditRecorder};
