//! `outreach-core`: shared building blocks for the campaign engine.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! strongly-typed identifiers and the domain error model.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{CampaignId, ContactId, DispatchResultId, SampleRequestId};
