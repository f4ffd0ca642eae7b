//! Campaign domain: lifecycle, per-contact dispatch state machine, counter rules.
//!
//! Everything here is pure and deterministic. Storage, HTTP and scheduling live
//! in `outreach-infra`; they call into these types to decide what changes.

pub mod campaign;
pub mod contact;
pub mod dispatch;
pub mod job;
pub mod result;
pub mod sample;

pub use campaign::{
    Campaign, CampaignCounters, CampaignDefinition, CampaignProgress, CampaignSettings,
    CampaignStatus, SetupFault,
};
pub use contact::{Contact, PostalAddress};
pub use dispatch::{Bucket, CounterDelta, DispatchStatus, MergeOutcome, merge};
pub use job::JobConfig;
pub use result::{DispatchResult, ResultUpdate, UpdateEffect, apply_update};
pub use sample::{FulfillmentStatus, SampleDetails, SampleRequest};
