//! Sample requests raised by result callbacks.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use outreach_core::{CampaignId, ContactId, DispatchResultId, DomainError, SampleRequestId};

use crate::contact::{Contact, PostalAddress};

pub const DEFAULT_SAMPLE_TYPE: &str = "Standard Sample";

/// Fulfillment lifecycle. Only `Pending` is ever written here; the rest belongs
/// to downstream fulfillment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FulfillmentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown fulfillment status: {other}"
            ))),
        }
    }
}

/// Optional details a callback attaches to a sample request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleDetails {
    #[serde(default)]
    pub sample_type: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub shipping_address: Option<PostalAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRequest {
    pub id: SampleRequestId,
    pub result_id: DispatchResultId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub sample_type: String,
    pub quantity: u32,
    pub shipping_address: PostalAddress,
    pub fulfillment_status: FulfillmentStatus,
    pub requested_at: DateTime<Utc>,
}

impl SampleRequest {
    /// New pending request. The shipping address falls back to the contact's
    /// postal address when the callback carries none.
    pub fn new(
        result_id: DispatchResultId,
        campaign_id: CampaignId,
        contact_id: ContactId,
        details: &SampleDetails,
        contact: Option<&Contact>,
        now: DateTime<Utc>,
    ) -> Self {
        let shipping_address = details
            .shipping_address
            .clone()
            .or_else(|| contact.map(|c| c.address.clone()))
            .unwrap_or_default();

        Self {
            id: SampleRequestId::new(),
            result_id,
            campaign_id,
            contact_id,
            sample_type: details
                .sample_type
                .clone()
                .unwrap_or_else(|| DEFAULT_SAMPLE_TYPE.to_string()),
            quantity: details.quantity.unwrap_or(1),
            shipping_address,
            fulfillment_status: FulfillmentStatus::Pending,
            requested_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact_in(city: &str) -> Contact {
        Contact::new(ContactId::new(), "Grace", "Hopper", "grace@example.com").with_address(
            PostalAddress {
                city: Some(city.into()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn defaults_apply_when_details_are_empty() {
        let contact = contact_in("Arlington");
        let sample = SampleRequest::new(
            DispatchResultId::new(),
            CampaignId::new(),
            contact.id,
            &SampleDetails::default(),
            Some(&contact),
            Utc::now(),
        );

        assert_eq!(sample.sample_type, DEFAULT_SAMPLE_TYPE);
        assert_eq!(sample.quantity, 1);
        assert_eq!(sample.shipping_address.city.as_deref(), Some("Arlington"));
        assert_eq!(sample.fulfillment_status, FulfillmentStatus::Pending);
    }

    #[test]
    fn callback_address_wins_over_contact_address() {
        let contact = contact_in("Arlington");
        let details = SampleDetails {
            sample_type: Some("Widget Kit".into()),
            quantity: Some(3),
            shipping_address: Some(PostalAddress {
                city: Some("Boston".into()),
                ..Default::default()
            }),
        };
        let sample = SampleRequest::new(
            DispatchResultId::new(),
            CampaignId::new(),
            contact.id,
            &details,
            Some(&contact),
            Utc::now(),
        );

        assert_eq!(sample.sample_type, "Widget Kit");
        assert_eq!(sample.quantity, 3);
        assert_eq!(sample.shipping_address.city.as_deref(), Some("Boston"));
    }

    #[test]
    fn missing_contact_leaves_address_empty() {
        let sample = SampleRequest::new(
            DispatchResultId::new(),
            CampaignId::new(),
            ContactId::new(),
            &SampleDetails::default(),
            None,
            Utc::now(),
        );
        assert!(sample.shipping_address.is_empty());
    }
}
