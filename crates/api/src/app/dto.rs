use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use outreach_campaigns::{CampaignStatus, Contact, JobConfig, PostalAddress};
use outreach_core::{CampaignId, ContactId};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateContactRequest {
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
    pub phone_number: Option<String>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    #[serde(default)]
    pub address: PostalAddress,
}

impl CreateContactRequest {
    pub fn into_contact(self, id: ContactId) -> Contact {
        let mut contact = Contact::new(id, self.first_name, self.last_name, self.email_address)
            .with_address(self.address);
        contact.phone_number = self.phone_number;
        contact.company_name = self.company_name;
        contact.job_title = self.job_title;
        contact
    }
}

#[derive(Debug, Deserialize)]
pub struct UpsertJobRequest {
    pub description: Option<String>,
    pub webhook_url: String,
    pub scenario_id: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl UpsertJobRequest {
    pub fn into_job(self, name: String) -> JobConfig {
        JobConfig {
            name,
            description: self.description,
            webhook_url: self.webhook_url,
            scenario_id: self.scenario_id,
            headers: self.headers,
            is_active: self.is_active,
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

/// Answer to a start request; dispatch continues in the background.
#[derive(Debug, Serialize)]
pub struct StartCampaignResponse {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    pub total_contacts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_request_defaults_to_active_without_headers() {
        let req: UpsertJobRequest =
            serde_json::from_value(json!({ "webhook_url": "http://hook" })).unwrap();
        let job = req.into_job("welcome".into());
        assert!(job.is_active);
        assert!(job.headers.is_empty());
        assert_eq!(job.name, "welcome");
    }

    #[test]
    fn contact_request_keeps_optional_fields() {
        let req: CreateContactRequest = serde_json::from_value(json!({
            "first_name": "Ada",
            "last_name": "Lovelace",
            "email_address": "ada@example.com",
            "company_name": "Engines Ltd",
            "address": { "city": "London" }
        }))
        .unwrap();
        let contact = req.into_contact(ContactId::new());
        assert_eq!(contact.company_name.as_deref(), Some("Engines Ltd"));
        assert_eq!(contact.address.city.as_deref(), Some("London"));
        assert!(contact.phone_number.is_none());
        assert!(contact.is_active);
    }
}
