//! Contact records as read from the contact store.

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use outreach_core::ContactId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl PostalAddress {
    pub fn is_empty(&self) -> bool {
        self == &PostalAddress::default()
    }
}

/// A contact's profile. The engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
    pub phone_number: Option<String>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub address: PostalAddress,
    pub is_active: bool,
}

impl Contact {
    pub fn new(
        id: ContactId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email_address: impl Into<String>,
    ) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email_address: email_address.into(),
            phone_number: None,
            company_name: None,
            job_title: None,
            address: PostalAddress::default(),
            is_active: true,
        }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company_name = Some(company.into());
        self
    }

    pub fn with_address(mut self, address: PostalAddress) -> Self {
        self.address = address;
        self
    }

    /// Profile fields sent to the automation endpoint as `contact_data`.
    pub fn profile(&self) -> JsonValue {
        json!({
            "first_name": self.first_name,
            "last_name": self.last_name,
            "email_address": self.email_address,
            "phone_number": self.phone_number,
            "company_name": self.company_name,
            "job_title": self.job_title,
            "address": self.address,
        })
    }
}
