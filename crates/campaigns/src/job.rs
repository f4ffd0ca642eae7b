//! Job (webhook target) configuration, owned by the job/webhook config store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Where and how a campaign's contacts are dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique name campaigns refer to.
    pub name: String,
    pub description: Option<String>,
    pub webhook_url: String,
    /// Identity of the automation scenario behind the URL.
    pub scenario_id: Option<String>,
    /// Static headers attached to every outbound call (credentials, tags).
    pub headers: BTreeMap<String, String>,
    pub is_active: bool,
}

impl JobConfig {
    pub fn new(name: impl Into<String>, webhook_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            webhook_url: webhook_url.into(),
            scenario_id: None,
            headers: BTreeMap::new(),
            is_active: true,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_scenario(mut self, scenario_id: impl Into<String>) -> Self {
        self.scenario_id = Some(scenario_id.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}
