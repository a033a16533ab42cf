//! Persisted configuration layout
//!
//! One JSON object per configuration name:
//!
//! ```json
//! {
//!   "adblock": {
//!     "enabled": true,
//!     "domains": ["test.org"],
//!     "filters": ["resource.png"],
//!     "subscriptions": ["https://easylist.to/easylist/easylist.txt"]
//!   }
//! }
//! ```
//!
//! Storage is left to the host; this module only converts to and from JSON.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::configuration::ConfigurationSnapshot;

/// Error loading or saving a configurations document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Invalid configurations document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stored form of one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredConfiguration {
    pub enabled: bool,
    /// Allowed domains
    pub domains: Vec<String>,
    /// Custom filters
    pub filters: Vec<String>,
    /// Filter list URLs
    pub subscriptions: Vec<String>,
}

impl Default for StoredConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            domains: Vec::new(),
            filters: Vec::new(),
            subscriptions: Vec::new(),
        }
    }
}

impl From<ConfigurationSnapshot> for StoredConfiguration {
    fn from(snapshot: ConfigurationSnapshot) -> Self {
        Self {
            enabled: snapshot.enabled,
            domains: snapshot
                .allowed_domains
                .into_iter()
                .map(|d| d.into_string())
                .collect(),
            filters: snapshot.custom_filters,
            subscriptions: snapshot.filter_lists,
        }
    }
}

/// All persisted configurations, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigurationsDocument {
    configurations: BTreeMap<String, StoredConfiguration>,
}

impl ConfigurationsDocument {
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn insert(&mut self, name: String, configuration: StoredConfiguration) {
        self.configurations.insert(name, configuration);
    }

    pub fn get(&self, name: &str) -> Option<&StoredConfiguration> {
        self.configurations.get(name)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, StoredConfiguration> {
        self.configurations.iter()
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }
}
