//! Configuration registry
//!
//! The registry owns the state behind every configuration name. It is an
//! explicit context object: hosts create one and pass it (or a clone, which
//! shares the same entries) to whatever needs to bind configurations.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::configuration::{ConfigurationSnapshot, FilteringConfiguration, SharedConfiguration};
use crate::persist::{ConfigurationsDocument, StoredConfiguration};

// =============================================================================
// Options
// =============================================================================

/// When configuration observers are notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPolicy {
    /// Notify on every successful mutating call, even when nothing changed.
    #[default]
    EveryCall,
    /// Notify only when the call changed the stored state.
    OnChange,
}

/// Registry-wide options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryOptions {
    pub notification_policy: NotificationPolicy,
}

// =============================================================================
// Registry
// =============================================================================

struct RegistryInner {
    options: RegistryOptions,
    entries: RefCell<BTreeMap<String, Rc<SharedConfiguration>>>,
}

/// Name-keyed store of filtering configurations.
#[derive(Clone)]
pub struct ConfigurationRegistry {
    inner: Rc<RegistryInner>,
}

impl Default for ConfigurationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationRegistry {
    pub fn new() -> Self {
        Self::with_options(RegistryOptions::default())
    }

    pub fn with_options(options: RegistryOptions) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                options,
                entries: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    pub fn options(&self) -> RegistryOptions {
        self.inner.options
    }

    /// Get a handle for `name`, creating the configuration on first use.
    ///
    /// Handles bound with the same name share state but not observers.
    pub fn bind(&self, name: &str) -> FilteringConfiguration {
        let shared = {
            let mut entries = self.inner.entries.borrow_mut();
            match entries.get(name) {
                Some(shared) => Rc::clone(shared),
                None => {
                    debug!("Creating filtering configuration {name}");
                    let shared = Rc::new(SharedConfiguration::new(
                        name,
                        self.inner.options.notification_policy,
                    ));
                    entries.insert(name.to_string(), Rc::clone(&shared));
                    shared
                }
            }
        };
        let handle = FilteringConfiguration::bind(shared);
        debug!(
            "Bound configuration {name} ({} live handles)",
            self.live_handles(name)
        );
        handle
    }

    /// Configuration names in ascending order.
    pub fn names(&self) -> Vec<String> {
        self.inner.entries.borrow().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.entries.borrow().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    /// Number of live handles bound to `name`.
    pub fn live_handles(&self, name: &str) -> usize {
        self.inner
            .entries
            .borrow()
            .get(name)
            .map_or(0, |shared| shared.live_handles())
    }

    /// Snapshot of one configuration. Unknown names yield `None`.
    pub fn snapshot(&self, name: &str) -> Option<ConfigurationSnapshot> {
        self.inner.entries.borrow().get(name).map(|shared| shared.snapshot())
    }

    /// Snapshots of all configurations, in name order.
    pub fn snapshots(&self) -> Vec<ConfigurationSnapshot> {
        self.inner
            .entries
            .borrow()
            .values()
            .map(|shared| shared.snapshot())
            .collect()
    }

    /// Snapshots of the enabled configurations, in name order.
    pub fn enabled_snapshots(&self) -> Vec<ConfigurationSnapshot> {
        self.inner
            .entries
            .borrow()
            .values()
            .filter(|shared| shared.is_enabled())
            .map(|shared| shared.snapshot())
            .collect()
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Export every configuration into the persisted layout.
    pub fn export(&self) -> ConfigurationsDocument {
        let mut doc = ConfigurationsDocument::default();
        for snapshot in self.snapshots() {
            let name = snapshot.name.clone();
            doc.insert(name, StoredConfiguration::from(snapshot));
        }
        doc
    }

    /// Load a persisted document. Entries are merged into existing
    /// configurations through the regular mutators, so observers of already
    /// bound handles are notified.
    pub fn restore(&self, doc: &ConfigurationsDocument) {
        for (name, stored) in doc.iter() {
            debug!("Restoring configuration {name}");
            let config = self.bind(name);
            if config.is_enabled() != stored.enabled {
                config.set_enabled(stored.enabled);
            }
            for url in &stored.subscriptions {
                config.add_filter_list(url);
            }
            for domain in &stored.domains {
                config.add_allowed_domain(domain);
            }
            for filter in &stored.filters {
                config.add_custom_filter(filter);
            }
        }
    }
}

impl std::fmt::Debug for ConfigurationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationRegistry")
            .field("options", &self.inner.options)
            .field("names", &self.names())
            .finish()
    }
}
