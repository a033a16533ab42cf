//! Filtering configurations
//!
//! A [`FilteringConfiguration`] is a handle onto name-keyed state owned by a
//! [`ConfigurationRegistry`](crate::registry::ConfigurationRegistry). Every
//! handle bound with the same name reads and mutates the same state, while
//! each handle keeps its own set of observers. A mutation through any handle
//! is reported to the observers of every live handle of that name.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};

use log::debug;
use url::Url;

use crate::domain::{canonicalize, normalize_url, Domain};
use crate::registry::NotificationPolicy;
use crate::url::extract_host;

// =============================================================================
// Observer
// =============================================================================

/// Receives change notifications from a filtering configuration.
///
/// Every method defaults to a no-op. The handle passed in is the one the
/// observer was registered on.
pub trait ConfigurationObserver {
    fn on_enabled_state_changed(&self, _config: &FilteringConfiguration) {}
    fn on_filter_lists_changed(&self, _config: &FilteringConfiguration) {}
    fn on_allowed_domains_changed(&self, _config: &FilteringConfiguration) {}
    fn on_custom_filters_changed(&self, _config: &FilteringConfiguration) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    EnabledState,
    FilterLists,
    AllowedDomains,
    CustomFilters,
}

impl Change {
    fn deliver(self, observer: &dyn ConfigurationObserver, config: &FilteringConfiguration) {
        match self {
            Self::EnabledState => observer.on_enabled_state_changed(config),
            Self::FilterLists => observer.on_filter_lists_changed(config),
            Self::AllowedDomains => observer.on_allowed_domains_changed(config),
            Self::CustomFilters => observer.on_custom_filters_changed(config),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EnabledState => "enabled state",
            Self::FilterLists => "filter lists",
            Self::AllowedDomains => "allowed domains",
            Self::CustomFilters => "custom filters",
        })
    }
}

// =============================================================================
// Shared State
// =============================================================================

#[derive(Debug, Clone)]
struct ConfigurationState {
    enabled: bool,
    filter_lists: Vec<String>,
    allowed_domains: BTreeSet<Domain>,
    custom_filters: Vec<String>,
}

impl Default for ConfigurationState {
    fn default() -> Self {
        Self {
            enabled: true,
            filter_lists: Vec::new(),
            allowed_domains: BTreeSet::new(),
            custom_filters: Vec::new(),
        }
    }
}

/// Append `value` unless present. Returns true if the list changed.
fn append_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        return false;
    }
    list.push(value.to_string());
    true
}

/// Remove `value` if present. Returns true if the list changed.
fn remove_value(list: &mut Vec<String>, value: &str) -> bool {
    let before = list.len();
    list.retain(|v| v != value);
    list.len() != before
}

type ObserverSet = RefCell<Vec<Rc<dyn ConfigurationObserver>>>;

/// State behind one configuration name, shared by all of its handles.
pub(crate) struct SharedConfiguration {
    name: String,
    policy: NotificationPolicy,
    state: RefCell<ConfigurationState>,
    /// Observer sets of the live handles, in bind order.
    bound: RefCell<Vec<Weak<ObserverSet>>>,
}

impl SharedConfiguration {
    pub(crate) fn new(name: &str, policy: NotificationPolicy) -> Self {
        Self {
            name: name.to_string(),
            policy,
            state: RefCell::new(ConfigurationState::default()),
            bound: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.state.borrow().enabled
    }

    /// Number of handles still alive.
    pub(crate) fn live_handles(&self) -> usize {
        self.bound.borrow().iter().filter(|w| w.strong_count() > 0).count()
    }

    pub(crate) fn snapshot(&self) -> ConfigurationSnapshot {
        let state = self.state.borrow();
        ConfigurationSnapshot {
            name: self.name.clone(),
            enabled: state.enabled,
            filter_lists: state.filter_lists.clone(),
            allowed_domains: state.allowed_domains.iter().cloned().collect(),
            custom_filters: state.custom_filters.clone(),
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Handle onto a named filtering configuration.
///
/// Obtained from [`ConfigurationRegistry::bind`](crate::registry::ConfigurationRegistry::bind).
pub struct FilteringConfiguration {
    shared: Rc<SharedConfiguration>,
    observers: Rc<ObserverSet>,
}

impl FilteringConfiguration {
    pub(crate) fn bind(shared: Rc<SharedConfiguration>) -> Self {
        let observers: Rc<ObserverSet> = Rc::new(RefCell::new(Vec::new()));
        {
            let mut bound = shared.bound.borrow_mut();
            bound.retain(|w| w.strong_count() > 0);
            bound.push(Rc::downgrade(&observers));
        }
        Self { shared, observers }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    // -------------------------------------------------------------------------
    // Enabled state
    // -------------------------------------------------------------------------

    pub fn set_enabled(&self, enabled: bool) {
        let changed = {
            let mut state = self.shared.state.borrow_mut();
            let changed = state.enabled != enabled;
            state.enabled = enabled;
            changed
        };
        debug!("Configuration {}: enabled = {}", self.name(), enabled);
        self.notify(Change::EnabledState, changed);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.is_enabled()
    }

    // -------------------------------------------------------------------------
    // Filter lists
    // -------------------------------------------------------------------------

    /// Subscribe to a filter list. Unparseable URLs are ignored.
    pub fn add_filter_list(&self, url: &str) {
        let Some(url) = normalize_url(url) else {
            debug!("Configuration {}: ignoring invalid filter list {:?}", self.name(), url);
            return;
        };
        let changed = append_unique(&mut self.shared.state.borrow_mut().filter_lists, &url);
        debug!("Configuration {}: filter list added {}", self.name(), url);
        self.notify(Change::FilterLists, changed);
    }

    pub fn remove_filter_list(&self, url: &str) {
        let Some(url) = normalize_url(url) else {
            debug!("Configuration {}: ignoring invalid filter list {:?}", self.name(), url);
            return;
        };
        let changed = remove_value(&mut self.shared.state.borrow_mut().filter_lists, &url);
        debug!("Configuration {}: filter list removed {}", self.name(), url);
        self.notify(Change::FilterLists, changed);
    }

    /// Filter list URLs in insertion order.
    pub fn filter_lists(&self) -> Vec<String> {
        self.shared.state.borrow().filter_lists.clone()
    }

    // -------------------------------------------------------------------------
    // Allowed domains
    // -------------------------------------------------------------------------

    /// Allow every request on `raw` (a domain or URL) and its subdomains.
    /// Input that cannot be canonicalized is ignored without notification.
    pub fn add_allowed_domain(&self, raw: &str) {
        let domain = match canonicalize(raw) {
            Ok(domain) => domain,
            Err(e) => {
                debug!("Configuration {}: {}", self.name(), e);
                return;
            }
        };
        debug!("Configuration {}: allowed domain added {}", self.name(), domain);
        let changed = self.shared.state.borrow_mut().allowed_domains.insert(domain);
        self.notify(Change::AllowedDomains, changed);
    }

    pub fn remove_allowed_domain(&self, raw: &str) {
        let domain = match canonicalize(raw) {
            Ok(domain) => domain,
            Err(e) => {
                debug!("Configuration {}: {}", self.name(), e);
                return;
            }
        };
        debug!("Configuration {}: allowed domain removed {}", self.name(), domain);
        let changed = self.shared.state.borrow_mut().allowed_domains.remove(&domain);
        self.notify(Change::AllowedDomains, changed);
    }

    /// Allowed domains, sorted ascending.
    pub fn allowed_domains(&self) -> Vec<String> {
        self.shared
            .state
            .borrow()
            .allowed_domains
            .iter()
            .map(|d| d.as_str().to_string())
            .collect()
    }

    // -------------------------------------------------------------------------
    // Custom filters
    // -------------------------------------------------------------------------

    pub fn add_custom_filter(&self, filter: &str) {
        let changed = append_unique(&mut self.shared.state.borrow_mut().custom_filters, filter);
        debug!("Configuration {}: custom filter added {:?}", self.name(), filter);
        self.notify(Change::CustomFilters, changed);
    }

    pub fn remove_custom_filter(&self, filter: &str) {
        let changed = remove_value(&mut self.shared.state.borrow_mut().custom_filters, filter);
        debug!("Configuration {}: custom filter removed {:?}", self.name(), filter);
        self.notify(Change::CustomFilters, changed);
    }

    /// Custom filters in insertion order.
    pub fn custom_filters(&self) -> Vec<String> {
        self.shared.state.borrow().custom_filters.clone()
    }

    // -------------------------------------------------------------------------
    // Observers
    // -------------------------------------------------------------------------

    /// Register an observer on this handle. Adding the same observer twice
    /// has no effect.
    pub fn add_observer(&self, observer: Rc<dyn ConfigurationObserver>) {
        let mut observers = self.observers.borrow_mut();
        let ptr = Rc::as_ptr(&observer).cast::<()>();
        if !observers.iter().any(|o| Rc::as_ptr(o).cast::<()>() == ptr) {
            observers.push(observer);
        }
    }

    /// Unregister an observer by identity.
    pub fn remove_observer<O: ConfigurationObserver + ?Sized>(&self, observer: &Rc<O>) {
        let ptr = Rc::as_ptr(observer).cast::<()>();
        self.observers
            .borrow_mut()
            .retain(|o| Rc::as_ptr(o).cast::<()>() != ptr);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> ConfigurationSnapshot {
        self.shared.snapshot()
    }

    /// Deliver a change to the observers of every live handle of this name.
    ///
    /// Observer lists are copied first, so callbacks may mutate the
    /// configuration or (un)register observers.
    fn notify(&self, change: Change, changed: bool) {
        if !changed && self.shared.policy == NotificationPolicy::OnChange {
            return;
        }

        let mut targets = Vec::new();
        {
            let mut bound = self.shared.bound.borrow_mut();
            bound.retain(|w| w.strong_count() > 0);
            for weak in bound.iter() {
                if let Some(set) = weak.upgrade() {
                    let observers = set.borrow().clone();
                    targets.push((set, observers));
                }
            }
        }

        debug!(
            "Configuration {}: notifies {} observers about {}",
            self.name(),
            targets.iter().map(|(_, o)| o.len()).sum::<usize>(),
            change
        );

        for (set, observers) in targets {
            let handle = FilteringConfiguration {
                shared: Rc::clone(&self.shared),
                observers: set,
            };
            for observer in observers {
                change.deliver(observer.as_ref(), &handle);
            }
        }
    }
}

impl fmt::Debug for FilteringConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteringConfiguration")
            .field("name", &self.shared.name)
            .field("state", &*self.shared.state.borrow())
            .field("observers", &self.observer_count())
            .finish()
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Read-only copy of one configuration, handed to matching engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationSnapshot {
    pub name: String,
    pub enabled: bool,
    pub filter_lists: Vec<String>,
    pub allowed_domains: Vec<Domain>,
    pub custom_filters: Vec<String>,
}

impl ConfigurationSnapshot {
    /// True if `host` is one of the allowed domains or a subdomain of one.
    pub fn covers(&self, host: &str) -> bool {
        self.allowed_domains.iter().any(|d| d.covers(host))
    }

    /// True if the site of `url` is an allowed domain.
    pub fn allows_site(&self, url: &str) -> bool {
        let Some(host) = extract_host(url) else {
            return false;
        };
        if host.is_ascii() {
            return self.covers(host);
        }
        // Allowed domains are stored in punycode.
        Url::parse(url)
            .ok()
            .as_ref()
            .and_then(Url::host_str)
            .is_some_and(|host| self.covers(host.trim_end_matches('.')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConfigurationRegistry, RegistryOptions};
    use std::cell::Cell;

    #[derive(Default)]
    struct Recorder {
        enabled: Cell<u32>,
        lists: Cell<u32>,
        domains: Cell<u32>,
        filters: Cell<u32>,
    }

    impl ConfigurationObserver for Recorder {
        fn on_enabled_state_changed(&self, _config: &FilteringConfiguration) {
            self.enabled.set(self.enabled.get() + 1);
        }
        fn on_filter_lists_changed(&self, _config: &FilteringConfiguration) {
            self.lists.set(self.lists.get() + 1);
        }
        fn on_allowed_domains_changed(&self, _config: &FilteringConfiguration) {
            self.domains.set(self.domains.get() + 1);
        }
        fn on_custom_filters_changed(&self, _config: &FilteringConfiguration) {
            self.filters.set(self.filters.get() + 1);
        }
    }

    #[test]
    fn test_defaults() {
        let registry = ConfigurationRegistry::new();
        let config = registry.bind("adblock");
        assert_eq!(config.name(), "adblock");
        assert!(config.is_enabled());
        assert!(config.filter_lists().is_empty());
        assert!(config.allowed_domains().is_empty());
        assert!(config.custom_filters().is_empty());
    }

    #[test]
    fn test_allowed_domains_sorted_and_deduplicated() {
        let registry = ConfigurationRegistry::new();
        let a = registry.bind("a");
        a.add_allowed_domain("foobar.com");
        a.add_allowed_domain("foobar.com");
        a.add_allowed_domain("domain.com/path");
        assert_eq!(a.allowed_domains(), vec!["domain.com", "foobar.com"]);

        let b = registry.bind("b");
        b.add_allowed_domain("https://scheme.com/path.html");
        b.add_allowed_domain("https://second.com");
        b.remove_allowed_domain("https://second.com");
        b.add_allowed_domain("gibberish");
        assert_eq!(b.allowed_domains(), vec!["scheme.com", "www.gibberish.com"]);
    }

    #[test]
    fn test_custom_filters_order() {
        let registry = ConfigurationRegistry::new();
        let a = registry.bind("a");
        a.add_custom_filter("foobar.com");
        a.add_custom_filter("foobar.com");
        a.add_custom_filter("abc");
        assert_eq!(a.custom_filters(), vec!["foobar.com", "abc"]);

        let b = registry.bind("b");
        b.add_custom_filter("https://scheme.com/path.html");
        b.add_custom_filter("https://second.com");
        b.remove_custom_filter("https://second.com");
        assert_eq!(b.custom_filters(), vec!["https://scheme.com/path.html"]);

        // Re-adding appends at the end
        a.remove_custom_filter("foobar.com");
        a.add_custom_filter("foobar.com");
        assert_eq!(a.custom_filters(), vec!["abc", "foobar.com"]);
    }

    #[test]
    fn test_filter_lists() {
        let registry = ConfigurationRegistry::new();
        let list1 = "http://filters.com/list1.txt";
        let list2 = "http://filters.com/list2.txt";

        let a = registry.bind("a");
        a.add_filter_list(list1);
        a.add_filter_list(list2);
        a.add_filter_list(list1);
        assert_eq!(a.filter_lists(), vec![list1, list2]);

        let b = registry.bind("b");
        b.add_filter_list(list1);
        b.add_filter_list(list2);
        b.remove_filter_list(list1);
        assert_eq!(b.filter_lists(), vec![list2]);
    }

    #[test]
    fn test_invalid_filter_list_ignored() {
        let registry = ConfigurationRegistry::new();
        let a = registry.bind("a");
        let recorder = Rc::new(Recorder::default());
        a.add_observer(recorder.clone());

        a.add_filter_list("not a url");
        assert!(a.filter_lists().is_empty());
        assert_eq!(recorder.lists.get(), 0);

        a.add_filter_list("HTTP://Filters.com");
        assert_eq!(a.filter_lists(), vec!["http://filters.com/"]);
    }

    #[test]
    fn test_aliasing() {
        let registry = ConfigurationRegistry::new();
        let a = registry.bind("adblock");
        let alias = registry.bind("adblock");

        a.add_filter_list("http://filters.com/list1.txt");
        a.add_filter_list("http://filters.com/list2.txt");
        assert_eq!(a.filter_lists(), alias.filter_lists());

        alias.set_enabled(false);
        assert!(!a.is_enabled());

        alias.add_allowed_domain("test.org");
        assert_eq!(a.allowed_domains(), vec!["test.org"]);
    }

    #[test]
    fn test_notifications_reach_alias_observers() {
        let registry = ConfigurationRegistry::new();
        let a = registry.bind("adblock");
        let alias = registry.bind("adblock");
        let other = registry.bind("other");

        let on_a = Rc::new(Recorder::default());
        let on_alias = Rc::new(Recorder::default());
        let on_other = Rc::new(Recorder::default());
        a.add_observer(on_a.clone());
        alias.add_observer(on_alias.clone());
        other.add_observer(on_other.clone());

        a.add_filter_list("http://filters.com/list1.txt");
        alias.add_custom_filter("abc");
        a.set_enabled(false);
        alias.add_allowed_domain("test.org");

        for recorder in [&on_a, &on_alias] {
            assert_eq!(recorder.lists.get(), 1);
            assert_eq!(recorder.filters.get(), 1);
            assert_eq!(recorder.enabled.get(), 1);
            assert_eq!(recorder.domains.get(), 1);
        }
        assert_eq!(on_other.lists.get(), 0);
        assert_eq!(on_other.enabled.get(), 0);
    }

    #[test]
    fn test_invalid_domain_never_notifies() {
        let registry = ConfigurationRegistry::new();
        let a = registry.bind("a");
        let recorder = Rc::new(Recorder::default());
        a.add_observer(recorder.clone());

        a.add_allowed_domain("");
        a.add_allowed_domain("exa mple.com");
        a.remove_allowed_domain("   ");
        assert!(a.allowed_domains().is_empty());
        assert_eq!(recorder.domains.get(), 0);
    }

    #[test]
    fn test_every_call_policy_notifies_redundant_calls() {
        let registry = ConfigurationRegistry::new();
        let a = registry.bind("a");
        let recorder = Rc::new(Recorder::default());
        a.add_observer(recorder.clone());

        a.set_enabled(true);
        a.add_custom_filter("abc");
        a.add_custom_filter("abc");
        a.remove_custom_filter("missing");
        assert_eq!(recorder.enabled.get(), 1);
        assert_eq!(recorder.filters.get(), 3);
    }

    #[test]
    fn test_on_change_policy_suppresses_redundant_calls() {
        let registry = ConfigurationRegistry::with_options(RegistryOptions {
            notification_policy: NotificationPolicy::OnChange,
        });
        let a = registry.bind("a");
        let recorder = Rc::new(Recorder::default());
        a.add_observer(recorder.clone());

        a.set_enabled(true);
        a.add_custom_filter("abc");
        a.add_custom_filter("abc");
        a.remove_custom_filter("missing");
        a.add_allowed_domain("test.org");
        a.add_allowed_domain("https://test.org/");
        assert_eq!(recorder.enabled.get(), 0);
        assert_eq!(recorder.filters.get(), 1);
        assert_eq!(recorder.domains.get(), 1);
    }

    #[test]
    fn test_remove_observer() {
        let registry = ConfigurationRegistry::new();
        let a = registry.bind("a");
        let recorder = Rc::new(Recorder::default());
        a.add_observer(recorder.clone());
        a.add_observer(recorder.clone());
        assert_eq!(a.observer_count(), 1);

        a.add_custom_filter("abc");
        a.remove_observer(&recorder);
        a.add_custom_filter("def");
        assert_eq!(recorder.filters.get(), 1);
        assert_eq!(a.observer_count(), 0);
    }

    #[test]
    fn test_dropped_handle_stops_receiving() {
        let registry = ConfigurationRegistry::new();
        let a = registry.bind("a");
        let recorder = Rc::new(Recorder::default());
        {
            let alias = registry.bind("a");
            alias.add_observer(recorder.clone());
            a.add_custom_filter("abc");
        }
        a.add_custom_filter("def");
        assert_eq!(recorder.filters.get(), 1);
        assert_eq!(a.custom_filters(), vec!["abc", "def"]);
    }

    /// Mutates the configuration and unregisters itself from inside a callback.
    struct SelfRemoving {
        calls: Cell<u32>,
        me: RefCell<Option<Rc<SelfRemoving>>>,
    }

    impl ConfigurationObserver for SelfRemoving {
        fn on_custom_filters_changed(&self, config: &FilteringConfiguration) {
            self.calls.set(self.calls.get() + 1);
            if let Some(me) = self.me.borrow_mut().take() {
                config.remove_observer(&me);
                config.add_allowed_domain("reentrant.org");
            }
        }
    }

    #[test]
    fn test_observer_may_mutate_from_callback() {
        let registry = ConfigurationRegistry::new();
        let a = registry.bind("a");
        let observer = Rc::new(SelfRemoving {
            calls: Cell::new(0),
            me: RefCell::new(None),
        });
        *observer.me.borrow_mut() = Some(observer.clone());
        a.add_observer(observer.clone());

        a.add_custom_filter("abc");
        a.add_custom_filter("def");
        assert_eq!(observer.calls.get(), 1);
        assert_eq!(a.allowed_domains(), vec!["reentrant.org"]);
        assert_eq!(a.observer_count(), 0);
    }

    #[test]
    fn test_snapshot_allows_site() {
        let registry = ConfigurationRegistry::new();
        let a = registry.bind("a");
        a.add_allowed_domain("test.org");
        let snapshot = a.snapshot();
        assert_eq!(snapshot.name, "a");
        assert!(snapshot.allows_site("https://www.test.org/page"));
        assert!(!snapshot.allows_site("https://example.com/"));
        assert!(!snapshot.allows_site("about:blank"));
    }

    #[test]
    fn test_allows_unicode_site() {
        let registry = ConfigurationRegistry::new();
        let a = registry.bind("a");
        a.add_allowed_domain("ÄÖ.de");
        assert_eq!(a.allowed_domains(), vec!["xn--4ca0b.de"]);

        let snapshot = a.snapshot();
        assert!(snapshot.allows_site("https://äö.de/page"));
        assert!(snapshot.allows_site("https://www.ÄÖ.de/"));
        assert!(snapshot.allows_site("https://xn--4ca0b.de/"));
        assert!(!snapshot.allows_site("https://öä.de/"));
    }
}
