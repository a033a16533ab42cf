//! Classification runner
//!
//! Ties a registry, a matching engine and a notifier together. Hosts create
//! one runner per browsing context and route every request, page load and
//! popup through it.

use std::rc::Rc;

use log::debug;

use crate::composer::{DecisionComposer, FinalDecision};
use crate::configuration::FilteringConfiguration;
use crate::engine::MatchingEngine;
use crate::notifier::{ClassificationEvent, ClassificationNotifier, ClassificationObserver, ResourceInfo};
use crate::registry::{ConfigurationRegistry, RegistryOptions};
use crate::types::{ContentType, Decision, Request};

pub struct ClassificationRunner<E: MatchingEngine> {
    registry: ConfigurationRegistry,
    notifier: ClassificationNotifier,
    engine: E,
}

impl<E: MatchingEngine> ClassificationRunner<E> {
    pub fn new(engine: E) -> Self {
        Self::from_parts(ConfigurationRegistry::new(), ClassificationNotifier::new(), engine)
    }

    pub fn with_options(engine: E, options: RegistryOptions) -> Self {
        Self::from_parts(
            ConfigurationRegistry::with_options(options),
            ClassificationNotifier::new(),
            engine,
        )
    }

    pub fn from_parts(
        registry: ConfigurationRegistry,
        notifier: ClassificationNotifier,
        engine: E,
    ) -> Self {
        Self {
            registry,
            notifier,
            engine,
        }
    }

    pub fn registry(&self) -> &ConfigurationRegistry {
        &self.registry
    }

    pub fn notifier(&self) -> &ClassificationNotifier {
        &self.notifier
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Bind a configuration by name.
    pub fn configuration(&self, name: &str) -> FilteringConfiguration {
        self.registry.bind(name)
    }

    pub fn add_observer(&self, observer: Rc<dyn ClassificationObserver>) {
        self.notifier.add_observer(observer);
    }

    fn composer(&self) -> DecisionComposer<'_, E> {
        DecisionComposer::new(&self.engine)
    }

    /// Classify a network request and report the outcome.
    ///
    /// Requests with [`ContentType::Popup`] raise popup events, everything
    /// else raises ad events. Returns `None` when no filter matched, in which
    /// case nothing is reported.
    pub fn check_request(&self, request: &Request<'_>) -> Option<Decision> {
        let configs = self.registry.enabled_snapshots();
        let decision = self.composer().compose(request, &configs)?;
        debug!(
            "{} {:?} by {} ({})",
            request.url, decision.decision, decision.configuration, decision.subscription
        );

        let info = resource_info(request, &decision);
        let popup = request.content_type == ContentType::Popup;
        let event = match (decision.decision, popup) {
            (Decision::Blocked, false) => ClassificationEvent::AdBlocked(info),
            (Decision::Allowed, false) => ClassificationEvent::AdAllowed(info),
            (Decision::Blocked, true) => ClassificationEvent::PopupBlocked(info),
            (Decision::Allowed, true) => ClassificationEvent::PopupAllowed(info),
        };
        self.notifier.notify(event);

        Some(decision.decision)
    }

    /// Check whether a whole page is allowlisted, reporting `PageAllowed`
    /// when it is.
    pub fn check_document(&self, document_url: &str, tab_id: i32) -> bool {
        let configs = self.registry.enabled_snapshots();
        let Some(decision) = self.composer().document_allowlisted(document_url, &configs) else {
            return false;
        };
        debug!("{} page allowed by {}", document_url, decision.configuration);

        let request = Request::new(document_url, ContentType::Document).with_tab(tab_id);
        self.notifier
            .notify(ClassificationEvent::PageAllowed(resource_info(&request, &decision)));
        true
    }

    /// Classify a popup opened by `opener_url`.
    pub fn check_popup(&self, popup_url: &str, opener_url: &str, tab_id: i32) -> Option<Decision> {
        let opener = [opener_url];
        let request = Request::new(popup_url, ContentType::Popup)
            .with_frames(&opener)
            .with_tab(tab_id);
        self.check_request(&request)
    }

    /// Element hiding selectors for a document, merged over all enabled
    /// configurations.
    pub fn element_hiding_selectors(&self, document_url: &str) -> Vec<String> {
        let configs = self.registry.enabled_snapshots();
        self.composer().hiding_selectors(document_url, &configs)
    }
}

fn resource_info(request: &Request<'_>, decision: &FinalDecision) -> ResourceInfo {
    ResourceInfo {
        request_url: request.url.to_string(),
        parent_frame_urls: request.frame_hierarchy.iter().map(|s| s.to_string()).collect(),
        subscription_url: decision.subscription.clone(),
        content_type: request.content_type,
        tab_id: request.tab_id,
    }
}
