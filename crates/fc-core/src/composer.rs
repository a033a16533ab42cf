//! Decision composer
//!
//! Reduces the verdicts of several configurations to one decision.
//!
//! Within a configuration an allowed domain wins over every filter. Across
//! configurations a block anywhere wins over allows elsewhere, so one
//! configuration allowlisting a site cannot unblock what another blocks.

use std::collections::BTreeSet;

use log::{trace, warn};

use crate::configuration::ConfigurationSnapshot;
use crate::engine::MatchingEngine;
use crate::types::{Decision, Request, Verdict, CUSTOM_FILTERS_SUBSCRIPTION};

/// Composed decision and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalDecision {
    pub decision: Decision,
    /// Name of the configuration that decided
    pub configuration: String,
    /// Filter list URL, or `adblock:custom`
    pub subscription: String,
}

impl FinalDecision {
    pub fn is_blocked(&self) -> bool {
        self.decision == Decision::Blocked
    }
}

/// Combine per-configuration verdicts, given in a stable order.
///
/// Any block gives `Blocked`, otherwise any allow gives `Allowed`, otherwise
/// there is no decision. The first verdict of the winning kind is reported.
pub fn combine<'a, I>(verdicts: I) -> Option<FinalDecision>
where
    I: IntoIterator<Item = (&'a str, Verdict)>,
{
    let mut first_allow: Option<FinalDecision> = None;

    for (configuration, verdict) in verdicts {
        match verdict {
            Verdict::Block(subscription) => {
                return Some(FinalDecision {
                    decision: Decision::Blocked,
                    configuration: configuration.to_string(),
                    subscription,
                });
            }
            Verdict::Allow(subscription) => {
                if first_allow.is_none() {
                    first_allow = Some(FinalDecision {
                        decision: Decision::Allowed,
                        configuration: configuration.to_string(),
                        subscription,
                    });
                }
            }
            Verdict::NoMatch => {}
        }
    }

    first_allow
}

/// Composes engine verdicts over a set of configuration snapshots.
pub struct DecisionComposer<'e, E: MatchingEngine + ?Sized> {
    engine: &'e E,
}

impl<'e, E: MatchingEngine + ?Sized> DecisionComposer<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self { engine }
    }

    /// Verdict of a single configuration.
    pub fn resolve(&self, request: &Request<'_>, config: &ConfigurationSnapshot) -> Verdict {
        if !config.enabled {
            return Verdict::NoMatch;
        }

        if request.site_urls().any(|url| config.allows_site(url)) {
            trace!("{}: {} allowed by domain", config.name, request.url);
            return Verdict::Allow(CUSTOM_FILTERS_SUBSCRIPTION.to_string());
        }

        match self.engine.evaluate(request, config) {
            Ok(verdict) => {
                trace!("{}: {} -> {:?}", config.name, request.url, verdict);
                verdict
            }
            Err(e) => {
                warn!("{}: evaluating {} failed: {}", config.name, request.url, e);
                Verdict::NoMatch
            }
        }
    }

    /// Final decision for `request`, or `None` when nothing matched.
    pub fn compose(
        &self,
        request: &Request<'_>,
        configs: &[ConfigurationSnapshot],
    ) -> Option<FinalDecision> {
        combine(
            configs
                .iter()
                .map(|config| (config.name.as_str(), self.resolve(request, config))),
        )
    }

    /// Allow decision for a whole page.
    ///
    /// A page counts as allowed only when at least one configuration is
    /// enabled and every enabled configuration allowlists it, either by an
    /// allowed domain or by a document exception.
    pub fn document_allowlisted(
        &self,
        document_url: &str,
        configs: &[ConfigurationSnapshot],
    ) -> Option<FinalDecision> {
        let mut first: Option<FinalDecision> = None;

        for config in configs.iter().filter(|c| c.enabled) {
            let subscription = if config.allows_site(document_url) {
                CUSTOM_FILTERS_SUBSCRIPTION.to_string()
            } else {
                match self.engine.document_allowlisted(document_url, config) {
                    Ok(Some(subscription)) => subscription,
                    Ok(None) => return None,
                    Err(e) => {
                        warn!("{}: document check for {} failed: {}", config.name, document_url, e);
                        return None;
                    }
                }
            };

            if first.is_none() {
                first = Some(FinalDecision {
                    decision: Decision::Allowed,
                    configuration: config.name.clone(),
                    subscription,
                });
            }
        }

        first
    }

    /// Union of the element hiding selectors of every enabled configuration,
    /// sorted and deduplicated. Configurations allowlisting the document
    /// contribute nothing.
    pub fn hiding_selectors(
        &self,
        document_url: &str,
        configs: &[ConfigurationSnapshot],
    ) -> Vec<String> {
        let mut selectors = BTreeSet::new();

        for config in configs.iter().filter(|c| c.enabled) {
            if config.allows_site(document_url) {
                continue;
            }
            match self.engine.hiding_selectors(document_url, config) {
                Ok(found) => selectors.extend(found),
                Err(e) => warn!("{}: selectors for {} failed: {}", config.name, document_url, e),
            }
        }

        selectors.into_iter().collect()
    }
}
