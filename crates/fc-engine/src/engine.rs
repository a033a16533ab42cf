//! Reference matching engine
//!
//! Holds the parsed content of every loaded filter list and evaluates
//! configuration snapshots against it.

use std::collections::{BTreeSet, HashMap};

use log::{debug, trace};

use fc_core::configuration::ConfigurationSnapshot;
use fc_core::domain::normalize_url;
use fc_core::engine::{EngineError, MatchingEngine};
use fc_core::types::{Request, Verdict, CUSTOM_FILTERS_SUBSCRIPTION};
use fc_core::url::extract_host;

use crate::matcher::{CompiledList, MatchContext};

/// In-memory engine keyed by filter list URL.
#[derive(Debug, Default)]
pub struct PatternEngine {
    lists: HashMap<String, CompiledList>,
}

impl PatternEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the content behind a filter list URL, replacing any earlier
    /// content. Returns the number of filters kept.
    pub fn load_list(&mut self, url: &str, text: &str) -> usize {
        let key = list_key(url);
        let list = CompiledList::parse(text);
        let count = list.len();
        debug!("Loaded {} filters from {}", count, key);
        self.lists.insert(key, list);
        count
    }

    pub fn unload_list(&mut self, url: &str) -> bool {
        self.lists.remove(&list_key(url)).is_some()
    }

    pub fn has_list(&self, url: &str) -> bool {
        self.lists.contains_key(&list_key(url))
    }

    /// URLs of the loaded lists, sorted.
    pub fn list_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.lists.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Lists of a configuration in evaluation order: subscribed lists that
    /// are loaded, then the custom filters.
    fn sources<'s>(&'s self, config: &ConfigurationSnapshot, custom: &'s CompiledList) -> Vec<(&'s str, &'s CompiledList)> {
        let mut sources: Vec<(&str, &CompiledList)> = Vec::with_capacity(config.filter_lists.len() + 1);
        for url in &config.filter_lists {
            match self.lists.get_key_value(url.as_str()) {
                Some((key, list)) => sources.push((key.as_str(), list)),
                None => trace!("{}: filter list {} not loaded", config.name, url),
            }
        }
        sources.push((CUSTOM_FILTERS_SUBSCRIPTION, custom));
        sources
    }
}

fn list_key(url: &str) -> String {
    normalize_url(url).unwrap_or_else(|| url.trim().to_string())
}

impl MatchingEngine for PatternEngine {
    /// Important blocks win, then exceptions (request-level or `$document`
    /// on an enclosing page), then blocks. Without a block match the verdict
    /// is `NoMatch`.
    fn evaluate(
        &self,
        request: &Request<'_>,
        config: &ConfigurationSnapshot,
    ) -> Result<Verdict, EngineError> {
        let custom = CompiledList::from_filters(&config.custom_filters);
        let sources = self.sources(config, &custom);
        let ctx = MatchContext::from_request(request);

        let mut important_block: Option<&str> = None;
        let mut block: Option<&str> = None;
        let mut allow: Option<&str> = None;

        for &(source, list) in &sources {
            let found = list.match_network(&ctx);
            if found.important_block.is_some() && important_block.is_none() {
                important_block = Some(source);
            }
            if found.block.is_some() && block.is_none() {
                block = Some(source);
            }
            if found.allow.is_some() && allow.is_none() {
                allow = Some(source);
            }
        }

        if let Some(source) = important_block {
            return Ok(Verdict::Block(source.to_string()));
        }

        let Some(block_source) = block else {
            return Ok(Verdict::NoMatch);
        };

        if let Some(source) = allow {
            return Ok(Verdict::Allow(source.to_string()));
        }

        let document_allow = request.site_urls().find_map(|site| {
            sources
                .iter()
                .find(|(_, list)| list.document_exception(site))
                .map(|&(source, _)| source)
        });
        if let Some(source) = document_allow {
            return Ok(Verdict::Allow(source.to_string()));
        }

        Ok(Verdict::Block(block_source.to_string()))
    }

    fn document_allowlisted(
        &self,
        document_url: &str,
        config: &ConfigurationSnapshot,
    ) -> Result<Option<String>, EngineError> {
        let custom = CompiledList::from_filters(&config.custom_filters);
        Ok(self
            .sources(config, &custom)
            .into_iter()
            .find(|(_, list)| list.document_exception(document_url))
            .map(|(source, _)| source.to_string()))
    }

    fn hiding_selectors(
        &self,
        document_url: &str,
        config: &ConfigurationSnapshot,
    ) -> Result<Vec<String>, EngineError> {
        let custom = CompiledList::from_filters(&config.custom_filters);
        let sources = self.sources(config, &custom);

        if sources.iter().any(|(_, list)| list.elemhide_exception(document_url)) {
            return Ok(Vec::new());
        }

        let host = extract_host(document_url).unwrap_or("");
        let mut selectors = BTreeSet::new();
        let mut exceptions = BTreeSet::new();
        for (_, list) in &sources {
            let (found, excepted) = list.hiding_for_host(host);
            selectors.extend(found);
            exceptions.extend(excepted);
        }

        Ok(selectors
            .difference(&exceptions)
            .map(|s| s.to_string())
            .collect())
    }
}
