//! Matching engine interface
//!
//! The engine owns filter-list syntax and pattern matching. The composer only
//! sees its per-configuration verdicts.

use thiserror::Error;

use crate::configuration::ConfigurationSnapshot;
use crate::types::{Request, Verdict};

/// Error reported by a matching engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Matching engine unavailable")]
    Unavailable,

    #[error("Matching failed: {0}")]
    Failed(String),
}

/// Evaluates requests against one configuration at a time.
pub trait MatchingEngine {
    /// Verdict for `request` under `config`'s filter lists and custom filters.
    ///
    /// Allowed domains are handled by the composer and need not be checked.
    fn evaluate(
        &self,
        request: &Request<'_>,
        config: &ConfigurationSnapshot,
    ) -> Result<Verdict, EngineError>;

    /// Subscription of a document-level exception covering `document_url`,
    /// if any.
    fn document_allowlisted(
        &self,
        _document_url: &str,
        _config: &ConfigurationSnapshot,
    ) -> Result<Option<String>, EngineError> {
        Ok(None)
    }

    /// Element hiding selectors `config` applies to `document_url`.
    fn hiding_selectors(
        &self,
        _document_url: &str,
        _config: &ConfigurationSnapshot,
    ) -> Result<Vec<String>, EngineError> {
        Ok(Vec::new())
    }
}

impl<E: MatchingEngine + ?Sized> MatchingEngine for &E {
    fn evaluate(
        &self,
        request: &Request<'_>,
        config: &ConfigurationSnapshot,
    ) -> Result<Verdict, EngineError> {
        (**self).evaluate(request, config)
    }

    fn document_allowlisted(
        &self,
        document_url: &str,
        config: &ConfigurationSnapshot,
    ) -> Result<Option<String>, EngineError> {
        (**self).document_allowlisted(document_url, config)
    }

    fn hiding_selectors(
        &self,
        document_url: &str,
        config: &ConfigurationSnapshot,
    ) -> Result<Vec<String>, EngineError> {
        (**self).hiding_selectors(document_url, config)
    }
}
