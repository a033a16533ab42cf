//! Domain canonicalization
//!
//! Turns user input (a bare domain, a domain with a path, or a full URL) into
//! the canonical host string stored as an allowed domain.

use std::fmt;

use thiserror::Error;
use url::{Host, Url};

use crate::url::host_matches_domain;

/// Error returned when input cannot be turned into a domain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanonicalizeError {
    #[error("Invalid domain input: {0:?}")]
    InvalidInput(String),
}

/// A canonical, lower-case host name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Domain(String);

impl Domain {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// True if `host` is this domain or one of its subdomains.
    pub fn covers(&self, host: &str) -> bool {
        host_matches_domain(host, &self.0)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Guess a full URL from partial input.
///
/// Input without a scheme gets `http://`. A single-label host is expanded to
/// `www.<label>.com`.
pub fn guess_url(raw: &str) -> Result<Url, CanonicalizeError> {
    let invalid = || CanonicalizeError::InvalidInput(raw.to_string());

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let mut url = Url::parse(&candidate).map_err(|_| invalid())?;

    let single_label = match url.host() {
        Some(Host::Domain(host)) => {
            let host = host.trim_end_matches('.');
            if host.is_empty() {
                return Err(invalid());
            }
            if host.contains('.') {
                None
            } else {
                Some(format!("www.{host}.com"))
            }
        }
        Some(_) => None,
        None => return Err(invalid()),
    };

    if let Some(expanded) = single_label {
        url.set_host(Some(&expanded)).map_err(|_| invalid())?;
    }

    Ok(url)
}

/// Normalize an absolute URL to its serialized form (`HTTP://A.com` becomes
/// `http://a.com/`). Returns `None` for input that is not an absolute URL.
pub fn normalize_url(raw: &str) -> Option<String> {
    Url::parse(raw.trim()).ok().map(|u| u.to_string())
}

/// Canonicalize raw input into a [`Domain`].
pub fn canonicalize(raw: &str) -> Result<Domain, CanonicalizeError> {
    let url = guess_url(raw)?;
    let host = url
        .host_str()
        .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CanonicalizeError::InvalidInput(raw.to_string()))?;
    Ok(Domain(host))
}
