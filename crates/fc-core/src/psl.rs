//! Registrable-domain (eTLD+1) helpers
//!
//! A small heuristic stands in for the full Public Suffix List: the last two
//! labels, or the last three when the last two form a well-known two-part
//! suffix. This is enough for first/third-party checks and `$domain=`
//! constraints in the reference engine.
//!
//! # Examples
//!
//! ```
//! use fc_core::psl::get_etld1;
//!
//! assert_eq!(get_etld1("sub.example.com"), "example.com");
//! assert_eq!(get_etld1("sub.example.co.uk"), "example.co.uk");
//! ```

/// Common two-part TLDs.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

// =============================================================================
// eTLD+1 Extraction
// =============================================================================

/// Get the eTLD+1 (registrable domain) for a hostname.
pub fn get_etld1(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').collect();
    etld1_from_labels(&labels)
}

fn etld1_from_labels(labels: &[&str]) -> String {
    let n = labels.len();
    if n <= 2 {
        return labels.join(".");
    }

    let last_two = format!("{}.{}", labels[n - 2], labels[n - 1]);
    if COMMON_TWO_PART_TLDS.contains(&last_two.as_str()) {
        return labels[n - 3..].join(".");
    }

    labels[n - 2..].join(".")
}

/// Check if two hosts share the same eTLD+1.
pub fn is_same_site(host1: &str, host2: &str) -> bool {
    get_etld1(host1) == get_etld1(host2)
}

/// Check if a request is third-party.
pub fn is_third_party(site_host: &str, req_host: &str) -> bool {
    !is_same_site(site_host, req_host)
}

// =============================================================================
// Suffix Walking
// =============================================================================

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator for suffix-walking a host from full to eTLD+1.
pub struct HostSuffixIter<'a> {
    current: &'a str,
    etld1_len: usize,
}

impl<'a> HostSuffixIter<'a> {
    pub fn new(host: &'a str) -> Self {
        let etld1 = get_etld1(host);
        Self {
            current: host,
            etld1_len: etld1.len(),
        }
    }
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_empty() || self.current.len() < self.etld1_len {
            return None;
        }

        let result = self.current;

        self.current = match get_parent_domain(self.current) {
            Some(parent) if parent.len() >= self.etld1_len => parent,
            _ => "",
        };

        Some(result)
    }
}

/// Walk host suffixes from most specific to least specific.
pub fn walk_host_suffixes(host: &str) -> HostSuffixIter<'_> {
    HostSuffixIter::new(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etld1_simple() {
        assert_eq!(get_etld1("example.com"), "example.com");
        assert_eq!(get_etld1("sub.example.com"), "example.com");
        assert_eq!(get_etld1("localhost"), "localhost");
        assert_eq!(get_etld1("Sub.Example.COM."), "example.com");
    }

    #[test]
    fn test_etld1_two_part() {
        assert_eq!(get_etld1("sub.example.co.uk"), "example.co.uk");
        assert_eq!(get_etld1("example.co.uk"), "example.co.uk");
    }

    #[test]
    fn test_third_party() {
        assert!(!is_third_party("www.test.org", "cdn.test.org"));
        assert!(is_third_party("test.org", "ads.com"));
    }

    #[test]
    fn test_get_parent_domain() {
        assert_eq!(get_parent_domain("sub.example.com"), Some("example.com"));
        assert_eq!(get_parent_domain("example.com"), Some("com"));
        assert_eq!(get_parent_domain("com"), None);
        assert_eq!(get_parent_domain(""), None);
    }

    #[test]
    fn test_walk_host_suffixes() {
        let suffixes: Vec<_> = walk_host_suffixes("a.b.example.com").collect();
        assert_eq!(suffixes, vec!["a.b.example.com", "b.example.com", "example.com"]);

        let suffixes: Vec<_> = walk_host_suffixes("example.com").collect();
        assert_eq!(suffixes, vec!["example.com"]);
    }
}
