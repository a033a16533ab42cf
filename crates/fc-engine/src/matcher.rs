//! Filter matching
//!
//! Linear scan over parsed filters. Lists are small in tests and in the CLI,
//! so no token index is built.

use std::collections::BTreeSet;

use fc_core::psl::{is_third_party, walk_host_suffixes};
use fc_core::types::{ContentMask, Request};
use fc_core::url::{extract_host, get_host_position, is_boundary_char};

use crate::parser::{
    parse_filter_list, AnchorType, DomainConstraint, HidingFilter, NetworkFilter, ParsedList,
    PartyMask, RuleAction, RuleFlags,
};

// =============================================================================
// Match Context
// =============================================================================

/// Request facts every filter check needs.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub url: &'a str,
    pub host: &'a str,
    /// Host of the top-level document (or popup opener)
    pub site_host: &'a str,
    pub content_mask: ContentMask,
    pub is_third_party: bool,
}

impl<'a> MatchContext<'a> {
    pub fn from_request(request: &Request<'a>) -> Self {
        let host = extract_host(request.url).unwrap_or("");
        let site_host = extract_host(request.top_level_url()).unwrap_or(host);
        Self {
            url: request.url,
            host,
            site_host,
            content_mask: request.content_type.mask(),
            is_third_party: !host.is_empty() && is_third_party(site_host, host),
        }
    }

    /// Context for a page load.
    pub fn document(url: &'a str) -> Self {
        let host = extract_host(url).unwrap_or("");
        Self {
            url,
            host,
            site_host: host,
            content_mask: ContentMask::DOCUMENT,
            is_third_party: false,
        }
    }
}

// =============================================================================
// Compiled List
// =============================================================================

/// First matching filter of each kind, in list order.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkMatches<'l> {
    pub important_block: Option<&'l NetworkFilter>,
    pub block: Option<&'l NetworkFilter>,
    pub allow: Option<&'l NetworkFilter>,
}

/// Parsed filters of one list, ready for matching.
#[derive(Debug, Clone, Default)]
pub struct CompiledList {
    filters: ParsedList,
}

impl CompiledList {
    pub fn parse(text: &str) -> Self {
        Self {
            filters: parse_filter_list(text),
        }
    }

    /// Compile custom filters, one filter per entry.
    pub fn from_filters<S: AsRef<str>>(filters: &[S]) -> Self {
        let mut list = ParsedList::default();
        for filter in filters {
            let parsed = parse_filter_list(filter.as_ref());
            list.network.extend(parsed.network);
            list.hiding.extend(parsed.hiding);
        }
        Self { filters: list }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Match network filters against a request.
    pub fn match_network(&self, ctx: &MatchContext<'_>) -> NetworkMatches<'_> {
        let mut matches = NetworkMatches::default();

        for filter in &self.filters.network {
            if !filter_applies(filter, ctx) {
                continue;
            }
            let slot = match (filter.action, filter.flags.contains(RuleFlags::IMPORTANT)) {
                (RuleAction::Block, true) => &mut matches.important_block,
                (RuleAction::Block, false) => &mut matches.block,
                (RuleAction::Allow, _) => &mut matches.allow,
            };
            if slot.is_none() {
                *slot = Some(filter);
            }
        }

        matches
    }

    /// True if a `$document` exception matches `url` as a page.
    pub fn document_exception(&self, url: &str) -> bool {
        self.page_exception(url, RuleFlags::DOCUMENT)
    }

    /// True if element hiding is disabled on `url` by a `$elemhide` or
    /// `$document` exception.
    pub fn elemhide_exception(&self, url: &str) -> bool {
        self.page_exception(url, RuleFlags::DOCUMENT | RuleFlags::ELEMHIDE)
    }

    fn page_exception(&self, url: &str, any_of: RuleFlags) -> bool {
        let ctx = MatchContext::document(url);
        self.filters.network.iter().any(|filter| {
            filter.action == RuleAction::Allow
                && filter.flags.intersects(any_of)
                && filter_applies(filter, &ctx)
        })
    }

    /// Selectors of hiding filters and exceptions applying to `host`.
    pub fn hiding_for_host(&self, host: &str) -> (BTreeSet<&str>, BTreeSet<&str>) {
        let mut selectors = BTreeSet::new();
        let mut exceptions = BTreeSet::new();

        for filter in &self.filters.hiding {
            if !hiding_applies(filter, host) {
                continue;
            }
            if filter.exception {
                exceptions.insert(filter.selector.as_str());
            } else {
                selectors.insert(filter.selector.as_str());
            }
        }

        (selectors, exceptions)
    }
}

fn hiding_applies(filter: &HidingFilter, host: &str) -> bool {
    match &filter.domain_constraints {
        Some(constraints) => check_domain_constraints(constraints, host),
        None => true,
    }
}

// =============================================================================
// Filter Checks
// =============================================================================

fn filter_applies(filter: &NetworkFilter, ctx: &MatchContext<'_>) -> bool {
    check_rule_options(filter, ctx)
        && filter
            .domain_constraints
            .as_ref()
            .map_or(true, |c| check_domain_constraints(c, ctx.site_host))
        && verify_pattern(filter, ctx.url)
}

/// Check type and party options.
fn check_rule_options(filter: &NetworkFilter, ctx: &MatchContext<'_>) -> bool {
    if !filter.type_mask.intersects(ctx.content_mask) {
        return false;
    }

    let request_party = if ctx.is_third_party {
        PartyMask::THIRD_PARTY
    } else {
        PartyMask::FIRST_PARTY
    };
    filter.party_mask.intersects(request_party)
}

/// Check `$domain=` style constraints against the site host.
fn check_domain_constraints(constraints: &DomainConstraint, site_host: &str) -> bool {
    let site_host = site_host.to_ascii_lowercase();
    let listed = |list: &[String]| walk_host_suffixes(&site_host).any(|s| list.iter().any(|d| d == s));

    if !constraints.include.is_empty() && !listed(&constraints.include) {
        return false;
    }

    !listed(&constraints.exclude)
}

/// Verify a URL against a filter pattern and its anchors.
fn verify_pattern(filter: &NetworkFilter, url: &str) -> bool {
    let pattern = filter.pattern.as_bytes();
    let text = url.as_bytes();
    let match_case = filter.flags.contains(RuleFlags::MATCH_CASE);
    let end_anchor = filter.flags.contains(RuleFlags::END_ANCHOR);
    let glob = |start: usize, floating: bool| glob_match(pattern, &text[start..], floating, match_case, end_anchor);

    match filter.anchor_type {
        AnchorType::Left => glob(0, false),
        AnchorType::Hostname => {
            let Some((host_start, host_end)) = get_host_position(url) else {
                return false;
            };
            (host_start..host_end)
                .filter(|&i| i == host_start || text[i - 1] == b'.')
                .any(|i| glob(i, false))
        }
        AnchorType::None => glob(0, true),
    }
}

fn token_matches(p: u8, c: u8, match_case: bool) -> bool {
    match p {
        b'^' => is_boundary_char(c),
        _ if match_case => p == c,
        _ => p.eq_ignore_ascii_case(&c),
    }
}

/// Match `pattern` against the start of `text`, or anywhere in it when
/// `floating`. `*` matches any run of characters, `^` a separator or the end
/// of the text.
///
/// Only the most recent `*` is retried, which keeps the match at
/// O(pattern × text).
fn glob_match(pattern: &[u8], text: &[u8], floating: bool, match_case: bool, end_anchor: bool) -> bool {
    let (mut p, mut t) = (0, 0);
    // (pattern index after the last `*`, text index it was last tried at)
    let mut retry = floating.then_some((0, 0));

    loop {
        if p == pattern.len() {
            if !end_anchor || t == text.len() {
                return true;
            }
        } else if pattern[p] == b'*' {
            p += 1;
            retry = Some((p, t));
            continue;
        } else if t < text.len() && token_matches(pattern[p], text[t], match_case) {
            p += 1;
            t += 1;
            continue;
        } else if t == text.len() && pattern[p..].iter().all(|&c| c == b'*' || c == b'^') {
            return true;
        }

        match retry {
            Some((rp, rt)) if rt < text.len() => {
                retry = Some((rp, rt + 1));
                p = rp;
                t = rt + 1;
            }
            _ => return false,
        }
    }
}
