//! Filter text parser
//!
//! Parses the subset of Adblock Plus syntax the reference engine evaluates.
//! Lines the engine cannot honour exactly (unknown options, regular
//! expressions, extended cosmetic syntax) are dropped rather than guessed at.

use fc_core::types::ContentMask;

// =============================================================================
// Parsed Filters
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Block,
    Allow,
}

bitflags::bitflags! {
    /// Per-filter flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RuleFlags: u8 {
        /// $important - wins over allow filters
        const IMPORTANT = 1 << 0;
        /// $match-case
        const MATCH_CASE = 1 << 1;
        /// Pattern ended with `|`
        const END_ANCHOR = 1 << 2;
        /// @@...$elemhide - disables element hiding on matching pages
        const ELEMHIDE = 1 << 3;
        /// Explicit $document option
        const DOCUMENT = 1 << 4;
    }
}

bitflags::bitflags! {
    /// Party mask for $third-party / $first-party.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartyMask: u8 {
        const FIRST_PARTY = 1 << 0;
        const THIRD_PARTY = 1 << 1;
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorType {
    #[default]
    None,
    /// `|` - start of URL
    Left,
    /// `||` - start of a host label
    Hostname,
}

/// Sites a filter is restricted to (`$domain=` or the `a,~b##` prefix).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DomainConstraint {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// A URL blocking or allowing filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkFilter {
    pub action: RuleAction,
    pub flags: RuleFlags,
    /// Pattern without anchors, may contain `*` and `^`
    pub pattern: String,
    pub anchor_type: AnchorType,
    pub type_mask: ContentMask,
    pub party_mask: PartyMask,
    pub domain_constraints: Option<DomainConstraint>,
}

/// An element hiding filter or exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidingFilter {
    pub selector: String,
    pub exception: bool,
    pub domain_constraints: Option<DomainConstraint>,
}

/// Filters parsed from one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedList {
    pub network: Vec<NetworkFilter>,
    pub hiding: Vec<HidingFilter>,
}

impl ParsedList {
    pub fn len(&self) -> usize {
        self.network.len() + self.hiding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.network.is_empty() && self.hiding.is_empty()
    }
}

// =============================================================================
// List Parsing
// =============================================================================

pub fn parse_filter_list(text: &str) -> ParsedList {
    let mut list = ParsedList::default();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || is_comment_line(line) {
            continue;
        }

        if let Some(filter) = parse_hiding_rule(line) {
            list.hiding.push(filter);
            continue;
        }

        if is_cosmetic_line(line) {
            continue;
        }

        if let Some(filter) = parse_network_rule(line) {
            list.network.push(filter);
        }
    }

    list
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[') || line.starts_with("# ")
}

/// Any cosmetic separator, including the extended ones the engine ignores.
fn is_cosmetic_line(line: &str) -> bool {
    ["##", "#@#", "#?#", "#$#", "#@$#", "#@?#"]
        .iter()
        .any(|sep| line.contains(sep))
}

// =============================================================================
// Element Hiding
// =============================================================================

fn parse_hiding_rule(line: &str) -> Option<HidingFilter> {
    let (prefix, selector, exception) = if let Some(pos) = line.find("#@#") {
        (&line[..pos], &line[pos + 3..], true)
    } else if let Some(pos) = line.find("##") {
        (&line[..pos], &line[pos + 2..], false)
    } else {
        return None;
    };

    // Extended syntax like `#?#` lands here as `?#...`
    if prefix.contains('#') {
        return None;
    }

    let selector = selector.trim();
    if selector.is_empty() {
        return None;
    }

    let domain_constraints = if prefix.trim().is_empty() {
        None
    } else {
        Some(parse_domain_list(prefix, ',')?)
    };

    Some(HidingFilter {
        selector: selector.to_string(),
        exception,
        domain_constraints,
    })
}

// =============================================================================
// Network Filters
// =============================================================================

fn parse_network_rule(line: &str) -> Option<NetworkFilter> {
    let mut line = line;
    let mut action = RuleAction::Block;
    if let Some(rest) = line.strip_prefix("@@") {
        action = RuleAction::Allow;
        line = rest.trim_start();
    }

    let (pattern_part, options_text) = split_rule_options(line);
    let options = match options_text {
        Some(options_text) => parse_options(options_text, action)?,
        None => ParsedOptions::default(),
    };

    let parsed = parse_pattern(pattern_part)?;

    let mut flags = options.flags;
    if parsed.end_anchor {
        flags |= RuleFlags::END_ANCHOR;
    }

    Some(NetworkFilter {
        action,
        flags,
        pattern: parsed.pattern,
        anchor_type: parsed.anchor_type,
        type_mask: options.type_mask,
        party_mask: options.party_mask,
        domain_constraints: options.domain_constraints,
    })
}

#[derive(Clone)]
struct ParsedOptions {
    flags: RuleFlags,
    type_mask: ContentMask,
    party_mask: PartyMask,
    domain_constraints: Option<DomainConstraint>,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            flags: RuleFlags::empty(),
            type_mask: ContentMask::RESOURCES,
            party_mask: PartyMask::ALL,
            domain_constraints: None,
        }
    }
}

/// Options start at the last `$`.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    match line.rfind('$') {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    }
}

fn parse_options(text: &str, action: RuleAction) -> Option<ParsedOptions> {
    let mut flags = RuleFlags::empty();
    let mut type_include = ContentMask::empty();
    let mut type_exclude = ContentMask::empty();
    let mut party_include = PartyMask::empty();
    let mut party_exclude = PartyMask::empty();
    let mut domain_constraints: Option<DomainConstraint> = None;

    for raw in text.trim().split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let raw_lower = raw.to_ascii_lowercase();
        let raw_lower = raw_lower.as_str();

        if raw_lower == "important" {
            flags |= RuleFlags::IMPORTANT;
            continue;
        }

        if raw_lower == "match-case" || raw_lower == "match_case" {
            flags |= RuleFlags::MATCH_CASE;
            continue;
        }

        if raw_lower == "elemhide" {
            if action != RuleAction::Allow {
                return None;
            }
            flags |= RuleFlags::ELEMHIDE;
            continue;
        }

        if let Some(domain_value) = raw_lower.strip_prefix("domain=") {
            let parsed = parse_domain_list(domain_value, '|')?;
            domain_constraints = Some(merge_constraints(domain_constraints, parsed));
            continue;
        }

        let (negated, name) = match raw_lower.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw_lower),
        };

        if let Some(mask) = content_type_mask(name) {
            if mask == ContentMask::DOCUMENT && !negated {
                flags |= RuleFlags::DOCUMENT;
            }
            if negated {
                type_exclude |= mask;
            } else {
                type_include |= mask;
            }
            continue;
        }

        if let Some(mask) = party_mask(name) {
            if negated {
                party_exclude |= mask;
            } else {
                party_include |= mask;
            }
            continue;
        }

        return None;
    }

    // $elemhide alone applies to the page, not to resources
    if flags.contains(RuleFlags::ELEMHIDE) && type_include.is_empty() {
        type_include = ContentMask::DOCUMENT;
    }

    let type_mask = finalize_type_mask(type_include, type_exclude)?;
    let party_mask = finalize_party_mask(party_include, party_exclude)?;

    Some(ParsedOptions {
        flags,
        type_mask,
        party_mask,
        domain_constraints,
    })
}

/// Included bits minus excluded ones, or the default set minus excluded ones
/// when nothing was included. An empty result drops the filter.
fn finalize_type_mask(include: ContentMask, exclude: ContentMask) -> Option<ContentMask> {
    let base = if include.is_empty() { ContentMask::RESOURCES } else { include };
    let mask = base & !exclude;
    if mask.is_empty() {
        None
    } else {
        Some(mask)
    }
}

fn finalize_party_mask(include: PartyMask, exclude: PartyMask) -> Option<PartyMask> {
    let base = if include.is_empty() { PartyMask::ALL } else { include };
    let mask = base & !exclude;
    if mask.is_empty() {
        None
    } else {
        Some(mask)
    }
}

fn merge_constraints(existing: Option<DomainConstraint>, incoming: DomainConstraint) -> DomainConstraint {
    match existing {
        Some(mut current) => {
            current.include.extend(incoming.include);
            current.exclude.extend(incoming.exclude);
            current
        }
        None => incoming,
    }
}

fn parse_domain_list(value: &str, separator: char) -> Option<DomainConstraint> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();

    for raw in value.split(separator) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let domain = normalize_domain(domain_raw)?;
        if is_exclude {
            exclude.push(domain);
        } else {
            include.push(domain);
        }
    }

    if include.is_empty() && exclude.is_empty() {
        return None;
    }

    Some(DomainConstraint { include, exclude })
}

fn content_type_mask(name: &str) -> Option<ContentMask> {
    match name {
        "other" => Some(ContentMask::OTHER),
        "script" => Some(ContentMask::SCRIPT),
        "image" => Some(ContentMask::IMAGE),
        "stylesheet" => Some(ContentMask::STYLESHEET),
        "object" => Some(ContentMask::OBJECT),
        "subdocument" => Some(ContentMask::SUBDOCUMENT),
        "document" => Some(ContentMask::DOCUMENT),
        "websocket" => Some(ContentMask::WEBSOCKET),
        "webrtc" => Some(ContentMask::WEBRTC),
        "ping" => Some(ContentMask::PING),
        "xmlhttprequest" | "xhr" => Some(ContentMask::XMLHTTPREQUEST),
        "media" => Some(ContentMask::MEDIA),
        "font" => Some(ContentMask::FONT),
        "popup" => Some(ContentMask::POPUP),
        _ => None,
    }
}

fn party_mask(name: &str) -> Option<PartyMask> {
    match name {
        "third-party" | "thirdparty" | "3p" => Some(PartyMask::THIRD_PARTY),
        "first-party" | "firstparty" | "1p" => Some(PartyMask::FIRST_PARTY),
        _ => None,
    }
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

struct ParsedPattern {
    pattern: String,
    anchor_type: AnchorType,
    end_anchor: bool,
}

fn parse_pattern(text: &str) -> Option<ParsedPattern> {
    let text = text.trim();

    // Regular expression filters are not supported
    if text.len() > 1 && text.starts_with('/') && text.ends_with('/') {
        return None;
    }

    let (anchor_type, rest) = if let Some(rest) = text.strip_prefix("||") {
        (AnchorType::Hostname, rest)
    } else if let Some(rest) = text.strip_prefix('|') {
        (AnchorType::Left, rest)
    } else {
        (AnchorType::None, text)
    };

    let (rest, end_anchor) = match rest.strip_suffix('|') {
        Some(stripped) => (stripped, true),
        None => (rest, false),
    };

    if rest.is_empty() || rest.contains('|') {
        return None;
    }

    Some(ParsedPattern {
        pattern: rest.to_string(),
        anchor_type,
        end_anchor,
    })
}
