//! Core type definitions for FilterConf
//!
//! These types are shared by the registry, the decision composer, the
//! notifier and any matching engine plugged into them.

use serde::{Deserialize, Serialize};

/// Subscription reported when the deciding filter was a custom filter or an
/// allowed domain rather than a filter list.
pub const CUSTOM_FILTERS_SUBSCRIPTION: &str = "adblock:custom";

/// Tab id used when the host cannot attribute a request to a tab.
pub const NO_TAB_ID: i32 = -1;

// =============================================================================
// Content Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Content type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ContentMask: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const DOCUMENT = 1 << 6;     // main document
        const WEBSOCKET = 1 << 7;
        const WEBRTC = 1 << 8;
        const PING = 1 << 10;
        const XMLHTTPREQUEST = 1 << 11;
        const MEDIA = 1 << 14;
        const FONT = 1 << 15;
        const POPUP = 1 << 24;

        /// Types a filter without type options applies to
        const RESOURCES = Self::OTHER.bits()
            | Self::SCRIPT.bits()
            | Self::IMAGE.bits()
            | Self::STYLESHEET.bits()
            | Self::OBJECT.bits()
            | Self::SUBDOCUMENT.bits()
            | Self::WEBSOCKET.bits()
            | Self::WEBRTC.bits()
            | Self::PING.bits()
            | Self::XMLHTTPREQUEST.bits()
            | Self::MEDIA.bits()
            | Self::FONT.bits();
        /// All content types
        const ALL = Self::RESOURCES.bits() | Self::DOCUMENT.bits() | Self::POPUP.bits();
    }
}

/// Type of the resource being classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum ContentType {
    Other = 1 << 0,
    Script = 1 << 1,
    Image = 1 << 2,
    Stylesheet = 1 << 3,
    Object = 1 << 4,
    Subdocument = 1 << 5,
    Document = 1 << 6,
    Websocket = 1 << 7,
    Webrtc = 1 << 8,
    Ping = 1 << 10,
    Xmlhttprequest = 1 << 11,
    Media = 1 << 14,
    Font = 1 << 15,
    Popup = 1 << 24,
}

impl ContentType {
    /// Parse from a browser or filter-option type name. Unknown names map to `Other`.
    pub fn from_name(s: &str) -> Self {
        match s {
            "script" => Self::Script,
            "image" => Self::Image,
            "stylesheet" => Self::Stylesheet,
            "object" => Self::Object,
            "subdocument" | "sub_frame" => Self::Subdocument,
            "document" | "main_frame" => Self::Document,
            "websocket" => Self::Websocket,
            "webrtc" => Self::Webrtc,
            "ping" | "beacon" => Self::Ping,
            "xmlhttprequest" | "xhr" | "fetch" => Self::Xmlhttprequest,
            "media" => Self::Media,
            "font" => Self::Font,
            "popup" => Self::Popup,
            _ => Self::Other,
        }
    }

    /// Single-bit mask for this type.
    #[inline]
    pub fn mask(self) -> ContentMask {
        ContentMask::from_bits_truncate(self as u32)
    }

    /// Stable numeric value reported to observers.
    #[inline]
    pub fn bits(self) -> u32 {
        self as u32
    }
}

// =============================================================================
// Verdicts and Decisions
// =============================================================================

/// Outcome of evaluating one request against one filtering configuration.
///
/// `Block` and `Allow` carry the subscription URL of the deciding filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Verdict {
    #[default]
    NoMatch,
    Block(String),
    Allow(String),
}

impl Verdict {
    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block(_))
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    /// Subscription that produced this verdict, if any.
    pub fn subscription(&self) -> Option<&str> {
        match self {
            Self::NoMatch => None,
            Self::Block(s) | Self::Allow(s) => Some(s),
        }
    }
}

/// Final decision for a request after composing all configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Blocked,
    Allowed,
}

// =============================================================================
// Request Context
// =============================================================================

/// A request being classified.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Request type
    pub content_type: ContentType,
    /// URLs of the frames containing the request, innermost first. The last
    /// entry is the top-level document. For popups this holds the opener.
    pub frame_hierarchy: &'a [&'a str],
    /// Tab ID
    pub tab_id: i32,
}

impl<'a> Request<'a> {
    pub fn new(url: &'a str, content_type: ContentType) -> Self {
        Self {
            url,
            content_type,
            frame_hierarchy: &[],
            tab_id: NO_TAB_ID,
        }
    }

    pub fn with_frames(mut self, frame_hierarchy: &'a [&'a str]) -> Self {
        self.frame_hierarchy = frame_hierarchy;
        self
    }

    pub fn with_tab(mut self, tab_id: i32) -> Self {
        self.tab_id = tab_id;
        self
    }

    /// URLs whose site decides allowlisting: the frame hierarchy, or the
    /// request itself when it has no enclosing frame.
    pub fn site_urls(&self) -> impl Iterator<Item = &'a str> + '_ {
        let own = if self.frame_hierarchy.is_empty() {
            Some(self.url)
        } else {
            None
        };
        self.frame_hierarchy.iter().copied().chain(own)
    }

    /// Top-level document URL, falling back to the request URL.
    pub fn top_level_url(&self) -> &'a str {
        self.frame_hierarchy.last().copied().unwrap_or(self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_names() {
        assert_eq!(ContentType::from_name("script"), ContentType::Script);
        assert_eq!(ContentType::from_name("sub_frame"), ContentType::Subdocument);
        assert_eq!(ContentType::from_name("xhr"), ContentType::Xmlhttprequest);
        assert_eq!(ContentType::from_name("nonsense"), ContentType::Other);
    }

    #[test]
    fn content_masks() {
        assert_eq!(ContentType::Image.mask(), ContentMask::IMAGE);
        assert!(ContentMask::RESOURCES.contains(ContentMask::SCRIPT));
        assert!(!ContentMask::RESOURCES.contains(ContentMask::POPUP));
        assert!(!ContentMask::RESOURCES.contains(ContentMask::DOCUMENT));
        assert_eq!(ContentType::Popup.bits(), 1 << 24);
    }

    #[test]
    fn site_urls_fall_back_to_request() {
        let request = Request::new("https://test.org/", ContentType::Document);
        assert_eq!(request.site_urls().collect::<Vec<_>>(), vec!["https://test.org/"]);

        let frames = ["https://frame.test.org/", "https://test.org/"];
        let request = Request::new("https://ads.com/a.png", ContentType::Image).with_frames(&frames);
        assert_eq!(request.site_urls().collect::<Vec<_>>(), frames.to_vec());
        assert_eq!(request.top_level_url(), "https://test.org/");
    }

    #[test]
    fn verdict_subscription() {
        assert_eq!(Verdict::NoMatch.subscription(), None);
        assert_eq!(Verdict::Block("http://l.com/".into()).subscription(), Some("http://l.com/"));
        assert!(Verdict::Allow(CUSTOM_FILTERS_SUBSCRIPTION.into()).is_allow());
    }
}
