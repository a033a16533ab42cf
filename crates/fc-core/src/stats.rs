//! Per-session blocking statistics

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::notifier::{ClassificationObserver, ResourceInfo};

/// Counts allowed and blocked ads per subscription once collection started.
#[derive(Debug, Default)]
pub struct SessionStats {
    collecting: Cell<bool>,
    allowed: RefCell<BTreeMap<String, u64>>,
    blocked: RefCell<BTreeMap<String, u64>>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting. Events seen before this call are not counted.
    pub fn start_collecting(&self) {
        self.collecting.set(true);
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting.get()
    }

    /// Allowed ads per subscription URL.
    pub fn allowed_ads_count(&self) -> BTreeMap<String, u64> {
        self.allowed.borrow().clone()
    }

    /// Blocked ads per subscription URL.
    pub fn blocked_ads_count(&self) -> BTreeMap<String, u64> {
        self.blocked.borrow().clone()
    }

    fn record(&self, counts: &RefCell<BTreeMap<String, u64>>, info: &ResourceInfo) {
        if !self.collecting.get() {
            return;
        }
        *counts
            .borrow_mut()
            .entry(info.subscription_url.clone())
            .or_insert(0) += 1;
    }
}

impl ClassificationObserver for SessionStats {
    fn on_ad_allowed(&self, info: &ResourceInfo) {
        self.record(&self.allowed, info);
    }

    fn on_ad_blocked(&self, info: &ResourceInfo) {
        self.record(&self.blocked, info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{ClassificationEvent, ClassificationNotifier};
    use crate::types::ContentType;
    use std::rc::Rc;

    fn info(subscription: &str) -> ResourceInfo {
        ResourceInfo {
            request_url: "https://ads.com/ad.png".into(),
            parent_frame_urls: Vec::new(),
            subscription_url: subscription.into(),
            content_type: ContentType::Image,
            tab_id: 0,
        }
    }

    #[test]
    fn test_counts_after_start() {
        let notifier = ClassificationNotifier::new();
        let stats = Rc::new(SessionStats::new());
        notifier.add_observer(stats.clone());

        notifier.notify(ClassificationEvent::AdBlocked(info("http://l.com/a.txt")));
        assert!(stats.blocked_ads_count().is_empty());

        stats.start_collecting();
        notifier.notify(ClassificationEvent::AdBlocked(info("http://l.com/a.txt")));
        notifier.notify(ClassificationEvent::AdBlocked(info("http://l.com/a.txt")));
        notifier.notify(ClassificationEvent::AdBlocked(info("adblock:custom")));
        notifier.notify(ClassificationEvent::AdAllowed(info("adblock:custom")));
        notifier.notify(ClassificationEvent::PageAllowed(info("adblock:custom")));

        let blocked = stats.blocked_ads_count();
        assert_eq!(blocked.get("http://l.com/a.txt"), Some(&2));
        assert_eq!(blocked.get("adblock:custom"), Some(&1));
        assert_eq!(stats.allowed_ads_count().get("adblock:custom"), Some(&1));
    }
}
