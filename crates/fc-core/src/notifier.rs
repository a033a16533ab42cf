//! Classification events and their fan-out
//!
//! Every event is delivered exactly once to every registered observer, in
//! registration order. Events raised from inside an observer callback are
//! queued and delivered after the current one, so every observer sees events
//! in the order they were raised.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use log::debug;
use serde::Serialize;

use crate::types::ContentType;

// =============================================================================
// Events
// =============================================================================

/// Details of a classified resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceInfo {
    pub request_url: String,
    /// Enclosing frames, innermost first. For popups, the opener URL.
    pub parent_frame_urls: Vec<String>,
    /// Deciding filter list, or `adblock:custom`
    pub subscription_url: String,
    pub content_type: ContentType,
    pub tab_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClassificationEvent {
    AdAllowed(ResourceInfo),
    AdBlocked(ResourceInfo),
    PageAllowed(ResourceInfo),
    PopupAllowed(ResourceInfo),
    PopupBlocked(ResourceInfo),
}

impl ClassificationEvent {
    pub fn info(&self) -> &ResourceInfo {
        match self {
            Self::AdAllowed(info)
            | Self::AdBlocked(info)
            | Self::PageAllowed(info)
            | Self::PopupAllowed(info)
            | Self::PopupBlocked(info) => info,
        }
    }

    fn deliver(&self, observer: &dyn ClassificationObserver) {
        match self {
            Self::AdAllowed(info) => observer.on_ad_allowed(info),
            Self::AdBlocked(info) => observer.on_ad_blocked(info),
            Self::PageAllowed(info) => observer.on_page_allowed(info),
            Self::PopupAllowed(info) => observer.on_popup_allowed(info),
            Self::PopupBlocked(info) => observer.on_popup_blocked(info),
        }
    }
}

impl fmt::Display for ClassificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::AdAllowed(_) => "ad allowed",
            Self::AdBlocked(_) => "ad blocked",
            Self::PageAllowed(_) => "page allowed",
            Self::PopupAllowed(_) => "popup allowed",
            Self::PopupBlocked(_) => "popup blocked",
        };
        write!(f, "{kind} {}", self.info().request_url)
    }
}

/// Receives classification events. Every method defaults to a no-op.
pub trait ClassificationObserver {
    fn on_ad_allowed(&self, _info: &ResourceInfo) {}
    fn on_ad_blocked(&self, _info: &ResourceInfo) {}
    fn on_page_allowed(&self, _info: &ResourceInfo) {}
    fn on_popup_allowed(&self, _info: &ResourceInfo) {}
    fn on_popup_blocked(&self, _info: &ResourceInfo) {}
}

// =============================================================================
// Notifier
// =============================================================================

#[derive(Default)]
struct NotifierInner {
    observers: RefCell<Vec<Rc<dyn ClassificationObserver>>>,
    pending: RefCell<VecDeque<ClassificationEvent>>,
    dispatching: Cell<bool>,
}

/// Clears the dispatching flag when the dispatch loop exits.
struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Fans classification events out to observers.
///
/// Clones share observers and the pending queue.
#[derive(Clone, Default)]
pub struct ClassificationNotifier {
    inner: Rc<NotifierInner>,
}

impl ClassificationNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Adding the same observer twice has no effect.
    pub fn add_observer(&self, observer: Rc<dyn ClassificationObserver>) {
        let mut observers = self.inner.observers.borrow_mut();
        let ptr = Rc::as_ptr(&observer).cast::<()>();
        if !observers.iter().any(|o| Rc::as_ptr(o).cast::<()>() == ptr) {
            observers.push(observer);
        }
    }

    /// Unregister an observer by identity.
    pub fn remove_observer<O: ClassificationObserver + ?Sized>(&self, observer: &Rc<O>) {
        let ptr = Rc::as_ptr(observer).cast::<()>();
        self.inner
            .observers
            .borrow_mut()
            .retain(|o| Rc::as_ptr(o).cast::<()>() != ptr);
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    /// Deliver `event` to every observer.
    ///
    /// When called from inside a callback the event is queued behind the
    /// one being delivered and this call returns immediately.
    pub fn notify(&self, event: ClassificationEvent) {
        self.inner.pending.borrow_mut().push_back(event);
        if self.inner.dispatching.get() {
            return;
        }

        self.inner.dispatching.set(true);
        let _guard = DispatchGuard(&self.inner.dispatching);

        loop {
            let next = self.inner.pending.borrow_mut().pop_front();
            let Some(event) = next else { break };

            let observers = self.inner.observers.borrow().clone();
            debug!("notifies {} observers about {}", observers.len(), event);
            for observer in &observers {
                event.deliver(observer.as_ref());
            }
        }
    }
}

impl fmt::Debug for ClassificationNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassificationNotifier")
            .field("observers", &self.observer_count())
            .field("pending", &self.inner.pending.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(url: &str) -> ResourceInfo {
        ResourceInfo {
            request_url: url.to_string(),
            parent_frame_urls: vec!["https://test.org/".to_string()],
            subscription_url: "adblock:custom".to_string(),
            content_type: ContentType::Image,
            tab_id: 1,
        }
    }

    #[derive(Default)]
    struct Log {
        seen: RefCell<Vec<String>>,
    }

    impl ClassificationObserver for Log {
        fn on_ad_allowed(&self, info: &ResourceInfo) {
            self.seen.borrow_mut().push(format!("allowed {}", info.request_url));
        }
        fn on_ad_blocked(&self, info: &ResourceInfo) {
            self.seen.borrow_mut().push(format!("blocked {}", info.request_url));
        }
        fn on_page_allowed(&self, info: &ResourceInfo) {
            self.seen.borrow_mut().push(format!("page {}", info.request_url));
        }
    }

    #[test]
    fn test_fan_out_exactly_once() {
        let notifier = ClassificationNotifier::new();
        let first = Rc::new(Log::default());
        let second = Rc::new(Log::default());
        notifier.add_observer(first.clone());
        notifier.add_observer(second.clone());
        notifier.add_observer(first.clone());
        assert_eq!(notifier.observer_count(), 2);

        notifier.notify(ClassificationEvent::AdBlocked(info("https://ads.com/1")));
        notifier.notify(ClassificationEvent::AdAllowed(info("https://ads.com/2")));

        let expected = vec!["blocked https://ads.com/1", "allowed https://ads.com/2"];
        assert_eq!(*first.seen.borrow(), expected);
        assert_eq!(*second.seen.borrow(), expected);
    }

    #[test]
    fn test_duplicates_are_not_suppressed() {
        let notifier = ClassificationNotifier::new();
        let log = Rc::new(Log::default());
        notifier.add_observer(log.clone());
        notifier.notify(ClassificationEvent::AdBlocked(info("https://ads.com/1")));
        notifier.notify(ClassificationEvent::AdBlocked(info("https://ads.com/1")));
        assert_eq!(log.seen.borrow().len(), 2);
    }

    #[test]
    fn test_remove_observer() {
        let notifier = ClassificationNotifier::new();
        let log = Rc::new(Log::default());
        notifier.add_observer(log.clone());
        notifier.remove_observer(&log);
        notifier.notify(ClassificationEvent::AdBlocked(info("https://ads.com/1")));
        assert!(log.seen.borrow().is_empty());
        assert_eq!(notifier.observer_count(), 0);
    }

    /// Raises a page event while handling the first blocked ad.
    struct Reentrant {
        notifier: ClassificationNotifier,
        fired: Cell<bool>,
        seen: RefCell<Vec<String>>,
    }

    impl ClassificationObserver for Reentrant {
        fn on_ad_blocked(&self, info: &ResourceInfo) {
            self.seen.borrow_mut().push(format!("blocked {}", info.request_url));
            if !self.fired.replace(true) {
                self.notifier
                    .notify(ClassificationEvent::PageAllowed(info.clone()));
            }
        }
        fn on_page_allowed(&self, info: &ResourceInfo) {
            self.seen.borrow_mut().push(format!("page {}", info.request_url));
        }
    }

    #[test]
    fn test_reentrant_notify_preserves_order() {
        let notifier = ClassificationNotifier::new();
        let reentrant = Rc::new(Reentrant {
            notifier: notifier.clone(),
            fired: Cell::new(false),
            seen: RefCell::new(Vec::new()),
        });
        let log = Rc::new(Log::default());
        notifier.add_observer(reentrant.clone());
        notifier.add_observer(log.clone());

        notifier.notify(ClassificationEvent::AdBlocked(info("https://ads.com/1")));

        let expected = vec!["blocked https://ads.com/1", "page https://ads.com/1"];
        assert_eq!(*log.seen.borrow(), expected);
        assert_eq!(*reentrant.seen.borrow(), expected);

        // Dispatch state is reset afterwards
        notifier.notify(ClassificationEvent::AdBlocked(info("https://ads.com/2")));
        assert_eq!(log.seen.borrow().len(), 3);
    }

    #[test]
    fn test_event_serialization() {
        let event = ClassificationEvent::AdBlocked(info("https://ads.com/1"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "ad_blocked");
        assert_eq!(value["request_url"], "https://ads.com/1");
        assert_eq!(value["content_type"], "image");
    }
}
