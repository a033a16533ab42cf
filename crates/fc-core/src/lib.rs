//! FilterConf Core Library
//!
//! Composes the verdicts of several independent, simultaneously active
//! filtering configurations into one block/allow/hide decision per request,
//! and reports every classification to observers exactly once.
//!
//! # Architecture
//!
//! Configurations are named rule sets (filter lists, custom filters, allowed
//! domains) kept in a [`ConfigurationRegistry`]. Pattern matching is delegated
//! to a [`MatchingEngine`]; the [`DecisionComposer`] only combines its
//! per-configuration verdicts. Everything runs on one thread and uses
//! `Rc`/`RefCell` for shared state.
//!
//! # Modules
//!
//! - `domain`: Canonicalization of user-entered domains and URLs
//! - `configuration`: Name-aliased configuration handles and their observers
//! - `registry`: Name-keyed configuration store
//! - `engine`: Matching engine interface
//! - `composer`: Cross-configuration decision rules
//! - `notifier`: Classification events and ordered fan-out
//! - `runner`: Registry, engine and notifier wired together
//! - `stats`: Per-subscription session counters
//! - `persist`: JSON layout for saving configurations
//! - `psl`, `url`: Host helpers
//! - `types`: Shared type definitions

pub mod composer;
pub mod configuration;
pub mod domain;
pub mod engine;
pub mod notifier;
pub mod persist;
pub mod psl;
pub mod registry;
pub mod runner;
pub mod stats;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use composer::{DecisionComposer, FinalDecision};
pub use configuration::{ConfigurationObserver, ConfigurationSnapshot, FilteringConfiguration};
pub use domain::{canonicalize, CanonicalizeError, Domain};
pub use engine::{EngineError, MatchingEngine};
pub use notifier::{ClassificationEvent, ClassificationNotifier, ClassificationObserver, ResourceInfo};
pub use persist::{ConfigurationsDocument, DocumentError, StoredConfiguration};
pub use registry::{ConfigurationRegistry, NotificationPolicy, RegistryOptions};
pub use runner::ClassificationRunner;
pub use stats::SessionStats;
pub use types::{ContentMask, ContentType, Decision, Request, Verdict, CUSTOM_FILTERS_SUBSCRIPTION};
