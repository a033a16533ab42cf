//! FilterConf Reference Engine
//!
//! A small [`MatchingEngine`](fc_core::MatchingEngine) over Adblock Plus style
//! filter text, enough to drive the composition core from tests and the CLI.

pub mod engine;
pub mod matcher;
pub mod parser;

pub use engine::PatternEngine;
pub use matcher::{CompiledList, MatchContext};
pub use parser::{parse_filter_list, HidingFilter, NetworkFilter, ParsedList};
