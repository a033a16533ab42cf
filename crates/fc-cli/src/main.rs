//! FilterConf CLI
//!
//! Loads filtering configurations and filter lists from a JSON document and
//! classifies requests, pages and popups against them.

mod document;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

use fc_core::{ClassificationEvent, ClassificationObserver, ContentType, Request, ResourceInfo};

use crate::document::{build_runner, load_document};

#[derive(Parser)]
#[command(name = "fc-cli")]
#[command(about = "Classify requests against several filtering configurations")]
struct Cli {
    /// Configuration document (JSON)
    #[arg(short, long, global = true, default_value = "filterconf.json")]
    config: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a network request
    Check {
        /// Request URL
        #[arg(short, long)]
        url: String,

        /// Content type (script, image, subdocument, xhr, ...)
        #[arg(short = 't', long = "type", default_value = "other")]
        content_type: String,

        /// Enclosing frame URL, innermost first; repeat for nested frames
        #[arg(short, long = "frame")]
        frames: Vec<String>,

        /// Tab id
        #[arg(long, default_value_t = fc_core::types::NO_TAB_ID)]
        tab: i32,
    },

    /// Check whether a page is allowlisted
    Document {
        #[arg(short, long)]
        url: String,

        #[arg(long, default_value_t = fc_core::types::NO_TAB_ID)]
        tab: i32,
    },

    /// Classify a popup
    Popup {
        /// Popup URL
        #[arg(short, long)]
        url: String,

        /// URL of the page that opened the popup
        #[arg(short, long)]
        opener: String,

        #[arg(long, default_value_t = fc_core::types::NO_TAB_ID)]
        tab: i32,
    },

    /// Print element hiding selectors for a page
    Hide {
        #[arg(short, long)]
        url: String,
    },

    /// Print the loaded configurations
    Show,
}

/// Prints every classification event as one JSON line.
struct EventPrinter;

impl EventPrinter {
    fn print(&self, event: ClassificationEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => log::warn!("Failed to serialize event: {}", e),
        }
    }
}

impl ClassificationObserver for EventPrinter {
    fn on_ad_allowed(&self, info: &ResourceInfo) {
        self.print(ClassificationEvent::AdAllowed(info.clone()));
    }

    fn on_ad_blocked(&self, info: &ResourceInfo) {
        self.print(ClassificationEvent::AdBlocked(info.clone()));
    }

    fn on_page_allowed(&self, info: &ResourceInfo) {
        self.print(ClassificationEvent::PageAllowed(info.clone()));
    }

    fn on_popup_allowed(&self, info: &ResourceInfo) {
        self.print(ClassificationEvent::PopupAllowed(info.clone()));
    }

    fn on_popup_blocked(&self, info: &ResourceInfo) {
        self.print(ClassificationEvent::PopupBlocked(info.clone()));
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "fc_core=debug,fc_engine=debug,fc_cli=debug"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Check {
            url,
            content_type,
            frames,
            tab,
        } => cmd_check(&cli.config, &url, &content_type, &frames, tab),
        Commands::Document { url, tab } => cmd_document(&cli.config, &url, tab),
        Commands::Popup { url, opener, tab } => cmd_popup(&cli.config, &url, &opener, tab),
        Commands::Hide { url } => cmd_hide(&cli.config, &url),
        Commands::Show => cmd_show(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_runner(config: &Path) -> Result<fc_core::ClassificationRunner<fc_engine::PatternEngine>, String> {
    let doc = load_document(config)?;
    let base_dir = config.parent().unwrap_or_else(|| Path::new("."));
    let runner = build_runner(&doc, base_dir)?;
    runner.add_observer(Rc::new(EventPrinter));
    Ok(runner)
}

fn print_decision(decision: Option<fc_core::Decision>) {
    match decision {
        Some(fc_core::Decision::Blocked) => println!("blocked"),
        Some(fc_core::Decision::Allowed) => println!("allowed"),
        None => println!("no match"),
    }
}

fn cmd_check(config: &Path, url: &str, content_type: &str, frames: &[String], tab: i32) -> Result<(), String> {
    let runner = load_runner(config)?;
    let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
    let request = Request::new(url, ContentType::from_name(&content_type.to_ascii_lowercase()))
        .with_frames(&frames)
        .with_tab(tab);

    print_decision(runner.check_request(&request));
    Ok(())
}

fn cmd_document(config: &Path, url: &str, tab: i32) -> Result<(), String> {
    let runner = load_runner(config)?;
    if runner.check_document(url, tab) {
        println!("page allowed");
    } else {
        println!("page not allowlisted");
    }
    Ok(())
}

fn cmd_popup(config: &Path, url: &str, opener: &str, tab: i32) -> Result<(), String> {
    let runner = load_runner(config)?;
    print_decision(runner.check_popup(url, opener, tab));
    Ok(())
}

fn cmd_hide(config: &Path, url: &str) -> Result<(), String> {
    let runner = load_runner(config)?;
    for selector in runner.element_hiding_selectors(url) {
        println!("{selector}");
    }
    Ok(())
}

fn cmd_show(config: &Path) -> Result<(), String> {
    let runner = load_runner(config)?;
    let json = runner
        .registry()
        .export()
        .to_json_pretty()
        .map_err(|e| format!("Failed to serialize configurations: {}", e))?;
    println!("{json}");

    let engine = runner.engine();
    for url in runner.registry().snapshots().iter().flat_map(|s| s.filter_lists.iter()) {
        if !engine.has_list(url) {
            eprintln!("warning: no content loaded for {url}");
        }
    }
    Ok(())
}
