use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use fc_core::{ClassificationRunner, ConfigurationsDocument, RegistryOptions};
use fc_engine::PatternEngine;

/// Input document for every CLI command.
///
/// ```json
/// {
///   "options": { "notification_policy": "every_call" },
///   "configurations": { "adblock": { "subscriptions": ["https://example.org/list.txt"] } },
///   "lists": { "https://example.org/list.txt": "lists/list.txt" }
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliDocument {
    pub options: RegistryOptions,
    pub configurations: ConfigurationsDocument,
    /// Filter list URL to local file with its content
    pub lists: BTreeMap<String, PathBuf>,
}

pub fn load_document(path: &Path) -> Result<CliDocument, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid document '{}': {}", path.display(), e))
}

/// Load the filter lists and restore the configurations of a document.
/// Relative list paths are resolved against `base_dir`.
pub fn build_runner(doc: &CliDocument, base_dir: &Path) -> Result<ClassificationRunner<PatternEngine>, String> {
    let mut engine = PatternEngine::new();

    for (url, path) in &doc.lists {
        let path = if path.is_relative() {
            base_dir.join(path)
        } else {
            path.clone()
        };
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
        let count = engine.load_list(url, &content);
        log::info!("{} - {} filters", url, count);
    }

    let runner = ClassificationRunner::with_options(engine, doc.options);
    runner.registry().restore(&doc.configurations);
    Ok(runner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_core::{ContentType, Decision, NotificationPolicy, Request};

    #[test]
    fn test_parse_document() {
        let doc: CliDocument = serde_json::from_str(
            r#"{
                "options": { "notification_policy": "on_change" },
                "configurations": {
                    "adblock": { "filters": ["resource.png"], "domains": ["test.org"] }
                },
                "lists": { "http://filters.com/list1.txt": "list1.txt" }
            }"#,
        )
        .unwrap();
        assert_eq!(doc.options.notification_policy, NotificationPolicy::OnChange);
        assert_eq!(doc.configurations.len(), 1);
        assert_eq!(doc.lists["http://filters.com/list1.txt"], PathBuf::from("list1.txt"));
    }

    #[test]
    fn test_build_runner_from_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("list1.txt"), "||ads.com^\n").unwrap();

        let doc: CliDocument = serde_json::from_str(
            r#"{
                "configurations": { "adblock": { "subscriptions": ["http://filters.com/list1.txt"] } },
                "lists": { "http://filters.com/list1.txt": "list1.txt" }
            }"#,
        )
        .unwrap();
        let runner = build_runner(&doc, dir.path()).unwrap();
        let request = Request::new("https://ads.com/x.png", ContentType::Image);
        assert_eq!(runner.check_request(&request), Some(Decision::Blocked));
    }

    #[test]
    fn test_load_document_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filterconf.json");
        fs::write(&path, r#"{ "configurations": { "adblock": { "enabled": false } } }"#).unwrap();

        let doc = load_document(&path).unwrap();
        assert_eq!(doc.configurations.get("adblock").map(|c| c.enabled), Some(false));
        assert!(doc.lists.is_empty());

        let err = load_document(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.contains("Failed to read"));
    }

    #[test]
    fn test_missing_list_file() {
        let dir = tempfile::tempdir().unwrap();
        let doc: CliDocument =
            serde_json::from_str(r#"{ "lists": { "http://filters.com/x.txt": "x.txt" } }"#).unwrap();
        let Err(err) = build_runner(&doc, dir.path()) else {
            panic!("missing list file should fail");
        };
        assert!(err.contains("Failed to read"));
    }
}
