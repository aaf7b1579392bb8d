//! Node-type vocabulary: the data table behind trigger and integration
//! classification.
//!
//! The table is plain TOML so new node types can be added without touching
//! classifier code. A default table is compiled in; a replacement can be
//! loaded from disk via `[classifier] vocabulary_path`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::error::{FlowdexError, Result};

const BUILTIN: &str = include_str!("default_vocabulary.toml");

/// Versioned node-kind vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub version: u32,
    pub triggers: TriggerTable,
    pub integrations: IntegrationTable,
}

/// Node kinds per trigger category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerTable {
    #[serde(default)]
    pub webhook: Vec<String>,
    #[serde(default)]
    pub schedule: Vec<String>,
    #[serde(default)]
    pub manual: Vec<String>,
    #[serde(default)]
    pub generic_suffixes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationTable {
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub strip_suffixes: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Trigger category a single node kind falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TriggerCategory {
    Webhook,
    Schedule,
    Manual,
    Generic,
}

impl Vocabulary {
    /// The compiled-in default table.
    pub fn builtin() -> Self {
        Self::from_toml_str(BUILTIN).expect("built-in vocabulary must parse")
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let vocabulary: Vocabulary = toml::from_str(text)
            .map_err(|e| FlowdexError::Config(format!("invalid vocabulary table: {}", e)))?;
        if vocabulary.version == 0 {
            return Err(FlowdexError::Config("vocabulary version must be at least 1".to_string()));
        }
        Ok(vocabulary)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let vocabulary = Self::from_toml_str(&text)?;
        log::info!(
            "Loaded vocabulary v{} from {}",
            vocabulary.version,
            path.display()
        );
        Ok(vocabulary)
    }
}

/// Case-insensitive lookup structures built once from a [`Vocabulary`].
#[derive(Debug, Clone)]
pub(crate) struct CompiledVocabulary {
    triggers: HashMap<String, TriggerCategory>,
    generic_suffixes: Vec<String>,
    ignore: HashSet<String>,
    strip_suffixes: Vec<String>,
    labels: HashMap<String, String>,
}

impl CompiledVocabulary {
    pub(crate) fn new(vocabulary: &Vocabulary) -> Self {
        let mut triggers = HashMap::new();
        // Later categories do not override earlier ones
        let tables = [
            (&vocabulary.triggers.webhook, TriggerCategory::Webhook),
            (&vocabulary.triggers.schedule, TriggerCategory::Schedule),
            (&vocabulary.triggers.manual, TriggerCategory::Manual),
        ];
        for (kinds, category) in tables {
            for kind in kinds {
                triggers.entry(kind.to_lowercase()).or_insert(category);
            }
        }

        Self {
            triggers,
            generic_suffixes: lowercase_all(&vocabulary.triggers.generic_suffixes),
            ignore: vocabulary.integrations.ignore.iter().map(|k| k.to_lowercase()).collect(),
            strip_suffixes: lowercase_all(&vocabulary.integrations.strip_suffixes),
            labels: vocabulary
                .integrations
                .labels
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
        }
    }

    pub(crate) fn trigger_category(&self, kind: &str) -> Option<TriggerCategory> {
        let kind = kind.to_lowercase();
        if let Some(category) = self.triggers.get(&kind) {
            return Some(*category);
        }
        self.generic_suffixes
            .iter()
            .any(|suffix| kind.len() > suffix.len() && kind.ends_with(suffix.as_str()))
            .then_some(TriggerCategory::Generic)
    }

    /// Human label for the integration behind a node kind, if any.
    pub(crate) fn integration_label(&self, kind: &str) -> Option<String> {
        if kind.is_empty() || self.ignore.contains(&kind.to_lowercase()) {
            return None;
        }

        let stripped = self.strip_suffix(kind);
        if let Some(label) = self.labels.get(&stripped.to_lowercase()) {
            return Some(label.clone());
        }

        let label = humanize(stripped);
        (!label.is_empty()).then_some(label)
    }

    fn strip_suffix<'a>(&self, kind: &'a str) -> &'a str {
        for suffix in &self.strip_suffixes {
            let width = suffix.chars().count();
            if width == 0 {
                continue;
            }
            // Split on a char boundary of `kind` itself; lowercasing may change byte lengths
            let Some((start, _)) = kind.char_indices().rev().nth(width - 1) else {
                continue;
            };
            if start > 0 && kind[start..].to_lowercase() == *suffix {
                return &kind[..start];
            }
        }
        kind
    }
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

/// `googleSheets` → `Google Sheets`, `aws-lambda` → `Aws Lambda`.
fn humanize(kind: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in kind.chars() {
        if c == '-' || c == '_' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_vocabulary_parses() {
        let vocabulary = Vocabulary::builtin();
        assert!(vocabulary.version >= 1);
        assert!(vocabulary.triggers.webhook.iter().any(|k| k == "webhook"));
        assert!(vocabulary.integrations.labels.contains_key("httpRequest"));
    }

    #[test]
    fn test_trigger_category_lookup() {
        let compiled = CompiledVocabulary::new(&Vocabulary::builtin());
        assert_eq!(compiled.trigger_category("webhook"), Some(TriggerCategory::Webhook));
        assert_eq!(compiled.trigger_category("ScheduleTrigger"), Some(TriggerCategory::Schedule));
        assert_eq!(compiled.trigger_category("cron"), Some(TriggerCategory::Schedule));
        assert_eq!(compiled.trigger_category("manualTrigger"), Some(TriggerCategory::Manual));
        assert_eq!(compiled.trigger_category("telegramTrigger"), Some(TriggerCategory::Generic));
        assert_eq!(compiled.trigger_category("trigger"), None);
        assert_eq!(compiled.trigger_category("slack"), None);
    }

    #[test]
    fn test_integration_labels() {
        let compiled = CompiledVocabulary::new(&Vocabulary::builtin());
        assert_eq!(compiled.integration_label("slack").as_deref(), Some("Slack"));
        assert_eq!(compiled.integration_label("slackTrigger").as_deref(), Some("Slack"));
        assert_eq!(compiled.integration_label("googleSheets").as_deref(), Some("Google Sheets"));
        assert_eq!(compiled.integration_label("httpRequest").as_deref(), Some("HTTP Request"));
        assert_eq!(compiled.integration_label("gmailTool").as_deref(), Some("Gmail"));
        assert_eq!(compiled.integration_label("lmChatOpenAi").as_deref(), Some("OpenAI"));
        assert_eq!(compiled.integration_label("set"), None);
        assert_eq!(compiled.integration_label("stickyNote"), None);
        assert_eq!(compiled.integration_label("Webhook"), None);
        assert_eq!(compiled.integration_label(""), None);
    }

    #[test]
    fn test_strip_suffix_respects_char_boundaries() {
        let mut vocabulary = Vocabulary::builtin();
        vocabulary.integrations.strip_suffixes.push("k".to_string());
        let compiled = CompiledVocabulary::new(&vocabulary);

        // KELVIN SIGN lowercases to a one-byte `k`
        assert_eq!(compiled.integration_label("Acme\u{212A}").as_deref(), Some("Acme"));
        assert_eq!(compiled.strip_suffix("\u{212A}"), "\u{212A}");
        assert_eq!(compiled.strip_suffix("acmeTrigger"), "acme");
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("googleSheets"), "Google Sheets");
        assert_eq!(humanize("aws-lambda"), "Aws Lambda");
        assert_eq!(humanize("microsoft_outlook"), "Microsoft Outlook");
        assert_eq!(humanize("notion"), "Notion");
        assert_eq!(humanize("n8n"), "N8n");
    }

    #[test]
    fn test_custom_vocabulary_and_version_check() {
        let text = r#"
version = 3
[triggers]
webhook = ["hook"]
[integrations]
ignore = ["noise"]
"#;
        let vocabulary = Vocabulary::from_toml_str(text).unwrap();
        assert_eq!(vocabulary.version, 3);
        assert!(vocabulary.integrations.labels.is_empty());

        let compiled = CompiledVocabulary::new(&vocabulary);
        assert_eq!(compiled.trigger_category("HOOK"), Some(TriggerCategory::Webhook));
        assert_eq!(compiled.integration_label("noise"), None);

        let err = Vocabulary::from_toml_str("version = 0\n[triggers]\n[integrations]\n").unwrap_err();
        assert!(matches!(err, FlowdexError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("vocab.toml");
        std::fs::write(&path, "version = 2\n[triggers]\n[integrations]\n").unwrap();
        let vocabulary = Vocabulary::load(&path).unwrap();
        assert_eq!(vocabulary.version, 2);
    }
}
