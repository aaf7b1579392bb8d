//! Metadata classification: trigger type, complexity tier and integration set
//! derived from a parsed workflow.
//!
//! Classification is total and deterministic. Unknown node types count towards
//! `node_count` but contribute nothing else; a workflow without any recognizable
//! trigger is `Manual`.

mod vocabulary;

pub use vocabulary::{IntegrationTable, TriggerCategory, TriggerTable, Vocabulary};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::config::ClassifierConfig;
use crate::error::{FlowdexError, Result};
use crate::workflow::WorkflowDocument;
use vocabulary::CompiledVocabulary;

/// How a workflow's execution is initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    Manual,
    Webhook,
    Scheduled,
    Triggered,
    Complex,
}

impl TriggerType {
    pub const ALL: [TriggerType; 5] = [
        TriggerType::Manual,
        TriggerType::Webhook,
        TriggerType::Scheduled,
        TriggerType::Triggered,
        TriggerType::Complex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "Manual",
            TriggerType::Webhook => "Webhook",
            TriggerType::Scheduled => "Scheduled",
            TriggerType::Triggered => "Triggered",
            TriggerType::Complex => "Complex",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = FlowdexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| FlowdexError::InvalidInput(format!("unknown trigger type: {}", s)))
    }
}

/// Coarse size classification of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub const ALL: [Complexity; 3] = [Complexity::Simple, Complexity::Medium, Complexity::Complex];

    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "Simple",
            Complexity::Medium => "Medium",
            Complexity::Complex => "Complex",
        }
    }

    fn bumped(self) -> Self {
        match self {
            Complexity::Simple => Complexity::Medium,
            Complexity::Medium | Complexity::Complex => Complexity::Complex,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = FlowdexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| FlowdexError::InvalidInput(format!("unknown complexity: {}", s)))
    }
}

/// Metadata computed from a workflow; never read from the document itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedMetadata {
    pub trigger_type: TriggerType,
    pub complexity: Complexity,
    pub node_count: usize,
    /// Sorted, de-duplicated.
    pub integrations: Vec<String>,
}

/// Thresholds for the complexity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComplexityPolicy {
    pub simple_max_nodes: usize,
    pub medium_max_nodes: usize,
    pub integration_escalation: usize,
}

impl Default for ComplexityPolicy {
    fn default() -> Self {
        Self {
            simple_max_nodes: 5,
            medium_max_nodes: 15,
            integration_escalation: 6,
        }
    }
}

impl ComplexityPolicy {
    pub fn tier(&self, node_count: usize, integration_count: usize) -> Complexity {
        let tier = if node_count <= self.simple_max_nodes {
            Complexity::Simple
        } else if node_count <= self.medium_max_nodes {
            Complexity::Medium
        } else {
            Complexity::Complex
        };

        if integration_count >= self.integration_escalation {
            tier.bumped()
        } else {
            tier
        }
    }
}

impl From<&ClassifierConfig> for ComplexityPolicy {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            simple_max_nodes: config.simple_max_nodes,
            medium_max_nodes: config.medium_max_nodes,
            integration_escalation: config.integration_escalation,
        }
    }
}

/// Derives [`DerivedMetadata`] from parsed workflows.
#[derive(Debug, Clone)]
pub struct Classifier {
    vocabulary: Vocabulary,
    compiled: CompiledVocabulary,
    policy: ComplexityPolicy,
    fingerprint: String,
}

impl Classifier {
    pub fn new(vocabulary: Vocabulary, policy: ComplexityPolicy) -> Self {
        let fingerprint = fingerprint(&vocabulary, &policy);
        Self {
            compiled: CompiledVocabulary::new(&vocabulary),
            vocabulary,
            policy,
            fingerprint,
        }
    }

    /// Built-in vocabulary with default thresholds
    pub fn builtin() -> Self {
        Self::new(Vocabulary::builtin(), ComplexityPolicy::default())
    }

    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let vocabulary = match &config.vocabulary_path {
            Some(path) => Vocabulary::load(path)?,
            None => Vocabulary::builtin(),
        };
        Ok(Self::new(vocabulary, ComplexityPolicy::from(config)))
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn policy(&self) -> &ComplexityPolicy {
        &self.policy
    }

    /// Stable digest of the vocabulary and thresholds.
    ///
    /// Two classifiers with the same fingerprint classify every document the same way.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn classify(&self, document: &WorkflowDocument) -> DerivedMetadata {
        let mut categories = BTreeSet::new();
        let mut integrations = BTreeSet::new();

        for node in &document.nodes {
            let kind = node.kind();
            if let Some(category) = self.compiled.trigger_category(kind) {
                categories.insert(category);
            }
            if let Some(label) = self.compiled.integration_label(kind) {
                integrations.insert(label);
            }
        }

        let node_count = document.node_count();
        DerivedMetadata {
            trigger_type: trigger_type(&categories),
            complexity: self.policy.tier(node_count, integrations.len()),
            node_count,
            integrations: integrations.into_iter().collect(),
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::builtin()
    }
}

fn trigger_type(categories: &BTreeSet<TriggerCategory>) -> TriggerType {
    let mut iter = categories.iter();
    match (iter.next(), iter.next()) {
        (None, _) => TriggerType::Manual,
        (Some(_), Some(_)) => TriggerType::Complex,
        (Some(TriggerCategory::Webhook), None) => TriggerType::Webhook,
        (Some(TriggerCategory::Schedule), None) => TriggerType::Scheduled,
        (Some(TriggerCategory::Manual), None) => TriggerType::Manual,
        (Some(TriggerCategory::Generic), None) => TriggerType::Triggered,
    }
}

fn fingerprint(vocabulary: &Vocabulary, policy: &ComplexityPolicy) -> String {
    let mut hasher = Sha256::new();
    // Field order is fixed by the struct definitions and labels are a BTreeMap
    hasher.update(serde_json::to_vec(vocabulary).unwrap_or_default());
    hasher.update(serde_json::to_vec(policy).unwrap_or_default());
    format!("{:x}", hasher.finalize())
}
