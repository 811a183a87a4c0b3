//! Rule packs: replacement rules, protected terms, and lint settings.
//!
//! Packs are TOML files loaded with the same strictness as any other
//! config: parse, then `validate()`, with path context attached to every
//! error. A default pack is compiled in so the CLI works out of the box.

use crate::editop::RiskTier;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A deterministic search-and-replace rule.
#[derive(Debug, Deserialize, Clone)]
pub struct ReplacementRule {
    pub id: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub rationale: String,
    pub search: String,
    pub replace: String,
    #[serde(default = "default_true")]
    pub case_insensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
    #[serde(default)]
    pub requires_review: bool,
    /// Carried onto every op the rule proposes, through to the changelog.
    #[serde(default)]
    pub risk_tier: RiskTier,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_true() -> bool {
    true
}

/// Lint thresholds and required sections.
#[derive(Debug, Deserialize, Clone)]
pub struct LintSettings {
    #[serde(default = "default_title_max_words")]
    pub title_max_words: usize,
    #[serde(default = "default_max_sentence_words")]
    pub max_sentence_words: usize,
    #[serde(default)]
    pub required_sections: Vec<String>,
}

fn default_title_max_words() -> usize {
    7
}

fn default_max_sentence_words() -> usize {
    35
}

impl Default for LintSettings {
    fn default() -> Self {
        Self {
            title_max_words: default_title_max_words(),
            max_sentence_words: default_max_sentence_words(),
            required_sections: Vec::new(),
        }
    }
}

/// One loaded rule pack.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RulePack {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rules: Vec<ReplacementRule>,
    #[serde(default)]
    pub protected_terms: Vec<String>,
    #[serde(default)]
    pub lint: Option<LintSettings>,
}

impl RulePack {
    pub fn validate(&self) -> Result<(), RuleValidationError> {
        let mut issues = Vec::new();
        let mut seen = BTreeSet::new();

        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                issues.push(RuleIssue::MissingField { rule_id: None, field: "id" });
            } else if !seen.insert(rule.id.clone()) {
                issues.push(RuleIssue::DuplicateId { rule_id: rule.id.clone() });
            }
            if rule.search.trim().is_empty() {
                issues.push(RuleIssue::MissingField {
                    rule_id: Some(rule.id.clone()),
                    field: "search",
                });
            }
            if rule.search == rule.replace {
                issues.push(RuleIssue::NoOpRule { rule_id: rule.id.clone() });
            }
        }

        for term in &self.protected_terms {
            if term.trim().is_empty() {
                issues.push(RuleIssue::EmptyProtectedTerm);
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(RuleValidationError { issues })
        }
    }

    pub fn protected_term_set(&self) -> BTreeSet<String> {
        self.protected_terms.iter().cloned().collect()
    }

    pub fn lint_settings(&self) -> LintSettings {
        self.lint.clone().unwrap_or_default()
    }

    /// Merge another pack into this one (later packs extend, never replace).
    pub fn merge(&mut self, other: RulePack) {
        self.rules.extend(other.rules);
        self.protected_terms.extend(other.protected_terms);
        if self.lint.is_none() {
            self.lint = other.lint;
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleValidationError {
    pub issues: Vec<RuleIssue>,
}

impl fmt::Display for RuleValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RuleValidationError {}

#[derive(Debug, Clone)]
pub enum RuleIssue {
    MissingField {
        rule_id: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        rule_id: String,
    },
    NoOpRule {
        rule_id: String,
    },
    EmptyProtectedTerm,
}

impl fmt::Display for RuleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleIssue::MissingField { rule_id, field } => match rule_id {
                Some(id) => write!(f, "rule '{id}' missing required field '{field}'"),
                None => write!(f, "rule missing required field '{field}'"),
            },
            RuleIssue::DuplicateId { rule_id } => write!(f, "duplicate rule id '{rule_id}'"),
            RuleIssue::NoOpRule { rule_id } => {
                write!(f, "rule '{rule_id}' replaces its search text with itself")
            }
            RuleIssue::EmptyProtectedTerm => write!(f, "protected term is empty/whitespace"),
        }
    }
}

#[derive(Debug)]
pub enum RulePackError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: RuleValidationError,
    },
}

impl RulePackError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            RulePackError::Toml { path: None, source } => RulePackError::Toml {
                path: Some(path),
                source,
            },
            RulePackError::Validation { path: None, source } => RulePackError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for RulePackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulePackError::Io { path, source } => {
                write!(f, "failed to read rule pack from {}: {}", path.display(), source)
            }
            RulePackError::Toml { path, source } => match path {
                Some(path) => {
                    write!(f, "failed to parse rule pack TOML ({}): {}", path.display(), source)
                }
                None => write!(f, "failed to parse rule pack TOML: {}", source),
            },
            RulePackError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid rule pack ({}): {}", path.display(), source),
                None => write!(f, "invalid rule pack: {}", source),
            },
        }
    }
}

impl std::error::Error for RulePackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RulePackError::Io { source, .. } => Some(source),
            RulePackError::Toml { source, .. } => Some(source),
            RulePackError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<RulePack, RulePackError> {
    let pack: RulePack = toml_edit::de::from_str(input)
        .map_err(|source| RulePackError::Toml { path: None, source })?;
    pack.validate()
        .map_err(|source| RulePackError::Validation { path: None, source })?;
    Ok(pack)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<RulePack, RulePackError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| RulePackError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// The compiled-in default pack: wordiness fixes, throat-clearing removal,
/// and a protected-term baseline.
pub fn default_pack() -> RulePack {
    load_from_str(DEFAULT_PACK_TOML)
        .unwrap_or_else(|e| unreachable!("bundled rule pack must be valid: {e}"))
}

const DEFAULT_PACK_TOML: &str = r#"
name = "default-style"

protected_terms = [
    "Digital Twin Consortium",
    "Multi-access Edge Computing",
]

[lint]
title_max_words = 7
max_sentence_words = 35

[[rules]]
id = "wordy.implementation_of_the_utilization"
category = "clarity"
rationale = "Wordy phrase; prefer the plain verb."
search = "implementation of the utilization of"
replace = "use of"
whole_word = false

[[rules]]
id = "wordy.utilize"
category = "clarity"
rationale = "Prefer 'use' over 'utilize'."
search = "utilize"
replace = "use"
whole_word = true

[[rules]]
id = "wordy.in_order_to"
category = "clarity"
rationale = "'in order to' adds nothing over 'to'."
search = "in order to"
replace = "to"
whole_word = false

[[rules]]
id = "hedge.it_should_be_noted_that"
category = "clarity"
rationale = "Throat-clearing opener."
search = "It should be noted that "
replace = ""
case_insensitive = false
whole_word = false
risk_tier = "medium"

[[rules]]
id = "wordy.a_number_of"
category = "clarity"
rationale = "Vague quantifier; prefer 'several'."
search = "a number of"
replace = "several"
whole_word = false
"#;
