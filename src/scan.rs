//! Token extraction shared by the verifier and the chunk validator.
//!
//! Numbers, citation-style references, and normative keywords are the
//! content classes that must survive any edit; both the surgical verifier
//! and the holistic validator count them with the same patterns so a check
//! passing on one path cannot fail on the other for pattern reasons.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    // Plain and decimal numbers with optional percent, comma-grouped
    // thousands, and currency amounts.
    Regex::new(r"\$[\d,]+(?:\.\d+)?|\b\d+(?:,\d{3})+\b|\b\d+(?:\.\d+)?%?").unwrap()
});

static CITATION_RE: Lazy<Regex> = Lazy::new(|| {
    // Figure/Table references (both "Figure 3-1" and "Figure 1"), section
    // references, and bracketed numeric citations.
    Regex::new(
        r"(?i)\bfigure\s+\d+(?:[-–]\d+)?|\btable\s+\d+(?:[-–]\d+)?|\bsection\s+\d+(?:\.\d+)*|\[\d+\]",
    )
    .unwrap()
});

static NORMATIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:SHALL|MUST|MAY|SHOULD)\b").unwrap());

/// Distinct numeric tokens with occurrence counts.
pub fn numeric_tokens(text: &str) -> HashMap<String, usize> {
    count_matches(&NUMBER_RE, text, false)
}

/// Distinct citation tokens (case-normalized) with occurrence counts.
pub fn citation_tokens(text: &str) -> HashMap<String, usize> {
    count_matches(&CITATION_RE, text, true)
}

/// Distinct normative keywords (SHALL/MUST/MAY/SHOULD) with counts.
pub fn normative_keywords(text: &str) -> HashMap<String, usize> {
    count_matches(&NORMATIVE_RE, text, false)
}

fn count_matches(re: &Regex, text: &str, lowercase: bool) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for m in re.find_iter(text) {
        let token = if lowercase {
            m.as_str().to_lowercase()
        } else {
            m.as_str().to_string()
        };
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

/// Case-insensitive occurrence count of `term` in `text`.
///
/// Case-insensitivity is what permits the allowed case-normalization of
/// protected terms while still catching deletions and rewording.
pub fn term_count(text: &str, term: &str) -> usize {
    if term.is_empty() {
        return 0;
    }
    let haystack = text.to_lowercase();
    let needle = term.to_lowercase();
    let mut count = 0;
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(&needle) {
        count += 1;
        from += pos + needle.len();
    }
    count
}

/// Tokens present in `before` whose count decreased in `after`.
pub fn missing_tokens(
    before: &HashMap<String, usize>,
    after: &HashMap<String, usize>,
) -> Vec<String> {
    let mut missing: Vec<String> = before
        .iter()
        .filter(|(token, count)| after.get(*token).copied().unwrap_or(0) < **count)
        .map(|(token, _)| token.clone())
        .collect();
    missing.sort();
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_include_percent_and_currency() {
        let counts = numeric_tokens("a 42% lift over $1,200.50 across 3 sites");
        assert!(counts.contains_key("42%"));
        assert!(counts.contains_key("$1,200.50"));
        assert!(counts.contains_key("3"));
    }

    #[test]
    fn citations_are_case_normalized() {
        let counts = citation_tokens("See Figure 3-1 and table 2, plus [14] and Section 4.2.");
        assert_eq!(counts.get("figure 3-1"), Some(&1));
        assert_eq!(counts.get("table 2"), Some(&1));
        assert_eq!(counts.get("[14]"), Some(&1));
        assert_eq!(counts.get("section 4.2"), Some(&1));
    }

    #[test]
    fn normative_keywords_are_exact_case() {
        let counts = normative_keywords("The client SHALL retry. It must not loop.");
        assert_eq!(counts.get("SHALL"), Some(&1));
        assert!(!counts.contains_key("MUST"));
    }

    #[test]
    fn term_count_ignores_case() {
        assert_eq!(term_count("Digital Twin and digital twin", "digital twin"), 2);
        assert_eq!(term_count("nothing here", "digital twin"), 0);
    }

    #[test]
    fn missing_tokens_detects_count_decrease() {
        let before = numeric_tokens("42 and 42 and 7");
        let after = numeric_tokens("42 and 7");
        assert_eq!(missing_tokens(&before, &after), vec!["42".to_string()]);
    }
}
