//! First-use acronym tracking.
//!
//! House style expands an acronym the first time it appears ("Multi-access
//! Edge Computing (MEC)") and uses the short form thereafter. The tracker is
//! per-run state threaded through chunk assembly: it knows which acronyms
//! were already expanded in the original text, which the rewrite of an
//! earlier chunk is expected to expand, and formats prompt directives for
//! the rewrite source.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Acronyms that get first-use expansion, with their expansions.
pub static EXPANDABLE: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("MEC", "Multi-access Edge Computing"),
        ("IoT", "Internet of Things"),
        ("IIoT", "Industrial Internet of Things"),
        ("OT", "Operational Technology"),
        ("AI", "Artificial Intelligence"),
        ("ML", "Machine Learning"),
        ("API", "Application Programming Interface"),
        ("SDK", "Software Development Kit"),
        ("VM", "Virtual Machine"),
        ("DNS", "Domain Name System"),
        ("QoS", "Quality of Service"),
        ("SLA", "Service Level Agreement"),
        ("KPI", "Key Performance Indicator"),
        ("ROI", "Return on Investment"),
        ("PoC", "Proof of Concept"),
        ("SDN", "Software-Defined Networking"),
        ("NFV", "Network Functions Virtualization"),
        ("RAN", "Radio Access Network"),
        ("UE", "User Equipment"),
        ("UPF", "User Plane Function"),
        ("CPS", "Cyber-Physical System"),
        ("SCADA", "Supervisory Control and Data Acquisition"),
        ("DER", "Distributed Energy Resource"),
        ("EMS", "Energy Management System"),
        ("VPP", "Virtual Power Plant"),
        ("AMI", "Advanced Metering Infrastructure"),
    ])
});

/// Organization names that stay abbreviated.
pub static ORGANIZATIONS: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    BTreeSet::from([
        "ETSI", "IEEE", "DTC", "GSMA", "TMF", "3GPP", "IETF", "W3C", "ISO", "IEC", "NIST",
        "OASIS", "OMG", "OPC", "IIC", "CNCF", "AWS", "GCP",
    ])
});

pub fn expansion_of(acronym: &str) -> Option<&'static str> {
    EXPANDABLE.get(acronym).copied()
}

pub fn is_organization(acronym: &str) -> bool {
    ORGANIZATIONS.contains(acronym)
}

/// "Expansion (ACRONYM)" first-use form.
pub fn first_use_form(acronym: &str) -> String {
    match expansion_of(acronym) {
        Some(expansion) => format!("{expansion} ({acronym})"),
        None => acronym.to_string(),
    }
}

/// Per-run acronym state. Chunks must be processed in document order.
#[derive(Debug, Default)]
pub struct AcronymTracker {
    defined: BTreeSet<String>,
}

/// Acronym directives for one chunk's rewrite prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcronymDirectives {
    /// Already defined earlier; the rewrite keeps the short form.
    pub defined: Vec<String>,
    /// First use falls in this chunk; the rewrite expands on first use.
    pub expand_here: Vec<String>,
}

impl AcronymDirectives {
    pub fn is_empty(&self) -> bool {
        self.defined.is_empty() && self.expand_here.is_empty()
    }

    /// Render as prompt text for the rewrite source.
    pub fn prompt_text(&self) -> String {
        let mut out = String::new();
        if !self.defined.is_empty() {
            out.push_str("Already defined, use short form: ");
            out.push_str(&self.defined.join(", "));
        }
        if !self.expand_here.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Expand on first use: ");
            let expansions: Vec<String> = self
                .expand_here
                .iter()
                .map(|a| first_use_form(a))
                .collect();
            out.push_str(&expansions.join(", "));
        }
        out
    }
}

impl AcronymTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prime the tracker from the original document: any acronym already
    /// expanded in the source text counts as defined from the start.
    pub fn scan_existing(&mut self, full_text: &str) {
        for (acronym, expansion) in EXPANDABLE.iter() {
            if expanded_form_present(full_text, acronym, expansion) {
                self.defined.insert((*acronym).to_string());
            }
        }
    }

    /// Expandable acronyms appearing in `text` as whole words.
    pub fn acronyms_in(&self, text: &str) -> BTreeSet<String> {
        EXPANDABLE
            .keys()
            .filter(|a| whole_word_present(text, a))
            .map(|a| (*a).to_string())
            .collect()
    }

    /// Directives for the next chunk in document order. Marks this chunk's
    /// first uses as defined so later chunks see them as such; the rewrite
    /// is expected to perform the expansion.
    pub fn process_chunk(&mut self, text: &str) -> AcronymDirectives {
        let present = self.acronyms_in(text);
        let mut directives = AcronymDirectives::default();

        for acronym in present {
            if self.defined.contains(&acronym) {
                directives.defined.push(acronym);
            } else if expansion_of(&acronym)
                .map(|e| expanded_form_present(text, &acronym, e))
                .unwrap_or(false)
            {
                // Already expanded inside this chunk's own text.
                self.defined.insert(acronym.clone());
                directives.defined.push(acronym);
            } else {
                self.defined.insert(acronym.clone());
                directives.expand_here.push(acronym);
            }
        }

        directives
    }

    pub fn defined(&self) -> &BTreeSet<String> {
        &self.defined
    }
}

fn whole_word_present(text: &str, acronym: &str) -> bool {
    // Acronyms contain regex-safe characters only, but escape anyway.
    let pattern = format!(r"\b{}\b", regex::escape(acronym));
    Regex::new(&pattern).map(|re| re.is_match(text)).unwrap_or(false)
}

fn expanded_form_present(text: &str, acronym: &str, expansion: &str) -> bool {
    let pattern = format!(
        r"(?i){}\s*\({}\)",
        regex::escape(expansion),
        regex::escape(acronym)
    );
    Regex::new(&pattern).map(|re| re.is_match(text)).unwrap_or(false)
}
