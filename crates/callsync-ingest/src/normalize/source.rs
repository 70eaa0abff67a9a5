//! Lead source channel classification
//!
//! The rules are an ordered table evaluated top to bottom; the first rule
//! whose condition holds decides the label. Several rules overlap (the
//! generic WhatsApp pattern would also match the marketing variants), so the
//! order is part of the behaviour.

use super::cached_regex;
use super::text::normalize_script;
use regex::Regex;
use std::sync::OnceLock;

/// Channel names passed through unchanged from either input
pub const VALID_CHANNELS: &[&str] = &[
    "Instagram - Diet Hub",
    "Facebook - Diet Hub",
    "Instagram - Jidalur",
    "Facebook - Jidalur",
    "Facebook - Beltix",
    "Instagram - Beltix",
    "IG Lead generation",
    "Lead generation",
];

const DEFAULT_CHANNEL: &str = "Others";

#[derive(Debug, Clone, Copy)]
pub enum Condition {
    SourceIn(&'static [&'static str]),
    SourceMatches(fn() -> &'static Regex),
    ContactIn(&'static [&'static str]),
    /// Source is non-empty and not the literal `nan`
    SourcePresent,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Source,
    Contact,
    Label(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct SourceRule {
    pub name: &'static str,
    pub when: Condition,
    pub then: Outcome,
}

pub const SOURCE_RULES: &[SourceRule] = &[
    SourceRule {
        name: "whatsapp-campaigns",
        when: Condition::SourceIn(&["Whatsapp - Marketing", "Whatsapp - Mou"]),
        then: Outcome::Source,
    },
    SourceRule {
        name: "whatsapp",
        when: Condition::SourceMatches(whatsapp_re),
        then: Outcome::Label("WhatsApp"),
    },
    SourceRule {
        name: "lead-forms",
        when: Condition::SourceIn(&["Instant form", "Lead generation", "IG lead generation"]),
        then: Outcome::Source,
    },
    SourceRule {
        name: "valid-source",
        when: Condition::SourceIn(VALID_CHANNELS),
        then: Outcome::Source,
    },
    SourceRule {
        name: "crm-form",
        when: Condition::SourceIn(&["CRM form"]),
        then: Outcome::Label("Others"),
    },
    SourceRule {
        name: "callback",
        when: Condition::SourceIn(&["Callback"]),
        then: Outcome::Label("Call"),
    },
    SourceRule {
        name: "ig-to-site",
        when: Condition::SourceIn(&["IG to site"]),
        then: Outcome::Label("Ig to site"),
    },
    SourceRule {
        name: "fb-to-website",
        when: Condition::SourceIn(&["FB To Website"]),
        then: Outcome::Label("FB To Website"),
    },
    SourceRule {
        name: "valid-contact-source",
        when: Condition::ContactIn(VALID_CHANNELS),
        then: Outcome::Contact,
    },
    SourceRule {
        name: "sales-whatsapp",
        when: Condition::SourceMatches(sales_whatsapp_re),
        then: Outcome::Label("WhatsApp"),
    },
    SourceRule {
        name: "passthrough",
        when: Condition::SourcePresent,
        then: Outcome::Source,
    },
    SourceRule {
        name: "default",
        when: Condition::Always,
        then: Outcome::Label(DEFAULT_CHANNEL),
    },
];

fn whatsapp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(&RE, r"(?i)^Whatsapp($|\s[^-]| -[^-])")
}

fn sales_whatsapp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached_regex(&RE, r"(?i)^Sales\s*Whatsapp")
}

impl Condition {
    fn holds(&self, source: &str, contact: &str) -> bool {
        match self {
            Condition::SourceIn(values) => values.iter().any(|v| *v == source),
            Condition::SourceMatches(pattern) => pattern().is_match(source),
            Condition::ContactIn(values) => values.iter().any(|v| *v == contact),
            Condition::SourcePresent => !source.is_empty() && source != "nan",
            Condition::Always => true,
        }
    }
}

impl SourceRule {
    /// The label this rule assigns, if its condition holds
    pub fn apply(&self, source: &str, contact: &str) -> Option<String> {
        if !self.when.holds(source, contact) {
            return None;
        }
        Some(match self.then {
            Outcome::Source => source.to_string(),
            Outcome::Contact => contact.to_string(),
            Outcome::Label(label) => label.to_string(),
        })
    }
}

/// Channel label for a record's source and contact source
pub fn classify_source(source: Option<&str>, contact_source: Option<&str>) -> String {
    classify_with(SOURCE_RULES, source, contact_source)
}

/// Evaluate `rules` in order against script-normalized inputs
pub fn classify_with(
    rules: &[SourceRule],
    source: Option<&str>,
    contact_source: Option<&str>,
) -> String {
    let source = normalize_script(source);
    let contact = normalize_script(contact_source);

    rules
        .iter()
        .find_map(|rule| rule.apply(&source, &contact))
        .unwrap_or_else(|| DEFAULT_CHANNEL.to_string())
}
