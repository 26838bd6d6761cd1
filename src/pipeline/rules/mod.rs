//! Folder-rule DSL: `Field [opt1, opt2] >> Field >> ...`.
//!
//! Each `>>` segment names a record field and optionally restricts it to an
//! enumerated set of values. The chain order is the folder nesting order.

pub mod path;

pub use path::*;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One field reference from a rule chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub key: String,
    /// `None` when the segment had no bracket.
    pub options: Option<Vec<String>>,
}

impl RuleSpec {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            options: None,
        }
    }

    pub fn with_options<I, S>(key: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            options: Some(options.into_iter().map(Into::into).collect()),
        }
    }

    /// True when the rule restricts its field to at least one value.
    pub fn is_constrained(&self) -> bool {
        self.options.as_ref().is_some_and(|o| !o.is_empty())
    }
}

/// Display names (lower-cased) to record keys.
const FIELD_SYNONYMS: &[(&str, &str)] = &[
    ("类型", "category"),
    ("category", "category"),
    ("年份", "year"),
    ("year", "year"),
    ("月份", "month"),
    ("month", "month"),
    ("原文件名", "original_name"),
    ("original name", "original_name"),
    ("摘要", "summary"),
    ("summary", "summary"),
];

/// Map a field display name to its record key; unknown names pass through
/// lower-cased.
pub fn canonical_key(name: &str) -> String {
    let lowered = name.to_lowercase();
    FIELD_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == lowered)
        .map(|(_, key)| key.to_string())
        .unwrap_or(lowered)
}

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\[]+)(?:\s*\[([^\]]+)\])?$").expect("static regex"));

static OPTION_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,，]").expect("static regex"));

/// Parse an instruction string into its ordered rule chain.
///
/// Segments that do not fit `name [options]` are kept as a key-only rule
/// named after the whole segment. Blank input yields an empty chain.
pub fn parse_rule_string(instruction: &str) -> Vec<RuleSpec> {
    if instruction.trim().is_empty() {
        return Vec::new();
    }

    instruction
        .split(">>")
        .map(str::trim)
        .map(parse_segment)
        .collect()
}

fn parse_segment(segment: &str) -> RuleSpec {
    let Some(caps) = SEGMENT.captures(segment) else {
        tracing::debug!(segment, "Rule segment has no recognised shape, using it as a key");
        return RuleSpec::new(canonical_key(segment));
    };

    let key = canonical_key(caps[1].trim());
    let options = caps.get(2).map(|list| {
        OPTION_SEPARATOR
            .split(list.as_str())
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    });
    RuleSpec { key, options }
}
