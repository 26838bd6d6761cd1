use std::path::PathBuf;

use super::{parse_rule_string, RuleSpec};
use crate::pipeline::structuring::{ClassificationRecord, UNKNOWN};

/// Relative destination folder: one segment per rule, in chain order.
///
/// A missing or blank value becomes `"Unknown"`; an empty chain is the single
/// segment `"Unknown"`. Values are used as-is after trimming.
pub fn generate_target_path(rules: &[RuleSpec], record: &ClassificationRecord) -> PathBuf {
    if rules.is_empty() {
        return PathBuf::from(UNKNOWN);
    }

    rules
        .iter()
        .map(|rule| {
            record
                .get(&rule.key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(UNKNOWN)
        })
        .collect()
}

/// Parse `instruction` and generate the path in one step.
pub fn generate_target_path_from_str(instruction: &str, record: &ClassificationRecord) -> PathBuf {
    generate_target_path(&parse_rule_string(instruction), record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> ClassificationRecord {
        pairs.iter().copied().collect()
    }

    #[test]
    fn chinese_instruction_builds_nested_path() {
        let data = record(&[("category", "Work"), ("year", "2024"), ("month", "01")]);
        let path = generate_target_path_from_str("类型 >> 年份 >> 月份", &data);
        assert_eq!(path, PathBuf::from("Work").join("2024").join("01"));
    }

    #[test]
    fn one_segment_per_rule_with_unknown_fill() {
        let data = record(&[("category", "Finance"), ("summary", "   ")]);
        let rules = parse_rule_string("Category >> Year >> Summary >> Project");
        let path = generate_target_path(&rules, &data);

        let segments: Vec<_> = path.iter().map(|s| s.to_string_lossy().into_owned()).collect();
        assert_eq!(segments, vec!["Finance", UNKNOWN, UNKNOWN, UNKNOWN]);
    }

    #[test]
    fn values_are_trimmed() {
        let data = record(&[("category", "  Contract ")]);
        assert_eq!(
            generate_target_path_from_str("Category", &data),
            PathBuf::from("Contract")
        );
    }

    #[test]
    fn empty_chain_is_unknown() {
        let data = record(&[("category", "Work")]);
        assert_eq!(generate_target_path(&[], &data), PathBuf::from(UNKNOWN));
        assert_eq!(generate_target_path_from_str("  ", &data), PathBuf::from(UNKNOWN));
    }

    #[test]
    fn repeated_keys_repeat_segments() {
        let data = record(&[("year", "2023"), ("category", "Study")]);
        let path = generate_target_path_from_str("Year >> Category >> Year", &data);
        assert_eq!(path, PathBuf::from("2023").join("Study").join("2023"));
    }

    #[test]
    fn generation_is_idempotent() {
        let data = ClassificationRecord::with_defaults();
        let rules = parse_rule_string("Category [Contract, Invoice] >> Month");
        assert_eq!(
            generate_target_path(&rules, &data),
            generate_target_path(&rules, &data)
        );
    }
}
