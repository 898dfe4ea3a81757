//! Violation filter pipeline
//!
//! Two composable, pure, order-preserving stages. When both run,
//! [`restrict_to_lines`] must run last so a violation outside the diff
//! can never survive the pipeline, whatever the exclusion rules say.

use std::collections::BTreeSet;

use crate::models::Violation;

/// Drop violations whose category (case-insensitively) or severity is
/// excluded. The two checks are independent: either alone excludes.
pub fn exclude_by_rule(
    violations: Vec<Violation>,
    excluded_categories: &BTreeSet<String>,
    excluded_severities: &BTreeSet<u32>,
) -> Vec<Violation> {
    let excluded_categories: BTreeSet<String> = excluded_categories
        .iter()
        .map(|category| category.to_uppercase())
        .collect();
    violations
        .into_iter()
        .filter(|violation| {
            !excluded_categories.contains(&violation.category.to_uppercase())
                && !excluded_severities.contains(&violation.severity)
        })
        .collect()
}

/// Keep only violations on the given lines. An empty keep-set yields an
/// empty result: a file with no tracked added lines contributes zero
/// reportable violations, wherever the analyzer found issues.
pub fn restrict_to_lines(violations: Vec<Violation>, keep_lines: &BTreeSet<u32>) -> Vec<Violation> {
    violations
        .into_iter()
        .filter(|violation| keep_lines.contains(&violation.line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(line: u32, severity: u32, category: &str) -> Violation {
        Violation {
            rule: "rs/test".to_string(),
            line,
            line_count: None,
            description: format!("issue at {line}"),
            severity,
            category: category.to_string(),
            tool: "test".to_string(),
            rule_url: None,
            language: "Python".to_string(),
        }
    }

    fn categories(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn severities(values: &[u32]) -> BTreeSet<u32> {
        values.iter().copied().collect()
    }

    fn lines(values: &[u32]) -> BTreeSet<u32> {
        values.iter().copied().collect()
    }

    #[test]
    fn category_match_is_case_insensitive() {
        let violations = vec![violation(1, 3, "Design"), violation(2, 3, "Security")];
        let kept = exclude_by_rule(violations, &categories(&["design"]), &severities(&[]));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].category, "Security");
    }

    #[test]
    fn severity_alone_can_exclude() {
        let violations = vec![violation(1, 3, "Design"), violation(2, 1, "Design")];
        let kept = exclude_by_rule(violations, &categories(&[]), &severities(&[3]));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].severity, 1);
    }

    #[test]
    fn restrict_to_empty_lines_is_always_empty() {
        let violations = vec![violation(1, 3, "Design"), violation(50, 1, "Security")];
        assert!(restrict_to_lines(violations, &BTreeSet::new()).is_empty());
    }

    #[test]
    fn restrict_keeps_only_matching_lines() {
        let violations = vec![
            violation(10, 3, "Design"),
            violation(11, 3, "Design"),
            violation(50, 1, "Security"),
        ];
        let kept = restrict_to_lines(violations, &lines(&[10, 11, 12]));
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].line, 10);
        assert_eq!(kept[1].line, 11);
    }

    #[test]
    fn filtering_preserves_analyzer_order() {
        let violations = vec![
            violation(30, 3, "Design"),
            violation(10, 3, "Design"),
            violation(20, 3, "Design"),
        ];
        let kept = restrict_to_lines(violations, &lines(&[10, 20, 30]));
        let kept_lines: Vec<u32> = kept.iter().map(|v| v.line).collect();
        assert_eq!(kept_lines, vec![30, 10, 20]);
    }

    #[test]
    fn composed_stages_equal_a_single_combined_predicate() {
        let violations: Vec<Violation> = (1..=40)
            .map(|i| {
                violation(
                    i,
                    (i % 4) + 1,
                    if i % 2 == 0 { "Design" } else { "Security" },
                )
            })
            .collect();
        let excluded_categories = categories(&["DESIGN"]);
        let excluded_severities = severities(&[2]);
        let keep_lines = lines(&[3, 4, 5, 10, 21, 39]);

        let piped = restrict_to_lines(
            exclude_by_rule(violations.clone(), &excluded_categories, &excluded_severities),
            &keep_lines,
        );

        let combined: Vec<Violation> = violations
            .into_iter()
            .filter(|v| {
                !excluded_categories.contains(&v.category.to_uppercase())
                    && !excluded_severities.contains(&v.severity)
                    && keep_lines.contains(&v.line)
            })
            .collect();

        assert_eq!(piped, combined);
    }
}
