use std::collections::BTreeMap;

use crate::metrics::MetricsReport;
use crate::model::Violation;

/// Renders the markdown verification report.
///
/// Violations are grouped by code; each group shows at most
/// `max_examples` entries in the order the checks sorted them.
pub fn render_report(
    metrics: &MetricsReport,
    violations: &[Violation],
    max_examples: usize,
) -> String {
    let mut lines = vec![
        "# Cheesetrace Verification Report".to_string(),
        String::new(),
        "## Store".to_string(),
    ];
    if let Some(database) = &metrics.database {
        lines.push(format!("- database: {database}"));
    }
    lines.push(format!(
        "- lots: {} ({} fixture)",
        metrics.lots, metrics.fixture_lots
    ));
    lines.push(format!(
        "- result: {}",
        if violations.is_empty() { "PASS" } else { "FAIL" }
    ));
    lines.push(String::new());

    lines.push("## Tables".to_string());
    push_table(
        &mut lines,
        ["table", "rows", "lots covered"],
        metrics.tables.iter().map(|table| {
            [
                table.table.clone(),
                table.rows_found.to_string(),
                table
                    .lots_covered
                    .map_or_else(|| "-".to_string(), |n| format!("{n}/{}", metrics.lots)),
            ]
        }),
    );

    lines.push("## Checks".to_string());
    push_table(
        &mut lines,
        ["check", "checked", "violations"],
        metrics.checks.rows().into_iter().map(|(name, stats)| {
            [
                name.to_string(),
                stats.checked.to_string(),
                stats.violations.to_string(),
            ]
        }),
    );

    if !metrics.warnings.is_empty() {
        lines.push("## Warnings".to_string());
        for warning in &metrics.warnings {
            match &warning.hint {
                Some(hint) => lines.push(format!("- {}: {} ({hint})", warning.path, warning.message)),
                None => lines.push(format!("- {}: {}", warning.path, warning.message)),
            }
        }
        lines.push(String::new());
    }

    let mut grouped: BTreeMap<&str, Vec<&Violation>> = BTreeMap::new();
    for violation in violations {
        grouped.entry(violation.code.as_str()).or_default().push(violation);
    }
    if !grouped.is_empty() {
        lines.push("## Violations".to_string());
        for (code, group) in &grouped {
            lines.push(format!("### {code} ({})", group.len()));
            for violation in group.iter().take(max_examples) {
                lines.push(describe(violation));
            }
            if group.len() > max_examples {
                lines.push(format!("- {} more", group.len() - max_examples));
            }
            lines.push(String::new());
        }
    }

    lines.push("## Next steps".to_string());
    lines.extend(next_steps(metrics, &grouped));
    lines.join("\n")
}

fn push_table<const N: usize>(
    lines: &mut Vec<String>,
    header: [&str; N],
    rows: impl Iterator<Item = [String; N]>,
) {
    lines.push(format!("| {} |", header.join(" | ")));
    lines.push(format!("|{}", " --- |".repeat(N)));
    for row in rows {
        lines.push(format!("| {} |", row.join(" | ")));
    }
    lines.push(String::new());
}

fn describe(violation: &Violation) -> String {
    let mut line = format!("- {}", violation.path);
    if let Some(row) = violation.row_index {
        line.push_str(&format!(" (rowid {row})"));
    }
    line.push_str(": ");
    line.push_str(&violation.message);
    if let Some(example) = &violation.example {
        line.push_str(&format!(" `{example}`"));
    }
    line
}

fn next_steps(metrics: &MetricsReport, grouped: &BTreeMap<&str, Vec<&Violation>>) -> Vec<String> {
    let checks = &metrics.checks;
    let mut steps = Vec::new();
    if checks.lot_numbers.violations > 0 {
        steps.push("- regenerate the store; lot numbers must follow <PREFIX>-<YYYY-MM-DD>.".to_string());
    }
    if checks.foreign_keys.violations > 0 {
        steps.push("- keep foreign keys enabled while writing to the store.".to_string());
    }
    if checks.coverage.violations > 0 {
        steps.push("- check report.json of the run for failed or skipped stages.".to_string());
    }
    if checks.ranges.violations > 0 || checks.chronology.violations > 0 {
        steps.push("- review the value bounds of the stages that produced the rows.".to_string());
    }
    if metrics.fixture_lots > 0 {
        steps.push("- fixture lots were synthesized; run the lot factory for those dates.".to_string());
    }
    if grouped.is_empty() {
        steps.push("- none.".to_string());
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::TableMetrics;

    #[test]
    fn groups_violations_by_code_and_caps_examples() {
        let metrics = MetricsReport {
            lots: 3,
            tables: vec![TableMetrics {
                table: "quality_tests".to_string(),
                rows_found: 14,
                lots_covered: Some(2),
            }],
            ..MetricsReport::default()
        };
        let violations = vec![
            Violation::new("lot_coverage", "quality_tests", "no rows for TAL-2024-01-02"),
            Violation::new("range", "pressing_records.final_ph", "9.5 outside [4, 8]").at_row(3),
            Violation::new("range", "pressing_records.final_ph", "8.4 outside [4, 8]").at_row(4),
        ];

        let report = render_report(&metrics, &violations, 1);
        assert!(report.contains("- result: FAIL"));
        assert!(report.contains("| quality_tests | 14 | 2/3 |"));
        assert!(report.contains("### range (2)"));
        assert!(report.contains("- pressing_records.final_ph (rowid 3): 9.5 outside [4, 8]"));
        assert!(!report.contains("rowid 4"));
        assert!(report.contains("- 1 more"));
        assert!(report.find("### lot_coverage") < report.find("### range"));
    }

    #[test]
    fn clean_store_has_no_violation_section() {
        let report = render_report(&MetricsReport::default(), &[], 5);
        assert!(report.contains("- result: PASS"));
        assert!(!report.contains("## Violations"));
        assert!(report.ends_with("- none."));
    }
}
