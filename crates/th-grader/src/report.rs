//! Markdown rendering of grading results for issue comments.

use th_core::types::TaskKey;

use crate::GradeReport;

/// Render a grading run as the markdown comment posted back to the
/// triggering issue.
pub fn format_report(key: &TaskKey, report: &GradeReport) -> String {
    let mut out = format!("## 🧪 Test Results for {} {}\n\n", key.quest, key.task);

    if report.passed {
        out.push_str("✅ **Test Passed**\n\n");
    } else {
        out.push_str("❌ **Test Failed**\n\n");
    }

    if !report.stdout.trim().is_empty() {
        out.push_str("### Output:\n```\n");
        out.push_str(report.stdout.trim());
        out.push_str("\n```\n\n");
    }

    if !report.stderr.trim().is_empty() {
        out.push_str("### Error:\n```\n");
        out.push_str(report.stderr.trim());
        out.push_str("\n```\n\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passing_report_has_headline_and_output() {
        let report = GradeReport {
            passed: true,
            stdout: "3 tests ok\n".into(),
            stderr: String::new(),
            exit_code: Some(0),
        };
        let text = format_report(&TaskKey::new("Q3", "T1"), &report);
        assert!(text.contains("Test Results for Q3 T1"));
        assert!(text.contains("✅ **Test Passed**"));
        assert!(text.contains("3 tests ok"));
        assert!(!text.contains("### Error:"));
    }

    #[test]
    fn failing_report_embeds_both_streams() {
        let report = GradeReport {
            passed: false,
            stdout: "ran 2 of 3\n".into(),
            stderr: "AssertionError\n".into(),
            exit_code: Some(1),
        };
        let text = format_report(&TaskKey::new("Q3", "T1"), &report);
        assert!(text.contains("❌ **Test Failed**"));
        assert!(text.contains("ran 2 of 3"));
        assert!(text.contains("AssertionError"));
    }
}
