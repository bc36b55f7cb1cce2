//! Report generation for scenario results.

use serde::Serialize;
use tieralloc_core::FitPolicy;

use crate::scenarios::ScenarioResult;

/// Pass/fail totals over a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl ReportSummary {
    #[must_use]
    pub fn from_results(results: &[ScenarioResult]) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
        }
    }
}

/// A scenario report for one harness run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Report title.
    pub title: String,
    /// Fit policies exercised.
    pub fits: Vec<FitPolicy>,
    /// Timestamp (UTC).
    pub timestamp: String,
    pub summary: ReportSummary,
    pub results: Vec<ScenarioResult>,
}

impl ScenarioReport {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        fits: Vec<FitPolicy>,
        timestamp: impl Into<String>,
        results: Vec<ScenarioResult>,
    ) -> Self {
        Self {
            title: title.into(),
            fits,
            timestamp: timestamp.into(),
            summary: ReportSummary::from_results(&results),
            results,
        }
    }

    /// Render the report as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let fits: Vec<&str> = self.fits.iter().map(|fit| fit.as_str()).collect();
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!("- Fit: {}\n", fits.join(", ")));
        out.push_str(&format!("- Timestamp: {}\n", self.timestamp));
        out.push_str(&format!("- Total: {}\n", self.summary.total));
        out.push_str(&format!("- Passed: {}\n", self.summary.passed));
        out.push_str(&format!("- Failed: {}\n\n", self.summary.failed));

        out.push_str("| # | Scenario | Fit | Status |\n");
        out.push_str("|---|----------|-----|--------|\n");
        for r in &self.results {
            let status = if r.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!(
                "| {:02} | {} | {} | {} |\n",
                r.id, r.name, r.fit, status
            ));
        }

        let failures: Vec<_> = self.results.iter().filter(|r| !r.passed).collect();
        if !failures.is_empty() {
            out.push_str("\n## Failures\n\n");
            for r in failures {
                out.push_str(&format!("### {:02} {} ({})\n\n", r.id, r.name, r.fit));
                for check in r.checks.iter().filter(|check| !check.passed) {
                    match &check.detail {
                        Some(detail) => out.push_str(&format!("- {}: {detail}\n", check.label)),
                        None => out.push_str(&format!("- {}\n", check.label)),
                    }
                }
                out.push('\n');
            }
        }
        out
    }

    /// Render the report as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}
