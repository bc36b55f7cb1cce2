//! Scenario execution engine.

use tieralloc_core::FitPolicy;

use crate::error::HarnessError;
use crate::scenarios::{self, Scenario, ScenarioResult};

/// Parses a `--fit` selection: `first`, `best` or `both`.
pub fn parse_fit_selection(raw: &str) -> Result<Vec<FitPolicy>, HarnessError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "both" | "all" => Ok(FitPolicy::ALL.to_vec()),
        "first" | "first-fit" | "first_fit" => Ok(vec![FitPolicy::FirstFit]),
        "best" | "best-fit" | "best_fit" => Ok(vec![FitPolicy::BestFit]),
        _ => Err(HarnessError::UnknownFit(raw.to_string())),
    }
}

/// Runs the scenario catalogue under a set of fit policies.
pub struct TestRunner {
    /// Name of the test campaign.
    pub campaign: String,
    /// Fit policies to exercise, in order.
    pub fits: Vec<FitPolicy>,
}

impl TestRunner {
    /// Create a new test runner.
    #[must_use]
    pub fn new(campaign: impl Into<String>, fits: Vec<FitPolicy>) -> Self {
        Self {
            campaign: campaign.into(),
            fits,
        }
    }

    /// Run every scenario under every configured policy.
    ///
    /// Results are grouped by policy, then ordered by scenario id.
    #[must_use]
    pub fn run(&self, scenarios: &[Scenario]) -> Vec<ScenarioResult> {
        self.fits
            .iter()
            .flat_map(|&fit| scenarios.iter().map(move |scenario| scenario.run(fit)))
            .collect()
    }

    /// Run the built-in catalogue.
    #[must_use]
    pub fn run_catalogue(&self) -> Vec<ScenarioResult> {
        self.run(&scenarios::catalogue())
    }
}
