//! Allocator configuration.
//!
//! The fit policy and lifecycle logging are fixed for the lifetime of an
//! allocator instance. The process-wide instance exported by `tieralloc-abi`
//! resolves them from the environment when it is first constructed:
//! - `TIERALLOC_FIT`: `first` (default) or `best`. Unknown values fall back
//!   to first-fit.
//! - `TIERALLOC_LOG`: `1`, `true`, `on` or `yes` enables lifecycle records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Environment variable selecting the fit policy.
pub const FIT_ENV_VAR: &str = "TIERALLOC_FIT";
/// Environment variable enabling lifecycle records.
pub const LOG_ENV_VAR: &str = "TIERALLOC_LOG";

/// Region search policy used by an allocator instance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitPolicy {
    /// Earliest free region (in block creation / address order) that fits.
    #[default]
    FirstFit,
    /// Free region with the least slack across the whole tier.
    BestFit,
}

impl FitPolicy {
    /// Both policies, first-fit first.
    pub const ALL: [Self; 2] = [Self::FirstFit, Self::BestFit];

    /// Parse from string (case-insensitive). Unknown values map to first-fit.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "best" | "best-fit" | "best_fit" | "bestfit" | "bf" => Self::BestFit,
            _ => Self::FirstFit,
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstFit => "first-fit",
            Self::BestFit => "best-fit",
        }
    }
}

impl fmt::Display for FitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construction-time settings for a [`TieredAllocator`](crate::TieredAllocator).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Region search policy.
    pub fit: FitPolicy,
    /// Whether lifecycle records are kept.
    pub lifecycle_log: bool,
}

impl AllocatorConfig {
    /// Config with the given policy and logging off.
    #[must_use]
    pub const fn new(fit: FitPolicy) -> Self {
        Self {
            fit,
            lifecycle_log: false,
        }
    }

    /// Returns a copy with lifecycle logging switched on or off.
    #[must_use]
    pub const fn with_lifecycle_log(mut self, enabled: bool) -> Self {
        self.lifecycle_log = enabled;
        self
    }

    /// Reads [`FIT_ENV_VAR`] and [`LOG_ENV_VAR`] from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the config through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let fit = lookup(FIT_ENV_VAR)
            .map(|raw| FitPolicy::from_str_loose(&raw))
            .unwrap_or_default();
        let lifecycle_log = lookup(LOG_ENV_VAR).is_some_and(|raw| parse_flag(&raw));
        Self { fit, lifecycle_log }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}
