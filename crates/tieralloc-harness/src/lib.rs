//! Scenario and replay harness for the tiered allocator.
//!
//! This crate provides:
//! - A catalogue of reference scenarios run against fresh engines
//! - A runner that executes the catalogue under one or both fit policies
//! - Line-oriented allocation scripts that can be replayed step by step
//! - Report generation: human-readable + machine-readable results

#![forbid(unsafe_code)]

pub mod error;
pub mod report;
pub mod runner;
pub mod scenarios;
pub mod script;

pub use error::HarnessError;
pub use report::ScenarioReport;
pub use runner::TestRunner;
pub use scenarios::{Scenario, ScenarioResult};
pub use script::{ReplayOutcome, Script, ScriptOp};
