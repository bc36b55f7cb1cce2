//! Line-oriented allocation scripts.
//!
//! One operation per line:
//!
//! ```text
//! alloc 1000          // allocate
//! calloc 100 4        // zero_allocate(count, size)
//! realloc #0 2000     // reallocate the handle produced by step #0
//! realloc null 64     // reallocate with no handle
//! free #1
//! stats               // snapshot the counters
//! ```
//!
//! Every `alloc`, `calloc` and `realloc` line produces the next handle slot,
//! numbered from `#0`, whether or not it returned a handle. Sizes may be
//! negative; they wrap to the unsigned value a C caller would pass. Blank
//! lines and lines starting with `//` are skipped, and so is anything after
//! `//` on an operation line.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tieralloc_core::{FitPolicy, Handle, MallocStats, TieredAllocator};

use crate::error::HarnessError;

/// One parsed script operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOp {
    Alloc { size: usize },
    Calloc { count: usize, size: usize },
    Realloc { target: Option<usize>, size: usize },
    Free { target: usize },
    Stats,
}

impl fmt::Display for ScriptOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alloc { size } => write!(f, "alloc {size}"),
            Self::Calloc { count, size } => write!(f, "calloc {count} {size}"),
            Self::Realloc {
                target: Some(target),
                size,
            } => write!(f, "realloc #{target} {size}"),
            Self::Realloc { target: None, size } => write!(f, "realloc null {size}"),
            Self::Free { target } => write!(f, "free #{target}"),
            Self::Stats => f.write_str("stats"),
        }
    }
}

/// An operation and the 1-based source line it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLine {
    pub line: usize,
    pub op: ScriptOp,
}

/// A parsed script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub lines: Vec<ScriptLine>,
}

fn parse_error(line: usize, message: impl Into<String>) -> HarnessError {
    HarnessError::Parse {
        line,
        message: message.into(),
    }
}

fn parse_size(line: usize, token: &str) -> Result<usize, HarnessError> {
    let parsed = if token.starts_with('-') {
        token.parse::<isize>().map(|n| n as usize)
    } else {
        token.parse::<usize>()
    };
    parsed.map_err(|e| parse_error(line, format!("bad size `{token}`: {e}")))
}

fn parse_handle(line: usize, token: &str) -> Result<usize, HarnessError> {
    token
        .strip_prefix('#')
        .and_then(|index| index.parse::<usize>().ok())
        .ok_or_else(|| parse_error(line, format!("expected a handle like `#0`, got `{token}`")))
}

fn parse_op(line: usize, text: &str) -> Result<ScriptOp, HarnessError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let op = match tokens.as_slice() {
        ["alloc", size] => ScriptOp::Alloc {
            size: parse_size(line, size)?,
        },
        ["calloc", count, size] => ScriptOp::Calloc {
            count: parse_size(line, count)?,
            size: parse_size(line, size)?,
        },
        ["realloc", target, size] => ScriptOp::Realloc {
            target: if target.eq_ignore_ascii_case("null") {
                None
            } else {
                Some(parse_handle(line, target)?)
            },
            size: parse_size(line, size)?,
        },
        ["free", target] => ScriptOp::Free {
            target: parse_handle(line, target)?,
        },
        ["stats"] => ScriptOp::Stats,
        [verb, ..] => {
            return Err(parse_error(
                line,
                format!("unknown or malformed operation `{verb}`"),
            ));
        }
        [] => return Err(parse_error(line, "empty operation")),
    };
    Ok(op)
}

impl Script {
    /// Parses script text.
    pub fn parse(text: &str) -> Result<Self, HarnessError> {
        let mut lines = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let body = raw.split("//").next().unwrap_or_default().trim();
            if body.is_empty() {
                continue;
            }
            lines.push(ScriptLine {
                line,
                op: parse_op(line, body)?,
            });
        }
        Ok(Self { lines })
    }

    /// Reads and parses a script file.
    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let text = std::fs::read_to_string(path).map_err(|source| HarnessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Replays the script on a fresh allocator using `fit`.
    ///
    /// Allocator failures are recorded as step outcomes; only a reference to
    /// a handle slot that does not exist yet aborts the replay.
    pub fn replay(&self, fit: FitPolicy) -> Result<ReplayOutcome, HarnessError> {
        let mut replayer = Replayer {
            alloc: TieredAllocator::with_fit(fit),
            handles: Vec::new(),
        };
        let mut steps = Vec::with_capacity(self.lines.len());
        let mut snapshots = Vec::new();
        for &ScriptLine { line, op } in &self.lines {
            let outcome = replayer.step(line, op)?;
            if op == ScriptOp::Stats {
                snapshots.push(StatsSnapshot {
                    line,
                    stats: replayer.alloc.stats(),
                });
            }
            steps.push(StepRecord {
                line,
                op: op.to_string(),
                outcome,
            });
        }
        let integrity = replayer
            .alloc
            .verify_integrity()
            .err()
            .map(|err| err.to_string());
        Ok(ReplayOutcome {
            fit,
            steps,
            snapshots,
            integrity,
            stats: replayer.alloc.stats(),
        })
    }
}

struct Replayer {
    alloc: TieredAllocator,
    handles: Vec<Option<Handle>>,
}

impl Replayer {
    fn handle(&self, line: usize, index: usize) -> Result<Option<Handle>, HarnessError> {
        self.handles
            .get(index)
            .copied()
            .ok_or(HarnessError::UnknownHandle { line, index })
    }

    fn produce(&mut self, handle: Option<Handle>) -> String {
        let slot = self.handles.len();
        self.handles.push(handle);
        match handle {
            Some(handle) => format!("#{slot} = {:#x}", handle.addr()),
            None => format!("#{slot} = null"),
        }
    }

    fn step(&mut self, line: usize, op: ScriptOp) -> Result<String, HarnessError> {
        let outcome = match op {
            ScriptOp::Alloc { size } => match self.alloc.allocate(size) {
                Ok(handle) => self.produce(Some(handle)),
                Err(err) => format!("{} ({err})", self.produce(None)),
            },
            ScriptOp::Calloc { count, size } => match self.alloc.zero_allocate(count, size) {
                Ok(handle) => self.produce(Some(handle)),
                Err(err) => format!("{} ({err})", self.produce(None)),
            },
            ScriptOp::Realloc { target, size } => {
                let handle = match target {
                    Some(index) => self.handle(line, index)?,
                    None => None,
                };
                match self.alloc.reallocate(handle, size) {
                    Ok(result) => self.produce(result),
                    Err(err) => format!("{} ({err})", self.produce(None)),
                }
            }
            ScriptOp::Free { target } => match self.handle(line, target)? {
                Some(handle) => {
                    self.alloc.release(handle);
                    "released".to_string()
                }
                None => "null, ignored".to_string(),
            },
            ScriptOp::Stats => "snapshot".to_string(),
        };
        Ok(outcome)
    }
}

/// Result of one replayed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub line: usize,
    pub op: String,
    pub outcome: String,
}

/// Counters captured by a `stats` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub line: usize,
    pub stats: MallocStats,
}

/// Everything a replay produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutcome {
    pub fit: FitPolicy,
    pub steps: Vec<StepRecord>,
    pub snapshots: Vec<StatsSnapshot>,
    /// Structural problem found after the last step, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    /// Final counters.
    pub stats: MallocStats,
}

impl ReplayOutcome {
    /// Render the outcome as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}
