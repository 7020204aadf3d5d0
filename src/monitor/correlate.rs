use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};

use crate::ci::{succeeded, Job, WorkflowRun};
use crate::error::Result;
use crate::policy::CompletionSpec;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// The interval a run was active for. Both ends are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CorrelationWindow {
    pub fn of(run: &WorkflowRun) -> Self {
        Self {
            start: run.created_at,
            end: run.updated_at,
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start < t && t < self.end
    }

    /// Whether any release file was uploaded while the run was active.
    pub fn is_timely(&self, upload_times: &BTreeMap<String, DateTime<Utc>>) -> bool {
        upload_times.values().any(|t| self.contains(*t))
    }

    /// Whether the release file named exactly `entry` was uploaded while
    /// the run was active.
    pub fn covers_release(
        &self,
        entry: &str,
        upload_times: &BTreeMap<String, DateTime<Utc>>,
    ) -> bool {
        upload_times.get(entry).is_some_and(|t| self.contains(*t))
    }
}

/// Whether `jobs` satisfy the completion gate: at least one target exists
/// and every target concluded successfully.
pub fn gate_passes(jobs: &[Job], gate: &CompletionSpec) -> bool {
    let mut found = false;
    for job in jobs.iter().filter(|j| j.name == gate.job) {
        match &gate.step {
            None => {
                found = true;
                if !succeeded(&job.conclusion) {
                    return false;
                }
            }
            Some(step) => {
                for s in job.steps.iter().filter(|s| &s.name == step) {
                    found = true;
                    if !succeeded(&s.conclusion) {
                        return false;
                    }
                }
            }
        }
    }
    found
}

/// Compiled artifact patterns.
#[derive(Debug, Clone)]
pub struct PatternSet(Vec<Pattern>);

impl PatternSet {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self(compiled))
    }

    pub fn matches(&self, path: &str) -> bool {
        self.0.iter().any(|p| p.matches_with(path, MATCH_OPTIONS))
    }
}
