// src/executor/report.rs

//! Run reports

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Final state of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RunStatus {
    /// Steps remain to be applied
    Running,
    /// Every step was applied
    Done,
    /// Execution stopped at `index`
    Failed { index: usize, message: String },
}

/// One applied step
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub action: String,
    /// Step with placeholders substituted
    pub description: String,
    /// Identity active while the step ran
    pub user: String,
    /// Whether the step modified the target
    pub changed: bool,
    pub duration_ms: u64,
}

/// Summary of applying a recipe
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub image: String,
    pub base: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    pub steps: Vec<StepRecord>,
    /// Identity active after the last applied step
    pub final_user: String,
    /// Packages installed by this run
    pub installed: Vec<String>,
}

impl RunReport {
    pub fn new(image: &str, base: &str, target: String, initial_user: &str) -> Self {
        Self {
            image: image.to_string(),
            base: base.to_string(),
            target,
            started_at: Utc::now(),
            status: RunStatus::Running,
            steps: Vec::new(),
            final_user: initial_user.to_string(),
            installed: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Done
    }

    /// Number of steps that modified the target
    pub fn changed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.changed).count()
    }

    /// Index of the failing step, if the run failed
    pub fn failed_at(&self) -> Option<usize> {
        match self.status {
            RunStatus::Failed { index, .. } => Some(index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json() {
        let mut report = RunReport::new("runner-java", "samber/github-actions-runner:latest", "simulated".into(), "runner");
        report.status = RunStatus::Failed {
            index: 2,
            message: "Network error: unreachable".to_string(),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"]["state"], "failed");
        assert_eq!(json["status"]["index"], 2);
        assert_eq!(json["final_user"], "runner");
        assert_eq!(report.failed_at(), Some(2));
        assert!(!report.succeeded());
    }
}
