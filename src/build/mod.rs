//! External build execution: job model and operation polling.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ProvError, Result};

/// Runs build jobs out of process and reports on them as long-running
/// operations.
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    /// Submit a job; returns the operation name to poll.
    async fn submit(&self, request: BuildRequest) -> Result<String>;

    async fn operation(&self, name: &str) -> Result<OperationStatus>;
}

/// A build job: ordered named steps plus `${_NAME}` substitutions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub substitutions: BTreeMap<String, String>,
    pub steps: Vec<BuildStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStep {
    pub id: String,
    /// Container image reference.
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    pub args: Vec<String>,
}

impl BuildStep {
    pub fn new(id: &str, image: impl Into<String>, args: &[&str]) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
            entrypoint: None,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Run `script` with `/bin/sh -c`.
    pub fn shell(id: &str, image: impl Into<String>, script: &str) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
            entrypoint: Some("/bin/sh".into()),
            args: vec!["-c".into(), script.into()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStatus {
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    /// Id of the step that failed, when the executor knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub message: String,
}

/// Poll `name` every `interval` until it is done.
///
/// Returns `Cancelled` as soon as `cancel` fires and `TimedOut` once
/// `timeout` (if any) elapses.
pub async fn wait_for_operation(
    executor: &dyn BuildExecutor,
    name: &str,
    interval: Duration,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<OperationStatus> {
    let poll = poll_until_done(executor, name, interval);
    let bounded = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, poll).await {
                Ok(result) => result,
                Err(_) => Err(ProvError::TimedOut(limit)),
            },
            None => poll.await,
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(ProvError::Cancelled),
        result = bounded => result,
    }
}

async fn poll_until_done(
    executor: &dyn BuildExecutor,
    name: &str,
    interval: Duration,
) -> Result<OperationStatus> {
    loop {
        let status = executor.operation(name).await?;
        if status.done {
            return Ok(status);
        }
        tracing::trace!(operation = name, "build still running");
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeExecutor;

    #[tokio::test(start_paused = true)]
    async fn polls_until_done() {
        let executor = FakeExecutor::finishing_after(3, None);
        let cancel = CancellationToken::new();
        let status = wait_for_operation(&executor, "op-1", Duration::from_secs(10), None, &cancel)
            .await
            .unwrap();
        assert!(status.done);
        assert_eq!(executor.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_budget_exhausted() {
        let executor = FakeExecutor::never_finishing();
        let cancel = CancellationToken::new();
        let err = wait_for_operation(
            &executor,
            "op-1",
            Duration::from_secs(10),
            Some(Duration::from_secs(35)),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProvError::TimedOut(d) if d == Duration::from_secs(35)));
        assert_eq!(executor.polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let executor = FakeExecutor::never_finishing();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for_operation(&executor, "op-1", Duration::from_secs(10), None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvError::Cancelled));
    }

    #[test]
    fn shell_step_overrides_entrypoint() {
        let step = BuildStep::shell("build", "alpine", "echo hi");
        assert_eq!(step.entrypoint.as_deref(), Some("/bin/sh"));
        assert_eq!(step.args, vec!["-c", "echo hi"]);
    }
}
