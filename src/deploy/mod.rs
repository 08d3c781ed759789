//! Parallel deployment of compose bundles.
//!
//! Every bundle of a batch is brought up by its own task. The whole batch,
//! fan-in and history update included, runs in a detached task that the
//! caller awaits: a caller that goes away does not cut a batch in half, and
//! a batch that completes is recorded even if nobody reads its result. When
//! any unit fails, the batch fails as a whole with every unit error attached
//! and nothing is recorded in the history.

mod command;
mod history;

pub use command::*;
pub use history::*;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Deployment error types for a single bundle.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("{0}")]
    Spawn(String),
    #[error("deployment tool exited with {status}: {output}")]
    Exit { status: String, output: String },
    #[error("invalid deployment tool output: {0}")]
    Output(String),
    #[error("deployment task aborted: {0}")]
    Join(String),
}

/// A bundle that failed to deploy.
#[derive(Debug)]
pub struct UnitFailure {
    pub bundle: PathBuf,
    pub error: DeployError,
}

/// Failure of a deployment batch.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("{} of {total} bundle(s) failed to deploy: {}", .failures.len(), summarize(.failures))]
    Units {
        total: usize,
        failures: Vec<UnitFailure>,
    },
    #[error("deployment batch aborted: {0}")]
    Aborted(String),
}

fn summarize(failures: &[UnitFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.bundle.display(), f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of bringing up one bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentUnitResult {
    /// Batch start, nanoseconds since epoch, shared by the whole batch
    pub date: i64,
    pub bundle: PathBuf,
    /// Metadata object printed by the deployment tool
    pub meta: serde_json::Map<String, serde_json::Value>,
    /// Progress lines printed before the metadata
    pub output: Vec<String>,
}

/// Brings a bundle up and returns the tool's combined output.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn up(&self, bundle: &Path) -> Result<String, DeployError>;
}

/// Split tool output into progress lines and the metadata object.
///
/// The output must end with a JSON object line followed by a blank line.
pub fn parse_tool_output(
    output: &str,
) -> Result<(serde_json::Map<String, serde_json::Value>, Vec<String>), DeployError> {
    let lines: Vec<&str> = output.split('\n').collect();
    if lines.len() < 2 {
        return Err(DeployError::Output("missing metadata line".to_string()));
    }

    let last = lines.len() - 1;
    if !lines[last].is_empty() {
        return Err(DeployError::Output("missing trailing blank line".to_string()));
    }

    let meta = match serde_json::from_str::<serde_json::Value>(lines[last - 1]) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => return Err(DeployError::Output("metadata is not a JSON object".to_string())),
        Err(e) => return Err(DeployError::Output(format!("undecodable metadata: {}", e))),
    };

    let progress = lines[..last - 1].iter().map(|l| l.to_string()).collect();
    Ok((meta, progress))
}

/// Fans deployments out over bundles and keeps their history.
pub struct DeploymentExecutor {
    deployer: Arc<dyn Deployer>,
    history: Arc<ExecutionHistory>,
}

impl DeploymentExecutor {
    pub fn new(deployer: Arc<dyn Deployer>) -> Self {
        Self {
            deployer,
            history: Arc::new(ExecutionHistory::default()),
        }
    }

    /// Bring every bundle up in parallel.
    ///
    /// Results follow the order of `bundles`, whatever the completion order.
    /// Dropping the returned future leaves the batch running to completion.
    pub async fn compose_up(
        &self,
        bundles: Vec<PathBuf>,
    ) -> Result<Vec<DeploymentUnitResult>, BatchError> {
        let deployer = self.deployer.clone();
        let history = self.history.clone();

        tokio::spawn(run_batch(deployer, history, bundles))
            .await
            .unwrap_or_else(|e| Err(BatchError::Aborted(e.to_string())))
    }

    /// Most recent deployment units, oldest first.
    pub async fn history(&self) -> Vec<DeploymentUnitResult> {
        self.history.snapshot().await
    }
}

async fn run_batch(
    deployer: Arc<dyn Deployer>,
    history: Arc<ExecutionHistory>,
    bundles: Vec<PathBuf>,
) -> Result<Vec<DeploymentUnitResult>, BatchError> {
    let date = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let total = bundles.len();

    tracing::info!("Deploying {} bundle(s)", total);

    let handles: Vec<_> = bundles
        .iter()
        .map(|bundle| {
            let deployer = deployer.clone();
            let bundle = bundle.clone();
            tokio::spawn(async move {
                let output = deployer.up(&bundle).await?;
                parse_tool_output(&output)
            })
        })
        .collect();

    let mut batch = Vec::with_capacity(total);
    let mut failures = Vec::new();

    for (bundle, handle) in bundles.into_iter().zip(handles) {
        let result = handle
            .await
            .unwrap_or_else(|e| Err(DeployError::Join(e.to_string())));

        match result {
            Ok((meta, output)) => batch.push(DeploymentUnitResult {
                date,
                bundle,
                meta,
                output,
            }),
            Err(error) => {
                tracing::error!("Failed to deploy {}: {}", bundle.display(), error);
                failures.push(UnitFailure { bundle, error });
            }
        }
    }

    if !failures.is_empty() {
        return Err(BatchError::Units { total, failures });
    }

    history.append(&batch).await;
    tracing::info!("Deployed {} bundle(s)", total);
    Ok(batch)
}
