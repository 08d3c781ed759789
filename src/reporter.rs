//! Agent-side status reporter.
//!
//! Periodically reconciles the local node and pushes the result to the
//! collector. Errors are logged and the loop carries on. Every push is
//! bounded by the reporting period, so a silent collector cannot stall the
//! loop.

use crate::config::ServerConfig;
use crate::reconcile::{local_status, StatusError};
use crate::registry::NodeStatusReport;
use crate::runtime::ContainerRuntime;

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Reporter error types.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to build status: {0}")]
    Status(#[from] StatusError),
    #[error("failed to send status: {0}")]
    Network(#[from] reqwest::Error),
    #[error("collector did not answer within {0:?}")]
    Timeout(Duration),
    #[error("collector answered {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Pushes this node's reconciled status to a collector.
pub struct StatusReporter {
    client: reqwest::Client,
    runtime: Arc<dyn ContainerRuntime>,
    url: String,
    node: String,
    period: Duration,
    compose_dir: PathBuf,
    username: String,
    password: String,
}

impl StatusReporter {
    pub fn new(
        collector: &str,
        config: &ServerConfig,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(config.report_period)
            .build()?;

        Ok(Self {
            client,
            runtime,
            url: format!("{}/api/nodes/status/{}", collector, config.node),
            node: config.node.clone(),
            period: config.report_period,
            compose_dir: config.compose_dir.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Build the current report and send it once.
    pub async fn report_once(&self) -> Result<(), ReportError> {
        let services = local_status(self.runtime.as_ref(), &self.compose_dir).await?;
        let report = NodeStatusReport {
            node: self.node.clone(),
            date: Utc::now().timestamp(),
            period: self.period.as_secs(),
            services,
        };

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&report)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Rejected { status, body });
        }

        Ok(())
    }

    fn send_error(&self, e: reqwest::Error) -> ReportError {
        if e.is_timeout() {
            ReportError::Timeout(self.period)
        } else {
            ReportError::Network(e)
        }
    }

    /// Start the reporting loop in the background.
    pub fn start(self) {
        tracing::info!("Reporting status of {} to {} every {:?}", self.node, self.url, self.period);

        tokio::spawn(async move {
            loop {
                if let Err(e) = self.report_once().await {
                    tracing::error!("Reporter: {}", e);
                }
                tokio::time::sleep(self.period).await;
            }
        });
    }
}
