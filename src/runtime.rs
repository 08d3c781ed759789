//! Container runtime access.
//!
//! The rest of the crate only sees the [`ContainerRuntime`] trait; the Docker
//! binding is built once at startup and shared behind an `Arc`.

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::Docker;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Runtime error types.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("failed to connect to container runtime: {0}")]
    Connect(String),
    #[error("failed to list containers: {0}")]
    List(String),
}

/// A container as observed from the runtime, running or stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub image: String,
    pub names: Vec<String>,
    /// Human readable status, e.g. "Up 3 days" or "Exited (0) 2 hours ago"
    pub status: String,
}

impl Container {
    /// Display name: the first runtime name without any `/`.
    pub fn name(&self) -> String {
        self.names
            .first()
            .map(|n| n.replace('/', ""))
            .unwrap_or_default()
    }
}

/// Source of live container state.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List every container known to the runtime, including stopped ones.
    async fn list_containers(&self) -> Result<Vec<Container>, RuntimeError>;
}

/// Docker engine binding over its unix socket.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Build a client for the daemon listening on `socket`.
    ///
    /// No connection is made until the first request.
    pub fn connect(socket: &str) -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_socket(socket, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<Container>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::List(e.to_string()))?;

        Ok(summaries
            .into_iter()
            .map(|c| Container {
                image: c.image.unwrap_or_default(),
                names: c.names.unwrap_or_default(),
                status: c.status.unwrap_or_default(),
            })
            .collect())
    }
}

/// Fixed container list, for tests.
#[cfg(test)]
pub struct StaticRuntime(pub Vec<Container>);

#[cfg(test)]
#[async_trait]
impl ContainerRuntime for StaticRuntime {
    async fn list_containers(&self) -> Result<Vec<Container>, RuntimeError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name_strips_slashes() {
        let c = Container {
            image: "nginx".to_string(),
            names: vec!["/myapp_web_1".to_string(), "/other".to_string()],
            status: "Up 3 days".to_string(),
        };
        assert_eq!(c.name(), "myapp_web_1");
    }

    #[test]
    fn test_container_without_names() {
        let c = Container {
            image: "nginx".to_string(),
            names: vec![],
            status: "Created".to_string(),
        };
        assert_eq!(c.name(), "");
    }
}
