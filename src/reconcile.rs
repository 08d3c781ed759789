//! Reconciliation of live containers with declared services.

use crate::compose::{self, Bundle, ComposeError, ServiceDefinition};
use crate::runtime::{Container, ContainerRuntime, RuntimeError};

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Status of a live container that no bundle declares.
pub const NOT_DECLARED: &str = "NotDeclared";
/// Status of a declared service with no live container.
pub const NOT_STARTED: &str = "NotStarted";
/// Status of a service whose node stopped reporting.
pub const EXPIRED: &str = "Expired";

/// One row of the reconciled view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    pub image: String,
    pub name: String,
    pub status: String,
    pub full_status: String,
    #[serde(default, with = "definition")]
    pub definition: Option<ServiceDefinition>,
}

/// Undeclared containers carry an empty `{}` definition on the wire.
mod definition {
    use super::ServiceDefinition;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        def: &Option<ServiceDefinition>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match def {
            Some(def) => def.serialize(serializer),
            None => serde_json::Map::new().serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<ServiceDefinition>, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let empty = match &value {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            _ => false,
        };
        if empty {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

/// Errors raised while building the local view.
#[derive(Error, Debug)]
pub enum StatusError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

/// Merge live containers with declared services.
///
/// Every container yields one view and every unmatched declaration yields a
/// synthetic `NotStarted` view. The result is stably sorted by status.
pub fn reconcile(containers: &[Container], bundles: &[Bundle]) -> Vec<ServiceView> {
    let mut services: Vec<ServiceView> = containers
        .iter()
        .map(|c| ServiceView {
            image: c.image.clone(),
            name: c.name(),
            status: NOT_DECLARED.to_string(),
            full_status: c.status.clone(),
            definition: None,
        })
        .collect();

    let mut missing = Vec::new();

    for bundle in bundles {
        for (key, def) in &bundle.services {
            let name = def.effective_name(key);

            match services.iter_mut().find(|s| matches(s, &def.image, name)) {
                Some(service) => {
                    service.status = first_token(&service.full_status).to_string();
                    service.definition = Some(def.clone());
                }
                None => missing.push(ServiceView {
                    image: def.image.clone(),
                    name: name.to_string(),
                    status: NOT_STARTED.to_string(),
                    full_status: "Not started".to_string(),
                    definition: Some(def.clone()),
                }),
            }
        }
    }

    services.extend(missing);
    services.sort_by(|a, b| a.status.cmp(&b.status));
    services
}

/// Same image, and either the exact name or a project-scoped `_name_` one.
fn matches(service: &ServiceView, image: &str, name: &str) -> bool {
    service.image == image
        && (service.name == name || service.name.contains(&format!("_{}_", name)))
}

fn first_token(status: &str) -> &str {
    status.split_whitespace().next().unwrap_or("")
}

/// Build the reconciled view of this node.
pub async fn local_status(
    runtime: &dyn ContainerRuntime,
    compose_dir: &Path,
) -> Result<Vec<ServiceView>, StatusError> {
    let containers = runtime.list_containers().await?;
    let bundles = compose::scan_bundles(compose_dir).await?;
    Ok(reconcile(&containers, &bundles))
}
