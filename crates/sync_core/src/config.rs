use serde::{Deserialize, Serialize};
use shared::domain::{ActorId, CollectionPath};
use tracing::warn;

use crate::{error::EngineError, lifecycle::LifecycleConfig};

pub const DEFAULT_DEPLOYMENT_ID: &str = "default-deployment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Shared by every actor of the deployment.
    #[default]
    Public,
    /// Scoped to the signed-in actor; skipped while no actor is known.
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    #[serde(default)]
    pub visibility: Visibility,
}

impl CollectionConfig {
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
        }
    }

    pub fn private(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Private,
        }
    }

    /// `deployments/{deployment}/public/{name}` or `deployments/{deployment}/actors/{actor}/{name}`.
    pub fn resolve_path(
        &self,
        deployment_id: &str,
        actor_id: Option<&ActorId>,
    ) -> Option<CollectionPath> {
        match self.visibility {
            Visibility::Public => CollectionPath::from_segments([
                "deployments",
                deployment_id,
                "public",
                self.name.as_str(),
            ]),
            Visibility::Private => {
                let actor_id = actor_id?;
                CollectionPath::from_segments([
                    "deployments",
                    deployment_id,
                    "actors",
                    actor_id.as_str(),
                    self.name.as_str(),
                ])
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    /// Upper bound on opening a subscription; the adapter default applies when unset.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
}

/// Everything the engine needs, passed in explicitly at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub deployment_id: Option<String>,
    pub initial_session_token: Option<String>,
    pub fail_on_missing_config: bool,
    pub orders: CollectionConfig,
    pub integrations: CollectionConfig,
    pub lifecycle: LifecycleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            deployment_id: None,
            initial_session_token: None,
            fail_on_missing_config: false,
            orders: CollectionConfig::public("orders"),
            integrations: CollectionConfig::public("integrations"),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_deployment(deployment_id: impl Into<String>) -> Self {
        Self {
            deployment_id: Some(deployment_id.into()),
            ..Self::default()
        }
    }

    pub fn resolve_deployment_id(&self) -> Result<String, EngineError> {
        let configured = self
            .deployment_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        match configured {
            Some(value) => Ok(value.to_string()),
            None if self.fail_on_missing_config => Err(EngineError::unavailable(
                "deployment id is not configured",
            )),
            None => {
                warn!(
                    fallback = DEFAULT_DEPLOYMENT_ID,
                    "config: deployment id missing; using fallback"
                );
                Ok(DEFAULT_DEPLOYMENT_ID.to_string())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
