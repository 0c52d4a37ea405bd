//! Where raw model data comes from.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use stepchain_config::ModelsConfig;
use url::Url;

use crate::model::{ModelError, ModelKind};

/// Model fetch future type alias.
pub type ModelFut<'a> = Pin<Box<dyn Future<Output = Result<Value, ModelError>> + Send + 'a>>;

/// Fetches the raw JSON for a model kind.
pub trait ModelSource: Send + Sync {
    fn fetch(&self, kind: ModelKind) -> ModelFut<'_>;
}

/// Fetches models from the pool server's JSON API.
#[derive(Debug, Clone)]
pub struct HttpModelSource {
    client: reqwest::Client,
    base: Url,
    models: ModelsConfig,
}

impl HttpModelSource {
    pub fn new(base: Url, models: ModelsConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            models,
        })
    }

    fn path(&self, kind: ModelKind) -> &str {
        match kind {
            ModelKind::Devices => &self.models.devices_path,
            ModelKind::PxeConfigs => &self.models.pxe_configs_path,
        }
    }

    /// Absolute endpoint for `kind`.
    pub fn endpoint(&self, kind: ModelKind) -> Result<Url, ModelError> {
        self.base
            .join(self.path(kind))
            .map_err(|e| ModelError::Transport {
                reason: e.to_string(),
            })
    }
}

impl ModelSource for HttpModelSource {
    fn fetch(&self, kind: ModelKind) -> ModelFut<'_> {
        Box::pin(async move {
            let url = self.endpoint(kind)?;
            tracing::debug!(model = %kind, url = %url, "Fetching model");

            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| ModelError::Transport {
                    reason: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(ModelError::Status {
                    status: status.as_u16(),
                    reason: status.canonical_reason(),
                });
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| ModelError::Shape {
                    kind,
                    reason: e.to_string(),
                })
        })
    }
}
