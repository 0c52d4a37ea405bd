//! Domain models fetched during bootstrap, and the registry that builds them.
//!
//! Each model is selected by a [`ModelKind`] discriminant and constructed by
//! the factory registered for it. Only the envelope key of each API response
//! is interpreted; per-item fields are kept as loose JSON.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelKind {
    Devices,
    PxeConfigs,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Devices, ModelKind::PxeConfigs];

    /// Context key and response envelope key.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Devices => "devices",
            Self::PxeConfigs => "pxe_configs",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("HTTP {status}")]
    Status {
        status: u16,
        reason: Option<&'static str>,
    },

    #[error("{reason}")]
    Transport { reason: String },

    #[error("unexpected {kind} payload: {reason}")]
    Shape { kind: ModelKind, reason: String },

    #[error("a factory for {kind} is already registered")]
    Duplicate { kind: ModelKind },

    #[error("no factory registered for {kind}")]
    Unregistered { kind: ModelKind },
}

impl ModelError {
    /// Short operator-facing status, e.g. "Not Found".
    #[must_use]
    pub fn status_text(&self) -> String {
        match self {
            Self::Status {
                reason: Some(reason),
                ..
            } => (*reason).to_string(),
            other => other.to_string(),
        }
    }
}

/// One device entry. The list endpoint returns bare names or detail objects.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "DeviceEntry")]
pub struct Device {
    pub name: String,
    pub state: Option<String>,
    /// Remaining detail fields, uninterpreted.
    pub details: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DeviceEntry {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        state: Option<String>,
        #[serde(flatten)]
        details: Map<String, Value>,
    },
}

impl From<DeviceEntry> for Device {
    fn from(entry: DeviceEntry) -> Self {
        match entry {
            DeviceEntry::Name(name) => Self {
                name,
                state: None,
                details: Map::new(),
            },
            DeviceEntry::Detailed {
                name,
                state,
                details,
            } => Self {
                name,
                state,
                details,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceList {
    pub devices: Vec<Device>,
}

impl DeviceList {
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.devices.iter().map(|d| d.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PxeConfigList {
    pub names: Vec<String>,
}

/// A constructed model, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Model {
    Devices(DeviceList),
    PxeConfigs(PxeConfigList),
}

impl Model {
    #[must_use]
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Devices(_) => ModelKind::Devices,
            Self::PxeConfigs(_) => ModelKind::PxeConfigs,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Devices(list) => list.devices.len(),
            Self::PxeConfigs(list) => list.names.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds a model from a raw API response.
pub type ModelFactory = fn(Value) -> Result<Model, ModelError>;

/// Maps each [`ModelKind`] to its factory.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    factories: HashMap<ModelKind, ModelFactory>,
}

impl ModelRegistry {
    /// Registry with the factories for every built-in kind.
    #[must_use]
    pub fn standard() -> Self {
        let mut factories: HashMap<ModelKind, ModelFactory> = HashMap::new();
        factories.insert(ModelKind::Devices, build_devices);
        factories.insert(ModelKind::PxeConfigs, build_pxe_configs);
        Self { factories }
    }

    pub fn register(&mut self, kind: ModelKind, factory: ModelFactory) -> Result<(), ModelError> {
        if self.factories.contains_key(&kind) {
            return Err(ModelError::Duplicate { kind });
        }
        self.factories.insert(kind, factory);
        Ok(())
    }

    pub fn construct(&self, kind: ModelKind, raw: Value) -> Result<Model, ModelError> {
        let factory = self
            .factories
            .get(&kind)
            .ok_or(ModelError::Unregistered { kind })?;
        factory(raw)
    }
}

fn envelope(kind: ModelKind, mut raw: Value) -> Result<Value, ModelError> {
    raw.get_mut(kind.key())
        .map(Value::take)
        .ok_or_else(|| ModelError::Shape {
            kind,
            reason: format!("missing '{}' key", kind.key()),
        })
}

fn build_devices(raw: Value) -> Result<Model, ModelError> {
    let kind = ModelKind::Devices;
    let devices: Vec<Device> =
        serde_json::from_value(envelope(kind, raw)?).map_err(|e| ModelError::Shape {
            kind,
            reason: e.to_string(),
        })?;
    Ok(Model::Devices(DeviceList { devices }))
}

fn build_pxe_configs(raw: Value) -> Result<Model, ModelError> {
    let kind = ModelKind::PxeConfigs;
    let names: Vec<String> =
        serde_json::from_value(envelope(kind, raw)?).map_err(|e| ModelError::Shape {
            kind,
            reason: e.to_string(),
        })?;
    Ok(Model::PxeConfigs(PxeConfigList { names }))
}
