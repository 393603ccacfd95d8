use std::time::Duration;

use thiserror::Error;

use crate::core::{BootStage, DbError, GatewayError, LoadError, RegistryError};

/// Missing or malformed process configuration. Always raised before any
/// network traffic happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("required setting `{key}` is missing")]
    Missing { key: String },
    #[error("bot token is malformed: {reason}")]
    MalformedToken { reason: &'static str },
    #[error("setting `{key}` has an invalid value `{value}`")]
    InvalidValue { key: String, value: String },
    #[error("could not read `{path}`: {reason}")]
    Unreadable { path: String, reason: String },
}

/// Anything that aborts the startup sequence
#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("could not construct the {service} service: {reason}")]
    Service {
        service: &'static str,
        reason: String,
    },
    #[error("persistence bootstrap failed")]
    Persistence(#[from] DbError),
    #[error("gateway rejected the {stage} stage")]
    Gateway {
        stage: BootStage,
        #[source]
        source: GatewayError,
    },
    #[error("{stage} stage did not finish within {after:?}")]
    Timeout { stage: BootStage, after: Duration },
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("stage {found} cannot follow {current}")]
    OutOfOrder { current: BootStage, found: BootStage },
}

impl BootError {
    /// Stage this failure belongs to, if it came from the gateway
    pub fn stage(&self) -> Option<BootStage> {
        match self {
            BootError::Gateway { stage, .. } | BootError::Timeout { stage, .. } => Some(*stage),
            BootError::Load(_) => Some(BootStage::CommandsLoaded),
            _ => None,
        }
    }
}
