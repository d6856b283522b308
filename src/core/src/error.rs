use thiserror::Error;

/// A3S Watch error types
#[derive(Error, Debug)]
pub enum WatchError {
    /// Provider or watcher configuration rejected at registration
    #[error("Configuration validation failed for {component}: {}", fields.join(", "))]
    ConfigValidation {
        component: String,
        fields: Vec<String>,
    },

    /// Engine connection for a device cannot be established
    #[error("Device unreachable: {device} - {message}")]
    DeviceUnreachable { device: String, message: String },

    /// Registry HTTP or authentication failure
    #[error("Error calling registry {url} with \"{message}\" for image: \"{image}\"")]
    RegistryCall {
        image: String,
        url: String,
        message: String,
    },

    /// No manifest branch matched the registry response
    #[error("Unexpected error; no manifest found for image: \"{image}\"")]
    ManifestNotFound { image: String },

    /// Listing containers, images, networks or volumes failed
    #[error("Engine listing failed: {resource} - {message}")]
    EngineListing { resource: String, message: String },

    /// Any other engine API failure
    #[error("Engine error: {0}")]
    EngineError(String),

    /// Component lookup by id failed
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    /// Entity store failure
    #[error("Store error: {0}")]
    StoreError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl WatchError {
    /// Build a validation error for a single offending field.
    pub fn invalid_field(component: impl Into<String>, field: impl Into<String>) -> Self {
        WatchError::ConfigValidation {
            component: component.into(),
            fields: vec![field.into()],
        }
    }

    /// Errors that are stored on a container's `error` field instead of
    /// aborting a reconciliation cycle.
    pub fn is_registry_failure(&self) -> bool {
        matches!(
            self,
            WatchError::RegistryCall { .. } | WatchError::ManifestNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for WatchError {
    fn from(err: serde_json::Error) -> Self {
        WatchError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for WatchError {
    fn from(err: serde_yaml::Error) -> Self {
        WatchError::SerializationError(err.to_string())
    }
}

/// Result type alias for A3S Watch operations
pub type Result<T> = std::result::Result<T, WatchError>;
