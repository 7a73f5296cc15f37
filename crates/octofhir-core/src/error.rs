use thiserror::Error;

/// Core error types shared by the package import crates
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Unsupported resource type: {0}")]
    UnsupportedResourceType(String),

    #[error("Invalid canonical identifier: {0}")]
    InvalidCanonical(String),
}

impl CoreError {
    /// Create a new UnsupportedResourceType error
    pub fn unsupported_resource_type(resource_type: impl Into<String>) -> Self {
        Self::UnsupportedResourceType(resource_type.into())
    }

    /// Create a new InvalidCanonical error
    pub fn invalid_canonical(message: impl Into<String>) -> Self {
        Self::InvalidCanonical(message.into())
    }
}
