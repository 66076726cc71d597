/// Convenience result type used across join-layers.
pub type GenResult<T> = Result<T, GenError>;

/// Top-level error taxonomy. Every variant is fatal for a generation run.
#[derive(thiserror::Error, Debug)]
pub enum GenError {
    /// Malformed configuration, asset file names, rarity values or base URI.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested collection size cannot be reached without duplicate items.
    #[error("capacity error: {0}")]
    Capacity(String),

    /// Image decode, scale, composite or encode failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// Worker thread or queue failure inside the render pipeline.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GenError {
    /// Build a [`GenError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`GenError::Capacity`] value.
    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::Capacity(msg.into())
    }

    /// Build a [`GenError::Codec`] value.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// Build a [`GenError::Pipeline`] value.
    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
