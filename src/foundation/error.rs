/// Convenience result type used across vedit.
pub type VeditResult<T> = Result<T, VeditError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum VeditError {
    /// A source could not be read or reported no usable streams.
    #[error("probe error: {0}")]
    Probe(String),

    /// The region tree is structurally invalid (cycles, inverted ranges, negative durations).
    #[error("composition error: {0}")]
    Composition(String),

    /// The persistent fingerprint cache is corrupt or unwritable.
    #[error("cache error: {0}")]
    Cache(String),

    /// The media backend failed to transcode or compose.
    #[error("render error: {0}")]
    Render(String),

    /// Invalid user-provided construction values.
    #[error("validation error: {0}")]
    Validation(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VeditError {
    /// Build a [`VeditError::Probe`] value.
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Build a [`VeditError::Composition`] value.
    pub fn composition(msg: impl Into<String>) -> Self {
        Self::Composition(msg.into())
    }

    /// Build a [`VeditError::Cache`] value.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Build a [`VeditError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build a [`VeditError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`VeditError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
