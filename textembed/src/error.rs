//! Error types for textembed.

use thiserror::Error;

/// Result type alias for textembed operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur while loading or running the embedding pipeline.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// `embed` was called on an engine without a loaded session.
    #[error("Session is not loaded, call load() first")]
    UninitializedSession,

    /// `embed` was called on a pipeline without a tokenizer.
    #[error("Tokenizer is not loaded, call init() first")]
    UninitializedTokenizer,

    /// Empty token sequence handed to the engine.
    #[error("Empty input: token sequence cannot be empty")]
    EmptyInput,

    /// The tokenizer produced no token ids for the given text.
    #[error("Tokenization produced no input ids")]
    EmptyTokenization,

    /// The inference session could not be created.
    #[error("Failed to load session: {message}")]
    SessionLoad {
        /// Description of the load failure.
        message: String,
    },

    /// The backend failed while running the forward pass.
    #[error("Inference error: {message}")]
    InferenceRuntime {
        /// Description of the runtime failure.
        message: String,
    },

    /// None of the known hidden-state outputs were produced.
    #[error("No embedding output found, expected one of: {}", candidates.join(", "))]
    MissingOutput {
        /// Output names that were looked up, in priority order.
        candidates: Vec<String>,
    },

    /// Hidden-state tensor has undefined or inconsistent dimensions.
    #[error("Invalid embedding dimensions: [{dims}]")]
    InvalidDimensions {
        /// Literal dimension list, undefined entries rendered empty.
        dims: String,
    },

    /// Tokenizer file not found, not parseable, or encoding failed.
    #[error("Tokenizer error: {message}")]
    Tokenizer {
        /// Description of the tokenizer error.
        message: String,
    },

    /// Invalid model or options configuration.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Candle tensor operation error.
    #[error("Tensor error: {message}")]
    Tensor {
        /// Description of the tensor error.
        message: String,
    },

    /// IO error reading model files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error for config files.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EmbeddingError {
    /// Build an [`EmbeddingError::InvalidDimensions`] from a possibly partial shape.
    pub fn invalid_dimensions(dims: &[Option<usize>]) -> Self {
        let dims = dims
            .iter()
            .map(|d| d.map(|v| v.to_string()).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(", ");
        EmbeddingError::InvalidDimensions { dims }
    }
}

impl From<candle_core::Error> for EmbeddingError {
    fn from(err: candle_core::Error) -> Self {
        EmbeddingError::Tensor {
            message: err.to_string(),
        }
    }
}

impl From<tokenizers::Error> for EmbeddingError {
    fn from(err: tokenizers::Error) -> Self {
        EmbeddingError::Tokenizer {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EmbeddingError::SessionLoad {
            message: "/path/to/model missing".to_string(),
        };
        assert!(err.to_string().contains("/path/to/model"));

        let err = EmbeddingError::MissingOutput {
            candidates: vec!["last_hidden_state".into(), "embeddings".into()],
        };
        assert!(err.to_string().contains("last_hidden_state, embeddings"));
    }

    #[test]
    fn test_invalid_dimensions_renders_undefined_as_empty() {
        let err = EmbeddingError::invalid_dimensions(&[Some(1), None, Some(4)]);
        assert_eq!(err.to_string(), "Invalid embedding dimensions: [1, , 4]");

        let err = EmbeddingError::invalid_dimensions(&[]);
        assert_eq!(err.to_string(), "Invalid embedding dimensions: []");
    }
}
