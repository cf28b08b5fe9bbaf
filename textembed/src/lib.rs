//! textembed - turn text into fixed-size embedding vectors.
//!
//! The crate wraps a pretrained transformer session and its subword tokenizer
//! behind a load / embed / release lifecycle. Hidden states from the encoder
//! are reduced to one vector per text by mean pooling over the sequence axis.
//!
//! # Components
//!
//! - [`EmbeddingEngine`]: owns the inference session, builds the `[1, N]`
//!   input tensors and pools the `[1, N, H]` output.
//! - [`EmbeddingPipeline`]: owns the tokenizer and the options record, and
//!   drives the engine from raw text.
//! - [`BertSessionLoader`] / [`HubTokenizerLoader`]: candle and Hugging Face
//!   backed collaborators used by default.
//!
//! # Usage
//!
//! ```rust,no_run
//! use textembed::{EmbeddingPipeline, OptionsOverride};
//!
//! # async fn run() -> textembed::Result<()> {
//! let mut pipeline = EmbeddingPipeline::default();
//! pipeline
//!     .init(
//!         "sentence-transformers/all-MiniLM-L6-v2",
//!         "models/all-MiniLM-L6-v2",
//!         Some(OptionsOverride::new().with_max_tokens(256)),
//!     )
//!     .await?;
//!
//! let embedding = pipeline.embed("def hello(): pass").await?;
//! assert_eq!(embedding.len(), 384);
//!
//! pipeline.release();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::future::Future;
use std::pin::Pin;

pub mod bert;
pub mod engine;
mod error;
pub mod options;
pub mod pipeline;
pub mod runtime;
pub mod tokenizer;

pub use bert::{BertSession, BertSessionLoader, ModelConfig};
pub use engine::{mean_pool, EmbeddingEngine, EngineState};
pub use error::{EmbeddingError, Result};
pub use options::{
    ArtifactFetcher, EmbeddingOptions, ExecutionProvider, OptionsOverride, PassthroughFetcher,
};
pub use pipeline::{EmbeddingPipeline, PipelineInfo};
pub use runtime::{
    InferenceSession, InputTensor, OutputTensor, SessionLoader, SessionOutputs, TensorBundle,
    HIDDEN_STATE_OUTPUTS,
};
pub use tokenizer::{
    HfTokenizer, HubTokenizerLoader, Padding, TextTokenizer, TokenizeRequest, Tokenized,
    TokenizerLoader,
};

/// Boxed future returned by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Hidden size of the MiniLM-class encoders this crate is usually paired with.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Default tokenizer truncation bound.
pub const DEFAULT_MAX_TOKENS: usize = 512;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_EMBEDDING_DIM, 384);
        assert_eq!(DEFAULT_MAX_TOKENS, 512);
        assert_eq!(HIDDEN_STATE_OUTPUTS, &["last_hidden_state", "embeddings"]);
    }
}
