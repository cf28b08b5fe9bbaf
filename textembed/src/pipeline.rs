//! Text-to-vector pipeline: tokenizer + engine + options.

use crate::bert::BertSessionLoader;
use crate::engine::EmbeddingEngine;
use crate::error::{EmbeddingError, Result};
use crate::options::{EmbeddingOptions, OptionsOverride};
use crate::runtime::SessionLoader;
use crate::tokenizer::{
    HubTokenizerLoader, Padding, TextTokenizer, TokenizeRequest, TokenizerLoader,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const SAMPLE_TEXT: &str = "The quick brown fox jumps over the lazy dog.";

/// Diagnostic snapshot returned by [`EmbeddingPipeline::info`].
#[derive(Debug, Clone, Serialize)]
pub struct PipelineInfo {
    /// Model identifier passed to the last successful `init`.
    pub model_id: Option<String>,
    /// Field names present in a sample tokenization, empty without a tokenizer.
    pub tokenizer_fields: Vec<String>,
    /// Whether the engine holds a session.
    pub session_loaded: bool,
    /// Active options record.
    pub options: EmbeddingOptions,
}

/// Owns a tokenizer, an [`EmbeddingEngine`] and the active options.
///
/// `init` and `release` take `&mut self`, so they can never overlap with an
/// in-flight `embed`.
pub struct EmbeddingPipeline {
    tokenizer_loader: Arc<dyn TokenizerLoader>,
    tokenizer: Option<Box<dyn TextTokenizer>>,
    engine: EmbeddingEngine,
    options: EmbeddingOptions,
    model_id: Option<String>,
}

impl fmt::Debug for EmbeddingPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingPipeline")
            .field("tokenizer", &self.tokenizer.is_some())
            .field("engine", &self.engine)
            .field("options", &self.options)
            .field("model_id", &self.model_id)
            .finish()
    }
}

impl Default for EmbeddingPipeline {
    fn default() -> Self {
        Self::new(HubTokenizerLoader::new(), BertSessionLoader::new())
    }
}

impl EmbeddingPipeline {
    /// Build a pipeline from explicit collaborators, with default options.
    pub fn new<T, S>(tokenizer_loader: T, session_loader: S) -> Self
    where
        T: TokenizerLoader + 'static,
        S: SessionLoader + 'static,
    {
        Self {
            tokenizer_loader: Arc::new(tokenizer_loader),
            tokenizer: None,
            engine: EmbeddingEngine::new(session_loader),
            options: EmbeddingOptions::default(),
            model_id: None,
        }
    }

    /// Replace the base options record that `init` merges overrides into.
    pub fn with_options(mut self, options: EmbeddingOptions) -> Self {
        self.options = options;
        self
    }

    /// Load the tokenizer for `model_id` and a session for `artifact_path`.
    ///
    /// `overrides` are merged over the active options first. Errors from the
    /// tokenizer or the engine are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the tokenizer loader's error if no tokenizer can be found for
    /// `model_id`, or [`EmbeddingError::SessionLoad`] if the engine load fails.
    pub async fn init(
        &mut self,
        model_id: &str,
        artifact_path: &str,
        overrides: Option<OptionsOverride>,
    ) -> Result<()> {
        if let Some(overrides) = overrides {
            self.options.merge(overrides);
        }
        debug!("Active options: {:?}", self.options);

        let result = self.load_all(model_id, artifact_path).await;
        match &result {
            Ok(()) => {
                self.model_id = Some(model_id.to_string());
                if self.options.verbose {
                    info!("Initialization of {} completed successfully", model_id);
                }
            }
            Err(e) => self.report("initializing pipeline", e),
        }
        result
    }

    async fn load_all(&mut self, model_id: &str, artifact_path: &str) -> Result<()> {
        if self.options.verbose {
            info!("Loading tokenizer from {}...", model_id);
        }
        let tokenizer = self.tokenizer_loader.load(model_id).await?;
        self.tokenizer = Some(tokenizer);

        if self.options.verbose {
            info!("Loading model from {}, path: {}...", model_id, artifact_path);
        }
        self.engine
            .load(model_id, artifact_path, &self.options)
            .await
    }

    /// Tokenize `text` and return its embedding.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::UninitializedTokenizer`] before `init`,
    /// [`EmbeddingError::EmptyTokenization`] if the tokenizer yields no ids,
    /// and any error from [`EmbeddingEngine::embed`].
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokenizer = self
            .tokenizer
            .as_ref()
            .ok_or(EmbeddingError::UninitializedTokenizer)?;

        let result = self.embed_with(tokenizer.as_ref(), text).await;
        if let Err(e) = &result {
            self.report("embedding", e);
        }
        result
    }

    async fn embed_with(&self, tokenizer: &dyn TextTokenizer, text: &str) -> Result<Vec<f32>> {
        let request = self.tokenize_request();
        let tokenized = tokenizer.tokenize(text, &request).await?;

        if tokenized.input_ids.is_empty() {
            return Err(EmbeddingError::EmptyTokenization);
        }
        if self.options.verbose {
            if let Some(tokens) = &tokenized.tokens {
                debug!("Tokens: {:?}", tokens);
            }
        }

        self.engine
            .embed(&tokenized.input_ids, tokenized.token_type_ids.as_deref())
            .await
    }

    /// Release the engine session and drop the tokenizer.
    pub fn release(&mut self) {
        self.engine.release();
        self.tokenizer = None;
        self.model_id = None;
        if self.options.verbose {
            info!("Pipeline released");
        }
    }

    /// Report tokenizer fields, session state and active options.
    pub async fn info(&self) -> PipelineInfo {
        let tokenizer_fields = match &self.tokenizer {
            Some(tokenizer) => match tokenizer.tokenize(SAMPLE_TEXT, &self.tokenize_request()).await {
                Ok(sample) => sample.field_names().into_iter().map(String::from).collect(),
                Err(e) => {
                    warn!("Sample tokenization failed: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        PipelineInfo {
            model_id: self.model_id.clone(),
            tokenizer_fields,
            session_loaded: self.engine.is_loaded(),
            options: self.options.clone(),
        }
    }

    /// Active options record.
    pub fn options(&self) -> &EmbeddingOptions {
        &self.options
    }

    /// Whether both tokenizer and session are loaded.
    pub fn is_ready(&self) -> bool {
        self.tokenizer.is_some() && self.engine.is_loaded()
    }

    /// The underlying engine.
    pub fn engine(&self) -> &EmbeddingEngine {
        &self.engine
    }

    fn tokenize_request(&self) -> TokenizeRequest {
        let include_type_ids = self.options.include_type_ids;
        TokenizeRequest {
            padding: Padding::Longest,
            truncation: true,
            max_length: self.options.max_tokens,
            return_token_type_ids: include_type_ids,
            add_special_tokens: include_type_ids.then_some(true),
            show_special: self.options.show_special,
        }
    }

    fn report(&self, stage: &str, err: &EmbeddingError) {
        if self.options.verbose {
            error!("Error {}: {}", stage, err);
        } else {
            debug!("Error {}: {}", stage, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_request_plain() {
        let pipeline = EmbeddingPipeline::default();
        let request = pipeline.tokenize_request();
        assert_eq!(request.max_length, 512);
        assert!(request.truncation);
        assert_eq!(request.padding, Padding::Longest);
        assert!(!request.return_token_type_ids);
        assert_eq!(request.add_special_tokens, None);
    }

    #[test]
    fn test_tokenize_request_with_type_ids() {
        let pipeline = EmbeddingPipeline::default().with_options(EmbeddingOptions {
            include_type_ids: true,
            max_tokens: 64,
            ..Default::default()
        });
        let request = pipeline.tokenize_request();
        assert_eq!(request.max_length, 64);
        assert!(request.return_token_type_ids);
        assert_eq!(request.add_special_tokens, Some(true));
    }

    #[tokio::test]
    async fn test_embed_before_init() {
        let pipeline = EmbeddingPipeline::default();
        assert!(!pipeline.is_ready());
        assert!(matches!(
            pipeline.embed("hi").await,
            Err(EmbeddingError::UninitializedTokenizer)
        ));
    }

    #[tokio::test]
    async fn test_info_before_init() {
        let info = EmbeddingPipeline::default().info().await;
        assert!(info.model_id.is_none());
        assert!(info.tokenizer_fields.is_empty());
        assert!(!info.session_loaded);
        assert_eq!(info.options.max_tokens, 512);
    }
}
