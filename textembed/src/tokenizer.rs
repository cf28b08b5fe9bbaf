//! Tokenizer collaborator.
//!
//! The pipeline only needs the [`TextTokenizer`] and [`TokenizerLoader`]
//! traits. [`HfTokenizer`] and [`HubTokenizerLoader`] implement them on top of
//! the Hugging Face `tokenizers` crate, fetching `tokenizer.json` from the hub.

use crate::error::{EmbeddingError, Result};
use crate::{BoxFuture, DEFAULT_MAX_TOKENS};
use std::path::{Path, PathBuf};
use tokenizers::{PostProcessor, Tokenizer, TruncationDirection};
use tracing::debug;

/// Padding behaviour for a tokenize call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Padding {
    /// Never pad.
    None,
    /// Pad to the longest sequence in the call. A single text is never padded.
    #[default]
    Longest,
    /// Pad every sequence up to `max_length`.
    MaxLength,
}

/// Arguments for one tokenize call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizeRequest {
    /// Padding strategy.
    pub padding: Padding,
    /// Cut sequences longer than `max_length`.
    pub truncation: bool,
    /// Upper bound on sequence length.
    pub max_length: usize,
    /// Include `token_type_ids` in the output.
    pub return_token_type_ids: bool,
    /// Insert special tokens; `None` leaves the tokenizer default (on).
    pub add_special_tokens: Option<bool>,
    /// Keep special tokens in the surface `tokens` list.
    pub show_special: bool,
}

impl Default for TokenizeRequest {
    fn default() -> Self {
        Self {
            padding: Padding::Longest,
            truncation: true,
            max_length: DEFAULT_MAX_TOKENS,
            return_token_type_ids: false,
            add_special_tokens: None,
            show_special: false,
        }
    }
}

/// Output of one tokenize call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokenized {
    /// Token ids.
    pub input_ids: Vec<u32>,
    /// Attention mask (1 for real tokens, 0 for padding).
    pub attention_mask: Vec<u32>,
    /// Segment ids, present when requested.
    pub token_type_ids: Option<Vec<u32>>,
    /// Surface tokens, when the tokenizer can report them.
    pub tokens: Option<Vec<String>>,
}

impl Tokenized {
    /// Names of the fields present in this output.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = vec!["input_ids", "attention_mask"];
        if self.token_type_ids.is_some() {
            names.push("token_type_ids");
        }
        if self.tokens.is_some() {
            names.push("tokens");
        }
        names
    }
}

/// Turns text into token ids.
pub trait TextTokenizer: Send + Sync {
    /// Tokenize a single text.
    fn tokenize<'a>(
        &'a self,
        text: &'a str,
        request: &'a TokenizeRequest,
    ) -> BoxFuture<'a, Result<Tokenized>>;
}

/// Resolves a model identifier into a tokenizer.
pub trait TokenizerLoader: Send + Sync {
    /// Load the tokenizer matching `model_id`.
    fn load<'a>(&'a self, model_id: &'a str) -> BoxFuture<'a, Result<Box<dyn TextTokenizer>>>;
}

/// Wrapper around a Hugging Face tokenizer.
pub struct HfTokenizer {
    tokenizer: Tokenizer,
}

impl HfTokenizer {
    /// Load tokenizer from a `tokenizer.json` file.
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing or cannot be parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EmbeddingError::Tokenizer {
                message: format!("Tokenizer file not found: {}", path.display()),
            });
        }

        let tokenizer = Tokenizer::from_file(path)?;
        Ok(Self { tokenizer })
    }

    /// Load tokenizer from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let tokenizer =
            Tokenizer::from_bytes(json.as_bytes()).map_err(|e| EmbeddingError::Tokenizer {
                message: format!("Failed to parse tokenizer JSON: {}", e),
            })?;
        Ok(Self { tokenizer })
    }

    /// Vocabulary size including added tokens.
    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    /// Synchronous encode used by [`TextTokenizer::tokenize`].
    ///
    /// Truncation happens before special tokens are added and keeps room for
    /// them, so a truncated sequence still ends with its closing token.
    ///
    /// # Errors
    ///
    /// Returns error if encoding or post-processing fails.
    pub fn encode(&self, text: &str, request: &TokenizeRequest) -> Result<Tokenized> {
        let add_special = request.add_special_tokens.unwrap_or(true);
        let mut encoding =
            self.tokenizer
                .encode(text, false)
                .map_err(|e| EmbeddingError::Tokenizer {
                    message: format!("Encoding failed: {}", e),
                })?;

        if request.truncation {
            let budget = request
                .max_length
                .saturating_sub(self.special_tokens_added(add_special));
            if encoding.len() > budget {
                encoding.truncate(budget, 0, TruncationDirection::Right);
            }
        }

        let encoding = self
            .tokenizer
            .post_process(encoding, None, add_special)
            .map_err(|e| EmbeddingError::Tokenizer {
                message: format!("Post-processing failed: {}", e),
            })?;

        let mut input_ids = encoding.get_ids().to_vec();
        let mut attention_mask = encoding.get_attention_mask().to_vec();
        let mut type_ids = encoding.get_type_ids().to_vec();
        let special_mask = encoding.get_special_tokens_mask().to_vec();
        let tokens = encoding.get_tokens().to_vec();

        if request.padding == Padding::MaxLength && input_ids.len() < request.max_length {
            let padding_len = request.max_length - input_ids.len();
            input_ids.extend(std::iter::repeat(0u32).take(padding_len));
            attention_mask.extend(std::iter::repeat(0u32).take(padding_len));
            type_ids.extend(std::iter::repeat(0u32).take(padding_len));
        }

        let tokens = tokens
            .into_iter()
            .zip(special_mask)
            .filter(|(_, special)| request.show_special || *special == 0)
            .map(|(token, _)| token)
            .collect();

        Ok(Tokenized {
            input_ids,
            attention_mask,
            token_type_ids: request.return_token_type_ids.then_some(type_ids),
            tokens: Some(tokens),
        })
    }

    fn special_tokens_added(&self, add_special: bool) -> usize {
        if !add_special {
            return 0;
        }
        self.tokenizer
            .get_post_processor()
            .map_or(0, |processor| processor.added_tokens(false))
    }
}

impl TextTokenizer for HfTokenizer {
    fn tokenize<'a>(
        &'a self,
        text: &'a str,
        request: &'a TokenizeRequest,
    ) -> BoxFuture<'a, Result<Tokenized>> {
        Box::pin(async move { self.encode(text, request) })
    }
}

/// Loads `tokenizer.json` for a model identifier.
///
/// Remote lookup goes through the Hugging Face hub. Treating the identifier as
/// a local directory is off by default and must be enabled explicitly.
#[derive(Debug, Clone)]
pub struct HubTokenizerLoader {
    allow_remote: bool,
    allow_local: bool,
    filename: String,
}

impl Default for HubTokenizerLoader {
    fn default() -> Self {
        Self {
            allow_remote: true,
            allow_local: false,
            filename: "tokenizer.json".to_string(),
        }
    }
}

impl HubTokenizerLoader {
    /// Remote fetch on, local lookup off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow or forbid fetching from the hub.
    pub fn allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    /// Allow or forbid treating the identifier as a local directory.
    pub fn allow_local(mut self, allow: bool) -> Self {
        self.allow_local = allow;
        self
    }

    /// Resolve the tokenizer file path for `model_id`.
    pub fn resolve(&self, model_id: &str) -> Result<PathBuf> {
        if self.allow_local {
            let local = Path::new(model_id).join(&self.filename);
            if local.exists() {
                debug!("Using local tokenizer {}", local.display());
                return Ok(local);
            }
        }

        if !self.allow_remote {
            return Err(EmbeddingError::Tokenizer {
                message: format!(
                    "No tokenizer for {} and remote models are disabled",
                    model_id
                ),
            });
        }

        debug!("Fetching {} for {} from the hub", self.filename, model_id);
        let api = hf_hub::api::sync::Api::new().map_err(|e| EmbeddingError::Tokenizer {
            message: format!("Failed to initialise hub client: {}", e),
        })?;
        api.model(model_id.to_string())
            .get(&self.filename)
            .map_err(|e| EmbeddingError::Tokenizer {
                message: format!("Failed to fetch tokenizer for {}: {}", model_id, e),
            })
    }
}

impl TokenizerLoader for HubTokenizerLoader {
    fn load<'a>(&'a self, model_id: &'a str) -> BoxFuture<'a, Result<Box<dyn TextTokenizer>>> {
        Box::pin(async move {
            let path = self.resolve(model_id)?;
            let tokenizer = HfTokenizer::from_file(&path)?;
            debug!("Loaded tokenizer: vocab_size={}", tokenizer.vocab_size());
            Ok(Box::new(tokenizer) as Box<dyn TextTokenizer>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORDLEVEL_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 0, "content": "[PAD]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 1, "content": "[CLS]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 2, "content": "[SEP]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [
                {"SpecialToken": {"id": "[CLS]", "type_id": 0}},
                {"Sequence": {"id": "A", "type_id": 0}},
                {"SpecialToken": {"id": "[SEP]", "type_id": 0}}
            ],
            "pair": [
                {"SpecialToken": {"id": "[CLS]", "type_id": 0}},
                {"Sequence": {"id": "A", "type_id": 0}},
                {"SpecialToken": {"id": "[SEP]", "type_id": 0}},
                {"Sequence": {"id": "B", "type_id": 1}},
                {"SpecialToken": {"id": "[SEP]", "type_id": 1}}
            ],
            "special_tokens": {
                "[CLS]": {"id": "[CLS]", "ids": [1], "tokens": ["[CLS]"]},
                "[SEP]": {"id": "[SEP]", "ids": [2], "tokens": ["[SEP]"]}
            }
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"[PAD]": 0, "[CLS]": 1, "[SEP]": 2, "[UNK]": 3, "hello": 4, "world": 5, "again": 6},
            "unk_token": "[UNK]"
        }
    }"#;

    fn tokenizer() -> HfTokenizer {
        HfTokenizer::from_json(WORDLEVEL_JSON).unwrap()
    }

    #[test]
    fn test_encode_adds_special_tokens_by_default() {
        let out = tokenizer()
            .encode("hello world", &TokenizeRequest::default())
            .unwrap();
        assert_eq!(out.input_ids, vec![1, 4, 5, 2]);
        assert_eq!(out.attention_mask, vec![1, 1, 1, 1]);
        assert!(out.token_type_ids.is_none());
        assert_eq!(out.tokens.unwrap(), vec!["hello", "world"]);
    }

    #[test]
    fn test_encode_without_special_tokens() {
        let request = TokenizeRequest {
            add_special_tokens: Some(false),
            ..Default::default()
        };
        let out = tokenizer().encode("hello world", &request).unwrap();
        assert_eq!(out.input_ids, vec![4, 5]);
    }

    #[test]
    fn test_encode_show_special_and_type_ids() {
        let request = TokenizeRequest {
            return_token_type_ids: true,
            show_special: true,
            ..Default::default()
        };
        let out = tokenizer().encode("hello", &request).unwrap();
        assert_eq!(out.token_type_ids, Some(vec![0, 0, 0]));
        assert_eq!(out.tokens.unwrap(), vec!["[CLS]", "hello", "[SEP]"]);
    }

    #[test]
    fn test_encode_truncates() {
        let request = TokenizeRequest {
            max_length: 3,
            ..Default::default()
        };
        let out = tokenizer().encode("hello world again", &request).unwrap();
        assert_eq!(out.input_ids, vec![1, 4, 2]);
        assert_eq!(out.attention_mask, vec![1, 1, 1]);
        assert_eq!(out.tokens.unwrap(), vec!["hello"]);
    }

    #[test]
    fn test_encode_truncates_without_special_tokens() {
        let request = TokenizeRequest {
            max_length: 2,
            add_special_tokens: Some(false),
            ..Default::default()
        };
        let out = tokenizer().encode("hello world again", &request).unwrap();
        assert_eq!(out.input_ids, vec![4, 5]);
    }

    #[test]
    fn test_encode_within_limit_is_untouched() {
        let request = TokenizeRequest {
            max_length: 4,
            ..Default::default()
        };
        let out = tokenizer().encode("hello world", &request).unwrap();
        assert_eq!(out.input_ids, vec![1, 4, 5, 2]);
    }

    #[test]
    fn test_encode_pads_to_max_length() {
        let request = TokenizeRequest {
            padding: Padding::MaxLength,
            max_length: 6,
            return_token_type_ids: true,
            ..Default::default()
        };
        let out = tokenizer().encode("hello", &request).unwrap();
        assert_eq!(out.input_ids, vec![1, 4, 2, 0, 0, 0]);
        assert_eq!(out.attention_mask, vec![1, 1, 1, 0, 0, 0]);
        assert_eq!(out.token_type_ids.unwrap().len(), 6);
    }

    #[test]
    fn test_field_names() {
        let out = Tokenized {
            input_ids: vec![1],
            attention_mask: vec![1],
            token_type_ids: Some(vec![0]),
            tokens: None,
        };
        assert_eq!(
            out.field_names(),
            vec!["input_ids", "attention_mask", "token_type_ids"]
        );
    }

    #[test]
    fn test_local_lookup_disabled_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), WORDLEVEL_JSON).unwrap();
        let model_id = dir.path().to_str().unwrap();

        let loader = HubTokenizerLoader::new().allow_remote(false);
        assert!(matches!(
            loader.resolve(model_id),
            Err(EmbeddingError::Tokenizer { .. })
        ));

        let loader = loader.allow_local(true);
        assert_eq!(
            loader.resolve(model_id).unwrap(),
            dir.path().join("tokenizer.json")
        );
    }

    #[tokio::test]
    async fn test_loader_loads_local_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), WORDLEVEL_JSON).unwrap();

        let loader = HubTokenizerLoader::new()
            .allow_remote(false)
            .allow_local(true);
        let tokenizer = loader.load(dir.path().to_str().unwrap()).await.unwrap();
        let out = tokenizer
            .tokenize("world", &TokenizeRequest::default())
            .await
            .unwrap();
        assert_eq!(out.input_ids, vec![1, 5, 2]);
    }
}
