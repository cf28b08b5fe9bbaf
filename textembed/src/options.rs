//! Options record shared by the pipeline and the engine.
//!
//! A default [`EmbeddingOptions`] exists before anything is loaded. Callers
//! pass an [`OptionsOverride`] to `init`, which is merged field by field over
//! the active record: fields set in the override win, everything else is kept.

use crate::error::Result;
use crate::{BoxFuture, DEFAULT_MAX_TOKENS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Backend the inference runtime should execute the graph on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExecutionProvider {
    /// Plain CPU execution, always available.
    Cpu,
    /// NVIDIA GPU (requires the `cuda` feature).
    Cuda,
    /// Apple Silicon GPU (requires the `metal` feature).
    Metal,
    /// Any provider name this crate does not know about.
    Other(String),
}

impl FromStr for ExecutionProvider {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "cpu" => ExecutionProvider::Cpu,
            "cuda" | "gpu" => ExecutionProvider::Cuda,
            "metal" | "mps" => ExecutionProvider::Metal,
            _ => ExecutionProvider::Other(s.trim().to_string()),
        })
    }
}

impl From<String> for ExecutionProvider {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(provider) => provider,
            Err(never) => match never {},
        }
    }
}

impl From<&str> for ExecutionProvider {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

impl From<ExecutionProvider> for String {
    fn from(provider: ExecutionProvider) -> Self {
        provider.to_string()
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionProvider::Cpu => f.write_str("cpu"),
            ExecutionProvider::Cuda => f.write_str("cuda"),
            ExecutionProvider::Metal => f.write_str("metal"),
            ExecutionProvider::Other(name) => f.write_str(name),
        }
    }
}

/// Resolves an artifact location into a local path the session loader can open.
///
/// The default [`PassthroughFetcher`] treats the location as a filesystem path.
/// Hosts that keep models elsewhere plug in their own retrieval here.
pub trait ArtifactFetcher: Send + Sync {
    /// Resolve `location` to a local path.
    fn fetch<'a>(&'a self, location: &'a str) -> BoxFuture<'a, Result<PathBuf>>;
}

/// Fetcher that returns the location unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFetcher;

impl ArtifactFetcher for PassthroughFetcher {
    fn fetch<'a>(&'a self, location: &'a str) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move { Ok(PathBuf::from(location)) })
    }
}

impl<F> ArtifactFetcher for F
where
    F: Fn(&str) -> Result<PathBuf> + Send + Sync,
{
    fn fetch<'a>(&'a self, location: &'a str) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move { self(location) })
    }
}

fn default_fetch() -> Arc<dyn ArtifactFetcher> {
    Arc::new(PassthroughFetcher)
}

/// Active configuration for a pipeline and its engine.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingOptions {
    /// Truncation bound passed to the tokenizer.
    pub max_tokens: usize,
    /// Keep special tokens in the tokenizer's surface token list.
    pub show_special: bool,
    /// Log progress and errors from `init`/`embed`.
    pub verbose: bool,
    /// Backends to try, in order.
    pub execution_providers: Vec<ExecutionProvider>,
    /// Model weights are split into auxiliary shard files.
    pub external_data: bool,
    /// Request type ids from the tokenizer and forward them as `token_type_ids`.
    pub include_type_ids: bool,
    /// Artifact resolver used by `load`.
    #[serde(skip, default = "default_fetch")]
    pub fetch: Arc<dyn ArtifactFetcher>,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            show_special: false,
            verbose: false,
            execution_providers: vec![ExecutionProvider::Cpu],
            external_data: false,
            include_type_ids: false,
            fetch: default_fetch(),
        }
    }
}

impl fmt::Debug for EmbeddingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingOptions")
            .field("max_tokens", &self.max_tokens)
            .field("show_special", &self.show_special)
            .field("verbose", &self.verbose)
            .field("execution_providers", &self.execution_providers)
            .field("external_data", &self.external_data)
            .field("include_type_ids", &self.include_type_ids)
            .finish_non_exhaustive()
    }
}

impl EmbeddingOptions {
    /// Shallow merge: every field set in `overrides` replaces the current value.
    pub fn merge(&mut self, overrides: OptionsOverride) {
        let OptionsOverride {
            max_tokens,
            show_special,
            verbose,
            execution_providers,
            external_data,
            include_type_ids,
            fetch,
        } = overrides;

        if let Some(v) = max_tokens {
            self.max_tokens = v;
        }
        if let Some(v) = show_special {
            self.show_special = v;
        }
        if let Some(v) = verbose {
            self.verbose = v;
        }
        if let Some(v) = execution_providers {
            self.execution_providers = v;
        }
        if let Some(v) = external_data {
            self.external_data = v;
        }
        if let Some(v) = include_type_ids {
            self.include_type_ids = v;
        }
        if let Some(v) = fetch {
            self.fetch = v;
        }
    }

    /// Return a copy of `self` with `overrides` merged in.
    pub fn merged(&self, overrides: OptionsOverride) -> Self {
        let mut merged = self.clone();
        merged.merge(overrides);
        merged
    }
}

/// Caller-supplied partial options; unset fields keep the active value.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct OptionsOverride {
    /// See [`EmbeddingOptions::max_tokens`].
    pub max_tokens: Option<usize>,
    /// See [`EmbeddingOptions::show_special`].
    pub show_special: Option<bool>,
    /// See [`EmbeddingOptions::verbose`].
    pub verbose: Option<bool>,
    /// See [`EmbeddingOptions::execution_providers`].
    pub execution_providers: Option<Vec<ExecutionProvider>>,
    /// See [`EmbeddingOptions::external_data`].
    pub external_data: Option<bool>,
    /// See [`EmbeddingOptions::include_type_ids`].
    pub include_type_ids: Option<bool>,
    /// See [`EmbeddingOptions::fetch`].
    #[serde(skip)]
    pub fetch: Option<Arc<dyn ArtifactFetcher>>,
}

impl fmt::Debug for OptionsOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionsOverride")
            .field("max_tokens", &self.max_tokens)
            .field("show_special", &self.show_special)
            .field("verbose", &self.verbose)
            .field("execution_providers", &self.execution_providers)
            .field("external_data", &self.external_data)
            .field("include_type_ids", &self.include_type_ids)
            .field("fetch", &self.fetch.is_some())
            .finish()
    }
}

impl OptionsOverride {
    /// Empty override.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tokenizer truncation bound.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Keep or hide special tokens in tokenizer output.
    pub fn with_show_special(mut self, show_special: bool) -> Self {
        self.show_special = Some(show_special);
        self
    }

    /// Enable or disable progress logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Replace the execution provider list.
    pub fn with_execution_providers<I, P>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ExecutionProvider>,
    {
        self.execution_providers = Some(providers.into_iter().map(Into::into).collect());
        self
    }

    /// Declare whether weights are split into shard files.
    pub fn with_external_data(mut self, external_data: bool) -> Self {
        self.external_data = Some(external_data);
        self
    }

    /// Forward token type ids to the model.
    pub fn with_type_ids(mut self, include_type_ids: bool) -> Self {
        self.include_type_ids = Some(include_type_ids);
        self
    }

    /// Install a custom artifact fetcher.
    pub fn with_fetch(mut self, fetch: Arc<dyn ArtifactFetcher>) -> Self {
        self.fetch = Some(fetch);
        self
    }
}
