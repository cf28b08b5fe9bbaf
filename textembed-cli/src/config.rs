//! Configuration loading from `.textembed.toml`.
//!
//! Configuration is optional. Values from the file are used as defaults and
//! command-line flags override them.
//!
//! # Example Configuration
//!
//! ```toml
//! [model]
//! id = "sentence-transformers/all-MiniLM-L6-v2"
//! artifact = "models/all-MiniLM-L6-v2"
//! local_tokenizer = false
//! offline = false
//!
//! [options]
//! max_tokens = 256
//! execution_providers = ["cuda", "cpu"]
//! include_type_ids = true
//!
//! [output]
//! format = "json"
//! color = true
//! ```

use serde::Deserialize;
use std::path::Path;
use textembed::OptionsOverride;

/// File name looked up in the working directory.
pub const CONFIG_FILE: &str = ".textembed.toml";

/// Root configuration loaded from `.textembed.toml`.
#[derive(Debug, Deserialize, Default)]
pub struct EmbedConfig {
    /// Model and tokenizer location.
    #[serde(default)]
    pub model: ModelSection,

    /// Overrides merged into the pipeline's options record.
    #[serde(default)]
    pub options: OptionsOverride,

    /// Output formatting preferences.
    #[serde(default)]
    pub output: OutputSettings,
}

/// Which model to load and where its tokenizer comes from.
#[derive(Debug, Deserialize, Default)]
pub struct ModelSection {
    /// Model identifier used for the tokenizer lookup.
    #[serde(default)]
    pub id: Option<String>,

    /// Path to the model directory or weights file.
    #[serde(default)]
    pub artifact: Option<String>,

    /// Treat the model identifier as a local directory first.
    #[serde(default)]
    pub local_tokenizer: bool,

    /// Never contact the hub.
    #[serde(default)]
    pub offline: bool,
}

/// Output formatting preferences.
#[derive(Debug, Deserialize, Default)]
pub struct OutputSettings {
    /// Default output format: `table` or `json`.
    #[serde(default)]
    pub format: Option<String>,

    /// Whether to use colored output.
    #[serde(default)]
    pub color: Option<bool>,
}

impl EmbedConfig {
    /// Load `.textembed.toml` from `root`.
    ///
    /// A missing file yields defaults. Read and parse errors are logged as
    /// warnings and also yield defaults.
    pub fn load(root: &Path) -> Self {
        Self::load_file(&root.join(CONFIG_FILE))
    }

    /// Load a specific configuration file.
    pub fn load_file(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse {}: {}", config_path.display(), e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", config_path.display(), e);
                }
            }
        }
        Self::default()
    }

    /// Get the default output format, if configured.
    pub fn default_format(&self) -> Option<&str> {
        self.output.format.as_deref()
    }

    /// Colored output preference, `None` for auto-detection.
    pub fn use_color(&self) -> Option<bool> {
        self.output.color
    }
}
