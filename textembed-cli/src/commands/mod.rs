//! Command implementations for textembed CLI
//!
//! Each command module provides a `run` function that executes the command logic.

pub mod embed;
pub mod info;

use anyhow::{bail, Context};
use clap::Args;
use textembed::{
    BertSessionLoader, EmbeddingPipeline, ExecutionProvider, HubTokenizerLoader, OptionsOverride,
};

use crate::config::EmbedConfig;

/// Model selection and options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Model identifier used for the tokenizer lookup
    #[arg(short, long, env = "TEXTEMBED_MODEL")]
    pub model: Option<String>,

    /// Model directory or safetensors weights file
    #[arg(short, long, env = "TEXTEMBED_ARTIFACT")]
    pub artifact: Option<String>,

    /// Tokenizer truncation bound
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Execution providers to try, in order (cpu, cuda, metal)
    #[arg(long = "provider", value_delimiter = ',')]
    pub providers: Vec<String>,

    /// Forward token type ids to the model
    #[arg(long)]
    pub type_ids: bool,

    /// Weights are sharded (model.safetensors.index.json)
    #[arg(long)]
    pub external_data: bool,

    /// Keep special tokens in the tokenizer's token list
    #[arg(long)]
    pub show_special: bool,

    /// Look for tokenizer.json in the model identifier as a local directory
    #[arg(long)]
    pub local: bool,

    /// Never contact the Hugging Face hub
    #[arg(long)]
    pub offline: bool,
}

/// Everything needed to call `EmbeddingPipeline::init`.
#[derive(Debug)]
pub struct PipelinePlan {
    pub model_id: String,
    pub artifact: String,
    pub overrides: OptionsOverride,
    pub local: bool,
    pub offline: bool,
}

impl ModelArgs {
    /// Combine flags with the config file; flags win.
    pub fn plan(&self, config: &EmbedConfig, verbose: bool) -> anyhow::Result<PipelinePlan> {
        let Some(model_id) = self.model.clone().or_else(|| config.model.id.clone()) else {
            bail!("No model given. Pass --model or set [model].id in .textembed.toml");
        };
        let artifact = self
            .artifact
            .clone()
            .or_else(|| config.model.artifact.clone())
            .unwrap_or_else(|| model_id.clone());

        let mut overrides = config.options.clone();
        if let Some(max_tokens) = self.max_tokens {
            overrides.max_tokens = Some(max_tokens);
        }
        if !self.providers.is_empty() {
            overrides.execution_providers = Some(
                self.providers
                    .iter()
                    .map(|p| ExecutionProvider::from(p.as_str()))
                    .collect(),
            );
        }
        if self.type_ids {
            overrides.include_type_ids = Some(true);
        }
        if self.external_data {
            overrides.external_data = Some(true);
        }
        if self.show_special {
            overrides.show_special = Some(true);
        }
        if verbose {
            overrides.verbose = Some(true);
        }

        Ok(PipelinePlan {
            model_id,
            artifact,
            overrides,
            local: self.local || config.model.local_tokenizer,
            offline: self.offline || config.model.offline,
        })
    }
}

impl PipelinePlan {
    /// Build and initialize a pipeline.
    pub async fn init(self) -> anyhow::Result<EmbeddingPipeline> {
        let tokenizers = HubTokenizerLoader::new()
            .allow_local(self.local)
            .allow_remote(!self.offline);
        let mut pipeline = EmbeddingPipeline::new(tokenizers, BertSessionLoader::new());

        pipeline
            .init(&self.model_id, &self.artifact, Some(self.overrides))
            .await
            .with_context(|| format!("Failed to initialize {}", self.model_id))?;
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_requires_model() {
        let err = ModelArgs::default()
            .plan(&EmbedConfig::default(), false)
            .unwrap_err();
        assert!(err.to_string().contains("--model"));
    }

    #[test]
    fn test_plan_flags_override_config() {
        let config: EmbedConfig = toml::from_str(
            r#"
[model]
id = "from-config"
artifact = "models/config"

[options]
max_tokens = 256
execution_providers = ["cuda"]
"#,
        )
        .unwrap();

        let args = ModelArgs {
            model: Some("from-flag".into()),
            max_tokens: Some(64),
            ..Default::default()
        };
        let plan = args.plan(&config, true).unwrap();
        assert_eq!(plan.model_id, "from-flag");
        assert_eq!(plan.artifact, "models/config");
        assert_eq!(plan.overrides.max_tokens, Some(64));
        assert_eq!(
            plan.overrides.execution_providers,
            Some(vec![ExecutionProvider::Cuda])
        );
        assert_eq!(plan.overrides.verbose, Some(true));
    }

    #[test]
    fn test_plan_artifact_defaults_to_model() {
        let args = ModelArgs {
            model: Some("models/minilm".into()),
            providers: vec!["metal".into(), "cpu".into()],
            type_ids: true,
            ..Default::default()
        };
        let plan = args.plan(&EmbedConfig::default(), false).unwrap();
        assert_eq!(plan.artifact, "models/minilm");
        assert_eq!(
            plan.overrides.execution_providers,
            Some(vec![ExecutionProvider::Metal, ExecutionProvider::Cpu])
        );
        assert_eq!(plan.overrides.include_type_ids, Some(true));
        assert!(plan.overrides.verbose.is_none());
    }
}
