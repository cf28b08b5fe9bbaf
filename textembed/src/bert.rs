//! BERT inference sessions on top of candle.

use crate::error::{EmbeddingError, Result};
use crate::options::{EmbeddingOptions, ExecutionProvider};
use crate::runtime::{
    InferenceSession, OutputTensor, SessionLoader, SessionOutputs, TensorBundle, ATTENTION_MASK,
    INPUT_IDS, TOKEN_TYPE_IDS,
};
use crate::{BoxFuture, DEFAULT_EMBEDDING_DIM, DEFAULT_MAX_TOKENS};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, HiddenAct};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Output name emitted by [`BertSession`].
pub const LAST_HIDDEN_STATE: &str = "last_hidden_state";

const CONFIG_FILE: &str = "config.json";
const WEIGHTS_FILE: &str = "model.safetensors";
const WEIGHTS_INDEX_FILE: &str = "model.safetensors.index.json";

/// Subset of a Hugging Face BERT `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hidden size (embedding dimension).
    pub hidden_size: usize,
    /// Number of attention heads.
    pub num_attention_heads: usize,
    /// Number of hidden layers.
    pub num_hidden_layers: usize,
    /// Intermediate size in feed-forward layers.
    pub intermediate_size: usize,
    /// Vocabulary size.
    pub vocab_size: usize,
    /// Maximum position embeddings.
    pub max_position_embeddings: usize,
    /// Hidden activation function.
    #[serde(default = "default_hidden_act")]
    pub hidden_act: String,
    /// Hidden dropout probability.
    #[serde(default = "default_dropout")]
    pub hidden_dropout_prob: f64,
    /// Type vocabulary size.
    #[serde(default = "default_type_vocab_size")]
    pub type_vocab_size: usize,
    /// Layer norm epsilon.
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    /// Padding token id.
    #[serde(default)]
    pub pad_token_id: usize,
}

fn default_hidden_act() -> String {
    "gelu".to_string()
}

fn default_dropout() -> f64 {
    0.1
}

fn default_type_vocab_size() -> usize {
    2
}

fn default_layer_norm_eps() -> f64 {
    1e-12
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_size: DEFAULT_EMBEDDING_DIM,
            num_attention_heads: 12,
            num_hidden_layers: 6,
            intermediate_size: 1536,
            vocab_size: 30522,
            max_position_embeddings: DEFAULT_MAX_TOKENS,
            hidden_act: default_hidden_act(),
            hidden_dropout_prob: default_dropout(),
            type_vocab_size: default_type_vocab_size(),
            layer_norm_eps: default_layer_norm_eps(),
            pad_token_id: 0,
        }
    }
}

impl ModelConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn hidden_act(&self) -> Result<HiddenAct> {
        match self.hidden_act.as_str() {
            "gelu" => Ok(HiddenAct::Gelu),
            "gelu_new" | "gelu_approximate" | "gelu_pytorch_tanh" => Ok(HiddenAct::GeluApproximate),
            "relu" => Ok(HiddenAct::Relu),
            other => Err(EmbeddingError::Config {
                message: format!("Unsupported hidden activation: {}", other),
            }),
        }
    }

    fn to_bert_config(&self) -> Result<BertConfig> {
        Ok(BertConfig {
            vocab_size: self.vocab_size,
            hidden_size: self.hidden_size,
            num_hidden_layers: self.num_hidden_layers,
            num_attention_heads: self.num_attention_heads,
            intermediate_size: self.intermediate_size,
            hidden_act: self.hidden_act()?,
            hidden_dropout_prob: self.hidden_dropout_prob,
            max_position_embeddings: self.max_position_embeddings,
            type_vocab_size: self.type_vocab_size,
            initializer_range: 0.02,
            layer_norm_eps: self.layer_norm_eps,
            pad_token_id: self.pad_token_id,
            position_embedding_type:
                candle_transformers::models::bert::PositionEmbeddingType::Absolute,
            use_cache: false,
            classifier_dropout: None,
            model_type: None,
        })
    }
}

/// Files making up one model artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFiles {
    /// Model `config.json`.
    pub config: PathBuf,
    /// Weight files; more than one when weights are sharded.
    pub weights: Vec<PathBuf>,
}

impl ArtifactFiles {
    /// Locate config and weights for `artifact`.
    ///
    /// `artifact` is either a model directory or a weights file whose directory
    /// holds `config.json`. With `external_data` the weights are read from the
    /// shard list in `model.safetensors.index.json`.
    pub fn resolve(artifact: &Path, external_data: bool) -> Result<Self> {
        if !artifact.exists() {
            return Err(EmbeddingError::SessionLoad {
                message: format!("Model artifact not found: {}", artifact.display()),
            });
        }

        let (dir, file) = if artifact.is_dir() {
            (artifact.to_path_buf(), None)
        } else {
            let dir = artifact
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            (dir, Some(artifact.to_path_buf()))
        };

        let config = dir.join(CONFIG_FILE);
        if !config.exists() {
            return Err(EmbeddingError::SessionLoad {
                message: format!("Missing {} in {}", CONFIG_FILE, dir.display()),
            });
        }

        let weights = if external_data {
            let index = match file {
                Some(f) if f.to_string_lossy().ends_with(".index.json") => f,
                _ => dir.join(WEIGHTS_INDEX_FILE),
            };
            shard_files(&index)?
        } else {
            let weights = file.unwrap_or_else(|| dir.join(WEIGHTS_FILE));
            if !weights.exists() {
                return Err(EmbeddingError::SessionLoad {
                    message: format!(
                        "No weights file found. Expected {} in {}",
                        WEIGHTS_FILE,
                        dir.display()
                    ),
                });
            }
            vec![weights]
        };

        for path in &weights {
            if path.extension().map_or(true, |ext| ext != "safetensors") {
                return Err(EmbeddingError::SessionLoad {
                    message: format!(
                        "Only safetensors weights are supported: {}",
                        path.display()
                    ),
                });
            }
        }

        Ok(Self { config, weights })
    }
}

#[derive(Deserialize)]
struct WeightIndex {
    weight_map: HashMap<String, String>,
}

fn shard_files(index: &Path) -> Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(index).map_err(|e| EmbeddingError::SessionLoad {
        message: format!("Failed to read weight index {}: {}", index.display(), e),
    })?;
    let parsed: WeightIndex = serde_json::from_str(&content)?;

    let dir = index.parent().unwrap_or_else(|| Path::new("."));
    let shards: BTreeSet<&String> = parsed.weight_map.values().collect();
    if shards.is_empty() {
        return Err(EmbeddingError::SessionLoad {
            message: format!("Weight index {} lists no shards", index.display()),
        });
    }

    let mut files = Vec::with_capacity(shards.len());
    for shard in shards {
        let path = dir.join(shard);
        if !path.exists() {
            return Err(EmbeddingError::SessionLoad {
                message: format!("Missing weight shard: {}", path.display()),
            });
        }
        files.push(path);
    }
    Ok(files)
}

/// Pick the first usable device from the ordered provider list.
pub fn select_device(providers: &[ExecutionProvider]) -> Result<Device> {
    for provider in providers {
        match provider {
            ExecutionProvider::Cpu => return Ok(Device::Cpu),
            ExecutionProvider::Cuda => {
                #[cfg(feature = "cuda")]
                match Device::new_cuda(0) {
                    Ok(device) => return Ok(device),
                    Err(e) => warn!("CUDA device unavailable: {}", e),
                }
                #[cfg(not(feature = "cuda"))]
                warn!("Skipping cuda provider: built without the `cuda` feature");
            }
            ExecutionProvider::Metal => {
                #[cfg(feature = "metal")]
                match Device::new_metal(0) {
                    Ok(device) => return Ok(device),
                    Err(e) => warn!("Metal device unavailable: {}", e),
                }
                #[cfg(not(feature = "metal"))]
                warn!("Skipping metal provider: built without the `metal` feature");
            }
            ExecutionProvider::Other(name) => {
                warn!("Skipping unknown execution provider: {}", name);
            }
        }
    }

    let names: Vec<String> = providers.iter().map(ToString::to_string).collect();
    Err(EmbeddingError::SessionLoad {
        message: format!("No usable execution provider in [{}]", names.join(", ")),
    })
}

fn load_weights(files: &[PathBuf], device: &Device) -> Result<VarBuilder<'static>> {
    let mut tensors = HashMap::new();
    for path in files {
        debug!("Loading weights from: {}", path.display());
        let shard = candle_core::safetensors::load(path, device).map_err(|e| {
            EmbeddingError::SessionLoad {
                message: format!("Failed to load safetensors {}: {}", path.display(), e),
            }
        })?;
        tensors.extend(shard);
    }
    Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
}

/// [`SessionLoader`] producing candle BERT sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct BertSessionLoader;

impl BertSessionLoader {
    /// Create a loader.
    pub fn new() -> Self {
        Self
    }

    /// Synchronous load used by [`SessionLoader::load`].
    pub fn load_session(
        &self,
        model_id: &str,
        artifact: &Path,
        options: &EmbeddingOptions,
    ) -> Result<BertSession> {
        info!("Loading model {} from: {}", model_id, artifact.display());

        let files = ArtifactFiles::resolve(artifact, options.external_data)?;
        let config = ModelConfig::from_file(&files.config).map_err(|e| {
            EmbeddingError::SessionLoad {
                message: format!(
                    "Failed to load config from {}: {}",
                    files.config.display(),
                    e
                ),
            }
        })?;
        debug!("Loaded config: hidden_size={}", config.hidden_size);

        let device = select_device(&options.execution_providers)?;
        info!("Using device: {:?}", device);

        let vb = load_weights(&files.weights, &device)?;
        let bert_config = config.to_bert_config()?;
        let model = BertModel::load(vb, &bert_config).map_err(|e| EmbeddingError::SessionLoad {
            message: format!("Failed to load BERT model: {}", e),
        })?;

        info!("Model loaded successfully");
        Ok(BertSession {
            model,
            config,
            device,
        })
    }
}

impl SessionLoader for BertSessionLoader {
    fn load<'a>(
        &'a self,
        model_id: &'a str,
        artifact: &'a Path,
        options: &'a EmbeddingOptions,
    ) -> BoxFuture<'a, Result<Box<dyn InferenceSession>>> {
        Box::pin(async move {
            let session = self.load_session(model_id, artifact, options)?;
            Ok(Box::new(session) as Box<dyn InferenceSession>)
        })
    }
}

/// A loaded BERT encoder.
pub struct BertSession {
    model: BertModel,
    config: ModelConfig,
    device: Device,
}

impl BertSession {
    /// Model configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Device the model runs on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Run the encoder synchronously.
    pub fn forward(&self, inputs: &TensorBundle) -> Result<SessionOutputs> {
        let input_ids = inputs.get(INPUT_IDS).ok_or_else(|| runtime_error("missing input_ids"))?;
        let shape = (1, input_ids.seq_len());

        let to_tensor = |data: &[i64]| {
            Tensor::from_vec(data.to_vec(), shape, &self.device)
                .map_err(|e| runtime_error(&format!("Failed to build input tensor: {}", e)))
        };

        let ids = to_tensor(input_ids.data())?;
        let token_type_ids = match inputs.get(TOKEN_TYPE_IDS) {
            Some(t) => to_tensor(t.data())?,
            None => ids
                .zeros_like()
                .map_err(|e| runtime_error(&e.to_string()))?,
        };
        let attention_mask = match inputs.get(ATTENTION_MASK) {
            Some(t) => Some(to_tensor(t.data())?),
            None => None,
        };

        let hidden = self
            .model
            .forward(&ids, &token_type_ids, attention_mask.as_ref())
            .map_err(|e| runtime_error(&format!("Forward pass failed: {}", e)))?;

        let dims = hidden.dims().to_vec();
        let data: Vec<f32> = hidden
            .to_dtype(DType::F32)
            .and_then(|t| t.flatten_all())
            .and_then(|t| t.to_vec1())
            .map_err(|e| runtime_error(&format!("Failed to read hidden states: {}", e)))?;

        let mut outputs = SessionOutputs::new();
        outputs.insert(
            LAST_HIDDEN_STATE.to_string(),
            OutputTensor::from_shape(data, &dims),
        );
        Ok(outputs)
    }
}

fn runtime_error(message: &str) -> EmbeddingError {
    EmbeddingError::InferenceRuntime {
        message: message.to_string(),
    }
}

impl InferenceSession for BertSession {
    fn run<'a>(&'a self, inputs: TensorBundle) -> BoxFuture<'a, Result<SessionOutputs>> {
        Box::pin(async move { self.forward(&inputs) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CONFIG_JSON: &str = r#"{
        "hidden_size": 384,
        "num_attention_heads": 12,
        "num_hidden_layers": 6,
        "intermediate_size": 1536,
        "vocab_size": 30522,
        "max_position_embeddings": 512
    }"#;

    #[test]
    fn test_model_config_default() {
        let config = ModelConfig::default();
        assert_eq!(config.hidden_size, 384);
        assert_eq!(config.num_hidden_layers, 6);
        assert_eq!(config.num_attention_heads, 12);
    }

    #[test]
    fn test_model_config_serde() {
        let config: ModelConfig = serde_json::from_str(CONFIG_JSON).unwrap();
        assert_eq!(config.hidden_size, 384);
        assert_eq!(config.hidden_act, "gelu");
        assert!(matches!(config.hidden_act(), Ok(HiddenAct::Gelu)));
    }

    #[test]
    fn test_unsupported_activation() {
        let config = ModelConfig {
            hidden_act: "swish".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.to_bert_config(),
            Err(EmbeddingError::Config { .. })
        ));
    }

    #[test]
    fn test_select_device_cpu() {
        let device = select_device(&[ExecutionProvider::Cpu]).unwrap();
        assert!(matches!(device, Device::Cpu));
    }

    #[test]
    fn test_select_device_skips_unknown() {
        let device = select_device(&[
            ExecutionProvider::Other("webgpu".into()),
            ExecutionProvider::Cpu,
        ])
        .unwrap();
        assert!(matches!(device, Device::Cpu));

        let err = select_device(&[ExecutionProvider::Other("webgpu".into())]).unwrap_err();
        assert!(err.to_string().contains("webgpu"));
    }

    #[test]
    fn test_resolve_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), CONFIG_JSON).unwrap();
        fs::write(dir.path().join(WEIGHTS_FILE), b"").unwrap();

        let files = ArtifactFiles::resolve(dir.path(), false).unwrap();
        assert_eq!(files.config, dir.path().join(CONFIG_FILE));
        assert_eq!(files.weights, vec![dir.path().join(WEIGHTS_FILE)]);
    }

    #[test]
    fn test_resolve_weights_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), CONFIG_JSON).unwrap();
        let weights = dir.path().join("quantized.safetensors");
        fs::write(&weights, b"").unwrap();

        let files = ArtifactFiles::resolve(&weights, false).unwrap();
        assert_eq!(files.weights, vec![weights]);
    }

    #[test]
    fn test_resolve_sharded_weights() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), CONFIG_JSON).unwrap();
        fs::write(
            dir.path().join(WEIGHTS_INDEX_FILE),
            r#"{"metadata": {}, "weight_map": {
                "embeddings.word_embeddings.weight": "model-00001-of-00002.safetensors",
                "encoder.layer.0.output.dense.weight": "model-00002-of-00002.safetensors",
                "pooler.dense.weight": "model-00002-of-00002.safetensors"
            }}"#,
        )
        .unwrap();
        fs::write(dir.path().join("model-00001-of-00002.safetensors"), b"").unwrap();
        fs::write(dir.path().join("model-00002-of-00002.safetensors"), b"").unwrap();

        let files = ArtifactFiles::resolve(dir.path(), true).unwrap();
        assert_eq!(
            files.weights,
            vec![
                dir.path().join("model-00001-of-00002.safetensors"),
                dir.path().join("model-00002-of-00002.safetensors"),
            ]
        );
    }

    #[test]
    fn test_resolve_missing_pieces() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArtifactFiles::resolve(&dir.path().join("nope"), false).unwrap_err();
        assert!(matches!(err, EmbeddingError::SessionLoad { .. }));

        let err = ArtifactFiles::resolve(dir.path(), false).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE));

        fs::write(dir.path().join(CONFIG_FILE), CONFIG_JSON).unwrap();
        let err = ArtifactFiles::resolve(dir.path(), false).unwrap_err();
        assert!(err.to_string().contains(WEIGHTS_FILE));

        let err = ArtifactFiles::resolve(dir.path(), true).unwrap_err();
        assert!(err.to_string().contains(WEIGHTS_INDEX_FILE));
    }

    #[test]
    fn test_load_rejects_corrupt_weights() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), CONFIG_JSON).unwrap();
        fs::write(dir.path().join(WEIGHTS_FILE), b"not safetensors").unwrap();

        let err = BertSessionLoader::new()
            .load_session("test", dir.path(), &EmbeddingOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, EmbeddingError::SessionLoad { .. }));
    }
}
