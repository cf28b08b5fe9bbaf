//! Embedding engine: session lifecycle and mean pooling.

use crate::error::{EmbeddingError, Result};
use crate::options::EmbeddingOptions;
use crate::runtime::{
    InferenceSession, InputTensor, OutputTensor, SessionLoader, SessionOutputs, TensorBundle,
    ATTENTION_MASK, HIDDEN_STATE_OUTPUTS, INPUT_IDS, TOKEN_TYPE_IDS,
};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle state of an [`EmbeddingEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No session; `embed` fails with [`EmbeddingError::UninitializedSession`].
    Unloaded,
    /// A session is loaded and `embed` may be called.
    Ready,
}

/// Owns one inference session and reduces its hidden states to a vector.
pub struct EmbeddingEngine {
    loader: Arc<dyn SessionLoader>,
    session: Option<Box<dyn InferenceSession>>,
    model_id: Option<String>,
    forward_type_ids: bool,
    output_names: Vec<String>,
}

impl fmt::Debug for EmbeddingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingEngine")
            .field("session", &self.session.is_some())
            .field("model_id", &self.model_id)
            .field("forward_type_ids", &self.forward_type_ids)
            .field("output_names", &self.output_names)
            .finish()
    }
}

impl EmbeddingEngine {
    /// Create an unloaded engine that will open sessions through `loader`.
    pub fn new<L>(loader: L) -> Self
    where
        L: SessionLoader + 'static,
    {
        Self::with_loader(Arc::new(loader))
    }

    /// Create an unloaded engine sharing an existing loader.
    pub fn with_loader(loader: Arc<dyn SessionLoader>) -> Self {
        Self {
            loader,
            session: None,
            model_id: None,
            forward_type_ids: false,
            output_names: HIDDEN_STATE_OUTPUTS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the ordered list of hidden-state output names.
    pub fn with_output_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Load a session for `artifact`.
    ///
    /// The artifact location is resolved through `options.fetch` first. Any
    /// failure is reported as [`EmbeddingError::SessionLoad`] and leaves the
    /// engine in the state it was in before the call.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::SessionLoad`] if the fetcher cannot resolve
    /// `artifact` or the loader cannot open it.
    pub async fn load(
        &mut self,
        model_id: &str,
        artifact: &str,
        options: &EmbeddingOptions,
    ) -> Result<()> {
        let start = Instant::now();

        let path = options
            .fetch
            .fetch(artifact)
            .await
            .map_err(into_session_load)?;
        debug!("Resolved artifact {} -> {}", artifact, path.display());

        let session = self
            .loader
            .load(model_id, &path, options)
            .await
            .map_err(into_session_load)?;

        if self.session.is_some() {
            debug!("Replacing loaded session for {:?}", self.model_id);
        }
        self.session = Some(session);
        self.model_id = Some(model_id.to_string());
        self.forward_type_ids = options.include_type_ids;

        info!(
            "Session for {} ready in {:.2?}",
            model_id,
            start.elapsed()
        );
        Ok(())
    }

    /// Embed one token sequence.
    ///
    /// `type_ids` are only forwarded when the engine was loaded with
    /// `include_type_ids`; a missing sequence is then zero-filled.
    ///
    /// # Errors
    ///
    /// * [`EmbeddingError::UninitializedSession`] if nothing is loaded
    /// * [`EmbeddingError::EmptyInput`] if `tokens` is empty
    /// * [`EmbeddingError::InferenceRuntime`] if the forward pass fails
    /// * [`EmbeddingError::MissingOutput`] if no hidden-state output is found
    /// * [`EmbeddingError::InvalidDimensions`] if its shape is unusable
    pub async fn embed(&self, tokens: &[u32], type_ids: Option<&[u32]>) -> Result<Vec<f32>> {
        let session = self
            .session
            .as_ref()
            .ok_or(EmbeddingError::UninitializedSession)?;

        if tokens.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let inputs = build_inputs(tokens, type_ids, self.forward_type_ids)?;

        let start = Instant::now();
        let outputs = session.run(inputs).await.map_err(|e| match e {
            EmbeddingError::InferenceRuntime { .. } => e,
            other => EmbeddingError::InferenceRuntime {
                message: other.to_string(),
            },
        })?;
        debug!("Forward pass over {} tokens took {:.2?}", tokens.len(), start.elapsed());

        let hidden = select_output(&outputs, self.output_names.as_slice())?;
        mean_pool(hidden)
    }

    /// Drop the session. Safe to call when nothing is loaded.
    pub fn release(&mut self) {
        match self.session.take() {
            Some(_) => debug!("Released session for {:?}", self.model_id),
            None => warn!("release() called on an engine with no session"),
        }
        self.model_id = None;
    }

    /// Whether a session is loaded.
    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        if self.is_loaded() {
            EngineState::Ready
        } else {
            EngineState::Unloaded
        }
    }

    /// Identifier of the loaded model.
    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    /// Output names tried when locating hidden states.
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }
}

fn into_session_load(err: EmbeddingError) -> EmbeddingError {
    match err {
        EmbeddingError::SessionLoad { .. } => err,
        other => EmbeddingError::SessionLoad {
            message: other.to_string(),
        },
    }
}

/// Build the `[1, N]` input bundle for one token sequence.
///
/// # Errors
///
/// Returns [`EmbeddingError::Tensor`] if forwarded `type_ids` differ in length
/// from `tokens`.
pub fn build_inputs(
    tokens: &[u32],
    type_ids: Option<&[u32]>,
    forward_type_ids: bool,
) -> Result<TensorBundle> {
    let seq_len = tokens.len();
    let mut bundle = TensorBundle::new();

    bundle.insert(
        INPUT_IDS,
        InputTensor::new(tokens.iter().map(|&id| i64::from(id)).collect()),
    );
    bundle.insert(ATTENTION_MASK, InputTensor::new(vec![1; seq_len]));

    if forward_type_ids {
        let type_ids = match type_ids {
            Some(ids) if ids.len() != seq_len => {
                return Err(EmbeddingError::Tensor {
                    message: format!(
                        "token_type_ids length {} does not match input_ids length {}",
                        ids.len(),
                        seq_len
                    ),
                });
            }
            Some(ids) => ids.iter().map(|&id| i64::from(id)).collect(),
            None => vec![0; seq_len],
        };
        bundle.insert(TOKEN_TYPE_IDS, InputTensor::new(type_ids));
    }

    Ok(bundle)
}

/// Return the first output whose name appears in `candidates`.
pub fn select_output<'a, S>(outputs: &'a SessionOutputs, candidates: &[S]) -> Result<&'a OutputTensor>
where
    S: AsRef<str>,
{
    candidates
        .iter()
        .find_map(|name| outputs.get(name.as_ref()))
        .ok_or_else(|| EmbeddingError::MissingOutput {
            candidates: candidates.iter().map(|s| s.as_ref().to_string()).collect(),
        })
}

/// Unweighted mean over the sequence axis of a `[1, N, H]` tensor.
///
/// Every position contributes equally. NaN and infinite values propagate.
///
/// # Errors
///
/// Returns [`EmbeddingError::InvalidDimensions`] if the sequence or hidden
/// dimension is undefined, or the data does not cover the declared shape.
pub fn mean_pool(hidden: &OutputTensor) -> Result<Vec<f32>> {
    let (seq_len, hidden_size) = match (hidden.dim(1), hidden.dim(2)) {
        (Some(s), Some(h)) => (s, h),
        _ => return Err(EmbeddingError::invalid_dimensions(hidden.dims())),
    };

    let data = hidden.data();
    match seq_len.checked_mul(hidden_size) {
        Some(needed) if data.len() >= needed => {}
        _ => return Err(EmbeddingError::invalid_dimensions(hidden.dims())),
    }

    let mut result = vec![0.0f32; hidden_size];
    for (h, out) in result.iter_mut().enumerate() {
        let mut sum = 0.0f32;
        for s in 0..seq_len {
            sum += data[s * hidden_size + h];
        }
        *out = sum / seq_len as f32;
    }

    Ok(result)
}
