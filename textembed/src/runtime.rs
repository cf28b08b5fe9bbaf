//! Boundary types for the inference runtime.
//!
//! The engine talks to a runtime through two traits: a [`SessionLoader`] that
//! turns an artifact path into a session, and the resulting
//! [`InferenceSession`] that maps named input tensors to named output
//! tensors. The candle backend in [`crate::bert`] is one implementation;
//! tests use in-memory mocks.

use crate::error::Result;
use crate::options::EmbeddingOptions;
use crate::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Name of the token id input.
pub const INPUT_IDS: &str = "input_ids";

/// Name of the attention mask input.
pub const ATTENTION_MASK: &str = "attention_mask";

/// Name of the segment (type id) input.
pub const TOKEN_TYPE_IDS: &str = "token_type_ids";

/// Output names carrying per-token hidden states, highest priority first.
pub const HIDDEN_STATE_OUTPUTS: &[&str] = &["last_hidden_state", "embeddings"];

/// A `[1, N]` tensor of 64-bit signed integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTensor {
    data: Vec<i64>,
    shape: [usize; 2],
}

impl InputTensor {
    /// Wrap a single sequence as a batch of one.
    pub fn new(data: Vec<i64>) -> Self {
        let shape = [1, data.len()];
        Self { data, shape }
    }

    /// Flat element buffer.
    pub fn data(&self) -> &[i64] {
        &self.data
    }

    /// Shape as `[batch, sequence_length]`.
    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    /// Sequence length (second dimension).
    pub fn seq_len(&self) -> usize {
        self.shape[1]
    }
}

/// Named input tensors handed to a session in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TensorBundle {
    inputs: BTreeMap<String, InputTensor>,
}

impl TensorBundle {
    /// Empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a named input.
    pub fn insert(&mut self, name: impl Into<String>, tensor: InputTensor) {
        self.inputs.insert(name.into(), tensor);
    }

    /// Look up an input by name.
    pub fn get(&self, name: &str) -> Option<&InputTensor> {
        self.inputs.get(name)
    }

    /// Whether an input with this name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.inputs.contains_key(name)
    }

    /// Input names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    /// Number of inputs.
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Whether the bundle holds no inputs.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Shared sequence length, or `None` if empty or lengths disagree.
    pub fn seq_len(&self) -> Option<usize> {
        let mut lengths = self.inputs.values().map(InputTensor::seq_len);
        let first = lengths.next()?;
        lengths.all(|len| len == first).then_some(first)
    }
}

/// Float output tensor as produced by a runtime.
///
/// Dimensions are optional because some runtimes report symbolic or unknown
/// axes; the engine validates them before pooling.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    data: Vec<f32>,
    dims: Vec<Option<usize>>,
}

impl OutputTensor {
    /// Build from a flat buffer and possibly partial dimensions.
    pub fn new(data: Vec<f32>, dims: Vec<Option<usize>>) -> Self {
        Self { data, dims }
    }

    /// Build from a flat buffer and a fully known shape.
    pub fn from_shape(data: Vec<f32>, shape: &[usize]) -> Self {
        Self::new(data, shape.iter().copied().map(Some).collect())
    }

    /// Flat element buffer, row-major.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Reported dimensions.
    pub fn dims(&self) -> &[Option<usize>] {
        &self.dims
    }

    /// Dimension at `axis`, `None` if missing or undefined.
    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied().flatten()
    }
}

/// Named outputs from one session run.
pub type SessionOutputs = HashMap<String, OutputTensor>;

/// A loaded inference graph.
///
/// Sessions must tolerate overlapping `run` calls; each call owns its inputs.
pub trait InferenceSession: Send + Sync {
    /// Run the forward pass.
    fn run<'a>(&'a self, inputs: TensorBundle) -> BoxFuture<'a, Result<SessionOutputs>>;
}

/// Creates sessions from model artifacts.
pub trait SessionLoader: Send + Sync {
    /// Open the artifact at `artifact` honoring `execution_providers` and
    /// `external_data` from `options`.
    fn load<'a>(
        &'a self,
        model_id: &'a str,
        artifact: &'a Path,
        options: &'a EmbeddingOptions,
    ) -> BoxFuture<'a, Result<Box<dyn InferenceSession>>>;
}
