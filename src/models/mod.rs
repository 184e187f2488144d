// models/mod.rs
// Description: Epoch classification models and their shared forward contract.
//              Input batches are [batch, trace, channel, length]; trace 0 is EEG and the
//              last trace is EMG.
// History:
// - 2026-10-14: Add EpochModel trait, ModelOutput and the model factory.
// - 2026-10-16: Add ASCII topology lines for the CLI.

pub mod mix_transformer;
pub mod sw_baseline;
pub mod tfcm_transformer;

use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array2, Array4, Axis};
use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, C_IN};
use crate::error::ModelError;
use crate::layer::Layer;
use crate::transformer::AttentionMaps;

pub use mix_transformer::{MixTransformer, MonoTransformer};
pub use sw_baseline::SwBaseline;
pub use tfcm_transformer::TfcmTransformer;

pub const EEG_TRACE: usize = 0;

#[derive(Clone, Debug)]
pub struct ModelOutput {
    /// [batch, c_out]
    pub a_logits: Array2<f32>,
    /// Per sample EEG attention maps (sliding window model only).
    pub opt_eeg_attn: Option<Vec<AttentionMaps>>,
    pub opt_emg_attn: Option<Vec<AttentionMaps>>,
    /// [batch, emb_dim]
    pub a_emb: Array2<f32>,
    pub v_labels: Vec<usize>,
}

pub trait EpochModel {
    fn model_type(&self) -> &str;

    fn forward(&mut self, a_x: &Array4<f32>, v_labels: &[usize]) -> Result<ModelOutput, ModelError>;

    fn set_training(&mut self, b_training: bool);

    /// Top level components in parameter order.
    fn components(&self) -> Vec<(&str, &dyn Layer)>;
    fn components_mut(&mut self) -> Vec<&mut dyn Layer>;

    fn params(&self) -> Vec<&Array2<f32>> {
        self.components().into_iter().flat_map(|(_, l)| l.params()).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        self.components_mut().into_iter().flat_map(|l| l.params_mut()).collect()
    }

    fn parameters(&self) -> usize {
        self.params().iter().map(|a| a.len()).sum()
    }

    fn topology_lines(&self) -> Vec<String> {
        let mut v_out: Vec<String> = Vec::new();
        v_out.push(format!("=== {} ===", self.model_type()));
        v_out.push(format!("total_parameters={}", self.parameters()));
        for (i_idx, (s_name, layer)) in self.components().into_iter().enumerate() {
            v_out.push(format!(
                "[{}] {} {} parameters={}",
                i_idx,
                s_name,
                layer.layer_type(),
                layer.parameters()
            ));
        }
        v_out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Mix,
    Mono,
    SwBaseline,
    Tfcm,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Mix => "mix",
            ModelKind::Mono => "mono",
            ModelKind::SwBaseline => "sw_baseline",
            ModelKind::Tfcm => "tfcm",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mix" | "mixtransformer" => Ok(ModelKind::Mix),
            "mono" => Ok(ModelKind::Mono),
            "sw_baseline" | "swbaseline" | "sw" => Ok(ModelKind::SwBaseline),
            "tfcm" | "tfcmtransformer" => Ok(ModelKind::Tfcm),
            other => Err(ModelError::InvalidConfig(format!("unknown model {:?}", other))),
        }
    }
}

pub fn build_model(kind: ModelKind, cfg: &ModelConfig) -> Result<Box<dyn EpochModel>, ModelError> {
    cfg.validate()?;
    let model: Box<dyn EpochModel> = match kind {
        ModelKind::Mix => Box::new(MixTransformer::new(cfg)?),
        ModelKind::Mono => Box::new(MonoTransformer::new(cfg)?),
        ModelKind::SwBaseline => Box::new(SwBaseline::new(cfg)?),
        ModelKind::Tfcm => Box::new(TfcmTransformer::new(cfg)?),
    };
    Ok(model)
}

// ----------------------------------------
// Batch helpers
// ----------------------------------------

pub(crate) fn check_batch(
    a_x: &Array4<f32>,
    v_labels: &[usize],
    i_min_traces: usize,
    cfg: &ModelConfig,
) -> Result<usize, ModelError> {
    let t_shape = a_x.dim();
    if t_shape.1 < i_min_traces || t_shape.2 != C_IN || t_shape.3 != cfg.seq_len {
        return Err(ModelError::shape(
            "batch",
            format!("[_, >= {}, {}, {}]", i_min_traces, C_IN, cfg.seq_len),
            format!("{:?}", a_x.shape()),
        ));
    }
    if v_labels.len() != t_shape.0 {
        return Err(ModelError::shape("labels", t_shape.0, v_labels.len()));
    }
    Ok(t_shape.0)
}

/// [channel, length] view of one trace of one sample.
pub(crate) fn trace_of(a_x: &Array4<f32>, i_sample: usize, i_trace: usize) -> Array2<f32> {
    a_x.slice(s![i_sample, i_trace, .., ..]).to_owned()
}

pub(crate) fn emg_trace(a_x: &Array4<f32>) -> usize {
    a_x.len_of(Axis(1)).saturating_sub(1)
}

pub(crate) fn last_row(a_seq: &Array2<f32>) -> Array2<f32> {
    let i_last = a_seq.nrows().saturating_sub(1);
    a_seq.slice(s![i_last..i_last + 1, ..]).to_owned()
}
