// config.rs
// Description: Model hyperparameters shared by all epoch models, with JSON loading,
//              derived sizes and validation.
// History:
// - 2026-10-12: Introduce ModelConfig in place of compile time dimension constants.
// - 2026-10-14: Add sliding window patch count and frequency bin helpers.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

pub const C_IN: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormType {
    Layer,
    Rms,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Gelu,
    Relu,
}

/// Which traces of a batch a model consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Features {
    All,
    Eeg,
    Emg,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub c_out: usize,
    pub d_model: usize,
    pub n_heads: usize,
    pub seq_len: usize,
    pub patch_len: usize,
    pub stride: usize,
    pub pad: bool,
    pub d_ff: usize,
    pub e_layers: usize,
    pub ca_layers: usize,
    pub dropout: f32,
    pub emb_dropout: f32,
    pub path_drop: f32,
    pub norm_type: NormType,
    pub activation: Activation,
    pub features: Features,
    pub mix_type: usize,
    pub output_attentions: bool,
    pub n_fft: usize,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            c_out: 3,
            d_model: 64,
            n_heads: 4,
            seq_len: 512,
            patch_len: 32,
            stride: 16,
            pad: true,
            d_ff: 128,
            e_layers: 2,
            ca_layers: 1,
            dropout: 0.1,
            emb_dropout: 0.1,
            path_drop: 0.1,
            norm_type: NormType::Layer,
            activation: Activation::Gelu,
            features: Features::All,
            mix_type: 2,
            output_attentions: false,
            n_fft: 256,
            seed: 42,
        }
    }
}

impl ModelConfig {
    pub fn from_json_str(s_json: &str) -> Result<Self, ModelError> {
        if s_json.trim().is_empty() {
            return Err(ModelError::InvalidConfig("config_json_empty".to_string()));
        }
        let cfg: ModelConfig = serde_json::from_str(s_json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(p_path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let s_json = std::fs::read_to_string(p_path)?;
        Self::from_json_str(&s_json)
    }

    pub fn d_head(&self) -> usize {
        self.d_model / self.n_heads.max(1)
    }

    pub fn inner_dim(&self) -> usize {
        self.n_heads * self.d_head()
    }

    pub fn mult_ff(&self) -> usize {
        self.d_ff / self.d_model.max(1)
    }

    pub fn n_traces(&self) -> usize {
        if self.features == Features::All {
            2
        } else {
            1
        }
    }

    /// Patch count for non-overlapping windows.
    pub fn n_patches(&self) -> usize {
        self.seq_len / self.patch_len.max(1)
    }

    /// Patch count for windows of `patch_len` taken every `stride` samples.
    pub fn n_patches_sliding(&self) -> usize {
        if self.seq_len < self.patch_len || self.stride == 0 {
            return 0;
        }
        let i_n = (self.seq_len - self.patch_len) / self.stride + 1;
        if self.pad {
            i_n + 1
        } else {
            i_n
        }
    }

    pub fn n_freq_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |s: &str| Err(ModelError::InvalidConfig(s.to_string()));

        if self.c_out == 0 {
            return invalid("c_out_must_be_positive");
        }
        if self.n_heads == 0 {
            return invalid("n_heads_must_be_positive");
        }
        if self.d_model < self.n_heads {
            return invalid("d_model_smaller_than_n_heads");
        }
        if self.d_ff < self.d_model {
            return invalid("d_ff_smaller_than_d_model");
        }
        if self.patch_len == 0 || self.stride == 0 {
            return invalid("patch_len_and_stride_must_be_positive");
        }
        if self.seq_len < self.patch_len {
            return invalid("seq_len_smaller_than_patch_len");
        }
        if self.e_layers == 0 {
            return invalid("e_layers_must_be_positive");
        }
        if self.n_fft < 2 {
            return invalid("n_fft_too_small");
        }
        for (s_name, d_p) in [
            ("dropout", self.dropout),
            ("emb_dropout", self.emb_dropout),
            ("path_drop", self.path_drop),
        ] {
            if !d_p.is_finite() || !(0.0..1.0).contains(&d_p) {
                return Err(ModelError::InvalidConfig(format!("{}_out_of_range", s_name)));
            }
        }
        Ok(())
    }

    /// Models built on non-overlapping patches need `seq_len` to split evenly.
    pub fn require_whole_patches(&self) -> Result<(), ModelError> {
        if self.seq_len % self.patch_len != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "seq_len {} not divisible by patch_len {}",
                self.seq_len, self.patch_len
            )));
        }
        Ok(())
    }
}
