// models/sw_baseline.rs
// Description: Sliding window baseline. EEG and EMG are encoded by two independent
//              sliding window transformers with CLS tokens; the concatenated CLS outputs
//              feed a norm + linear head. Attention maps are returned on request.
// History:
// - 2026-10-14: Add SwBaseline.

use ndarray::{Array2, Array4};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::layer::{concat_cols, concat_rows, ClsHead, Layer};
use crate::models::{check_batch, emg_trace, last_row, trace_of, EpochModel, ModelOutput, EEG_TRACE};
use crate::transformer::{AttentionMaps, Transformer};

pub struct SwBaseline {
    eeg_transformer: Transformer,
    emg_transformer: Transformer,
    mlp_head: ClsHead,
    b_output_attentions: bool,
    cfg: ModelConfig,
}

impl SwBaseline {
    pub fn new(cfg: &ModelConfig) -> Result<Self, ModelError> {
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        Ok(Self {
            eeg_transformer: Transformer::sliding_window(cfg, true, &mut rng)?,
            emg_transformer: Transformer::sliding_window(cfg, true, &mut rng)?,
            mlp_head: ClsHead::new(cfg.inner_dim(), 2, cfg.c_out, &mut rng),
            b_output_attentions: cfg.output_attentions,
            cfg: cfg.clone(),
        })
    }
}

impl EpochModel for SwBaseline {
    fn model_type(&self) -> &str {
        "SWBaseLine"
    }

    fn forward(&mut self, a_x: &Array4<f32>, v_labels: &[usize]) -> Result<ModelOutput, ModelError> {
        let i_batch = check_batch(a_x, v_labels, 2, &self.cfg)?;
        let i_emg = emg_trace(a_x);

        let mut v_emb: Vec<Array2<f32>> = Vec::with_capacity(i_batch);
        let mut v_eeg_attn: Vec<AttentionMaps> = Vec::new();
        let mut v_emg_attn: Vec<AttentionMaps> = Vec::new();

        for i_sample in 0..i_batch {
            let (a_eeg, opt_eeg_maps) = self
                .eeg_transformer
                .forward_with_attentions(&trace_of(a_x, i_sample, EEG_TRACE))?;
            let (a_emg, opt_emg_maps) = self
                .emg_transformer
                .forward_with_attentions(&trace_of(a_x, i_sample, i_emg))?;

            v_emb.push(concat_cols(&[&last_row(&a_eeg), &last_row(&a_emg)])?);
            if let Some(v_maps) = opt_eeg_maps {
                v_eeg_attn.push(v_maps);
            }
            if let Some(v_maps) = opt_emg_maps {
                v_emg_attn.push(v_maps);
            }
        }

        let a_emb = concat_rows(&v_emb.iter().collect::<Vec<_>>())?;
        let a_logits = self.mlp_head.forward(&a_emb)?;

        let (opt_eeg_attn, opt_emg_attn) = if self.b_output_attentions {
            (Some(v_eeg_attn), Some(v_emg_attn))
        } else {
            (None, None)
        };

        Ok(ModelOutput {
            a_logits,
            opt_eeg_attn,
            opt_emg_attn,
            a_emb,
            v_labels: v_labels.to_vec(),
        })
    }

    fn set_training(&mut self, b_training: bool) {
        self.eeg_transformer.set_training(b_training);
        self.emg_transformer.set_training(b_training);
    }

    fn components(&self) -> Vec<(&str, &dyn Layer)> {
        let mut v: Vec<(&str, &dyn Layer)> = Vec::new();
        v.push(("eeg_transformer", &self.eeg_transformer));
        v.push(("emg_transformer", &self.emg_transformer));
        v.push(("mlp_head", &self.mlp_head));
        v
    }

    fn components_mut(&mut self) -> Vec<&mut dyn Layer> {
        let mut v: Vec<&mut dyn Layer> = Vec::new();
        v.push(&mut self.eeg_transformer);
        v.push(&mut self.emg_transformer);
        v.push(&mut self.mlp_head);
        v
    }
}
