// models/mix_transformer.rs
// Description: Joint sequence transformers over patched EEG and EMG epochs.
//              - MixTransformer: EEG patches, EMG patches and one CLS token share a
//                single attention stack; trace embeddings mark the source when mix_type == 2.
//              - MonoTransformer: the same pipeline over a single selected trace.
//              Neither model applies embedding dropout to the joint sequence.
// History:
// - 2026-10-14: Add MixTransformer and MonoTransformer.
// - 2026-10-19: Remove embedding dropout from the joint sequence.

use ndarray::{Array2, Array4};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{Features, ModelConfig, C_IN};
use crate::error::ModelError;
use crate::layer::{
    concat_rows, AttentionBlock, ClsHead, Embedding, Layer, PatchEncoder,
};
use crate::models::{check_batch, emg_trace, last_row, trace_of, EpochModel, ModelOutput, EEG_TRACE};
use crate::transformer::block_spec_from_config;

pub const MIX_TYPE_TRACE_EMBEDDING: usize = 2;

// ----------------------------------------
// MixTransformer
// ----------------------------------------

pub struct MixTransformer {
    i_mix_type: usize,
    v_patch_encs: Vec<PatchEncoder>,
    pos_embedding: Embedding,
    trace_embedding: Embedding,
    cls_token: Embedding,
    v_blocks: Vec<AttentionBlock>,
    mlp_head: ClsHead,
    cfg: ModelConfig,
}

impl MixTransformer {
    pub fn new(cfg: &ModelConfig) -> Result<Self, ModelError> {
        cfg.require_whole_patches()?;
        if cfg.features != Features::All {
            return Err(ModelError::InvalidConfig(
                "mix_transformer_requires_features_all".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let i_dim = cfg.inner_dim();
        let i_traces = cfg.n_traces();

        let v_patch_encs = (0..i_traces)
            .map(|_| PatchEncoder::non_overlapping(cfg.patch_len, C_IN, i_dim, &mut rng))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            i_mix_type: cfg.mix_type,
            v_patch_encs,
            pos_embedding: Embedding::randn(cfg.n_patches() + 1, i_dim, &mut rng),
            trace_embedding: Embedding::randn(i_traces, i_dim, &mut rng),
            cls_token: Embedding::randn(1, i_dim, &mut rng),
            v_blocks: AttentionBlock::stack(&block_spec_from_config(cfg), cfg.e_layers, &mut rng)?,
            mlp_head: ClsHead::new(i_dim, 1, cfg.c_out, &mut rng),
            cfg: cfg.clone(),
        })
    }

    fn encode_sample(&mut self, a_x: &Array4<f32>, i_sample: usize) -> Result<Array2<f32>, ModelError> {
        let a_eeg = self.v_patch_encs[0].forward(&trace_of(a_x, i_sample, EEG_TRACE))?;
        let a_emg = self.v_patch_encs[1].forward(&trace_of(a_x, i_sample, emg_trace(a_x)))?;

        let mut a_eeg = self.pos_embedding.forward(&a_eeg)?;
        let mut a_emg = self.pos_embedding.forward(&a_emg)?;

        if self.i_mix_type == MIX_TYPE_TRACE_EMBEDDING {
            let i_last = self.trace_embedding.rows() - 1;
            a_eeg = a_eeg + &self.trace_embedding.slice_rows(0, 1)?;
            a_emg = a_emg + &self.trace_embedding.slice_rows(i_last, i_last + 1)?;
        }

        let mut a_seq = concat_rows(&[&a_eeg, &a_emg, self.cls_token.table()])?;
        for block in self.v_blocks.iter_mut() {
            a_seq = block.forward(&a_seq)?;
        }

        Ok(last_row(&a_seq))
    }
}

impl EpochModel for MixTransformer {
    fn model_type(&self) -> &str {
        "MixTransformer"
    }

    fn forward(&mut self, a_x: &Array4<f32>, v_labels: &[usize]) -> Result<ModelOutput, ModelError> {
        let i_batch = check_batch(a_x, v_labels, 2, &self.cfg)?;

        let mut v_emb: Vec<Array2<f32>> = Vec::with_capacity(i_batch);
        for i_sample in 0..i_batch {
            v_emb.push(self.encode_sample(a_x, i_sample)?);
        }
        let a_emb = concat_rows(&v_emb.iter().collect::<Vec<_>>())?;
        let a_logits = self.mlp_head.forward(&a_emb)?;

        Ok(ModelOutput {
            a_logits,
            opt_eeg_attn: None,
            opt_emg_attn: None,
            a_emb,
            v_labels: v_labels.to_vec(),
        })
    }

    fn set_training(&mut self, b_training: bool) {
        for block in self.v_blocks.iter_mut() {
            block.set_training(b_training);
        }
    }

    fn components(&self) -> Vec<(&str, &dyn Layer)> {
        let mut v: Vec<(&str, &dyn Layer)> = Vec::new();
        for enc in self.v_patch_encs.iter() {
            v.push(("patch_enc", enc));
        }
        v.push(("pos_embedding", &self.pos_embedding));
        v.push(("trace_embedding", &self.trace_embedding));
        v.push(("cls_token", &self.cls_token));
        for block in self.v_blocks.iter() {
            v.push(("transformer", block));
        }
        v.push(("mlp_head", &self.mlp_head));
        v
    }

    fn components_mut(&mut self) -> Vec<&mut dyn Layer> {
        let mut v: Vec<&mut dyn Layer> = Vec::new();
        for enc in self.v_patch_encs.iter_mut() {
            v.push(enc);
        }
        v.push(&mut self.pos_embedding);
        v.push(&mut self.trace_embedding);
        v.push(&mut self.cls_token);
        for block in self.v_blocks.iter_mut() {
            v.push(block);
        }
        v.push(&mut self.mlp_head);
        v
    }
}

// ----------------------------------------
// MonoTransformer
// ----------------------------------------

pub struct MonoTransformer {
    features: Features,
    patch_enc: PatchEncoder,
    pos_embedding: Embedding,
    cls_token: Embedding,
    v_blocks: Vec<AttentionBlock>,
    mlp_head: ClsHead,
    cfg: ModelConfig,
}

impl MonoTransformer {
    pub fn new(cfg: &ModelConfig) -> Result<Self, ModelError> {
        cfg.require_whole_patches()?;

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let i_dim = cfg.inner_dim();

        Ok(Self {
            features: cfg.features,
            patch_enc: PatchEncoder::non_overlapping(cfg.patch_len, C_IN, i_dim, &mut rng)?,
            pos_embedding: Embedding::randn(cfg.n_patches() + 1, i_dim, &mut rng),
            cls_token: Embedding::randn(1, i_dim, &mut rng),
            v_blocks: AttentionBlock::stack(&block_spec_from_config(cfg), cfg.e_layers, &mut rng)?,
            mlp_head: ClsHead::new(i_dim, 1, cfg.c_out, &mut rng),
            cfg: cfg.clone(),
        })
    }

    // EEG uses the first trace, anything else the last one.
    fn selected_trace(&self, a_x: &Array4<f32>) -> usize {
        if self.features == Features::Eeg {
            EEG_TRACE
        } else {
            emg_trace(a_x)
        }
    }
}

impl EpochModel for MonoTransformer {
    fn model_type(&self) -> &str {
        "MonoTransformer"
    }

    fn forward(&mut self, a_x: &Array4<f32>, v_labels: &[usize]) -> Result<ModelOutput, ModelError> {
        let i_batch = check_batch(a_x, v_labels, 1, &self.cfg)?;
        let i_trace = self.selected_trace(a_x);

        let mut v_emb: Vec<Array2<f32>> = Vec::with_capacity(i_batch);
        for i_sample in 0..i_batch {
            let a_tokens = self.patch_enc.forward(&trace_of(a_x, i_sample, i_trace))?;
            let a_tokens = self.pos_embedding.forward(&a_tokens)?;
            let mut a_seq = concat_rows(&[&a_tokens, self.cls_token.table()])?;
            for block in self.v_blocks.iter_mut() {
                a_seq = block.forward(&a_seq)?;
            }
            v_emb.push(last_row(&a_seq));
        }
        let a_emb = concat_rows(&v_emb.iter().collect::<Vec<_>>())?;
        let a_logits = self.mlp_head.forward(&a_emb)?;

        Ok(ModelOutput {
            a_logits,
            opt_eeg_attn: None,
            opt_emg_attn: None,
            a_emb,
            v_labels: v_labels.to_vec(),
        })
    }

    fn set_training(&mut self, b_training: bool) {
        for block in self.v_blocks.iter_mut() {
            block.set_training(b_training);
        }
    }

    fn components(&self) -> Vec<(&str, &dyn Layer)> {
        let mut v: Vec<(&str, &dyn Layer)> = Vec::new();
        v.push(("patch_enc", &self.patch_enc));
        v.push(("pos_embedding", &self.pos_embedding));
        v.push(("cls_token", &self.cls_token));
        for block in self.v_blocks.iter() {
            v.push(("transformer", block));
        }
        v.push(("mlp_head", &self.mlp_head));
        v
    }

    fn components_mut(&mut self) -> Vec<&mut dyn Layer> {
        let mut v: Vec<&mut dyn Layer> = Vec::new();
        v.push(&mut self.patch_enc);
        v.push(&mut self.pos_embedding);
        v.push(&mut self.cls_token);
        for block in self.v_blocks.iter_mut() {
            v.push(block);
        }
        v.push(&mut self.mlp_head);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{random_batch, small_config};

    #[test]
    fn test_mix_embedding_is_cls_output() {
        let cfg = small_config();
        let mut model = MixTransformer::new(&cfg).unwrap();
        model.set_training(false);
        let out = model.forward(&random_batch(2, &cfg), &[1, 2]).unwrap();
        assert_eq!(out.a_emb.shape(), &[2, 8]);
        assert_eq!(out.a_logits.shape(), &[2, 3]);
        assert!(out.opt_eeg_attn.is_none());
    }

    #[test]
    fn test_mix_requires_both_traces() {
        let cfg = ModelConfig { features: Features::Eeg, ..small_config() };
        assert!(MixTransformer::new(&cfg).is_err());
    }

    #[test]
    fn test_mix_type_changes_output() {
        let cfg = small_config();
        let a_x = random_batch(1, &cfg);
        let mut with_trace = MixTransformer::new(&cfg).unwrap();
        let mut without_trace = MixTransformer::new(&ModelConfig { mix_type: 1, ..cfg.clone() }).unwrap();
        with_trace.set_training(false);
        without_trace.set_training(false);
        let a1 = with_trace.forward(&a_x, &[0]).unwrap().a_logits;
        let a2 = without_trace.forward(&a_x, &[0]).unwrap().a_logits;
        assert_ne!(a1, a2);
    }

    #[test]
    fn test_same_seed_same_model() {
        let cfg = small_config();
        let a_x = random_batch(2, &cfg);
        let mut m1 = MixTransformer::new(&cfg).unwrap();
        let mut m2 = MixTransformer::new(&cfg).unwrap();
        m1.set_training(false);
        m2.set_training(false);
        assert_eq!(
            m1.forward(&a_x, &[0, 1]).unwrap().a_logits,
            m2.forward(&a_x, &[0, 1]).unwrap().a_logits
        );
    }

    #[test]
    fn test_mono_selects_trace() {
        let cfg = ModelConfig { features: Features::Eeg, ..small_config() };
        let mut model = MonoTransformer::new(&cfg).unwrap();
        model.set_training(false);

        let mut a_x = random_batch(1, &cfg);
        let a_before = model.forward(&a_x, &[0]).unwrap().a_logits;
        // Changing the EMG trace must not affect an EEG-only model.
        a_x.slice_mut(ndarray::s![.., 1, .., ..]).fill(5.0);
        let a_after = model.forward(&a_x, &[0]).unwrap().a_logits;
        assert_eq!(a_before, a_after);

        // A single-trace batch is enough.
        let a_single = Array4::<f32>::zeros((1, 1, 1, cfg.seq_len));
        assert!(model.forward(&a_single, &[0]).is_ok());
    }

    #[test]
    fn test_joint_sequence_ignores_emb_dropout() {
        let cfg = ModelConfig { emb_dropout: 0.9, dropout: 0.0, path_drop: 0.0, ..small_config() };
        let a_x = random_batch(2, &cfg);

        let mut mix = MixTransformer::new(&cfg).unwrap();
        let a_train = mix.forward(&a_x, &[0, 1]).unwrap().a_logits;
        mix.set_training(false);
        assert_eq!(a_train, mix.forward(&a_x, &[0, 1]).unwrap().a_logits);

        let mono_cfg = ModelConfig { features: Features::Eeg, ..cfg };
        let mut mono = MonoTransformer::new(&mono_cfg).unwrap();
        let a_train = mono.forward(&a_x, &[0, 1]).unwrap().a_logits;
        mono.set_training(false);
        assert_eq!(a_train, mono.forward(&a_x, &[0, 1]).unwrap().a_logits);
    }
}
