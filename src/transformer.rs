// transformer.rs
// Description: Token sequence encoders built from attention blocks.
//              - Transformer: time domain (patched raw trace) or frequency domain
//                (STFT frames) tokens, learned positions, optional trailing CLS token.
//                Sliding window variant uses stride and end padding.
//              - CrossDomainTransformer: attention blocks whose queries come from the
//                time sequence and whose keys and values come from the frequency sequence.
// History:
// - 2026-10-13: Add Transformer and CrossDomainTransformer.
// - 2026-10-14: Add sliding window variant and attention map collection.

use ndarray::{Array2, Array3};
use rand::rngs::StdRng;

use crate::config::{ModelConfig, C_IN};
use crate::error::ModelError;
use crate::layer::{
    child_rng, concat_rows, AttentionBlock, BlockSpec, Dropout, Embedding, Layer, Linear, PatchEncoder,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    Time,
    Freq,
}

/// Attention weights of one sample, one `[heads, queries, keys]` tensor per layer.
pub type AttentionMaps = Vec<Array3<f32>>;

pub fn block_spec_from_config(cfg: &ModelConfig) -> BlockSpec {
    BlockSpec {
        i_dim: cfg.inner_dim(),
        i_num_heads: cfg.n_heads,
        i_head_dim: cfg.d_head(),
        i_mult: cfg.mult_ff(),
        d_dropout: cfg.dropout,
        d_path_drop: cfg.path_drop,
        activation: cfg.activation,
        norm_type: cfg.norm_type,
    }
}

enum TokenEncoder {
    // [channels, length] -> [patches, dim]
    Patch(PatchEncoder),
    // [frames, bins] -> [frames, dim]
    Spectral(Linear),
}

pub struct Transformer {
    domain: Domain,
    i_tokens: usize,
    encoder: TokenEncoder,
    pos_embedding: Embedding,
    cls_token: Option<Embedding>,
    emb_dropout: Dropout,
    v_blocks: Vec<AttentionBlock>,
    b_output_attentions: bool,
}

impl Transformer {
    /// Non-overlapping `patch_len` windows over the raw trace.
    pub fn time(cfg: &ModelConfig, b_cls: bool, rng: &mut StdRng) -> Result<Self, ModelError> {
        cfg.require_whole_patches()?;
        let encoder = PatchEncoder::non_overlapping(cfg.patch_len, C_IN, cfg.inner_dim(), rng)?;
        Self::build(cfg, Domain::Time, TokenEncoder::Patch(encoder), cfg.n_patches(), b_cls, cfg.e_layers, rng)
    }

    /// Windows of `patch_len` every `stride` samples, optionally padded at the end.
    pub fn sliding_window(cfg: &ModelConfig, b_cls: bool, rng: &mut StdRng) -> Result<Self, ModelError> {
        let encoder = PatchEncoder::new(cfg.patch_len, cfg.stride, cfg.pad, C_IN, cfg.inner_dim(), rng)?;
        Self::build(cfg, Domain::Time, TokenEncoder::Patch(encoder), cfg.n_patches_sliding(), b_cls, cfg.e_layers, rng)
    }

    /// STFT frames (`n_patches + 1` of them) projected from `n_fft / 2 + 1` bins.
    pub fn freq(cfg: &ModelConfig, b_cls: bool, rng: &mut StdRng) -> Result<Self, ModelError> {
        cfg.require_whole_patches()?;
        let encoder = Linear::new(cfg.n_freq_bins(), cfg.inner_dim(), rng);
        Self::build(cfg, Domain::Freq, TokenEncoder::Spectral(encoder), cfg.n_patches() + 1, b_cls, cfg.e_layers, rng)
    }

    fn build(
        cfg: &ModelConfig,
        domain: Domain,
        encoder: TokenEncoder,
        i_tokens: usize,
        b_cls: bool,
        i_layers: usize,
        rng: &mut StdRng,
    ) -> Result<Self, ModelError> {
        if i_tokens == 0 {
            return Err(ModelError::InvalidConfig("transformer_has_no_tokens".to_string()));
        }
        let i_dim = cfg.inner_dim();
        let i_positions = if b_cls { i_tokens + 1 } else { i_tokens };

        Ok(Self {
            domain,
            i_tokens,
            encoder,
            pos_embedding: Embedding::randn(i_positions, i_dim, rng),
            cls_token: if b_cls { Some(Embedding::randn(1, i_dim, rng)) } else { None },
            emb_dropout: Dropout::new(cfg.emb_dropout, child_rng(rng)),
            v_blocks: AttentionBlock::stack(&block_spec_from_config(cfg), i_layers, rng)?,
            b_output_attentions: cfg.output_attentions,
        })
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Sequence length of the output, CLS included.
    pub fn output_len(&self) -> usize {
        self.i_tokens + usize::from(self.cls_token.is_some())
    }

    pub fn num_blocks(&self) -> usize {
        self.v_blocks.len()
    }

    /// Returns the encoded sequence (CLS last when present) and, when enabled,
    /// the attention maps of every block.
    pub fn forward_with_attentions(
        &mut self,
        a_input: &Array2<f32>,
    ) -> Result<(Array2<f32>, Option<AttentionMaps>), ModelError> {
        let a_tokens = match &mut self.encoder {
            TokenEncoder::Patch(enc) => enc.forward(a_input)?,
            TokenEncoder::Spectral(proj) => proj.forward(a_input)?,
        };
        if a_tokens.nrows() != self.i_tokens {
            return Err(ModelError::shape("transformer_tokens", self.i_tokens, a_tokens.nrows()));
        }

        let a_tokens = self.pos_embedding.forward(&a_tokens)?;
        let mut a_seq = match &self.cls_token {
            Some(cls) => {
                let a_cls_pos = cls.table() + &self.pos_embedding.slice_rows(self.i_tokens, self.i_tokens + 1)?;
                concat_rows(&[&a_tokens, &a_cls_pos])?
            }
            None => a_tokens,
        };
        a_seq = self.emb_dropout.apply(&a_seq);

        let mut v_maps: AttentionMaps = Vec::new();
        for block in self.v_blocks.iter_mut() {
            let (a_next, a_w) = block.forward_with_context(&a_seq, None)?;
            a_seq = a_next;
            if self.b_output_attentions {
                v_maps.push(a_w);
            }
        }

        let opt_maps = if self.b_output_attentions { Some(v_maps) } else { None };
        Ok((a_seq, opt_maps))
    }
}

impl Layer for Transformer {
    fn layer_type(&self) -> &str {
        match self.domain {
            Domain::Time => "TimeTransformer",
            Domain::Freq => "FreqTransformer",
        }
    }

    fn forward(&mut self, a_input: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        self.forward_with_attentions(a_input).map(|(a_seq, _)| a_seq)
    }

    fn params(&self) -> Vec<&Array2<f32>> {
        let mut v = match &self.encoder {
            TokenEncoder::Patch(enc) => enc.params(),
            TokenEncoder::Spectral(proj) => proj.params(),
        };
        v.extend(self.pos_embedding.params());
        if let Some(cls) = &self.cls_token {
            v.extend(cls.params());
        }
        for block in self.v_blocks.iter() {
            v.extend(block.params());
        }
        v
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        let mut v = match &mut self.encoder {
            TokenEncoder::Patch(enc) => enc.params_mut(),
            TokenEncoder::Spectral(proj) => proj.params_mut(),
        };
        v.extend(self.pos_embedding.params_mut());
        if let Some(cls) = &mut self.cls_token {
            v.extend(cls.params_mut());
        }
        for block in self.v_blocks.iter_mut() {
            v.extend(block.params_mut());
        }
        v
    }

    fn set_training(&mut self, b_training: bool) {
        self.emb_dropout.set_training(b_training);
        for block in self.v_blocks.iter_mut() {
            block.set_training(b_training);
        }
    }
}

// ----------------------------------------
// CrossDomainTransformer
// ----------------------------------------

pub struct CrossDomainTransformer {
    v_blocks: Vec<AttentionBlock>,
}

impl CrossDomainTransformer {
    pub fn new(cfg: &ModelConfig, rng: &mut StdRng) -> Result<Self, ModelError> {
        if cfg.ca_layers == 0 {
            return Err(ModelError::InvalidConfig("ca_layers_must_be_positive".to_string()));
        }
        Ok(Self {
            v_blocks: AttentionBlock::stack(&block_spec_from_config(cfg), cfg.ca_layers, rng)?,
        })
    }

    pub fn num_blocks(&self) -> usize {
        self.v_blocks.len()
    }

    /// Time tokens attend to frequency tokens; output keeps the time sequence length.
    pub fn forward_with_context(
        &mut self,
        a_time: &Array2<f32>,
        a_freq: &Array2<f32>,
    ) -> Result<Array2<f32>, ModelError> {
        let mut a_seq = a_time.clone();
        for block in self.v_blocks.iter_mut() {
            a_seq = block.forward_with_context(&a_seq, Some(a_freq))?.0;
        }
        Ok(a_seq)
    }
}

impl Layer for CrossDomainTransformer {
    fn layer_type(&self) -> &str {
        "CrossDomainTransformer"
    }

    // Without a context the blocks fall back to self attention.
    fn forward(&mut self, a_input: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        let mut a_seq = a_input.clone();
        for block in self.v_blocks.iter_mut() {
            a_seq = block.forward(&a_seq)?;
        }
        Ok(a_seq)
    }

    fn params(&self) -> Vec<&Array2<f32>> {
        self.v_blocks.iter().flat_map(|b| b.params()).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        self.v_blocks.iter_mut().flat_map(|b| b.params_mut()).collect()
    }

    fn set_training(&mut self, b_training: bool) {
        for block in self.v_blocks.iter_mut() {
            block.set_training(b_training);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::randn;
    use rand::SeedableRng;

    fn small_config() -> ModelConfig {
        ModelConfig {
            d_model: 8,
            n_heads: 2,
            d_ff: 16,
            seq_len: 64,
            patch_len: 8,
            stride: 4,
            pad: true,
            e_layers: 2,
            ca_layers: 1,
            n_fft: 16,
            output_attentions: true,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_time_transformer_appends_cls() {
        let cfg = small_config();
        let mut rng = StdRng::seed_from_u64(1);
        let mut tr = Transformer::time(&cfg, true, &mut rng).unwrap();
        tr.set_training(false);
        assert_eq!(tr.output_len(), 9);
        let (a_seq, opt_maps) = tr.forward_with_attentions(&Array2::ones((1, 64))).unwrap();
        assert_eq!(a_seq.shape(), &[9, 8]);
        let v_maps = opt_maps.unwrap();
        assert_eq!(v_maps.len(), 2);
        assert_eq!(v_maps[0].shape(), &[2, 9, 9]);
    }

    #[test]
    fn test_sliding_window_token_count() {
        let cfg = small_config();
        let mut rng = StdRng::seed_from_u64(2);
        let mut tr = Transformer::sliding_window(&cfg, true, &mut rng).unwrap();
        // (64 - 8) / 4 + 1 = 15, plus padding window, plus CLS
        assert_eq!(tr.output_len(), 17);
        assert_eq!(tr.forward(&Array2::zeros((1, 64))).unwrap().shape(), &[17, 8]);
    }

    #[test]
    fn test_freq_transformer_without_cls() {
        let cfg = small_config();
        let mut rng = StdRng::seed_from_u64(3);
        let mut tr = Transformer::freq(&cfg, false, &mut rng).unwrap();
        assert_eq!(tr.domain(), Domain::Freq);
        assert_eq!(tr.output_len(), 9);
        assert_eq!(tr.forward(&Array2::ones((9, 9))).unwrap().shape(), &[9, 8]);
        assert!(tr.forward(&Array2::ones((8, 9))).is_err());
    }

    #[test]
    fn test_cross_domain_keeps_query_length() {
        let cfg = small_config();
        let mut rng = StdRng::seed_from_u64(4);
        let mut cd = CrossDomainTransformer::new(&cfg, &mut rng).unwrap();
        let a_time = randn((9, 8), &mut rng);
        let a_freq = randn((5, 8), &mut rng);
        assert_eq!(cd.forward_with_context(&a_time, &a_freq).unwrap().shape(), &[9, 8]);
        assert_eq!(cd.num_blocks(), 1);
    }

    #[test]
    fn test_parameter_count_includes_embeddings() {
        let cfg = ModelConfig { output_attentions: false, ..small_config() };
        let mut rng = StdRng::seed_from_u64(5);
        let with_cls = Transformer::time(&cfg, true, &mut rng).unwrap();
        let without_cls = Transformer::time(&cfg, false, &mut rng).unwrap();
        // CLS token plus its position row
        assert_eq!(with_cls.parameters() - without_cls.parameters(), 2 * 8);
    }
}
