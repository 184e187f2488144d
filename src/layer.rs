// layer.rs
// Description: Model layers for the epoch transformers (forward pass only).
//              Implements linear projections, layer and RMS normalization, dropout,
//              stochastic depth, feed forward, multi head self and cross attention,
//              pre norm attention blocks, patch encoders and the classification head.
//
//              Convention: one sample at a time, tokens as rows.
//              - raw trace input: [channels, length]
//              - token sequences: [tokens, dim]
//              - attention weights: [heads, queries, keys]
//
// History:
// - 2026-10-12: Rework layer stack for EEG/EMG epoch classification; drop vocab, embeddings
//              and optimizer state (training loop is external).
// - 2026-10-13: Add context input to attention for cross domain fusion.
// - 2026-10-14: Add PatchEncoder with stride and replication padding, DropPath and ClsHead.

use ndarray::{concatenate, s, Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::config::{Activation, NormType};
use crate::error::ModelError;
use crate::math;

pub const DEFAULT_INIT_STD: f32 = 0.02;
pub const NORM_EPSILON: f32 = 1e-5;

// ----------------------------------------
// Layer trait
// ----------------------------------------

pub trait Layer {
    fn layer_type(&self) -> &str;

    fn forward(&mut self, a_input: &Array2<f32>) -> Result<Array2<f32>, ModelError>;

    // Parameter tensors in a fixed order; checkpoints depend on it.
    fn params(&self) -> Vec<&Array2<f32>>;
    fn params_mut(&mut self) -> Vec<&mut Array2<f32>>;

    fn parameters(&self) -> usize {
        self.params().iter().map(|a| a.len()).sum()
    }

    fn set_training(&mut self, _b_training: bool) {}
}

// ----------------------------------------
// Initialization
// ----------------------------------------

/// Normal samples redrawn until they fall inside two standard deviations.
pub fn trunc_normal(t_shape: (usize, usize), d_std: f32, rng: &mut StdRng) -> Array2<f32> {
    let normal = match Normal::new(0.0_f32, d_std) {
        Ok(n) => n,
        Err(_) => return Array2::zeros(t_shape),
    };
    let d_limit = 2.0 * d_std;
    Array2::from_shape_fn(t_shape, |_| loop {
        let d = normal.sample(rng);
        if d.abs() <= d_limit {
            break d;
        }
    })
}

pub fn randn(t_shape: (usize, usize), rng: &mut StdRng) -> Array2<f32> {
    Array2::from_shape_fn(t_shape, |_| StandardNormal.sample(rng))
}

pub fn child_rng(rng: &mut StdRng) -> StdRng {
    StdRng::seed_from_u64(rng.random::<u64>())
}

pub fn concat_rows(v_parts: &[&Array2<f32>]) -> Result<Array2<f32>, ModelError> {
    let v_views: Vec<_> = v_parts.iter().map(|a| a.view()).collect();
    concatenate(Axis(0), &v_views)
        .map_err(|e| ModelError::shape("concat_rows", "equal column counts", e))
}

pub fn concat_cols(v_parts: &[&Array2<f32>]) -> Result<Array2<f32>, ModelError> {
    let v_views: Vec<_> = v_parts.iter().map(|a| a.view()).collect();
    concatenate(Axis(1), &v_views)
        .map_err(|e| ModelError::shape("concat_cols", "equal row counts", e))
}

// ----------------------------------------
// Dropout (inverted)
// ----------------------------------------

#[derive(Clone, Debug)]
pub struct Dropout {
    d_p: f32,
    b_training: bool,
    rng: StdRng,
}

impl Dropout {
    pub fn new(d_p: f32, rng: StdRng) -> Self {
        let d_pp = if d_p.is_finite() { d_p.clamp(0.0, 0.95) } else { 0.0 };
        Self {
            d_p: d_pp,
            b_training: true,
            rng,
        }
    }

    pub fn set_training(&mut self, b_training: bool) {
        self.b_training = b_training;
    }

    // y = x * mask / (1 - p)
    pub fn apply(&mut self, a_x: &Array2<f32>) -> Array2<f32> {
        if !self.b_training || self.d_p <= 0.0 || a_x.is_empty() {
            return a_x.clone();
        }

        let d_keep = 1.0 - self.d_p;
        let d_scale = 1.0 / d_keep;
        let mut a_out = a_x.clone();

        for d in a_out.iter_mut() {
            let d_u: f32 = self.rng.random_range(0.0..1.0);
            *d = if d_u < d_keep { *d * d_scale } else { 0.0 };
        }

        a_out
    }
}

// ----------------------------------------
// DropPath (stochastic depth on a residual branch)
// ----------------------------------------

#[derive(Clone, Debug)]
pub struct DropPath {
    d_p: f32,
    b_training: bool,
    rng: StdRng,
}

impl DropPath {
    pub fn new(d_p: f32, rng: StdRng) -> Self {
        let d_pp = if d_p.is_finite() { d_p.clamp(0.0, 0.95) } else { 0.0 };
        Self {
            d_p: d_pp,
            b_training: true,
            rng,
        }
    }

    pub fn set_training(&mut self, b_training: bool) {
        self.b_training = b_training;
    }

    // Whole branch of one sample is kept or dropped together.
    pub fn apply(&mut self, a_branch: Array2<f32>) -> Array2<f32> {
        if !self.b_training || self.d_p <= 0.0 {
            return a_branch;
        }
        let d_keep = 1.0 - self.d_p;
        let d_u: f32 = self.rng.random_range(0.0..1.0);
        if d_u < d_keep {
            a_branch / d_keep
        } else {
            Array2::zeros(a_branch.raw_dim())
        }
    }
}

// ----------------------------------------
// Linear
// ----------------------------------------

pub struct Linear {
    w: Array2<f32>,
    b: Array2<f32>,
}

impl Linear {
    pub fn new(i_in: usize, i_out: usize, rng: &mut StdRng) -> Self {
        Self {
            w: trunc_normal((i_in, i_out), DEFAULT_INIT_STD, rng),
            b: Array2::zeros((1, i_out)),
        }
    }

    pub fn in_dim(&self) -> usize {
        self.w.nrows()
    }

    pub fn out_dim(&self) -> usize {
        self.w.ncols()
    }
}

impl Layer for Linear {
    fn layer_type(&self) -> &str {
        "Linear"
    }

    fn forward(&mut self, a_input: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        if a_input.ncols() != self.w.nrows() {
            return Err(ModelError::shape(
                "linear_input",
                format!("[_, {}]", self.w.nrows()),
                format!("{:?}", a_input.shape()),
            ));
        }
        Ok(a_input.dot(&self.w) + &self.b)
    }

    fn params(&self) -> Vec<&Array2<f32>> {
        vec![&self.w, &self.b]
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        vec![&mut self.w, &mut self.b]
    }
}

// ----------------------------------------
// Embedding (learned table: positions, trace ids, CLS tokens)
// ----------------------------------------

pub struct Embedding {
    a_table: Array2<f32>,
}

impl Embedding {
    pub fn randn(i_rows: usize, i_dim: usize, rng: &mut StdRng) -> Self {
        Self {
            a_table: randn((i_rows, i_dim), rng),
        }
    }

    pub fn table(&self) -> &Array2<f32> {
        &self.a_table
    }

    pub fn rows(&self) -> usize {
        self.a_table.nrows()
    }

    /// Rows `i_start..i_end` as a [rows, dim] tensor.
    pub fn slice_rows(&self, i_start: usize, i_end: usize) -> Result<Array2<f32>, ModelError> {
        if i_start > i_end || i_end > self.a_table.nrows() {
            return Err(ModelError::shape(
                "embedding_rows",
                format!("<= {}", self.a_table.nrows()),
                format!("{}..{}", i_start, i_end),
            ));
        }
        Ok(self.a_table.slice(s![i_start..i_end, ..]).to_owned())
    }
}

impl Layer for Embedding {
    fn layer_type(&self) -> &str {
        "Embedding"
    }

    // Adds the first `tokens` rows of the table (positional use).
    fn forward(&mut self, a_input: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        if a_input.ncols() != self.a_table.ncols() || a_input.nrows() > self.a_table.nrows() {
            return Err(ModelError::shape(
                "embedding_input",
                format!("[<= {}, {}]", self.a_table.nrows(), self.a_table.ncols()),
                format!("{:?}", a_input.shape()),
            ));
        }
        Ok(a_input + &self.a_table.slice(s![..a_input.nrows(), ..]))
    }

    fn params(&self) -> Vec<&Array2<f32>> {
        vec![&self.a_table]
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        vec![&mut self.a_table]
    }
}

// ----------------------------------------
// Norm (LayerNorm or RMSNorm)
// ----------------------------------------

pub struct Norm {
    norm_type: NormType,
    epsilon: f32,
    gamma: Array2<f32>,
    beta: Array2<f32>,
}

impl Norm {
    pub fn new(i_dim: usize, norm_type: NormType) -> Self {
        Self {
            norm_type,
            epsilon: NORM_EPSILON,
            gamma: Array2::ones((1, i_dim)),
            beta: Array2::zeros((1, i_dim)),
        }
    }
}

impl Layer for Norm {
    fn layer_type(&self) -> &str {
        match self.norm_type {
            NormType::Layer => "LayerNorm",
            NormType::Rms => "RmsNorm",
        }
    }

    fn forward(&mut self, a_input: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        if a_input.ncols() != self.gamma.ncols() {
            return Err(ModelError::shape(
                "norm_input",
                format!("[_, {}]", self.gamma.ncols()),
                format!("{:?}", a_input.shape()),
            ));
        }

        let mut a_out = a_input.clone();
        for mut a_row in a_out.rows_mut() {
            let d_n = (a_row.len() as f32).max(1.0);
            match self.norm_type {
                NormType::Layer => {
                    let d_mean = a_row.sum() / d_n;
                    let d_var = a_row.iter().map(|&x| (x - d_mean) * (x - d_mean)).sum::<f32>() / d_n;
                    let d_inv = 1.0 / (d_var + self.epsilon).sqrt();
                    a_row.mapv_inplace(|x| (x - d_mean) * d_inv);
                }
                NormType::Rms => {
                    let d_mean_sq = a_row.iter().map(|&x| x * x).sum::<f32>() / d_n;
                    let d_inv = 1.0 / (d_mean_sq + self.epsilon).sqrt().max(1e-12);
                    a_row.mapv_inplace(|x| x * d_inv);
                }
            }
        }

        let a_scaled = a_out * &self.gamma;
        Ok(match self.norm_type {
            NormType::Layer => a_scaled + &self.beta,
            NormType::Rms => a_scaled,
        })
    }

    fn params(&self) -> Vec<&Array2<f32>> {
        match self.norm_type {
            NormType::Layer => vec![&self.gamma, &self.beta],
            NormType::Rms => vec![&self.gamma],
        }
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        match self.norm_type {
            NormType::Layer => vec![&mut self.gamma, &mut self.beta],
            NormType::Rms => vec![&mut self.gamma],
        }
    }
}

// ----------------------------------------
// FeedForward
// ----------------------------------------

pub struct FeedForward {
    fc1: Linear,
    fc2: Linear,
    activation: Activation,
    dropout: Dropout,
}

impl FeedForward {
    pub fn new(i_dim: usize, i_mult: usize, activation: Activation, d_dropout: f32, rng: &mut StdRng) -> Self {
        let i_hidden = i_dim * i_mult.max(1);
        Self {
            fc1: Linear::new(i_dim, i_hidden, rng),
            fc2: Linear::new(i_hidden, i_dim, rng),
            activation,
            dropout: Dropout::new(d_dropout, child_rng(rng)),
        }
    }
}

impl Layer for FeedForward {
    fn layer_type(&self) -> &str {
        "FeedForward"
    }

    fn forward(&mut self, a_input: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        let a_hidden = math::activate(&self.fc1.forward(a_input)?, self.activation);
        let a_hidden = self.dropout.apply(&a_hidden);
        let a_out = self.fc2.forward(&a_hidden)?;
        Ok(self.dropout.apply(&a_out))
    }

    fn params(&self) -> Vec<&Array2<f32>> {
        let mut v = self.fc1.params();
        v.extend(self.fc2.params());
        v
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        let mut v = self.fc1.params_mut();
        v.extend(self.fc2.params_mut());
        v
    }

    fn set_training(&mut self, b_training: bool) {
        self.dropout.set_training(b_training);
    }
}

// ----------------------------------------
// MultiHeadAttention (self or cross, no mask)
// ----------------------------------------

pub struct MultiHeadAttention {
    i_dim: usize,
    i_num_heads: usize,
    i_head_dim: usize,

    to_q: Linear,
    to_k: Linear,
    to_v: Linear,
    to_out: Linear,

    attn_dropout: Dropout,
}

impl MultiHeadAttention {
    pub fn new(i_dim: usize, i_num_heads: usize, i_head_dim: usize, d_dropout: f32, rng: &mut StdRng) -> Result<Self, ModelError> {
        if i_dim == 0 || i_num_heads == 0 || i_head_dim == 0 {
            return Err(ModelError::InvalidConfig("attention_dims_must_be_positive".to_string()));
        }
        let i_inner = i_num_heads * i_head_dim;
        Ok(Self {
            i_dim,
            i_num_heads,
            i_head_dim,
            to_q: Linear::new(i_dim, i_inner, rng),
            to_k: Linear::new(i_dim, i_inner, rng),
            to_v: Linear::new(i_dim, i_inner, rng),
            to_out: Linear::new(i_inner, i_dim, rng),
            attn_dropout: Dropout::new(d_dropout, child_rng(rng)),
        })
    }

    /// Queries come from `a_x`, keys and values from `opt_context` (or `a_x` when absent).
    pub fn forward_with_context(
        &mut self,
        a_x: &Array2<f32>,
        opt_context: Option<&Array2<f32>>,
    ) -> Result<(Array2<f32>, Array3<f32>), ModelError> {
        let a_ctx = opt_context.unwrap_or(a_x);
        if a_x.ncols() != self.i_dim || a_ctx.ncols() != self.i_dim {
            return Err(ModelError::shape(
                "attention_input",
                format!("[_, {}]", self.i_dim),
                format!("{:?} / {:?}", a_x.shape(), a_ctx.shape()),
            ));
        }

        let a_q = self.to_q.forward(a_x)?;
        let a_k = self.to_k.forward(a_ctx)?;
        let a_v = self.to_v.forward(a_ctx)?;

        let i_nq = a_q.nrows();
        let i_nk = a_k.nrows();
        let d_scale = (self.i_head_dim as f32).sqrt().max(1e-12);

        let mut a_weights = Array3::<f32>::zeros((self.i_num_heads, i_nq, i_nk));
        let mut a_concat = Array2::<f32>::zeros((i_nq, self.i_num_heads * self.i_head_dim));

        for i_h in 0..self.i_num_heads {
            let i_start = i_h * self.i_head_dim;
            let i_end = i_start + self.i_head_dim;

            let a_qh = a_q.slice(s![.., i_start..i_end]);
            let a_kh = a_k.slice(s![.., i_start..i_end]);
            let a_vh = a_v.slice(s![.., i_start..i_end]);

            let a_scores = a_qh.dot(&a_kh.t()) / d_scale;
            let a_w = math::softmax_rows(&a_scores);
            a_weights.index_axis_mut(Axis(0), i_h).assign(&a_w);

            let a_w_dropped = self.attn_dropout.apply(&a_w);
            a_concat
                .slice_mut(s![.., i_start..i_end])
                .assign(&a_w_dropped.dot(&a_vh));
        }

        let a_out = self.to_out.forward(&a_concat)?;
        Ok((a_out, a_weights))
    }
}

impl Layer for MultiHeadAttention {
    fn layer_type(&self) -> &str {
        "MultiHeadAttention"
    }

    fn forward(&mut self, a_input: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        self.forward_with_context(a_input, None).map(|(a_out, _)| a_out)
    }

    fn params(&self) -> Vec<&Array2<f32>> {
        let mut v = self.to_q.params();
        v.extend(self.to_k.params());
        v.extend(self.to_v.params());
        v.extend(self.to_out.params());
        v
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        let mut v = self.to_q.params_mut();
        v.extend(self.to_k.params_mut());
        v.extend(self.to_v.params_mut());
        v.extend(self.to_out.params_mut());
        v
    }

    fn set_training(&mut self, b_training: bool) {
        self.attn_dropout.set_training(b_training);
    }
}

// ----------------------------------------
// AttentionBlock (pre norm: attention + feed forward, both residual)
// ----------------------------------------

#[derive(Clone, Debug)]
pub struct BlockSpec {
    pub i_dim: usize,
    pub i_num_heads: usize,
    pub i_head_dim: usize,
    pub i_mult: usize,
    pub d_dropout: f32,
    pub d_path_drop: f32,
    pub activation: Activation,
    pub norm_type: NormType,
}

pub struct AttentionBlock {
    norm_attn: Norm,
    norm_ctx: Norm,
    attention: MultiHeadAttention,
    drop_path_attn: DropPath,
    norm_ff: Norm,
    feed_forward: FeedForward,
    drop_path_ff: DropPath,
}

impl AttentionBlock {
    pub fn new(spec: &BlockSpec, rng: &mut StdRng) -> Result<Self, ModelError> {
        Ok(Self {
            norm_attn: Norm::new(spec.i_dim, spec.norm_type),
            norm_ctx: Norm::new(spec.i_dim, spec.norm_type),
            attention: MultiHeadAttention::new(spec.i_dim, spec.i_num_heads, spec.i_head_dim, spec.d_dropout, rng)?,
            drop_path_attn: DropPath::new(spec.d_path_drop, child_rng(rng)),
            norm_ff: Norm::new(spec.i_dim, spec.norm_type),
            feed_forward: FeedForward::new(spec.i_dim, spec.i_mult, spec.activation, spec.d_dropout, rng),
            drop_path_ff: DropPath::new(spec.d_path_drop, child_rng(rng)),
        })
    }

    /// Builds `i_layers` blocks with the drop path rate rising linearly to `spec.d_path_drop`.
    pub fn stack(spec: &BlockSpec, i_layers: usize, rng: &mut StdRng) -> Result<Vec<Self>, ModelError> {
        (0..i_layers)
            .map(|i_idx| {
                let d_rate = if i_layers > 1 {
                    spec.d_path_drop * i_idx as f32 / (i_layers - 1) as f32
                } else {
                    spec.d_path_drop
                };
                let layer_spec = BlockSpec { d_path_drop: d_rate, ..spec.clone() };
                AttentionBlock::new(&layer_spec, rng)
            })
            .collect()
    }

    pub fn forward_with_context(
        &mut self,
        a_x: &Array2<f32>,
        opt_context: Option<&Array2<f32>>,
    ) -> Result<(Array2<f32>, Array3<f32>), ModelError> {
        let a_xn = self.norm_attn.forward(a_x)?;
        let (a_attn, a_weights) = match opt_context {
            Some(a_ctx) => {
                let a_cn = self.norm_ctx.forward(a_ctx)?;
                self.attention.forward_with_context(&a_xn, Some(&a_cn))?
            }
            None => self.attention.forward_with_context(&a_xn, None)?,
        };
        let a_h = a_x + &self.drop_path_attn.apply(a_attn);

        let a_hn = self.norm_ff.forward(&a_h)?;
        let a_ff = self.feed_forward.forward(&a_hn)?;
        let a_out = &a_h + &self.drop_path_ff.apply(a_ff);

        Ok((a_out, a_weights))
    }
}

impl Layer for AttentionBlock {
    fn layer_type(&self) -> &str {
        "AttentionBlock"
    }

    fn forward(&mut self, a_input: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        self.forward_with_context(a_input, None).map(|(a_out, _)| a_out)
    }

    fn params(&self) -> Vec<&Array2<f32>> {
        let mut v = self.norm_attn.params();
        v.extend(self.norm_ctx.params());
        v.extend(self.attention.params());
        v.extend(self.norm_ff.params());
        v.extend(self.feed_forward.params());
        v
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        let mut v = self.norm_attn.params_mut();
        v.extend(self.norm_ctx.params_mut());
        v.extend(self.attention.params_mut());
        v.extend(self.norm_ff.params_mut());
        v.extend(self.feed_forward.params_mut());
        v
    }

    fn set_training(&mut self, b_training: bool) {
        self.attention.set_training(b_training);
        self.feed_forward.set_training(b_training);
        self.drop_path_attn.set_training(b_training);
        self.drop_path_ff.set_training(b_training);
    }
}

// ----------------------------------------
// PatchEncoder
// ----------------------------------------

pub struct PatchEncoder {
    i_patch_len: usize,
    i_stride: usize,
    b_pad: bool,
    i_channels: usize,
    proj: Linear,
}

impl PatchEncoder {
    pub fn new(
        i_patch_len: usize,
        i_stride: usize,
        b_pad: bool,
        i_channels: usize,
        i_out_dim: usize,
        rng: &mut StdRng,
    ) -> Result<Self, ModelError> {
        if i_patch_len == 0 || i_stride == 0 || i_channels == 0 {
            return Err(ModelError::InvalidConfig("patch_encoder_dims_must_be_positive".to_string()));
        }
        Ok(Self {
            i_patch_len,
            i_stride,
            b_pad,
            i_channels,
            proj: Linear::new(i_patch_len * i_channels, i_out_dim, rng),
        })
    }

    /// Non-overlapping windows.
    pub fn non_overlapping(i_patch_len: usize, i_channels: usize, i_out_dim: usize, rng: &mut StdRng) -> Result<Self, ModelError> {
        Self::new(i_patch_len, i_patch_len, false, i_channels, i_out_dim, rng)
    }

    pub fn num_patches(&self, i_len: usize) -> usize {
        let i_padded = if self.b_pad { i_len + self.i_stride } else { i_len };
        if i_padded < self.i_patch_len {
            return 0;
        }
        (i_padded - self.i_patch_len) / self.i_stride + 1
    }
}

impl Layer for PatchEncoder {
    fn layer_type(&self) -> &str {
        "PatchEncoder"
    }

    // [channels, length] -> [patches, dim]; padding repeats the last sample.
    fn forward(&mut self, a_input: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        let i_len = a_input.ncols();
        if a_input.nrows() != self.i_channels || i_len < self.i_patch_len {
            return Err(ModelError::shape(
                "patch_encoder_input",
                format!("[{}, >= {}]", self.i_channels, self.i_patch_len),
                format!("{:?}", a_input.shape()),
            ));
        }

        let i_patches = self.num_patches(i_len);
        let mut a_patches = Array2::<f32>::zeros((i_patches, self.i_patch_len * self.i_channels));
        for i_p in 0..i_patches {
            let i_start = i_p * self.i_stride;
            for i_t in 0..self.i_patch_len {
                let i_src = (i_start + i_t).min(i_len - 1);
                for i_c in 0..self.i_channels {
                    a_patches[[i_p, i_t * self.i_channels + i_c]] = a_input[[i_c, i_src]];
                }
            }
        }

        self.proj.forward(&a_patches)
    }

    fn params(&self) -> Vec<&Array2<f32>> {
        self.proj.params()
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        self.proj.params_mut()
    }
}

// ----------------------------------------
// ClsHead (norm + linear over concatenated CLS embeddings)
// ----------------------------------------

pub struct ClsHead {
    norm: Norm,
    fc: Linear,
}

impl ClsHead {
    pub fn new(i_dim: usize, i_channels: usize, i_c_out: usize, rng: &mut StdRng) -> Self {
        let i_in = i_dim * i_channels.max(1);
        Self {
            norm: Norm::new(i_in, NormType::Layer),
            fc: Linear::new(i_in, i_c_out, rng),
        }
    }
}

impl Layer for ClsHead {
    fn layer_type(&self) -> &str {
        "ClsHead"
    }

    fn forward(&mut self, a_input: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        let a_n = self.norm.forward(a_input)?;
        self.fc.forward(&a_n)
    }

    fn params(&self) -> Vec<&Array2<f32>> {
        let mut v = self.norm.params();
        v.extend(self.fc.params());
        v
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        let mut v = self.norm.params_mut();
        v.extend(self.fc.params_mut());
        v
    }
}
