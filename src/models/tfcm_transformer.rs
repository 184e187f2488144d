// models/tfcm_transformer.rs
// Description: Time/frequency cross modal transformer.
//              Each trace is encoded twice: as patched raw samples (time domain, CLS token)
//              and as STFT magnitude frames (frequency domain, no CLS). A shared cross domain
//              transformer lets the time tokens attend to the frequency tokens of the same
//              trace; the fused EEG and EMG CLS outputs are concatenated for the head.
// History:
// - 2026-10-15: Add TfcmTransformer.

use ndarray::{Array2, Array4};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::freq::Stft;
use crate::layer::{concat_cols, concat_rows, ClsHead, Layer};
use crate::models::{check_batch, emg_trace, last_row, trace_of, EpochModel, ModelOutput, EEG_TRACE};
use crate::transformer::{CrossDomainTransformer, Transformer};

pub struct TfcmTransformer {
    stft: Stft,
    eeg_transformer: Transformer,
    emg_transformer: Transformer,
    eeg_stft_transformer: Transformer,
    emg_stft_transformer: Transformer,
    cd_transformer: CrossDomainTransformer,
    mlp_head: ClsHead,
    cfg: ModelConfig,
}

impl TfcmTransformer {
    pub fn new(cfg: &ModelConfig) -> Result<Self, ModelError> {
        cfg.require_whole_patches()?;
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        Ok(Self {
            stft: Stft::new(cfg.patch_len, cfg.n_fft, cfg.patch_len)?,
            eeg_transformer: Transformer::time(cfg, true, &mut rng)?,
            emg_transformer: Transformer::time(cfg, true, &mut rng)?,
            eeg_stft_transformer: Transformer::freq(cfg, false, &mut rng)?,
            emg_stft_transformer: Transformer::freq(cfg, false, &mut rng)?,
            cd_transformer: CrossDomainTransformer::new(cfg, &mut rng)?,
            mlp_head: ClsHead::new(cfg.inner_dim(), 2, cfg.c_out, &mut rng),
            cfg: cfg.clone(),
        })
    }

    // [1, length] -> [frames, bins]
    fn spectrogram(&self, a_trace: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        let v_signal: Vec<f32> = a_trace.row(0).to_vec();
        self.stft.magnitude(&v_signal)
    }
}

impl EpochModel for TfcmTransformer {
    fn model_type(&self) -> &str {
        "TFCMTransformer"
    }

    fn forward(&mut self, a_x: &Array4<f32>, v_labels: &[usize]) -> Result<ModelOutput, ModelError> {
        let i_batch = check_batch(a_x, v_labels, 2, &self.cfg)?;
        let i_emg = emg_trace(a_x);

        let mut v_emb: Vec<Array2<f32>> = Vec::with_capacity(i_batch);
        for i_sample in 0..i_batch {
            let a_eeg_raw = trace_of(a_x, i_sample, EEG_TRACE);
            let a_emg_raw = trace_of(a_x, i_sample, i_emg);

            let a_eeg = self.eeg_transformer.forward(&a_eeg_raw)?;
            let a_emg = self.emg_transformer.forward(&a_emg_raw)?;

            let a_eeg_freq = self.eeg_stft_transformer.forward(&self.spectrogram(&a_eeg_raw)?)?;
            let a_emg_freq = self.emg_stft_transformer.forward(&self.spectrogram(&a_emg_raw)?)?;

            let a_eeg = self.cd_transformer.forward_with_context(&a_eeg, &a_eeg_freq)?;
            let a_emg = self.cd_transformer.forward_with_context(&a_emg, &a_emg_freq)?;

            v_emb.push(concat_cols(&[&last_row(&a_eeg), &last_row(&a_emg)])?);
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
        self.eeg_transformer.set_training(b_training);
        self.emg_transformer.set_training(b_training);
        self.eeg_stft_transformer.set_training(b_training);
        self.emg_stft_transformer.set_training(b_training);
        self.cd_transformer.set_training(b_training);
    }

    fn components(&self) -> Vec<(&str, &dyn Layer)> {
        let mut v: Vec<(&str, &dyn Layer)> = Vec::new();
        v.push(("eeg_transformer", &self.eeg_transformer));
        v.push(("emg_transformer", &self.emg_transformer));
        v.push(("eeg_stft_transformer", &self.eeg_stft_transformer));
        v.push(("emg_stft_transformer", &self.emg_stft_transformer));
        v.push(("cd_transformer", &self.cd_transformer));
        v.push(("mlp_head", &self.mlp_head));
        v
    }

    fn components_mut(&mut self) -> Vec<&mut dyn Layer> {
        let mut v: Vec<&mut dyn Layer> = Vec::new();
        v.push(&mut self.eeg_transformer);
        v.push(&mut self.emg_transformer);
        v.push(&mut self.eeg_stft_transformer);
        v.push(&mut self.emg_stft_transformer);
        v.push(&mut self.cd_transformer);
        v.push(&mut self.mlp_head);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{random_batch, small_config};

    #[test]
    fn test_forward_shapes() {
        let cfg = small_config();
        let mut model = TfcmTransformer::new(&cfg).unwrap();
        model.set_training(false);
        let out = model.forward(&random_batch(2, &cfg), &[2, 0]).unwrap();
        assert_eq!(out.a_logits.shape(), &[2, 3]);
        assert_eq!(out.a_emb.shape(), &[2, 16]);
    }

    #[test]
    fn test_spectrogram_matches_freq_token_count() {
        let cfg = small_config();
        let model = TfcmTransformer::new(&cfg).unwrap();
        let a_spec = model.spectrogram(&Array2::ones((1, cfg.seq_len))).unwrap();
        assert_eq!(a_spec.shape(), &[cfg.n_patches() + 1, cfg.n_freq_bins()]);
    }

    #[test]
    fn test_patch_longer_than_fft_is_rejected() {
        let cfg = ModelConfig { n_fft: 4, ..small_config() };
        assert!(TfcmTransformer::new(&cfg).is_err());
    }

    #[test]
    fn test_frequency_content_reaches_the_logits() {
        let cfg = small_config();
        let mut model = TfcmTransformer::new(&cfg).unwrap();
        model.set_training(false);
        let a_flat = Array4::<f32>::zeros((1, 2, 1, cfg.seq_len));
        let a_wave = Array4::from_shape_fn((1, 2, 1, cfg.seq_len), |(_, _, _, i)| {
            (i as f32 * 0.7).sin()
        });
        let a1 = model.forward(&a_flat, &[0]).unwrap().a_logits;
        let a2 = model.forward(&a_wave, &[0]).unwrap().a_logits;
        assert_ne!(a1, a2);
    }
}
