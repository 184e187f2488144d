// data.rs
// Description: Seeded synthetic EEG/EMG epochs for evaluation runs and tests.
//              Each stage gets a characteristic signature: Wake has fast low amplitude
//              EEG with strong EMG tone, SWS slow high amplitude EEG with weak EMG, REM
//              theta EEG with near silent EMG.
// History:
// - 2026-10-17: Add SleepStage and SyntheticEpochs.

use std::f32::consts::PI;
use std::fmt;

use ndarray::{Array1, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::error::ModelError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SleepStage {
    Wake,
    Sws,
    Rem,
}

impl SleepStage {
    pub const ALL: [SleepStage; 3] = [SleepStage::Wake, SleepStage::Sws, SleepStage::Rem];

    pub fn index(&self) -> usize {
        match self {
            SleepStage::Wake => 0,
            SleepStage::Sws => 1,
            SleepStage::Rem => 2,
        }
    }

    pub fn from_index(i_idx: usize) -> Option<Self> {
        Self::ALL.get(i_idx).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            SleepStage::Wake => "Wake",
            SleepStage::Sws => "SWS",
            SleepStage::Rem => "REM",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.name()).collect()
    }

    // (eeg frequency Hz, eeg amplitude, emg noise std)
    fn signature(&self) -> (f32, f32, f32) {
        match self {
            SleepStage::Wake => (20.0, 0.4, 1.0),
            SleepStage::Sws => (1.5, 2.0, 0.2),
            SleepStage::Rem => (6.5, 0.9, 0.05),
        }
    }
}

impl fmt::Display for SleepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct SyntheticEpochs {
    i_seq_len: usize,
    d_sample_rate: f32,
    noise: Normal<f32>,
    rng: StdRng,
}

impl SyntheticEpochs {
    pub fn new(i_seq_len: usize, d_sample_rate: f32, d_noise_std: f32, u_seed: u64) -> Result<Self, ModelError> {
        if i_seq_len == 0 {
            return Err(ModelError::InvalidConfig("seq_len_must_be_positive".to_string()));
        }
        if d_sample_rate.is_nan() || d_sample_rate <= 0.0 {
            return Err(ModelError::InvalidConfig("sample_rate_must_be_positive".to_string()));
        }
        let noise = Normal::new(0.0_f32, d_noise_std)
            .map_err(|e| ModelError::InvalidConfig(format!("noise_std: {}", e)))?;
        Ok(Self {
            i_seq_len,
            d_sample_rate,
            noise,
            rng: StdRng::seed_from_u64(u_seed),
        })
    }

    pub fn seq_len(&self) -> usize {
        self.i_seq_len
    }

    /// EEG and EMG traces of one epoch of the given stage.
    pub fn epoch(&mut self, stage: SleepStage) -> (Array1<f32>, Array1<f32>) {
        let (d_freq, d_amp, d_emg_std) = stage.signature();
        let d_phase: f32 = self.rng.random_range(0.0..2.0 * PI);
        let d_jitter: f32 = self.rng.random_range(0.9..1.1);

        let mut a_eeg = Array1::<f32>::zeros(self.i_seq_len);
        let mut a_emg = Array1::<f32>::zeros(self.i_seq_len);
        for i_t in 0..self.i_seq_len {
            let d_time = i_t as f32 / self.d_sample_rate;
            a_eeg[i_t] = d_amp * (2.0 * PI * d_freq * d_jitter * d_time + d_phase).sin() + self.noise.sample(&mut self.rng);
            let d_z: f32 = StandardNormal.sample(&mut self.rng);
            a_emg[i_t] = d_emg_std * d_z + self.noise.sample(&mut self.rng);
        }
        (a_eeg, a_emg)
    }

    /// `[batch, 2, 1, seq_len]` plus one stage label per sample.
    pub fn next_batch(&mut self, i_batch: usize) -> (Array4<f32>, Vec<usize>) {
        let mut a_x = Array4::<f32>::zeros((i_batch, 2, 1, self.i_seq_len));
        let mut v_labels: Vec<usize> = Vec::with_capacity(i_batch);
        for i_sample in 0..i_batch {
            let i_label = self.rng.random_range(0..SleepStage::ALL.len());
            let stage = SleepStage::ALL[i_label];
            let (a_eeg, a_emg) = self.epoch(stage);
            a_x.slice_mut(ndarray::s![i_sample, 0, 0, ..]).assign(&a_eeg);
            a_x.slice_mut(ndarray::s![i_sample, 1, 0, ..]).assign(&a_emg);
            v_labels.push(i_label);
        }
        (a_x, v_labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_index_round_trip() {
        for stage in SleepStage::ALL {
            assert_eq!(SleepStage::from_index(stage.index()), Some(stage));
        }
        assert_eq!(SleepStage::from_index(3), None);
        assert_eq!(SleepStage::names(), vec!["Wake", "SWS", "REM"]);
    }

    #[test]
    fn test_batch_shape_and_labels() {
        let mut synth = SyntheticEpochs::new(128, 64.0, 0.1, 5).unwrap();
        let (a_x, v_labels) = synth.next_batch(6);
        assert_eq!(a_x.shape(), &[6, 2, 1, 128]);
        assert_eq!(v_labels.len(), 6);
        assert!(v_labels.iter().all(|&i| i < 3));
    }

    #[test]
    fn test_same_seed_same_batches() {
        let mut g1 = SyntheticEpochs::new(64, 64.0, 0.1, 9).unwrap();
        let mut g2 = SyntheticEpochs::new(64, 64.0, 0.1, 9).unwrap();
        assert_eq!(g1.next_batch(3), g2.next_batch(3));
    }

    #[test]
    fn test_emg_tone_orders_stages() {
        let mut synth = SyntheticEpochs::new(512, 128.0, 0.05, 3).unwrap();
        let mut power = |stage: SleepStage| {
            let (_, a_emg) = synth.epoch(stage);
            a_emg.mapv(|d| d * d).mean().unwrap_or(0.0)
        };
        let d_wake = power(SleepStage::Wake);
        let d_sws = power(SleepStage::Sws);
        let d_rem = power(SleepStage::Rem);
        assert!(d_wake > d_sws);
        assert!(d_sws > d_rem);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(SyntheticEpochs::new(0, 64.0, 0.1, 1).is_err());
        assert!(SyntheticEpochs::new(64, 0.0, 0.1, 1).is_err());
        assert!(SyntheticEpochs::new(64, 64.0, -1.0, 1).is_err());
    }
}
