// freq.rs
// Description: Short time Fourier transform magnitude for one trace, used to build the
//              frequency domain token sequence of the time/frequency fusion model.
// History:
// - 2026-10-14: Add centered STFT with Hann window and reflect padding.

use std::sync::Arc;

use ndarray::Array2;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::ModelError;

/// STFT magnitude: `1 + len / hop` frames of `n_fft / 2 + 1` bins.
pub struct Stft {
    i_n_fft: usize,
    i_hop: usize,
    v_window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl Stft {
    pub fn new(i_win_length: usize, i_n_fft: usize, i_hop: usize) -> Result<Self, ModelError> {
        if i_n_fft < 2 || i_hop == 0 || i_win_length == 0 {
            return Err(ModelError::InvalidConfig("stft_sizes_must_be_positive".to_string()));
        }
        if i_win_length > i_n_fft {
            return Err(ModelError::InvalidConfig(format!(
                "stft_win_length {} exceeds n_fft {}",
                i_win_length, i_n_fft
            )));
        }

        let mut planner = FftPlanner::<f32>::new();
        Ok(Self {
            i_n_fft,
            i_hop,
            v_window: centered_hann_window(i_win_length, i_n_fft),
            fft: planner.plan_fft_forward(i_n_fft),
        })
    }

    pub fn n_bins(&self) -> usize {
        self.i_n_fft / 2 + 1
    }

    pub fn n_frames(&self, i_len: usize) -> usize {
        1 + i_len / self.i_hop
    }

    pub fn magnitude(&self, v_signal: &[f32]) -> Result<Array2<f32>, ModelError> {
        if v_signal.len() < 2 {
            return Err(ModelError::shape("stft_input", "length >= 2", v_signal.len()));
        }

        let i_half = self.i_n_fft / 2;
        let i_frames = self.n_frames(v_signal.len());
        let i_bins = self.n_bins();

        let mut a_out = Array2::<f32>::zeros((i_frames, i_bins));
        let mut v_buffer = vec![Complex::new(0.0_f32, 0.0); self.i_n_fft];
        let mut v_scratch = vec![Complex::new(0.0_f32, 0.0); self.fft.get_inplace_scratch_len()];

        for i_f in 0..i_frames {
            // Frame i is centered on sample i * hop of the unpadded signal.
            let i_origin = (i_f * self.i_hop) as isize - i_half as isize;
            for (i_k, c) in v_buffer.iter_mut().enumerate() {
                let d_s = v_signal[reflect_index(i_origin + i_k as isize, v_signal.len())];
                *c = Complex::new(d_s * self.v_window[i_k], 0.0);
            }

            self.fft.process_with_scratch(&mut v_buffer, &mut v_scratch);

            for (i_b, c) in v_buffer.iter().take(i_bins).enumerate() {
                a_out[[i_f, i_b]] = c.norm();
            }
        }

        Ok(a_out)
    }
}

// Periodic Hann window of `i_win_length`, zero padded on both sides to `i_n_fft`.
fn centered_hann_window(i_win_length: usize, i_n_fft: usize) -> Vec<f32> {
    let mut v_window = vec![0.0_f32; i_n_fft];
    let i_offset = (i_n_fft - i_win_length) / 2;
    for i in 0..i_win_length {
        let d_phase = 2.0 * std::f32::consts::PI * i as f32 / i_win_length as f32;
        v_window[i_offset + i] = 0.5 - 0.5 * d_phase.cos();
    }
    v_window
}

// Mirror an out of range index back into [0, len) without repeating the edge sample.
fn reflect_index(i_idx: isize, i_len: usize) -> usize {
    let i_len = i_len as isize;
    let i_period = 2 * (i_len - 1);
    let mut i_m = i_idx.rem_euclid(i_period);
    if i_m >= i_len {
        i_m = i_period - i_m;
    }
    i_m as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect_index(-1, 5), 1);
        assert_eq!(reflect_index(-2, 5), 2);
        assert_eq!(reflect_index(5, 5), 3);
        assert_eq!(reflect_index(2, 5), 2);
        assert_eq!(reflect_index(-9, 5), 1);
    }

    #[test]
    fn test_frame_and_bin_counts() {
        let stft = Stft::new(8, 16, 8).unwrap();
        let a = stft.magnitude(&vec![0.0; 64]).unwrap();
        assert_eq!(a.shape(), &[9, 9]);
        assert!(a.iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        let i_n_fft = 32;
        let stft = Stft::new(32, i_n_fft, 16).unwrap();
        // 4 cycles per 32 samples lands on bin 4
        let v: Vec<f32> = (0..256)
            .map(|i| (2.0 * std::f32::consts::PI * 4.0 * i as f32 / i_n_fft as f32).sin())
            .collect();
        let a = stft.magnitude(&v).unwrap();
        let row = a.row(5);
        let i_peak = row
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |acc, (i, &d)| if d > acc.1 { (i, d) } else { acc })
            .0;
        assert_eq!(i_peak, 4);
    }

    #[test]
    fn test_window_is_centered() {
        let v = centered_hann_window(4, 8);
        assert_eq!(v.len(), 8);
        assert_abs_diff_eq!(v[0], 0.0);
        assert_abs_diff_eq!(v[2], 0.0);
        assert_abs_diff_eq!(v[4], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(v[7], 0.0);
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(Stft::new(32, 16, 8).is_err());
        assert!(Stft::new(8, 16, 0).is_err());
        assert!(Stft::new(8, 16, 8).unwrap().magnitude(&[1.0]).is_err());
    }
}
