// math.rs
// Description: Numerical helpers for softmax, activations, argmax, cross entropy and
//              safe means, with stable handling of non-finite values.
// History:
// - 2026-10-12: Keep row softmax and cross entropy, drop gradient helpers (inference only).
// - 2026-10-13: Add GELU, argmax over logits rows and mean helpers for meters.

use ndarray::Array2;

use crate::config::Activation;

pub fn softmax_rows(a_logits: &Array2<f32>) -> Array2<f32> {
    let mut a_result = a_logits.clone();

    for mut a_row in a_result.rows_mut() {
        let d_max = a_row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        a_row.mapv_inplace(|x| (x - d_max).exp());
        let d_sum: f32 = a_row.sum();

        if !d_sum.is_finite() || d_sum <= 0.0 {
            let d_uniform = 1.0 / (a_row.len() as f32).max(1.0);
            a_row.fill(d_uniform);
            continue;
        }

        a_row.mapv_inplace(|x| x / d_sum);
    }

    a_result
}

// tanh approximation of GELU.
pub fn gelu(d_x: f32) -> f32 {
    const D_SQRT_2_OVER_PI: f32 = 0.797_884_6;
    0.5 * d_x * (1.0 + (D_SQRT_2_OVER_PI * (d_x + 0.044_715 * d_x * d_x * d_x)).tanh())
}

pub fn activate(a_x: &Array2<f32>, activation: Activation) -> Array2<f32> {
    match activation {
        Activation::Gelu => a_x.mapv(gelu),
        Activation::Relu => a_x.mapv(|x| x.max(0.0)),
    }
}

/// Index of the largest entry of each row; the first one wins on ties and NaN never wins.
pub fn argmax_rows(a_x: &Array2<f32>) -> Vec<usize> {
    a_x.rows()
        .into_iter()
        .map(|a_row| {
            let mut i_best = 0usize;
            let mut d_best = f32::NEG_INFINITY;
            for (j, &d) in a_row.iter().enumerate() {
                if d > d_best {
                    d_best = d;
                    i_best = j;
                }
            }
            i_best
        })
        .collect()
}

pub fn cross_entropy_loss(a_logits: &Array2<f32>, v_target: &[usize]) -> f32 {
    if a_logits.nrows() == 0 || a_logits.ncols() == 0 || v_target.is_empty() {
        return 0.0;
    }

    let a_probs = softmax_rows(a_logits);
    let i_rows = a_probs.nrows().min(v_target.len());
    let i_classes = a_probs.ncols();

    let mut d_loss: f32 = 0.0;
    for i in 0..i_rows {
        let i_tgt = v_target[i];
        if i_tgt >= i_classes {
            continue;
        }
        d_loss -= a_probs[[i, i_tgt]].max(1e-15).ln();
    }

    d_loss / (i_rows as f32).max(1.0)
}

pub fn mean_safe_f64(v_x: &[f64]) -> f64 {
    let mut d_sum: f64 = 0.0;
    let mut d_cnt: f64 = 0.0;
    for &d in v_x.iter() {
        if d.is_finite() {
            d_sum += d;
            d_cnt += 1.0;
        }
    }
    if d_cnt <= 0.0 {
        0.0
    } else {
        d_sum / d_cnt
    }
}
