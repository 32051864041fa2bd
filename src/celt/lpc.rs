//! Linear prediction helpers used by the pitch pre-processing, after
//! `celt/plc.c`.
//!
//! All filters here keep their state in caller-owned memory so that a signal
//! can be processed in several calls without edge effects.

use alloc::vec::Vec;

use crate::celt::types::{OpusVal16, OpusVal32};

/// White-noise bias added to the zero-lag autocorrelation.
const AUTOCORR_NOISE_BIAS: OpusVal32 = 10.0;

/// Levinson-Durbin recursion.
///
/// Fills `lpc` (whose length is the predictor order) from the autocorrelation
/// values `ac[0..=order]`. The recursion stops early once the prediction error
/// is 30 dB below `ac[0]`. An all-zero `ac[0]` yields an all-zero predictor.
pub fn celt_lpc(lpc: &mut [OpusVal16], ac: &[OpusVal32]) {
    let order = lpc.len();
    assert!(ac.len() > order, "autocorrelation must provide order + 1 values");

    lpc.fill(0.0);
    if order == 0 || ac[0] == 0.0 {
        return;
    }

    let mut error = ac[0];
    for i in 0..order {
        let rr = lpc[..i]
            .iter()
            .enumerate()
            .map(|(j, &coef)| coef * ac[i - j])
            .sum::<OpusVal32>()
            + ac[i + 1];
        let r = -rr / error;
        lpc[i] = r;

        for j in 0..(i + 1) >> 1 {
            let tmp1 = lpc[j];
            let tmp2 = lpc[i - 1 - j];
            lpc[j] = tmp1 + r * tmp2;
            lpc[i - 1 - j] = tmp2 + r * tmp1;
        }

        error -= r * r * error;
        if error < 0.001 * ac[0] {
            break;
        }
    }
}

/// In-place FIR filter `y[i] = x[i] + sum_j num[j] * x[i - 1 - j]`.
///
/// `mem` holds the last `num.len()` inputs, most recent first, and is updated
/// so that the next call continues the same signal.
pub fn celt_fir(x: &mut [OpusVal16], num: &[OpusVal16], mem: &mut [OpusVal16]) {
    let ord = num.len();
    assert!(mem.len() >= ord, "FIR memory must hold one value per tap");
    let mem = &mut mem[..ord];

    for sample in x.iter_mut() {
        let input = *sample;
        let sum = num
            .iter()
            .zip(mem.iter())
            .fold(input, |acc, (&coef, &past)| acc + coef * past);
        if ord > 0 {
            mem.copy_within(..ord - 1, 1);
            mem[0] = input;
        }
        *sample = sum;
    }
}

/// In-place all-pole filter `y[i] = x[i] - sum_j den[j] * y[i - 1 - j]`.
///
/// `mem` holds the last `den.len()` outputs, most recent first.
pub fn celt_iir(x: &mut [OpusVal32], den: &[OpusVal16], mem: &mut [OpusVal16]) {
    let ord = den.len();
    assert!(mem.len() >= ord, "IIR memory must hold one value per tap");
    let mem = &mut mem[..ord];

    for sample in x.iter_mut() {
        let sum = den
            .iter()
            .zip(mem.iter())
            .fold(*sample, |acc, (&coef, &past)| acc - coef * past);
        if ord > 0 {
            mem.copy_within(..ord - 1, 1);
            mem[0] = sum;
        }
        *sample = sum;
    }
}

/// Autocorrelation of `x` for lags `0..=lag`, written to `ac`.
///
/// When `window` is given, its coefficients taper the first and last
/// `window.len()` samples symmetrically before correlating. A small constant
/// is added to the zero-lag term so that silence still yields a usable
/// predictor.
pub fn celt_autocorr(
    x: &[OpusVal16],
    ac: &mut [OpusVal32],
    window: Option<&[OpusVal16]>,
    lag: usize,
) {
    let n = x.len();
    assert!(ac.len() > lag, "autocorrelation buffer must hold lag + 1 values");
    assert!(lag < n, "lag must be shorter than the input");

    let mut xx: Vec<OpusVal16> = x.to_vec();
    if let Some(window) = window {
        assert!(2 * window.len() <= n, "window overlap exceeds the input");
        for (i, &w) in window.iter().enumerate() {
            xx[i] *= w;
            xx[n - i - 1] *= w;
        }
    }

    for (k, slot) in ac.iter_mut().enumerate().take(lag + 1) {
        *slot = xx[k..]
            .iter()
            .zip(&xx)
            .map(|(&a, &b)| a * b)
            .sum();
    }
    ac[0] += AUTOCORR_NOISE_BIAS;
}
