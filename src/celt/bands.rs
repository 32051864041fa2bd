//! Band energy, normalisation and stereo helpers from `celt/bands.c`.
//!
//! The spectrum of a frame is coded as per-band energies plus a unit-norm
//! shape per band. This module converts between the two representations,
//! decides how much spreading the PVQ stage should apply, and provides the
//! building blocks (stereo rotations, Haar butterflies, Hadamard reordering,
//! bit-exact trigonometry) used by the recursive band quantiser in
//! [`crate::celt::band_quant`].

use alloc::vec;
use alloc::vec::Vec;

use log::debug;

use crate::celt::entcode::ec_ilog;
use crate::celt::math::{celt_exp2, celt_rsqrt, celt_rsqrt_norm, celt_sqrt, frac_mul16};
use crate::celt::modes::CeltMode;
use crate::celt::types::{
    CeltEner, CeltGlog, CeltNorm, CeltSig, EPSILON, OpusInt16, OpusInt32, OpusVal16, OpusVal32,
    Q15_ONE,
};
use crate::celt::vq::{Spread, renormalise_vector};

/// Floor added to band energies so that silent bands never divide by zero.
const ENERGY_FLOOR: OpusVal32 = 1e-27;

/// Reset value of the previous-frame log energies.
const LOG_E_RESET: CeltGlog = -28.0;

/// Linear congruential generator from Numerical Recipes.
#[must_use]
#[inline]
pub(crate) fn celt_lcg_rand(seed: u32) -> u32 {
    seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223)
}

/// Cosine approximation over a quarter turn (`x` in `0..=16384`), returning a
/// Q15 value in `1..=32767`.
///
/// The result feeds the bit allocation, so it must be identical on every
/// platform; everything is integer arithmetic.
#[must_use]
pub(crate) fn bitexact_cos(x: OpusInt16) -> OpusInt16 {
    let x = OpusInt32::from(x);
    let x2 = ((4096 + x * x) >> 13).min(32767);
    let poly = frac_mul16(x2, -7651 + frac_mul16(x2, 8277 + frac_mul16(-626, x2)));
    let x2 = ((32767 - x2) + poly) as OpusInt16;
    1 + x2.min(32766)
}

/// `log2(isin / icos)` in Q11, from two Q15 magnitudes.
#[must_use]
pub(crate) fn bitexact_log2tan(isin: OpusInt32, icos: OpusInt32) -> OpusInt32 {
    debug_assert!(isin > 0 && icos > 0);
    let lc = ec_ilog(icos as u32);
    let ls = ec_ilog(isin as u32);
    let icos = icos << (15 - lc);
    let isin = isin << (15 - ls);
    ((ls - lc) << 11) + frac_mul16(isin, frac_mul16(isin, -2597) + 7932)
        - frac_mul16(icos, frac_mul16(icos, -2597) + 7932)
}

/// Per-channel stride of the spectrum buffers at resolution `m = 1 << lm`.
#[inline]
fn channel_stride(mode: &CeltMode<'_>, m: usize) -> usize {
    m * mode.short_mdct_size
}

/// RMS amplitude of bands `0..end` for each channel of `x`.
///
/// `band_e` is laid out as `[channel * num_ebands + band]`.
pub fn compute_band_energies(
    mode: &CeltMode<'_>,
    x: &[CeltSig],
    band_e: &mut [CeltEner],
    end: usize,
    channels: usize,
    lm: usize,
) {
    let m = 1usize << lm;
    let stride = channel_stride(mode, m);
    assert!(end <= mode.num_ebands);
    assert!(x.len() >= channels * stride);
    assert!(band_e.len() >= channels * mode.num_ebands);

    for c in 0..channels {
        let spectrum = &x[c * stride..(c + 1) * stride];
        for i in 0..end {
            let band = &spectrum[mode.band_start(i, lm)..mode.band_start(i + 1, lm)];
            let sum = band.iter().fold(ENERGY_FLOOR, |acc, &v| acc + v * v);
            band_e[c * mode.num_ebands + i] = celt_sqrt(sum);
        }
    }
}

/// Divides each band of `freq` by its energy, writing unit-norm shapes to `x`.
pub fn normalise_bands(
    mode: &CeltMode<'_>,
    freq: &[CeltSig],
    x: &mut [CeltNorm],
    band_e: &[CeltEner],
    end: usize,
    channels: usize,
    lm: usize,
) {
    let m = 1usize << lm;
    let stride = channel_stride(mode, m);
    assert!(freq.len() >= channels * stride && x.len() >= channels * stride);

    for c in 0..channels {
        for i in 0..end {
            let g = 1.0 / (ENERGY_FLOOR + band_e[c * mode.num_ebands + i]);
            let offset = c * stride;
            let range = offset + mode.band_start(i, lm)..offset + mode.band_start(i + 1, lm);
            for (dst, &src) in x[range.clone()].iter_mut().zip(&freq[range]) {
                *dst = src * g;
            }
        }
    }
}

/// Scales unit-norm shapes back to their band energies. Bins outside
/// bands `0..end` are zeroed.
pub fn denormalise_bands(
    mode: &CeltMode<'_>,
    x: &[CeltNorm],
    freq: &mut [CeltSig],
    band_e: &[CeltEner],
    end: usize,
    channels: usize,
    lm: usize,
) {
    assert!(channels <= 2, "denormalisation supports at most two channels");
    let m = 1usize << lm;
    let stride = channel_stride(mode, m);
    assert!(freq.len() >= channels * stride && x.len() >= channels * stride);

    for c in 0..channels {
        let f = &mut freq[c * stride..(c + 1) * stride];
        let shape = &x[c * stride..(c + 1) * stride];
        f[..mode.band_start(0, lm)].fill(0.0);
        for i in 0..end {
            let g = band_e[c * mode.num_ebands + i];
            let range = mode.band_start(i, lm)..mode.band_start(i + 1, lm);
            for (dst, &src) in f[range.clone()].iter_mut().zip(&shape[range]) {
                *dst = src * g;
            }
        }
        f[mode.band_start(end, lm)..].fill(0.0);
    }
}

/// Smoothing state of the spreading and tapset decisions, kept per stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpreadState {
    pub average: i32,
    pub hf_average: i32,
    pub tapset_decision: i32,
    pub last_decision: Spread,
}

impl SpreadState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            average: 256,
            hf_average: 0,
            tapset_decision: 0,
            last_decision: Spread::Normal,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for SpreadState {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks how much spreading to apply from the peakiness of the normalised
/// spectrum `x`.
///
/// Bands that are mostly made of a few strong bins push towards
/// [`Spread::None`]; flat, noise-like bands towards [`Spread::Aggressive`].
/// With `update_hf` the high-frequency statistics also update the tapset
/// decision. The result is recorded in `state.last_decision`.
pub fn spreading_decision(
    mode: &CeltMode<'_>,
    x: &[CeltNorm],
    state: &mut SpreadState,
    update_hf: bool,
    end: usize,
    channels: usize,
    lm: usize,
) -> Spread {
    assert!(end > 0 && end <= mode.num_ebands);
    let m = 1usize << lm;
    let stride = channel_stride(mode, m);
    let nb_ebands = mode.num_ebands;

    if mode.band_width(end - 1) * m <= 8 {
        state.last_decision = Spread::None;
        return Spread::None;
    }

    let mut sum = 0i32;
    let mut nb_bands = 0i32;
    let mut hf_sum = 0i32;
    for c in 0..channels {
        for i in 0..end {
            let start = c * stride + mode.band_start(i, lm);
            let n = mode.band_width(i) * m;
            if n <= 8 {
                continue;
            }

            let mut tcount = [0i32; 3];
            for &v in &x[start..start + n] {
                let x2n = v * v * n as OpusVal32;
                if x2n < 0.25 {
                    tcount[0] += 1;
                }
                if x2n < 0.0625 {
                    tcount[1] += 1;
                }
                if x2n < 0.015625 {
                    tcount[2] += 1;
                }
            }

            // Only the four last bands (8 kHz and up) feed the tapset.
            if i + 4 > nb_ebands {
                hf_sum += 32 * (tcount[1] + tcount[0]) / n as i32;
            }
            let n = n as i32;
            let tmp = i32::from(2 * tcount[2] >= n)
                + i32::from(2 * tcount[1] >= n)
                + i32::from(2 * tcount[0] >= n);
            sum += tmp * 256;
            nb_bands += 1;
        }
    }

    if update_hf {
        if hf_sum != 0 {
            hf_sum /= channels as i32 * (4 - nb_ebands as i32 + end as i32);
        }
        state.hf_average = (state.hf_average + hf_sum) >> 1;
        let mut hf_sum = state.hf_average;
        match state.tapset_decision {
            2 => hf_sum += 4,
            0 => hf_sum -= 4,
            _ => {}
        }
        state.tapset_decision = if hf_sum > 22 {
            2
        } else if hf_sum > 18 {
            1
        } else {
            0
        };
    }

    debug_assert!(nb_bands > 0);
    sum /= nb_bands.max(1);
    sum = (sum + state.average) >> 1;
    state.average = sum;
    // Hysteresis towards the previous decision.
    sum = (3 * sum + (((3 - state.last_decision.code()) << 7) + 64) + 2) >> 2;
    let decision = if sum < 80 {
        Spread::Aggressive
    } else if sum < 256 {
        Spread::Normal
    } else if sum < 384 {
        Spread::Light
    } else {
        Spread::None
    };

    debug!(
        "spreading decision {decision:?} (score {sum}, tapset {})",
        state.tapset_decision
    );
    state.last_decision = decision;
    decision
}

/// Log-energy history of the current and two previous frames, per stream.
///
/// All three vectors are laid out as `[channel * num_ebands + band]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyHistory {
    pub channels: usize,
    pub log_e: Vec<CeltGlog>,
    pub prev1_log_e: Vec<CeltGlog>,
    pub prev2_log_e: Vec<CeltGlog>,
}

impl EnergyHistory {
    #[must_use]
    pub fn new(num_ebands: usize, channels: usize) -> Self {
        assert!((1..=2).contains(&channels));
        let len = channels * num_ebands;
        Self {
            channels,
            log_e: vec![0.0; len],
            prev1_log_e: vec![LOG_E_RESET; len],
            prev2_log_e: vec![LOG_E_RESET; len],
        }
    }

    pub fn reset(&mut self) {
        self.log_e.fill(0.0);
        self.prev1_log_e.fill(LOG_E_RESET);
        self.prev2_log_e.fill(LOG_E_RESET);
    }

    /// Shifts the current frame into the history.
    pub fn advance(&mut self) {
        core::mem::swap(&mut self.prev2_log_e, &mut self.prev1_log_e);
        self.prev1_log_e.copy_from_slice(&self.log_e);
    }
}

/// Fills the short blocks of each band that received no pulses with noise.
///
/// `x` holds `channels` spectra of `size` bins each. The noise level follows
/// from the pulse depth of the band and from how much its energy dropped
/// compared with the two previous frames in `history`. When `history` tracks
/// more channels than are coded, the louder of the two is used.
#[allow(clippy::too_many_arguments)]
pub fn anti_collapse(
    mode: &CeltMode<'_>,
    x: &mut [CeltNorm],
    collapse_masks: &[u8],
    lm: usize,
    channels: usize,
    size: usize,
    start: usize,
    end: usize,
    history: &EnergyHistory,
    pulses: &[i32],
    mut seed: u32,
) {
    let nb = mode.num_ebands;
    assert!(channels <= history.channels);
    assert!(x.len() >= channels * size);

    for i in start..end {
        let n0 = mode.band_width(i);
        // depth in 1/8 bits
        let depth = (1 + pulses[i]) / ((n0 << lm) as i32);
        let thresh = 0.5 * celt_exp2(-0.125 * depth as OpusVal16);
        let sqrt_1 = celt_rsqrt((n0 << lm) as OpusVal32);

        for c in 0..channels {
            let mut prev1 = history.prev1_log_e[c * nb + i];
            let mut prev2 = history.prev2_log_e[c * nb + i];
            if channels < history.channels {
                prev1 = prev1.max(history.prev1_log_e[nb + i]);
                prev2 = prev2.max(history.prev2_log_e[nb + i]);
            }
            let ediff = (history.log_e[c * nb + i] - prev1.min(prev2)).max(0.0);

            // Short blocks carry less energy than long ones, hence the 2 or
            // 2*sqrt(2) factor.
            let mut r = 2.0 * celt_exp2(-ediff);
            if lm == 3 {
                r *= core::f32::consts::SQRT_2;
            }
            let r = r.min(thresh) * sqrt_1;

            let offset = c * size + mode.band_start(i, lm);
            let band = &mut x[offset..offset + (n0 << lm)];
            let mut renormalize = false;
            for k in 0..1usize << lm {
                if collapse_masks[i * channels + c] & (1 << k) == 0 {
                    for j in 0..n0 {
                        seed = celt_lcg_rand(seed);
                        band[(j << lm) + k] = if seed & 0x8000 != 0 { r } else { -r };
                    }
                    renormalize = true;
                }
            }
            if renormalize {
                renormalise_vector(band, n0 << lm, Q15_ONE);
            }
        }
    }
}

/// Collapses a stereo band onto `x` using the channel energies as weights.
pub(crate) fn intensity_stereo(
    mode: &CeltMode<'_>,
    x: &mut [CeltNorm],
    y: &[CeltNorm],
    band_e: &[CeltEner],
    band: usize,
    n: usize,
) {
    let left = band_e[band];
    let right = band_e[band + mode.num_ebands];
    let norm = EPSILON + celt_sqrt(EPSILON + left * left + right * right);
    let a1 = left / norm;
    let a2 = right / norm;
    for (l, &r) in x[..n].iter_mut().zip(&y[..n]) {
        *l = a1 * *l + a2 * r;
    }
}

/// Rotates `(x, y)` by 45 degrees into `(mid, side)`.
pub(crate) fn stereo_split(x: &mut [CeltNorm], y: &mut [CeltNorm], n: usize) {
    for (xj, yj) in x[..n].iter_mut().zip(&mut y[..n]) {
        let l = core::f32::consts::FRAC_1_SQRT_2 * *xj;
        let r = core::f32::consts::FRAC_1_SQRT_2 * *yj;
        *xj = l + r;
        *yj = r - l;
    }
}

/// Rebuilds unit-norm left/right channels from the unit mid `x`, the
/// side `y` (already scaled by the side gain) and the mid gain `mid`.
///
/// Falls back to copying `x` into `y` when either channel would be close to
/// silent.
pub(crate) fn stereo_merge(x: &mut [CeltNorm], y: &mut [CeltNorm], mid: OpusVal16, n: usize) {
    let (x, y) = (&mut x[..n], &mut y[..n]);

    // |X +- Y|^2 = |X|^2 + |Y|^2 +- 2 X.Y
    let (xp, side) = x
        .iter()
        .zip(y.iter())
        .fold((0.0f32, 0.0f32), |(xp, side), (&a, &b)| (xp + a * b, side + b * b));
    let xp = mid * xp;
    let el = mid * mid + side - 2.0 * xp;
    let er = mid * mid + side + 2.0 * xp;
    if er < 6e-4 || el < 6e-4 {
        y.copy_from_slice(x);
        return;
    }

    let lgain = celt_rsqrt_norm(el);
    let rgain = celt_rsqrt_norm(er);
    for (xj, yj) in x.iter_mut().zip(y.iter_mut()) {
        let l = mid * *xj;
        let r = *yj;
        *xj = lgain * (l - r);
        *yj = rgain * (l + r);
    }
}

/// Gray-code derived order of the Hadamard basis for strides 2, 4, 8 and 16,
/// with DC last.
const ORDERY_TABLE: [usize; 30] = [
    1, 0, //
    3, 0, 2, 1, //
    7, 0, 4, 3, 6, 1, 5, 2, //
    15, 0, 8, 7, 12, 3, 11, 4, 14, 1, 9, 6, 13, 2, 10, 5,
];

fn ordery(stride: usize) -> &'static [usize] {
    debug_assert!(matches!(stride, 2 | 4 | 8 | 16));
    &ORDERY_TABLE[stride - 2..2 * stride - 2]
}

/// Reorders `stride` interleaved blocks of `n0` bins into consecutive blocks,
/// in Hadamard order when `hadamard` is set.
pub(crate) fn deinterleave_hadamard(x: &mut [CeltNorm], n0: usize, stride: usize, hadamard: bool) {
    let n = n0 * stride;
    let mut tmp = vec![0.0f32; n];
    for i in 0..stride {
        let dst = if hadamard { ordery(stride)[i] } else { i };
        for j in 0..n0 {
            tmp[dst * n0 + j] = x[j * stride + i];
        }
    }
    x[..n].copy_from_slice(&tmp);
}

/// Inverse of [`deinterleave_hadamard`].
pub(crate) fn interleave_hadamard(x: &mut [CeltNorm], n0: usize, stride: usize, hadamard: bool) {
    let n = n0 * stride;
    let mut tmp = vec![0.0f32; n];
    for i in 0..stride {
        let src = if hadamard { ordery(stride)[i] } else { i };
        for j in 0..n0 {
            tmp[j * stride + i] = x[src * n0 + j];
        }
    }
    x[..n].copy_from_slice(&tmp);
}

/// One level of orthonormal Haar butterflies between adjacent groups of
/// `stride` bins over `n0` bins per stride.
pub(crate) fn haar1(x: &mut [CeltNorm], n0: usize, stride: usize) {
    let half = n0 >> 1;
    for i in 0..stride {
        for j in 0..half {
            let a = stride * 2 * j + i;
            let b = stride * (2 * j + 1) + i;
            let tmp1 = core::f32::consts::FRAC_1_SQRT_2 * x[a];
            let tmp2 = core::f32::consts::FRAC_1_SQRT_2 * x[b];
            x[a] = tmp1 + tmp2;
            x[b] = tmp1 - tmp2;
        }
    }
}
