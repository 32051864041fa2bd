//! Pyramid vector quantisation from `celt/vq.c`.
//!
//! A band shape is coded as `K` signed unit pulses spread over `N` bins. Before
//! the search the shape is rotated to make low-`K` codewords less tonal
//! ("spreading"), and the inverse rotation is applied after resynthesis.

use alloc::vec;

use libm::{atan2f, cosf, floorf};

use crate::celt::cwrs::{decode_pulses, encode_pulses};
use crate::celt::entdec::EcDec;
use crate::celt::entenc::EcEnc;
use crate::celt::math::{celt_rcp, celt_rsqrt_norm, celt_sqrt};
use crate::celt::pitch::celt_inner_prod;
use crate::celt::types::{CeltNorm, EPSILON, OpusInt32, OpusVal16, OpusVal32, Q15_ONE};

/// Amount of spreading rotation applied to a band before PVQ search.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Spread {
    None = 0,
    Light = 1,
    #[default]
    Normal = 2,
    Aggressive = 3,
}

impl Spread {
    /// Bitstream code of the decision.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Decision for a bitstream code, `None` if out of range.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Light),
            2 => Some(Self::Normal),
            3 => Some(Self::Aggressive),
            _ => None,
        }
    }

    fn factor(self) -> Option<i32> {
        match self {
            Self::None => None,
            Self::Light => Some(15),
            Self::Normal => Some(10),
            Self::Aggressive => Some(5),
        }
    }
}

#[inline]
fn celt_cos_norm(x: OpusVal32) -> OpusVal32 {
    cosf(0.5 * core::f32::consts::PI * x)
}

fn exp_rotation1(x: &mut [OpusVal16], stride: usize, c: OpusVal16, s: OpusVal16) {
    let len = x.len();
    if stride == 0 || len <= stride {
        return;
    }

    for i in 0..len - stride {
        let x1 = x[i];
        let x2 = x[i + stride];
        x[i + stride] = c * x2 + s * x1;
        x[i] = c * x1 - s * x2;
    }

    if len > 2 * stride {
        for i in (0..len - 2 * stride).rev() {
            let x1 = x[i];
            let x2 = x[i + stride];
            x[i + stride] = c * x2 + s * x1;
            x[i] = c * x1 - s * x2;
        }
    }
}

/// Applies (`dir > 0`) or undoes (`dir < 0`) the spreading rotation on the
/// first `len` bins of `x`, treated as `stride` interleaved blocks.
pub(crate) fn exp_rotation(
    x: &mut [OpusVal16],
    len: usize,
    dir: i32,
    stride: usize,
    k: i32,
    spread: Spread,
) {
    let Some(factor) = spread.factor() else {
        return;
    };
    if len == 0 || stride == 0 || 2 * k >= len as i32 {
        return;
    }
    let x = &mut x[..len];

    let gain = (Q15_ONE * len as OpusVal16) / (len as i32 + factor * k) as OpusVal16;
    let theta = 0.5 * gain * gain;
    let c = celt_cos_norm(theta);
    let s = celt_cos_norm(Q15_ONE - theta);

    let mut stride2 = 0usize;
    if len >= 8 * stride {
        stride2 = 1;
        // Closest integer to sqrt(len / stride) for the second rotation pass.
        while (stride2 * stride2 + stride2) * stride + (stride >> 2) < len {
            stride2 += 1;
        }
    }

    let block_len = len / stride;
    if block_len == 0 {
        return;
    }

    for block in x.chunks_exact_mut(block_len).take(stride) {
        if dir < 0 {
            if stride2 > 0 {
                exp_rotation1(block, stride2, s, c);
            }
            exp_rotation1(block, 1, c, s);
        } else {
            exp_rotation1(block, 1, c, -s);
            if stride2 > 0 {
                exp_rotation1(block, stride2, s, -c);
            }
        }
    }
}

/// Writes `gain * pulses / sqrt(ryy)` into `x`.
pub(crate) fn normalise_residual(
    pulses: &[i32],
    x: &mut [OpusVal16],
    n: usize,
    ryy: OpusVal32,
    gain: OpusVal32,
) {
    let scale = celt_rsqrt_norm(ryy) * gain;
    for (dst, &pulse) in x.iter_mut().zip(pulses).take(n) {
        *dst = scale * pulse as OpusVal16;
    }
}

/// Greedy search for the `k`-pulse codeword closest in angle to `x`.
///
/// Returns the squared norm of the selected codeword. `x` is left holding
/// the absolute values of the input.
pub(crate) fn op_pvq_search(
    x: &mut [OpusVal16],
    pulses: &mut [OpusInt32],
    n: usize,
    k: i32,
) -> OpusVal32 {
    assert!(n > 0, "vector dimension must be positive");
    assert!(k >= 0, "pulse count must be non-negative");
    assert!(x.len() >= n && pulses.len() >= n);

    let mut y = vec![0.0f32; n];
    let mut sign = vec![false; n];

    for idx in 0..n {
        sign[idx] = x[idx] < 0.0;
        x[idx] = x[idx].abs();
        pulses[idx] = 0;
    }

    let mut xy = 0.0f32;
    let mut yy = 0.0f32;
    let mut pulses_left = k;

    // Start from a projection onto the pyramid when many pulses are needed.
    if k > (n as i32) >> 1 {
        let mut sum: f32 = x[..n].iter().sum();
        if !(sum > EPSILON && sum < 64.0) {
            x[0] = 1.0;
            x[1..n].fill(0.0);
            sum = 1.0;
        }

        let rcp = (k as OpusVal32 + 0.8) * celt_rcp(sum);
        for idx in 0..n {
            let pulse = floorf(rcp * x[idx]) as OpusInt32;
            pulses[idx] = pulse;
            let val = pulse as OpusVal16;
            yy += val * val;
            xy += x[idx] * val;
            y[idx] = 2.0 * val;
            pulses_left -= pulse;
        }
    }
    debug_assert!(pulses_left >= 0, "pulse allocation exceeded target count");
    let mut pulses_left = pulses_left.max(0);

    // Dump the remainder on the first bin when far too many are left.
    if pulses_left > n as i32 + 3 {
        let tmp = pulses_left as OpusVal16;
        yy += tmp * tmp;
        yy += tmp * y[0];
        pulses[0] += pulses_left;
        pulses_left = 0;
    }

    for _ in 0..pulses_left {
        yy += 1.0;

        let mut best_id = 0usize;
        let mut best_den = yy + y[0];
        let mut best_num = (xy + x[0]) * (xy + x[0]);
        for idx in 1..n {
            let rxy = xy + x[idx];
            let ryy = yy + y[idx];
            let num = rxy * rxy;
            if best_den * num > ryy * best_num {
                best_den = ryy;
                best_num = num;
                best_id = idx;
            }
        }

        xy += x[best_id];
        yy += y[best_id];
        y[best_id] += 2.0;
        pulses[best_id] += 1;
    }

    for (pulse, &negative) in pulses.iter_mut().zip(&sign) {
        if negative {
            *pulse = -*pulse;
        }
    }

    yy
}

/// Which of the `b` interleaved blocks received at least one pulse.
#[must_use]
pub(crate) fn extract_collapse_mask(pulses: &[i32], n: usize, b: usize) -> u32 {
    if b <= 1 {
        return 1;
    }
    let block_len = n / b;
    debug_assert!(block_len > 0, "sub-block width must be non-zero");

    let mut collapse_mask = 0u32;
    for (block, chunk) in pulses[..n].chunks_exact(block_len).take(b).enumerate() {
        if chunk.iter().any(|&p| p != 0) {
            collapse_mask |= 1 << block;
        }
    }
    collapse_mask
}

/// Quantises the shape `x` with `k` pulses and writes the codeword to `enc`.
///
/// With `resynth`, `x` is replaced by the decoded shape scaled to `gain`.
/// Returns the collapse mask of the `b` blocks.
#[allow(clippy::too_many_arguments)]
pub(crate) fn alg_quant(
    x: &mut [CeltNorm],
    n: usize,
    k: i32,
    spread: Spread,
    b: usize,
    enc: &mut EcEnc<'_>,
    gain: OpusVal32,
    resynth: bool,
) -> u32 {
    assert!(k > 0, "alg_quant requires at least one pulse");
    assert!(n > 1, "alg_quant requires at least two dimensions");

    let mut pulses = vec![0i32; n];
    exp_rotation(x, n, 1, b, k, spread);
    let yy = op_pvq_search(x, &mut pulses, n, k);
    encode_pulses(&pulses, n, k as usize, enc);

    if resynth {
        normalise_residual(&pulses, x, n, yy, gain);
        exp_rotation(x, n, -1, b, k, spread);
    }

    extract_collapse_mask(&pulses, n, b)
}

/// Decodes a `k`-pulse codeword into `x`, scaled to `gain`.
pub(crate) fn alg_unquant(
    x: &mut [CeltNorm],
    n: usize,
    k: i32,
    spread: Spread,
    b: usize,
    dec: &mut EcDec<'_>,
    gain: OpusVal32,
) -> u32 {
    assert!(k > 0, "alg_unquant requires at least one pulse");
    assert!(n > 1, "alg_unquant requires at least two dimensions");

    let mut pulses = vec![0i32; n];
    let ryy = decode_pulses(&mut pulses, n, k as usize, dec);
    normalise_residual(&pulses, x, n, ryy, gain);
    exp_rotation(x, n, -1, b, k, spread);
    extract_collapse_mask(&pulses, n, b)
}

/// Scales the first `n` bins of `x` to norm `gain`.
pub(crate) fn renormalise_vector(x: &mut [CeltNorm], n: usize, gain: OpusVal32) {
    let x = &mut x[..n];
    let energy = EPSILON + celt_inner_prod(x, x);
    let scale = celt_rsqrt_norm(energy) * gain;
    for sample in x.iter_mut() {
        *sample *= scale;
    }
}

/// Angle between the energies of `x` and `y` (or of their mid and side when
/// `stereo`), in Q14 units of a quarter turn.
#[must_use]
pub(crate) fn stereo_itheta(x: &[CeltNorm], y: &[CeltNorm], stereo: bool, n: usize) -> i32 {
    let (x, y) = (&x[..n], &y[..n]);
    let mut emid = EPSILON;
    let mut eside = EPSILON;

    if stereo {
        for (&l, &r) in x.iter().zip(y) {
            let m = l + r;
            let s = l - r;
            emid += m * m;
            eside += s * s;
        }
    } else {
        emid += celt_inner_prod(x, x);
        eside += celt_inner_prod(y, y);
    }

    let mid = celt_sqrt(emid);
    let side = celt_sqrt(eside);
    floorf(0.5 + 16_384.0 * 0.636_62 * atan2f(side, mid)) as i32
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::{
        Spread, alg_quant, alg_unquant, exp_rotation, extract_collapse_mask, normalise_residual,
        op_pvq_search, renormalise_vector, stereo_itheta,
    };
    use crate::celt::entdec::EcDec;
    use crate::celt::entenc::EcEnc;

    fn seed_samples(len: usize) -> Vec<f32> {
        let mut seed = 0x1234_5678u32;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let sample = ((seed >> 16) & 0x7fff) as i32 - 16_384;
            out.push(sample as f32);
        }
        out
    }

    fn snr_db(original: &[f32], processed: &[f32]) -> f64 {
        let mut err = 0.0;
        let mut ener = 0.0;
        for (&orig, &proc) in original.iter().zip(processed.iter()) {
            let diff = f64::from(orig - proc);
            err += diff * diff;
            ener += f64::from(orig) * f64::from(orig);
        }
        if err == 0.0 {
            return f64::INFINITY;
        }
        20.0 * libm::log10(ener / err)
    }

    #[test]
    fn rotation_is_undone_by_inverse() {
        for &(len, k) in &[(15, 3), (23, 5), (50, 3), (80, 1)] {
            let baseline = seed_samples(len);
            let mut rotated = baseline.clone();

            exp_rotation(&mut rotated, len, 1, 1, k, Spread::Normal);
            let forward_snr = snr_db(&baseline, &rotated);
            exp_rotation(&mut rotated, len, -1, 1, k, Spread::Normal);
            let inverse_snr = snr_db(&baseline, &rotated);

            assert!(inverse_snr > 60.0, "inverse SNR too low: {inverse_snr}");
            assert!(forward_snr < 20.0, "forward SNR unexpectedly high: {forward_snr}");
        }
    }

    #[test]
    fn no_spread_or_many_pulses_leave_vector_alone() {
        let baseline = seed_samples(16);
        let mut data = baseline.clone();
        exp_rotation(&mut data, 16, 1, 1, 3, Spread::None);
        assert_eq!(data, baseline);
        exp_rotation(&mut data, 16, 1, 1, 8, Spread::Aggressive);
        assert_eq!(data, baseline);
    }

    #[test]
    fn spread_codes_roundtrip() {
        for spread in [Spread::None, Spread::Light, Spread::Normal, Spread::Aggressive] {
            assert_eq!(Spread::from_code(spread.code()), Some(spread));
        }
        assert_eq!(Spread::from_code(4), None);
        assert_eq!(Spread::default(), Spread::Normal);
    }

    #[test]
    fn residual_normalisation_scales_by_gain() {
        let pulses = [2, -1, 0, 3];
        let mut output = [0.0f32; 4];
        normalise_residual(&pulses, &mut output, pulses.len(), 14.0, 0.5);
        let scale = 0.5 / libm::sqrtf(14.0);
        for (value, &pulse) in output.iter().zip(&pulses) {
            assert!((value - scale * pulse as f32).abs() <= 1e-6);
        }
    }

    #[test]
    fn collapse_mask_sets_bits_for_active_blocks() {
        let pulses = [0, 0, 1, 0, 0, 0, 2, 3];
        assert_eq!(extract_collapse_mask(&pulses, pulses.len(), 4), 0b1010);
        assert_eq!(extract_collapse_mask(&[0, 0, 0, 0], 4, 1), 1);
    }

    #[test]
    fn pvq_search_places_exactly_k_pulses() {
        for k in [1, 3, 5, 17] {
            let mut coeffs = [0.6f32, -0.4, 0.2, 0.1];
            let mut pulses = vec![0i32; coeffs.len()];
            let energy = op_pvq_search(&mut coeffs, &mut pulses, 4, k);
            let total: i32 = pulses.iter().map(|&p| p.abs()).sum();
            assert_eq!(total, k);
            let yy: i32 = pulses.iter().map(|&p| p * p).sum();
            assert_eq!(energy, yy as f32);
            assert!(pulses[0] > 0 && pulses[1] <= 0);
        }
    }

    #[test]
    fn quant_and_unquant_agree() {
        let coeffs = seed_samples(12);
        let n = coeffs.len();
        let cases = [
            (5, Spread::Normal, 2usize),
            (1, Spread::Aggressive, 1),
            (9, Spread::Light, 4),
        ];
        for (k, spread, blocks) in cases {
            let mut encoded = coeffs.clone();
            let mut buffer = vec![0u8; 64];
            let mask;
            {
                let mut enc = EcEnc::new(&mut buffer);
                mask = alg_quant(&mut encoded, n, k, spread, blocks, &mut enc, 1.0, true);
                enc.enc_done();
                assert_eq!(enc.error, 0);
            }

            let mut decoded = vec![0.0f32; n];
            let mut dec = EcDec::new(&mut buffer);
            let mask_dec = alg_unquant(&mut decoded, n, k, spread, blocks, &mut dec, 1.0);

            assert_eq!(mask, mask_dec);
            for (a, b) in encoded.iter().zip(decoded.iter()) {
                assert!((a - b).abs() < 1e-6);
            }
            let energy: f32 = decoded.iter().map(|v| v * v).sum();
            assert!((energy - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn renormalise_vector_matches_expected_gain() {
        let mut data = seed_samples(8);
        renormalise_vector(&mut data, 8, 0.75);
        let energy: f32 = data.iter().map(|&v| v * v).sum();
        assert!((energy - 0.75 * 0.75).abs() < 1e-5);
    }

    #[test]
    fn itheta_spans_quarter_turn() {
        let zeros = [0.0f32; 8];
        let ones = [1.0f32; 8];
        assert!((stereo_itheta(&zeros, &ones, false, 8) - 16_384).abs() <= 1);
        assert_eq!(stereo_itheta(&ones, &zeros, false, 8), 0);
        // Identical channels have no side component.
        assert_eq!(stereo_itheta(&ones, &ones, true, 8), 0);
        let equal = stereo_itheta(&ones, &ones, false, 8);
        assert!((equal - 8192).abs() <= 1);
    }
}
