//! Open-loop pitch analysis, following `celt/pitch.c`.
//!
//! The search runs on a 2:1 decimated, spectrally whitened mono signal. A
//! coarse pass at 4:1 picks two candidate lags, a finer pass at 2:1 refines
//! them, and [`remove_doubling`] finally checks whether a sub-multiple of the
//! lag explains the signal just as well.

use alloc::vec;
use alloc::vec::Vec;

use crate::celt::lpc::{celt_autocorr, celt_fir, celt_lpc};
use crate::celt::math::celt_sqrt;
use crate::celt::types::{CeltSig, OpusVal16, OpusVal32};

const SECOND_CHECK: [i32; 16] = [0, 0, 3, 2, 3, 2, 5, 2, 3, 2, 3, 2, 5, 2, 3, 2];

/// Dot product of two equally long vectors.
#[must_use]
pub(crate) fn celt_inner_prod(x: &[OpusVal16], y: &[OpusVal16]) -> OpusVal32 {
    assert_eq!(x.len(), y.len(), "inner product operands must have the same length");
    x.iter().zip(y).map(|(&a, &b)| a * b).sum()
}

/// `(x . y0, x . y1)` in one pass.
#[must_use]
pub(crate) fn dual_inner_prod(
    x: &[OpusVal16],
    y0: &[OpusVal16],
    y1: &[OpusVal16],
) -> (OpusVal32, OpusVal32) {
    assert!(x.len() == y0.len() && x.len() == y1.len());
    x.iter()
        .zip(y0)
        .zip(y1)
        .fold((0.0, 0.0), |(xy0, xy1), ((&a, &b0), &b1)| {
            (xy0 + a * b0, xy1 + a * b1)
        })
}

/// Fills `xcorr[..max_pitch]` with `x[..len] . y[d..d + len]` for each delay `d`.
pub(crate) fn celt_pitch_xcorr(
    x: &[OpusVal16],
    y: &[OpusVal16],
    len: usize,
    max_pitch: usize,
    xcorr: &mut [OpusVal32],
) {
    assert!(x.len() >= len);
    assert!(y.len() + 1 >= len + max_pitch, "y must cover every delayed window");
    assert!(xcorr.len() >= max_pitch);

    let x = &x[..len];
    for (delay, slot) in xcorr[..max_pitch].iter_mut().enumerate() {
        *slot = celt_inner_prod(x, &y[delay..delay + len]);
    }
}

/// Returns the two delays with the largest energy-normalised positive
/// correlation, best first.
///
/// `y` must hold `len + max_pitch` samples: the energy of the window starting
/// at each delay is tracked incrementally and floored at 1.
#[must_use]
pub(crate) fn find_best_pitch(
    xcorr: &[OpusVal32],
    y: &[OpusVal16],
    len: usize,
    max_pitch: usize,
) -> [i32; 2] {
    assert!(xcorr.len() >= max_pitch);
    assert!(y.len() >= len + max_pitch, "energy window must slide over max_pitch delays");

    let mut syy: OpusVal32 = 1.0 + y[..len].iter().map(|&s| s * s).sum::<OpusVal32>();
    let mut best_num = [-1.0f32; 2];
    let mut best_den = [0.0f32; 2];
    let mut best_pitch = [0i32, 1];

    for (i, &corr) in xcorr[..max_pitch].iter().enumerate() {
        if corr > 0.0 {
            let num = corr * corr;
            if num * best_den[1] > best_num[1] * syy {
                if num * best_den[0] > best_num[0] * syy {
                    best_num[1] = best_num[0];
                    best_den[1] = best_den[0];
                    best_pitch[1] = best_pitch[0];
                    best_num[0] = num;
                    best_den[0] = syy;
                    best_pitch[0] = i as i32;
                } else {
                    best_num[1] = num;
                    best_den[1] = syy;
                    best_pitch[1] = i as i32;
                }
            }
        }
        syy += y[i + len] * y[i + len] - y[i] * y[i];
        syy = syy.max(1.0);
    }

    best_pitch
}

/// Decimates one or two channels of `len` samples into `x_lp[..len / 2]`.
///
/// The channels are summed through a `[0.25, 0.5, 0.25]` kernel, whitened by
/// a 4th-order LPC filter and finally pre-emphasised with a `0.8` first-order
/// FIR.
pub fn pitch_downsample(x: &[&[CeltSig]], x_lp: &mut [OpusVal16], len: usize) {
    assert!(
        (1..=2).contains(&x.len()),
        "pitch downsampling takes one or two channels"
    );
    assert!(len >= 4, "pitch downsampling needs at least four samples");
    assert!(x.iter().all(|channel| channel.len() >= len));
    let half = len >> 1;
    assert!(x_lp.len() >= half);

    let x_lp = &mut x_lp[..half];
    x_lp.fill(0.0);
    for channel in x {
        x_lp[0] += 0.5 * (0.5 * channel[1] + channel[0]);
        for i in 1..half {
            x_lp[i] += 0.5 * (0.5 * (channel[2 * i - 1] + channel[2 * i + 1]) + channel[2 * i]);
        }
    }

    let mut ac = [0.0f32; 5];
    celt_autocorr(x_lp, &mut ac, None, 4);

    // Noise floor at -40 dB, then a Gaussian lag window.
    ac[0] *= 1.0001;
    for (i, value) in ac.iter_mut().enumerate().skip(1) {
        let w = 0.008 * i as f32;
        *value -= *value * w * w;
    }

    let mut lpc = [0.0f32; 4];
    celt_lpc(&mut lpc, &ac);
    let mut tmp = 1.0f32;
    for coef in &mut lpc {
        tmp *= 0.9;
        *coef *= tmp;
    }

    let mut mem = [0.0f32; 4];
    celt_fir(x_lp, &lpc, &mut mem);
    let mut mem = [0.0f32; 1];
    celt_fir(x_lp, &[0.8], &mut mem);
}

/// Finds the delay into `y` that best matches `x_lp`, in full-rate samples.
///
/// `x_lp` holds `len / 2` decimated samples and `y` `(len + max_pitch) / 2`.
/// The returned value is twice the best decimated delay, corrected by one
/// sample when the neighbouring correlations are lopsided.
#[must_use]
pub fn pitch_search(
    x_lp: &[OpusVal16],
    y: &[OpusVal16],
    len: usize,
    max_pitch: usize,
) -> i32 {
    assert!(len >= 4 && max_pitch >= 4, "pitch search needs a non-trivial window");
    let lag = len + max_pitch;
    assert!(x_lp.len() >= len >> 1, "x_lp must provide len / 2 samples");
    assert!(y.len() >= lag >> 1, "y must provide (len + max_pitch) / 2 samples");

    let x_lp4: Vec<OpusVal16> = (0..len >> 2).map(|j| x_lp[2 * j]).collect();
    let y_lp4: Vec<OpusVal16> = (0..lag >> 2).map(|j| y[2 * j]).collect();

    // Coarse search with 4x decimation.
    let mut xcorr = vec![0.0f32; max_pitch >> 1];
    celt_pitch_xcorr(&x_lp4, &y_lp4, len >> 2, max_pitch >> 2, &mut xcorr);
    for slot in &mut xcorr[..max_pitch >> 2] {
        *slot = slot.max(-1.0);
    }
    let best = find_best_pitch(&xcorr, &y_lp4, len >> 2, max_pitch >> 2);

    // Finer search with 2x decimation around both candidates.
    let half = len >> 1;
    for (i, slot) in xcorr.iter_mut().enumerate() {
        *slot = 0.0;
        let i = i as i32;
        if (i - 2 * best[0]).abs() > 2 && (i - 2 * best[1]).abs() > 2 {
            continue;
        }
        let i = i as usize;
        let sum = celt_inner_prod(&x_lp[..half], &y[i..i + half]);
        *slot = sum.max(-1.0);
    }
    let best = find_best_pitch(&xcorr, y, half, max_pitch >> 1);

    let mut offset = 0;
    if best[0] > 0 && best[0] < (max_pitch >> 1) as i32 - 1 {
        let p = best[0] as usize;
        let (a, b, c) = (xcorr[p - 1], xcorr[p], xcorr[p + 1]);
        if c - a > 0.7 * (b - a) {
            offset = 1;
        } else if a - c > 0.7 * (b - c) {
            offset = -1;
        }
    }
    2 * best[0] - offset
}

/// The `n` samples starting `lag` before `center`. A lag of -1 reads one
/// sample ahead, which the interpolation around a zero period needs.
#[inline]
fn lagged(x: &[OpusVal16], center: usize, lag: i32, n: usize) -> &[OpusVal16] {
    debug_assert!(lag >= -1 && lag <= center as i32);
    let start = (center as i32 - lag) as usize;
    &x[start..start + n]
}

/// Corrects a pitch estimate that locked onto a multiple of the true period.
///
/// `x` is the 2:1 decimated signal, holding `maxperiod / 2` samples of history
/// followed by `n / 2` samples of the current frame. `t0` (full rate) is
/// replaced with the refined period, never below `minperiod`. Returns the
/// pitch gain of the chosen period.
#[allow(clippy::too_many_arguments)]
pub fn remove_doubling(
    x: &[OpusVal16],
    maxperiod: usize,
    minperiod: usize,
    n: usize,
    t0: &mut i32,
    prev_period: i32,
    prev_gain: OpusVal16,
) -> OpusVal16 {
    let minperiod0 = minperiod as i32;
    let maxperiod = (maxperiod / 2) as i32;
    let minperiod = (minperiod / 2) as i32;
    let prev_period = prev_period / 2;
    let n = n / 2;
    assert!(maxperiod > 1 && n > 0, "search range and window must be non-empty");
    let center = maxperiod as usize;
    assert!(x.len() > center + n, "x must hold maxperiod / 2 + n / 2 + 1 samples");

    let t0_half = (*t0 / 2).clamp(0, maxperiod - 1);
    let frame = &x[center..center + n];

    let xx = celt_inner_prod(frame, frame);
    let delayed = lagged(x, center, t0_half, n);
    let xy = celt_inner_prod(frame, delayed);
    let yy = celt_inner_prod(delayed, delayed);

    let mut best_xy = xy;
    let mut best_yy = yy;
    let g0 = xy / celt_sqrt(1.0 + xx * yy);
    let mut g = g0;
    let mut t = t0_half;

    for k in 2..=15i32 {
        let t1 = (2 * t0_half + k) / (2 * k);
        if t1 < minperiod {
            break;
        }
        let t1b = if k == 2 {
            if t1 + t0_half > maxperiod {
                t0_half
            } else {
                t0_half + t1
            }
        } else {
            (2 * SECOND_CHECK[k as usize] * t0_half + k) / (2 * k)
        };

        let y1 = lagged(x, center, t1, n);
        let y1b = lagged(x, center, t1b, n);
        let (xy1, xy1b) = dual_inner_prod(frame, y1, y1b);
        let xy = xy1 + xy1b;
        let yy = celt_inner_prod(y1, y1) + celt_inner_prod(y1b, y1b);
        let g1 = xy / celt_sqrt(1.0 + 2.0 * xx * yy);

        let cont = if (t1 - prev_period).abs() <= 1 {
            prev_gain
        } else if (t1 - prev_period).abs() <= 2 && 5 * k * k < t0_half {
            0.5 * prev_gain
        } else {
            0.0
        };
        if g1 > 0.3 + 0.4 * g0 - cont {
            best_xy = xy;
            best_yy = yy;
            t = t1;
            g = g1;
        }
    }

    let pg = if best_yy <= best_xy {
        1.0
    } else {
        best_xy / (best_yy + 1.0)
    };

    let mut xcorr = [0.0f32; 3];
    for (k, slot) in xcorr.iter_mut().enumerate() {
        *slot = celt_inner_prod(frame, lagged(x, center, t + k as i32 - 1, n));
    }
    let offset = if xcorr[2] - xcorr[0] > 0.7 * (xcorr[1] - xcorr[0]) {
        1
    } else if xcorr[0] - xcorr[2] > 0.7 * (xcorr[1] - xcorr[2]) {
        -1
    } else {
        0
    };

    *t0 = (2 * t + offset).max(minperiod0);
    pg.min(g)
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::{
        celt_inner_prod, celt_pitch_xcorr, dual_inner_prod, find_best_pitch, lagged,
        pitch_downsample, pitch_search, remove_doubling,
    };
    use crate::celt::types::OpusVal16;

    fn generate_sequence(len: usize, seed: u32) -> Vec<OpusVal16> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                ((state >> 8) as f32 / (1u32 << 24) as f32) * 2.0 - 1.0
            })
            .collect()
    }

    fn periodic(len: usize, period: f32) -> Vec<OpusVal16> {
        let w = 2.0 * core::f32::consts::PI / period;
        (0..len)
            .map(|t| {
                let t = t as f32;
                libm::sinf(w * t) + 0.6 * libm::sinf(2.0 * w * t + 0.3)
                    + 0.3 * libm::sinf(3.0 * w * t + 1.1)
            })
            .collect()
    }

    #[test]
    fn inner_products_match_naive_sums() {
        let x = generate_sequence(48, 0x4242_4242);
        let y0 = generate_sequence(48, 0x1357_9bdf);
        let y1 = generate_sequence(48, 0x0246_8ace);

        let expected0: f32 = x.iter().zip(&y0).map(|(&a, &b)| a * b).sum();
        let expected1: f32 = x.iter().zip(&y1).map(|(&a, &b)| a * b).sum();
        let (dot0, dot1) = dual_inner_prod(&x, &y0, &y1);
        assert!((celt_inner_prod(&x, &y0) - expected0).abs() < 1e-5);
        assert!((dot0 - expected0).abs() < 1e-5);
        assert!((dot1 - expected1).abs() < 1e-5);
    }

    #[test]
    fn pitch_xcorr_slides_over_delays() {
        let x = generate_sequence(16, 0x0f0f_0f0f);
        let y = generate_sequence(23, 0x1337_4242);
        let mut xcorr = vec![0.0f32; 8];
        celt_pitch_xcorr(&x, &y, 16, 8, &mut xcorr);
        for delay in 0..8 {
            let expected: f32 = x.iter().zip(&y[delay..]).map(|(&a, &b)| a * b).sum();
            assert!((expected - xcorr[delay]).abs() < 1e-5, "delay {delay}");
        }
    }

    #[test]
    fn best_pitch_prefers_strongest_echo() {
        let len = 48usize;
        let max_pitch = 24usize;
        let x = generate_sequence(len, 0x1111_2222);
        let mut y = vec![0.0; len + max_pitch];
        for i in 0..len {
            y[i + 7] += x[i];
            y[i + 15] += 0.6 * x[i];
        }

        let mut xcorr = vec![0.0; max_pitch];
        celt_pitch_xcorr(&x, &y, len, max_pitch, &mut xcorr);
        let best = find_best_pitch(&xcorr, &y, len, max_pitch);
        assert_eq!(best[0], 7);
        assert_ne!(best[1], 7);
    }

    #[test]
    fn best_pitch_defaults_without_positive_correlation() {
        let y = [1.0f32; 12];
        let best = find_best_pitch(&[-1.0; 4], &y, 8, 4);
        assert_eq!(best, [0, 1]);
    }

    #[test]
    fn downsampling_sums_channels() {
        let left = generate_sequence(64, 0x1234_ffff);
        let doubled: Vec<f32> = left.iter().map(|v| 2.0 * v).collect();

        let mut stereo = vec![0.0; 32];
        pitch_downsample(&[&left, &left], &mut stereo, 64);
        let mut mono = vec![0.0; 32];
        pitch_downsample(&[&doubled], &mut mono, 64);
        assert_eq!(stereo, mono);
    }

    #[test]
    fn downsampling_silence_stays_silent() {
        let zeros = [0.0f32; 40];
        let mut out = [1.0f32; 20];
        pitch_downsample(&[&zeros], &mut out, 40);
        assert_eq!(out, [0.0; 20]);
    }

    #[test]
    fn search_locks_onto_a_multiple_of_the_period() {
        let len = 320;
        let max_pitch = 256;
        // Period of 20 decimated samples, i.e. 40 at full rate.
        let y = periodic((len + max_pitch) / 2, 20.0);
        let x_lp = &y[max_pitch / 2..];

        let pitch = pitch_search(x_lp, &y, len, max_pitch);
        let lag = max_pitch as i32 - pitch;
        assert!(lag > 0);
        let phase = lag.rem_euclid(40);
        assert!(phase <= 2 || phase >= 38, "lag {lag}");
    }

    #[test]
    fn doubled_period_is_halved() {
        let maxperiod = 256;
        let n = 320;
        let x = periodic(maxperiod / 2 + n / 2 + 1, 20.0);

        let mut t0 = 80;
        let gain = remove_doubling(&x, maxperiod, 30, n, &mut t0, 0, 0.0);
        assert!((t0 - 40).abs() <= 1, "t0 = {t0}");
        assert!(gain > 0.9, "gain = {gain}");
    }

    #[test]
    fn refined_period_respects_minimum() {
        let maxperiod = 256;
        let n = 160;
        let x = generate_sequence(maxperiod / 2 + n / 2 + 1, 0x5555_aaaa);

        let mut t0 = 2;
        remove_doubling(&x, maxperiod, 30, n, &mut t0, 0, 0.0);
        assert!(t0 >= 30);
    }

    #[test]
    fn negative_lag_reads_ahead() {
        let x: Vec<f32> = (0..12).map(|i| i as f32).collect();
        assert_eq!(lagged(&x, 4, -1, 3), &[5.0, 6.0, 7.0]);
        assert_eq!(lagged(&x, 4, 0, 3), &[4.0, 5.0, 6.0]);
        assert_eq!(lagged(&x, 4, 4, 3), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn zero_period_stays_in_bounds() {
        let maxperiod = 256;
        let n = 320;
        let x = periodic(maxperiod / 2 + n / 2 + 1, 20.0);

        let mut t0 = 0;
        let gain = remove_doubling(&x, maxperiod, 0, n, &mut t0, 0, 0.0);
        assert!((0..=1).contains(&t0), "t0 = {t0}");
        assert!(gain.is_finite());
    }
}
