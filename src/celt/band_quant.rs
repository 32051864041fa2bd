//! Recursive band quantisation and the per-frame band loop, after
//! `quant_band` and `quant_all_bands` in `celt/bands.c`.
//!
//! A single routine serves both directions: the [`RangeCoder`] handle decides
//! whether each symbol is written or read, and the decoder always
//! resynthesises the shape it reads.

use alloc::vec;
use alloc::vec::Vec;

use log::trace;

use crate::celt::bands::{
    bitexact_cos, bitexact_log2tan, celt_lcg_rand, deinterleave_hadamard, haar1,
    intensity_stereo, interleave_hadamard, stereo_merge, stereo_split,
};
use crate::celt::coder::RangeCoder;
use crate::celt::entcode::BITRES;
use crate::celt::math::{celt_sqrt, frac_mul16, isqrt32, mult16_16_p15};
use crate::celt::modes::CeltMode;
use crate::celt::rate::{
    QTHETA_OFFSET, QTHETA_OFFSET_TWOPHASE, bits2pulses, get_pulses, pulses2bits,
};
use crate::celt::types::{CeltEner, CeltNorm, NORM_SCALING, OpusInt32, OpusVal16, Q15_ONE};
use crate::celt::vq::{Spread, alg_quant, alg_unquant, renormalise_vector, stereo_itheta};

/// Largest band share handed to a single band, in 1/8th bits.
const MAX_BAND_BITS: i32 = 16383;

/// Spare budget above which a coded half donates bits to its sibling.
const REBALANCE_THRESHOLD: i32 = 3 << BITRES;

/// Collapse masks of `2k` blocks merged pairwise into `k` blocks.
const BIT_INTERLEAVE: [u32; 16] = [0, 1, 1, 1, 2, 3, 3, 3, 2, 3, 3, 3, 2, 3, 3, 3];

/// Inverse of [`BIT_INTERLEAVE`]: each block bit duplicated into two.
const BIT_DEINTERLEAVE: [u32; 16] = [
    0x00, 0x03, 0x0C, 0x0F, 0x30, 0x33, 0x3C, 0x3F, 0xC0, 0xC3, 0xCC, 0xCF, 0xF0, 0xF3, 0xFC,
    0xFF,
];

/// Number of quantisation steps for the split angle of an `n`-bin band that
/// has `b` eighth-bits to spend.
///
/// Always `1` (no angle coded) or an even number up to 256.
#[must_use]
pub(crate) fn compute_qn(n: usize, b: i32, offset: i32, pulse_cap: i32, stereo: bool) -> i32 {
    const EXP2_TABLE8: [i32; 8] = [16384, 17866, 19483, 21247, 23170, 25267, 27554, 30048];

    let mut n2 = 2 * n as i32 - 1;
    if stereo && n == 2 {
        n2 -= 1;
    }
    // The first bound leaves enough bits to code at least one pulse in the
    // side when the angle lands on a quarter turn.
    let qb = (b - pulse_cap - (4 << BITRES))
        .min((b + n2 * offset) / n2)
        .min(8 << BITRES);

    let qn = if qb < (1 << BITRES >> 1) {
        1
    } else {
        let qn = EXP2_TABLE8[(qb & 0x7) as usize] >> (14 - (qb >> BITRES));
        (qn + 1) >> 1 << 1
    };
    debug_assert!(qn <= 256);
    qn
}

/// Per-band parameters shared by every level of the recursion.
#[derive(Debug, Clone, Copy)]
struct BandCtx<'a> {
    encode: bool,
    resynth: bool,
    mode: &'a CeltMode<'a>,
    band: usize,
    intensity: usize,
    spread: Spread,
    tf_change: i32,
    band_e: &'a [CeltEner],
}

/// Mutable state threaded through the recursion.
struct BandCursor<'c, 'b> {
    coder: RangeCoder<'c, 'b>,
    remaining_bits: OpusInt32,
    seed: u32,
}

/// Codes the split angle with the distribution matching the split kind: a
/// step for stereo, uniform for time splits and triangular otherwise.
fn code_theta(
    coder: &mut RangeCoder<'_, '_>,
    itheta: i32,
    qn: i32,
    stereo_step: bool,
    uniform: bool,
) -> i32 {
    if stereo_step {
        let p0 = 3;
        let x0 = qn / 2;
        let ft = p0 * (x0 + 1) + x0;
        // Probability p0 up to a half turn of the quantised angle, 1 after.
        let range = move |x: i32| -> (u32, u32, u32) {
            let (fl, fh) = if x <= x0 {
                (p0 * x, p0 * (x + 1))
            } else {
                ((x - 1 - x0) + (x0 + 1) * p0, (x - x0) + (x0 + 1) * p0)
            };
            (x as u32, fl as u32, fh as u32)
        };
        coder.code_symbol(range(itheta), ft as u32, |fs| {
            let fs = fs as i32;
            let x = if fs < (x0 + 1) * p0 {
                fs / p0
            } else {
                x0 + 1 + (fs - (x0 + 1) * p0)
            };
            range(x)
        }) as i32
    } else if uniform {
        coder.code_uint(itheta as u32, (qn + 1) as u32) as i32
    } else {
        let half = qn >> 1;
        let ft = (half + 1) * (half + 1);
        let range = move |t: i32| -> (u32, u32, u32) {
            let (fl, fs) = if t <= half {
                (t * (t + 1) >> 1, t + 1)
            } else {
                (ft - ((qn + 1 - t) * (qn + 2 - t) >> 1), qn + 1 - t)
            };
            (t as u32, fl as u32, (fl + fs) as u32)
        };
        coder.code_symbol(range(itheta), ft as u32, |fm| {
            let fm = fm as i32;
            let t = if fm < (half * (half + 1) >> 1) {
                (isqrt32(8 * fm as u32 + 1) as i32 - 1) >> 1
            } else {
                (2 * (qn + 1) - isqrt32(8 * (ft - fm - 1) as u32 + 1) as i32) >> 1
            };
            range(t)
        }) as i32
    }
}

/// Codes (or decodes) one band shape of `n` bins with `b` eighth-bits.
///
/// With `y` the band is a stereo pair coded as mid and side. Mono bands may
/// be split in halves recursively until the PVQ cost table covers their
/// budget. `lowband` is the folding source for unallocated content and is
/// scratch: it gets reordered alongside `x`. At the top level `lowband_out`
/// receives the resynthesised shape scaled for later folding.
///
/// Returns the collapse mask of the `blocks` short blocks.
#[allow(clippy::too_many_arguments)]
fn quant_band(
    ctx: &BandCtx<'_>,
    cur: &mut BandCursor<'_, '_>,
    x: &mut [CeltNorm],
    mut y: Option<&mut [CeltNorm]>,
    n: usize,
    b: i32,
    mut blocks: usize,
    mut lowband: Option<&mut [CeltNorm]>,
    lm: i32,
    mut lowband_out: Option<&mut [CeltNorm]>,
    level: u32,
    gain: OpusVal16,
    mut fill: u32,
) -> u32 {
    let n0 = n;
    let mut n_b = n / blocks;
    let mut n_b0 = n_b;
    let mut b0 = blocks;
    let long_blocks = b0 == 1;
    let mut time_divide = 0;
    let mut recombine = 0usize;
    let stereo = y.is_some();

    if n == 1 {
        return quant_single_bin(ctx, cur, x, y, lowband_out);
    }

    if !stereo && level == 0 {
        let mut tf_change = ctx.tf_change;
        if tf_change > 0 {
            recombine = tf_change as usize;
        }

        // Recombine blocks to increase the frequency resolution.
        for k in 0..recombine {
            if ctx.encode {
                haar1(x, n >> k, 1 << k);
            }
            if let Some(lowband) = lowband.as_deref_mut() {
                haar1(lowband, n >> k, 1 << k);
            }
            fill = BIT_INTERLEAVE[(fill & 0xF) as usize]
                | BIT_INTERLEAVE[((fill >> 4) & 0xF) as usize] << 2;
        }
        blocks >>= recombine;
        n_b <<= recombine;

        // Split blocks to increase the time resolution.
        while n_b & 1 == 0 && tf_change < 0 {
            if ctx.encode {
                haar1(x, n_b, blocks);
            }
            if let Some(lowband) = lowband.as_deref_mut() {
                haar1(lowband, n_b, blocks);
            }
            fill |= fill << blocks;
            blocks <<= 1;
            n_b >>= 1;
            time_divide += 1;
            tf_change += 1;
        }
        b0 = blocks;
        n_b0 = n_b;

        // Time order instead of frequency order.
        if b0 > 1 {
            if ctx.encode {
                deinterleave_hadamard(x, n_b >> recombine, b0 << recombine, long_blocks);
            }
            if let Some(lowband) = lowband.as_deref_mut() {
                deinterleave_hadamard(lowband, n_b >> recombine, b0 << recombine, long_blocks);
            }
        }
    }

    // Split when the budget is more than 1.5 bits above what PVQ can use.
    let split_mono = !stereo
        && lm != -1
        && n > 2
        && (lm > 0 || n & 1 == 0)
        && ctx
            .mode
            .cache
            .row(ctx.mode.num_ebands, lm, ctx.band)
            .is_some_and(|cache| b > i32::from(cache[usize::from(cache[0])]) + 12);

    let split = SplitParams {
        b,
        blocks,
        b0,
        lm,
        level,
        gain,
        fill,
    };
    let (mut cm, mid, inv) = if let Some(y) = y.as_deref_mut() {
        let lowband = lowband.as_deref_mut();
        quant_stereo_split(ctx, cur, x, y, n, lowband, lowband_out.as_deref_mut(), split)
    } else if split_mono {
        let half = n >> 1;
        let split = SplitParams {
            blocks: (blocks + 1) >> 1,
            lm: lm - 1,
            fill: if blocks == 1 { (fill & 1) | (fill << 1) } else { fill },
            ..split
        };
        let (xm, xs) = x[..2 * half].split_at_mut(half);
        let cm = quant_split_halves(ctx, cur, xm, xs, half, lowband.as_deref_mut(), split);
        (cm, 0.0, false)
    } else {
        let cm = quant_leaf(ctx, cur, x, n, b, blocks, lowband.as_deref(), lm, gain, fill);
        (cm, 0.0, false)
    };

    if ctx.resynth {
        if let Some(y) = y {
            if n != 2 {
                stereo_merge(x, y, mid, n);
            }
            if inv {
                for v in &mut y[..n] {
                    *v = -*v;
                }
            }
        } else if level == 0 {
            if b0 > 1 {
                interleave_hadamard(x, n_b >> recombine, b0 << recombine, long_blocks);
            }

            // Undo the time-frequency changes.
            n_b = n_b0;
            blocks = b0;
            for _ in 0..time_divide {
                blocks >>= 1;
                n_b <<= 1;
                cm |= cm >> blocks;
                haar1(x, n_b, blocks);
            }
            for k in 0..recombine {
                debug_assert!(cm < 16);
                cm = BIT_DEINTERLEAVE[(cm & 0xF) as usize];
                haar1(x, n0 >> k, 1 << k);
            }
            blocks <<= recombine;

            if let Some(out) = lowband_out {
                let scale = celt_sqrt(n0 as f32);
                for (o, &v) in out[..n0].iter_mut().zip(&x[..n0]) {
                    *o = scale * v;
                }
            }
            cm &= (1 << blocks) - 1;
        }
    }
    cm
}

/// One-bin bands carry a raw sign bit per channel while the budget allows.
fn quant_single_bin(
    ctx: &BandCtx<'_>,
    cur: &mut BandCursor<'_, '_>,
    x: &mut [CeltNorm],
    y: Option<&mut [CeltNorm]>,
    lowband_out: Option<&mut [CeltNorm]>,
) -> u32 {
    for channel in core::iter::once(&mut *x).chain(y) {
        let mut sign = 0;
        if cur.remaining_bits >= 1 << BITRES {
            sign = cur.coder.code_bits(u32::from(channel[0] < 0.0), 1);
            cur.remaining_bits -= 1 << BITRES;
        }
        if ctx.resynth {
            channel[0] = if sign != 0 { -NORM_SCALING } else { NORM_SCALING };
        }
    }
    if let Some(out) = lowband_out {
        out[0] = x[0];
    }
    1
}

/// Recursion parameters of a split, after any mono halving.
#[derive(Debug, Clone, Copy)]
struct SplitParams {
    b: i32,
    blocks: usize,
    b0: usize,
    lm: i32,
    level: u32,
    gain: OpusVal16,
    fill: u32,
}

/// Mid/side angle of a split and the resulting bit distribution.
#[derive(Debug, Clone, Copy)]
struct SplitAngle {
    itheta: i32,
    inv: bool,
    /// Eighth-bits spent on the angle.
    qalloc: i32,
    mid: OpusVal16,
    side: OpusVal16,
    delta: i32,
    fill: u32,
}

/// Chooses, codes and applies the split angle between `x` and `y`.
fn code_split_angle(
    ctx: &BandCtx<'_>,
    cur: &mut BandCursor<'_, '_>,
    x: &mut [CeltNorm],
    y: &mut [CeltNorm],
    n: usize,
    stereo: bool,
    p: &SplitParams,
) -> SplitAngle {
    let band = ctx.band;
    let pulse_cap = i32::from(ctx.mode.log_n[band]) + (p.lm << BITRES);
    let offset = (pulse_cap >> 1)
        - if stereo && n == 2 {
            QTHETA_OFFSET_TWOPHASE
        } else {
            QTHETA_OFFSET
        };
    let mut qn = compute_qn(n, p.b, offset, pulse_cap, stereo);
    if stereo && band >= ctx.intensity {
        qn = 1;
    }

    // Angle between the unit-norm halves; with it both can be rescaled
    // since they are orthogonal.
    let mut itheta = if ctx.encode {
        stereo_itheta(x, y, stereo, n)
    } else {
        0
    };
    let mut inv = false;
    let tell = cur.coder.tell_frac() as i32;
    if qn != 1 {
        if ctx.encode {
            itheta = (itheta * qn + 8192) >> 14;
        }
        itheta = code_theta(&mut cur.coder, itheta, qn, stereo && n > 2, p.b0 > 1 || stereo);
        itheta = itheta * 16384 / qn;
        if ctx.encode && stereo {
            if itheta == 0 {
                intensity_stereo(ctx.mode, x, y, ctx.band_e, band, n);
            } else {
                stereo_split(x, y, n);
            }
        }
    } else {
        if stereo {
            if ctx.encode {
                inv = itheta > 8192;
                if inv {
                    for v in &mut y[..n] {
                        *v = -*v;
                    }
                }
                intensity_stereo(ctx.mode, x, y, ctx.band_e, band, n);
            }
            inv = if p.b > 2 << BITRES && cur.remaining_bits > 2 << BITRES {
                cur.coder.code_bit_logp(inv, 2)
            } else {
                false
            };
        }
        itheta = 0;
    }
    let qalloc = cur.coder.tell_frac() as i32 - tell;

    let mut fill = p.fill;
    let low_mask = (1u32 << p.blocks) - 1;
    let (imid, iside, delta) = match itheta {
        0 => {
            fill &= low_mask;
            (32767, 0, -16384)
        }
        16384 => {
            fill &= low_mask << p.blocks;
            (0, 32767, 16384)
        }
        _ => {
            let imid = i32::from(bitexact_cos(itheta as i16));
            let iside = i32::from(bitexact_cos((16384 - itheta) as i16));
            // Mid/side allocation minimising the squared error of the band.
            let delta = frac_mul16(((n - 1) << 7) as i32, bitexact_log2tan(iside, imid));
            (imid, iside, delta)
        }
    };
    trace!("band {band}: n={n} qn={qn} itheta={itheta} inv={inv} qalloc={qalloc}");

    SplitAngle {
        itheta,
        inv,
        qalloc,
        mid: imid as f32 / 32768.0,
        side: iside as f32 / 32768.0,
        delta,
        fill,
    }
}

/// Stereo split: codes the angle, then mid and side. Returns the collapse
/// mask, the mid gain needed by the merge and the inversion flag.
#[allow(clippy::too_many_arguments)]
fn quant_stereo_split(
    ctx: &BandCtx<'_>,
    cur: &mut BandCursor<'_, '_>,
    x: &mut [CeltNorm],
    y: &mut [CeltNorm],
    n: usize,
    lowband: Option<&mut [CeltNorm]>,
    lowband_out: Option<&mut [CeltNorm]>,
    p: SplitParams,
) -> (u32, OpusVal16, bool) {
    let angle = code_split_angle(ctx, cur, x, y, n, true, &p);
    let b = p.b - angle.qalloc;

    if n == 2 {
        return quant_two_bin_stereo(ctx, cur, x, y, b, lowband, lowband_out, &p, &angle);
    }

    let mut mbits = ((b - angle.delta) / 2).min(b).max(0);
    let mut sbits = b - mbits;
    cur.remaining_bits -= angle.qalloc;

    // The mid stays unit-norm since it is the folding source of later bands.
    let mid_gain = Q15_ONE;
    let side_gain = mult16_16_p15(p.gain, angle.side);
    let rebalance_start = cur.remaining_bits;
    let fill = angle.fill;
    let blocks = p.blocks;
    let cm = if mbits >= sbits {
        let mut cm = quant_band(
            ctx, cur, x, None, n, mbits, blocks, lowband, p.lm, lowband_out, p.level, mid_gain,
            fill,
        );
        let rebalance = mbits - (rebalance_start - cur.remaining_bits);
        if rebalance > REBALANCE_THRESHOLD && angle.itheta != 0 {
            sbits += rebalance - REBALANCE_THRESHOLD;
        }
        // The high bits of fill are always clear here, so the side never folds.
        cm |= quant_band(
            ctx, cur, y, None, n, sbits, blocks, None, p.lm, None, p.level, side_gain,
            fill >> blocks,
        );
        cm
    } else {
        let mut cm = quant_band(
            ctx, cur, y, None, n, sbits, blocks, None, p.lm, None, p.level, side_gain,
            fill >> blocks,
        );
        let rebalance = sbits - (rebalance_start - cur.remaining_bits);
        if rebalance > REBALANCE_THRESHOLD && angle.itheta != 16384 {
            mbits += rebalance - REBALANCE_THRESHOLD;
        }
        cm |= quant_band(
            ctx, cur, x, None, n, mbits, blocks, lowband, p.lm, lowband_out, p.level, mid_gain,
            fill,
        );
        cm
    };
    (cm, angle.mid, angle.inv)
}

/// Two-bin stereo bands: the side is orthogonal to the mid, so one sign bit
/// describes it entirely.
#[allow(clippy::too_many_arguments)]
fn quant_two_bin_stereo(
    ctx: &BandCtx<'_>,
    cur: &mut BandCursor<'_, '_>,
    x: &mut [CeltNorm],
    y: &mut [CeltNorm],
    b: i32,
    lowband: Option<&mut [CeltNorm]>,
    lowband_out: Option<&mut [CeltNorm]>,
    p: &SplitParams,
    angle: &SplitAngle,
) -> (u32, OpusVal16, bool) {
    let sbits = if angle.itheta != 0 && angle.itheta != 16384 {
        1 << BITRES
    } else {
        0
    };
    let mbits = b - sbits;
    cur.remaining_bits -= angle.qalloc + sbits;

    let swap = angle.itheta > 8192;
    let (x2, y2) = if swap { (&mut *y, &mut *x) } else { (&mut *x, &mut *y) };
    let mut sign = 0;
    if sbits != 0 {
        let negative = x2[0] * y2[1] - x2[1] * y2[0] < 0.0;
        sign = cur.coder.code_bits(u32::from(negative), 1) as i32;
    }
    let sign = (1 - 2 * sign) as f32;

    // The original fill is kept so the mid folds even when the angle
    // cleared the low mask bits.
    let cm = quant_band(
        ctx, cur, x2, None, 2, mbits, p.blocks, lowband, p.lm, lowband_out, p.level, p.gain,
        p.fill,
    );
    y2[0] = -sign * x2[1];
    y2[1] = sign * x2[0];

    if ctx.resynth {
        for k in 0..2 {
            let l = angle.mid * x[k];
            let r = angle.side * y[k];
            x[k] = l - r;
            y[k] = l + r;
        }
    }
    (cm, angle.mid, angle.inv)
}

/// Mono split of a band into two halves coded at the next level.
fn quant_split_halves(
    ctx: &BandCtx<'_>,
    cur: &mut BandCursor<'_, '_>,
    x: &mut [CeltNorm],
    y: &mut [CeltNorm],
    n: usize,
    lowband: Option<&mut [CeltNorm]>,
    p: SplitParams,
) -> u32 {
    let angle = code_split_angle(ctx, cur, x, y, n, false, &p);
    let b = p.b - angle.qalloc;
    let mut delta = angle.delta;
    let itheta = angle.itheta;
    let lm = p.lm;

    // More bits to low-energy blocks than they would otherwise get.
    if p.b0 > 1 && itheta & 0x3fff != 0 {
        if itheta > 8192 {
            // Rough pre-echo masking.
            delta -= delta >> (4 - lm);
        } else {
            // Forward masking slope of 1.5 dB per 10 ms.
            delta = (delta + (((n as i32) << BITRES) >> (5 - lm))).min(0);
        }
    }
    let mut mbits = ((b - delta) / 2).min(b).max(0);
    let mut sbits = b - mbits;
    cur.remaining_bits -= angle.qalloc;

    let (mid_lowband, side_lowband) = match lowband {
        Some(lowband) => {
            let (lo, hi) = lowband.split_at_mut(n);
            (Some(lo), Some(hi))
        }
        None => (None, None),
    };
    let mid_gain = mult16_16_p15(p.gain, angle.mid);
    let side_gain = mult16_16_p15(p.gain, angle.side);
    let level = p.level + 1;
    let fill = angle.fill;
    let blocks = p.blocks;
    let side_shift = p.b0 >> 1;
    let rebalance_start = cur.remaining_bits;

    if mbits >= sbits {
        let mut cm = quant_band(
            ctx, cur, x, None, n, mbits, blocks, mid_lowband, lm, None, level, mid_gain, fill,
        );
        let rebalance = mbits - (rebalance_start - cur.remaining_bits);
        if rebalance > REBALANCE_THRESHOLD && itheta != 0 {
            sbits += rebalance - REBALANCE_THRESHOLD;
        }
        cm |= quant_band(
            ctx, cur, y, None, n, sbits, blocks, side_lowband, lm, None, level, side_gain,
            fill >> blocks,
        ) << side_shift;
        cm
    } else {
        let mut cm = quant_band(
            ctx, cur, y, None, n, sbits, blocks, side_lowband, lm, None, level, side_gain,
            fill >> blocks,
        ) << side_shift;
        let rebalance = sbits - (rebalance_start - cur.remaining_bits);
        if rebalance > REBALANCE_THRESHOLD && itheta != 16384 {
            mbits += rebalance - REBALANCE_THRESHOLD;
        }
        cm |= quant_band(
            ctx, cur, x, None, n, mbits, blocks, mid_lowband, lm, None, level, mid_gain, fill,
        );
        cm
    }
}

/// Unsplit band: PVQ with as many pulses as the budget buys, or folding /
/// noise when it buys none.
#[allow(clippy::too_many_arguments)]
fn quant_leaf(
    ctx: &BandCtx<'_>,
    cur: &mut BandCursor<'_, '_>,
    x: &mut [CeltNorm],
    n: usize,
    b: i32,
    blocks: usize,
    lowband: Option<&[CeltNorm]>,
    lm: i32,
    gain: OpusVal16,
    fill: u32,
) -> u32 {
    let mode = ctx.mode;
    let mut q = bits2pulses(mode, ctx.band, lm, b);
    let mut curr_bits = pulses2bits(mode, ctx.band, lm, q);
    cur.remaining_bits -= curr_bits;

    // Never bust the budget.
    while cur.remaining_bits < 0 && q > 0 {
        cur.remaining_bits += curr_bits;
        q -= 1;
        curr_bits = pulses2bits(mode, ctx.band, lm, q);
        cur.remaining_bits -= curr_bits;
    }

    if q != 0 {
        let k = get_pulses(q);
        return match &mut cur.coder {
            RangeCoder::Encoder(enc) => {
                alg_quant(x, n, k, ctx.spread, blocks, enc, gain, ctx.resynth)
            }
            RangeCoder::Decoder(dec) => alg_unquant(x, n, k, ctx.spread, blocks, dec, gain),
        };
    }

    if !ctx.resynth {
        return 0;
    }
    let cm_mask = ((1u64 << blocks) - 1) as u32;
    let fill = fill & cm_mask;
    if fill == 0 {
        x[..n].fill(0.0);
        return 0;
    }

    let cm = match lowband {
        None => {
            for v in &mut x[..n] {
                cur.seed = celt_lcg_rand(cur.seed);
                *v = (cur.seed as i32 >> 20) as f32;
            }
            cm_mask
        }
        Some(lowband) => {
            // About 48 dB below the folding level.
            const FOLD_NOISE: CeltNorm = 1.0 / 256.0;
            for (v, &l) in x[..n].iter_mut().zip(&lowband[..n]) {
                cur.seed = celt_lcg_rand(cur.seed);
                *v = l + if cur.seed & 0x8000 != 0 {
                    FOLD_NOISE
                } else {
                    -FOLD_NOISE
                };
            }
            fill
        }
    };
    renormalise_vector(x, n, gain);
    cm
}

/// Frame-level bit allocation consumed by [`quant_all_bands`].
#[derive(Debug, Clone)]
pub struct BandAllocation<'a> {
    pub start: usize,
    pub end: usize,
    /// Per-band target in 1/8th bits.
    pub pulses: &'a [i32],
    /// Per-band time-frequency resolution change.
    pub tf_res: &'a [i32],
    pub short_blocks: bool,
    pub spread: Spread,
    pub dual_stereo: bool,
    /// First band coded with intensity stereo.
    pub intensity: usize,
    /// Frame budget in 1/8th bits.
    pub total_bits: i32,
    pub balance: i32,
    pub lm: usize,
    /// Bands `start..coded_bands` receive bits.
    pub coded_bands: usize,
}

/// Codes the normalised shapes of bands `start..end` for one frame.
///
/// `x` (and `y` for stereo) hold the unit-norm spectrum at resolution
/// `alloc.lm`. Encoding with `resynth`, and always when decoding, the
/// buffers are replaced with the reconstructed shapes. `collapse_masks`
/// receives one mask per band and channel (`[band * channels + channel]`)
/// and also provides the folding masks of lower bands. `band_e` is only read
/// by the stereo encoder. `seed` is the noise generator state carried
/// between frames.
#[allow(clippy::too_many_arguments)]
pub fn quant_all_bands(
    mode: &CeltMode<'_>,
    alloc: &BandAllocation<'_>,
    x: &mut [CeltNorm],
    mut y: Option<&mut [CeltNorm]>,
    collapse_masks: &mut [u8],
    band_e: &[CeltEner],
    coder: RangeCoder<'_, '_>,
    resynth: bool,
    seed: &mut u32,
) {
    let encode = coder.is_encoder();
    let resynth = resynth || !encode;
    let channels = if y.is_some() { 2 } else { 1 };
    let lm = alloc.lm;
    let m = 1usize << lm;
    let blocks = if alloc.short_blocks { m } else { 1 };
    let nb_ebands = mode.num_ebands;

    assert!(lm <= mode.max_lm);
    assert!(alloc.start < alloc.end && alloc.end <= nb_ebands);
    assert!(alloc.pulses.len() >= alloc.end && alloc.tf_res.len() >= alloc.end);
    assert!(collapse_masks.len() >= channels * nb_ebands);
    let coded_len = mode.band_start(alloc.end.min(mode.effective_ebands), lm);
    assert!(x.len() >= coded_len);
    if let Some(y) = y.as_deref() {
        assert!(y.len() >= coded_len);
        assert!(!encode || band_e.len() >= 2 * nb_ebands, "stereo encoding needs band energies");
    }

    let spectrum_len = mode.spectrum_len(lm);
    let mut norm_buf = vec![0.0f32; channels * spectrum_len];
    let (norm, norm2) = norm_buf.split_at_mut(spectrum_len);
    let max_width = (0..nb_ebands).map(|i| mode.band_width(i)).max().unwrap_or(0) * m;
    let mut scratch = vec![0.0f32; max_width];
    let mut scratch2 = vec![0.0f32; max_width];
    let mut dummy_x: Vec<CeltNorm> = Vec::new();
    let mut dummy_y: Vec<CeltNorm> = Vec::new();

    let start_lo = mode.band_start(alloc.start, lm);
    let mut cur = BandCursor {
        coder,
        remaining_bits: 0,
        seed: *seed,
    };
    let mut balance = alloc.balance;
    let mut lowband_offset = 0usize;
    let mut update_lowband = true;
    let mut dual_stereo = alloc.dual_stereo && channels == 2;

    for i in alloc.start..alloc.end {
        let band_lo = mode.band_start(i, lm);
        let n = mode.band_width(i) * m;
        let tell = cur.coder.tell_frac() as i32;

        if i != alloc.start {
            balance -= tell;
        }
        cur.remaining_bits = alloc.total_bits - tell - 1;
        let b = if i < alloc.coded_bands {
            let curr_balance = balance / (alloc.coded_bands - i).min(3) as i32;
            (cur.remaining_bits + 1)
                .min(alloc.pulses[i] + curr_balance)
                .min(MAX_BAND_BITS)
                .max(0)
        } else {
            0
        };

        if resynth && band_lo >= start_lo + n && (update_lowband || lowband_offset == 0) {
            lowband_offset = i;
        }

        let tf_change = alloc.tf_res[i];

        // Conservative collapse masks of the bands we fold from.
        let mut effective_lowband = None;
        let (mut x_cm, mut y_cm);
        if lowband_offset != 0
            && (alloc.spread != Spread::Aggressive || blocks > 1 || tf_change < 0)
        {
            // Never repeat spectral content within one band.
            let eff = mode.band_start(lowband_offset, lm).saturating_sub(n).max(start_lo);
            let mut fold_start = lowband_offset;
            while fold_start > 0 {
                fold_start -= 1;
                if mode.band_start(fold_start, lm) <= eff {
                    break;
                }
            }
            let mut fold_end = lowband_offset;
            while fold_end < nb_ebands && mode.band_start(fold_end, lm) < eff + n {
                fold_end += 1;
            }
            x_cm = 0;
            y_cm = 0;
            for fold_i in fold_start..fold_end.max(fold_start + 1) {
                x_cm |= u32::from(collapse_masks[fold_i * channels]);
                y_cm |= u32::from(collapse_masks[fold_i * channels + channels - 1]);
            }
            effective_lowband = Some(eff);
        } else {
            // Noise folding: every block ends up non-zero.
            x_cm = (1 << blocks) - 1;
            y_cm = x_cm;
        }

        if dual_stereo && i == alloc.intensity {
            // Intensity from here on needs a single folding source.
            dual_stereo = false;
            for (mid, &side) in norm[start_lo..band_lo].iter_mut().zip(&norm2[start_lo..band_lo]) {
                *mid = 0.5 * (*mid + side);
            }
        }

        let ctx = BandCtx {
            encode,
            resynth,
            mode,
            band: i,
            intensity: alloc.intensity,
            spread: alloc.spread,
            tf_change,
            band_e,
        };

        // Bands past the short MDCT are coded from a throw-away copy of the
        // folding buffer to keep the bitstream in sync.
        let coded = i < mode.effective_ebands;
        let x_band: &mut [CeltNorm] = if coded {
            &mut x[band_lo..band_lo + n]
        } else {
            dummy_x.clear();
            dummy_x.extend_from_slice(&norm[..n]);
            &mut dummy_x
        };
        let y_band: Option<&mut [CeltNorm]> = match y.as_deref_mut() {
            Some(y) if coded => Some(&mut y[band_lo..band_lo + n]),
            Some(_) => {
                dummy_y.clear();
                dummy_y.extend_from_slice(&norm[..n]);
                Some(&mut dummy_y)
            }
            None => None,
        };

        let lowband = match effective_lowband {
            Some(eff) => {
                scratch[..n].copy_from_slice(&norm[eff..eff + n]);
                Some(&mut scratch[..n])
            }
            None => None,
        };

        if dual_stereo {
            let lowband2 = match effective_lowband {
                Some(eff) => {
                    scratch2[..n].copy_from_slice(&norm2[eff..eff + n]);
                    Some(&mut scratch2[..n])
                }
                None => None,
            };
            x_cm = quant_band(
                &ctx,
                &mut cur,
                x_band,
                None,
                n,
                b / 2,
                blocks,
                lowband,
                lm as i32,
                Some(&mut norm[band_lo..band_lo + n]),
                0,
                Q15_ONE,
                x_cm,
            );
            if let Some(y_band) = y_band {
                y_cm = quant_band(
                    &ctx,
                    &mut cur,
                    y_band,
                    None,
                    n,
                    b / 2,
                    blocks,
                    lowband2,
                    lm as i32,
                    Some(&mut norm2[band_lo..band_lo + n]),
                    0,
                    Q15_ONE,
                    y_cm,
                );
            }
        } else {
            x_cm = quant_band(
                &ctx,
                &mut cur,
                x_band,
                y_band,
                n,
                b,
                blocks,
                lowband,
                lm as i32,
                Some(&mut norm[band_lo..band_lo + n]),
                0,
                Q15_ONE,
                x_cm | y_cm,
            );
            y_cm = x_cm;
        }

        collapse_masks[i * channels] = x_cm as u8;
        collapse_masks[i * channels + channels - 1] = y_cm as u8;
        balance += alloc.pulses[i] + tell;

        // Move the folding source only while bands get at least 1 bit/sample.
        update_lowband = b > (n as i32) << BITRES;

        trace!(
            "band {i}: {n} bins, {b} bits, tf {tf_change}, masks {x_cm:#x}/{y_cm:#x}, \
             balance {balance}"
        );
    }

    *seed = cur.seed;
}
