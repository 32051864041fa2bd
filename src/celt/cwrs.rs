//! Pulse vector enumeration from `celt/cwrs.c`.
//!
//! A PVQ codeword is an integer vector of dimension `N` whose absolute values
//! sum to `K`. Codewords are mapped to and from a dense index in
//! `[0, V(N, K))`, which the range coder then sends as a uniform integer.
//!
//! The table-free variant is used: a single row of the `U(N, K)` recurrence is
//! built on demand and walked forward (indexing) or backward (decoding), so
//! the memory cost is `K + 2` words per call.

use alloc::vec;

use crate::celt::entcode::ec_ilog;
use crate::celt::entdec::EcDec;
use crate::celt::entenc::EcEnc;
use crate::celt::types::{OpusInt32, OpusUint32, OpusVal32};

/// Returns a conservatively large estimate of `log2(val)` with `frac` fractional bits.
///
/// The result is never below the exact value, which the allocation code
/// relies on to avoid overrunning its budget.
#[must_use]
pub(crate) fn log2_frac(mut val: OpusUint32, frac: OpusInt32) -> OpusInt32 {
    debug_assert!(val > 0);
    debug_assert!(frac >= 0);

    let l = ec_ilog(val);
    if val & (val - 1) == 0 {
        return (l - 1) << frac;
    }

    // Normalise to a Q15 mantissa in [1, 2) and square it repeatedly, each
    // squaring revealing one more fractional bit.
    if l > 16 {
        val = ((val - 1) >> ((l - 16) as u32)) + 1;
    } else {
        val <<= (16 - l) as u32;
    }

    let mut acc = (l - 1) << frac;
    let mut current_frac = frac;
    loop {
        let b = (val >> 16) as OpusInt32;
        acc += b << (current_frac as u32);
        val = (val + b as OpusUint32) >> (b as u32);
        val = ((val * val) + 0x7FFF) >> 15;
        if current_frac <= 0 {
            break;
        }
        current_frac -= 1;
    }

    acc + OpusInt32::from(val > 0x8000)
}

/// Advances `u` from row `n` to row `n + 1` of the `U(N, K)` table.
fn unext(u: &mut [OpusUint32], len: usize, mut ui0: OpusUint32) {
    let mut j = 1;
    loop {
        let ui1 = u[j].wrapping_add(u[j - 1]).wrapping_add(ui0);
        u[j - 1] = ui0;
        ui0 = ui1;
        j += 1;
        if j >= len {
            break;
        }
    }
    u[j - 1] = ui0;
}

/// Steps `u` back from row `n` to row `n - 1`.
fn uprev(u: &mut [OpusUint32], len: usize, mut ui0: OpusUint32) {
    let mut j = 1;
    loop {
        let ui1 = u[j].wrapping_sub(u[j - 1]).wrapping_sub(ui0);
        u[j - 1] = ui0;
        ui0 = ui1;
        j += 1;
        if j >= len {
            break;
        }
    }
    u[j - 1] = ui0;
}

/// Fills `u[0..k + 2]` with row `n` of `U` and returns `V(n, k)`.
fn ncwrs_urow(n: usize, k: usize, u: &mut [OpusUint32]) -> OpusUint32 {
    debug_assert!(n >= 2 && k > 0);
    let len = k + 2;
    u[0] = 0;
    u[1] = 1;
    for (kk, slot) in u.iter_mut().enumerate().take(len).skip(2) {
        *slot = ((kk as OpusUint32) << 1) - 1;
    }
    for _ in 2..n {
        unext(&mut u[1..], k + 1, 1);
    }
    u[k].wrapping_add(u[k + 1])
}

/// Returns the index of codeword `y` together with `V(n, k)`.
fn icwrs(
    n: usize,
    k_total: usize,
    y: &[OpusInt32],
    u: &mut [OpusUint32],
) -> (OpusUint32, OpusUint32) {
    debug_assert!(n >= 2);
    u[0] = 0;
    for (k, slot) in u.iter_mut().enumerate().take(k_total + 2).skip(1) {
        *slot = ((k as OpusUint32) << 1) - 1;
    }

    let mut k = y[n - 1].unsigned_abs() as usize;
    let mut i = OpusUint32::from(y[n - 1] < 0);
    let mut j = n - 2;
    loop {
        i = i.wrapping_add(u[k]);
        k += y[j].unsigned_abs() as usize;
        if y[j] < 0 {
            i = i.wrapping_add(u[k + 1]);
        }
        if j == 0 {
            break;
        }
        j -= 1;
        unext(u, k_total + 2, 0);
    }

    (i, u[k].wrapping_add(u[k + 1]))
}

/// Rebuilds the codeword with index `i` from row `n` of `U`, returning the
/// squared norm of the result.
fn cwrsi(
    n: usize,
    mut k: usize,
    mut i: OpusUint32,
    y: &mut [OpusInt32],
    u: &mut [OpusUint32],
) -> OpusVal32 {
    let mut yy = 0.0;
    for slot in y.iter_mut().take(n) {
        let p = u[k + 1];
        let negative = i >= p;
        if negative {
            i -= p;
        }
        let start = k;
        let mut p = u[k];
        while p > i {
            k -= 1;
            p = u[k];
        }
        i -= p;
        let magnitude = (start - k) as OpusInt32;
        let value = if negative { -magnitude } else { magnitude };
        *slot = value;
        yy += (value * value) as OpusVal32;
        uprev(u, k + 2, 0);
    }
    yy
}

/// Indexes the codeword `y` (dimension `n`, `k` pulses) and writes it to `enc`.
pub(crate) fn encode_pulses(y: &[OpusInt32], n: usize, k: usize, enc: &mut EcEnc<'_>) {
    assert!(k > 0, "a codeword needs at least one pulse");
    debug_assert_eq!(
        y.iter()
            .take(n)
            .map(|v| v.unsigned_abs() as usize)
            .sum::<usize>(),
        k
    );
    let mut u = vec![0u32; k + 2];
    let (index, count) = icwrs(n, k, y, &mut u);
    enc.enc_uint(index, count);
}

/// Reads a codeword of dimension `n` with `k` pulses into `y`; returns its
/// squared norm.
pub(crate) fn decode_pulses(
    y: &mut [OpusInt32],
    n: usize,
    k: usize,
    dec: &mut EcDec<'_>,
) -> OpusVal32 {
    assert!(k > 0, "a codeword needs at least one pulse");
    let mut u = vec![0u32; k + 2];
    let count = ncwrs_urow(n, k, &mut u);
    let index = dec.dec_uint(count);
    cwrsi(n, k, index, y, &mut u)
}

/// Computes `log2(V(n, k))` in `1/(1<<frac)` bit units for `k` in
/// `0..=maxk`, storing the results in `bits`.
pub(crate) fn get_required_bits(bits: &mut [i16], n: usize, maxk: usize, frac: OpusInt32) {
    assert!(maxk > 0);
    bits[0] = 0;
    if n == 1 {
        for slot in bits.iter_mut().take(maxk + 1).skip(1) {
            *slot = 1 << frac;
        }
        return;
    }
    let mut u = vec![0u32; maxk + 2];
    ncwrs_urow(n, maxk, &mut u);
    for k in 1..=maxk {
        bits[k] = log2_frac(u[k].wrapping_add(u[k + 1]), frac) as i16;
    }
}
