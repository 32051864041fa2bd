//! Pulse cache and bit/pulse conversions from `celt/rate.c` and `celt/rate.h`.
//!
//! Band quantisation never reasons about PVQ sizes directly. It asks the
//! cache how many 1/8th bits a given pseudo-pulse count costs for a band
//! shape, and the inverse. The cache holds, for every distinct band width
//! across all LM values, the cost of each of the first `MAX_PSEUDO`
//! pseudo-pulse counts that still fit into a 32-bit codeword index.

use alloc::vec;
use alloc::vec::Vec;

use crate::celt::cwrs::get_required_bits;
use crate::celt::entcode::BITRES;
use crate::celt::modes::CeltMode;

/// Maximum pseudo-pulse index described in the C headers.
pub(crate) const MAX_PSEUDO: i32 = 40;
/// Base-2 logarithm of [`MAX_PSEUDO`] used by the search helpers.
pub(crate) const LOG_MAX_PSEUDO: i32 = 6;
/// Largest real pulse count a cache entry can describe.
pub(crate) const CELT_MAX_PULSES: usize = 128;
/// Offset applied to the qtheta bit allocation for the single phase search.
pub(crate) const QTHETA_OFFSET: i32 = 4;
/// Offset applied when performing the two-phase qtheta search.
pub(crate) const QTHETA_OFFSET_TWOPHASE: i32 = 16;

/// Returns the number of pulses represented by the pseudo-pulse index `i`.
///
/// The first eight entries map one-to-one, after which the sequence doubles
/// every eight indices while repeating the base pattern modulo eight.
#[must_use]
pub(crate) fn get_pulses(i: i32) -> i32 {
    if i < 8 {
        i
    } else {
        (8 + (i & 7)) << ((i >> 3) - 1)
    }
}

/// Determines if `V(N, K)` fits inside an unsigned 32-bit integer.
#[must_use]
pub(crate) fn fits_in32(n: i32, k: i32) -> bool {
    const MAX_N: [i16; 15] = [
        32767, 32767, 32767, 1476, 283, 109, 60, 40, 29, 24, 20, 18, 16, 14, 13,
    ];
    const MAX_K: [i16; 15] = [
        32767, 32767, 32767, 32767, 1172, 238, 95, 53, 36, 27, 22, 18, 16, 15, 13,
    ];

    if n >= 14 {
        if k >= 14 {
            false
        } else {
            n <= MAX_N[k as usize] as i32
        }
    } else {
        k <= MAX_K[n as usize] as i32
    }
}

/// Per-mode table of PVQ costs.
///
/// `index[(lm + 1) * nb_ebands + band]` points at a run in `bits` whose first
/// byte is the largest usable pseudo-pulse count `K` and whose following `K`
/// bytes are the costs, minus one, of pseudo-pulse counts `1..=K` in 1/8th
/// bits. Entries for zero-width shapes are `-1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PulseCache {
    pub size: usize,
    pub index: Vec<i16>,
    pub bits: Vec<u8>,
}

impl PulseCache {
    /// Cost run for `band` split to resolution `lm` (which may be `-1`).
    #[must_use]
    pub fn row(&self, nb_ebands: usize, lm: i32, band: usize) -> Option<&[u8]> {
        debug_assert!(lm >= -1);
        let slot = *self.index.get((lm + 1) as usize * nb_ebands + band)?;
        if slot < 0 {
            return None;
        }
        self.bits.get(slot as usize..)
    }
}

/// Builds the pulse cache for a band layout covering LM values `-1..=max_lm`.
#[must_use]
pub(crate) fn compute_pulse_cache(e_bands: &[i16], nb_ebands: usize, max_lm: usize) -> PulseCache {
    let rows = max_lm + 2;
    let width = |band: usize, shift: usize| -> i32 {
        (i32::from(e_bands[band + 1] - e_bands[band]) << shift) >> 1
    };

    let mut index = vec![-1i16; nb_ebands * rows];
    // (N, K, offset) for every distinct shape.
    let mut entries: Vec<(i32, i32, usize)> = Vec::new();
    let mut size = 0usize;

    for i in 0..rows {
        for j in 0..nb_ebands {
            let n = width(j, i);
            let slot = i * nb_ebands + j;
            'search: for k in 0..=i {
                for other in 0..nb_ebands {
                    if k == i && other >= j {
                        break;
                    }
                    if n == width(other, k) {
                        index[slot] = index[k * nb_ebands + other];
                        break 'search;
                    }
                }
            }
            if index[slot] == -1 && n != 0 {
                let mut k = 0;
                while k < MAX_PSEUDO && fits_in32(n, get_pulses(k + 1)) {
                    k += 1;
                }
                entries.push((n, k, size));
                index[slot] = size as i16;
                size += k as usize + 1;
            }
        }
    }

    let mut bits = vec![0u8; size];
    let mut required = [0i16; CELT_MAX_PULSES + 1];
    for &(n, k, offset) in &entries {
        let run = &mut bits[offset..=offset + k as usize];
        if k > 0 {
            get_required_bits(&mut required, n as usize, get_pulses(k) as usize, BITRES as i32);
            for j in 1..=k as usize {
                run[j] = (required[get_pulses(j as i32) as usize] - 1) as u8;
            }
        }
        run[0] = k as u8;
    }

    PulseCache { size, index, bits }
}

/// Largest pseudo-pulse count whose cost is closest to `bits`.
#[must_use]
pub(crate) fn bits2pulses(mode: &CeltMode<'_>, band: usize, lm: i32, bits: i32) -> i32 {
    let Some(cache) = mode.cache.row(mode.num_ebands, lm, band) else {
        return 0;
    };
    let bits = bits - 1;
    let mut lo = 0i32;
    let mut hi = i32::from(cache[0]);
    for _ in 0..LOG_MAX_PSEUDO {
        let mid = (lo + hi + 1) >> 1;
        if i32::from(cache[mid as usize]) >= bits {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    let below = if lo == 0 { -1 } else { i32::from(cache[lo as usize]) };
    if bits - below <= i32::from(cache[hi as usize]) - bits {
        lo
    } else {
        hi
    }
}

/// Cost in 1/8th bits of coding `pulses` pseudo-pulses in `band` at `lm`.
#[must_use]
pub(crate) fn pulses2bits(mode: &CeltMode<'_>, band: usize, lm: i32, pulses: i32) -> i32 {
    if pulses == 0 {
        return 0;
    }
    mode.cache
        .row(mode.num_ebands, lm, band)
        .map_or(0, |cache| i32::from(cache[pulses as usize]) + 1)
}
