//! Numeric helpers from `celt/mathops.h` and `celt/arch.h`.
//!
//! The float wrappers map directly onto `libm`. The Q15 helpers at the end are
//! integer-exact and are used wherever a value feeds the bitstream, so they
//! must give the same answer on every platform.

use libm::{expf, sqrtf};

use crate::celt::types::{OpusInt16, OpusInt32, OpusVal16, OpusVal32};

/// Integer square root mirroring `isqrt32()` from `celt/mathops.c`.
///
/// Returns `floor(sqrt(value))` using a bit-by-bit refinement that starts at
/// the highest set bit.
#[must_use]
pub(crate) fn isqrt32(mut value: u32) -> u32 {
    if value == 0 {
        return 0;
    }

    let mut root = 0u32;
    let mut bit_shift = ((32 - value.leading_zeros()) as i32 - 1) >> 1;
    let mut bit = 1u32 << (bit_shift as u32);

    while bit_shift >= 0 {
        let trial = ((root << 1) + bit) << (bit_shift as u32);
        if trial <= value {
            root += bit;
            value -= trial;
        }
        bit >>= 1;
        bit_shift -= 1;
    }

    root
}

#[inline]
#[must_use]
pub(crate) fn celt_sqrt(x: OpusVal32) -> OpusVal32 {
    sqrtf(x)
}

#[inline]
#[must_use]
pub(crate) fn celt_rsqrt(x: OpusVal32) -> OpusVal32 {
    1.0 / sqrtf(x)
}

/// Reciprocal square root of a value already normalised to a sane range.
#[inline]
#[must_use]
pub(crate) fn celt_rsqrt_norm(x: OpusVal32) -> OpusVal16 {
    1.0 / sqrtf(x)
}

#[inline]
#[must_use]
pub(crate) fn celt_rcp(x: OpusVal32) -> OpusVal32 {
    1.0 / x
}

/// Base-2 exponential used by CELT's float build.
#[inline]
#[must_use]
pub(crate) fn celt_exp2(x: f32) -> f32 {
    const LN_2: f32 = core::f32::consts::LN_2;
    expf(LN_2 * x)
}

/// `FRAC_MUL16()`: rounded Q15 product of two values truncated to 16 bits.
#[inline]
#[must_use]
pub(crate) fn frac_mul16(a: OpusInt32, b: OpusInt32) -> OpusInt32 {
    (16_384 + OpusInt32::from(a as OpusInt16) * OpusInt32::from(b as OpusInt16)) >> 15
}

/// `MULT16_16_P15()` in the float build: a plain product.
#[inline]
#[must_use]
pub(crate) fn mult16_16_p15(a: OpusVal16, b: OpusVal16) -> OpusVal16 {
    a * b
}
