//! State and bit accounting shared by the range encoder and decoder.
//!
//! Both directions of the coder keep the same bookkeeping so that
//! [`ec_tell_frac`] reports identical values at identical stream positions.
//! The band quantiser relies on that symmetry to make the same allocation
//! decisions on both sides of the channel.

use crate::celt::types::{OpusInt32, OpusUint32};

/// Window used to accumulate raw bits written at the end of the buffer.
pub type EcWindow = OpusUint32;

/// Width in bits of the raw-bit window.
pub const EC_WINDOW_SIZE: usize = core::mem::size_of::<EcWindow>() * 8;

/// Bits emitted per renormalisation step.
pub const EC_SYM_BITS: u32 = 8;

/// Width of the `val`/`rng` registers.
pub const EC_CODE_BITS: u32 = 32;

/// Largest symbol value emitted per step.
pub const EC_SYM_MAX: OpusUint32 = (1u32 << EC_SYM_BITS) - 1;

/// Shift that extracts the top symbol from the `val` register.
pub const EC_CODE_SHIFT: u32 = EC_CODE_BITS - EC_SYM_BITS - 1;

/// Carry bit of the top symbol.
pub const EC_CODE_TOP: OpusUint32 = 1u32 << (EC_CODE_BITS - 1);

/// Renormalisation threshold for the range.
pub const EC_CODE_BOT: OpusUint32 = EC_CODE_TOP >> EC_SYM_BITS;

/// Bits of the first byte not consumed by the decoder's initial fill.
pub const EC_CODE_EXTRA: u32 = ((EC_CODE_BITS - 2) % EC_SYM_BITS) + 1;

/// Most significant bits of a uniform integer that go through the range coder;
/// the remainder are written raw.
pub const EC_UINT_BITS: u32 = 8;

/// Fractional resolution (in bits) of [`ec_tell_frac`].
pub const BITRES: u32 = 3;

/// Coder registers plus the borrowed packet buffer.
///
/// The range part of the stream grows from the front of `buf`, raw bits grow
/// from the back.
#[derive(Debug)]
pub struct EcCtx<'a> {
    pub buf: &'a mut [u8],
    pub storage: OpusUint32,
    pub end_offs: OpusUint32,
    pub end_window: EcWindow,
    pub nend_bits: OpusInt32,
    pub nbits_total: OpusInt32,
    pub offs: OpusUint32,
    pub rng: OpusUint32,
    pub val: OpusUint32,
    pub ext: OpusUint32,
    pub rem: OpusInt32,
    pub error: OpusInt32,
}

impl<'a> EcCtx<'a> {
    /// Wraps `buf` with all registers cleared.
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        let storage = buf.len() as OpusUint32;
        Self {
            buf,
            storage,
            end_offs: 0,
            end_window: 0,
            nend_bits: 0,
            nbits_total: 0,
            offs: 0,
            rng: 0,
            val: 0,
            ext: 0,
            rem: 0,
            error: 0,
        }
    }

    /// Non-zero once the coder ran out of space or read an invalid symbol.
    #[must_use]
    pub fn error(&self) -> OpusInt32 {
        self.error
    }
}

/// Position of the highest set bit, plus one; zero for zero.
#[must_use]
pub fn ec_ilog(v: OpusUint32) -> OpusInt32 {
    (OpusUint32::BITS - v.leading_zeros()) as OpusInt32
}

/// Whole bits used so far, rounded up.
#[must_use]
pub fn ec_tell(ctx: &EcCtx<'_>) -> OpusInt32 {
    ctx.nbits_total - ec_ilog(ctx.rng)
}

/// Bits used so far in 1/8th-bit units, rounded up.
#[must_use]
pub fn ec_tell_frac(ctx: &EcCtx<'_>) -> OpusUint32 {
    // Upper bounds of each 1/8th bit step for the top 16 bits of `rng`.
    const CORRECTION: [u32; 8] = [35733, 38967, 42495, 46340, 50535, 55109, 60097, 65535];

    let nbits = (ctx.nbits_total as OpusUint32) << BITRES;
    let mut l = ec_ilog(ctx.rng);
    debug_assert!(l >= 16);
    let r = ctx.rng >> ((l - 16) as u32);
    let mut b = ((r >> 12) as usize).saturating_sub(8);
    if r > CORRECTION[b] {
        b += 1;
    }
    l = (l << BITRES) + b as OpusInt32;
    nbits.wrapping_sub(l as OpusUint32)
}

/// Unsigned division used by the coder. The float build divides directly.
#[inline]
#[must_use]
pub fn celt_udiv(n: OpusUint32, d: OpusUint32) -> OpusUint32 {
    debug_assert!(d > 0);
    n / d
}
