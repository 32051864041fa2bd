//! Range decoder mirroring `celt/entdec.c`.
//!
//! Reading past either end of the packet yields zero bytes rather than an
//! error, so a truncated or corrupted packet still decodes to *some* symbol
//! sequence. Out-of-range uniform integers are clamped and flagged in
//! [`EcCtx::error`].

use core::cmp::min;

use crate::celt::entcode::{
    EC_CODE_BITS, EC_CODE_BOT, EC_CODE_EXTRA, EC_CODE_TOP, EC_SYM_BITS, EC_SYM_MAX, EC_UINT_BITS,
    EC_WINDOW_SIZE, EcCtx, EcWindow, celt_udiv, ec_ilog,
};
use crate::celt::types::{OpusInt32, OpusUint32};

/// Range decoder reading from a packet buffer.
#[derive(Debug)]
pub struct EcDec<'a> {
    ctx: EcCtx<'a>,
}

impl<'a> EcDec<'a> {
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        let mut ctx = EcCtx::new(buf);
        ctx.nbits_total = EC_CODE_BITS as OpusInt32 + 1
            - (((EC_CODE_BITS - EC_CODE_EXTRA) / EC_SYM_BITS) * EC_SYM_BITS) as OpusInt32;
        ctx.rng = 1u32 << EC_CODE_EXTRA;

        let mut dec = Self { ctx };
        dec.ctx.rem = OpusInt32::from(dec.next_front());
        dec.ctx.val =
            dec.ctx.rng - 1 - ((dec.ctx.rem as OpusUint32) >> (EC_SYM_BITS - EC_CODE_EXTRA));
        dec.normalize();
        dec
    }

    #[must_use]
    pub fn ctx(&self) -> &EcCtx<'a> {
        &self.ctx
    }

    fn next_front(&mut self) -> u8 {
        if self.ctx.offs >= self.ctx.storage {
            return 0;
        }
        let byte = self.ctx.buf[self.ctx.offs as usize];
        self.ctx.offs += 1;
        byte
    }

    fn next_back(&mut self) -> u8 {
        if self.ctx.end_offs >= self.ctx.storage {
            return 0;
        }
        self.ctx.end_offs += 1;
        self.ctx.buf[(self.ctx.storage - self.ctx.end_offs) as usize]
    }

    fn normalize(&mut self) {
        while self.ctx.rng <= EC_CODE_BOT {
            self.ctx.nbits_total += EC_SYM_BITS as OpusInt32;
            self.ctx.rng <<= EC_SYM_BITS;
            let prev = self.ctx.rem as OpusUint32;
            self.ctx.rem = OpusInt32::from(self.next_front());
            let sym = ((prev << EC_SYM_BITS) | self.ctx.rem as OpusUint32)
                >> (EC_SYM_BITS - EC_CODE_EXTRA);
            self.ctx.val =
                ((self.ctx.val << EC_SYM_BITS) + (EC_SYM_MAX & !sym)) & (EC_CODE_TOP - 1);
        }
    }

    /// Returns the cumulative frequency of the next symbol out of `ft`.
    ///
    /// Must be followed by [`EcDec::update`] with the symbol's range.
    #[must_use]
    pub fn decode(&mut self, ft: OpusUint32) -> OpusUint32 {
        self.ctx.ext = celt_udiv(self.ctx.rng, ft);
        let s = self.ctx.val / self.ctx.ext;
        ft - min(s + 1, ft)
    }

    /// Consumes the symbol occupying `[fl, fh)` out of `ft`.
    pub fn update(&mut self, fl: OpusUint32, fh: OpusUint32, ft: OpusUint32) {
        let s = self.ctx.ext.wrapping_mul(ft - fh);
        self.ctx.val = self.ctx.val.wrapping_sub(s);
        self.ctx.rng = if fl > 0 {
            self.ctx.ext.wrapping_mul(fh - fl)
        } else {
            self.ctx.rng.wrapping_sub(s)
        };
        self.normalize();
    }

    /// Decodes a bit whose probability of being one is `1/(1<<logp)`.
    #[must_use]
    pub fn dec_bit_logp(&mut self, logp: u32) -> bool {
        let s = self.ctx.rng >> logp;
        let one = self.ctx.val < s;
        if one {
            self.ctx.rng = s;
        } else {
            self.ctx.val -= s;
            self.ctx.rng -= s;
        }
        self.normalize();
        one
    }

    /// Decodes an integer uniformly distributed in `[0, ft)`.
    #[must_use]
    pub fn dec_uint(&mut self, ft: OpusUint32) -> OpusUint32 {
        assert!(ft > 1, "uniform symbols need at least two values");
        let top = ft - 1;
        let ftb = ec_ilog(top) as u32;
        if ftb > EC_UINT_BITS {
            let raw = ftb - EC_UINT_BITS;
            let head_ft = (top >> raw) + 1;
            let head = self.decode(head_ft);
            self.update(head, head + 1, head_ft);
            let value = (head << raw) | self.dec_bits(raw);
            if value <= top {
                return value;
            }
            self.ctx.error = 1;
            top
        } else {
            let s = self.decode(ft);
            self.update(s, s + 1, ft);
            s
        }
    }

    /// Reads `bits` raw bits from the tail of the packet.
    #[must_use]
    pub fn dec_bits(&mut self, bits: u32) -> OpusUint32 {
        debug_assert!(bits > 0 && bits <= 25);
        let mut window: EcWindow = self.ctx.end_window;
        let mut available = self.ctx.nend_bits;
        if (available as u32) < bits {
            while available <= EC_WINDOW_SIZE as OpusInt32 - EC_SYM_BITS as OpusInt32 {
                window |= EcWindow::from(self.next_back()) << (available as u32);
                available += EC_SYM_BITS as OpusInt32;
            }
        }
        let value = window & ((1u32 << bits) - 1);
        self.ctx.end_window = window >> bits;
        self.ctx.nend_bits = available - bits as OpusInt32;
        self.ctx.nbits_total += bits as OpusInt32;
        value
    }
}

impl<'a> core::ops::Deref for EcDec<'a> {
    type Target = EcCtx<'a>;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

impl<'a> core::ops::DerefMut for EcDec<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ctx
    }
}
