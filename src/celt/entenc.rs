//! Range encoder mirroring `celt/entenc.c`.
//!
//! Only the primitives the band layer emits are provided: cumulative
//! frequency symbols, bits with a power-of-two probability, uniform integers
//! and raw bits.

use crate::celt::entcode::{
    EC_CODE_BITS, EC_CODE_BOT, EC_CODE_SHIFT, EC_CODE_TOP, EC_SYM_BITS, EC_SYM_MAX, EC_UINT_BITS,
    EC_WINDOW_SIZE, EcCtx, EcWindow, celt_udiv, ec_ilog,
};
use crate::celt::types::{OpusInt32, OpusUint32};

/// Range encoder writing into a caller-owned packet buffer.
#[derive(Debug)]
pub struct EcEnc<'a> {
    ctx: EcCtx<'a>,
}

impl<'a> EcEnc<'a> {
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        let mut ctx = EcCtx::new(buf);
        ctx.nbits_total = EC_CODE_BITS as OpusInt32 + 1;
        ctx.rng = EC_CODE_TOP;
        ctx.rem = -1;
        Self { ctx }
    }

    #[must_use]
    pub fn ctx(&self) -> &EcCtx<'a> {
        &self.ctx
    }

    fn push_front(&mut self, value: OpusUint32) {
        if self.ctx.offs + self.ctx.end_offs >= self.ctx.storage {
            self.ctx.error = -1;
            return;
        }
        self.ctx.buf[self.ctx.offs as usize] = value as u8;
        self.ctx.offs += 1;
    }

    fn push_back(&mut self, value: OpusUint32) {
        if self.ctx.offs + self.ctx.end_offs >= self.ctx.storage {
            self.ctx.error = -1;
            return;
        }
        self.ctx.end_offs += 1;
        let idx = (self.ctx.storage - self.ctx.end_offs) as usize;
        self.ctx.buf[idx] = value as u8;
    }

    /// Emits one symbol, delaying runs of `0xFF` until the carry is known.
    fn carry_out(&mut self, c: OpusInt32) {
        if c == EC_SYM_MAX as OpusInt32 {
            self.ctx.ext = self.ctx.ext.wrapping_add(1);
            return;
        }
        let carry = c >> EC_SYM_BITS;
        if self.ctx.rem >= 0 {
            self.push_front((self.ctx.rem + carry) as OpusUint32);
        }
        let pending = (EC_SYM_MAX + carry as OpusUint32) & EC_SYM_MAX;
        while self.ctx.ext > 0 {
            self.push_front(pending);
            self.ctx.ext -= 1;
        }
        self.ctx.rem = c & EC_SYM_MAX as OpusInt32;
    }

    fn normalize(&mut self) {
        while self.ctx.rng <= EC_CODE_BOT {
            self.carry_out((self.ctx.val >> EC_CODE_SHIFT) as OpusInt32);
            self.ctx.val = (self.ctx.val << EC_SYM_BITS) & (EC_CODE_TOP - 1);
            self.ctx.rng <<= EC_SYM_BITS;
            self.ctx.nbits_total += EC_SYM_BITS as OpusInt32;
        }
    }

    /// Encodes the symbol occupying `[fl, fh)` out of a total of `ft`.
    pub fn encode(&mut self, fl: OpusUint32, fh: OpusUint32, ft: OpusUint32) {
        debug_assert!(fl < fh && fh <= ft);
        let r = celt_udiv(self.ctx.rng, ft);
        if fl > 0 {
            self.ctx.val = self
                .ctx
                .val
                .wrapping_add(self.ctx.rng.wrapping_sub(r.wrapping_mul(ft - fl)));
            self.ctx.rng = r.wrapping_mul(fh - fl);
        } else {
            self.ctx.rng = self.ctx.rng.wrapping_sub(r.wrapping_mul(ft - fh));
        }
        self.normalize();
    }

    /// Encodes `val` where a one has probability `1/(1<<logp)`.
    pub fn enc_bit_logp(&mut self, val: bool, logp: u32) {
        let s = self.ctx.rng >> logp;
        if val {
            self.ctx.val = self.ctx.val.wrapping_add(self.ctx.rng - s);
            self.ctx.rng = s;
        } else {
            self.ctx.rng -= s;
        }
        self.normalize();
    }

    /// Encodes `fl` uniformly in `[0, ft)`.
    pub fn enc_uint(&mut self, fl: OpusUint32, ft: OpusUint32) {
        assert!(ft > 1, "uniform symbols need at least two values");
        debug_assert!(fl < ft);
        let top = ft - 1;
        let ftb = ec_ilog(top) as u32;
        if ftb > EC_UINT_BITS {
            let raw = ftb - EC_UINT_BITS;
            let head = fl >> raw;
            self.encode(head, head + 1, (top >> raw) + 1);
            self.enc_bits(fl & ((1u32 << raw) - 1), raw);
        } else {
            self.encode(fl, fl + 1, ft);
        }
    }

    /// Appends `bits` raw bits to the tail of the packet.
    pub fn enc_bits(&mut self, fl: OpusUint32, bits: u32) {
        debug_assert!(bits > 0 && bits <= 25);
        let mut window = self.ctx.end_window;
        let mut used = self.ctx.nend_bits;
        if used as u32 + bits > EC_WINDOW_SIZE as u32 {
            while used >= EC_SYM_BITS as OpusInt32 {
                self.push_back(window & EC_SYM_MAX);
                window >>= EC_SYM_BITS;
                used -= EC_SYM_BITS as OpusInt32;
            }
        }
        window |= (fl as EcWindow) << (used as u32);
        used += bits as OpusInt32;
        self.ctx.end_window = window;
        self.ctx.nend_bits = used;
        self.ctx.nbits_total += bits as OpusInt32;
    }

    /// Flushes the range state and raw bits, zero-filling the gap between
    /// them.
    pub fn enc_done(&mut self) {
        let mut window = self.ctx.end_window;
        let mut used = self.ctx.nend_bits;
        // Shortest code that still lies inside the final interval.
        let mut l = EC_CODE_BITS as OpusInt32 - ec_ilog(self.ctx.rng);
        let mut msk = (EC_CODE_TOP - 1) >> l;
        let mut end = self.ctx.val.wrapping_add(msk) & !msk;
        if (end | msk) >= self.ctx.val.wrapping_add(self.ctx.rng) {
            l += 1;
            msk >>= 1;
            end = self.ctx.val.wrapping_add(msk) & !msk;
        }
        while l > 0 {
            self.carry_out((end >> EC_CODE_SHIFT) as OpusInt32);
            end = (end << EC_SYM_BITS) & (EC_CODE_TOP - 1);
            l -= EC_SYM_BITS as OpusInt32;
        }
        if self.ctx.rem >= 0 || self.ctx.ext > 0 {
            self.carry_out(0);
        }
        while used >= EC_SYM_BITS as OpusInt32 {
            self.push_back(window & EC_SYM_MAX);
            window >>= EC_SYM_BITS;
            used -= EC_SYM_BITS as OpusInt32;
        }
        if self.ctx.error == 0 {
            let start = self.ctx.offs as usize;
            let stop = (self.ctx.storage - self.ctx.end_offs) as usize;
            self.ctx.buf[start..stop].fill(0);
            if used > 0 {
                if self.ctx.end_offs >= self.ctx.storage {
                    self.ctx.error = -1;
                } else {
                    let room = -l;
                    if self.ctx.offs + self.ctx.end_offs >= self.ctx.storage && room < used {
                        window &= if room > 0 { (1u32 << room) - 1 } else { 0 };
                        self.ctx.error = -1;
                    }
                    let idx = (self.ctx.storage - self.ctx.end_offs - 1) as usize;
                    self.ctx.buf[idx] |= window as u8;
                }
            }
        }
        self.ctx.end_window = window;
        self.ctx.nend_bits = used;
    }
}

impl<'a> core::ops::Deref for EcEnc<'a> {
    type Target = EcCtx<'a>;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

impl<'a> core::ops::DerefMut for EcEnc<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ctx
    }
}
