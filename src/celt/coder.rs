//! Direction-agnostic handle over the range encoder and decoder.
//!
//! The band quantiser is a single recursive routine that runs on both sides
//! of the channel. Each `code_*` helper encodes the value it is handed when
//! wrapping an encoder, and ignores it and returns the decoded value when
//! wrapping a decoder, so the call sites read the same in both directions.

use crate::celt::entcode::ec_tell_frac;
use crate::celt::entdec::EcDec;
use crate::celt::entenc::EcEnc;
use crate::celt::types::OpusUint32;

/// Borrowed range coder in either direction.
#[derive(Debug)]
pub enum RangeCoder<'c, 'b> {
    Encoder(&'c mut EcEnc<'b>),
    Decoder(&'c mut EcDec<'b>),
}

impl RangeCoder<'_, '_> {
    #[inline]
    #[must_use]
    pub fn is_encoder(&self) -> bool {
        matches!(self, Self::Encoder(_))
    }

    /// Bits used so far in 1/8th-bit units.
    #[must_use]
    pub fn tell_frac(&self) -> OpusUint32 {
        match self {
            Self::Encoder(enc) => ec_tell_frac(enc),
            Self::Decoder(dec) => ec_tell_frac(dec),
        }
    }

    /// Raw bits.
    pub fn code_bits(&mut self, value: OpusUint32, bits: u32) -> OpusUint32 {
        match self {
            Self::Encoder(enc) => {
                enc.enc_bits(value, bits);
                value
            }
            Self::Decoder(dec) => dec.dec_bits(bits),
        }
    }

    /// Uniform integer in `[0, ft)`.
    pub fn code_uint(&mut self, value: OpusUint32, ft: OpusUint32) -> OpusUint32 {
        match self {
            Self::Encoder(enc) => {
                enc.enc_uint(value, ft);
                value
            }
            Self::Decoder(dec) => dec.dec_uint(ft),
        }
    }

    /// Flag that is set with probability `1/(1<<logp)`.
    pub fn code_bit_logp(&mut self, value: bool, logp: u32) -> bool {
        match self {
            Self::Encoder(enc) => {
                enc.enc_bit_logp(value, logp);
                value
            }
            Self::Decoder(dec) => dec.dec_bit_logp(logp),
        }
    }

    /// Symbol occupying `[fl, fh)` of `ft` on the encoder side. On the decoder
    /// side `locate` maps the decoded cumulative frequency to the symbol and
    /// its range, which is then consumed.
    pub fn code_symbol<F>(&mut self, symbol: (u32, u32, u32), ft: u32, locate: F) -> u32
    where
        F: FnOnce(u32) -> (u32, u32, u32),
    {
        match self {
            Self::Encoder(enc) => {
                let (value, fl, fh) = symbol;
                enc.encode(fl, fh, ft);
                value
            }
            Self::Decoder(dec) => {
                let fs = dec.decode(ft);
                let (value, fl, fh) = locate(fs);
                dec.update(fl, fh, ft);
                value
            }
        }
    }
}
