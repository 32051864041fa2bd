#![no_std]

//! Safe Rust port of the CELT band layer.
//!
//! The crate covers what sits between the MDCT and the range coder in a CELT
//! codec: per-band energies and normalisation, the spreading decision, the
//! recursive PVQ band quantiser with its stereo and time-frequency tools,
//! anti-collapse noise and the pitch/LPC helpers used around it. The same
//! [`quant_all_bands`] call encodes or decodes depending on the
//! [`RangeCoder`] it is handed.

extern crate alloc;

mod celt;

pub use crate::celt::{
    BITRES, BandAllocation, CeltEner, CeltGlog, CeltMode, CeltNorm, CeltSig, EBAND_5MS, EcCtx,
    EcDec, EcEnc, EnergyHistory, MAX_LM, ModeError, PulseCache, RangeCoder, Spread,
    SpreadState, anti_collapse, celt_autocorr, celt_fir, celt_iir, celt_lpc,
    compute_band_energies, denormalise_bands, ec_tell, ec_tell_frac, normalise_bands,
    pitch_downsample, pitch_search, quant_all_bands, remove_doubling, spreading_decision,
};
