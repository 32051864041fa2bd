//! CELT band layer internals.
//!
//! Each module mirrors one file of the reference `celt/` directory so that
//! formulas can be checked side by side. Only the items that make up the
//! crate's public surface are re-exported publicly; the rest stay
//! crate-internal.

mod band_quant;
mod bands;
mod coder;
mod cwrs;
mod entcode;
mod entdec;
mod entenc;
mod lpc;
mod math;
mod modes;
mod pitch;
mod rate;
mod types;
mod vq;

pub use band_quant::{BandAllocation, quant_all_bands};
pub use bands::{
    EnergyHistory, SpreadState, anti_collapse, compute_band_energies, denormalise_bands,
    normalise_bands, spreading_decision,
};
pub use coder::RangeCoder;
pub use entcode::{BITRES, EcCtx, ec_tell, ec_tell_frac};
pub use entdec::EcDec;
pub use entenc::EcEnc;
pub use lpc::{celt_autocorr, celt_fir, celt_iir, celt_lpc};
pub use modes::{CeltMode, EBAND_5MS, MAX_LM, ModeError};
pub use pitch::{pitch_downsample, pitch_search, remove_doubling};
pub use rate::PulseCache;
pub use types::{CeltEner, CeltGlog, CeltNorm, CeltSig};
pub use vq::Spread;
