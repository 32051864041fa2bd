//! Band layout and derived tables, following `celt/modes.c`.
//!
//! A [`CeltMode`] borrows the band boundary table (in units of short-MDCT
//! bins) and derives everything the band layer needs from it: per-band
//! `log2` widths, the number of bands that actually fit in the spectrum and
//! the PVQ pulse cache.

use alloc::vec::Vec;
use core::fmt;

use log::debug;

use crate::celt::cwrs::log2_frac;
use crate::celt::entcode::BITRES;
use crate::celt::rate::{PulseCache, compute_pulse_cache};

/// Largest supported block-size exponent (eight short blocks per frame).
pub const MAX_LM: usize = 3;

/// Band edges of the standard 48 kHz layout, in 2.5 ms-frame bins.
pub const EBAND_5MS: [i16; 22] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 12, 14, 16, 20, 24, 28, 34, 40, 48, 60, 78, 100,
];

/// Reasons a band layout cannot be turned into a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeError {
    /// Fewer than two band edges were supplied.
    EmptyBandTable,
    /// The edge at `index` does not increase over its predecessor.
    NonMonotonicBands { index: usize },
    /// The requested largest LM is above [`MAX_LM`].
    UnsupportedLm(usize),
    /// The first band starts beyond the short MDCT.
    BandsExceedSpectrum,
}

impl fmt::Display for ModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyBandTable => f.write_str("band table needs at least two edges"),
            Self::NonMonotonicBands { index } => {
                write!(f, "band edge {index} is not above the previous edge")
            }
            Self::UnsupportedLm(lm) => write!(f, "unsupported block size exponent: {lm}"),
            Self::BandsExceedSpectrum => f.write_str("band table starts beyond the spectrum"),
        }
    }
}

impl core::error::Error for ModeError {}

/// Static description of a CELT band layout.
#[derive(Debug, Clone)]
pub struct CeltMode<'a> {
    pub sample_rate: i32,
    /// Bins per short MDCT block.
    pub short_mdct_size: usize,
    pub num_ebands: usize,
    /// Bands whose upper edge lies inside the short MDCT.
    pub effective_ebands: usize,
    pub e_bands: &'a [i16],
    pub max_lm: usize,
    /// `log2` of each band width in 1/8th bits.
    pub log_n: Vec<i16>,
    pub cache: PulseCache,
}

impl<'a> CeltMode<'a> {
    /// Validates `e_bands` and derives the per-band tables.
    pub fn new(
        sample_rate: i32,
        short_mdct_size: usize,
        e_bands: &'a [i16],
        max_lm: usize,
    ) -> Result<Self, ModeError> {
        if e_bands.len() < 2 {
            return Err(ModeError::EmptyBandTable);
        }
        if max_lm > MAX_LM {
            return Err(ModeError::UnsupportedLm(max_lm));
        }
        if e_bands[0] < 0 {
            return Err(ModeError::NonMonotonicBands { index: 0 });
        }
        if let Some(index) = (1..e_bands.len()).find(|&i| e_bands[i] <= e_bands[i - 1]) {
            return Err(ModeError::NonMonotonicBands { index });
        }
        if e_bands[0] as usize >= short_mdct_size {
            return Err(ModeError::BandsExceedSpectrum);
        }

        let num_ebands = e_bands.len() - 1;
        let mut effective_ebands = num_ebands;
        while e_bands[effective_ebands] as usize > short_mdct_size {
            effective_ebands -= 1;
        }

        let log_n = (0..num_ebands)
            .map(|i| log2_frac((e_bands[i + 1] - e_bands[i]) as u32, BITRES as i32) as i16)
            .collect();
        let cache = compute_pulse_cache(e_bands, num_ebands, max_lm);

        debug!(
            "celt mode: {sample_rate} Hz, {num_ebands} bands ({effective_ebands} effective), \
             max LM {max_lm}, pulse cache {} bytes",
            cache.size
        );

        Ok(Self {
            sample_rate,
            short_mdct_size,
            num_ebands,
            effective_ebands,
            e_bands,
            max_lm,
            log_n,
            cache,
        })
    }

    /// The 21-band 48 kHz layout with a 120-bin short MDCT.
    #[must_use]
    pub fn standard_48k() -> CeltMode<'static> {
        match CeltMode::new(48_000, 120, &EBAND_5MS, MAX_LM) {
            Ok(mode) => mode,
            Err(err) => unreachable!("standard band layout rejected: {err}"),
        }
    }

    /// Width of `band` in short-MDCT bins.
    #[inline]
    #[must_use]
    pub fn band_width(&self, band: usize) -> usize {
        (self.e_bands[band + 1] - self.e_bands[band]) as usize
    }

    /// First bin of `band` in a frame made of `1 << lm` short blocks.
    #[inline]
    #[must_use]
    pub fn band_start(&self, band: usize, lm: usize) -> usize {
        (self.e_bands[band] as usize) << lm
    }

    /// Spectrum length covered by all bands at resolution `lm`.
    #[inline]
    #[must_use]
    pub fn spectrum_len(&self, lm: usize) -> usize {
        self.band_start(self.num_ebands, lm)
    }
}

#[cfg(test)]
mod tests {
    use super::{CeltMode, EBAND_5MS, ModeError};

    #[test]
    fn standard_layout_derives_reference_tables() {
        let mode = CeltMode::standard_48k();
        assert_eq!(mode.num_ebands, 21);
        assert_eq!(mode.effective_ebands, 21);
        assert_eq!(
            mode.log_n,
            [
                0, 0, 0, 0, 0, 0, 0, 0, 8, 8, 8, 8, 16, 16, 16, 21, 21, 24, 29, 34, 36
            ]
        );
        assert_eq!(mode.spectrum_len(3), 800);
        assert_eq!(mode.band_start(9, 2), 40);
        assert_eq!(mode.band_width(20), 22);
    }

    #[test]
    fn bands_beyond_short_mdct_are_not_effective() {
        let mode = CeltMode::new(48_000, 50, &EBAND_5MS, 3).unwrap();
        assert_eq!(mode.effective_ebands, 18);
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        assert_eq!(
            CeltMode::new(48_000, 120, &[0], 3).unwrap_err(),
            ModeError::EmptyBandTable
        );
        assert_eq!(
            CeltMode::new(48_000, 120, &[0, 2, 2, 4], 3).unwrap_err(),
            ModeError::NonMonotonicBands { index: 2 }
        );
        assert_eq!(
            CeltMode::new(48_000, 120, &EBAND_5MS, 4).unwrap_err(),
            ModeError::UnsupportedLm(4)
        );
        assert_eq!(
            CeltMode::new(48_000, 4, &[8, 9], 0).unwrap_err(),
            ModeError::BandsExceedSpectrum
        );
    }

    #[test]
    fn errors_render_readable_messages() {
        let err = ModeError::NonMonotonicBands { index: 5 };
        assert_eq!(alloc::format!("{err}"), "band edge 5 is not above the previous edge");
    }
}
