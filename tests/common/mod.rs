#![allow(dead_code)]

use celt_bands::{
    BITRES, BandAllocation, CeltMode, EcDec, EcEnc, RangeCoder, Spread, compute_band_energies,
    ec_tell_frac, normalise_bands, quant_all_bands,
};

pub const MAX_PACKET_BYTES: usize = 1275;

/// Deterministic noise source for reproducible spectra.
pub struct Lcg(u32);

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Self(seed)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.0
    }

    /// Uniform sample in `[-1, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 23) as f32 - 1.0
    }
}

/// MDCT-like spectrum of `channels * (short_mdct_size << lm)` bins whose
/// level falls off with frequency.
pub fn synthetic_spectrum(
    mode: &CeltMode<'_>,
    lm: usize,
    channels: usize,
    seed: u32,
) -> Vec<f32> {
    let stride = mode.short_mdct_size << lm;
    let mut lcg = Lcg::new(seed);
    (0..channels * stride)
        .map(|idx| {
            let bin = (idx % stride) as f32;
            lcg.next_f32() * 1000.0 / (1.0 + bin / 16.0)
        })
        .collect()
}

/// A frame ready for band quantisation.
pub struct NormalisedFrame {
    pub channels: usize,
    pub spectrum: Vec<f32>,
    pub band_e: Vec<f32>,
    pub x: Vec<f32>,
    pub y: Option<Vec<f32>>,
}

pub fn normalise(
    mode: &CeltMode<'_>,
    lm: usize,
    channels: usize,
    spectrum: Vec<f32>,
) -> NormalisedFrame {
    let stride = mode.short_mdct_size << lm;
    let end = mode.num_ebands;
    let mut band_e = vec![0.0f32; channels * end];
    compute_band_energies(mode, &spectrum, &mut band_e, end, channels, lm);
    let mut shapes = vec![0.0f32; channels * stride];
    normalise_bands(mode, &spectrum, &mut shapes, &band_e, end, channels, lm);

    let y = (channels == 2).then(|| shapes[stride..].to_vec());
    shapes.truncate(stride);
    NormalisedFrame {
        channels,
        spectrum,
        band_e,
        x: shapes,
        y,
    }
}

/// Per-band targets of `eighth_bits_per_bin` for every coded bin.
pub fn flat_pulses(
    mode: &CeltMode<'_>,
    lm: usize,
    channels: usize,
    eighth_bits_per_bin: i32,
) -> Vec<i32> {
    (0..mode.num_ebands)
        .map(|i| (mode.band_width(i) << lm) as i32 * channels as i32 * eighth_bits_per_bin)
        .collect()
}

/// Owned counterpart of [`BandAllocation`].
#[derive(Clone)]
pub struct Plan {
    pub lm: usize,
    pub pulses: Vec<i32>,
    pub tf_res: Vec<i32>,
    pub short_blocks: bool,
    pub spread: Spread,
    pub dual_stereo: bool,
    pub intensity: usize,
    pub total_bits: i32,
}

impl Plan {
    pub fn new(mode: &CeltMode<'_>, lm: usize, channels: usize, eighth_bits_per_bin: i32) -> Self {
        Self {
            lm,
            pulses: flat_pulses(mode, lm, channels, eighth_bits_per_bin),
            tf_res: vec![0; mode.num_ebands],
            short_blocks: false,
            spread: Spread::Normal,
            dual_stereo: false,
            intensity: mode.num_ebands,
            total_bits: ((MAX_PACKET_BYTES * 8) << BITRES) as i32,
        }
    }

    pub fn allocation<'a>(&'a self, mode: &CeltMode<'_>) -> BandAllocation<'a> {
        BandAllocation {
            start: 0,
            end: mode.num_ebands,
            pulses: &self.pulses,
            tf_res: &self.tf_res,
            short_blocks: self.short_blocks,
            spread: self.spread,
            dual_stereo: self.dual_stereo,
            intensity: self.intensity,
            total_bits: self.total_bits,
            balance: 0,
            lm: self.lm,
            coded_bands: mode.num_ebands,
        }
    }
}

/// Output of one pass of the band quantiser.
pub struct CodedFrame {
    pub packet: Vec<u8>,
    pub x: Vec<f32>,
    pub y: Option<Vec<f32>>,
    pub collapse_masks: Vec<u8>,
    pub seed: u32,
    pub tell_frac: u32,
}

pub fn encode(
    mode: &CeltMode<'_>,
    plan: &Plan,
    frame: &NormalisedFrame,
    resynth: bool,
    seed: u32,
) -> CodedFrame {
    let mut packet = vec![0u8; MAX_PACKET_BYTES];
    let mut x = frame.x.clone();
    let mut y = frame.y.clone();
    let mut collapse_masks = vec![0u8; frame.channels * mode.num_ebands];
    let mut seed = seed;
    let tell_frac;
    {
        let mut enc = EcEnc::new(&mut packet);
        let alloc = plan.allocation(mode);
        quant_all_bands(
            mode,
            &alloc,
            &mut x,
            y.as_deref_mut(),
            &mut collapse_masks,
            &frame.band_e,
            RangeCoder::Encoder(&mut enc),
            resynth,
            &mut seed,
        );
        tell_frac = ec_tell_frac(&enc);
        enc.enc_done();
        assert_eq!(enc.error(), 0, "packet overflow");
    }
    CodedFrame {
        packet,
        x,
        y,
        collapse_masks,
        seed,
        tell_frac,
    }
}

pub fn decode(
    mode: &CeltMode<'_>,
    plan: &Plan,
    packet: &[u8],
    channels: usize,
    seed: u32,
) -> CodedFrame {
    let stride = mode.short_mdct_size << plan.lm;
    let mut packet = packet.to_vec();
    let mut x = vec![0.0f32; stride];
    let mut y = (channels == 2).then(|| vec![0.0f32; stride]);
    let mut collapse_masks = vec![0u8; channels * mode.num_ebands];
    let mut seed = seed;
    let tell_frac;
    {
        let mut dec = EcDec::new(&mut packet);
        let alloc = plan.allocation(mode);
        quant_all_bands(
            mode,
            &alloc,
            &mut x,
            y.as_deref_mut(),
            &mut collapse_masks,
            &[],
            RangeCoder::Decoder(&mut dec),
            false,
            &mut seed,
        );
        tell_frac = ec_tell_frac(&dec);
    }
    CodedFrame {
        packet,
        x,
        y,
        collapse_masks,
        seed,
        tell_frac,
    }
}

/// L2 norm of each band of `x` at resolution `lm`.
pub fn band_norms(mode: &CeltMode<'_>, x: &[f32], lm: usize) -> Vec<f32> {
    (0..mode.num_ebands)
        .map(|i| {
            let band = &x[mode.band_start(i, lm)..mode.band_start(i + 1, lm)];
            band.iter().map(|v| v * v).sum::<f32>().sqrt()
        })
        .collect()
}

pub fn assert_close(a: &[f32], b: &[f32], tol: f32) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() <= tol, "index {i}: {x} vs {y}");
    }
}
