mod common;

use celt_bands::{
    CeltMode, EnergyHistory, Spread, SpreadState, anti_collapse, compute_band_energies,
    denormalise_bands, spreading_decision,
};
use common::{Plan, band_norms, decode, encode, normalise, synthetic_spectrum};

const SEED: u32 = 0xcafe_f00d;

#[test]
fn denormalisation_restores_the_spectrum() {
    let mode = CeltMode::standard_48k();
    for (lm, channels) in [(0, 1), (2, 2), (3, 1)] {
        let spectrum = synthetic_spectrum(&mode, lm, channels, 3 + lm as u32);
        let frame = normalise(&mode, lm, channels, spectrum);
        let stride = mode.short_mdct_size << lm;

        let mut shapes = frame.x.clone();
        if let Some(y) = &frame.y {
            shapes.extend_from_slice(y);
        }
        let mut freq = vec![1.0f32; channels * stride];
        denormalise_bands(&mode, &shapes, &mut freq, &frame.band_e, mode.num_ebands, channels, lm);

        let coded = mode.spectrum_len(lm);
        for c in 0..channels {
            for j in 0..stride {
                let got = freq[c * stride + j];
                if j < coded {
                    let want = frame.spectrum[c * stride + j];
                    assert!((got - want).abs() <= 1e-3 * (1.0 + want.abs()), "bin {j}");
                } else {
                    assert_eq!(got, 0.0, "bin {j} above the last band");
                }
            }
        }
    }
}

#[test]
fn decoded_shapes_carry_the_band_energies() {
    let mode = CeltMode::standard_48k();
    let lm = 2;
    let plan = Plan::new(&mode, lm, 1, 24);
    let spectrum = synthetic_spectrum(&mode, lm, 1, 11);
    let frame = normalise(&mode, lm, 1, spectrum);
    let encoded = encode(&mode, &plan, &frame, false, SEED);
    let decoded = decode(&mode, &plan, &encoded.packet, 1, SEED);

    let stride = mode.short_mdct_size << lm;
    let mut freq = vec![0.0f32; stride];
    denormalise_bands(&mode, &decoded.x, &mut freq, &frame.band_e, mode.num_ebands, 1, lm);
    let mut band_e = vec![0.0f32; mode.num_ebands];
    compute_band_energies(&mode, &freq, &mut band_e, mode.num_ebands, 1, lm);
    for (i, (&got, &want)) in band_e.iter().zip(&frame.band_e).enumerate() {
        assert!((got - want).abs() <= 0.02 * want, "band {i}: {got} vs {want}");
    }
}

#[test]
fn all_zero_stereo_spectrum_codes_cleanly() {
    let mode = CeltMode::standard_48k();
    let lm = 3;
    let stride = mode.short_mdct_size << lm;
    let plan = Plan::new(&mode, lm, 2, 16);
    let frame = normalise(&mode, lm, 2, vec![0.0; 2 * stride]);
    assert!(frame.band_e.iter().all(|e| e.is_finite() && *e >= 0.0));
    assert!(frame.x.iter().chain(frame.y.iter().flatten()).all(|v| v.is_finite()));

    let encoded = encode(&mode, &plan, &frame, true, SEED);
    let decoded = decode(&mode, &plan, &encoded.packet, 2, SEED);
    for coded in [&encoded, &decoded] {
        let y = coded.y.as_deref().unwrap_or_default();
        assert!(coded.x.iter().chain(y).all(|v| v.is_finite()));
    }
    assert_eq!(decoded.collapse_masks, encoded.collapse_masks);
    assert_eq!(decoded.seed, encoded.seed);
}

#[test]
fn anti_collapse_leaves_no_silent_block() {
    let mode = CeltMode::standard_48k();
    let lm = 3;
    let mut plan = Plan::new(&mode, lm, 1, 3);
    plan.short_blocks = true;
    let spectrum = synthetic_spectrum(&mode, lm, 1, 17);
    let frame = normalise(&mode, lm, 1, spectrum);
    let encoded = encode(&mode, &plan, &frame, false, SEED);
    let decoded = decode(&mode, &plan, &encoded.packet, 1, SEED);

    // Pretend the previous frames were much louder.
    let mut history = EnergyHistory::new(mode.num_ebands, 1);
    history.prev1_log_e.fill(10.0);
    history.advance();
    history.prev1_log_e.fill(10.0);

    let mut collapse_masks = decoded.collapse_masks.clone();
    collapse_masks[5] &= 0x0f;
    collapse_masks[10] = 0;
    let size = mode.short_mdct_size << lm;
    let mut x = decoded.x.clone();
    anti_collapse(
        &mode,
        &mut x,
        &collapse_masks,
        lm,
        1,
        size,
        0,
        mode.num_ebands,
        &history,
        &plan.pulses,
        decoded.seed,
    );

    let blocks = 1usize << lm;
    for i in 0..mode.num_ebands {
        let lo = mode.band_start(i, lm);
        let n0 = mode.band_width(i);
        let band = &x[lo..lo + (n0 << lm)];
        for k in 0..blocks {
            let energy: f32 = (0..n0).map(|j| band[(j << lm) + k].powi(2)).sum();
            assert!(energy > 0.0, "band {i} block {k} is silent");
        }
        if collapse_masks[i] == 0xff {
            assert_eq!(band, &decoded.x[lo..lo + (n0 << lm)], "band {i} was complete");
        }
    }
    for (i, norm) in band_norms(&mode, &x, lm).into_iter().enumerate() {
        assert!((norm - 1.0).abs() < 0.02, "band {i}: norm {norm}");
    }
}

#[test]
fn spreading_follows_the_spectrum_shape() {
    let mode = CeltMode::standard_48k();
    let lm = 3;
    let stride = mode.short_mdct_size << lm;

    // One line per band: as tonal as it gets.
    let mut tonal = vec![0.0f32; stride];
    for i in 0..mode.num_ebands {
        tonal[mode.band_start(i, lm)] = 1.0;
    }
    let mut state = SpreadState::new();
    let decision = spreading_decision(&mode, &tonal, &mut state, false, mode.num_ebands, 1, lm);
    assert_eq!(decision, Spread::None);
    assert_eq!(state.last_decision, decision);

    // Unit-norm noise spreads once the average settles.
    let frame = normalise(&mode, lm, 1, synthetic_spectrum(&mode, lm, 1, 23));
    let mut state = SpreadState::new();
    let end = mode.num_ebands;
    let mut decision = spreading_decision(&mode, &frame.x, &mut state, true, end, 1, lm);
    for _ in 1..8 {
        decision = spreading_decision(&mode, &frame.x, &mut state, true, end, 1, lm);
    }
    assert_ne!(decision, Spread::None);
    assert_eq!(state.last_decision, decision);
}
