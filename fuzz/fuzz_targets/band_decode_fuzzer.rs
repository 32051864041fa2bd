#![no_main]

use celt_bands::{BITRES, BandAllocation, CeltMode, EcDec, RangeCoder, Spread, quant_all_bands};
use libfuzzer_sys::fuzz_target;

const MAX_PACKET: usize = 1275;
const SETUP_BYTE_COUNT: usize = 6;

fn spread_from(byte: u8) -> Spread {
    match byte & 3 {
        0 => Spread::None,
        1 => Spread::Light,
        2 => Spread::Normal,
        _ => Spread::Aggressive,
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() < SETUP_BYTE_COUNT + 1 {
        return;
    }
    let (setup, payload) = data.split_at(SETUP_BYTE_COUNT);
    if payload.len() > MAX_PACKET {
        return;
    }

    let mode = CeltMode::standard_48k();
    let nb = mode.num_ebands;
    let lm = usize::from(setup[0]) % (mode.max_lm + 1);
    let channels = if setup[1] & 1 != 0 { 2 } else { 1 };
    let short_blocks = lm > 0 && setup[1] & 2 != 0;
    let dual_stereo = setup[1] & 4 != 0;
    let spread = spread_from(setup[2]);
    let intensity = usize::from(setup[3]) % (nb + 1);
    let eighth_bits_per_bin = i32::from(setup[4] & 0x3f);
    let tf = if short_blocks {
        i32::from(setup[5] % 2)
    } else if lm > 0 {
        -i32::from(setup[5] % 2)
    } else {
        0
    };

    let pulses: Vec<i32> = (0..nb)
        .map(|i| ((mode.band_width(i) << lm) * channels) as i32 * eighth_bits_per_bin)
        .collect();
    let tf_res = vec![tf; nb];
    let alloc = BandAllocation {
        start: 0,
        end: nb,
        pulses: &pulses,
        tf_res: &tf_res,
        short_blocks,
        spread,
        dual_stereo,
        intensity,
        total_bits: ((payload.len() * 8) << BITRES) as i32,
        balance: 0,
        lm,
        coded_bands: nb,
    };

    let stride = mode.short_mdct_size << lm;
    let mut x = vec![0.0f32; stride];
    let mut y = vec![0.0f32; stride];
    let mut collapse_masks = vec![0u8; channels * nb];
    let mut packet = payload.to_vec();
    let mut dec = EcDec::new(&mut packet);
    let mut seed = u32::from(setup[5]);
    quant_all_bands(
        &mode,
        &alloc,
        &mut x,
        (channels == 2).then_some(&mut y[..]),
        &mut collapse_masks,
        &[],
        RangeCoder::Decoder(&mut dec),
        false,
        &mut seed,
    );
    assert!(x.iter().chain(&y).all(|v| v.is_finite()));
});
