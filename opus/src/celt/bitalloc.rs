// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bit allocation (RFC 6716 §4.3 step 5, spec.md §4.4 steps 5 and 8): turns
//! a total bit budget, per-band dynalloc boosts, and an allocation trim into
//! a per-band PVQ pulse count plus fine-energy bit count, then hands back
//! whatever the pulse allocator's integer rounding couldn't spend as extra
//! final-energy precision.

use super::pvq;

/// Fine-energy bits per band never exceed this (matches
/// `celt::decoder`/`celt::encoder`'s own `fine_bits.min(16)` clamp on the raw
/// bit read/write).
const FINE_BITS_CAP: u32 = 16;

/// A pulse count beyond roughly four per sample is never worth its bit cost
/// for a normalized unit-norm shape; capping the search here keeps
/// [`pvq::pulses_within_budget`]'s table small regardless of how generous a
/// band's budget is.
const MAX_PULSES_PER_SAMPLE: usize = 4;

/// Per-band allocation decision.
#[derive(Clone, Debug)]
pub struct BandAllocation {
    pub pulses: u32,
    pub fine_bits: u32,
}

/// Allocates `total_bits_frac` (in `1/8`-bit units, matching
/// [`opus_core::RangeDecoder::tell_frac`]) across `[start_band, end_band)`
/// of `band_widths`, weighting each band by its width, a caller-supplied
/// boost (dynalloc), and `trim` (`0..=10`, `5` neutral — lower trims bias
/// bits toward low bands, higher toward high bands, mirroring the
/// reference's perceptual tilt).
///
/// Runs in two stages: an initial pass picks each band's pulse count by
/// inverting the real PVQ bit cost ([`pvq::pulses_within_budget`]) against
/// that band's share of the budget, then a final-energy pass (spec.md §4.4
/// step 8) redistributes whatever bits the first pass's integer pulse
/// counts left unspent, one bit at a time, to the highest-weighted bands'
/// fine-energy precision.
pub fn allocate(band_widths: &[usize], start_band: usize, end_band: usize, total_bits_frac: u32, boosts: &[u32], trim: i32) -> Vec<BandAllocation> {
    let mut out = vec![BandAllocation { pulses: 0, fine_bits: 0 }; band_widths.len()];
    let active = start_band..end_band.min(band_widths.len());
    if active.is_empty() {
        return out;
    }

    let tilt = (trim - 5) as f32 * 0.08;
    let weighted_bands: Vec<(usize, f32)> = active
        .clone()
        .map(|b| {
            let width = band_widths[b].max(1) as f32;
            let position_bias = 1.0 + tilt * (b as f32 / band_widths.len() as f32 - 0.5);
            let weight = width * position_bias.max(0.1) + boosts.get(b).copied().unwrap_or(0) as f32;
            (b, weight)
        })
        .collect();
    let weight_sum: f32 = weighted_bands.iter().map(|&(_, w)| w).sum::<f32>().max(1.0);

    let total_bits = (total_bits_frac / 8) as f32;
    let mut leftover_bits = 0.0f32;
    for &(b, w) in &weighted_bands {
        let band_bits = (total_bits * w / weight_sum).max(0.0);
        // Reserve a quarter of each band's bits for fine-energy refinement up
        // front; the final-energy stage below tops this up from leftovers.
        let initial_fine_bits = (band_bits * 0.25) as u32;
        let shape_budget = (band_bits - initial_fine_bits as f32).max(0.0);

        let width = band_widths[b].max(1);
        let max_k = width * MAX_PULSES_PER_SAMPLE;
        let pulses = pvq::pulses_within_budget(width, max_k, f64::from(shape_budget));
        let spent_bits = pvq::bits_for_pulses(width, pulses) as f32;
        leftover_bits += (shape_budget - spent_bits).max(0.0);

        out[b] = BandAllocation { pulses, fine_bits: initial_fine_bits.min(FINE_BITS_CAP) };
    }

    let mut priority: Vec<usize> = weighted_bands.iter().map(|&(b, _)| b).collect();
    priority.sort_by(|&a, &b| {
        let wa = weighted_bands.iter().find(|&&(band, _)| band == a).unwrap().1;
        let wb = weighted_bands.iter().find(|&&(band, _)| band == b).unwrap().1;
        wb.partial_cmp(&wa).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut remaining_leftover_bits = leftover_bits as u32;
    while remaining_leftover_bits > 0 {
        let mut progressed = false;
        for &b in &priority {
            if remaining_leftover_bits == 0 {
                break;
            }
            if out[b].fine_bits < FINE_BITS_CAP {
                out[b].fine_bits += 1;
                remaining_leftover_bits -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_gives_more_bits_to_wider_bands() {
        let widths = vec![4, 4, 16, 16];
        let alloc = allocate(&widths, 0, 4, 4000, &[0, 0, 0, 0], 5);
        assert!(alloc[2].pulses + alloc[2].fine_bits >= alloc[0].pulses + alloc[0].fine_bits);
    }

    #[test]
    fn zero_budget_allocates_nothing() {
        let widths = vec![4, 4];
        let alloc = allocate(&widths, 0, 2, 0, &[0, 0], 5);
        assert!(alloc.iter().all(|a| a.pulses == 0 && a.fine_bits == 0));
    }

    #[test]
    fn boost_increases_a_bands_share() {
        let widths = vec![8, 8];
        let plain = allocate(&widths, 0, 2, 2000, &[0, 0], 5);
        let boosted = allocate(&widths, 0, 2, 2000, &[0, 200], 5);
        assert!(boosted[1].pulses >= plain[1].pulses);
    }

    #[test]
    fn final_energy_stage_spends_leftover_bits_on_fine_precision() {
        let widths = vec![8];
        // A huge budget for a single narrow band will run out of useful
        // pulse counts (capped at `width * MAX_PULSES_PER_SAMPLE`) long
        // before the bit budget itself runs out, so the final-energy stage
        // must absorb the rest as fine-energy bits rather than discarding it.
        let alloc = allocate(&widths, 0, 1, 1_000_000, &[0], 5);
        assert_eq!(alloc[0].fine_bits, 16);
    }
}
