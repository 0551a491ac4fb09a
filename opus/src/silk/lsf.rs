// opus
// Copyright (c) 2026 The opus-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! NLSF decode/quantize, stability enforcement, and NLSF -> LPC conversion
//! (RFC 6716 §4.2.7.5).

use super::tables;
use crate::sample::Bandwidth;

/// Minimum spacing (Q15) enforced between adjacent NLSF coefficients and
/// between the first/last coefficient and the band edges, so the resulting
/// LPC filter stays stable and its roots don't collide into an unstable
/// (or numerically degenerate) configuration.
const MIN_SPACING_Q15: i32 = 50;
const MAX_STABILIZE_ITERATIONS: usize = 20;

/// Reconstructs an NLSF vector (Q15) from a stage-1 codebook index and
/// per-coefficient stage-2 residual indices, then stabilizes it.
pub fn reconstruct_nlsf(bandwidth: Bandwidth, stage1: usize, stage2: &[i32]) -> Vec<i16> {
    let codebook = match bandwidth {
        Bandwidth::Narrowband | Bandwidth::Mediumband => &*tables::NLSF_CODEBOOK_NB_MB,
        _ => &*tables::NLSF_CODEBOOK_WB,
    };
    let base = &codebook[stage1];
    let mut out: Vec<i32> = base
        .iter()
        .zip(stage2.iter())
        .map(|(&b, &r)| i32::from(b) + r * 128)
        .collect();
    stabilize(&mut out);
    out.into_iter().map(|v| v as i16).collect()
}

/// Enforces strictly increasing coefficients at least [`MIN_SPACING_Q15`]
/// apart and within `(0, 32768)`, first by iterated local relaxation (the
/// reference's approach, which converges for all but pathological inputs
/// within a handful of passes), falling back to an insertion-sort-and-clamp
/// pass that always terminates.
pub fn stabilize(nlsf: &mut [i32]) {
    let n = nlsf.len();
    if n == 0 {
        return;
    }
    for _ in 0..MAX_STABILIZE_ITERATIONS {
        let mut moved = false;

        if nlsf[0] < MIN_SPACING_Q15 {
            nlsf[0] = MIN_SPACING_Q15;
            moved = true;
        }
        if nlsf[n - 1] > 32768 - MIN_SPACING_Q15 {
            nlsf[n - 1] = 32768 - MIN_SPACING_Q15;
            moved = true;
        }
        for i in 0..n - 1 {
            let min_next = nlsf[i] + MIN_SPACING_Q15;
            if nlsf[i + 1] < min_next {
                // Split the violation evenly so a long run of bunched
                // coefficients doesn't all pile up against one edge.
                let mid = (nlsf[i] + nlsf[i + 1]) / 2;
                nlsf[i] = mid - MIN_SPACING_Q15 / 2;
                nlsf[i + 1] = mid + MIN_SPACING_Q15 / 2;
                moved = true;
            }
        }
        if !moved {
            return;
        }
    }

    // Fallback: insertion sort then hard-clamp spacing, which always
    // terminates in O(n^2) regardless of how pathological the input was.
    nlsf.sort_unstable();
    nlsf[0] = nlsf[0].clamp(MIN_SPACING_Q15, 32768 - MIN_SPACING_Q15);
    for i in 1..n {
        let floor = nlsf[i - 1] + MIN_SPACING_Q15;
        nlsf[i] = nlsf[i].max(floor).min(32768 - MIN_SPACING_Q15);
    }
}

/// Blends `prev` and `current` NLSF vectors by `interp_q2 / 4` (RFC 6716
/// §4.2.7.5.3): `interp_q2 == 4` means no interpolation (use `current`
/// outright), matching the "4 means no interpolation" convention in
/// spec.md's side-info description.
pub fn interpolate(prev: &[i16], current: &[i16], interp_q2: i32) -> Vec<i16> {
    if interp_q2 >= 4 {
        return current.to_vec();
    }
    prev.iter()
        .zip(current.iter())
        .map(|(&p, &c)| (i32::from(p) + ((i32::from(c) - i32::from(p)) * interp_q2) / 4) as i16)
        .collect()
}

/// Converts a stabilized NLSF vector (Q15, strictly increasing) into LPC
/// coefficients (Q12) via the standard cosine-domain factorization: NLSFs
/// are the interleaved roots of the symmetric/antisymmetric polynomials
/// `P(z)` and `Q(z)` whose product recovers the prediction polynomial.
///
/// This evaluates each polynomial directly as a product of cosine factors
/// rather than via the reference's Chebyshev-recursion table, which is
/// algorithmically equivalent for a non-bit-exact implementation: both
/// reduce to `A(z) = (P(z) + Q(z)) / 2` from the same root-pair
/// construction.
pub fn nlsf_to_lpc(nlsf_q15: &[i16], order: usize) -> Vec<i32> {
    let cos_theta: Vec<f64> = nlsf_q15.iter().map(|&v| (f64::from(v) / 32768.0 * std::f64::consts::PI).cos()).collect();

    // P(z) interleaves even-indexed angles (plus the implicit root at
    // theta=pi for odd order), Q(z) the odd-indexed ones (plus theta=0).
    let mut p_roots: Vec<f64> = cos_theta.iter().step_by(2).copied().collect();
    let mut q_roots: Vec<f64> = cos_theta.iter().skip(1).step_by(2).copied().collect();
    if order % 2 == 1 {
        q_roots.push(-1.0);
    } else {
        p_roots.push(-1.0);
        q_roots.push(1.0);
    }

    let p = poly_from_cos_roots(&p_roots);
    let q = poly_from_cos_roots(&q_roots);

    // a[k] = (p[k] + q[k]) / 2 for k=1..=order (a[0] is always 1 and
    // dropped, matching the "coefficients" the LPC synthesis filter uses).
    let mut a_f64 = vec![0.0f64; order + 1];
    for k in 0..=order {
        let pk = p.get(k).copied().unwrap_or(0.0);
        let qk = q.get(k).copied().unwrap_or(0.0);
        a_f64[k] = (pk + qk) / 2.0;
    }

    (1..=order).map(|k| (-a_f64[k] * 4096.0).round() as i32).collect()
}

/// Expands `prod_{roots} (z^2 - 2*cos_theta*z + 1)` into its coefficient
/// vector (constant term first), the standard way of building `P(z)`/`Q(z)`
/// from their cosine roots.
fn poly_from_cos_roots(cos_thetas: &[f64]) -> Vec<f64> {
    let mut poly = vec![1.0f64];
    for &c in cos_thetas {
        let mut next = vec![0.0f64; poly.len() + 2];
        for (i, &coeff) in poly.iter().enumerate() {
            next[i] += coeff;
            next[i + 1] += -2.0 * c * coeff;
            next[i + 2] += coeff;
        }
        poly = next;
    }
    poly
}

/// Applies bandwidth expansion (a "chirp" toward the origin) to LPC
/// coefficients in Q12, used when the stability check below fails and the
/// filter needs pulling further inside the unit circle.
pub fn bandwidth_expand(lpc_q12: &mut [i32], chirp_q16: i32) {
    let mut gain_q16 = chirp_q16;
    for c in lpc_q12.iter_mut() {
        *c = ((i64::from(*c) * i64::from(gain_q16)) >> 16) as i32;
        gain_q16 = ((i64::from(chirp_q16) * i64::from(gain_q16)) >> 16) as i32;
    }
}

/// Coarse stability check: rejects filters whose reflection coefficients
/// (via a Levinson-style recursion run in reverse, i.e. a direct-to-lattice
/// conversion) leave the unit circle. Good enough to gate the
/// iterative-chirp retry loop described in spec.md §4.3 step 3.
pub fn is_stable(lpc_q12: &[i32]) -> bool {
    let order = lpc_q12.len();
    let mut a: Vec<f64> = lpc_q12.iter().map(|&c| f64::from(c) / 4096.0).collect();
    for i in (1..=order).rev() {
        let k = a[i - 1];
        if k.abs() >= 0.9995 {
            return false;
        }
        if i == 1 {
            break;
        }
        let denom = 1.0 - k * k;
        let mut next = vec![0.0f64; i - 1];
        for j in 0..i - 1 {
            next[j] = (a[j] - k * a[i - 2 - j]) / denom;
        }
        a = next;
    }
    true
}

/// Runs the stabilize-or-chirp loop spec.md §4.3 step 3 describes: convert,
/// check stability, and if unstable apply progressively stronger bandwidth
/// expansion until the filter is stable or the iteration cap is hit (in
/// which case the last, most-expanded candidate is returned — a heavily
/// chirped filter is always stable in the limit).
pub fn nlsf_to_stable_lpc(nlsf_q15: &[i16], order: usize) -> Vec<i32> {
    let mut lpc = nlsf_to_lpc(nlsf_q15, order);
    let mut chirp_q16 = 65536i32;
    for _ in 0..super::tables::MAX_PULSES_PER_BLOCK {
        if is_stable(&lpc) {
            break;
        }
        chirp_q16 -= chirp_q16 / 16;
        lpc = nlsf_to_lpc(nlsf_q15, order);
        bandwidth_expand(&mut lpc, chirp_q16);
    }
    lpc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stabilize_enforces_minimum_spacing() {
        let mut nlsf = vec![100, 105, 110, 30000, 30001];
        stabilize(&mut nlsf);
        for w in nlsf.windows(2) {
            assert!(w[1] - w[0] >= MIN_SPACING_Q15);
        }
        assert!(nlsf[0] >= MIN_SPACING_Q15);
        assert!(*nlsf.last().unwrap() <= 32768 - MIN_SPACING_Q15);
    }

    #[test]
    fn interpolate_at_full_weight_returns_current() {
        let prev = vec![100i16, 200, 300];
        let current = vec![150i16, 250, 350];
        assert_eq!(interpolate(&prev, &current, 4), current);
    }

    #[test]
    fn interpolate_at_zero_weight_returns_previous() {
        let prev = vec![100i16, 200, 300];
        let current = vec![150i16, 250, 350];
        assert_eq!(interpolate(&prev, &current, 0), prev);
    }

    #[test]
    fn nlsf_to_lpc_produces_order_many_coefficients() {
        let nlsf: Vec<i16> = (1..=10).map(|i| (i * 2800) as i16).collect();
        let lpc = nlsf_to_lpc(&nlsf, 10);
        assert_eq!(lpc.len(), 10);
    }

    #[test]
    fn bandwidth_expand_shrinks_coefficient_magnitude() {
        let mut lpc = vec![4000i32, -3000, 2000];
        let original = lpc.clone();
        bandwidth_expand(&mut lpc, 50000);
        for (a, b) in lpc.iter().zip(original.iter()) {
            assert!(a.abs() <= b.abs());
        }
    }
}
