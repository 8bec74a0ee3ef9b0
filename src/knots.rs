//! Knot vector utilities for Bspline axes.
//!
//! A knot vector of an open (or floating) axis with `n` control points and order `k` holds
//! `n + k` non-decreasing knots, and the valid domain is `[knots[k - 1], knots[n]]`.
//! Periodic axes store `n + 2k - 1` knots: the control points wrap and the first `k - 1`
//! of them are reused at the end.

use crate::MvarError;

/// Knots closer than this are considered identical.
pub const KNOT_TOL: f64 = 1e-12;

/// Open uniform knot vector over [0, 1].
pub fn open_uniform_knots(length: usize, order: usize) -> Vec<f64> {
    debug_assert!(length >= order && order >= 1);
    let num_interior = length - order;
    let mut knots = Vec::with_capacity(length + order);
    knots.extend(std::iter::repeat_n(0.0, order));
    for i in 1..=num_interior {
        knots.push(i as f64 / (num_interior + 1) as f64);
    }
    knots.extend(std::iter::repeat_n(1.0, order));
    knots
}

/// Uniform knot vector for a periodic axis over [0, 1].
pub fn periodic_uniform_knots(length: usize, order: usize) -> Vec<f64> {
    let num = length + 2 * order - 1;
    let spans = length as f64;
    (0..num)
        .map(|i| (i as f64 - (order - 1) as f64) / spans)
        .collect()
}

pub fn knot_vector_length(length: usize, order: usize, periodic: bool) -> usize {
    if periodic {
        length + 2 * order - 1
    } else {
        length + order
    }
}

pub fn validate_knot_vector(
    axis: usize,
    knots: &[f64],
    length: usize,
    order: usize,
    periodic: bool,
) -> Result<(), MvarError> {
    let expected = knot_vector_length(length, order, periodic);
    if knots.len() != expected {
        return Err(MvarError::InvalidKnotVector {
            axis,
            reason: format!("expected {} knots, got {}", expected, knots.len()),
        });
    }
    if knots.iter().any(|k| !k.is_finite()) {
        return Err(MvarError::InvalidKnotVector {
            axis,
            reason: "non-finite knot".into(),
        });
    }
    if knots.windows(2).any(|w| w[1] < w[0]) {
        return Err(MvarError::InvalidKnotVector {
            axis,
            reason: "knots must be non-decreasing".into(),
        });
    }
    let (min, max) = knot_domain(knots, order, effective_length(length, order, periodic));
    if max <= min {
        return Err(MvarError::InvalidKnotVector {
            axis,
            reason: format!("empty domain [{min}, {max}]"),
        });
    }
    Ok(())
}

/// Number of control points seen by the basis, counting the wrapped ones of a periodic axis.
pub fn effective_length(length: usize, order: usize, periodic: bool) -> usize {
    if periodic { length + order - 1 } else { length }
}

pub fn knot_domain(knots: &[f64], order: usize, effective_len: usize) -> (f64, f64) {
    (knots[order - 1], knots[effective_len])
}

/// Find the knot span `i` (`order - 1 <= i < n`) such that `knots[i] <= t < knots[i + 1]`.
/// The domain end maps to the last non-empty span.
pub fn find_span(knots: &[f64], order: usize, n: usize, t: f64) -> usize {
    let low_bound = order - 1;
    if t >= knots[n] {
        // Last non-empty span.
        let mut span = n - 1;
        while span > low_bound && knots[span] >= knots[n] {
            span -= 1;
        }
        return span;
    }
    if t <= knots[low_bound] {
        let mut span = low_bound;
        while span + 1 < n && knots[span + 1] <= knots[low_bound] {
            span += 1;
        }
        return span;
    }

    let mut low = low_bound;
    let mut high = n;
    let mut mid = (low + high) / 2;
    while t < knots[mid] || t >= knots[mid + 1] {
        if t < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// Non-vanishing basis functions `N_{span-order+1..=span}` at `t`, written to `out`.
pub fn basis_functions(knots: &[f64], order: usize, span: usize, t: f64, out: &mut [f64]) {
    debug_assert!(out.len() == order);
    let degree = order - 1;
    let mut left = [0.0f64; 32];
    let mut right = [0.0f64; 32];
    debug_assert!(order < 32, "Order {order} too large");

    out[0] = 1.0;
    for j in 1..=degree {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom == 0.0 { 0.0 } else { out[r] / denom };
            out[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        out[j] = saved;
    }
}

pub fn multiplicity(knots: &[f64], t: f64) -> usize {
    knots.iter().filter(|&&k| (k - t).abs() <= KNOT_TOL).count()
}

/// Distinct knots strictly inside the domain.
pub fn interior_breaks(knots: &[f64], order: usize, n: usize) -> Vec<f64> {
    let (min, max) = knot_domain(knots, order, n);
    let mut breaks: Vec<f64> = Vec::new();
    for &k in &knots[order..n] {
        if k - min <= KNOT_TOL || max - k <= KNOT_TOL {
            continue;
        }
        if breaks.last().is_none_or(|&last| k - last > KNOT_TOL) {
            breaks.push(k);
        }
    }
    breaks
}

/// Node values (Greville abscissae) at which control points sit in parameter space.
pub fn greville_abscissae(knots: &[f64], order: usize, n: usize) -> Vec<f64> {
    if order == 1 {
        return (0..n).map(|i| 0.5 * (knots[i] + knots[i + 1])).collect();
    }
    let degree = (order - 1) as f64;
    (0..n)
        .map(|i| knots[i + 1..i + order].iter().sum::<f64>() / degree)
        .collect()
}

pub fn is_open_end(knots: &[f64], order: usize, n: usize) -> bool {
    let (min, max) = knot_domain(knots, order, n);
    knots[..order].iter().all(|&k| (k - min).abs() <= KNOT_TOL)
        && knots[n..n + order].iter().all(|&k| (k - max).abs() <= KNOT_TOL)
}

/// Affinely map knots so that the domain `from` becomes `to`.
pub fn remap_knots(knots: &mut [f64], from: (f64, f64), to: (f64, f64)) {
    let scale = (to.1 - to.0) / (from.1 - from.0);
    for k in knots.iter_mut() {
        *k = to.0 + (*k - from.0) * scale;
    }
}

/// Union of two knot vectors: every knot appears with its larger multiplicity.
pub fn merge_knot_vectors(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut merged = Vec::with_capacity(a.len().max(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        if j >= b.len() || (i < a.len() && a[i] < b[j] - KNOT_TOL) {
            merged.push(a[i]);
            i += 1;
        } else if i >= a.len() || b[j] < a[i] - KNOT_TOL {
            merged.push(b[j]);
            j += 1;
        } else {
            merged.push(a[i]);
            i += 1;
            j += 1;
        }
    }
    merged
}

/// Knots of `target` missing from `current` (with multiplicity), in increasing order.
pub fn missing_knots(current: &[f64], target: &[f64]) -> Vec<f64> {
    let mut missing = Vec::new();
    let mut i = 0;
    for &t in target {
        if i < current.len() && (current[i] - t).abs() <= KNOT_TOL {
            i += 1;
        } else {
            while i < current.len() && current[i] < t - KNOT_TOL {
                i += 1;
            }
            if i < current.len() && (current[i] - t).abs() <= KNOT_TOL {
                i += 1;
            } else {
                missing.push(t);
            }
        }
    }
    missing
}

/// The knot dependent part of a single knot insertion (Boehm's algorithm).
/// Apply it to every fiber of a control mesh with [`KnotInsertion::apply`].
#[derive(Debug, Clone)]
pub struct KnotInsertion {
    pub knots: Vec<f64>,
    span: usize,
    alphas: Vec<f64>,
    order: usize,
}

impl KnotInsertion {
    /// `n` is the number of control points the knot vector spans.
    pub fn new(knots: &[f64], order: usize, n: usize, t: f64) -> Self {
        let span = find_insertion_span(knots, n, t);
        let degree = order - 1;
        let mut alphas = Vec::with_capacity(degree);
        for i in (span + 1).saturating_sub(degree)..=span {
            let denom = knots[i + degree] - knots[i];
            alphas.push(if denom <= 0.0 { 0.0 } else { (t - knots[i]) / denom });
        }

        let mut new_knots = Vec::with_capacity(knots.len() + 1);
        new_knots.extend_from_slice(&knots[..=span]);
        new_knots.push(t);
        new_knots.extend_from_slice(&knots[span + 1..]);

        Self {
            knots: new_knots,
            span,
            alphas,
            order,
        }
    }

    /// `src` holds `n` control values, `dst` receives `n + 1`.
    pub fn apply(&self, src: &[f64], dst: &mut [f64]) {
        debug_assert!(dst.len() == src.len() + 1);
        let degree = self.order - 1;
        let first = (self.span + 1).saturating_sub(degree);
        for i in 0..dst.len() {
            dst[i] = if i < first {
                src[i]
            } else if i <= self.span {
                let alpha = self.alphas[i - first];
                if i == 0 {
                    alpha * src[0]
                } else {
                    alpha * src[i] + (1.0 - alpha) * src[i - 1]
                }
            } else {
                src[i - 1]
            };
        }
    }
}

/// Last span with `knots[span] <= t`, limited to the control point range.
fn find_insertion_span(knots: &[f64], n: usize, t: f64) -> usize {
    let mut span = 0;
    for (i, &k) in knots.iter().enumerate().take(n) {
        if k <= t + KNOT_TOL {
            span = i;
        }
    }
    span
}
