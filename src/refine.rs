use std::ops::IndexMut;

use smallvec::SmallVec;

use crate::{
    AxisVec, GeomType, Multivariate, MvarError, PointType, binomial_coefficient,
    knots::{self, KNOT_TOL, KnotInsertion},
};

impl Multivariate {
    /// Split along `axis` at the interior parameter `t`, returning the pieces over
    /// `[min, t]` and `[t, max]`.
    pub fn subdivide(&self, axis: usize, t: f64) -> Result<(Self, Self), MvarError> {
        self.check_axis(axis)?;
        let (min, max) = self.domain(axis)?;
        if t <= min || t >= max || t.is_nan() {
            return Err(MvarError::ParameterOutOfDomain { axis, t, min, max });
        }

        match self.geom_type {
            GeomType::Bezier => {
                let u = (t - min) / (max - min);
                let size = self.lengths[axis];
                let mut lower = self.map_fibers(axis, size, |src, out| {
                    out.copy_from_slice(src);
                    de_casteljau_lower_nd(out, 0, 1, size, u);
                });
                let mut upper = self.map_fibers(axis, size, |src, out| {
                    out.copy_from_slice(src);
                    de_casteljau_upper_nd(out, 0, 1, size, u);
                });
                lower.set_aux_domain(axis, min, t)?;
                upper.set_aux_domain(axis, t, max)?;
                Ok((lower, upper))
            }
            GeomType::Power => {
                let (lower, upper) = self.power_to_bezier().subdivide(axis, t)?;
                Ok((lower.bezier_to_power(), upper.bezier_to_power()))
            }
            GeomType::Bspline => {
                let mv = if self.periodic[axis] {
                    self.open_end(axis)?
                } else {
                    self.clone()
                };
                let order = mv.orders[axis];
                let existing = knots::multiplicity(mv.knot_vector(axis).unwrap_or_default(), t);
                let refined = mv.insert_knot(axis, t, order.saturating_sub(existing))?;

                let kv = refined.knot_vector(axis).unwrap_or_default().to_vec();
                // Knot vector now holds `order` copies of t starting at `first`, and the
                // control points split at the same index.
                let Some(first) = kv.iter().position(|&k| (k - t).abs() <= KNOT_TOL) else {
                    return Err(MvarError::AlgorithmError {
                        message: format!("knot {t} missing after insertion"),
                    });
                };
                let last = first + knots::multiplicity(&kv, t) - 1;
                let split = last + 1 - order;
                let len = refined.lengths[axis];

                let mut lower = refined.slice_axis(axis, 0, split);
                lower.knot_vectors[axis] = Some(kv[..split + order].to_vec());
                let mut upper = refined.slice_axis(axis, split, len);
                upper.knot_vectors[axis] = Some(kv[split..].to_vec());
                Ok((lower, upper))
            }
        }
    }

    /// Keep control points `[from, to)` along `axis`.
    fn slice_axis(&self, axis: usize, from: usize, to: usize) -> Self {
        self.map_fibers(axis, to - from, |src, out| {
            out.copy_from_slice(&src[from..to]);
        })
    }

    /// Insert `t` `times` times into the knot vector of a Bspline `axis`.
    pub fn insert_knot(&self, axis: usize, t: f64, times: usize) -> Result<Self, MvarError> {
        self.check_axis(axis)?;
        if self.geom_type != GeomType::Bspline {
            return Err(MvarError::UndefinedGeometry {
                geom_type: self.geom_type,
                operation: "insert_knot",
            });
        }
        let mut mv = if self.periodic[axis] {
            self.open_end(axis)?
        } else {
            self.clone()
        };
        for _ in 0..times {
            let kv = mv.knot_vector(axis).unwrap_or_default();
            let insertion = KnotInsertion::new(kv, mv.orders[axis], mv.lengths[axis], t);
            let len = mv.lengths[axis];
            let mut refined = mv.map_fibers(axis, len + 1, |src, out| insertion.apply(src, out));
            refined.knot_vectors[axis] = Some(insertion.knots);
            mv = refined;
        }
        Ok(mv)
    }

    /// Convert a periodic or floating end axis into an open end one over the same domain.
    pub fn open_end(&self, axis: usize) -> Result<Self, MvarError> {
        self.check_axis(axis)?;
        if self.geom_type != GeomType::Bspline {
            return Ok(self.clone());
        }
        let order = self.orders[axis];
        let mut mv = self.clone();

        if mv.periodic[axis] {
            // Unwrap: the first order - 1 control points are repeated at the end.
            let len = mv.lengths[axis];
            mv = mv.map_fibers(axis, len + order - 1, |src, out| {
                for (i, v) in out.iter_mut().enumerate() {
                    *v = src[i % len];
                }
            });
            mv.periodic[axis] = false;
        }

        let len = mv.lengths[axis];
        let kv = mv.knot_vector(axis).unwrap_or_default();
        if knots::is_open_end(kv, order, len) {
            return Ok(mv);
        }

        let (min, max) = knots::knot_domain(kv, order, len);
        let start_mult = knots::multiplicity(kv, min);
        mv = mv.insert_knot(axis, min, order.saturating_sub(start_mult))?;
        let kv = mv.knot_vector(axis).unwrap_or_default();
        let end_mult = knots::multiplicity(kv, max);
        mv = mv.insert_knot(axis, max, order.saturating_sub(end_mult))?;

        let kv = mv.knot_vector(axis).unwrap_or_default().to_vec();
        let last_min = kv
            .iter()
            .rposition(|&k| (k - min).abs() <= KNOT_TOL)
            .unwrap_or(order - 1);
        let first_max = kv
            .iter()
            .position(|&k| (k - max).abs() <= KNOT_TOL)
            .unwrap_or(kv.len() - order);
        let from = last_min + 1 - order;
        let to = first_max;
        let mut trimmed = mv.slice_axis(axis, from, to);
        trimmed.knot_vectors[axis] = Some(kv[from..to + order].to_vec());
        Ok(trimmed)
    }

    /// Raise the order of `axis` to `new_order`.
    ///
    /// Bspline axes are first split into Bezier pieces, so every interior knot of the
    /// result has full multiplicity.
    pub fn raise_degree(&self, axis: usize, new_order: usize) -> Result<Self, MvarError> {
        self.check_axis(axis)?;
        let order = self.orders[axis];
        if new_order < order {
            return Err(MvarError::FailedToMakeCompatible {
                reason: format!("cannot lower order {order} to {new_order} on axis {axis}"),
            });
        }
        if new_order == order {
            return Ok(self.clone());
        }

        match self.geom_type {
            GeomType::Bezier => {
                let mut raised = self.map_fibers(axis, new_order, |src, out| {
                    raise_bezier_fiber(src, out);
                });
                raised.orders[axis] = new_order;
                Ok(raised)
            }
            GeomType::Power => {
                let mut raised = self.map_fibers(axis, new_order, |src, out| {
                    out.fill(0.0);
                    out[..src.len()].copy_from_slice(src);
                });
                raised.orders[axis] = new_order;
                Ok(raised)
            }
            GeomType::Bspline => {
                let pieces = self.extract_bezier(axis)?;
                let kv = pieces.knot_vector(axis).unwrap_or_default();
                let breaks = bezier_breaks(kv, order);
                let num_pieces = breaks.len() - 1;

                let mut raised = pieces.map_fibers(axis, num_pieces * new_order, |src, out| {
                    for p in 0..num_pieces {
                        raise_bezier_fiber(
                            &src[p * order..(p + 1) * order],
                            &mut out[p * new_order..(p + 1) * new_order],
                        );
                    }
                });
                raised.orders[axis] = new_order;
                raised.knot_vectors[axis] = Some(full_multiplicity_knots(&breaks, new_order));
                Ok(raised)
            }
        }
    }

    /// Insert every interior knot of `axis` up to full multiplicity, so that the control
    /// points form consecutive Bezier pieces of `order` points each.
    pub fn extract_bezier(&self, axis: usize) -> Result<Self, MvarError> {
        self.check_axis(axis)?;
        if self.geom_type != GeomType::Bspline {
            return Err(MvarError::UndefinedGeometry {
                geom_type: self.geom_type,
                operation: "extract_bezier",
            });
        }
        let mut mv = self.open_end(axis)?;
        let order = mv.orders[axis];
        let kv = mv.knot_vector(axis).unwrap_or_default();
        for t in knots::interior_breaks(kv, order, mv.lengths[axis]) {
            let kv = mv.knot_vector(axis).unwrap_or_default();
            let mult = knots::multiplicity(kv, t);
            mv = mv.insert_knot(axis, t, order.saturating_sub(mult))?;
        }

        // Higher multiplicities than the order leave zero length spans; drop their points.
        let kv = mv.knot_vector(axis).unwrap_or_default().to_vec();
        let breaks = bezier_breaks(&kv, order);
        let clean = full_multiplicity_knots(&breaks, order);
        if clean.len() != kv.len() {
            let mut keep = Vec::new();
            let mut i = 0;
            while i + order <= mv.lengths[axis] {
                if kv[i + order] - kv[i + order - 1] > KNOT_TOL {
                    keep.extend(i..i + order);
                    i += order;
                } else {
                    i += 1;
                }
            }
            let mut trimmed = mv.map_fibers(axis, keep.len(), |src, out| {
                for (o, &k) in out.iter_mut().zip(&keep) {
                    *o = src[k];
                }
            });
            trimmed.knot_vectors[axis] = Some(clean);
            mv = trimmed;
        }
        Ok(mv)
    }

    /// Express all axes as Bspline axes over the current domain.
    pub fn bezier_to_bspline(&self) -> Result<Self, MvarError> {
        match self.geom_type {
            GeomType::Bspline => Ok(self.clone()),
            GeomType::Power => self.power_to_bezier().bezier_to_bspline(),
            GeomType::Bezier => {
                let mut mv = self.clone();
                mv.geom_type = GeomType::Bspline;
                for axis in 0..self.dim() {
                    let (min, max) = self.domain(axis)?;
                    mv.knot_vectors[axis] =
                        Some(full_multiplicity_knots(&[min, max], self.orders[axis]));
                }
                mv.aux_domain = None;
                Ok(mv)
            }
        }
    }

    /// Convert a single piece, open end Bspline back to Bezier form.
    pub fn bspline_to_bezier(&self) -> Result<Self, MvarError> {
        if self.geom_type != GeomType::Bspline {
            return Ok(self.clone());
        }
        let mut mv = self.clone();
        let mut aux: AxisVec<(f64, f64)> = AxisVec::new();
        for axis in 0..self.dim() {
            if self.periodic[axis] {
                mv = mv.open_end(axis)?;
            }
            if mv.lengths[axis] != mv.orders[axis] {
                return Err(MvarError::FailedToMakeCompatible {
                    reason: format!("axis {axis} has interior knots"),
                });
            }
            aux.push(mv.domain(axis)?);
        }
        mv.geom_type = GeomType::Bezier;
        mv.knot_vectors = mv.knot_vectors.iter().map(|_| None).collect();
        let is_unit = aux.iter().all(|&d| d == (0.0, 1.0));
        mv.aux_domain = if is_unit { None } else { Some(aux) };
        Ok(mv)
    }

    /// Power basis coefficients to Bezier control points along every axis.
    pub fn power_to_bezier(&self) -> Self {
        if self.geom_type != GeomType::Power {
            return self.clone();
        }
        let mut mv = self.clone();
        for axis in 0..self.dim() {
            let len = mv.lengths[axis];
            mv = mv.map_fibers(axis, len, |src, out| {
                let n = len - 1;
                for j in 0..len {
                    out[j] = (0..=j)
                        .map(|i| {
                            binomial_coefficient(j, i) as f64 / binomial_coefficient(n, i) as f64
                                * src[i]
                        })
                        .sum();
                }
            });
        }
        mv.geom_type = GeomType::Bezier;
        mv
    }

    /// Bezier control points to power basis coefficients along every axis.
    pub fn bezier_to_power(&self) -> Self {
        if self.geom_type != GeomType::Bezier {
            return self.clone();
        }
        let mut mv = self.clone();
        for axis in 0..self.dim() {
            let len = mv.lengths[axis];
            mv = mv.map_fibers(axis, len, |src, out| {
                let n = len - 1;
                for i in 0..len {
                    let sum: f64 = (0..=i)
                        .map(|j| {
                            let sign = if (i - j) % 2 == 0 { 1.0 } else { -1.0 };
                            sign * binomial_coefficient(i, j) as f64 * src[j]
                        })
                        .sum();
                    out[i] = binomial_coefficient(n, i) as f64 * sum;
                }
            });
        }
        mv.geom_type = GeomType::Power;
        mv
    }

    /// Coerce into point type `target` (more coordinates and/or rational).
    pub fn coerce_point_type(&self, target: PointType) -> Result<Self, MvarError> {
        if target == self.point_type {
            return Ok(self.clone());
        }
        if self.is_rational() && !target.is_rational() {
            return Err(MvarError::FailedToMakeCompatible {
                reason: format!("cannot coerce {} into {}", self.point_type, target),
            });
        }
        if target.num_coords() < self.num_coords() {
            return Err(MvarError::FailedToMakeCompatible {
                reason: format!("cannot coerce {} into {}", self.point_type, target),
            });
        }
        let mut mv = self.clone();
        let mesh_len = self.mesh_len();
        if target.is_rational() && !self.is_rational() {
            mv.points[0] = vec![1.0; mesh_len];
        }
        while mv.points.len() <= target.num_coords() {
            mv.points.push(vec![0.0; mesh_len]);
        }
        mv.point_type = target;
        Ok(mv)
    }
}

/// Bring `a` and `b` to the same geometric type, point type, orders, knot vectors and
/// domain, so that their control meshes correspond one to one.
pub fn make_compatible(
    a: &Multivariate,
    b: &Multivariate,
) -> Result<(Multivariate, Multivariate), MvarError> {
    if a.dim() != b.dim() {
        return Err(MvarError::DimensionMismatch {
            expected: a.dim(),
            actual: b.dim(),
        });
    }
    let mut a = a.power_to_bezier();
    let mut b = b.power_to_bezier();
    if a.geom_type != b.geom_type {
        a = a.bezier_to_bspline()?;
        b = b.bezier_to_bspline()?;
    }

    for axis in 0..a.dim() {
        let (da, db) = (a.domain(axis)?, b.domain(axis)?);
        let tol = 1e-10 * (da.1 - da.0).abs().max(1.0);
        if (da.0 - db.0).abs() > tol || (da.1 - db.1).abs() > tol {
            return Err(MvarError::InconsistentDomain {
                axis,
                lhs: da,
                rhs: db,
            });
        }
        if a.periodic[axis] {
            a = a.open_end(axis)?;
        }
        if b.periodic[axis] {
            b = b.open_end(axis)?;
        }
    }

    let point_type = a.point_type.merged(b.point_type);
    a = a.coerce_point_type(point_type)?;
    b = b.coerce_point_type(point_type)?;

    for axis in 0..a.dim() {
        let order = a.orders[axis].max(b.orders[axis]);
        a = a.raise_degree(axis, order)?;
        b = b.raise_degree(axis, order)?;

        if a.geom_type == GeomType::Bspline {
            let ka = a.knot_vector(axis).unwrap_or_default().to_vec();
            let kb = b.knot_vector(axis).unwrap_or_default().to_vec();
            let merged = knots::merge_knot_vectors(&ka, &kb);
            for t in knots::missing_knots(&ka, &merged) {
                a = a.insert_knot(axis, t, 1)?;
            }
            for t in knots::missing_knots(&kb, &merged) {
                b = b.insert_knot(axis, t, 1)?;
            }
        }
    }

    if a.lengths != b.lengths {
        return Err(MvarError::FailedToMakeCompatible {
            reason: format!("lengths {:?} vs {:?}", a.lengths, b.lengths),
        });
    }
    if let (Some(aux_a), None) = (&a.aux_domain, &b.aux_domain) {
        b.aux_domain = Some(aux_a.clone());
    }
    Ok((a, b))
}

/// Make every multivariate compatible with every other one.
pub fn make_all_compatible(mvs: &[Multivariate]) -> Result<Vec<Multivariate>, MvarError> {
    let Some(first) = mvs.first() else {
        return Ok(Vec::new());
    };
    let mut base = first.clone();
    for mv in &mvs[1..] {
        base = make_compatible(&base, mv)?.0;
    }
    mvs.iter()
        .map(|mv| Ok(make_compatible(&base, mv)?.1))
        .collect()
}

/// Distinct break points (domain ends included) of a Bezier-extracted knot vector.
pub(crate) fn bezier_breaks(kv: &[f64], order: usize) -> Vec<f64> {
    let mut breaks: Vec<f64> = Vec::new();
    for &k in &kv[order - 1..kv.len() - order + 1] {
        if breaks.last().is_none_or(|&last| k - last > KNOT_TOL) {
            breaks.push(k);
        }
    }
    breaks
}

/// Knot vector with every break repeated `order` times.
pub(crate) fn full_multiplicity_knots(breaks: &[f64], order: usize) -> Vec<f64> {
    breaks
        .iter()
        .flat_map(|&b| std::iter::repeat_n(b, order))
        .collect()
}

/// Degree elevation of a single Bezier fiber from `src.len()` to `out.len()` points.
fn raise_bezier_fiber(src: &[f64], out: &mut [f64]) {
    let mut current: SmallVec<[f64; 16]> = src.iter().copied().collect();
    while current.len() < out.len() {
        let n = current.len(); // new degree
        let mut next: SmallVec<[f64; 16]> = SmallVec::with_capacity(n + 1);
        next.push(current[0]);
        for i in 1..n {
            let a = i as f64 / n as f64;
            next.push(a * current[i - 1] + (1.0 - a) * current[i]);
        }
        next.push(current[n - 1]);
        current = next;
    }
    out.copy_from_slice(&current);
}

/// In place de Casteljau leaving the control points of the lower piece `[0, t]`.
pub(crate) fn de_casteljau_lower_nd(
    control_points: &mut (impl IndexMut<usize, Output = f64> + ?Sized),
    start: usize,
    stride: usize,
    size: usize,
    t: f64,
) {
    let s = 1.0 - t;
    for n in 1..size {
        for i in (n..size).rev() {
            let j = start + i * stride;
            let j_prev = j - stride;
            control_points[j] = s * control_points[j_prev] + t * control_points[j];
        }
    }
}

/// In place de Casteljau leaving the control points of the upper piece `[t, 1]`.
pub(crate) fn de_casteljau_upper_nd(
    control_points: &mut (impl IndexMut<usize, Output = f64> + ?Sized),
    start: usize,
    stride: usize,
    size: usize,
    t: f64,
) {
    let s = 1.0 - t;
    for k in 1..size {
        for i in 0..(size - k) {
            let j = start + i * stride;
            let j_next = j + stride;
            control_points[j] = s * control_points[j] + t * control_points[j_next];
        }
    }
}

#[cfg(test)]
mod tests {
    use assertables::{assert_err, assert_ok};
    use itertools::iproduct;
    use pretty_assertions as pa;

    use super::*;
    use crate::test_utils::linspace;

    fn cubic_bspline() -> Multivariate {
        let mut mv = Multivariate::from_rows(
            GeomType::Bspline,
            &[6],
            &[4],
            false,
            &[[0.0], [1.0], [-1.0], [2.0], [0.5], [3.0]],
        )
        .unwrap();
        mv.set_knot_vector(0, vec![0.0, 0.0, 0.0, 0.0, 0.3, 0.6, 1.0, 1.0, 1.0, 1.0])
            .unwrap();
        mv
    }

    fn assert_same_function(a: &Multivariate, b: &Multivariate, samples: &[f64]) {
        for &t in samples {
            let pa_ = a.eval_projected(&[t]).unwrap();
            let pb = b.eval_projected(&[t]).unwrap();
            for c in 0..pa_.len() {
                approx::assert_abs_diff_eq!(pa_[c], pb[c], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn bezier_subdivision_pieces_match() {
        let mv = Multivariate::bezier_from_rows(&[4], &[[0.0], [3.0], [-2.0], [1.0]]).unwrap();
        let (lower, upper) = mv.subdivide(0, 0.4).unwrap();
        pa::assert_eq!(lower.domain(0).unwrap(), (0.0, 0.4));
        pa::assert_eq!(upper.domain(0).unwrap(), (0.4, 1.0));
        assert_same_function(&mv, &lower, &linspace(0.0, 0.4, 5).collect::<Vec<_>>());
        assert_same_function(&mv, &upper, &linspace(0.4, 1.0, 5).collect::<Vec<_>>());
        assert_err!(mv.subdivide(0, 1.0));
        assert_err!(mv.subdivide(1, 0.5));
    }

    #[test]
    fn bspline_subdivision_pieces_match() {
        let mv = cubic_bspline();
        for t in [0.2, 0.3, 0.75] {
            let (lower, upper) = mv.subdivide(0, t).unwrap();
            pa::assert_eq!(lower.domain(0).unwrap(), (0.0, t));
            pa::assert_eq!(upper.domain(0).unwrap(), (t, 1.0));
            assert_same_function(&mv, &lower, &linspace(0.0, t, 6).collect::<Vec<_>>());
            assert_same_function(&mv, &upper, &linspace(t, 1.0, 6).collect::<Vec<_>>());
        }
    }

    #[test]
    fn power_round_trip_and_subdivision() {
        let bez = Multivariate::bezier_from_rows(&[3, 2], &[[0.0], [3.0], [-2.0], [1.0], [4.0], [2.0]])
            .unwrap();
        let power = bez.bezier_to_power();
        approx::assert_abs_diff_eq!(power.power_to_bezier(), bez, epsilon = 1e-12);
        for (u, v) in iproduct!(linspace(0.0, 1.0, 4), linspace(0.0, 1.0, 3)) {
            approx::assert_abs_diff_eq!(
                power.eval(&[u, v]).unwrap()[1],
                bez.eval(&[u, v]).unwrap()[1],
                epsilon = 1e-12
            );
        }
        let (lower, _) = power.subdivide(1, 0.5).unwrap();
        assert_eq!(lower.geom_type(), GeomType::Power);
        approx::assert_abs_diff_eq!(
            lower.eval(&[0.3, 0.25]).unwrap()[1],
            bez.eval(&[0.3, 0.25]).unwrap()[1],
            epsilon = 1e-12
        );
    }

    #[test]
    fn degree_raise_preserves_function() {
        let bez = Multivariate::bezier_from_rows(&[3], &[[0.0], [3.0], [1.0]]).unwrap();
        let raised = bez.raise_degree(0, 5).unwrap();
        pa::assert_eq!(raised.lengths(), &[5]);
        assert_same_function(&bez, &raised, &linspace(0.0, 1.0, 7).collect::<Vec<_>>());

        let bsp = cubic_bspline();
        let raised = bsp.raise_degree(0, 5).unwrap();
        pa::assert_eq!(raised.orders(), &[5]);
        assert_same_function(&bsp, &raised, &linspace(0.0, 1.0, 11).collect::<Vec<_>>());
        assert_err!(bsp.raise_degree(0, 2));
    }

    #[test]
    fn extract_bezier_full_multiplicity() {
        let bsp = cubic_bspline();
        let pieces = bsp.extract_bezier(0).unwrap();
        pa::assert_eq!(pieces.lengths(), &[12]);
        assert_eq!(knots::multiplicity(pieces.knot_vector(0).unwrap(), 0.3), 4);
        assert_same_function(&bsp, &pieces, &linspace(0.0, 1.0, 13).collect::<Vec<_>>());
    }

    #[test]
    fn open_end_of_periodic() {
        let mut mv = Multivariate::from_rows(
            GeomType::Bspline,
            &[5],
            &[3],
            false,
            &[[1.0], [2.0], [0.0], [4.0], [3.0]],
        )
        .unwrap();
        mv.set_periodic(0).unwrap();
        let open = assert_ok!(mv.open_end(0));
        assert!(!open.periodic()[0]);
        assert!(knots::is_open_end(open.knot_vector(0).unwrap(), 3, open.lengths()[0]));
        pa::assert_eq!(open.domain(0).unwrap(), mv.domain(0).unwrap());
        assert_same_function(&mv, &open, &linspace(0.0, 1.0, 9).collect::<Vec<_>>());
    }

    #[test]
    fn bezier_bspline_round_trip() {
        let mut bez = Multivariate::bezier_from_rows(&[3], &[[0.0], [3.0], [1.0]]).unwrap();
        bez.set_aux_domain(0, 1.0, 3.0).unwrap();
        let bsp = bez.bezier_to_bspline().unwrap();
        pa::assert_eq!(bsp.domain(0).unwrap(), (1.0, 3.0));
        let back = bsp.bspline_to_bezier().unwrap();
        pa::assert_eq!(back.domain(0).unwrap(), (1.0, 3.0));
        assert_same_function(&bez, &back, &[1.0, 1.7, 3.0]);
        assert_err!(cubic_bspline().bspline_to_bezier());
    }

    #[test]
    fn make_compatible_mixed_inputs() {
        let bez = Multivariate::bezier_from_rows(&[2], &[[0.0, 1.0], [1.0, 1.0]]).unwrap();
        let bsp = cubic_bspline();
        let (a, b) = make_compatible(&bez, &bsp).unwrap();
        pa::assert_eq!(a.lengths(), b.lengths());
        pa::assert_eq!(a.orders(), &[4]);
        pa::assert_eq!(a.point_type(), PointType::E2);
        pa::assert_eq!(b.point_type(), PointType::E2);
        pa::assert_eq!(a.knot_vector(0), b.knot_vector(0));
        assert_same_function(&bez, &a, &[0.0, 0.5, 1.0]);
        approx::assert_abs_diff_eq!(
            b.eval(&[0.45]).unwrap()[1],
            bsp.eval(&[0.45]).unwrap()[1],
            epsilon = 1e-10
        );
        approx::assert_abs_diff_eq!(b.eval(&[0.45]).unwrap()[2], 0.0);
    }

    #[test]
    fn make_compatible_rejects_domain_mismatch() {
        let a = Multivariate::bezier_from_rows(&[2], &[[0.0], [1.0]]).unwrap();
        let b = a.with_domain(0.0, 2.0, 0).unwrap();
        assert!(matches!(
            make_compatible(&a, &b),
            Err(MvarError::InconsistentDomain { axis: 0, .. })
        ));
        let c = Multivariate::new_bezier(&[2, 2], PointType::E1).unwrap();
        assert!(matches!(
            make_compatible(&a, &c),
            Err(MvarError::DimensionMismatch { .. })
        ));
    }
}
