use crate::{AxisVec, GeomType, Multivariate, MvarError, index_tuple, knots, mesh_index::sub_spaces};

impl Multivariate {
    /// Parametric domain of `axis`: the valid knot span for Bspline axes, otherwise [0, 1]
    /// unless overridden by the auxiliary domain.
    pub fn domain(&self, axis: usize) -> Result<(f64, f64), MvarError> {
        self.check_axis(axis)?;
        Ok(self.axis_domain(axis))
    }

    /// Domain of all axes at once.
    pub fn domain_all(&self) -> AxisVec<(f64, f64)> {
        (0..self.dim()).map(|axis| self.axis_domain(axis)).collect()
    }

    fn axis_domain(&self, axis: usize) -> (f64, f64) {
        match (self.geom_type, &self.knot_vectors[axis]) {
            (GeomType::Bspline, Some(kv)) => {
                let order = self.orders[axis];
                let n = knots::effective_length(self.lengths[axis], order, self.periodic[axis]);
                knots::knot_domain(kv, order, n)
            }
            _ => self
                .aux_domain
                .as_ref()
                .map(|aux| aux[axis])
                .unwrap_or((0.0, 1.0)),
        }
    }

    /// Set the domain of `axis` to [min, max] in place.
    ///
    /// A Bezier multivariate with a target other than [0, 1] is first converted to Bspline.
    /// Power multivariates record the domain as their auxiliary domain.
    pub fn set_domain(&mut self, min: f64, max: f64, axis: usize) -> Result<(), MvarError> {
        self.check_axis(axis)?;
        if max <= min {
            return Err(MvarError::InconsistentDomain {
                axis,
                lhs: (min, max),
                rhs: self.axis_domain(axis),
            });
        }
        match self.geom_type {
            GeomType::Bezier => {
                if (min, max) == (0.0, 1.0) && self.aux_domain.is_none() {
                    return Ok(());
                }
                *self = self.bezier_to_bspline()?;
                self.set_domain(min, max, axis)
            }
            GeomType::Power => self.set_aux_domain(axis, min, max),
            GeomType::Bspline => {
                let from = self.axis_domain(axis);
                let Some(kv) = self.knot_vectors[axis].as_mut() else {
                    return Err(MvarError::AlgorithmError {
                        message: format!("Bspline axis {axis} without knot vector"),
                    });
                };
                knots::remap_knots(kv, from, (min, max));
                Ok(())
            }
        }
    }

    /// Copying variant of [`Multivariate::set_domain`]; `self` is left untouched.
    pub fn with_domain(&self, min: f64, max: f64, axis: usize) -> Result<Self, MvarError> {
        let mut mv = self.clone();
        mv.set_domain(min, max, axis)?;
        Ok(mv)
    }

    /// Set the domain of every axis.
    pub fn set_domain_all(&mut self, min: f64, max: f64) -> Result<(), MvarError> {
        for axis in 0..self.dim() {
            self.set_domain(min, max, axis)?;
        }
        Ok(())
    }

    /// Give `axis` the domain [min, max] without changing the geometric type:
    /// Bezier/Power axes get an auxiliary domain, Bspline knots are remapped.
    pub fn align_domain(&mut self, axis: usize, min: f64, max: f64) -> Result<(), MvarError> {
        match self.geom_type {
            GeomType::Bspline => self.set_domain(min, max, axis),
            _ => self.set_aux_domain(axis, min, max),
        }
    }

    /// Extract the sub-multivariate whose domain along `axis` is [t1, t2] (swapped if needed).
    pub fn region_from_mv(&self, t1: f64, t2: f64, axis: usize) -> Result<Self, MvarError> {
        self.check_axis(axis)?;
        let (t1, t2) = if t1 > t2 { (t2, t1) } else { (t1, t2) };
        let (min, max) = self.axis_domain(axis);
        let slack = 1e-12 * (max - min).abs().max(1.0);
        if t1 < min - slack || t2 > max + slack {
            return Err(MvarError::ParameterOutOfDomain {
                axis,
                t: if t1 < min - slack { t1 } else { t2 },
                min,
                max,
            });
        }

        let mut mv = if self.periodic[axis] {
            self.open_end(axis)?
        } else {
            self.clone()
        };
        if t1 - min > slack {
            mv = mv.subdivide(axis, t1)?.1;
        }
        if max - t2 > slack {
            mv = mv.subdivide(axis, t2)?.0;
        }
        Ok(mv)
    }

    /// Swap the roles of `axis1` and `axis2`, remapping the whole control mesh.
    pub fn reverse_axes(&self, axis1: usize, axis2: usize) -> Result<Self, MvarError> {
        self.check_axis(axis1)?;
        self.check_axis(axis2)?;
        if axis1 == axis2 {
            return Ok(self.clone());
        }
        let mut permutation: AxisVec<usize> = (0..self.dim()).collect();
        permutation.swap(axis1, axis2);
        Ok(self.permute_axes(&permutation))
    }

    /// Move axis `dim - 1` into position `axis`, shifting axes `axis..dim-1` up by one.
    pub fn shift_axes(&self, axis: usize) -> Result<Self, MvarError> {
        self.check_axis(axis)?;
        let last = self.dim() - 1;
        // new axis j takes old axis permutation[j]
        let permutation: AxisVec<usize> = (0..self.dim())
            .map(|j| match j {
                j if j < axis => j,
                j if j == axis => last,
                j => j - 1,
            })
            .collect();
        Ok(self.permute_axes(&permutation))
    }

    /// New axis `j` is old axis `permutation[j]`.
    fn permute_axes(&self, permutation: &[usize]) -> Self {
        let new_lengths: AxisVec<usize> = permutation.iter().map(|&p| self.lengths[p]).collect();
        let new_sub_spaces = sub_spaces(&new_lengths);

        let mut mv = Self {
            lengths: new_lengths,
            orders: permutation.iter().map(|&p| self.orders[p]).collect(),
            periodic: permutation.iter().map(|&p| self.periodic[p]).collect(),
            knot_vectors: permutation
                .iter()
                .map(|&p| self.knot_vectors[p].clone())
                .collect(),
            aux_domain: self
                .aux_domain
                .as_ref()
                .map(|aux| permutation.iter().map(|&p| aux[p]).collect()),
            ..self.clone_structure()
        };
        mv.points = self
            .points
            .iter()
            .map(|coord| if coord.is_empty() { Vec::new() } else { vec![0.0; coord.len()] })
            .collect();

        for linear in 0..self.mesh_len() {
            let old = index_tuple(&self.lengths, linear);
            let new_linear: usize = permutation
                .iter()
                .zip(&new_sub_spaces)
                .map(|(&p, &stride)| old[p] * stride)
                .sum();
            for c in self.coord_range() {
                mv.points[c][new_linear] = self.points[c][linear];
            }
        }
        mv.sub_spaces = new_sub_spaces;
        mv
    }

    /// Add one trailing constant axis (one control point, order 1, domain [0, 1]).
    pub fn promote_one(&self) -> Self {
        let mut mv = self.clone();
        mv.lengths.push(1);
        mv.orders.push(1);
        mv.periodic.push(false);
        mv.knot_vectors.push(match self.geom_type {
            GeomType::Bspline => Some(vec![0.0, 1.0]),
            _ => None,
        });
        if let Some(aux) = mv.aux_domain.as_mut() {
            aux.push((0.0, 1.0));
        }
        // A trailing length-one axis leaves the flat layout unchanged.
        mv.sub_spaces = sub_spaces(&mv.lengths);
        mv
    }

    /// Raise the dimension to `new_dim`, placing the existing axes at
    /// `[start_axis, start_axis + dim)`. New axes are constant.
    pub fn promote_to_dim(&self, new_dim: usize, start_axis: usize) -> Result<Self, MvarError> {
        if new_dim < self.dim() || start_axis + self.dim() > new_dim {
            return Err(MvarError::InvalidAxis {
                axis: start_axis,
                dim: new_dim,
            });
        }
        let mut mv = self.clone();
        while mv.dim() < new_dim {
            mv = mv.promote_one();
        }
        for _ in 0..start_axis {
            mv = mv.shift_axes(0)?;
        }
        Ok(mv)
    }

    /// Iso-parametric restriction: fix `axis` at `t`, dropping it.
    pub fn restrict_axis(&self, axis: usize, t: f64) -> Result<Self, MvarError> {
        self.check_axis(axis)?;
        if self.dim() < 2 {
            return Err(MvarError::TooFewParams {
                required: 2,
                actual: self.dim(),
            });
        }
        let basis = self.axis_basis(axis, t)?;
        let mut mv = self.map_fibers(axis, 1, |src, out| {
            out[0] = basis.iter().map(|&(i, b)| b * src[i]).sum();
        });
        mv.lengths.remove(axis);
        mv.orders.remove(axis);
        mv.periodic.remove(axis);
        mv.knot_vectors.remove(axis);
        if let Some(aux) = mv.aux_domain.as_mut() {
            aux.remove(axis);
        }
        mv.sub_spaces = sub_spaces(&mv.lengths);
        Ok(mv)
    }

    /// Domain of a promoted axis set to match `domains` (one entry per axis).
    pub fn align_domains(&mut self, domains: &[(f64, f64)]) -> Result<(), MvarError> {
        if domains.len() != self.dim() {
            return Err(MvarError::DimensionMismatch {
                expected: self.dim(),
                actual: domains.len(),
            });
        }
        for (axis, &(min, max)) in domains.iter().enumerate() {
            if self.axis_domain(axis) != (min, max) {
                self.align_domain(axis, min, max)?;
            }
        }
        Ok(())
    }
}

/// Domain shared by all `mvs`, or an error naming the first disagreeing axis.
pub fn common_domain(mvs: &[Multivariate]) -> Result<AxisVec<(f64, f64)>, MvarError> {
    let Some(first) = mvs.first() else {
        return Err(MvarError::TooFewParams {
            required: 1,
            actual: 0,
        });
    };
    let domain = first.domain_all();
    for mv in &mvs[1..] {
        if mv.dim() != first.dim() {
            return Err(MvarError::DimensionMismatch {
                expected: first.dim(),
                actual: mv.dim(),
            });
        }
        for (axis, (&lhs, rhs)) in domain.iter().zip(mv.domain_all()).enumerate() {
            let tol = 1e-10 * (lhs.1 - lhs.0).abs().max(1.0);
            if (lhs.0 - rhs.0).abs() > tol || (lhs.1 - rhs.1).abs() > tol {
                return Err(MvarError::InconsistentDomain { axis, lhs, rhs });
            }
        }
    }
    Ok(domain)
}

#[cfg(test)]
mod tests {
    use assertables::{assert_err, assert_ok};
    use itertools::iproduct;
    use pretty_assertions as pa;

    use super::*;
    use crate::{PointType, test_utils::linspace};

    fn sample_bivariate() -> Multivariate {
        // 3 x 2 mesh with distinct values
        Multivariate::bezier_from_rows(
            &[3, 2],
            &[[0.0, 1.0], [1.0, 0.5], [2.0, 3.0], [0.5, 2.0], [1.5, -1.0], [3.0, 0.0]],
        )
        .unwrap()
    }

    #[test]
    fn domain_defaults() {
        let bez = sample_bivariate();
        pa::assert_eq!(bez.domain(1).unwrap(), (0.0, 1.0));
        assert!(matches!(bez.domain(2), Err(MvarError::InvalidAxis { axis: 2, dim: 2 })));

        let mut bsp = Multivariate::new_bspline(&[5], &[3], PointType::E1).unwrap();
        bsp.set_knot_vector(0, vec![0.0, 0.0, 0.0, 1.0, 2.0, 4.0, 4.0, 4.0])
            .unwrap();
        pa::assert_eq!(bsp.domain(0).unwrap(), (0.0, 4.0));
    }

    #[test]
    fn set_domain_then_domain_round_trip() {
        for (lo, hi) in [(0.0, 1.0), (-2.0, 3.0), (0.25, 0.5)] {
            for axis in 0..2 {
                let mv = sample_bivariate().with_domain(lo, hi, axis).unwrap();
                pa::assert_eq!(mv.domain(axis).unwrap(), (lo, hi));
            }
        }
        let mut power = Multivariate::new_power(&[3], PointType::E1).unwrap();
        power.set_domain(2.0, 5.0, 0).unwrap();
        pa::assert_eq!(power.domain(0).unwrap(), (2.0, 5.0));
        assert_err!(power.set_domain(1.0, 1.0, 0));
    }

    #[test]
    fn set_domain_preserves_shape() {
        let mv = sample_bivariate();
        let moved = mv.with_domain(2.0, 4.0, 0).unwrap();
        assert_eq!(moved.geom_type(), GeomType::Bspline);
        for (u, v) in iproduct!(linspace(0.0, 1.0, 4), linspace(0.0, 1.0, 3)) {
            let a = mv.eval(&[u, v]).unwrap();
            let b = moved.eval(&[2.0 + 2.0 * u, v]).unwrap();
            approx::assert_abs_diff_eq!(a[1], b[1], epsilon = 1e-12);
        }
    }

    #[test]
    fn region_from_mv_matches_original() {
        let mv = sample_bivariate();
        let region = assert_ok!(mv.region_from_mv(0.8, 0.2, 0));
        pa::assert_eq!(region.domain(0).unwrap(), (0.2, 0.8));
        for (u, v) in iproduct!(linspace(0.2, 0.8, 4), linspace(0.0, 1.0, 3)) {
            approx::assert_abs_diff_eq!(
                region.eval(&[u, v]).unwrap()[2],
                mv.eval(&[u, v]).unwrap()[2],
                epsilon = 1e-12
            );
        }
        assert_err!(mv.region_from_mv(0.2, 1.2, 0));
    }

    #[test]
    fn reverse_axes_swaps_parameters() {
        let mv = sample_bivariate();
        let rev = mv.reverse_axes(0, 1).unwrap();
        pa::assert_eq!(rev.lengths(), &[2, 3]);
        for (u, v) in iproduct!(linspace(0.0, 1.0, 3), linspace(0.0, 1.0, 3)) {
            approx::assert_abs_diff_eq!(
                rev.eval(&[v, u]).unwrap()[1],
                mv.eval(&[u, v]).unwrap()[1],
                epsilon = 1e-12
            );
        }
        assert_err!(mv.reverse_axes(0, 2));
    }

    #[test]
    fn shift_axes_moves_last_axis() {
        let mv = Multivariate::new_bezier(&[2, 3, 4], PointType::E1).unwrap();
        let shifted = mv.shift_axes(0).unwrap();
        pa::assert_eq!(shifted.lengths(), &[4, 2, 3]);
        let shifted = mv.shift_axes(1).unwrap();
        pa::assert_eq!(shifted.lengths(), &[2, 4, 3]);
    }

    #[test]
    fn promote_places_axes() {
        let crv = Multivariate::bezier_from_rows(&[3], &[[0.0], [1.0], [4.0]]).unwrap();
        let promoted = crv.promote_to_dim(3, 1).unwrap();
        pa::assert_eq!(promoted.lengths(), &[1, 3, 1]);
        for (a, t, b) in iproduct!([0.0, 0.7], linspace(0.0, 1.0, 5), [0.1, 1.0]) {
            approx::assert_abs_diff_eq!(
                promoted.eval(&[a, t, b]).unwrap()[1],
                crv.eval(&[t]).unwrap()[1],
                epsilon = 1e-12
            );
        }
        assert_err!(crv.promote_to_dim(2, 2));
    }

    #[test]
    fn restrict_axis_is_iso_curve() {
        let mv = sample_bivariate();
        let iso = mv.restrict_axis(1, 0.3).unwrap();
        pa::assert_eq!(iso.lengths(), &[3]);
        for u in linspace(0.0, 1.0, 5) {
            approx::assert_abs_diff_eq!(
                iso.eval(&[u]).unwrap()[2],
                mv.eval(&[u, 0.3]).unwrap()[2],
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn common_domain_detects_mismatch() {
        let a = sample_bivariate();
        let b = a.with_domain(0.0, 2.0, 1).unwrap();
        assert!(matches!(
            common_domain(&[a.clone(), b]),
            Err(MvarError::InconsistentDomain { axis: 1, .. })
        ));
        pa::assert_eq!(common_domain(&[a.clone(), a]).unwrap().as_slice(), &[(0.0, 1.0); 2]);
    }
}
