use arrayvec::ArrayVec;
use smallvec::{SmallVec, smallvec};

use crate::{
    AxisVec, MvarError, bernstein_basis, knots, mesh_index::sub_spaces, mesh_length,
};

/// Maximal number of (non-weight) coordinates of a control point.
pub const MAX_COORD: usize = 15;

/// A homogeneous point: index 0 holds the weight, indices `1..=coords` the coordinates.
pub type HomoPoint = ArrayVec<f64, { MAX_COORD + 1 }>;

/// Basis of the tensor product along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeomType {
    Bezier,
    Bspline,
    Power,
}

impl std::fmt::Display for GeomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GeomType::Bezier => "Bezier",
            GeomType::Bspline => "Bspline",
            GeomType::Power => "Power",
        };
        f.write_str(name)
    }
}

/// Rational flag plus number of coordinates, eg. `E3` or `P2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointType {
    rational: bool,
    coords: u8,
}

impl PointType {
    pub const E1: Self = Self::unchecked(false, 1);
    pub const E2: Self = Self::unchecked(false, 2);
    pub const E3: Self = Self::unchecked(false, 3);
    pub const P1: Self = Self::unchecked(true, 1);
    pub const P2: Self = Self::unchecked(true, 2);
    pub const P3: Self = Self::unchecked(true, 3);

    const fn unchecked(rational: bool, coords: u8) -> Self {
        Self { rational, coords }
    }

    pub fn new(rational: bool, coords: usize) -> Result<Self, MvarError> {
        if coords == 0 || coords > MAX_COORD {
            return Err(MvarError::InvalidPointType { coords });
        }
        Ok(Self {
            rational,
            coords: coords as u8,
        })
    }

    pub fn is_rational(self) -> bool {
        self.rational
    }

    pub fn num_coords(self) -> usize {
        self.coords as usize
    }

    pub fn is_scalar(self) -> bool {
        self.coords == 1
    }

    /// Smallest point type both `self` and `other` coerce into.
    pub fn merged(self, other: Self) -> Self {
        Self {
            rational: self.rational || other.rational,
            coords: self.coords.max(other.coords),
        }
    }

    pub fn with_rational(self, rational: bool) -> Self {
        Self { rational, ..self }
    }

    pub fn with_coords(self, coords: usize) -> Result<Self, MvarError> {
        Self::new(self.rational, coords)
    }
}

impl std::fmt::Display for PointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = if self.rational { 'P' } else { 'E' };
        write!(f, "{}{}", prefix, self.coords)
    }
}

/// A tensor-product multivariate function over a `dim`-dimensional parameter domain.
///
/// The control mesh is stored one flat array per coordinate. Index 0 holds the weights
/// (empty for non-rational point types). Rational coordinates are stored pre-multiplied
/// by their weight. Axis 0 varies fastest in the flat arrays.
#[derive(Clone, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Multivariate {
    pub(crate) geom_type: GeomType,
    pub(crate) point_type: PointType,

    // Number of control points along each axis.
    pub(crate) lengths: AxisVec<usize>,

    // Order (degree + 1) along each axis. Equal to the length for Bezier and Power axes.
    pub(crate) orders: AxisVec<usize>,

    pub(crate) periodic: AxisVec<bool>,

    // Only Bspline multivariates carry knot vectors.
    pub(crate) knot_vectors: AxisVec<Option<Vec<f64>>>,

    // Stride of each axis in the flattened control mesh.
    pub(crate) sub_spaces: AxisVec<usize>,

    pub(crate) points: SmallVec<[Vec<f64>; 4]>,

    // Explicit domain override for Bezier/Power axes.
    pub(crate) aux_domain: Option<AxisVec<(f64, f64)>>,
}

impl Multivariate {
    /// Create a multivariate with all coordinates zero (and unit weights when rational).
    /// Bspline axes get open uniform knot vectors over [0, 1].
    pub fn new(
        geom_type: GeomType,
        lengths: &[usize],
        orders: &[usize],
        point_type: PointType,
    ) -> Result<Self, MvarError> {
        if lengths.is_empty() {
            return Err(MvarError::TooFewParams {
                required: 1,
                actual: 0,
            });
        }
        if orders.len() != lengths.len() {
            return Err(MvarError::DimensionMismatch {
                expected: lengths.len(),
                actual: orders.len(),
            });
        }
        for (axis, (&len, &order)) in lengths.iter().zip(orders).enumerate() {
            let valid = match geom_type {
                GeomType::Bezier | GeomType::Power => len >= 1 && order == len,
                GeomType::Bspline => order >= 1 && len >= order,
            };
            if !valid {
                return Err(MvarError::InvalidKnotVector {
                    axis,
                    reason: format!("{geom_type} axis with length {len} and order {order}"),
                });
            }
        }

        let knot_vectors = lengths
            .iter()
            .zip(orders)
            .map(|(&len, &order)| match geom_type {
                GeomType::Bspline => Some(knots::open_uniform_knots(len, order)),
                _ => None,
            })
            .collect();

        let mesh_len = mesh_length(lengths);
        let mut points: SmallVec<[Vec<f64>; 4]> = smallvec![Vec::new()];
        if point_type.is_rational() {
            points[0] = vec![1.0; mesh_len];
        }
        for _ in 0..point_type.num_coords() {
            points.push(vec![0.0; mesh_len]);
        }

        Ok(Self {
            geom_type,
            point_type,
            lengths: lengths.iter().copied().collect(),
            orders: orders.iter().copied().collect(),
            periodic: smallvec![false; lengths.len()],
            knot_vectors,
            sub_spaces: sub_spaces(lengths),
            points,
            aux_domain: None,
        })
    }

    pub fn new_bezier(lengths: &[usize], point_type: PointType) -> Result<Self, MvarError> {
        Self::new(GeomType::Bezier, lengths, lengths, point_type)
    }

    pub fn new_power(lengths: &[usize], point_type: PointType) -> Result<Self, MvarError> {
        Self::new(GeomType::Power, lengths, lengths, point_type)
    }

    pub fn new_bspline(
        lengths: &[usize],
        orders: &[usize],
        point_type: PointType,
    ) -> Result<Self, MvarError> {
        Self::new(GeomType::Bspline, lengths, orders, point_type)
    }

    /// Build a multivariate from control point rows given in mesh order (axis 0 fastest).
    ///
    /// When `rational` is set, each row is `[w, w*x1, ..., w*xn]`, otherwise `[x1, ..., xn]`.
    pub fn from_rows<const N: usize>(
        geom_type: GeomType,
        lengths: &[usize],
        orders: &[usize],
        rational: bool,
        rows: &[[f64; N]],
    ) -> Result<Self, MvarError> {
        let coords = if rational { N.saturating_sub(1) } else { N };
        let point_type = PointType::new(rational, coords)?;
        let mut mv = Self::new(geom_type, lengths, orders, point_type)?;
        if rows.len() != mv.mesh_len() {
            return Err(MvarError::IndexOutOfMesh {
                index: rows.len(),
                len: mv.mesh_len(),
            });
        }
        let offset = if rational { 0 } else { 1 };
        for (i, row) in rows.iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                mv.points[c + offset][i] = value;
            }
        }
        Ok(mv)
    }

    pub fn bezier_from_rows<const N: usize>(
        lengths: &[usize],
        rows: &[[f64; N]],
    ) -> Result<Self, MvarError> {
        Self::from_rows(GeomType::Bezier, lengths, lengths, false, rows)
    }

    /// Promote a freeform curve into a univariate multivariate.
    /// A `None` knot vector yields an open uniform one (or a Bezier curve when `order == len`).
    pub fn from_curve<const N: usize>(
        order: usize,
        knot_vector: Option<&[f64]>,
        rational: bool,
        points: &[[f64; N]],
    ) -> Result<Self, MvarError> {
        let len = points.len();
        match knot_vector {
            None if order == len => {
                Self::from_rows(GeomType::Bezier, &[len], &[len], rational, points)
            }
            None => Self::from_rows(GeomType::Bspline, &[len], &[order], rational, points),
            Some(kv) => {
                let mut mv =
                    Self::from_rows(GeomType::Bspline, &[len], &[order], rational, points)?;
                mv.set_knot_vector(0, kv.to_vec())?;
                Ok(mv)
            }
        }
    }

    /// Promote a freeform surface (`lengths[0] * lengths[1]` points, u fastest)
    /// into a bivariate multivariate.
    pub fn from_surface<const N: usize>(
        lengths: [usize; 2],
        orders: [usize; 2],
        knot_vectors: Option<[&[f64]; 2]>,
        rational: bool,
        points: &[[f64; N]],
    ) -> Result<Self, MvarError> {
        let is_bezier = knot_vectors.is_none() && orders == lengths;
        let geom_type = if is_bezier {
            GeomType::Bezier
        } else {
            GeomType::Bspline
        };
        let mut mv = Self::from_rows(geom_type, &lengths, &orders, rational, points)?;
        if let Some(kvs) = knot_vectors {
            for (axis, kv) in kvs.iter().enumerate() {
                mv.set_knot_vector(axis, kv.to_vec())?;
            }
        }
        Ok(mv)
    }

    pub fn dim(&self) -> usize {
        self.lengths.len()
    }

    pub fn geom_type(&self) -> GeomType {
        self.geom_type
    }

    pub fn point_type(&self) -> PointType {
        self.point_type
    }

    pub fn is_rational(&self) -> bool {
        self.point_type.is_rational()
    }

    pub fn num_coords(&self) -> usize {
        self.point_type.num_coords()
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn orders(&self) -> &[usize] {
        &self.orders
    }

    pub fn periodic(&self) -> &[bool] {
        &self.periodic
    }

    pub fn sub_spaces(&self) -> &[usize] {
        &self.sub_spaces
    }

    pub fn knot_vector(&self, axis: usize) -> Option<&[f64]> {
        self.knot_vectors.get(axis)?.as_deref()
    }

    pub fn aux_domain(&self) -> Option<&[(f64, f64)]> {
        self.aux_domain.as_deref()
    }

    pub fn mesh_len(&self) -> usize {
        mesh_length(&self.lengths)
    }

    /// Control values of coordinate `coord` (0 is the weight).
    pub fn points(&self, coord: usize) -> &[f64] {
        &self.points[coord]
    }

    pub fn points_mut(&mut self, coord: usize) -> &mut [f64] {
        &mut self.points[coord]
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.is_rational().then(|| self.points[0].as_slice())
    }

    pub(crate) fn check_axis(&self, axis: usize) -> Result<(), MvarError> {
        if axis >= self.dim() {
            return Err(MvarError::InvalidAxis {
                axis,
                dim: self.dim(),
            });
        }
        Ok(())
    }

    pub fn set_knot_vector(&mut self, axis: usize, knots: Vec<f64>) -> Result<(), MvarError> {
        self.check_axis(axis)?;
        if self.geom_type != GeomType::Bspline {
            return Err(MvarError::UndefinedGeometry {
                geom_type: self.geom_type,
                operation: "set_knot_vector",
            });
        }
        knots::validate_knot_vector(
            axis,
            &knots,
            self.lengths[axis],
            self.orders[axis],
            self.periodic[axis],
        )?;
        self.knot_vectors[axis] = Some(knots);
        Ok(())
    }

    /// Mark a Bspline axis periodic, installing a uniform periodic knot vector over [0, 1].
    pub fn set_periodic(&mut self, axis: usize) -> Result<(), MvarError> {
        self.check_axis(axis)?;
        if self.geom_type != GeomType::Bspline {
            return Err(MvarError::UndefinedGeometry {
                geom_type: self.geom_type,
                operation: "set_periodic",
            });
        }
        self.periodic[axis] = true;
        self.knot_vectors[axis] = Some(knots::periodic_uniform_knots(
            self.lengths[axis],
            self.orders[axis],
        ));
        Ok(())
    }

    pub fn set_aux_domain(&mut self, axis: usize, min: f64, max: f64) -> Result<(), MvarError> {
        self.check_axis(axis)?;
        if max <= min {
            return Err(MvarError::InconsistentDomain {
                axis,
                lhs: (min, max),
                rhs: (min, max),
            });
        }
        let dim = self.dim();
        let aux = self
            .aux_domain
            .get_or_insert_with(|| smallvec![(0.0, 1.0); dim]);
        aux[axis] = (min, max);
        Ok(())
    }

    /// Homogeneous control point at `index`; index 0 of the result is the weight (1 if non-rational).
    pub fn control_point(&self, index: &[usize]) -> Result<HomoPoint, MvarError> {
        let linear = crate::linear_index(&self.lengths, index)?;
        Ok(self.control_point_linear(linear))
    }

    pub(crate) fn control_point_linear(&self, linear: usize) -> HomoPoint {
        let mut point = HomoPoint::new();
        point.push(if self.is_rational() {
            self.points[0][linear]
        } else {
            1.0
        });
        for c in 1..=self.num_coords() {
            point.push(self.points[c][linear]);
        }
        point
    }

    /// Set the control point at `index` from homogeneous values laid out as in
    /// [`Multivariate::control_point`]. The weight entry is ignored when non-rational.
    pub fn set_control_point(&mut self, index: &[usize], values: &[f64]) -> Result<(), MvarError> {
        let linear = crate::linear_index(&self.lengths, index)?;
        if values.len() != self.num_coords() + 1 {
            return Err(MvarError::DimensionMismatch {
                expected: self.num_coords() + 1,
                actual: values.len(),
            });
        }
        let first = if self.is_rational() { 0 } else { 1 };
        for c in first..=self.num_coords() {
            self.points[c][linear] = values[c];
        }
        Ok(())
    }

    /// Coordinates present in `points`: `0..=n` when rational, `1..=n` otherwise.
    pub(crate) fn coord_range(&self) -> std::ops::RangeInclusive<usize> {
        let first = if self.is_rational() { 0 } else { 1 };
        first..=self.num_coords()
    }

    /// Evaluate at `params` (one per axis). Returns homogeneous values, index 0 being the
    /// weight (1 for non-rational multivariates).
    pub fn eval(&self, params: &[f64]) -> Result<HomoPoint, MvarError> {
        if params.len() != self.dim() {
            return Err(MvarError::DimensionMismatch {
                expected: self.dim(),
                actual: params.len(),
            });
        }
        let mut bases: AxisVec<AxisBasis> = AxisVec::with_capacity(self.dim());
        for (axis, &t) in params.iter().enumerate() {
            bases.push(self.axis_basis(axis, t)?);
        }

        let mut result = HomoPoint::new();
        if !self.is_rational() {
            result.push(1.0);
        }
        let mut scratch = Vec::new();
        for c in self.coord_range() {
            result.push(self.contract(&self.points[c], &bases, &mut scratch));
        }
        Ok(result)
    }

    /// Evaluate and project out the weight.
    pub fn eval_projected(&self, params: &[f64]) -> Result<HomoPoint, MvarError> {
        let homo = self.eval(params)?;
        let w = homo[0];
        if self.is_rational() && w == 0.0 {
            return Err(MvarError::NumericDegeneracy {
                message: format!("zero weight at {params:?}"),
            });
        }
        Ok(homo[1..].iter().map(|x| x / w).collect())
    }

    /// Central difference gradient of a scalar multivariate (projected value).
    pub fn numeric_gradient(&self, params: &[f64], epsilon: f64) -> Result<AxisVec<f64>, MvarError> {
        if params.len() < self.dim() {
            return Err(MvarError::TooFewParams {
                required: self.dim(),
                actual: params.len(),
            });
        }
        let domain = self.domain_all();
        let mut gradient = AxisVec::with_capacity(self.dim());
        for d in 0..self.dim() {
            let (min, max) = domain[d];
            let mut param_plus: AxisVec<f64> = params.iter().copied().collect();
            param_plus[d] = (params[d] + epsilon).min(max);
            let mut param_minus = param_plus.clone();
            param_minus[d] = (params[d] - epsilon).max(min);

            let f_plus = self.eval_projected(&param_plus)?[0];
            let f_minus = self.eval_projected(&param_minus)?[0];
            let span = param_plus[d] - param_minus[d];
            gradient.push(if span > 0.0 {
                (f_plus - f_minus) / span
            } else {
                0.0
            });
        }
        Ok(gradient)
    }

    /// Tensor contraction of one coordinate mesh against per-axis basis values.
    /// The last axis has the largest stride, so it is contracted first.
    fn contract(&self, values: &[f64], bases: &[AxisBasis], scratch: &mut Vec<f64>) -> f64 {
        let mut current: Vec<f64> = values.to_vec();
        for axis in (0..self.dim()).rev() {
            let inner = self.sub_spaces[axis];
            scratch.clear();
            scratch.resize(inner, 0.0);
            for &(index, weight) in &bases[axis] {
                let offset = index * inner;
                for j in 0..inner {
                    scratch[j] += weight * current[offset + j];
                }
            }
            std::mem::swap(&mut current, scratch);
        }
        current[0]
    }

    /// Non-zero basis values along `axis` at `t`, as (control index, basis value) pairs.
    pub(crate) fn axis_basis(&self, axis: usize, t: f64) -> Result<AxisBasis, MvarError> {
        let (min, max) = self.domain(axis)?;
        let slack = 1e-9 * (max - min).abs().max(1.0);
        if t < min - slack || t > max + slack || t.is_nan() {
            return Err(MvarError::ParameterOutOfDomain { axis, t, min, max });
        }
        let t = t.clamp(min, max);
        let len = self.lengths[axis];
        let mut basis = AxisBasis::new();

        match self.geom_type {
            GeomType::Bezier => {
                let u = (t - min) / (max - min);
                let mut values: SmallVec<[f64; 8]> = smallvec![0.0; len];
                bernstein_basis(len - 1, u, &mut values);
                basis.extend(values.into_iter().enumerate());
            }
            GeomType::Power => {
                let u = (t - min) / (max - min);
                let mut power = 1.0;
                for i in 0..len {
                    basis.push((i, power));
                    power *= u;
                }
            }
            GeomType::Bspline => {
                let order = self.orders[axis];
                let periodic = self.periodic[axis];
                let kv = self.knot_vectors[axis].as_deref().ok_or_else(|| {
                    MvarError::AlgorithmError {
                        message: format!("Bspline axis {axis} without knot vector"),
                    }
                })?;
                let n = knots::effective_length(len, order, periodic);
                let span = knots::find_span(kv, order, n, t);
                let mut values: SmallVec<[f64; 8]> = smallvec![0.0; order];
                knots::basis_functions(kv, order, span, t, &mut values);
                let first = span + 1 - order;
                for (i, value) in values.into_iter().enumerate() {
                    basis.push(((first + i) % len, value));
                }
            }
        }
        Ok(basis)
    }

    /// Parameter location of the control points along `axis` (uniform nodes for Bezier,
    /// Greville abscissae for Bspline).
    pub fn control_nodes(&self, axis: usize) -> Result<Vec<f64>, MvarError> {
        self.check_axis(axis)?;
        let len = self.lengths[axis];
        match self.geom_type {
            GeomType::Bezier => {
                let (min, max) = self.domain(axis)?;
                if len == 1 {
                    return Ok(vec![0.5 * (min + max)]);
                }
                Ok((0..len)
                    .map(|i| {
                        let t = i as f64 / (len - 1) as f64;
                        (1.0 - t) * min + t * max
                    })
                    .collect())
            }
            GeomType::Bspline if !self.periodic[axis] => {
                let kv = self.knot_vector(axis).unwrap_or_default();
                Ok(knots::greville_abscissae(kv, self.orders[axis], len))
            }
            _ => Err(MvarError::UndefinedGeometry {
                geom_type: self.geom_type,
                operation: "control_nodes",
            }),
        }
    }

    /// Build a copy with axis `axis` replaced: every fiber along the axis is mapped through `f`
    /// from `lengths[axis]` to `new_len` values.
    pub(crate) fn map_fibers(
        &self,
        axis: usize,
        new_len: usize,
        mut f: impl FnMut(&[f64], &mut [f64]),
    ) -> Self {
        let mut new_lengths = self.lengths.clone();
        new_lengths[axis] = new_len;
        let new_sub_spaces = sub_spaces(&new_lengths);
        let new_mesh_len = mesh_length(&new_lengths);
        let old_stride = self.sub_spaces[axis];
        let new_stride = new_sub_spaces[axis];

        let mut points: SmallVec<[Vec<f64>; 4]> = smallvec![Vec::new()];
        let mut fiber_in = vec![0.0; self.lengths[axis]];
        let mut fiber_out = vec![0.0; new_len];
        for _ in 0..self.num_coords() {
            points.push(vec![0.0; new_mesh_len]);
        }
        if self.is_rational() {
            points[0] = vec![0.0; new_mesh_len];
        }

        for start in crate::fiber_starts(&self.lengths, axis) {
            let old_start: usize = start.iter().zip(&self.sub_spaces).map(|(i, s)| i * s).sum();
            let new_start: usize = start.iter().zip(&new_sub_spaces).map(|(i, s)| i * s).sum();
            for c in self.coord_range() {
                for (i, v) in fiber_in.iter_mut().enumerate() {
                    *v = self.points[c][old_start + i * old_stride];
                }
                f(&fiber_in, &mut fiber_out);
                for (i, &v) in fiber_out.iter().enumerate() {
                    points[c][new_start + i * new_stride] = v;
                }
            }
        }

        Self {
            lengths: new_lengths,
            sub_spaces: new_sub_spaces,
            points,
            ..self.clone_structure()
        }
    }

    /// Shallow structural copy with empty point arrays, used by builders that replace the mesh.
    pub(crate) fn clone_structure(&self) -> Self {
        Self {
            geom_type: self.geom_type,
            point_type: self.point_type,
            lengths: self.lengths.clone(),
            orders: self.orders.clone(),
            periodic: self.periodic.clone(),
            knot_vectors: self.knot_vectors.clone(),
            sub_spaces: self.sub_spaces.clone(),
            points: SmallVec::new(),
            aux_domain: self.aux_domain.clone(),
        }
    }

    /// Derivative along `axis`. Rational inputs yield a rational result via the quotient rule.
    pub fn derive(&self, axis: usize) -> Result<Self, MvarError> {
        self.check_axis(axis)?;
        if !self.is_rational() {
            return self.derive_polynomial(axis);
        }
        // (x / w)' = (x' w - x w') / w^2, applied to the homogeneous coordinates.
        let dx = self.derive_polynomial(axis)?;
        let scalars = self.split_scalar()?;
        let d_scalars = dx.split_scalar()?;
        let (Some(w), Some(dw)) = (&scalars[0], &d_scalars[0]) else {
            return Err(MvarError::AlgorithmError {
                message: "rational multivariate without weights".into(),
            });
        };
        let mut merged: ArrayVec<Option<Self>, { MAX_COORD + 1 }> = ArrayVec::new();
        merged.push(Some(w.mult(w)?));
        for c in 1..=self.num_coords() {
            let (Some(x), Some(dxc)) = (&scalars[c], &d_scalars[c]) else {
                continue;
            };
            merged.push(Some(dxc.mult(w)?.sub(&x.mult(dw)?)?));
        }
        Self::merge_scalar(&merged)
    }

    /// Derivative of every homogeneous coordinate along `axis`, ignoring rationality.
    pub(crate) fn derive_polynomial(&self, axis: usize) -> Result<Self, MvarError> {
        let len = self.lengths[axis];
        let order = self.orders[axis];
        let (min, max) = self.domain(axis)?;
        let derived = match self.geom_type {
            GeomType::Bezier | GeomType::Power if len == 1 => self.map_fibers(axis, 1, |_, out| {
                out[0] = 0.0;
            }),
            GeomType::Bezier => {
                let scale = (len - 1) as f64 / (max - min);
                let mut d = self.map_fibers(axis, len - 1, |src, out| {
                    for i in 0..out.len() {
                        out[i] = scale * (src[i + 1] - src[i]);
                    }
                });
                d.orders[axis] = len - 1;
                d
            }
            GeomType::Power => {
                let scale = 1.0 / (max - min);
                let mut d = self.map_fibers(axis, len - 1, |src, out| {
                    for i in 0..out.len() {
                        out[i] = scale * (i + 1) as f64 * src[i + 1];
                    }
                });
                d.orders[axis] = len - 1;
                d
            }
            GeomType::Bspline => {
                if self.periodic[axis] {
                    return self.open_end(axis)?.derive_polynomial(axis);
                }
                let kv = self.knot_vector(axis).unwrap_or_default().to_vec();
                if order == 1 {
                    self.map_fibers(axis, len, |_, out| out.fill(0.0))
                } else {
                    let degree = (order - 1) as f64;
                    let mut d = self.map_fibers(axis, len - 1, |src, out| {
                        for i in 0..out.len() {
                            let denom = kv[i + order] - kv[i + 1];
                            out[i] = if denom <= 0.0 {
                                0.0
                            } else {
                                degree * (src[i + 1] - src[i]) / denom
                            };
                        }
                    });
                    d.orders[axis] = order - 1;
                    d.knot_vectors[axis] = Some(kv[1..kv.len() - 1].to_vec());
                    d
                }
            }
        };
        Ok(derived)
    }

    /// All first order partial derivative multivariates.
    pub fn partial_derivatives(&self) -> Result<Vec<Self>, MvarError> {
        (0..self.dim()).map(|axis| self.derive(axis)).collect()
    }

    /// Analytic gradient of a scalar multivariate at `params`.
    pub fn gradient(&self, params: &[f64]) -> Result<AxisVec<f64>, MvarError> {
        if !self.point_type.is_scalar() {
            return Err(MvarError::ScalarPointExpected {
                point_type: self.point_type,
            });
        }
        self.partial_derivatives()?
            .iter()
            .map(|d| Ok(d.eval_projected(params)?[0]))
            .collect()
    }
}

/// (control index, basis value) pairs along one axis.
pub(crate) type AxisBasis = SmallVec<[(usize, f64); 8]>;

#[cfg(test)]
impl approx::AbsDiffEq for Multivariate {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        1e-10
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        if self.geom_type != other.geom_type
            || self.point_type != other.point_type
            || self.lengths != other.lengths
            || self.orders != other.orders
        {
            return false;
        }
        let knots_eq = self
            .knot_vectors
            .iter()
            .zip(&other.knot_vectors)
            .all(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => {
                    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= epsilon)
                }
                (None, None) => true,
                _ => false,
            });
        knots_eq
            && self
                .points
                .iter()
                .zip(&other.points)
                .all(|(a, b)| a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= epsilon))
    }
}
