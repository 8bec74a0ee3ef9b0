//! Symbolic algebra over multivariates.
//!
//! All operations work on the homogeneous control meshes. Products are formed exactly in
//! the Bernstein basis: Bspline operands are split into Bezier pieces along every axis,
//! multiplied piece by piece, and reassembled with fully repeated knots.

use arrayvec::ArrayVec;
use smallvec::{SmallVec, smallvec};

use crate::{
    AxisVec, GeomType, MAX_COORD, Multivariate, MvarError, PointType, bernstein_product_weight,
    knots::KNOT_TOL, make_all_compatible, make_compatible, mesh_indices, mesh_length,
    refine::{bezier_breaks, full_multiplicity_knots},
    sub_spaces,
};

/// Scalar multivariates indexed by coordinate; index 0 holds the weight, if any.
pub type ScalarSplit = ArrayVec<Option<Multivariate>, { MAX_COORD + 1 }>;

#[derive(Debug, Clone, Copy)]
pub struct AlgebraOptions {
    /// Weight meshes closer than this (component-wise) are treated as identical, so that
    /// rational operands are added directly instead of through the quotient rule.
    pub weight_tol: f64,
}

impl AlgebraOptions {
    pub const DEFAULT_WEIGHT_TOL: f64 = 1e-12;
}

impl Default for AlgebraOptions {
    fn default() -> Self {
        Self {
            weight_tol: Self::DEFAULT_WEIGHT_TOL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddSubOp {
    Add,
    Sub,
}

impl AddSubOp {
    fn sign(self) -> f64 {
        match self {
            AddSubOp::Add => 1.0,
            AddSubOp::Sub => -1.0,
        }
    }
}

/// One term of a product expression: `sign * a[coord_a] * b[coord_b]`.
type ProductTerm = (usize, usize, f64);

impl Multivariate {
    pub fn add(&self, other: &Self) -> Result<Self, MvarError> {
        self.add_sub(other, AddSubOp::Add, &AlgebraOptions::default())
    }

    pub fn sub(&self, other: &Self) -> Result<Self, MvarError> {
        self.add_sub(other, AddSubOp::Sub, &AlgebraOptions::default())
    }

    /// Add or subtract. Non-rational operands (or rational ones with identical weights)
    /// combine control points directly; otherwise `x1/w1 ± x2/w2 = (x1 w2 ± x2 w1) / (w1 w2)`.
    pub fn add_sub(
        &self,
        other: &Self,
        op: AddSubOp,
        options: &AlgebraOptions,
    ) -> Result<Self, MvarError> {
        let (a, b) = make_compatible(self, other)?;
        let sign = op.sign();

        let same_weights = match (a.weights(), b.weights()) {
            (None, None) => true,
            (Some(wa), Some(wb)) => wa
                .iter()
                .zip(wb)
                .all(|(x, y)| (x - y).abs() <= options.weight_tol),
            _ => false,
        };

        if same_weights {
            let mut result = a.clone();
            for c in 1..=a.num_coords() {
                for (r, &y) in result.points[c].iter_mut().zip(&b.points[c]) {
                    *r += sign * y;
                }
            }
            return Ok(result);
        }

        log::trace!("add_sub: weights differ, applying the quotient rule");
        let mut terms: SmallVec<[SmallVec<[ProductTerm; 2]>; 4]> = smallvec![smallvec![(0, 0, 1.0)]];
        for c in 1..=a.num_coords() {
            terms.push(smallvec![(c, 0, 1.0), (0, c, sign)]);
        }
        product(&a, &b, &terms, a.point_type)
    }

    /// Coordinate-wise product: `result[c] = self[c] * other[c]`, weights multiply.
    pub fn mult(&self, other: &Self) -> Result<Self, MvarError> {
        let point_type = self.point_type.merged(other.point_type);
        let a = self.coerce_point_type(point_type)?;
        let b = other.coerce_point_type(point_type)?;
        let mut terms = weight_term(point_type);
        for c in 1..=point_type.num_coords() {
            terms.push(smallvec![(c, c, 1.0)]);
        }
        product(&a, &b, &terms, point_type)
    }

    /// Scalar field of pointwise dot products.
    pub fn dot_prod(&self, other: &Self) -> Result<Self, MvarError> {
        let point_type = self.point_type.merged(other.point_type);
        let a = self.coerce_point_type(point_type)?;
        let b = other.coerce_point_type(point_type)?;
        let mut terms = weight_term(point_type);
        terms.push(
            (1..=point_type.num_coords())
                .map(|c| (c, c, 1.0))
                .collect(),
        );
        product(&a, &b, &terms, point_type.with_coords(1)?)
    }

    /// Pointwise cross product in R^3. Operands with fewer coordinates are padded with zeros.
    pub fn cross_prod(&self, other: &Self) -> Result<Self, MvarError> {
        let rational = self.is_rational() || other.is_rational();
        let point_type = PointType::new(rational, 3)?;
        if self.num_coords() > 3 || other.num_coords() > 3 {
            return Err(MvarError::InvalidPointType {
                coords: self.num_coords().max(other.num_coords()),
            });
        }
        let a = self.coerce_point_type(point_type)?;
        let b = other.coerce_point_type(point_type)?;
        let mut terms = weight_term(point_type);
        terms.push(smallvec![(2, 3, 1.0), (3, 2, -1.0)]);
        terms.push(smallvec![(3, 1, 1.0), (1, 3, -1.0)]);
        terms.push(smallvec![(1, 2, 1.0), (2, 1, -1.0)]);
        product(&a, &b, &terms, point_type)
    }

    /// Scalar 2D cross product `x1 y2 - x2 y1`.
    pub fn cross_prod_2d(&self, other: &Self) -> Result<Self, MvarError> {
        if self.num_coords() < 2 || other.num_coords() < 2 {
            return Err(MvarError::InvalidPointType {
                coords: self.num_coords().min(other.num_coords()),
            });
        }
        let point_type = self.point_type.merged(other.point_type);
        let a = self.coerce_point_type(point_type)?;
        let b = other.coerce_point_type(point_type)?;
        let mut terms = weight_term(point_type);
        terms.push(smallvec![(1, 2, 1.0), (2, 1, -1.0)]);
        product(&a, &b, &terms, point_type.with_coords(1)?)
    }

    /// Scalar field `self(t) . v` for a constant vector `v`.
    pub fn vec_dot_prod(&self, v: &[f64]) -> Result<Self, MvarError> {
        if v.len() != self.num_coords() {
            return Err(MvarError::DimensionMismatch {
                expected: self.num_coords(),
                actual: v.len(),
            });
        }
        let mut result = self.clone_structure();
        result.point_type = self.point_type.with_coords(1)?;
        result.points = smallvec![self.points[0].clone()];
        let mut values = vec![0.0; self.mesh_len()];
        for (c, &vc) in v.iter().enumerate() {
            for (r, &x) in values.iter_mut().zip(&self.points[c + 1]) {
                *r += vc * x;
            }
        }
        result.points.push(values);
        Ok(result)
    }

    /// Multiply every (non-weight) coordinate by `scale`.
    pub fn scalar_scale(&self, scale: f64) -> Self {
        let mut result = self.clone();
        for c in 1..=self.num_coords() {
            result.points[c].iter_mut().for_each(|x| *x *= scale);
        }
        result
    }

    /// Reciprocal of a scalar field, always rational: numerator and denominator swap.
    pub fn invert(&self) -> Result<Self, MvarError> {
        self.expect_scalar()?;
        let mut result = self.clone();
        result.point_type = PointType::P1;
        let numerator = std::mem::take(&mut result.points[1]);
        let weights = if self.is_rational() {
            std::mem::take(&mut result.points[0])
        } else {
            vec![1.0; self.mesh_len()]
        };
        result.points[0] = numerator;
        result.points[1] = weights;
        Ok(result)
    }

    /// Multiply a vector field by a scalar field.
    pub fn mult_scalar(&self, scalar: &Self) -> Result<Self, MvarError> {
        scalar.expect_scalar()?;
        let rational = self.is_rational() || scalar.is_rational();
        let point_type = self.point_type.with_rational(rational);
        let a = self.coerce_point_type(point_type)?;
        let s = scalar.coerce_point_type(PointType::new(rational, 1)?)?;
        let mut terms = weight_term(point_type);
        for c in 1..=point_type.num_coords() {
            terms.push(smallvec![(c, 1, 1.0)]);
        }
        product(&a, &s, &terms, point_type)
    }

    /// One scalar (E1) multivariate per coordinate. Index 0 holds the weights when rational.
    pub fn split_scalar(&self) -> Result<ScalarSplit, MvarError> {
        let mut split = ScalarSplit::new();
        for c in 0..=self.num_coords() {
            if c == 0 && !self.is_rational() {
                split.push(None);
                continue;
            }
            let mut scalar = self.clone_structure();
            scalar.point_type = PointType::E1;
            scalar.points = smallvec![Vec::new(), self.points[c].clone()];
            split.push(Some(scalar));
        }
        Ok(split)
    }

    /// Inverse of [`Multivariate::split_scalar`]. Missing coordinates are zero; a weight at
    /// index 0 makes the result rational.
    pub fn merge_scalar(scalars: &[Option<Self>]) -> Result<Self, MvarError> {
        let num_coords = scalars
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, s)| s.is_some())
            .map(|(c, _)| c)
            .max()
            .unwrap_or(0);
        if num_coords == 0 {
            return Err(MvarError::TooFewParams {
                required: 1,
                actual: 0,
            });
        }

        let present: Vec<Self> = scalars.iter().flatten().cloned().collect();
        for scalar in &present {
            if scalar.point_type != PointType::E1 {
                return Err(MvarError::ScalarPointExpected {
                    point_type: scalar.point_type,
                });
            }
        }
        let compatible = make_all_compatible(&present)?;
        let template = &compatible[0];
        let rational = scalars[0].is_some();

        let mut result = template.clone_structure();
        result.point_type = PointType::new(rational, num_coords)?;
        result.points = smallvec![Vec::new(); num_coords + 1];
        let mut next = compatible.into_iter();
        for c in 0..=num_coords {
            if scalars.get(c).is_some_and(|s| s.is_some()) {
                if let Some(mut scalar) = next.next() {
                    result.points[c] = std::mem::take(&mut scalar.points[1]);
                }
            } else if c > 0 {
                result.points[c] = vec![0.0; result.mesh_len()];
            }
        }
        Ok(result)
    }

    fn expect_scalar(&self) -> Result<(), MvarError> {
        if !self.point_type.is_scalar() {
            return Err(MvarError::ScalarPointExpected {
                point_type: self.point_type,
            });
        }
        Ok(())
    }
}

fn weight_term(point_type: PointType) -> SmallVec<[SmallVec<[ProductTerm; 2]>; 4]> {
    if point_type.is_rational() {
        smallvec![smallvec![(0, 0, 1.0)]]
    } else {
        smallvec![SmallVec::new()]
    }
}

/// Evaluate product expressions of the homogeneous coordinates of `a` and `b`.
///
/// `terms[c]` lists the products summed into output coordinate `c` (0 being the weight; an
/// empty list for a non-rational result).
fn product(
    a: &Multivariate,
    b: &Multivariate,
    terms: &[SmallVec<[ProductTerm; 2]>],
    point_type: PointType,
) -> Result<Multivariate, MvarError> {
    let (a, b, breaks) = prepare_product(a, b)?;
    let dim = a.dim();

    let num_pieces: AxisVec<usize> = breaks.iter().map(|b| b.len() - 1).collect();
    let out_orders: AxisVec<usize> = (0..dim).map(|d| a.orders[d] + b.orders[d] - 1).collect();
    let out_lengths: AxisVec<usize> = (0..dim).map(|d| num_pieces[d] * out_orders[d]).collect();
    let out_len = mesh_length(&out_lengths);

    let mut points: SmallVec<[Vec<f64>; 4]> = smallvec![Vec::new()];
    for _ in 0..point_type.num_coords() {
        points.push(vec![0.0; out_len]);
    }
    if point_type.is_rational() {
        points[0] = vec![0.0; out_len];
    }

    let weights = ProductWeights::new(a.orders(), b.orders());
    let mut block_a = Vec::new();
    let mut block_b = Vec::new();
    let mut block_out = vec![0.0; mesh_length(&out_orders)];

    for piece in mesh_indices(&num_pieces) {
        for (c, coord_terms) in terms.iter().enumerate() {
            if coord_terms.is_empty() {
                continue;
            }
            block_out.fill(0.0);
            for &(ca, cb, sign) in coord_terms {
                gather_block(&a, ca, &piece, &mut block_a);
                gather_block(&b, cb, &piece, &mut block_b);
                weights.accumulate(&block_a, &block_b, sign, &mut block_out);
            }
            scatter_block(&block_out, &out_orders, &out_lengths, &piece, &mut points[c]);
        }
    }

    let mut result = a.clone_structure();
    result.point_type = point_type;
    result.orders = out_orders.clone();
    result.lengths = out_lengths.clone();
    result.sub_spaces = sub_spaces(&out_lengths);
    result.points = points;
    if a.geom_type == GeomType::Bspline {
        result.knot_vectors = (0..dim)
            .map(|d| Some(full_multiplicity_knots(&breaks[d], out_orders[d])))
            .collect();
    }
    Ok(result)
}

/// Bring two operands of a product to a common piecewise Bezier layout.
/// Returns the operands and the break points of every axis.
fn prepare_product(
    a: &Multivariate,
    b: &Multivariate,
) -> Result<(Multivariate, Multivariate, AxisVec<Vec<f64>>), MvarError> {
    for mv in [a, b] {
        if mv.geom_type == GeomType::Power {
            return Err(MvarError::UndefinedGeometry {
                geom_type: GeomType::Power,
                operation: "mult",
            });
        }
    }
    if a.dim() != b.dim() {
        return Err(MvarError::DimensionMismatch {
            expected: a.dim(),
            actual: b.dim(),
        });
    }
    crate::common_domain(&[a.clone(), b.clone()])?;

    if a.geom_type == GeomType::Bezier && b.geom_type == GeomType::Bezier {
        let breaks = a
            .domain_all()
            .iter()
            .map(|&(min, max)| vec![min, max])
            .collect();
        return Ok((a.clone(), b.clone(), breaks));
    }

    let mut a = a.bezier_to_bspline()?;
    let mut b = b.bezier_to_bspline()?;
    let mut breaks = AxisVec::new();
    for axis in 0..a.dim() {
        a = a.extract_bezier(axis)?;
        b = b.extract_bezier(axis)?;
        let ba = piece_breaks(&a, axis);
        let bb = piece_breaks(&b, axis);
        let merged = merge_breaks(&ba, &bb);
        for &t in &merged[1..merged.len() - 1] {
            if !contains_break(&ba, t) {
                a = a.insert_knot(axis, t, a.orders[axis])?;
            }
            if !contains_break(&bb, t) {
                b = b.insert_knot(axis, t, b.orders[axis])?;
            }
        }
        breaks.push(merged);
    }
    Ok((a, b, breaks))
}

fn piece_breaks(mv: &Multivariate, axis: usize) -> Vec<f64> {
    bezier_breaks(mv.knot_vector(axis).unwrap_or_default(), mv.orders[axis])
}

fn merge_breaks(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut merged: Vec<f64> = a.iter().chain(b).copied().collect();
    merged.sort_by(f64::total_cmp);
    merged.dedup_by(|x, y| (*x - *y).abs() <= KNOT_TOL);
    merged
}

fn contains_break(breaks: &[f64], t: f64) -> bool {
    breaks.iter().any(|&b| (b - t).abs() <= KNOT_TOL)
}

/// Copy the Bezier block `piece` of coordinate `coord` into `out` (axis 0 fastest).
fn gather_block(mv: &Multivariate, coord: usize, piece: &[usize], out: &mut Vec<f64>) {
    out.clear();
    let orders = mv.orders();
    let values = &mv.points[coord];
    for local in mesh_indices(orders) {
        let mut offset = 0;
        for d in 0..orders.len() {
            offset += (piece[d] * orders[d] + local[d]) * mv.sub_spaces[d];
        }
        out.push(values[offset]);
    }
}

fn scatter_block(
    block: &[f64],
    orders: &[usize],
    lengths: &[usize],
    piece: &[usize],
    out: &mut [f64],
) {
    let strides = sub_spaces(lengths);
    for (i, local) in mesh_indices(orders).enumerate() {
        let mut offset = 0;
        for d in 0..orders.len() {
            offset += (piece[d] * orders[d] + local[d]) * strides[d];
        }
        out[offset] = block[i];
    }
}

/// Tensor product of Bernstein product weights for fixed operand orders.
struct ProductWeights {
    a_orders: AxisVec<usize>,
    b_orders: AxisVec<usize>,
    out_orders: AxisVec<usize>,
    // Per axis table: weight[i * b_order + j].
    tables: AxisVec<Vec<f64>>,
}

impl ProductWeights {
    fn new(a_orders: &[usize], b_orders: &[usize]) -> Self {
        let tables = a_orders
            .iter()
            .zip(b_orders)
            .map(|(&ka, &kb)| {
                let mut table = Vec::with_capacity(ka * kb);
                for i in 0..ka {
                    for j in 0..kb {
                        table.push(bernstein_product_weight(ka - 1, i, kb - 1, j));
                    }
                }
                table
            })
            .collect();
        Self {
            a_orders: a_orders.iter().copied().collect(),
            b_orders: b_orders.iter().copied().collect(),
            out_orders: a_orders.iter().zip(b_orders).map(|(a, b)| a + b - 1).collect(),
            tables,
        }
    }

    fn accumulate(&self, a: &[f64], b: &[f64], sign: f64, out: &mut [f64]) {
        let dim = self.a_orders.len();
        let out_strides = sub_spaces(&self.out_orders);
        for (ia_lin, ia) in mesh_indices(&self.a_orders).enumerate() {
            let av = a[ia_lin];
            if av == 0.0 {
                continue;
            }
            for (ib_lin, ib) in mesh_indices(&self.b_orders).enumerate() {
                let mut weight = sign * av * b[ib_lin];
                let mut offset = 0;
                for d in 0..dim {
                    weight *= self.tables[d][ia[d] * self.b_orders[d] + ib[d]];
                    offset += (ia[d] + ib[d]) * out_strides[d];
                }
                out[offset] += weight;
            }
        }
    }
}

/// The arithmetic a determinant expansion needs.
pub trait ScalarField: Sized {
    fn field_add(&self, other: &Self) -> Result<Self, MvarError>;
    fn field_sub(&self, other: &Self) -> Result<Self, MvarError>;
    fn field_mul(&self, other: &Self) -> Result<Self, MvarError>;
    fn field_clone(&self) -> Self;
}

impl ScalarField for f64 {
    fn field_add(&self, other: &Self) -> Result<Self, MvarError> {
        Ok(self + other)
    }

    fn field_sub(&self, other: &Self) -> Result<Self, MvarError> {
        Ok(self - other)
    }

    fn field_mul(&self, other: &Self) -> Result<Self, MvarError> {
        Ok(self * other)
    }

    fn field_clone(&self) -> Self {
        *self
    }
}

impl ScalarField for Multivariate {
    fn field_add(&self, other: &Self) -> Result<Self, MvarError> {
        self.add(other)
    }

    fn field_sub(&self, other: &Self) -> Result<Self, MvarError> {
        self.sub(other)
    }

    fn field_mul(&self, other: &Self) -> Result<Self, MvarError> {
        self.expect_scalar()?;
        other.expect_scalar()?;
        self.mult(other)
    }

    fn field_clone(&self) -> Self {
        self.clone()
    }
}

/// Determinant of a square matrix of scalar fields by cofactor expansion along the first row.
pub fn determinant<T: ScalarField, R: AsRef<[T]>>(matrix: &[R]) -> Result<T, MvarError> {
    let n = matrix.len();
    if n == 0 {
        return Err(MvarError::TooFewParams {
            required: 1,
            actual: 0,
        });
    }
    for row in matrix {
        if row.as_ref().len() != n {
            return Err(MvarError::DimensionMismatch {
                expected: n,
                actual: row.as_ref().len(),
            });
        }
    }
    let rows: AxisVec<usize> = (0..n).collect();
    let cols: AxisVec<usize> = (0..n).collect();
    cofactor_expansion(matrix, &rows, &cols)
}

fn cofactor_expansion<T: ScalarField, R: AsRef<[T]>>(
    matrix: &[R],
    rows: &[usize],
    cols: &[usize],
) -> Result<T, MvarError> {
    let entry = |r: usize, c: usize| &matrix[rows[r]].as_ref()[cols[c]];
    match rows.len() {
        1 => Ok(entry(0, 0).field_clone()),
        2 => entry(0, 0)
            .field_mul(entry(1, 1))?
            .field_sub(&entry(0, 1).field_mul(entry(1, 0))?),
        n => {
            let mut det: Option<T> = None;
            for c in 0..n {
                let minor_cols: AxisVec<usize> = cols
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != c)
                    .map(|(_, &col)| col)
                    .collect();
                let minor = cofactor_expansion(matrix, &rows[1..], &minor_cols)?;
                let term = entry(0, c).field_mul(&minor)?;
                det = Some(match det {
                    None => term,
                    Some(acc) if c % 2 == 0 => acc.field_add(&term)?,
                    Some(acc) => acc.field_sub(&term)?,
                });
            }
            det.ok_or_else(|| MvarError::AlgorithmError {
                message: "empty cofactor expansion".into(),
            })
        }
    }
}

pub fn determinant2(matrix: &[[Multivariate; 2]; 2]) -> Result<Multivariate, MvarError> {
    determinant(matrix)
}

pub fn determinant3(matrix: &[[Multivariate; 3]; 3]) -> Result<Multivariate, MvarError> {
    determinant(matrix)
}

pub fn determinant4(matrix: &[[Multivariate; 4]; 4]) -> Result<Multivariate, MvarError> {
    determinant(matrix)
}

pub fn determinant5(matrix: &[[Multivariate; 5]; 5]) -> Result<Multivariate, MvarError> {
    determinant(matrix)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use assertables::{assert_err, assert_ok};
    use itertools::iproduct;
    use pretty_assertions as pa;
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    use super::*;
    use crate::test_utils::{init_test_logger, linspace};

    fn random_scalar(rng: &mut SmallRng, lengths: &[usize]) -> Multivariate {
        let mut mv = Multivariate::new_bezier(lengths, PointType::E1).unwrap();
        mv.points_mut(1)
            .iter_mut()
            .for_each(|x| *x = rng.random_range(-1.0..1.0));
        mv
    }

    fn random_bspline_curve(rng: &mut SmallRng, len: usize, order: usize, coords: usize) -> Multivariate {
        let mut mv =
            Multivariate::new_bspline(&[len], &[order], PointType::new(false, coords).unwrap()).unwrap();
        for c in 1..=coords {
            mv.points_mut(c)
                .iter_mut()
                .for_each(|x| *x = rng.random_range(-2.0..2.0));
        }
        mv
    }

    #[test]
    fn add_then_sub_restores_operand() {
        init_test_logger();
        let mut rng = SmallRng::seed_from_u64(7);
        let a = random_scalar(&mut rng, &[3, 4]);
        let b = random_scalar(&mut rng, &[2, 5]);
        let sum = a.add(&b).unwrap();
        let back = sum.sub(&b).unwrap();
        for (u, v) in iproduct!(linspace(0.0, 1.0, 6), linspace(0.0, 1.0, 6)) {
            let expected = a.eval(&[u, v]).unwrap()[1];
            assert_abs_diff_eq!(back.eval(&[u, v]).unwrap()[1], expected, epsilon = 1e-12);
            assert_abs_diff_eq!(
                sum.eval(&[u, v]).unwrap()[1],
                expected + b.eval(&[u, v]).unwrap()[1],
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn rational_add_uses_quotient_rule() {
        let a = Multivariate::from_curve(3, None, true, &[[1.0, 0.5], [2.0, 2.0], [1.0, 1.0]]).unwrap();
        let b = Multivariate::from_curve(2, None, true, &[[1.0, 1.0], [3.0, 6.0]]).unwrap();
        let sum = a.add(&b).unwrap();
        assert!(sum.is_rational());
        for t in linspace(0.0, 1.0, 9) {
            let expected = a.eval_projected(&[t]).unwrap()[0] + b.eval_projected(&[t]).unwrap()[0];
            assert_abs_diff_eq!(sum.eval_projected(&[t]).unwrap()[0], expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn rational_add_with_equal_weights_keeps_size() {
        let a = Multivariate::from_curve(2, None, true, &[[2.0, 1.0], [0.5, 3.0]]).unwrap();
        let b = Multivariate::from_curve(2, None, true, &[[2.0, -1.0], [0.5, 1.0]]).unwrap();
        let sum = a.add(&b).unwrap();
        pa::assert_eq!(sum.lengths(), &[2]);
        pa::assert_eq!(sum.weights().unwrap(), &[2.0, 0.5]);
    }

    #[test]
    fn mult_matches_pointwise_product() {
        let mut rng = SmallRng::seed_from_u64(11);
        let a = random_scalar(&mut rng, &[3, 2]);
        let b = random_scalar(&mut rng, &[4, 3]);
        let prod = a.mult(&b).unwrap();
        pa::assert_eq!(prod.lengths(), &[6, 4]);
        for (u, v) in iproduct!(linspace(0.0, 1.0, 5), linspace(0.0, 1.0, 5)) {
            let expected = a.eval(&[u, v]).unwrap()[1] * b.eval(&[u, v]).unwrap()[1];
            assert_abs_diff_eq!(prod.eval(&[u, v]).unwrap()[1], expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn bspline_mult_matches_pointwise_product() {
        let mut rng = SmallRng::seed_from_u64(5);
        let a = random_bspline_curve(&mut rng, 6, 3, 1);
        let mut b = random_bspline_curve(&mut rng, 5, 4, 1);
        b.set_knot_vector(0, vec![0.0, 0.0, 0.0, 0.0, 0.3, 1.0, 1.0, 1.0, 1.0])
            .unwrap();
        let prod = a.mult(&b).unwrap();
        pa::assert_eq!(prod.geom_type(), GeomType::Bspline);
        pa::assert_eq!(prod.orders(), &[6]);
        for t in linspace(0.0, 1.0, 23) {
            let expected = a.eval(&[t]).unwrap()[1] * b.eval(&[t]).unwrap()[1];
            assert_abs_diff_eq!(prod.eval(&[t]).unwrap()[1], expected, epsilon = 1e-11);
        }
    }

    #[test]
    fn power_mult_is_undefined() {
        let a = Multivariate::new_power(&[3], PointType::E1).unwrap();
        assert!(matches!(
            a.mult(&a),
            Err(MvarError::UndefinedGeometry {
                geom_type: GeomType::Power,
                ..
            })
        ));
    }

    #[test]
    fn dot_and_cross_products() {
        let a = Multivariate::from_curve(2, None, false, &[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]).unwrap();
        let b = Multivariate::from_curve(3, None, false, &[[0.0, 0.0, 1.0], [1.0, 1.0, 1.0], [2.0, 0.0, 1.0]])
            .unwrap();
        let dot = a.dot_prod(&b).unwrap();
        let cross = a.cross_prod(&b).unwrap();
        pa::assert_eq!(dot.point_type(), PointType::E1);
        pa::assert_eq!(cross.point_type(), PointType::E3);
        for t in linspace(0.0, 1.0, 7) {
            let pa_ = a.eval(&[t]).unwrap();
            let pb = b.eval(&[t]).unwrap();
            let va = nalgebra::Vector3::new(pa_[1], pa_[2], pa_[3]);
            let vb = nalgebra::Vector3::new(pb[1], pb[2], pb[3]);
            assert_abs_diff_eq!(dot.eval(&[t]).unwrap()[1], va.dot(&vb), epsilon = 1e-12);
            let c = cross.eval(&[t]).unwrap();
            let expected = va.cross(&vb);
            for i in 0..3 {
                assert_abs_diff_eq!(c[i + 1], expected[i], epsilon = 1e-12);
            }
            // Perpendicular to both operands.
            let vc = nalgebra::Vector3::new(c[1], c[2], c[3]);
            assert_abs_diff_eq!(vc.dot(&va), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(vc.dot(&vb), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn cross_prod_2d_of_planar_curves() {
        let a = Multivariate::from_curve(2, None, false, &[[1.0, 0.0], [1.0, 2.0]]).unwrap();
        let b = Multivariate::from_curve(2, None, false, &[[0.0, 1.0], [-1.0, 1.0]]).unwrap();
        let cross = a.cross_prod_2d(&b).unwrap();
        for t in linspace(0.0, 1.0, 5) {
            let p = a.eval(&[t]).unwrap();
            let q = b.eval(&[t]).unwrap();
            assert_abs_diff_eq!(
                cross.eval(&[t]).unwrap()[1],
                p[1] * q[2] - p[2] * q[1],
                epsilon = 1e-12
            );
        }
        let scalar = Multivariate::from_curve(2, None, false, &[[0.0], [1.0]]).unwrap();
        assert_err!(a.cross_prod_2d(&scalar));
    }

    #[test]
    fn vec_dot_scale_and_invert() {
        let a = Multivariate::from_curve(2, None, false, &[[1.0, 2.0], [3.0, -1.0]]).unwrap();
        let projected = a.vec_dot_prod(&[2.0, 1.0]).unwrap();
        pa::assert_eq!(projected.points(1), &[4.0, 5.0]);
        assert_err!(a.vec_dot_prod(&[1.0]));

        let scaled = a.scalar_scale(-2.0);
        pa::assert_eq!(scaled.points(2), &[-4.0, 2.0]);

        let inv = projected.invert().unwrap();
        assert!(inv.is_rational());
        for t in linspace(0.0, 1.0, 5) {
            let value = projected.eval(&[t]).unwrap()[1];
            assert_abs_diff_eq!(inv.eval_projected(&[t]).unwrap()[0], 1.0 / value, epsilon = 1e-12);
        }
        assert!(matches!(a.invert(), Err(MvarError::ScalarPointExpected { .. })));
    }

    #[test]
    fn mult_scalar_scales_vector_field() {
        let v = Multivariate::from_curve(2, None, false, &[[1.0, 0.0], [0.0, 1.0]]).unwrap();
        let s = Multivariate::from_curve(3, None, false, &[[1.0], [2.0], [3.0]]).unwrap();
        let scaled = v.mult_scalar(&s).unwrap();
        for t in linspace(0.0, 1.0, 5) {
            let p = v.eval(&[t]).unwrap();
            let k = s.eval(&[t]).unwrap()[1];
            let q = scaled.eval(&[t]).unwrap();
            assert_abs_diff_eq!(q[1], k * p[1], epsilon = 1e-12);
            assert_abs_diff_eq!(q[2], k * p[2], epsilon = 1e-12);
        }
        assert_err!(s.mult_scalar(&v));
    }

    #[test]
    fn split_merge_round_trip() {
        let mut rng = SmallRng::seed_from_u64(3);
        for (rational, coords) in iproduct!([false, true], 1..=3) {
            let point_type = PointType::new(rational, coords).unwrap();
            let mut mv = Multivariate::new_bspline(&[4, 4], &[3, 2], point_type).unwrap();
            for c in mv.coord_range() {
                mv.points_mut(c)
                    .iter_mut()
                    .for_each(|x| *x = rng.random_range(0.5..2.0));
            }
            let split = mv.split_scalar().unwrap();
            pa::assert_eq!(split.len(), coords + 1);
            pa::assert_eq!(split[0].is_some(), rational);
            let merged = Multivariate::merge_scalar(&split).unwrap();
            approx::assert_abs_diff_eq!(merged, mv);
        }
    }

    #[test]
    fn merge_scalar_rejects_bad_input() {
        let vector = Multivariate::from_curve(2, None, false, &[[0.0, 1.0], [1.0, 0.0]]).unwrap();
        let scalar = Multivariate::from_curve(2, None, false, &[[0.0], [1.0]]).unwrap();
        assert!(matches!(
            Multivariate::merge_scalar(&[None]),
            Err(MvarError::TooFewParams { .. })
        ));
        assert!(matches!(
            Multivariate::merge_scalar(&[None, Some(scalar.clone()), Some(vector)]),
            Err(MvarError::ScalarPointExpected { .. })
        ));
        let merged = assert_ok!(Multivariate::merge_scalar(&[None, None, Some(scalar)]));
        pa::assert_eq!(merged.point_type(), PointType::E2);
        pa::assert_eq!(merged.points(1), &[0.0, 0.0]);
    }

    #[test]
    fn determinants_match_numeric_determinant() {
        init_test_logger();
        let mut rng = SmallRng::seed_from_u64(19);
        for n in 2..=5 {
            let entries: Vec<Vec<Multivariate>> = (0..n)
                .map(|_| (0..n).map(|_| random_scalar(&mut rng, &[2, 2])).collect())
                .collect();
            let det = determinant(&entries).unwrap();
            for (u, v) in iproduct!(linspace(0.0, 1.0, 3), linspace(0.0, 1.0, 3)) {
                let numeric = nalgebra::DMatrix::from_fn(n, n, |r, c| {
                    entries[r][c].eval(&[u, v]).unwrap()[1]
                });
                assert_abs_diff_eq!(
                    det.eval(&[u, v]).unwrap()[1],
                    numeric.determinant(),
                    epsilon = 1e-10
                );
            }
        }
    }

    #[test]
    fn fixed_size_determinants() {
        let c = |x: f64| Multivariate::from_curve(1, None, false, &[[x]]).unwrap();
        let m2 = [[c(1.0), c(2.0)], [c(3.0), c(4.0)]];
        assert_abs_diff_eq!(determinant2(&m2).unwrap().points(1)[0], -2.0);
        let m3 = [
            [c(2.0), c(0.0), c(1.0)],
            [c(1.0), c(3.0), c(2.0)],
            [c(1.0), c(1.0), c(1.0)],
        ];
        assert_abs_diff_eq!(determinant3(&m3).unwrap().points(1)[0], 0.0, epsilon = 1e-14);
        let numbers = [[1.0, 2.0], [3.0, 4.0]];
        assert_abs_diff_eq!(determinant(&numbers).unwrap(), -2.0);
        assert_err!(determinant::<f64, Vec<f64>>(&[vec![1.0, 2.0]]));
    }

    #[test]
    fn rational_derivative_matches_numeric() {
        let w = std::f64::consts::FRAC_1_SQRT_2;
        let arc = Multivariate::from_curve(3, None, true, &[[1.0, 1.0, 0.0], [w, w, w], [1.0, 0.0, 1.0]])
            .unwrap();
        let d = arc.derive(0).unwrap();
        for t in linspace(0.1, 0.9, 5) {
            let p = d.eval_projected(&[t]).unwrap();
            let h = 1e-6;
            let a = arc.eval_projected(&[t + h]).unwrap();
            let b = arc.eval_projected(&[t - h]).unwrap();
            assert_abs_diff_eq!(p[0], (a[0] - b[0]) / (2.0 * h), epsilon = 1e-6);
            assert_abs_diff_eq!(p[1], (a[1] - b[1]) / (2.0 * h), epsilon = 1e-6);
        }
    }
}
