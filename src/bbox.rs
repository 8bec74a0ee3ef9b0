use crate::{AxisVec, Multivariate, MvarError};

/// Axis-aligned box, one `(min, max)` pair per coordinate.
#[derive(Clone, Debug)]
pub struct BBox(pub AxisVec<(f64, f64)>);

impl BBox {
    pub fn new(bounds: &[(f64, f64)]) -> Self {
        BBox(bounds.iter().copied().collect())
    }

    /// The empty box: merging anything into it yields that thing.
    pub fn empty(dim: usize) -> Self {
        BBox((0..dim).map(|_| (f64::INFINITY, f64::NEG_INFINITY)).collect())
    }

    pub fn unbounded(dim: usize) -> Self {
        BBox((0..dim).map(|_| (f64::NEG_INFINITY, f64::INFINITY)).collect())
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn at(&self, dim: usize) -> (f64, f64) {
        self.0[dim]
    }

    pub fn center(&self) -> AxisVec<f64> {
        self.0.iter().map(|&(min, max)| 0.5 * (min + max)).collect()
    }

    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|&(min, max)| min <= max)
    }

    pub fn side_length(&self, dim: usize) -> f64 {
        let (min, max) = self.0[dim];
        max - min
    }

    pub fn largest_side(&self) -> (usize, f64) {
        let mut largest_dim = 0;
        let mut largest_length = 0.0;
        for i in 0..self.dim() {
            let length = self.side_length(i);
            if length > largest_length {
                largest_length = length;
                largest_dim = i;
            }
        }
        (largest_dim, largest_length)
    }

    pub fn subdivide(&self, dim: usize) -> (Self, Self) {
        let (min, max) = self.0[dim];
        let mid = 0.5 * (min + max);

        let mut box1 = self.clone();
        let mut box2 = self.clone();

        box1.0[dim] = (min, mid);
        box2.0[dim] = (mid, max);

        (box1, box2)
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.0
            .iter()
            .zip(&other.0)
            .all(|(&(a_min, a_max), &(b_min, b_max))| a_max >= b_min && b_max >= a_min)
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        self.0
            .iter()
            .zip(point)
            .all(|(&(min, max), &x)| min <= x && x <= max)
    }

    /// True when some coordinate range excludes zero by more than `eps`.
    pub fn excludes_zero(&self, eps: f64) -> bool {
        self.0.iter().any(|&(min, max)| min > eps || max < -eps)
    }

    /// True when every coordinate range lies within `[-eps, eps]`.
    pub fn is_zero(&self, eps: f64) -> bool {
        self.0.iter().all(|&(min, max)| min >= -eps && max <= eps)
    }
}

impl From<&[(f64, f64)]> for BBox {
    fn from(bounds: &[(f64, f64)]) -> Self {
        BBox::new(bounds)
    }
}

impl std::ops::Index<usize> for BBox {
    type Output = (f64, f64);

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl std::ops::IndexMut<usize> for BBox {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl PartialEq for BBox {
    fn eq(&self, other: &Self) -> bool {
        self.dim() == other.dim()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(&(a_min, a_max), &(b_min, b_max))| a_min == b_min && a_max == b_max)
    }
}

#[cfg(test)]
impl approx::AbsDiffEq for BBox {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.dim() == other.dim()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(&(a_min, a_max), &(b_min, b_max))| {
                    (a_min - b_min).abs() <= epsilon && (a_max - b_max).abs() <= epsilon
                })
    }
}

/// Product of two intervals.
pub fn interval_mul(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    let products = [a.0 * b.0, a.0 * b.1, a.1 * b.0, a.1 * b.1];
    // 0 * inf is NaN; an unbounded operand gives an unbounded product.
    if products.iter().any(|p| p.is_nan()) {
        return (f64::NEG_INFINITY, f64::INFINITY);
    }
    products
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &p| {
            (min.min(p), max.max(p))
        })
}

pub fn interval_add(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    (a.0 + b.0, a.1 + b.1)
}

pub fn interval_sub(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    (a.0 - b.1, a.1 - b.0)
}

impl Multivariate {
    /// Box around the (projected) control points. By the convex hull property it also
    /// encloses every value over the domain. Rational multivariates whose weights change
    /// sign have no finite enclosure.
    pub fn bbox(&self) -> BBox {
        let coords = self.num_coords();
        let Some(weights) = self.weights() else {
            return BBox(
                (1..=coords)
                    .map(|c| {
                        self.points[c]
                            .iter()
                            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &x| {
                                (min.min(x), max.max(x))
                            })
                    })
                    .collect(),
            );
        };

        let all_positive = weights.iter().all(|&w| w > 0.0);
        let all_negative = weights.iter().all(|&w| w < 0.0);
        if !all_positive && !all_negative {
            log::trace!("bbox: weights change sign, box is unbounded");
            return BBox::unbounded(coords);
        }
        BBox(
            (1..=coords)
                .map(|c| {
                    self.points[c].iter().zip(weights).fold(
                        (f64::INFINITY, f64::NEG_INFINITY),
                        |(min, max), (&x, &w)| {
                            let p = x / w;
                            (min.min(p), max.max(p))
                        },
                    )
                })
                .collect(),
        )
    }
}

/// Union of the boxes of all multivariates, which must share their coordinate count.
pub fn list_bbox(mvs: &[Multivariate]) -> Result<BBox, MvarError> {
    let Some(first) = mvs.first() else {
        return Err(MvarError::TooFewParams {
            required: 1,
            actual: 0,
        });
    };
    let mut result = first.bbox();
    for mv in &mvs[1..] {
        if mv.num_coords() != result.dim() {
            return Err(MvarError::DimensionMismatch {
                expected: result.dim(),
                actual: mv.num_coords(),
            });
        }
        merge_bbox(&mut result, &mv.bbox());
    }
    Ok(result)
}

/// Grow `dst` to contain `src`.
pub fn merge_bbox(dst: &mut BBox, src: &BBox) {
    debug_assert_eq!(dst.dim(), src.dim());
    for (d, s) in dst.0.iter_mut().zip(&src.0) {
        d.0 = d.0.min(s.0);
        d.1 = d.1.max(s.1);
    }
}

/// Range of `a . b` for `a` and `b` anywhere in their boxes, as a one dimensional box.
pub fn dot_prod_bbox(a: &BBox, b: &BBox) -> Result<BBox, MvarError> {
    check_same_dim(a, b)?;
    let range = a
        .0
        .iter()
        .zip(&b.0)
        .fold((0.0, 0.0), |acc, (&ai, &bi)| interval_add(acc, interval_mul(ai, bi)));
    Ok(BBox::new(&[range]))
}

/// Same as [`dot_prod_bbox`], by enumerating every pair of box vertices.
pub fn dot_prod_bbox_slow(a: &BBox, b: &BBox) -> Result<BBox, MvarError> {
    check_same_dim(a, b)?;
    let dim = a.dim();
    let vertex = |bbox: &BBox, mask: usize| -> AxisVec<f64> {
        (0..dim)
            .map(|i| if mask & (1 << i) == 0 { bbox[i].0 } else { bbox[i].1 })
            .collect()
    };
    let mut range = (f64::INFINITY, f64::NEG_INFINITY);
    for mask_a in 0..1usize << dim {
        let va = vertex(a, mask_a);
        for mask_b in 0..1usize << dim {
            let vb = vertex(b, mask_b);
            let dot: f64 = va.iter().zip(&vb).map(|(x, y)| x * y).sum();
            range = (range.0.min(dot), range.1.max(dot));
        }
    }
    Ok(BBox::new(&[range]))
}

/// Range of `a x b` per output coordinate. Only the first three coordinates take part.
pub fn cross_prod_bbox(a: &BBox, b: &BBox) -> Result<BBox, MvarError> {
    check_same_dim(a, b)?;
    if a.dim() < 3 {
        return Err(MvarError::DimensionMismatch {
            expected: 3,
            actual: a.dim(),
        });
    }
    let component = |i: usize, j: usize| interval_sub(interval_mul(a[i], b[j]), interval_mul(a[j], b[i]));
    Ok(BBox::new(&[component(1, 2), component(2, 0), component(0, 1)]))
}

fn check_same_dim(a: &BBox, b: &BBox) -> Result<(), MvarError> {
    if a.dim() != b.dim() {
        return Err(MvarError::DimensionMismatch {
            expected: a.dim(),
            actual: b.dim(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use assertables::{assert_err, assert_le};
    use itertools::iproduct;
    use pretty_assertions as pa;
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    use super::*;
    use crate::{PointType, test_utils::linspace};

    fn random_box(rng: &mut SmallRng, dim: usize) -> BBox {
        BBox(
            (0..dim)
                .map(|_| {
                    let a = rng.random_range(-2.0..2.0);
                    let b = rng.random_range(-2.0..2.0);
                    if a < b { (a, b) } else { (b, a) }
                })
                .collect(),
        )
    }

    fn random_point(rng: &mut SmallRng, bbox: &BBox) -> AxisVec<f64> {
        bbox.0
            .iter()
            .map(|&(min, max)| if max > min { rng.random_range(min..=max) } else { min })
            .collect()
    }

    #[test]
    fn box_geometry() {
        let bbox = BBox::new(&[(0.0, 2.0), (1.0, 1.5)]);
        pa::assert_eq!(bbox.center().as_slice(), &[1.0, 1.25]);
        pa::assert_eq!(bbox.largest_side(), (0, 2.0));
        let (lo, hi) = bbox.subdivide(0);
        pa::assert_eq!(lo, BBox::new(&[(0.0, 1.0), (1.0, 1.5)]));
        pa::assert_eq!(hi, BBox::new(&[(1.0, 2.0), (1.0, 1.5)]));
        assert!(lo.overlaps(&hi));
        assert!(!lo.overlaps(&BBox::new(&[(1.5, 3.0), (0.0, 2.0)])));
        assert!(bbox.contains(&[0.5, 1.2]));
        assert!(!bbox.contains(&[0.5, 2.0]));
        assert!(bbox.excludes_zero(0.0));
        assert!(!BBox::new(&[(-1.0, 1.0)]).excludes_zero(0.0));
        assert!(!BBox::empty(2).is_valid());
    }

    #[test]
    fn merge_bbox_is_idempotent() {
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..20 {
            let mut merged = random_box(&mut rng, 3);
            let other = random_box(&mut rng, 3);
            merge_bbox(&mut merged, &other);
            let mut twice = merged.clone();
            merge_bbox(&mut twice, &other);
            pa::assert_eq!(twice, merged);
        }
    }

    #[test]
    fn mv_bbox_encloses_values() {
        let mut rng = SmallRng::seed_from_u64(2);
        let mut mv = Multivariate::new_bspline(&[5, 4], &[3, 3], PointType::P2).unwrap();
        for c in mv.coord_range() {
            let (lo, hi) = if c == 0 { (0.5, 2.0) } else { (-3.0, 3.0) };
            mv.points_mut(c)
                .iter_mut()
                .for_each(|x| *x = rng.random_range(lo..hi));
        }
        let bbox = mv.bbox();
        for (u, v) in iproduct!(linspace(0.0, 1.0, 11), linspace(0.0, 1.0, 11)) {
            let p = mv.eval_projected(&[u, v]).unwrap();
            assert!(bbox.contains(&p), "{p:?} outside {bbox:?}");
        }
    }

    #[test]
    fn mixed_sign_weights_are_unbounded() {
        let mv = Multivariate::from_curve(2, None, true, &[[1.0, 1.0], [-1.0, 1.0]]).unwrap();
        pa::assert_eq!(mv.bbox(), BBox::unbounded(1));
    }

    #[test]
    fn list_bbox_unions_boxes() {
        let a = Multivariate::from_curve(2, None, false, &[[0.0, 1.0], [1.0, 2.0]]).unwrap();
        let b = Multivariate::from_curve(2, None, false, &[[-1.0, 0.0], [0.5, 5.0]]).unwrap();
        pa::assert_eq!(
            list_bbox(&[a.clone(), b]).unwrap(),
            BBox::new(&[(-1.0, 1.0), (0.0, 5.0)])
        );
        let scalar = Multivariate::from_curve(2, None, false, &[[0.0], [1.0]]).unwrap();
        assert_err!(list_bbox(&[a, scalar]));
        assert_err!(list_bbox(&[]));
    }

    #[test]
    fn dot_prod_bbox_is_sound_and_matches_slow() {
        let mut rng = SmallRng::seed_from_u64(3);
        for dim in 1..=4 {
            let a = random_box(&mut rng, dim);
            let b = random_box(&mut rng, dim);
            let fast = dot_prod_bbox(&a, &b).unwrap();
            let slow = dot_prod_bbox_slow(&a, &b).unwrap();
            // The separable bound can only be looser.
            assert_le!(fast[0].0, slow[0].0 + 1e-12);
            assert_le!(slow[0].1, fast[0].1 + 1e-12);
            for _ in 0..50 {
                let pa_ = random_point(&mut rng, &a);
                let pb = random_point(&mut rng, &b);
                let dot: f64 = pa_.iter().zip(&pb).map(|(x, y)| x * y).sum();
                assert!(fast.contains(&[dot]));
            }
        }
        assert_err!(dot_prod_bbox(&BBox::unbounded(2), &BBox::unbounded(3)));
    }

    #[test]
    fn cross_prod_bbox_is_sound() {
        let mut rng = SmallRng::seed_from_u64(4);
        for _ in 0..10 {
            let a = random_box(&mut rng, 3);
            let b = random_box(&mut rng, 3);
            let cross = cross_prod_bbox(&a, &b).unwrap();
            for _ in 0..50 {
                let pa_ = random_point(&mut rng, &a);
                let pb = random_point(&mut rng, &b);
                let va = nalgebra::Vector3::new(pa_[0], pa_[1], pa_[2]);
                let vb = nalgebra::Vector3::new(pb[0], pb[1], pb[2]);
                let c = va.cross(&vb);
                assert!(cross.contains(c.as_slice()));
            }
        }
        assert_err!(cross_prod_bbox(&BBox::unbounded(2), &BBox::unbounded(2)));
    }

    #[test]
    fn interval_mul_handles_signs() {
        assert_abs_diff_eq!(BBox::new(&[interval_mul((-1.0, 2.0), (-3.0, 1.0))]), BBox::new(&[(-6.0, 3.0)]));
        pa::assert_eq!(
            interval_mul((0.0, 1.0), (f64::NEG_INFINITY, f64::INFINITY)),
            (f64::NEG_INFINITY, f64::INFINITY)
        );
    }
}
