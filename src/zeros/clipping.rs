//
// Projected polyhedron clipping
//

use smallvec::SmallVec;

use crate::{AxisVec, Multivariate, MvarError, mesh_indices};

/// Clip `region` to where the scalar, non-rational `mv` can vanish.
///
/// Along each axis the control values are projected onto the plane spanned by that axis and
/// the function value, with control nodes (Greville abscissae) as abscissae. The convex hull
/// of the projection contains the graph, so its intersection with the zero line bounds every
/// root. Returns `None` when the hull misses zero along some axis.
pub(crate) fn clip_zero_region(
    mv: &Multivariate,
    region: &[(f64, f64)],
) -> Result<Option<AxisVec<(f64, f64)>>, MvarError> {
    debug_assert!(mv.point_type().is_scalar() && !mv.is_rational());
    let lengths = mv.lengths();
    let values = mv.points(1);

    // Fiber-wise extremes of the control values, per axis and per index along that axis.
    let mut lows: AxisVec<Vec<f64>> = lengths.iter().map(|&n| vec![f64::INFINITY; n]).collect();
    let mut highs: AxisVec<Vec<f64>> = lengths.iter().map(|&n| vec![f64::NEG_INFINITY; n]).collect();
    for (linear, index) in mesh_indices(lengths).enumerate() {
        let value = values[linear];
        for d in 0..lengths.len() {
            let i = index[d];
            lows[d][i] = lows[d][i].min(value);
            highs[d][i] = highs[d][i].max(value);
        }
    }

    let mut hull = HullIntersector::new();
    let mut clipped: AxisVec<(f64, f64)> = region.iter().copied().collect();
    for d in 0..lengths.len() {
        let Ok(nodes) = mv.control_nodes(d) else {
            continue;
        };
        hull.reset();
        for (i, &x) in nodes.iter().enumerate() {
            hull.add_point(x, lows[d][i]);
            hull.add_point(x, highs[d][i]);
        }
        let (min_x, max_x) = hull.intersect_zero_n2();
        if min_x > max_x {
            return Ok(None);
        }
        clipped[d].0 = clipped[d].0.max(min_x);
        clipped[d].1 = clipped[d].1.min(max_x);
        if clipped[d].0 > clipped[d].1 {
            return Ok(None);
        }
    }
    Ok(Some(clipped))
}

#[derive(Debug, Clone)]
pub(crate) struct HullIntersector {
    above: SmallVec<[[f64; 2]; 16]>,
    below: SmallVec<[[f64; 2]; 16]>,
    on_min: f64,
    on_max: f64,
}

impl HullIntersector {
    pub fn new() -> Self {
        Self {
            above: SmallVec::new(),
            below: SmallVec::new(),
            on_min: f64::INFINITY,
            on_max: -f64::INFINITY,
        }
    }

    pub fn reset(&mut self) {
        self.above.clear();
        self.below.clear();
        self.on_min = f64::INFINITY;
        self.on_max = -f64::INFINITY;
    }

    pub fn add_point(&mut self, x: f64, y: f64) {
        debug_assert!(x.is_finite() && y.is_finite(), "Invalid point ({x}, {y})");
        if y > 0.0 {
            self.above.push([x, y]);
        } else if y < 0.0 {
            self.below.push([x, y]);
        } else {
            self.on_min = self.on_min.min(x);
            self.on_max = self.on_max.max(x);
        }
    }

    /// Range of x where the convex hull meets the x axis. Empty (`min > max`) when it
    /// does not.
    pub fn intersect_zero_n2(&self) -> (f64, f64) {
        let mut min_x = self.on_min;
        let mut max_x = self.on_max;

        for &[x1, z1] in &self.above {
            for &[x2, z2] in &self.below {
                let t = z1 / (z1 - z2);
                let x = x1 + t * (x2 - x1);
                min_x = min_x.min(x);
                max_x = max_x.max(x);
            }
        }
        (min_x, max_x)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use pretty_assertions as pa;

    use super::*;
    use crate::{GeomType, PointType};

    #[test]
    fn hull_of_a_line_meets_zero_at_its_root() {
        let mut hull = HullIntersector::new();
        hull.add_point(0.0, -1.0);
        hull.add_point(1.0, 3.0);
        let (min, max) = hull.intersect_zero_n2();
        assert_abs_diff_eq!(min, 0.25);
        assert_abs_diff_eq!(max, 0.25);

        hull.reset();
        hull.add_point(0.0, 1.0);
        hull.add_point(1.0, 2.0);
        let (min, max) = hull.intersect_zero_n2();
        assert!(min > max);
    }

    #[test]
    fn clip_bivariate_plane() {
        // f(u, v) = u - 0.3, constant along v.
        let mv = Multivariate::bezier_from_rows(&[2, 2], &[[-0.3], [0.7], [-0.3], [0.7]]).unwrap();
        let clipped = clip_zero_region(&mv, &[(0.0, 1.0), (0.0, 1.0)]).unwrap().unwrap();
        assert_abs_diff_eq!(clipped[0].0, 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(clipped[0].1, 0.3, epsilon = 1e-12);
        pa::assert_eq!(clipped[1], (0.0, 1.0));
    }

    #[test]
    fn clip_bspline_without_roots_is_empty() {
        let mut mv = Multivariate::new(GeomType::Bspline, &[5], &[3], PointType::E1).unwrap();
        mv.points_mut(1).copy_from_slice(&[1.0, 0.5, 0.2, 0.4, 2.0]);
        assert!(clip_zero_region(&mv, &[(0.0, 1.0)]).unwrap().is_none());
    }
}
