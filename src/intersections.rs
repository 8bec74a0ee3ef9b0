//! Intersection and contact problems built on the zero solver.
//!
//! Every problem promotes its operands into one shared parameter space, one block of axes
//! per operand, and hands the resulting constraints to [`solve_zeros`]. With
//! `use_expr_tree` set the constraint functions are not multiplied out. The operands become
//! expression tree leaves instead and the solver bounds their combination per region.

use crate::{
    AxisVec, Constraint, ConstraintKind, ExprId, ExprTree, Multivariate, MvarError, PointType,
    ZeroSet, ZeroSolverConfig, determinant3, solve_expr_tree, solve_zeros,
};

/// Rigid translation and optional uniform scale over time, applied to the second surface of
/// a contact problem: `M(u, v, t) = scale(t) * S(u, v) + translation(t)`.
#[derive(Debug, Clone)]
pub struct Motion {
    /// Univariate E3 curve over the time domain.
    pub translation: Multivariate,
    /// Univariate scalar curve over the same time domain. `None` means no scaling.
    pub scale: Option<Multivariate>,
}

impl Motion {
    pub fn translation(translation: Multivariate) -> Self {
        Self {
            translation,
            scale: None,
        }
    }

    fn validate(&self) -> Result<(), MvarError> {
        expect_dim(&self.translation, 1)?;
        if self.translation.num_coords() != 3 {
            return Err(MvarError::DimensionMismatch {
                expected: 3,
                actual: self.translation.num_coords(),
            });
        }
        if let Some(scale) = &self.scale {
            expect_dim(scale, 1)?;
            if !scale.point_type().is_scalar() {
                return Err(MvarError::ScalarPointExpected {
                    point_type: scale.point_type(),
                });
            }
            let (ts, tt) = (scale.domain(0)?, self.translation.domain(0)?);
            if ts != tt {
                return Err(MvarError::InconsistentDomain {
                    axis: 0,
                    lhs: tt,
                    rhs: ts,
                });
            }
        }
        Ok(())
    }
}

/// Intersect two planar (or spatial) curves. Solutions are `(t1, t2)` pairs.
pub fn crv_crv_inter(
    crv1: &Multivariate,
    crv2: &Multivariate,
    config: &ZeroSolverConfig,
) -> Result<ZeroSet, MvarError> {
    config.error_policy.apply((|| {
        expect_dim(crv1, 1)?;
        expect_dim(crv2, 1)?;
        let [a, b] = promote_blocks([crv1, crv2])?;
        log::info!("Intersecting curves");
        solve_differences(&[(a, b)], config)
    })())
}

/// Intersect two surfaces. The zero set is a curve in `(u1, v1, u2, v2)`, returned as
/// samples spaced by the subdivision tolerance.
pub fn srf_srf_inter(
    srf1: &Multivariate,
    srf2: &Multivariate,
    config: &ZeroSolverConfig,
) -> Result<ZeroSet, MvarError> {
    config.error_policy.apply((|| {
        expect_dim(srf1, 2)?;
        expect_dim(srf2, 2)?;
        let [a, b] = promote_blocks([srf1, srf2])?;
        log::info!("Intersecting two surfaces");
        solve_differences(&[(a, b)], config)
    })())
}

/// Common points of three surfaces, as `(u1, v1, u2, v2, u3, v3)`.
pub fn srf_srf_srf_inter(
    srf1: &Multivariate,
    srf2: &Multivariate,
    srf3: &Multivariate,
    config: &ZeroSolverConfig,
) -> Result<ZeroSet, MvarError> {
    config.error_policy.apply((|| {
        for srf in [srf1, srf2, srf3] {
            expect_dim(srf, 2)?;
        }
        let [a, b, c] = promote_blocks([srf1, srf2, srf3])?;
        log::info!("Intersecting three surfaces");
        solve_differences(&[(a.clone(), b), (a, c)], config)
    })())
}

/// First contact of `srf1` with `srf2` moving under `motion`, as `(u1, v1, u2, v2, t)`.
///
/// The surfaces touch where `S1 = M`, the normal `N1 = S1_u x S1_v` is orthogonal to both
/// tangents of the moved surface, and the normals of the two surfaces oppose each other.
pub fn srf_srf_contact(
    srf1: &Multivariate,
    srf2: &Multivariate,
    motion: &Motion,
    config: &ZeroSolverConfig,
) -> Result<ZeroSet, MvarError> {
    config.error_policy.apply((|| {
        expect_dim(srf1, 2)?;
        expect_dim(srf2, 2)?;
        motion.validate()?;
        for srf in [srf1, srf2] {
            if srf.num_coords() != 3 {
                return Err(MvarError::DimensionMismatch {
                    expected: 3,
                    actual: srf.num_coords(),
                });
            }
        }
        let mut domains: AxisVec<(f64, f64)> = srf1.domain_all();
        domains.extend(srf2.domain_all());
        domains.push(motion.translation.domain(0)?);

        let s1 = promote_into(srf1, 0, &domains)?;
        let s1_u = promote_into(&srf1.derive(0)?, 0, &domains)?;
        let s1_v = promote_into(&srf1.derive(1)?, 0, &domains)?;
        let s2 = promote_into(srf2, 2, &domains)?;
        let s2_u = promote_into(&srf2.derive(0)?, 2, &domains)?;
        let s2_v = promote_into(&srf2.derive(1)?, 2, &domains)?;
        let translation = promote_into(&motion.translation, 4, &domains)?;
        let scale = match &motion.scale {
            Some(scale) => Some(promote_into(scale, 4, &domains)?),
            None => None,
        };
        log::info!("Solving surface contact under motion");

        if config.use_expr_tree {
            let mut tree = ExprTree::new();
            let s1 = tree.leaf(s1)?;
            let s1_u = tree.leaf(s1_u)?;
            let s1_v = tree.leaf(s1_v)?;
            let mut s2 = tree.leaf(s2)?;
            let mut s2_u = tree.leaf(s2_u)?;
            let mut s2_v = tree.leaf(s2_v)?;
            let translation = tree.leaf(translation)?;
            if let Some(scale) = scale {
                let scale = tree.leaf(scale)?;
                s2 = tree.mult(s2, scale)?;
                s2_u = tree.mult(s2_u, scale)?;
                s2_v = tree.mult(s2_v, scale)?;
            }
            let moved = tree.add(s2, translation)?;
            let diff = tree.sub(s1, moved)?;
            constrain_coords(&mut tree, diff, 3)?;
            let normal = tree.cross_prod(s1_u, s1_v)?;
            for tangent in [s2_u, s2_v] {
                let tangency = tree.dot_prod(normal, tangent)?;
                tree.constrain(tangency, ConstraintKind::Zero)?;
            }
            let moved_normal = tree.cross_prod(s2_u, s2_v)?;
            let facing = tree.dot_prod(normal, moved_normal)?;
            tree.constrain(facing, ConstraintKind::Negative)?;
            return solve_expr_tree(&tree, config);
        }

        let (moved, moved_u, moved_v) = match &scale {
            Some(scale) => (
                s2.mult_scalar(scale)?,
                s2_u.mult_scalar(scale)?,
                s2_v.mult_scalar(scale)?,
            ),
            None => (s2, s2_u, s2_v),
        };
        let moved = moved.add(&translation)?;
        let mut constraints = coord_constraints(&s1.sub(&moved)?)?;
        let normal = s1_u.cross_prod(&s1_v)?;
        constraints.push(Constraint::zero(normal.dot_prod(&moved_u)?));
        constraints.push(Constraint::zero(normal.dot_prod(&moved_v)?));
        let facing = normal.dot_prod(&moved_u.cross_prod(&moved_v)?)?;
        constraints.push(Constraint::negative(facing));
        solve_zeros(&constraints, config)
    })())
}

/// The kernel function of a planar curve over `xy_box x T`:
/// `K(x, y, t) = (C(t) - (x, y)) x C'(t)`.
///
/// A point `P` lies in the kernel of the curve when `K(P, t)` keeps one sign over `T`.
pub fn crv_kernel(crv: &Multivariate, xy_box: [(f64, f64); 2]) -> Result<Multivariate, MvarError> {
    expect_dim(crv, 1)?;
    if crv.num_coords() != 2 {
        return Err(MvarError::DimensionMismatch {
            expected: 2,
            actual: crv.num_coords(),
        });
    }
    let [(x0, x1), (y0, y1)] = xy_box;
    let domains: AxisVec<(f64, f64)> = [(x0, x1), (y0, y1), crv.domain(0)?].into_iter().collect();

    let mut plane =
        Multivariate::bezier_from_rows(&[2, 2], &[[x0, y0], [x1, y0], [x0, y1], [x1, y1]])?
            .promote_one();
    plane.align_domains(&domains)?;
    let curve = promote_into(crv, 2, &domains)?;
    let tangent = promote_into(&crv.derive(0)?, 2, &domains)?;
    curve.sub(&plane)?.cross_prod_2d(&tangent)
}

/// Points `(x, y, t)` of a planar curve where the boundary of its kernel is tangent to the
/// curve: the inflection points, where `det(H, H', H'')` of the homogeneous curve `H`
/// vanishes. Convex curves have none.
pub fn crv_kernel_silhouette(
    crv: &Multivariate,
    config: &ZeroSolverConfig,
) -> Result<Vec<[f64; 3]>, MvarError> {
    config.error_policy.apply((|| {
        expect_dim(crv, 1)?;
        if crv.num_coords() != 2 {
            return Err(MvarError::DimensionMismatch {
                expected: 2,
                actual: crv.num_coords(),
            });
        }
        let homogeneous = homogeneous_components(crv);
        let first: Vec<Multivariate> = homogeneous
            .iter()
            .map(|h| h.derive_polynomial(0))
            .collect::<Result<_, _>>()?;
        let second: Vec<Multivariate> = first
            .iter()
            .map(|h| h.derive_polynomial(0))
            .collect::<Result<_, _>>()?;
        let row = |h: &[Multivariate]| [h[0].clone(), h[1].clone(), h[2].clone()];
        let det = determinant3(&[row(&homogeneous), row(&first), row(&second)])?;

        let zeros = solve_zeros(&[Constraint::zero(det)], config)?;
        if zeros.degenerate {
            log::warn!("Curve is straight over a sub-domain, its silhouette is not discrete");
        }
        zeros
            .points
            .iter()
            .map(|p| {
                let t = p.params[0];
                let point = crv.eval_projected(&[t])?;
                Ok([point[0], point[1], t])
            })
            .collect()
    })())
}

fn expect_dim(mv: &Multivariate, dim: usize) -> Result<(), MvarError> {
    if mv.dim() != dim {
        return Err(MvarError::DimensionMismatch {
            expected: dim,
            actual: mv.dim(),
        });
    }
    Ok(())
}

/// Promote each operand into its own block of axes of a shared parameter space.
fn promote_blocks<const N: usize>(
    mvs: [&Multivariate; N],
) -> Result<[Multivariate; N], MvarError> {
    let domains: AxisVec<(f64, f64)> = mvs.iter().flat_map(|mv| mv.domain_all()).collect();
    let mut start = 0;
    let mut promoted = Vec::with_capacity(N);
    for mv in mvs {
        promoted.push(promote_into(mv, start, &domains)?);
        start += mv.dim();
    }
    promoted
        .try_into()
        .map_err(|_| MvarError::AlgorithmError {
            message: "promoted operand count changed".into(),
        })
}

/// `mv` with its axes placed at `start_axis` in a space with the given per axis domains.
fn promote_into(
    mv: &Multivariate,
    start_axis: usize,
    domains: &[(f64, f64)],
) -> Result<Multivariate, MvarError> {
    let mut promoted = mv.promote_to_dim(domains.len(), start_axis)?;
    promoted.align_domains(domains)?;
    Ok(promoted)
}

/// The numerator of each coordinate of a vector field, as a zero constraint.
fn coord_constraints(diff: &Multivariate) -> Result<Vec<Constraint>, MvarError> {
    Ok(diff
        .split_scalar()?
        .into_iter()
        .skip(1)
        .flatten()
        .map(Constraint::zero)
        .collect())
}

fn constrain_coords(tree: &mut ExprTree, id: ExprId, coords: usize) -> Result<(), MvarError> {
    for c in 0..coords {
        let coord = tree.coord(id, c)?;
        tree.constrain(coord, ConstraintKind::Zero)?;
    }
    Ok(())
}

/// Solve `a = b` for every pair, coordinate by coordinate.
fn solve_differences(
    pairs: &[(Multivariate, Multivariate)],
    config: &ZeroSolverConfig,
) -> Result<ZeroSet, MvarError> {
    if config.use_expr_tree {
        let mut tree = ExprTree::new();
        for (a, b) in pairs {
            let point_type = a.point_type().merged(b.point_type());
            let a = tree.leaf(a.coerce_point_type(point_type)?)?;
            let b = tree.leaf(b.coerce_point_type(point_type)?)?;
            let diff = tree.sub(a, b)?;
            constrain_coords(&mut tree, diff, point_type.num_coords())?;
        }
        return solve_expr_tree(&tree, config);
    }

    let mut constraints = Vec::new();
    for (a, b) in pairs {
        constraints.extend(coord_constraints(&a.sub(b)?)?);
    }
    solve_zeros(&constraints, config)
}

/// `[w, w x, w y]` of a planar curve as polynomial scalars. Non-rational curves get unit
/// weights.
fn homogeneous_components(crv: &Multivariate) -> [Multivariate; 3] {
    std::array::from_fn(|c| {
        let mut scalar = crv.clone_structure();
        scalar.point_type = PointType::E1;
        let values = match (c, crv.weights()) {
            (0, Some(weights)) => weights.to_vec(),
            (0, None) => vec![1.0; crv.mesh_len()],
            (c, _) => crv.points(c).to_vec(),
        };
        scalar.points = smallvec::smallvec![Vec::new(), values];
        scalar
    })
}

#[cfg(test)]
mod tests {
    use assertables::{assert_ge, assert_gt};
    use pretty_assertions as pa;

    use super::*;
    use crate::{
        RootKind,
        test_utils::{ApproxRoots, init_test_logger, linspace},
    };

    fn line(from: [f64; 2], to: [f64; 2]) -> Multivariate {
        Multivariate::from_curve(2, None, false, &[from, to]).unwrap()
    }

    fn roots(set: &ZeroSet) -> ApproxRoots {
        ApproxRoots(set.params().map(|p| p.to_vec()).collect())
    }

    fn configs() -> [ZeroSolverConfig; 2] {
        [
            ZeroSolverConfig::default(),
            ZeroSolverConfig {
                use_expr_tree: true,
                ..ZeroSolverConfig::default()
            },
        ]
    }

    /// Unit circle as a rational quadratic Bspline with four quarter arcs.
    fn unit_circle() -> Multivariate {
        let w = std::f64::consts::FRAC_1_SQRT_2;
        let points = [
            (1.0, 0.0, 1.0),
            (1.0, 1.0, w),
            (0.0, 1.0, 1.0),
            (-1.0, 1.0, w),
            (-1.0, 0.0, 1.0),
            (-1.0, -1.0, w),
            (0.0, -1.0, 1.0),
            (1.0, -1.0, w),
            (1.0, 0.0, 1.0),
        ];
        let rows: Vec<[f64; 3]> = points.iter().map(|&(x, y, w)| [w, w * x, w * y]).collect();
        let knots = [0.0, 0.0, 0.0, 0.25, 0.25, 0.5, 0.5, 0.75, 0.75, 1.0, 1.0, 1.0];
        Multivariate::from_curve(3, Some(&knots[..]), true, &rows).unwrap()
    }

    /// Bilinear patch `origin + u * du + v * dv` over [0, 1]^2.
    fn plane(origin: [f64; 3], du: [f64; 3], dv: [f64; 3]) -> Multivariate {
        let at = |u: f64, v: f64| -> [f64; 3] {
            std::array::from_fn(|i| origin[i] + u * du[i] + v * dv[i])
        };
        let rows = [at(0.0, 0.0), at(1.0, 0.0), at(0.0, 1.0), at(1.0, 1.0)];
        Multivariate::bezier_from_rows(&[2, 2], &rows).unwrap()
    }

    #[test]
    fn crossing_segments() {
        init_test_logger();
        let c1 = line([0.0, 0.5], [1.0, 0.5]);
        let c2 = line([0.5, 0.0], [0.5, 1.0]);
        for config in configs() {
            let set = crv_crv_inter(&c1, &c2, &config).unwrap();
            let expected = ApproxRoots(vec![vec![0.5, 0.5]]);
            approx::assert_abs_diff_eq!(roots(&set), expected, epsilon = 1e-9);
            assert!(!set.degenerate);
        }
    }

    #[test]
    fn curves_with_different_domains() {
        init_test_logger();
        let mut c1 = line([0.0, 0.0], [1.0, 1.0]);
        c1.set_domain(2.0, 4.0, 0).unwrap();
        let c2 = Multivariate::from_curve(3, None, false, &[[0.0, 1.0], [0.5, 0.5], [1.0, 1.0]])
            .unwrap();
        for config in configs() {
            let set = crv_crv_inter(&c1, &c2, &config).unwrap();
            pa::assert_eq!(set.len(), 1);
            let p = &set.points[0].params;
            let a = c1.eval_projected(&[p[0]]).unwrap();
            let b = c2.eval_projected(&[p[1]]).unwrap();
            approx::assert_abs_diff_eq!(a.as_slice(), b.as_slice(), epsilon = 1e-9);
            assert!(p[0] >= 2.0 && p[0] <= 4.0);
        }
    }

    #[test]
    fn rational_circle_meets_line_twice() {
        init_test_logger();
        let circle = unit_circle();
        let chord = line([-2.0, 0.5], [2.0, 0.5]);
        let set = crv_crv_inter(&circle, &chord, &ZeroSolverConfig::default()).unwrap();
        pa::assert_eq!(set.len(), 2);
        for p in set.params() {
            let on_circle = circle.eval_projected(&[p[0]]).unwrap();
            approx::assert_abs_diff_eq!(on_circle[1], 0.5, epsilon = 1e-9);
            approx::assert_abs_diff_eq!(on_circle[0].abs(), 0.75f64.sqrt(), epsilon = 1e-9);
        }
    }

    #[test]
    fn coincident_curves_are_flagged() {
        init_test_logger();
        let arc = Multivariate::from_curve(3, None, false, &[[0.0, 0.0], [0.5, 1.0], [1.0, 0.0]])
            .unwrap();
        for config in configs() {
            let config = ZeroSolverConfig {
                subdiv_tol: 1e-2,
                ..config
            };
            let set = crv_crv_inter(&arc, &arc, &config).unwrap();
            assert!(set.degenerate);
            assert_ge!(set.len(), 2);
            assert!(set.points.iter().any(|p| p.kind == RootKind::Degenerate));
            for p in set.params() {
                approx::assert_abs_diff_eq!(p[0], p[1], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn surface_intersection_samples_a_line() {
        init_test_logger();
        // z = 0.5 against x = 0.5 meet along (0.5, y, 0.5).
        let s1 = plane([0.0, 0.0, 0.5], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let s2 = plane([0.5, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]);
        let config = ZeroSolverConfig {
            subdiv_tol: 0.05,
            identical_tol: Some(0.01),
            ..ZeroSolverConfig::default()
        };
        let set = srf_srf_inter(&s1, &s2, &config).unwrap();
        assert_ge!(set.len(), 5);
        for p in set.params() {
            let a = s1.eval_projected(&p[..2]).unwrap();
            let b = s2.eval_projected(&p[2..]).unwrap();
            approx::assert_abs_diff_eq!(a.as_slice(), b.as_slice(), epsilon = 1e-9);
            approx::assert_abs_diff_eq!(a[0], 0.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn three_planes_meet_once() {
        init_test_logger();
        let s1 = plane([0.0, 0.0, 0.5], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let s2 = plane([0.0, 0.5, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]);
        let s3 = plane([0.5, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]);
        for config in configs() {
            let set = srf_srf_srf_inter(&s1, &s2, &s3, &config).unwrap();
            let expected = ApproxRoots(vec![vec![0.5; 6]]);
            approx::assert_abs_diff_eq!(roots(&set), expected, epsilon = 1e-9);
        }
    }

    /// Paraboloid `z = 1 + x^2 + y^2` over `[-1, 1]^2` with `x = 1 - 2u`, `y = 2v - 1`, so
    /// that its normal points down.
    fn paraboloid() -> Multivariate {
        let xs = [1.0, 0.0, -1.0];
        let ys = [-1.0, 0.0, 1.0];
        let squares = [1.0, -1.0, 1.0];
        let mut rows = Vec::new();
        for j in 0..3 {
            for i in 0..3 {
                rows.push([xs[i], ys[j], 1.0 + squares[i] + squares[j]]);
            }
        }
        Multivariate::bezier_from_rows(&[3, 3], &rows).unwrap()
    }

    #[test]
    fn paraboloid_falls_onto_plane() {
        init_test_logger();
        let floor = plane([-1.0, -1.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]);
        let motion = Motion::translation(
            Multivariate::from_curve(2, None, false, &[[0.0, 0.0, 0.0], [0.0, 0.0, -2.0]])
                .unwrap(),
        );
        let coarse = ZeroSolverConfig::coarse();
        let tree = ZeroSolverConfig {
            use_expr_tree: true,
            ..coarse
        };
        for config in [coarse, tree] {
            let set = srf_srf_contact(&floor, &paraboloid(), &motion, &config).unwrap();
            let expected = ApproxRoots(vec![vec![0.5; 5]]);
            approx::assert_abs_diff_eq!(roots(&set), expected, epsilon = 1e-8);
        }
    }

    #[test]
    fn contact_respects_scale_and_facing() {
        init_test_logger();
        let floor = plane([-1.0, -1.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]);
        // Shrinking by half while dropping by one: 0.5 (1 + ...) - t touches at t = 0.5.
        let motion = Motion {
            translation: Multivariate::from_curve(
                2,
                None,
                false,
                &[[0.0, 0.0, 0.0], [0.0, 0.0, -1.0]],
            )
            .unwrap(),
            scale: Some(Multivariate::from_curve(2, None, false, &[[0.5], [0.5]]).unwrap()),
        };
        let set = srf_srf_contact(&floor, &paraboloid(), &motion, &ZeroSolverConfig::default())
            .unwrap();
        let expected = ApproxRoots(vec![vec![0.5; 5]]);
        approx::assert_abs_diff_eq!(roots(&set), expected, epsilon = 1e-8);

        // Flipping the floor makes the normals agree, so there is no contact.
        let ceiling = plane([-1.0, -1.0, 0.0], [0.0, 2.0, 0.0], [2.0, 0.0, 0.0]);
        let set = srf_srf_contact(&ceiling, &paraboloid(), &motion, &ZeroSolverConfig::default())
            .unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn motion_is_validated() {
        let floor = plane([-1.0, -1.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]);
        let planar = Motion::translation(line([0.0, 0.0], [0.0, 1.0]));
        assert!(matches!(
            srf_srf_contact(&floor, &paraboloid(), &planar, &ZeroSolverConfig::default()),
            Err(MvarError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn kernel_matches_pointwise_cross_product() {
        let crv = Multivariate::from_curve(3, None, false, &[[0.0, 0.0], [1.0, 2.0], [2.0, 0.0]])
            .unwrap();
        let xy_box = [(-1.0, 3.0), (-2.0, 2.0)];
        let kernel = crv_kernel(&crv, xy_box).unwrap();
        pa::assert_eq!(kernel.dim(), 3);
        pa::assert_eq!(kernel.domain(0).unwrap(), xy_box[0]);
        pa::assert_eq!(kernel.domain(1).unwrap(), xy_box[1]);
        let tangent = crv.derive(0).unwrap();
        for (x, y, t) in itertools::iproduct!(
            linspace(-1.0, 3.0, 4),
            linspace(-2.0, 2.0, 4),
            linspace(0.0, 1.0, 5)
        ) {
            let c = crv.eval_projected(&[t]).unwrap();
            let d = tangent.eval_projected(&[t]).unwrap();
            let expected = (c[0] - x) * d[1] - (c[1] - y) * d[0];
            let value = kernel.eval_projected(&[x, y, t]).unwrap()[0];
            approx::assert_abs_diff_eq!(value, expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn convex_circle_has_empty_silhouette() {
        init_test_logger();
        for config in configs() {
            let silhouette = crv_kernel_silhouette(&unit_circle(), &config).unwrap();
            assert!(silhouette.is_empty());
        }
        // Every point inside the circle sees the whole curve with one orientation.
        let kernel = crv_kernel(&unit_circle(), [(-0.5, 0.5), (-0.5, 0.5)]).unwrap();
        for t in linspace(0.0, 1.0, 17) {
            assert_gt!(kernel.eval_projected(&[0.1, -0.2, t]).unwrap()[0], 0.0);
        }
    }

    #[test]
    fn s_curve_silhouette_at_inflection() {
        init_test_logger();
        let crv = Multivariate::from_curve(
            4,
            None,
            false,
            &[[0.0, 0.0], [1.0 / 3.0, 1.0], [2.0 / 3.0, -1.0], [1.0, 0.0]],
        )
        .unwrap();
        let silhouette = crv_kernel_silhouette(&crv, &ZeroSolverConfig::default()).unwrap();
        pa::assert_eq!(silhouette.len(), 1);
        let expected = [0.5, 0.0, 0.5];
        approx::assert_abs_diff_eq!(silhouette[0].as_slice(), expected.as_slice(), epsilon = 1e-9);
    }
}
