//! Monotone decomposition of the zero set of a bivariate scalar function.
//!
//! The parametric box is subdivided until the zero set inside every box consists of arcs
//! that are monotone in both parameters. Each such arc is reported as a [`MonotoneRegion`]
//! spanning its two boundary crossings, and can be traced into a polyline by iso-line root
//! finding.

use crate::{
    Constraint, Multivariate, MvarError, Polyline, ZeroSolverConfig, solve_zeros,
    zeros::numerator_form,
};

#[derive(Debug, Clone, Copy)]
pub struct MonotoneConfig {
    /// Subdivision tolerance of the root finding for turning points and crossings.
    pub subdiv_tol: f64,
    pub numeric_tol: f64,
    /// Fraction of the domain removed along both sides adjacent to a flat corner.
    pub flat_corner_trim: f64,
    pub max_depth: usize,
    /// Turning points within this fraction of the box size from its boundary are ignored.
    pub turning_point_margin: f64,
    /// Function values and control differences below this vanish at a corner.
    pub corner_tol: f64,
}

impl Default for MonotoneConfig {
    fn default() -> Self {
        Self {
            subdiv_tol: 1e-4,
            numeric_tol: 1e-10,
            flat_corner_trim: 1e-3,
            max_depth: 24,
            turning_point_margin: 1e-6,
            corner_tol: 1e-8,
        }
    }
}

impl MonotoneConfig {
    fn solver_config(&self) -> ZeroSolverConfig {
        ZeroSolverConfig {
            subdiv_tol: self.subdiv_tol,
            numeric_tol: self.numeric_tol,
            ..ZeroSolverConfig::default()
        }
    }
}

/// One arc of the zero set, monotone in both parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MonotoneRegion {
    /// Bounding box of the arc in `(u, v)`.
    pub domain: [(f64, f64); 2],
    /// The boundary crossings the arc connects.
    pub endpoints: [[f64; 2]; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    UMinVMin,
    UMaxVMin,
    UMaxVMax,
    UMinVMax,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::UMinVMin,
        Corner::UMaxVMin,
        Corner::UMaxVMax,
        Corner::UMinVMax,
    ];

    fn at_max(self) -> [bool; 2] {
        match self {
            Corner::UMinVMin => [false, false],
            Corner::UMaxVMin => [true, false],
            Corner::UMaxVMax => [true, true],
            Corner::UMinVMax => [false, true],
        }
    }

    fn point(self, domain: &[(f64, f64)]) -> [f64; 2] {
        let [u_max, v_max] = self.at_max();
        [
            if u_max { domain[0].1 } else { domain[0].0 },
            if v_max { domain[1].1 } else { domain[1].0 },
        ]
    }

    /// Edge a crossing at this corner is attributed to.
    fn side(self) -> Side {
        match self {
            Corner::UMinVMin => Side::Bottom,
            Corner::UMaxVMin => Side::Right,
            Corner::UMaxVMax => Side::Top,
            Corner::UMinVMax => Side::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CornerKind {
    /// The function does not vanish at the corner.
    NonZero,
    /// The zero set enters the box through the corner.
    Crossing,
    /// The function vanishes at the corner only; the zero set stays outside the box.
    Isolated,
    /// The function vanishes and a derivative along an edge vanishes too.
    Flat,
}

/// Classify a corner of a bivariate scalar from its control mesh.
///
/// This is a heuristic: the signs of the first control differences moving inward from the
/// corner along u and v stand in for the local behaviour of the function. Agreeing signs
/// mean the function grows (or shrinks) into the box in both directions, so the zero set
/// only touches the corner. It can misjudge corners where the function turns over within
/// the first knot span.
pub fn isolated_corner_by_derivative_sign(
    f: &Multivariate,
    corner: Corner,
    tol: f64,
) -> Result<CornerKind, MvarError> {
    let f = implicit_function(f)?;
    let lengths = f.lengths();
    let values = f.points(1);
    let [u_max, v_max] = corner.at_max();
    let i = if u_max { lengths[0] - 1 } else { 0 };
    let j = if v_max { lengths[1] - 1 } else { 0 };
    let at = |i: usize, j: usize| values[i + j * lengths[0]];

    let value = at(i, j);
    if value.abs() > tol {
        return Ok(CornerKind::NonZero);
    }
    if lengths[0] < 2 || lengths[1] < 2 {
        return Ok(CornerKind::Flat);
    }
    let inward_i = if u_max { i - 1 } else { i + 1 };
    let inward_j = if v_max { j - 1 } else { j + 1 };
    let du = at(inward_i, j) - value;
    let dv = at(i, inward_j) - value;
    if du.abs() <= tol || dv.abs() <= tol {
        return Ok(CornerKind::Flat);
    }
    Ok(if du.signum() == dv.signum() {
        CornerKind::Isolated
    } else {
        CornerKind::Crossing
    })
}

/// Split the zero set of the bivariate scalar `f` into arcs monotone in u and in v.
pub fn monotone_decompose(
    f: &Multivariate,
    config: &MonotoneConfig,
) -> Result<Vec<MonotoneRegion>, MvarError> {
    let f = implicit_function(f)?;
    let mut regions = Vec::new();
    let f = peel_vanishing_edges(&f, config, &mut regions)?;
    let f = trim_flat_corners(&f, config)?;
    decompose(&f, 0, config, &mut regions)?;
    log::info!("Monotone decomposition produced {} regions", regions.len());
    Ok(regions)
}

/// Trace the arc of `region` into a polyline of `num_samples` points, solving for the
/// zero set along iso-lines of the parameter the arc spans most.
pub fn trace_monotone_region(
    f: &Multivariate,
    region: &MonotoneRegion,
    num_samples: usize,
    config: &MonotoneConfig,
) -> Result<Polyline, MvarError> {
    let f = implicit_function(f)?;
    let [p0, p1] = region.endpoints;
    let axis = if (p1[0] - p0[0]).abs() >= (p1[1] - p0[1]).abs() {
        0
    } else {
        1
    };
    let other = 1 - axis;
    let (lo, hi) = region.domain[other];
    let solver = config.solver_config();
    let num_samples = num_samples.max(2);

    let mut points = vec![smallvec::smallvec![p0[0], p0[1]]];
    let mut prev = p0[other];
    for k in 1..num_samples - 1 {
        let s = p0[axis] + (p1[axis] - p0[axis]) * k as f64 / (num_samples - 1) as f64;
        let t = if hi - lo <= config.numeric_tol {
            Some(0.5 * (lo + hi))
        } else {
            let iso = f.restrict_axis(axis, s)?;
            let (min, max) = iso.domain(0)?;
            let pad = 1e-9 * (hi - lo);
            let iso = iso.region_from_mv((lo - pad).max(min), (hi + pad).min(max), 0)?;
            let roots = solve_zeros(&[Constraint::zero(iso)], &solver)?;
            roots
                .params()
                .map(|p| p[0])
                .min_by(|a, b| (a - prev).abs().total_cmp(&(b - prev).abs()))
        };
        let Some(t) = t else {
            log::debug!("No root on the iso-line {s} of axis {axis}");
            continue;
        };
        prev = t;
        let mut point = smallvec::smallvec![0.0; 2];
        point[axis] = s;
        point[other] = t;
        points.push(point);
    }
    points.push(smallvec::smallvec![p1[0], p1[1]]);
    Ok(Polyline::new(points))
}

/// A non-rational bivariate scalar with open ends whose zero set matches that of `f`.
fn implicit_function(f: &Multivariate) -> Result<Multivariate, MvarError> {
    if f.dim() != 2 {
        return Err(MvarError::DimensionMismatch {
            expected: 2,
            actual: f.dim(),
        });
    }
    if !f.point_type().is_scalar() {
        return Err(MvarError::ScalarPointExpected {
            point_type: f.point_type(),
        });
    }
    let mut f = numerator_form(f);
    if f.is_rational() {
        return Err(MvarError::NumericDegeneracy {
            message: "weights of the implicit function change sign".into(),
        });
    }
    for axis in 0..2 {
        f = f.open_end(axis)?;
    }
    Ok(f)
}

/// Whether `f` vanishes along the whole iso-line `axis = value`.
fn edge_vanishes(f: &Multivariate, axis: usize, value: f64, tol: f64) -> Result<bool, MvarError> {
    let edge = f.restrict_axis(axis, value)?;
    Ok(edge.points(1).iter().all(|x| x.abs() <= tol))
}

/// Report every edge of the box along which `f` vanishes as a region of its own, and move
/// that edge inward by `flat_corner_trim` so the rest of the zero set can be decomposed.
fn peel_vanishing_edges(
    f: &Multivariate,
    config: &MonotoneConfig,
    out: &mut Vec<MonotoneRegion>,
) -> Result<Multivariate, MvarError> {
    let domain = f.domain_all();
    let mut trimmed = domain.clone();
    for (axis, at_max) in [(1, false), (0, true), (1, true), (0, false)] {
        let value = if at_max { domain[axis].1 } else { domain[axis].0 };
        if !edge_vanishes(f, axis, value, config.corner_tol)? {
            continue;
        }
        let along = 1 - axis;
        let mut start = [0.0; 2];
        start[axis] = value;
        start[along] = domain[along].0;
        let mut end = start;
        end[along] = domain[along].1;
        let mut region_domain = [domain[0], domain[1]];
        region_domain[axis] = (value, value);
        let region = MonotoneRegion {
            domain: region_domain,
            endpoints: [start, end],
        };
        // Sibling boxes share the edge.
        if !out.contains(&region) {
            log::debug!("Zero set runs along the edge {start:?} to {end:?}");
            out.push(region);
        }
        let trim = config.flat_corner_trim * (domain[axis].1 - domain[axis].0);
        if at_max {
            trimmed[axis].1 -= trim;
        } else {
            trimmed[axis].0 += trim;
        }
    }
    let mut f = f.clone();
    for axis in 0..2 {
        if trimmed[axis] != domain[axis] {
            f = f.region_from_mv(trimmed[axis].0, trimmed[axis].1, axis)?;
        }
    }
    Ok(f)
}

fn trim_flat_corners(f: &Multivariate, config: &MonotoneConfig) -> Result<Multivariate, MvarError> {
    let domain = f.domain_all();
    let mut trimmed = domain.clone();
    for corner in Corner::ALL {
        if isolated_corner_by_derivative_sign(f, corner, config.corner_tol)? != CornerKind::Flat {
            continue;
        }
        log::debug!("Trimming flat corner {corner:?}");
        for (axis, at_max) in corner.at_max().into_iter().enumerate() {
            let trim = config.flat_corner_trim * (domain[axis].1 - domain[axis].0);
            if at_max {
                trimmed[axis].1 = trimmed[axis].1.min(domain[axis].1 - trim);
            } else {
                trimmed[axis].0 = trimmed[axis].0.max(domain[axis].0 + trim);
            }
        }
    }
    let mut f = f.clone();
    for axis in 0..2 {
        if trimmed[axis] != domain[axis] {
            f = f.region_from_mv(trimmed[axis].0, trimmed[axis].1, axis)?;
        }
    }
    Ok(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Bottom,
    Right,
    Top,
    Left,
}

#[derive(Debug, Clone, Copy)]
struct Crossing {
    side: Side,
    point: [f64; 2],
}

/// Which parameter is extremal at a turning point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extreme {
    /// Vertical tangent, `F_v = 0`.
    U,
    /// Horizontal tangent, `F_u = 0`.
    V,
}

#[derive(Debug, Clone, Copy)]
struct TurningPoint {
    point: [f64; 2],
    extreme: Extreme,
}

fn decompose(
    f: &Multivariate,
    depth: usize,
    config: &MonotoneConfig,
    out: &mut Vec<MonotoneRegion>,
) -> Result<(), MvarError> {
    if depth > config.max_depth {
        return Err(MvarError::MonotoneDecompositionFailed {
            depth: config.max_depth,
        });
    }
    let f = &peel_vanishing_edges(f, config, out)?;
    let domain = f.domain_all();
    let turning = turning_points(f, config)?;
    log::debug!(
        "Depth {depth}: {} turning points in {domain:?}",
        turning.len()
    );

    if turning.len() > 1 {
        let (axis, t) = turning_point_split(&turning, &domain);
        return split_and_recurse(f, axis, t, depth, config, out);
    }

    let crossings = boundary_crossings(f, config)?;
    if let Some(tp) = turning.first() {
        if crossings.len() <= 2 {
            // Cutting through the turning point across its tangent leaves two monotone arcs.
            let (axis, t) = match tp.extreme {
                Extreme::U => (1, tp.point[1]),
                Extreme::V => (0, tp.point[0]),
            };
            return split_and_recurse(f, axis, t, depth, config, out);
        }
        return split_around(f, tp.point, depth, config, out);
    }

    if crossings.is_empty() {
        return Ok(());
    }
    match pair_crossings(f, &crossings)? {
        Some(pairs) => {
            for [a, b] in pairs {
                out.push(MonotoneRegion {
                    domain: [
                        (a[0].min(b[0]), a[0].max(b[0])),
                        (a[1].min(b[1]), a[1].max(b[1])),
                    ],
                    endpoints: [a, b],
                });
            }
            Ok(())
        }
        None => {
            let (axis, t) = crossing_gap_split(&crossings, &domain);
            split_and_recurse(f, axis, t, depth, config, out)
        }
    }
}

fn turning_points(f: &Multivariate, config: &MonotoneConfig) -> Result<Vec<TurningPoint>, MvarError> {
    let domain = f.domain_all();
    let solver = config.solver_config();
    let mut turning = Vec::new();
    for (axis, extreme) in [(0, Extreme::V), (1, Extreme::U)] {
        let derivative = f.derive(axis)?;
        if derivative.points(1).iter().all(|x| x.abs() <= config.corner_tol) {
            log::debug!("Function is constant along axis {axis} in {domain:?}");
            continue;
        }
        let constraints = [Constraint::zero(f.clone()), Constraint::zero(derivative)];
        let set = solve_zeros(&constraints, &solver)?;
        if set.degenerate {
            // Arcs parallel to an axis are monotone, though not strictly.
            log::debug!("Zero set runs parallel to axis {} in {domain:?}", 1 - axis);
            continue;
        }
        for params in set.params() {
            let inside = (0..2).all(|d| {
                let (min, max) = domain[d];
                let margin = config.turning_point_margin * (max - min);
                params[d] > min + margin && params[d] < max - margin
            });
            if inside {
                turning.push(TurningPoint {
                    point: [params[0], params[1]],
                    extreme,
                });
            }
        }
    }
    Ok(turning)
}

fn boundary_crossings(f: &Multivariate, config: &MonotoneConfig) -> Result<Vec<Crossing>, MvarError> {
    let domain = f.domain_all();
    let solver = config.solver_config();
    let edges = [
        (Side::Bottom, 1, domain[1].0),
        (Side::Right, 0, domain[0].1),
        (Side::Top, 1, domain[1].1),
        (Side::Left, 0, domain[0].0),
    ];
    let mut found = Vec::new();
    for (side, fixed_axis, value) in edges {
        let edge = f.restrict_axis(fixed_axis, value)?;
        let set = solve_zeros(&[Constraint::zero(edge)], &solver)?;
        if set.degenerate {
            if edge_vanishes(f, fixed_axis, value, config.corner_tol)? {
                return Err(MvarError::NumericDegeneracy {
                    message: format!("zero set runs along the {side:?} edge of {domain:?}"),
                });
            }
            log::debug!("Zero set touches the {side:?} edge of {domain:?}");
        }
        for p in set.params() {
            let point = if fixed_axis == 1 {
                [p[0], value]
            } else {
                [value, p[0]]
            };
            found.push(Crossing { side, point });
        }
    }

    // Roots at a corner show up on both of its edges.
    let mut crossings = Vec::with_capacity(found.len());
    let mut corner_done = [false; 4];
    for crossing in found {
        let corner = Corner::ALL.into_iter().enumerate().find(|(_, corner)| {
            let c = corner.point(&domain);
            (0..2).all(|d| (crossing.point[d] - c[d]).abs() <= config.subdiv_tol)
        });
        let Some((index, corner)) = corner else {
            crossings.push(crossing);
            continue;
        };
        if corner_done[index] {
            continue;
        }
        corner_done[index] = true;
        match isolated_corner_by_derivative_sign(f, corner, config.corner_tol)? {
            CornerKind::Isolated => log::debug!("Dropping isolated corner {corner:?}"),
            CornerKind::NonZero => crossings.push(crossing),
            CornerKind::Crossing | CornerKind::Flat => crossings.push(Crossing {
                side: corner.side(),
                point: corner.point(&domain),
            }),
        }
    }
    Ok(crossings)
}

/// Match crossings into arcs when the box holds monotone arcs of one slope sign only.
fn pair_crossings(
    f: &Multivariate,
    crossings: &[Crossing],
) -> Result<Option<Vec<[[f64; 2]; 2]>>, MvarError> {
    let on = |side: Side| -> Vec<[f64; 2]> {
        crossings
            .iter()
            .filter(|c| c.side == side)
            .map(|c| c.point)
            .collect()
    };
    let (mut bottom, mut right, mut top, mut left) =
        (on(Side::Bottom), on(Side::Right), on(Side::Top), on(Side::Left));
    let (b, r, t, l) = (bottom.len(), right.len(), top.len(), left.len());
    if t.abs_diff(b) != l + r && l.abs_diff(r) != t + b {
        return Ok(None);
    }

    // The sign of dv/du = -F_u / F_v along the arcs.
    let mut slope = 0.0;
    for c in crossings {
        let grad = f.gradient(&c.point)?;
        let product = grad[0] * grad[1];
        let s = if product > 0.0 {
            -1.0
        } else if product < 0.0 {
            1.0
        } else {
            0.0
        };
        if s != 0.0 {
            if slope != 0.0 && s != slope {
                return Ok(None);
            }
            slope = s;
        }
    }

    let by = |points: &mut Vec<[f64; 2]>, axis: usize, ascending: bool| {
        points.sort_by(|a, b| {
            let order = a[axis].total_cmp(&b[axis]);
            if ascending { order } else { order.reverse() }
        });
    };
    let increasing = slope >= 0.0;
    let (starts, ends) = if increasing {
        // Arcs run from the left or bottom edge up to the top or right edge.
        by(&mut left, 1, false);
        by(&mut bottom, 0, true);
        by(&mut top, 0, true);
        by(&mut right, 1, false);
        (
            left.into_iter().chain(bottom).collect::<Vec<_>>(),
            top.into_iter().chain(right).collect::<Vec<_>>(),
        )
    } else {
        by(&mut left, 1, true);
        by(&mut top, 0, true);
        by(&mut bottom, 0, true);
        by(&mut right, 1, true);
        (
            left.into_iter().chain(top).collect::<Vec<_>>(),
            bottom.into_iter().chain(right).collect::<Vec<_>>(),
        )
    };
    if starts.len() != ends.len() {
        return Ok(None);
    }
    Ok(Some(
        starts.into_iter().zip(ends).map(|(a, b)| [a, b]).collect(),
    ))
}

/// Middle of the largest gap between turning point coordinates, relative to the box size.
fn turning_point_split(turning: &[TurningPoint], domain: &[(f64, f64)]) -> (usize, f64) {
    let mut best = (0, 0.5 * (domain[0].0 + domain[0].1), 0.0);
    for axis in 0..2 {
        let mut coords: Vec<f64> = turning.iter().map(|tp| tp.point[axis]).collect();
        coords.sort_by(f64::total_cmp);
        let width = domain[axis].1 - domain[axis].0;
        for w in coords.windows(2) {
            let gap = (w[1] - w[0]) / width;
            if gap > best.2 {
                best = (axis, 0.5 * (w[0] + w[1]), gap);
            }
        }
    }
    if best.2 == 0.0 {
        // Coincident turning points: halve the larger side.
        let axis = usize::from(domain[1].1 - domain[1].0 > domain[0].1 - domain[0].0);
        return (axis, 0.5 * (domain[axis].0 + domain[axis].1));
    }
    (best.0, best.1)
}

/// Middle of the largest gap between crossing parameters along the edges of each axis.
fn crossing_gap_split(crossings: &[Crossing], domain: &[(f64, f64)]) -> (usize, f64) {
    let mut best = (0, 0.5 * (domain[0].0 + domain[0].1), 0.0);
    for axis in 0..2 {
        let (min, max) = domain[axis];
        let mut coords = vec![min, max];
        coords.extend(crossings.iter().map(|c| c.point[axis]));
        coords.sort_by(f64::total_cmp);
        for w in coords.windows(2) {
            let gap = (w[1] - w[0]) / (max - min);
            if gap > best.2 {
                best = (axis, 0.5 * (w[0] + w[1]), gap);
            }
        }
    }
    (best.0, best.1)
}

fn split_and_recurse(
    f: &Multivariate,
    axis: usize,
    t: f64,
    depth: usize,
    config: &MonotoneConfig,
    out: &mut Vec<MonotoneRegion>,
) -> Result<(), MvarError> {
    let (min, max) = f.domain(axis)?;
    let margin = 1e-3 * (max - min);
    let t = if t > min + margin && t < max - margin {
        t
    } else {
        0.5 * (min + max)
    };
    // A cut along the zero set would leave it on the edges of both halves.
    let step = 0.01 * (max - min);
    let Some(t) = [0.0, 1.0, -1.0, 2.0, -2.0, 3.0, -3.0]
        .into_iter()
        .map(|k| t + k * step)
        .filter(|&s| s > min + margin && s < max - margin)
        .find_map(|s| match edge_vanishes(f, axis, s, config.corner_tol) {
            Ok(true) => None,
            other => Some(other.map(|_| s)),
        })
        .transpose()?
    else {
        return Err(MvarError::NumericDegeneracy {
            message: format!("zero set runs along every cut of axis {axis} near {t}"),
        });
    };
    log::debug!("Depth {depth}: splitting axis {axis} at {t}");
    let (lower, upper) = f.subdivide(axis, t)?;
    decompose(&lower, depth + 1, config, out)?;
    decompose(&upper, depth + 1, config, out)
}

/// A box around the turning point and the four boxes framing it.
fn split_around(
    f: &Multivariate,
    center: [f64; 2],
    depth: usize,
    config: &MonotoneConfig,
    out: &mut Vec<MonotoneRegion>,
) -> Result<(), MvarError> {
    let domain = f.domain_all();
    let around: [(f64, f64); 2] = std::array::from_fn(|d| {
        let (min, max) = domain[d];
        let delta = 0.1 * (max - min);
        ((center[d] - delta).max(min), (center[d] + delta).min(max))
    });
    let (u, v) = (domain[0], domain[1]);
    let (cu, cv) = (around[0], around[1]);
    let boxes = [
        [cu, cv],
        [(u.0, cu.0), v],
        [(cu.1, u.1), v],
        [cu, (v.0, cv.0)],
        [cu, (cv.1, v.1)],
    ];
    log::debug!("Depth {depth}: splitting around the turning point {center:?}");
    for [bu, bv] in boxes {
        if bu.1 - bu.0 <= 1e-12 * (u.1 - u.0) || bv.1 - bv.0 <= 1e-12 * (v.1 - v.0) {
            continue;
        }
        let sub = f.region_from_mv(bu.0, bu.1, 0)?.region_from_mv(bv.0, bv.1, 1)?;
        decompose(&sub, depth + 1, config, out)?;
    }
    Ok(())
}
