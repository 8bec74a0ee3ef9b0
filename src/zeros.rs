//! Common zeros of systems of scalar multivariates.
//!
//! The solver subdivides the parametric domain depth first. Each region is pruned when the
//! control polygon of some constraint excludes the required sign, clipped to the convex
//! hull of its zero constraints, tested for a unique solution, and otherwise split in half
//! along its largest side. Regions smaller than the subdivision tolerance are refined by
//! Newton iterations.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use smallvec::smallvec;

use crate::{
    AxisVec, Multivariate, MvarError, PointType, common_domain, interval_add, interval_mul,
    make_all_compatible,
};

mod clipping;
mod expr_tree;

pub use expr_tree::{ExprId, ExprTree};
use expr_tree::IntervalGrads;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Zero,
    Positive,
    Negative,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub mv: Multivariate,
    pub kind: ConstraintKind,
}

impl Constraint {
    pub fn new(mv: Multivariate, kind: ConstraintKind) -> Self {
        Self { mv, kind }
    }

    pub fn zero(mv: Multivariate) -> Self {
        Self::new(mv, ConstraintKind::Zero)
    }

    pub fn positive(mv: Multivariate) -> Self {
        Self::new(mv, ConstraintKind::Positive)
    }

    pub fn negative(mv: Multivariate) -> Self {
        Self::new(mv, ConstraintKind::Negative)
    }
}

/// What a failed solve does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Return the error to the caller.
    #[default]
    Propagate,
    /// Log the error and panic.
    Panic,
}

impl ErrorPolicy {
    pub(crate) fn apply<T>(self, result: Result<T, MvarError>) -> Result<T, MvarError> {
        match (self, result) {
            (ErrorPolicy::Panic, Err(err)) => {
                log::error!("zero solver failed: {err}");
                panic!("zero solver failed: {err}");
            }
            (_, result) => result,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ZeroSolverConfig {
    /// Regions whose largest side is below this are leaves.
    pub subdiv_tol: f64,
    /// Residual accepted by Newton refinement. Negative disables refinement and leaves are
    /// reported at their centers.
    pub numeric_tol: f64,
    pub max_depth: usize,
    /// Bound constraints through an [`ExprTree`] instead of multiplied out multivariates.
    pub use_expr_tree: bool,
    pub normal_cone_test: bool,
    pub grad_preconditioning: bool,
    pub domain_clipping: bool,
    pub max_newton_iters: usize,
    /// Solutions closer than this are merged. Defaults to ten times `subdiv_tol`.
    pub identical_tol: Option<f64>,
    /// A zero constraint bounded within `[-zero_eps, zero_eps]` over a region vanishes
    /// identically there.
    pub zero_eps: f64,
    pub error_policy: ErrorPolicy,
}

impl Default for ZeroSolverConfig {
    fn default() -> Self {
        Self {
            subdiv_tol: 1e-3,
            numeric_tol: 1e-10,
            max_depth: 64,
            use_expr_tree: false,
            normal_cone_test: true,
            grad_preconditioning: false,
            domain_clipping: true,
            max_newton_iters: 25,
            identical_tol: None,
            zero_eps: 1e-12,
            error_policy: ErrorPolicy::Propagate,
        }
    }
}

impl ZeroSolverConfig {
    pub fn coarse() -> Self {
        Self {
            subdiv_tol: 1e-2,
            numeric_tol: 1e-8,
            ..Self::default()
        }
    }

    pub fn fine() -> Self {
        Self {
            subdiv_tol: 1e-4,
            numeric_tol: 1e-12,
            max_depth: 96,
            ..Self::default()
        }
    }

    pub fn identical_tol(&self) -> f64 {
        self.identical_tol.unwrap_or(10.0 * self.subdiv_tol)
    }

    fn refines(&self) -> bool {
        self.numeric_tol >= 0.0 && self.numeric_tol < self.subdiv_tol
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Isolated,
    /// Part of a solution manifold, or a root with a rank deficient Jacobian.
    Degenerate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZeroPoint {
    pub params: AxisVec<f64>,
    pub kind: RootKind,
}

#[derive(Debug, Clone, Default)]
pub struct ZeroSet {
    pub points: Vec<ZeroPoint>,
    /// Set when some solution is not isolated, e.g. for overlapping geometry.
    pub degenerate: bool,
    /// Subdivision nodes visited.
    pub iterations: usize,
}

impl ZeroSet {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn params(&self) -> impl Iterator<Item = &[f64]> {
        self.points.iter().map(|p| p.params.as_slice())
    }
}

/// Solve a system of scalar constraints sharing one parametric domain.
pub fn solve_zeros(
    constraints: &[Constraint],
    config: &ZeroSolverConfig,
) -> Result<ZeroSet, MvarError> {
    let result = if config.use_expr_tree {
        ExprTree::from_constraints(constraints).and_then(|tree| solve_tree(&tree, config))
    } else {
        solve_regular(constraints, config)
    };
    config.error_policy.apply(result)
}

/// Solve the constraints registered on an expression tree.
pub fn solve_expr_tree(tree: &ExprTree, config: &ZeroSolverConfig) -> Result<ZeroSet, MvarError> {
    config.error_policy.apply(solve_tree(tree, config))
}

/// Solve independent systems in parallel.
pub fn solve_many(
    problems: &[Vec<Constraint>],
    config: &ZeroSolverConfig,
) -> Vec<Result<ZeroSet, MvarError>> {
    problems
        .par_iter()
        .map(|constraints| solve_zeros(constraints, config))
        .collect()
}

/// Merge solutions closer than `tol`, keeping the first of each cluster. A cluster
/// containing a degenerate point is degenerate.
pub fn filter_identical_set(points: Vec<ZeroPoint>, tol: f64) -> Vec<ZeroPoint> {
    let mut kept: Vec<ZeroPoint> = Vec::with_capacity(points.len());
    for point in points {
        let duplicate = kept.iter_mut().find(|k| {
            let dist_sq: f64 = k
                .params
                .iter()
                .zip(&point.params)
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            dist_sq <= tol * tol
        });
        match duplicate {
            Some(existing) => {
                if point.kind == RootKind::Degenerate {
                    existing.kind = RootKind::Degenerate;
                }
            }
            None => kept.push(point),
        }
    }
    kept
}

fn solve_regular(
    constraints: &[Constraint],
    config: &ZeroSolverConfig,
) -> Result<ZeroSet, MvarError> {
    let constraints = prepare_constraints(constraints)?;
    let evaluator = ConstraintEvaluator::new(&constraints)?;
    log::info!(
        "Solving {} constraints over {} parameters",
        constraints.len(),
        evaluator.dim
    );
    let root = RegularNode {
        constraints: constraints.clone(),
        depth: 0,
    };
    subdivision_solve(root, &evaluator, config)
}

fn solve_tree(tree: &ExprTree, config: &ZeroSolverConfig) -> Result<ZeroSet, MvarError> {
    tree.validate()?;
    let evaluator = TreeEvaluator::new(tree)?;
    log::info!(
        "Solving {} constraints over {} parameters through an expression tree of {} nodes",
        tree.constraints().len(),
        tree.dim(),
        tree.num_nodes()
    );
    let root = TreeNode {
        tree,
        leaves: tree.leaves().to_vec(),
        depth: 0,
    };
    subdivision_solve(root, &evaluator, config)
}

/// Check the system and replace rational constraints with sign consistent weights by
/// their numerators.
fn prepare_constraints(constraints: &[Constraint]) -> Result<Vec<Constraint>, MvarError> {
    let Some(first) = constraints.first() else {
        return Err(MvarError::TooFewParams {
            required: 1,
            actual: 0,
        });
    };
    for c in constraints {
        if !c.mv.point_type().is_scalar() {
            return Err(MvarError::ScalarPointExpected {
                point_type: c.mv.point_type(),
            });
        }
    }
    let mvs: Vec<Multivariate> = constraints.iter().map(|c| c.mv.clone()).collect();
    common_domain(&mvs)?;
    if !constraints.iter().any(|c| c.kind == ConstraintKind::Zero) {
        return Err(MvarError::UnderdefinedSystem {
            num_vars: first.mv.dim(),
            num_constraints: 0,
        });
    }
    Ok(constraints
        .iter()
        .map(|c| Constraint::new(numerator_form(&c.mv), c.kind))
        .collect())
}

/// The numerator of a rational scalar whose weights share a sign, negated for negative
/// weights so the sign of the function is preserved. Other inputs are returned as is.
pub(crate) fn numerator_form(mv: &Multivariate) -> Multivariate {
    let Some(weights) = mv.weights() else {
        return mv.clone();
    };
    let sign = if weights.iter().all(|&w| w > 0.0) {
        1.0
    } else if weights.iter().all(|&w| w < 0.0) {
        -1.0
    } else {
        return mv.clone();
    };
    let mut numerator = mv.clone_structure();
    numerator.point_type = PointType::E1;
    numerator.points = smallvec![Vec::new(), mv.points(1).iter().map(|x| sign * x).collect()];
    numerator
}

enum NodeClass {
    Pruned,
    /// Every zero constraint vanishes over the region. `signs_pending` is set while some
    /// sign constraint is neither satisfied nor violated everywhere.
    IdenticallyZero { signs_pending: bool },
    Active,
}

enum Clipped<N> {
    Empty,
    Unchanged,
    Shrunk(N),
}

/// One region of the subdivision together with the constraint representation over it.
trait SubdivisionNode: Sized {
    fn region(&self) -> AxisVec<(f64, f64)>;

    fn depth(&self) -> usize;

    fn classify(&mut self, config: &ZeroSolverConfig) -> Result<NodeClass, MvarError>;

    fn clip(&self) -> Result<Clipped<Self>, MvarError>;

    /// True when at most one solution can exist in the region.
    fn has_single_solution(&self) -> Result<bool, MvarError>;

    /// True when the preconditioned system excludes zero over the region.
    fn preconditioned_prune(&self) -> Result<bool, MvarError>;

    fn split(&self, axis: usize, t: f64) -> Result<(Self, Self), MvarError>;
}

/// Values and Jacobian of the zero constraints over the full domain.
trait ZeroEvaluator {
    fn eval_zero(&self, params: &[f64]) -> Result<(DVector<f64>, DMatrix<f64>), MvarError>;

    /// Whether every sign constraint holds at `params`.
    fn signs_hold(&self, params: &[f64]) -> Result<bool, MvarError>;
}

fn subdivision_solve<N: SubdivisionNode, E: ZeroEvaluator>(
    root: N,
    evaluator: &E,
    config: &ZeroSolverConfig,
) -> Result<ZeroSet, MvarError> {
    let domain = root.region();
    let mut stack = vec![root];
    let mut points = Vec::new();
    let mut degenerate = false;
    let mut iteration = 0usize;

    while let Some(mut node) = stack.pop() {
        iteration += 1;
        let region = node.region();
        let (axis, size) = largest_side(&region);
        let at_depth_limit = node.depth() >= config.max_depth;
        let is_leaf = size < config.subdiv_tol || at_depth_limit;

        match node.classify(config)? {
            NodeClass::Pruned => {
                log::trace!("It {iteration}: pruned {region:?}");
                continue;
            }
            NodeClass::IdenticallyZero { signs_pending } => {
                if signs_pending && !is_leaf {
                    log::debug!(
                        "It {iteration}: constraints vanish over {region:?}, signs undecided"
                    );
                    split_onto(&node, &region, axis, &mut stack)?;
                    continue;
                }
                let center = region_center(&region);
                if signs_pending && !evaluator.signs_hold(&center)? {
                    log::trace!("It {iteration}: sign constraints fail at {center:?}");
                    continue;
                }
                log::debug!("It {iteration}: constraints vanish identically over {region:?}");
                degenerate = true;
                points.push(ZeroPoint {
                    params: center,
                    kind: RootKind::Degenerate,
                });
                continue;
            }
            NodeClass::Active => {}
        }

        if config.domain_clipping && !is_leaf {
            match node.clip()? {
                Clipped::Empty => {
                    log::trace!("It {iteration}: clipped away {region:?}");
                    continue;
                }
                Clipped::Shrunk(shrunk) => {
                    log::debug!("It {iteration}: clipped {region:?} to {:?}", shrunk.region());
                    stack.push(shrunk);
                    continue;
                }
                Clipped::Unchanged => {}
            }
        }

        if config.grad_preconditioning && node.preconditioned_prune()? {
            log::trace!("It {iteration}: preconditioned prune of {region:?}");
            continue;
        }

        if is_leaf {
            if at_depth_limit {
                log::warn!("Depth limit {} reached at {region:?}", config.max_depth);
            }
            if let Some(point) = leaf_root(evaluator, &region, &domain, config)? {
                degenerate |= point.kind == RootKind::Degenerate;
                points.push(point);
            }
            continue;
        }

        if config.refines() && config.normal_cone_test && node.has_single_solution()? {
            let start = region_center(&region);
            let slack = 1e-12 * size.max(1.0);
            if let Some(point) = newton(evaluator, &start, &region, slack, &domain, config)? {
                log::debug!("It {iteration}: single solution {:?}", point.params);
                degenerate |= point.kind == RootKind::Degenerate;
                points.push(point);
                continue;
            }
            log::debug!("It {iteration}: Newton failed in a single solution region");
        }

        log::debug!("It {iteration}: subdividing {region:?} along {axis}");
        split_onto(&node, &region, axis, &mut stack)?;
    }

    let points = filter_identical_set(points, config.identical_tol());
    log::info!(
        "Found {} solutions in {iteration} iterations (degenerate: {degenerate})",
        points.len()
    );
    Ok(ZeroSet {
        points,
        degenerate,
        iterations: iteration,
    })
}

/// Halve `node` along `axis`, lower half on top of the stack.
fn split_onto<N: SubdivisionNode>(
    node: &N,
    region: &[(f64, f64)],
    axis: usize,
    stack: &mut Vec<N>,
) -> Result<(), MvarError> {
    let mid = 0.5 * (region[axis].0 + region[axis].1);
    let (lower, upper) = node.split(axis, mid)?;
    stack.push(upper);
    stack.push(lower);
    Ok(())
}

fn region_center(region: &[(f64, f64)]) -> AxisVec<f64> {
    region.iter().map(|&(min, max)| 0.5 * (min + max)).collect()
}

fn largest_side(region: &[(f64, f64)]) -> (usize, f64) {
    let mut largest_dim = 0;
    let mut largest_length = 0.0;
    for (i, &(min, max)) in region.iter().enumerate() {
        if max - min > largest_length {
            largest_length = max - min;
            largest_dim = i;
        }
    }
    (largest_dim, largest_length)
}

fn leaf_root<E: ZeroEvaluator>(
    evaluator: &E,
    region: &[(f64, f64)],
    domain: &[(f64, f64)],
    config: &ZeroSolverConfig,
) -> Result<Option<ZeroPoint>, MvarError> {
    let center = region_center(region);
    if !config.refines() {
        return Ok(evaluator.signs_hold(&center)?.then_some(ZeroPoint {
            params: center,
            kind: RootKind::Isolated,
        }));
    }
    newton(evaluator, &center, region, config.subdiv_tol, domain, config)
}

/// Newton iterations from `start`, solving each step in the least squares sense.
/// Succeeds when the residual drops below `numeric_tol` within `slack` of `region`.
fn newton<E: ZeroEvaluator>(
    evaluator: &E,
    start: &[f64],
    region: &[(f64, f64)],
    slack: f64,
    domain: &[(f64, f64)],
    config: &ZeroSolverConfig,
) -> Result<Option<ZeroPoint>, MvarError> {
    let mut x: AxisVec<f64> = start.iter().copied().collect();
    for _ in 0..=config.max_newton_iters {
        let (f, jacobian) = evaluator.eval_zero(&x)?;
        if f.amax() <= config.numeric_tol {
            let inside = x
                .iter()
                .zip(region)
                .all(|(&xi, &(min, max))| xi >= min - slack && xi <= max + slack);
            if !inside || !evaluator.signs_hold(&x)? {
                return Ok(None);
            }
            return Ok(Some(ZeroPoint {
                kind: classify_root(&jacobian),
                params: x,
            }));
        }

        let svd = jacobian.svd(true, true);
        let eps = 1e-12 * svd.singular_values.max();
        let Ok(step) = svd.solve(&(-f), eps) else {
            return Ok(None);
        };
        for (d, xi) in x.iter_mut().enumerate() {
            *xi = (*xi + step[d]).clamp(domain[d].0, domain[d].1);
        }
    }
    log::trace!("Newton did not converge from {start:?}");
    Ok(None)
}

const DEGENERATE_CONDITION: f64 = 1e-7;

fn classify_root(jacobian: &DMatrix<f64>) -> RootKind {
    let singular_values = jacobian.singular_values();
    let max = singular_values.max();
    let min = singular_values.min();
    if max == 0.0 || min / max < DEGENERATE_CONDITION {
        RootKind::Degenerate
    } else {
        RootKind::Isolated
    }
}

struct ConstraintEvaluator<'a> {
    dim: usize,
    zeros: Vec<(&'a Multivariate, Vec<Multivariate>)>,
    signs: Vec<(&'a Multivariate, ConstraintKind)>,
}

impl<'a> ConstraintEvaluator<'a> {
    fn new(constraints: &'a [Constraint]) -> Result<Self, MvarError> {
        let mut zeros = Vec::new();
        let mut signs = Vec::new();
        for c in constraints {
            match c.kind {
                ConstraintKind::Zero => zeros.push((&c.mv, c.mv.partial_derivatives()?)),
                kind => signs.push((&c.mv, kind)),
            }
        }
        Ok(Self {
            dim: constraints[0].mv.dim(),
            zeros,
            signs,
        })
    }
}

impl ZeroEvaluator for ConstraintEvaluator<'_> {
    fn eval_zero(&self, params: &[f64]) -> Result<(DVector<f64>, DMatrix<f64>), MvarError> {
        let mut f = DVector::zeros(self.zeros.len());
        let mut jacobian = DMatrix::zeros(self.zeros.len(), self.dim);
        for (i, (mv, partials)) in self.zeros.iter().enumerate() {
            f[i] = mv.eval_projected(params)?[0];
            for (d, partial) in partials.iter().enumerate() {
                jacobian[(i, d)] = partial.eval_projected(params)?[0];
            }
        }
        Ok((f, jacobian))
    }

    fn signs_hold(&self, params: &[f64]) -> Result<bool, MvarError> {
        for (mv, kind) in &self.signs {
            let value = mv.eval_projected(params)?[0];
            if !sign_holds(*kind, value) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn sign_holds(kind: ConstraintKind, value: f64) -> bool {
    match kind {
        ConstraintKind::Zero => true,
        ConstraintKind::Positive => value > 0.0,
        ConstraintKind::Negative => value < 0.0,
    }
}

/// Decide a constraint over a region from its value range. `None` prunes the region.
fn range_verdict(
    kind: ConstraintKind,
    (min, max): (f64, f64),
    zero_eps: f64,
) -> Option<RangeVerdict> {
    match kind {
        ConstraintKind::Zero if min > 0.0 || max < 0.0 => None,
        ConstraintKind::Zero if min >= -zero_eps && max <= zero_eps => {
            Some(RangeVerdict::Vanishes)
        }
        ConstraintKind::Positive if max <= 0.0 => None,
        ConstraintKind::Positive if min > 0.0 => Some(RangeVerdict::Satisfied),
        ConstraintKind::Negative if min >= 0.0 => None,
        ConstraintKind::Negative if max < 0.0 => Some(RangeVerdict::Satisfied),
        _ => Some(RangeVerdict::Undecided),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeVerdict {
    Vanishes,
    Satisfied,
    Undecided,
}

// Clipping only restarts a region that shrinks at least this much along some axis.
const CLIP_SHRINK_RATIO: f64 = 0.8;

/// Axes along which the convex hulls of the non-rational `zeros` shrink `region` enough to
/// restart it, as `(axis, lo, hi)`. `None` when some hull misses zero.
fn clip_axes<'a>(
    zeros: impl Iterator<Item = &'a Multivariate>,
    region: &[(f64, f64)],
) -> Result<Option<AxisVec<(usize, f64, f64)>>, MvarError> {
    let mut clipped: AxisVec<(f64, f64)> = region.iter().copied().collect();
    for mv in zeros.filter(|mv| !mv.is_rational()) {
        let Some(bounds) = clipping::clip_zero_region(mv, region)? else {
            return Ok(None);
        };
        for (c, b) in clipped.iter_mut().zip(bounds) {
            c.0 = c.0.max(b.0);
            c.1 = c.1.min(b.1);
            if c.0 > c.1 {
                return Ok(None);
            }
        }
    }

    let mut shrunk_axes = AxisVec::new();
    for (axis, (&(min, max), &(lo, hi))) in region.iter().zip(&clipped).enumerate() {
        let width = max - min;
        if width <= 0.0 || hi - lo > CLIP_SHRINK_RATIO * width {
            continue;
        }
        // Keep a sliver around roots on the clipped boundary.
        let pad = (1e-9 * width).max(0.5e-6 * width - 0.5 * (hi - lo)).max(0.0);
        shrunk_axes.push((axis, (lo - pad).max(min), (hi + pad).min(max)));
    }
    Ok(Some(shrunk_axes))
}

fn restrict_region(
    mv: &Multivariate,
    axes: &[(usize, f64, f64)],
) -> Result<Multivariate, MvarError> {
    let mut mv = mv.clone();
    for &(axis, lo, hi) in axes {
        mv = mv.region_from_mv(lo, hi, axis)?;
    }
    Ok(mv)
}

/// Gradient cone test over the gradient boxes of a square system, one row per constraint.
/// With `g_i / |g_i|` within `rho_i` of the unit center `c_i` of row i, every Jacobian with
/// rows drawn from the boxes is regular when `sqrt(sum rho_i^2) < sigma_min(C)`. By the
/// mean value theorem two roots would make one of those Jacobians singular.
fn gradient_cones_regular(rows: &[AxisVec<(f64, f64)>]) -> bool {
    let dim = rows.len();
    let mut centers = DMatrix::zeros(dim, dim);
    let mut radius_sq = 0.0;
    for (i, row) in rows.iter().enumerate() {
        if row.len() != dim || row.iter().any(|&(min, max)| !min.is_finite() || !max.is_finite()) {
            return false;
        }
        let mut center = DVector::zeros(dim);
        let mut half_diag_sq = 0.0;
        for (d, &(min, max)) in row.iter().enumerate() {
            center[d] = 0.5 * (min + max);
            half_diag_sq += (0.5 * (max - min)).powi(2);
        }
        let norm = center.norm();
        let half_diag = half_diag_sq.sqrt();
        if half_diag >= norm {
            return false;
        }
        radius_sq += (2.0 * half_diag / norm).powi(2);
        centers.set_row(i, &(center / norm).transpose());
    }
    radius_sq.sqrt() < centers.singular_values().min()
}

/// Bound `J(center)^-1 F` over the control points of the square non-rational system `zeros`,
/// which decorrelates the constraints near a regular root. True when some row excludes zero.
fn preconditioned_control_prune(
    zeros: &[Multivariate],
    region: &[(f64, f64)],
) -> Result<bool, MvarError> {
    let dim = region.len();
    if zeros.len() != dim || zeros.iter().any(|mv| mv.is_rational()) {
        return Ok(false);
    }
    let center = region_center(region);
    let mut jacobian = DMatrix::zeros(dim, dim);
    for (i, mv) in zeros.iter().enumerate() {
        for (d, g) in mv.gradient(&center)?.into_iter().enumerate() {
            jacobian[(i, d)] = g;
        }
    }
    let Some(inverse) = jacobian.try_inverse() else {
        return Ok(false);
    };

    let compatible = make_all_compatible(zeros)?;
    let len = compatible[0].mesh_len();
    for i in 0..dim {
        let mut range = (f64::INFINITY, f64::NEG_INFINITY);
        for k in 0..len {
            let value: f64 = (0..dim)
                .map(|j| inverse[(i, j)] * compatible[j].points(1)[k])
                .sum();
            range = (range.0.min(value), range.1.max(value));
        }
        if range.0 > 0.0 || range.1 < 0.0 {
            return Ok(true);
        }
    }
    Ok(false)
}

struct RegularNode {
    constraints: Vec<Constraint>,
    depth: usize,
}

impl RegularNode {
    fn zero_mvs(&self) -> impl Iterator<Item = &Multivariate> {
        self.constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::Zero)
            .map(|c| &c.mv)
    }
}

impl SubdivisionNode for RegularNode {
    fn region(&self) -> AxisVec<(f64, f64)> {
        self.constraints[0].mv.domain_all()
    }

    fn depth(&self) -> usize {
        self.depth
    }

    /// Drops the constraints decided over the region. A node left with sign constraints
    /// only descends from a region where every zero constraint vanished.
    fn classify(&mut self, config: &ZeroSolverConfig) -> Result<NodeClass, MvarError> {
        let mut active = Vec::with_capacity(self.constraints.len());
        for c in self.constraints.drain(..) {
            let range = c.mv.bbox()[0];
            match range_verdict(c.kind, range, config.zero_eps) {
                None => return Ok(NodeClass::Pruned),
                Some(RangeVerdict::Vanishes | RangeVerdict::Satisfied) => {}
                Some(RangeVerdict::Undecided) => active.push(c),
            }
        }
        self.constraints = active;
        let zeros_left = self
            .constraints
            .iter()
            .any(|c| c.kind == ConstraintKind::Zero);
        if !zeros_left {
            return Ok(NodeClass::IdenticallyZero {
                signs_pending: !self.constraints.is_empty(),
            });
        }
        Ok(NodeClass::Active)
    }

    fn clip(&self) -> Result<Clipped<Self>, MvarError> {
        let region = self.region();
        let Some(shrunk_axes) = clip_axes(self.zero_mvs(), &region)? else {
            return Ok(Clipped::Empty);
        };
        if shrunk_axes.is_empty() {
            return Ok(Clipped::Unchanged);
        }
        let mut constraints = self.constraints.clone();
        for c in &mut constraints {
            c.mv = restrict_region(&c.mv, &shrunk_axes)?;
        }
        Ok(Clipped::Shrunk(RegularNode {
            constraints,
            depth: self.depth + 1,
        }))
    }

    fn has_single_solution(&self) -> Result<bool, MvarError> {
        let dim = self.region().len();
        let zeros: Vec<&Multivariate> = self.zero_mvs().collect();
        if zeros.len() != dim {
            return Ok(false);
        }
        let mut rows = Vec::with_capacity(dim);
        for mv in zeros {
            let mut row = AxisVec::with_capacity(dim);
            for d in 0..dim {
                row.push(mv.derive(d)?.bbox()[0]);
            }
            rows.push(row);
        }
        Ok(gradient_cones_regular(&rows))
    }

    fn preconditioned_prune(&self) -> Result<bool, MvarError> {
        let zeros: Vec<Multivariate> = self.zero_mvs().cloned().collect();
        preconditioned_control_prune(&zeros, &self.region())
    }

    fn split(&self, axis: usize, t: f64) -> Result<(Self, Self), MvarError> {
        let mut lower = Vec::with_capacity(self.constraints.len());
        let mut upper = Vec::with_capacity(self.constraints.len());
        for c in &self.constraints {
            let (lo, hi) = c.mv.subdivide(axis, t)?;
            lower.push(Constraint::new(lo, c.kind));
            upper.push(Constraint::new(hi, c.kind));
        }
        Ok((
            RegularNode {
                constraints: lower,
                depth: self.depth + 1,
            },
            RegularNode {
                constraints: upper,
                depth: self.depth + 1,
            },
        ))
    }
}

struct TreeNode<'a> {
    tree: &'a ExprTree,
    leaves: Vec<Multivariate>,
    depth: usize,
}

impl TreeNode<'_> {
    fn zero_ids(&self) -> Vec<ExprId> {
        self.tree
            .constraints()
            .iter()
            .filter(|(_, kind)| *kind == ConstraintKind::Zero)
            .map(|&(id, _)| id)
            .collect()
    }

    /// Leaf indices of the zero constraints that are plain scalar leaves.
    fn zero_leaves(&self) -> impl Iterator<Item = usize> + '_ {
        self.zero_ids()
            .into_iter()
            .filter_map(|id| self.tree.scalar_leaf(id))
    }

    fn gradient_bounds(&self) -> Result<Vec<IntervalGrads>, MvarError> {
        let dim = self.region().len();
        let mut leaf_grads = Vec::with_capacity(self.leaves.len());
        for leaf in &self.leaves {
            let mut grads = Vec::with_capacity(dim);
            for d in 0..dim {
                grads.push(leaf.derive(d)?.bbox());
            }
            leaf_grads.push(grads);
        }
        let boxes = self.tree.interval_bboxes(&self.leaves)?;
        Ok(self.tree.interval_gradients(&boxes, &leaf_grads))
    }
}

impl SubdivisionNode for TreeNode<'_> {
    fn region(&self) -> AxisVec<(f64, f64)> {
        self.leaves[0].domain_all()
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn classify(&mut self, config: &ZeroSolverConfig) -> Result<NodeClass, MvarError> {
        let boxes = self.tree.interval_bboxes(&self.leaves)?;
        let mut zeros_left = false;
        let mut signs_pending = false;
        for &(id, kind) in self.tree.constraints() {
            let range = self.tree.bound(&boxes, id);
            log::trace!("{kind:?} constraint bounded by {range:?}");
            match range_verdict(kind, range, config.zero_eps) {
                None => return Ok(NodeClass::Pruned),
                Some(RangeVerdict::Undecided) if kind == ConstraintKind::Zero => zeros_left = true,
                Some(RangeVerdict::Undecided) => signs_pending = true,
                Some(_) => {}
            }
        }
        Ok(if zeros_left {
            NodeClass::Active
        } else {
            NodeClass::IdenticallyZero { signs_pending }
        })
    }

    /// Clips with the zero constraints that are scalar leaves of the tree.
    fn clip(&self) -> Result<Clipped<Self>, MvarError> {
        let region = self.region();
        let Some(shrunk_axes) = clip_axes(self.zero_leaves().map(|i| &self.leaves[i]), &region)?
        else {
            return Ok(Clipped::Empty);
        };
        if shrunk_axes.is_empty() {
            return Ok(Clipped::Unchanged);
        }
        let leaves = self
            .leaves
            .iter()
            .map(|leaf| restrict_region(leaf, &shrunk_axes))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Clipped::Shrunk(TreeNode {
            tree: self.tree,
            leaves,
            depth: self.depth + 1,
        }))
    }

    fn has_single_solution(&self) -> Result<bool, MvarError> {
        let dim = self.region().len();
        let zeros = self.zero_ids();
        if zeros.len() != dim {
            return Ok(false);
        }
        let grads = self.gradient_bounds()?;
        let rows: Vec<AxisVec<(f64, f64)>> = zeros
            .iter()
            .map(|&id| grads[ExprTree::dual_index(id)][0].clone())
            .collect();
        Ok(gradient_cones_regular(&rows))
    }

    /// Uses the control points when every zero constraint is a scalar leaf. Otherwise the
    /// centers of the gradient boxes precondition the interval bounds of the constraints.
    fn preconditioned_prune(&self) -> Result<bool, MvarError> {
        let region = self.region();
        let dim = region.len();
        let zeros = self.zero_ids();
        if zeros.len() != dim {
            return Ok(false);
        }
        let leaves: Vec<Multivariate> = self.zero_leaves().map(|i| self.leaves[i].clone()).collect();
        if leaves.len() == dim {
            return preconditioned_control_prune(&leaves, &region);
        }

        let grads = self.gradient_bounds()?;
        let mut centers = DMatrix::zeros(dim, dim);
        for (i, &id) in zeros.iter().enumerate() {
            for (d, &(min, max)) in grads[ExprTree::dual_index(id)][0].iter().enumerate() {
                centers[(i, d)] = 0.5 * (min + max);
            }
        }
        if !centers.iter().all(|x| x.is_finite()) {
            return Ok(false);
        }
        let Some(inverse) = centers.try_inverse() else {
            return Ok(false);
        };
        let boxes = self.tree.interval_bboxes(&self.leaves)?;
        for i in 0..dim {
            let mut range = (0.0, 0.0);
            for (j, &id) in zeros.iter().enumerate() {
                let k = inverse[(i, j)];
                range = interval_add(range, interval_mul((k, k), self.tree.bound(&boxes, id)));
            }
            if range.0 > 0.0 || range.1 < 0.0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn split(&self, axis: usize, t: f64) -> Result<(Self, Self), MvarError> {
        let mut lower = Vec::with_capacity(self.leaves.len());
        let mut upper = Vec::with_capacity(self.leaves.len());
        for leaf in &self.leaves {
            let (lo, hi) = leaf.subdivide(axis, t)?;
            lower.push(lo);
            upper.push(hi);
        }
        Ok((
            TreeNode {
                tree: self.tree,
                leaves: lower,
                depth: self.depth + 1,
            },
            TreeNode {
                tree: self.tree,
                leaves: upper,
                depth: self.depth + 1,
            },
        ))
    }
}

struct TreeEvaluator<'a> {
    tree: &'a ExprTree,
    partials: Vec<Vec<Multivariate>>,
}

impl<'a> TreeEvaluator<'a> {
    fn new(tree: &'a ExprTree) -> Result<Self, MvarError> {
        let partials = tree
            .leaves()
            .iter()
            .map(|leaf| leaf.partial_derivatives())
            .collect::<Result<_, _>>()?;
        Ok(Self { tree, partials })
    }
}

impl ZeroEvaluator for TreeEvaluator<'_> {
    fn eval_zero(&self, params: &[f64]) -> Result<(DVector<f64>, DMatrix<f64>), MvarError> {
        let duals = self.tree.eval_dual(&self.partials, params)?;
        let zeros: Vec<ExprId> = self
            .tree
            .constraints()
            .iter()
            .filter(|(_, kind)| *kind == ConstraintKind::Zero)
            .map(|&(id, _)| id)
            .collect();
        let mut f = DVector::zeros(zeros.len());
        let mut jacobian = DMatrix::zeros(zeros.len(), params.len());
        for (i, &id) in zeros.iter().enumerate() {
            let dual = &duals[ExprTree::dual_index(id)];
            f[i] = dual.values[0];
            for d in 0..params.len() {
                jacobian[(i, d)] = dual.grads[0][d];
            }
        }
        Ok((f, jacobian))
    }

    fn signs_hold(&self, params: &[f64]) -> Result<bool, MvarError> {
        let duals = self.tree.eval_dual(&self.partials, params)?;
        Ok(self
            .tree
            .constraints()
            .iter()
            .all(|&(id, kind)| sign_holds(kind, duals[ExprTree::dual_index(id)].values[0])))
    }
}
