//! Deferred expressions over multivariates.
//!
//! Instead of multiplying out constraint functions symbolically, an [`ExprTree`] keeps the
//! leaf multivariates and the operations combining them. The solver subdivides only the
//! leaves and bounds every node by interval arithmetic. Nodes are stored in an arena in
//! creation order, so a node used by several constraints is bounded once per region.

use smallvec::SmallVec;

use crate::{
    AxisVec, BBox, ConstraintKind, Multivariate, MvarError, common_domain, cross_prod_bbox,
    dot_prod_bbox, interval_add, interval_mul, interval_sub,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExprId(usize);

#[derive(Clone, Copy, Debug, PartialEq)]
enum ExprOp {
    Leaf(usize),
    Add(ExprId, ExprId),
    Sub(ExprId, ExprId),
    /// Coordinate-wise product; a scalar right operand multiplies every coordinate.
    Mult(ExprId, ExprId),
    DotProd(ExprId, ExprId),
    CrossProd(ExprId, ExprId),
    Scale(ExprId, f64),
    Coord(ExprId, usize),
}

#[derive(Clone, Debug, Default)]
pub struct ExprTree {
    ops: Vec<ExprOp>,
    // Number of coordinates of each node's value.
    coords: Vec<usize>,
    leaves: Vec<Multivariate>,
    constraints: Vec<(ExprId, ConstraintKind)>,
}

/// Value and gradient of every coordinate of a node at one parameter point.
#[derive(Clone, Debug)]
pub(crate) struct Dual {
    pub values: SmallVec<[f64; 4]>,
    pub grads: SmallVec<[AxisVec<f64>; 4]>,
}

impl Dual {
    fn zeros(coords: usize, dim: usize) -> Self {
        Self {
            values: SmallVec::from_elem(0.0, coords),
            grads: (0..coords).map(|_| AxisVec::from_elem(0.0, dim)).collect(),
        }
    }

    /// Accumulate `sign * a[ca] * b[cb]` into coordinate `c`.
    fn add_product(&mut self, c: usize, sign: f64, a: &Dual, ca: usize, b: &Dual, cb: usize) {
        self.values[c] += sign * a.values[ca] * b.values[cb];
        for d in 0..self.grads[c].len() {
            self.grads[c][d] +=
                sign * (a.grads[ca][d] * b.values[cb] + a.values[ca] * b.grads[cb][d]);
        }
    }
}

impl ExprTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// One leaf per constraint, no sharing, so bounds are taken per constraint just as in
    /// the regular solver. Build the tree with [`Self::leaf`] and the operation builders
    /// instead to keep products and differences of shared operands unexpanded.
    pub fn from_constraints(constraints: &[crate::Constraint]) -> Result<Self, MvarError> {
        let mut tree = Self::new();
        for constraint in constraints {
            let id = tree.leaf(constraint.mv.clone())?;
            tree.constrain(id, constraint.kind)?;
        }
        Ok(tree)
    }

    pub fn leaf(&mut self, mv: Multivariate) -> Result<ExprId, MvarError> {
        if let Some(first) = self.leaves.first()
            && first.dim() != mv.dim()
        {
            return Err(MvarError::DimensionMismatch {
                expected: first.dim(),
                actual: mv.dim(),
            });
        }
        let coords = mv.num_coords();
        self.leaves.push(mv);
        Ok(self.push(ExprOp::Leaf(self.leaves.len() - 1), coords))
    }

    pub fn add(&mut self, a: ExprId, b: ExprId) -> Result<ExprId, MvarError> {
        let coords = self.same_coords(a, b)?;
        Ok(self.push(ExprOp::Add(a, b), coords))
    }

    pub fn sub(&mut self, a: ExprId, b: ExprId) -> Result<ExprId, MvarError> {
        let coords = self.same_coords(a, b)?;
        Ok(self.push(ExprOp::Sub(a, b), coords))
    }

    pub fn mult(&mut self, a: ExprId, b: ExprId) -> Result<ExprId, MvarError> {
        let coords = if self.coords[b.0] == 1 {
            self.coords[a.0]
        } else {
            self.same_coords(a, b)?
        };
        Ok(self.push(ExprOp::Mult(a, b), coords))
    }

    pub fn dot_prod(&mut self, a: ExprId, b: ExprId) -> Result<ExprId, MvarError> {
        self.same_coords(a, b)?;
        Ok(self.push(ExprOp::DotProd(a, b), 1))
    }

    pub fn cross_prod(&mut self, a: ExprId, b: ExprId) -> Result<ExprId, MvarError> {
        for id in [a, b] {
            if self.coords[id.0] > 3 {
                return Err(MvarError::InvalidPointType {
                    coords: self.coords[id.0],
                });
            }
        }
        Ok(self.push(ExprOp::CrossProd(a, b), 3))
    }

    pub fn scale(&mut self, a: ExprId, scale: f64) -> ExprId {
        let coords = self.coords[a.0];
        self.push(ExprOp::Scale(a, scale), coords)
    }

    /// Coordinate `coord` (zero based) of a vector node.
    pub fn coord(&mut self, a: ExprId, coord: usize) -> Result<ExprId, MvarError> {
        if coord >= self.coords[a.0] {
            return Err(MvarError::DimensionMismatch {
                expected: self.coords[a.0],
                actual: coord + 1,
            });
        }
        Ok(self.push(ExprOp::Coord(a, coord), 1))
    }

    /// Require the scalar node `id` to satisfy `kind`.
    pub fn constrain(&mut self, id: ExprId, kind: ConstraintKind) -> Result<(), MvarError> {
        if self.coords[id.0] != 1 {
            return Err(MvarError::DimensionMismatch {
                expected: 1,
                actual: self.coords[id.0],
            });
        }
        self.constraints.push((id, kind));
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.leaves.first().map_or(0, |l| l.dim())
    }

    pub fn num_nodes(&self) -> usize {
        self.ops.len()
    }

    pub(crate) fn leaves(&self) -> &[Multivariate] {
        &self.leaves
    }

    pub(crate) fn constraints(&self) -> &[(ExprId, ConstraintKind)] {
        &self.constraints
    }

    pub(crate) fn validate(&self) -> Result<(), MvarError> {
        common_domain(&self.leaves)?;
        if !self
            .constraints
            .iter()
            .any(|&(_, kind)| kind == ConstraintKind::Zero)
        {
            return Err(MvarError::UnderdefinedSystem {
                num_vars: self.dim(),
                num_constraints: 0,
            });
        }
        Ok(())
    }

    fn push(&mut self, op: ExprOp, coords: usize) -> ExprId {
        self.ops.push(op);
        self.coords.push(coords);
        ExprId(self.ops.len() - 1)
    }

    fn same_coords(&self, a: ExprId, b: ExprId) -> Result<usize, MvarError> {
        let (ca, cb) = (self.coords[a.0], self.coords[b.0]);
        if ca != cb {
            return Err(MvarError::DimensionMismatch {
                expected: ca,
                actual: cb,
            });
        }
        Ok(ca)
    }

    /// Enclosure of the scalar node `id`, given the leaves restricted to one region.
    pub(crate) fn bound(&self, boxes: &[BBox], id: ExprId) -> (f64, f64) {
        boxes[id.0][0]
    }

    /// Enclosures of every node over the region the `leaves` are restricted to.
    pub(crate) fn interval_bboxes(&self, leaves: &[Multivariate]) -> Result<Vec<BBox>, MvarError> {
        let mut boxes: Vec<BBox> = Vec::with_capacity(self.ops.len());
        for &op in &self.ops {
            let bbox = match op {
                ExprOp::Leaf(i) => leaves[i].bbox(),
                ExprOp::Add(a, b) => zip_intervals(&boxes[a.0], &boxes[b.0], interval_add),
                ExprOp::Sub(a, b) => zip_intervals(&boxes[a.0], &boxes[b.0], interval_sub),
                ExprOp::Mult(a, b) => {
                    let (ba, bb) = (&boxes[a.0], &boxes[b.0]);
                    if bb.dim() == 1 && ba.dim() != 1 {
                        BBox(ba.0.iter().map(|&x| interval_mul(x, bb[0])).collect())
                    } else {
                        zip_intervals(ba, bb, interval_mul)
                    }
                }
                ExprOp::DotProd(a, b) => dot_prod_bbox(&boxes[a.0], &boxes[b.0])?,
                ExprOp::CrossProd(a, b) => {
                    cross_prod_bbox(&pad_to_3(&boxes[a.0]), &pad_to_3(&boxes[b.0]))?
                }
                ExprOp::Scale(a, k) => BBox(
                    boxes[a.0]
                        .0
                        .iter()
                        .map(|&x| interval_mul(x, (k, k)))
                        .collect(),
                ),
                ExprOp::Coord(a, c) => BBox::new(&[boxes[a.0][c]]),
            };
            boxes.push(bbox);
        }
        Ok(boxes)
    }

    /// Values and gradients of every node at `params`. `partials[leaf][axis]` holds the
    /// partial derivatives of each leaf over the full domain.
    pub(crate) fn eval_dual(
        &self,
        partials: &[Vec<Multivariate>],
        params: &[f64],
    ) -> Result<Vec<Dual>, MvarError> {
        let dim = params.len();
        let mut duals: Vec<Dual> = Vec::with_capacity(self.ops.len());
        for (n, &op) in self.ops.iter().enumerate() {
            let coords = self.coords[n];
            let mut out = Dual::zeros(coords, dim);
            match op {
                ExprOp::Leaf(i) => {
                    let value = self.leaves[i].eval_projected(params)?;
                    for c in 0..coords {
                        out.values[c] = value[c];
                    }
                    for (d, partial) in partials[i].iter().enumerate() {
                        let grad = partial.eval_projected(params)?;
                        for c in 0..coords {
                            out.grads[c][d] = grad[c];
                        }
                    }
                }
                ExprOp::Add(a, b) | ExprOp::Sub(a, b) => {
                    let sign = if matches!(op, ExprOp::Add(..)) { 1.0 } else { -1.0 };
                    let (da, db) = (&duals[a.0], &duals[b.0]);
                    for c in 0..coords {
                        out.values[c] = da.values[c] + sign * db.values[c];
                        for d in 0..dim {
                            out.grads[c][d] = da.grads[c][d] + sign * db.grads[c][d];
                        }
                    }
                }
                ExprOp::Mult(a, b) => {
                    let (da, db) = (&duals[a.0], &duals[b.0]);
                    let broadcast = db.values.len() == 1;
                    for c in 0..coords {
                        out.add_product(c, 1.0, da, c, db, if broadcast { 0 } else { c });
                    }
                }
                ExprOp::DotProd(a, b) => {
                    let (da, db) = (&duals[a.0], &duals[b.0]);
                    for c in 0..da.values.len() {
                        out.add_product(0, 1.0, da, c, db, c);
                    }
                }
                ExprOp::CrossProd(a, b) => {
                    let da = pad_dual_to_3(&duals[a.0], dim);
                    let db = pad_dual_to_3(&duals[b.0], dim);
                    for (c, (i, j)) in [(1, 2), (2, 0), (0, 1)].into_iter().enumerate() {
                        out.add_product(c, 1.0, &da, i, &db, j);
                        out.add_product(c, -1.0, &da, j, &db, i);
                    }
                }
                ExprOp::Scale(a, k) => {
                    let da = &duals[a.0];
                    for c in 0..coords {
                        out.values[c] = k * da.values[c];
                        for d in 0..dim {
                            out.grads[c][d] = k * da.grads[c][d];
                        }
                    }
                }
                ExprOp::Coord(a, coord) => {
                    let da = &duals[a.0];
                    out.values[0] = da.values[coord];
                    out.grads[0] = da.grads[coord].clone();
                }
            }
            duals.push(out);
        }
        Ok(duals)
    }

    pub(crate) fn dual_index(id: ExprId) -> usize {
        id.0
    }

    /// Leaf index of `id` when the node is a scalar leaf.
    pub(crate) fn scalar_leaf(&self, id: ExprId) -> Option<usize> {
        match self.ops[id.0] {
            ExprOp::Leaf(i) if self.coords[id.0] == 1 => Some(i),
            _ => None,
        }
    }

    /// Enclosures of the gradient of every coordinate of every node, by the interval product
    /// rule. `boxes` are the node enclosures from [`Self::interval_bboxes`] and
    /// `leaf_grads[leaf][axis]` encloses the partial derivatives of each leaf over the
    /// same region.
    pub(crate) fn interval_gradients(
        &self,
        boxes: &[BBox],
        leaf_grads: &[Vec<BBox>],
    ) -> Vec<IntervalGrads> {
        let dim = leaf_grads.first().map_or(0, |g| g.len());
        let zero: AxisVec<(f64, f64)> = AxisVec::from_elem((0.0, 0.0), dim);
        let mut grads: Vec<IntervalGrads> = Vec::with_capacity(self.ops.len());
        for (n, &op) in self.ops.iter().enumerate() {
            let coords = self.coords[n];
            let out: IntervalGrads = match op {
                ExprOp::Leaf(i) => (0..coords)
                    .map(|c| (0..dim).map(|d| leaf_grads[i][d][c]).collect())
                    .collect(),
                ExprOp::Add(a, b) => (0..coords)
                    .map(|c| zip_axes(&grads[a.0][c], &grads[b.0][c], interval_add))
                    .collect(),
                ExprOp::Sub(a, b) => (0..coords)
                    .map(|c| zip_axes(&grads[a.0][c], &grads[b.0][c], interval_sub))
                    .collect(),
                ExprOp::Mult(a, b) => {
                    let broadcast = self.coords[b.0] == 1;
                    (0..coords)
                        .map(|c| {
                            let cb = if broadcast { 0 } else { c };
                            product_grad(
                                (&grads[a.0][c], boxes[a.0][c]),
                                (&grads[b.0][cb], boxes[b.0][cb]),
                            )
                        })
                        .collect()
                }
                ExprOp::DotProd(a, b) => {
                    let mut sum = zero.clone();
                    for c in 0..self.coords[a.0] {
                        let term = product_grad(
                            (&grads[a.0][c], boxes[a.0][c]),
                            (&grads[b.0][c], boxes[b.0][c]),
                        );
                        sum = zip_axes(&sum, &term, interval_add);
                    }
                    smallvec::smallvec![sum]
                }
                ExprOp::CrossProd(a, b) => {
                    let (ba, bb) = (pad_to_3(&boxes[a.0]), pad_to_3(&boxes[b.0]));
                    let pad = |g: &IntervalGrads| {
                        let mut g = g.clone();
                        while g.len() < 3 {
                            g.push(zero.clone());
                        }
                        g
                    };
                    let (ga, gb) = (pad(&grads[a.0]), pad(&grads[b.0]));
                    [(1, 2), (2, 0), (0, 1)]
                        .into_iter()
                        .map(|(i, j)| {
                            let plus = product_grad((&ga[i], ba[i]), (&gb[j], bb[j]));
                            let minus = product_grad((&ga[j], ba[j]), (&gb[i], bb[i]));
                            zip_axes(&plus, &minus, interval_sub)
                        })
                        .collect()
                }
                ExprOp::Scale(a, k) => grads[a.0]
                    .iter()
                    .map(|g| g.iter().map(|&x| interval_mul(x, (k, k))).collect())
                    .collect(),
                ExprOp::Coord(a, coord) => smallvec::smallvec![grads[a.0][coord].clone()],
            };
            grads.push(out);
        }
        grads
    }
}

/// Gradient enclosures of each coordinate of a node, per axis.
pub(crate) type IntervalGrads = SmallVec<[AxisVec<(f64, f64)>; 4]>;

/// Enclosure of `(a b)' = a' b + a b'` from the gradient and value enclosures of `a` and `b`.
fn product_grad(
    (ga, va): (&AxisVec<(f64, f64)>, (f64, f64)),
    (gb, vb): (&AxisVec<(f64, f64)>, (f64, f64)),
) -> AxisVec<(f64, f64)> {
    ga.iter()
        .zip(gb)
        .map(|(&da, &db)| interval_add(interval_mul(da, vb), interval_mul(va, db)))
        .collect()
}

fn zip_axes(
    a: &AxisVec<(f64, f64)>,
    b: &AxisVec<(f64, f64)>,
    f: impl Fn((f64, f64), (f64, f64)) -> (f64, f64),
) -> AxisVec<(f64, f64)> {
    a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
}

fn zip_intervals(a: &BBox, b: &BBox, f: impl Fn((f64, f64), (f64, f64)) -> (f64, f64)) -> BBox {
    BBox(a.0.iter().zip(&b.0).map(|(&x, &y)| f(x, y)).collect())
}

fn pad_to_3(bbox: &BBox) -> BBox {
    let mut padded = bbox.clone();
    while padded.dim() < 3 {
        padded.0.push((0.0, 0.0));
    }
    padded
}

fn pad_dual_to_3(dual: &Dual, dim: usize) -> Dual {
    let mut padded = dual.clone();
    while padded.values.len() < 3 {
        padded.values.push(0.0);
        padded.grads.push(AxisVec::from_elem(0.0, dim));
    }
    padded
}
