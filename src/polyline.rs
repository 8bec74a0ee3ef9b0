//! Greedy chaining of polylines and point lists by their endpoints.

use crate::AxisVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Start,
    Finish,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polyline {
    pub points: Vec<AxisVec<f64>>,
    /// The last point connects back to the first.
    pub closed: bool,
}

impl Polyline {
    pub fn new(points: Vec<AxisVec<f64>>) -> Self {
        Self {
            points,
            closed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn end(&self, end: End) -> Option<&[f64]> {
        match end {
            End::Start => self.points.first(),
            End::Finish => self.points.last(),
        }
        .map(|p| p.as_slice())
    }

    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Total length of the segments, including the closing one.
    pub fn arc_length(&self) -> f64 {
        let open: f64 = self
            .points
            .windows(2)
            .map(|w| distance(&w[0], &w[1]))
            .sum();
        match (self.closed, self.points.first(), self.points.last()) {
            (true, Some(first), Some(last)) => open + distance(last, first),
            _ => open,
        }
    }
}

/// How [`merge_geometry`] measures, orders, and joins one kind of item.
pub trait MergeStrategy {
    type Item;

    /// Prepare an item before any merging.
    fn init(&self, _item: &mut Self::Item) {}

    /// Distance between end `a_end` of `a` and end `b_end` of `b`.
    fn distance(&self, a: &Self::Item, a_end: End, b: &Self::Item, b_end: End) -> f64;

    /// Items are visited in increasing key order, which fixes the result on ties.
    fn sort_key(&self, item: &Self::Item) -> f64;

    /// Join end `a_end` of `a` to end `b_end` of `b`.
    fn merge(&self, a: Self::Item, a_end: End, b: Self::Item, b_end: End) -> Self::Item;

    /// Close an item whose own ends meet. Returns false when the item cannot be closed.
    fn close(&self, _item: &mut Self::Item) -> bool {
        false
    }
}

/// Repeatedly join the closest pair of free ends until no pair is within `eps`.
///
/// Closed items take no further part in the merge. Each step scans all pairs.
pub fn merge_geometry<S: MergeStrategy>(
    strategy: &S,
    items: Vec<S::Item>,
    eps: f64,
) -> Vec<S::Item> {
    let mut open: Vec<S::Item> = Vec::with_capacity(items.len());
    let mut closed: Vec<S::Item> = Vec::new();
    let mut sorted = items;
    for item in &mut sorted {
        strategy.init(item);
    }
    sorted.sort_by(|a, b| strategy.sort_key(a).total_cmp(&strategy.sort_key(b)));
    for item in sorted {
        push_or_close(strategy, item, eps, &mut open, &mut closed);
    }

    const ENDS: [End; 2] = [End::Start, End::Finish];
    loop {
        let mut best: Option<(f64, usize, End, usize, End)> = None;
        for i in 0..open.len() {
            for j in i + 1..open.len() {
                for a_end in ENDS {
                    for b_end in ENDS {
                        let dist = strategy.distance(&open[i], a_end, &open[j], b_end);
                        if dist <= eps && best.is_none_or(|(d, ..)| dist < d) {
                            best = Some((dist, i, a_end, j, b_end));
                        }
                    }
                }
            }
        }
        let Some((dist, i, a_end, j, b_end)) = best else {
            break;
        };
        log::trace!("Joining items {i} and {j} at distance {dist}");
        // j > i, so removing j first leaves i in place.
        let b = open.swap_remove(j);
        let a = open.swap_remove(i);
        let merged = strategy.merge(a, a_end, b, b_end);
        push_or_close(strategy, merged, eps, &mut open, &mut closed);
    }

    log::debug!(
        "Merged into {} open and {} closed items",
        open.len(),
        closed.len()
    );
    closed.extend(open);
    closed
}

fn push_or_close<S: MergeStrategy>(
    strategy: &S,
    mut item: S::Item,
    eps: f64,
    open: &mut Vec<S::Item>,
    closed: &mut Vec<S::Item>,
) {
    if strategy.distance(&item, End::Start, &item, End::Finish) <= eps && strategy.close(&mut item)
    {
        closed.push(item);
    } else {
        open.push(item);
    }
}

/// Joins polylines and closes loops. A junction point repeated within `junction_eps` is
/// kept once.
#[derive(Debug, Clone, Copy)]
pub struct PolylineMerge {
    pub junction_eps: f64,
}

impl MergeStrategy for PolylineMerge {
    type Item = Polyline;

    fn distance(&self, a: &Polyline, a_end: End, b: &Polyline, b_end: End) -> f64 {
        match (a.end(a_end), b.end(b_end)) {
            (Some(pa), Some(pb)) => distance(pa, pb),
            _ => f64::INFINITY,
        }
    }

    fn sort_key(&self, item: &Polyline) -> f64 {
        item.points.first().and_then(|p| p.first().copied()).unwrap_or(0.0)
    }

    fn merge(&self, mut a: Polyline, a_end: End, mut b: Polyline, b_end: End) -> Polyline {
        if a_end == End::Start {
            a.reverse();
        }
        if b_end == End::Finish {
            b.reverse();
        }
        let repeated = self.distance(&a, End::Finish, &b, End::Start) <= self.junction_eps;
        a.points.extend(b.points.into_iter().skip(usize::from(repeated)));
        a
    }

    fn close(&self, item: &mut Polyline) -> bool {
        if item.closed {
            return false;
        }
        let repeated = self.distance(item, End::Start, item, End::Finish) <= self.junction_eps;
        if item.len() - usize::from(repeated) < 3 {
            return false;
        }
        if repeated {
            item.points.pop();
        }
        item.closed = true;
        true
    }
}

/// Concatenates point lists without removing or closing anything.
#[derive(Debug, Clone, Copy)]
pub struct PointListMerge;

impl MergeStrategy for PointListMerge {
    type Item = Vec<AxisVec<f64>>;

    fn distance(&self, a: &Self::Item, a_end: End, b: &Self::Item, b_end: End) -> f64 {
        fn end<T>(list: &[T], end: End) -> Option<&T> {
            match end {
                End::Start => list.first(),
                End::Finish => list.last(),
            }
        }
        match (end(a, a_end), end(b, b_end)) {
            (Some(pa), Some(pb)) => distance(pa, pb),
            _ => f64::INFINITY,
        }
    }

    fn sort_key(&self, item: &Self::Item) -> f64 {
        -(item.len() as f64)
    }

    fn merge(&self, mut a: Self::Item, a_end: End, mut b: Self::Item, b_end: End) -> Self::Item {
        if a_end == End::Start {
            a.reverse();
        }
        if b_end == End::Finish {
            b.reverse();
        }
        a.extend(b);
        a
    }
}

/// Chain polylines whose endpoints meet within `eps`.
pub fn merge_polylines(polylines: Vec<Polyline>, eps: f64) -> Vec<Polyline> {
    let (closed, open): (Vec<Polyline>, Vec<Polyline>) =
        polylines.into_iter().partition(|p| p.closed);
    let mut merged = merge_geometry(&PolylineMerge { junction_eps: eps }, open, eps);
    merged.extend(closed);
    merged
}

/// Chain scattered points, such as samples of a solution curve, into polylines by
/// joining nearest neighbours within `eps`.
pub fn points_to_polylines(points: &[AxisVec<f64>], eps: f64) -> Vec<Polyline> {
    let singles = points
        .iter()
        .map(|p| Polyline::new(vec![p.clone()]))
        .collect();
    merge_geometry(&PolylineMerge { junction_eps: 0.0 }, singles, eps)
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
