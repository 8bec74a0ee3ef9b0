mod algebra;
mod bbox;
mod binomial;
mod domain;
mod intersections;
mod knots;
mod mesh_index;
mod monotone;
mod multivariate;
mod polyline;
mod refine;
mod zeros;

#[cfg(test)]
mod test_utils;

pub use algebra::*;
pub use bbox::*;
pub use binomial::*;
pub use domain::*;
pub use intersections::*;
pub use knots::*;
pub use mesh_index::*;
pub use monotone::*;
pub use multivariate::*;
pub use polyline::*;
pub use refine::{make_all_compatible, make_compatible};
pub use zeros::*;

use snafu::prelude::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MvarError {
    #[snafu(display("Invalid axis {} for a multivariate of dimension {}", axis, dim))]
    InvalidAxis { axis: usize, dim: usize },

    #[snafu(display(
        "Inconsistent domain along axis {}: {:?} vs {:?}",
        axis,
        lhs,
        rhs
    ))]
    InconsistentDomain {
        axis: usize,
        lhs: (f64, f64),
        rhs: (f64, f64),
    },

    #[snafu(display("Dimension mismatch: expected {}, got {}", expected, actual))]
    DimensionMismatch { expected: usize, actual: usize },

    #[snafu(display("Failed to make multivariates compatible: {}", reason))]
    FailedToMakeCompatible { reason: String },

    #[snafu(display("Operation '{}' is undefined for {} geometry", operation, geom_type))]
    UndefinedGeometry {
        geom_type: GeomType,
        operation: &'static str,
    },

    #[snafu(display("Too few parameters: need at least {}, got {}", required, actual))]
    TooFewParams { required: usize, actual: usize },

    #[snafu(display("Scalar point type (E1/P1) expected, got {}", point_type))]
    ScalarPointExpected { point_type: PointType },

    #[snafu(display("Index {} is outside a control mesh of length {}", index, len))]
    IndexOutOfMesh { index: usize, len: usize },

    #[snafu(display("Invalid knot vector along axis {}: {}", axis, reason))]
    InvalidKnotVector { axis: usize, reason: String },

    #[snafu(display("Invalid point type with {} coordinates", coords))]
    InvalidPointType { coords: usize },

    #[snafu(display(
        "Parameter {} along axis {} is outside the domain [{}, {}]",
        t,
        axis,
        min,
        max
    ))]
    ParameterOutOfDomain {
        axis: usize,
        t: f64,
        min: f64,
        max: f64,
    },

    #[snafu(display(
        "Underdefined system: {} variables but only {} constraints",
        num_vars,
        num_constraints
    ))]
    UnderdefinedSystem {
        num_vars: usize,
        num_constraints: usize,
    },

    #[snafu(display("Numeric degeneracy: {}", message))]
    NumericDegeneracy { message: String },

    #[snafu(display("Monotone decomposition did not converge within depth {}", depth))]
    MonotoneDecompositionFailed { depth: usize },

    #[snafu(display("Algorithm error (bug in library): {}", message))]
    AlgorithmError { message: String },
}
