//! Building blocks shared by the Krylov subspace methods.
use crate::operator::{LinearOperator, OperatorError};
use core::fmt;
use nalgebra::{DVectorView, RealField, Scalar};
use num::Zero;
use std::marker::PhantomData;

pub trait StoppingCriterion<T: Scalar> {
    /// Called at the start of a new solve.
    fn reset(&self, _a: &dyn LinearOperator<T>, _x: DVectorView<T>, _b: DVectorView<T>) {}

    fn has_converged(
        &self,
        a: &dyn LinearOperator<T>,
        x: DVectorView<T>,
        b: DVectorView<T>,
        b_norm: T,
        iteration: usize,
        approx_residual: DVectorView<T>,
    ) -> Result<bool, SolveErrorKind>;
}

impl<'a, T: Scalar, C: ?Sized + StoppingCriterion<T>> StoppingCriterion<T> for &'a C {
    fn reset(&self, a: &dyn LinearOperator<T>, x: DVectorView<T>, b: DVectorView<T>) {
        C::reset(self, a, x, b)
    }

    fn has_converged(
        &self,
        a: &dyn LinearOperator<T>,
        x: DVectorView<T>,
        b: DVectorView<T>,
        b_norm: T,
        iteration: usize,
        approx_residual: DVectorView<T>,
    ) -> Result<bool, SolveErrorKind> {
        C::has_converged(self, a, x, b, b_norm, iteration, approx_residual)
    }
}

/// Combined tolerance ||r|| <= max(rtol * ||b||, atol).
#[derive(Debug, Clone)]
pub struct ResidualToleranceCriterion<T: Scalar> {
    pub relative_tolerance: T,
    pub absolute_tolerance: T,
}

impl<T: Scalar + Zero> ResidualToleranceCriterion<T> {
    /// Purely relative tolerance ||r|| <= tol * ||b||.
    pub fn relative(tol: T) -> Self {
        Self {
            relative_tolerance: tol,
            absolute_tolerance: T::zero(),
        }
    }
}

impl<T> StoppingCriterion<T> for ResidualToleranceCriterion<T>
where
    T: RealField,
{
    fn has_converged(
        &self,
        _a: &dyn LinearOperator<T>,
        _x: DVectorView<T>,
        _b: DVectorView<T>,
        b_norm: T,
        _iteration: usize,
        approx_residual: DVectorView<T>,
    ) -> Result<bool, SolveErrorKind> {
        let r_approx_norm = approx_residual.norm();
        let relative = self.relative_tolerance.clone() * b_norm;
        Ok(r_approx_norm <= relative || r_approx_norm <= self.absolute_tolerance.clone())
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    OperatorError(OperatorError),
    PreconditionerError(OperatorError),
    StoppingCriterionError(OperatorError),
    IndefiniteOperator,
    IndefinitePreconditioner,
    /// The method broke down, e.g. due to a vanishing inner product.
    Breakdown,
    MaxIterationsReached {
        max_iter: usize,
    },
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => {
                write!(f, "Error applying operator: ")?;
                err.fmt(f)
            }
            Self::PreconditionerError(err) => {
                write!(f, "Error applying preconditioner: ")?;
                err.fmt(f)
            }
            Self::StoppingCriterionError(err) => {
                write!(f, "Error evaluating stopping criterion: ")?;
                err.fmt(f)
            }
            Self::IndefiniteOperator => write!(f, "Operator appears to be indefinite."),
            Self::IndefinitePreconditioner => write!(f, "Indefinite preconditioner."),
            Self::Breakdown => write!(f, "Breakdown (vanishing inner product)."),
            Self::MaxIterationsReached { max_iter } => {
                write!(f, "Max iterations ({}) reached.", max_iter)
            }
        }
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct SolveError<T> {
    pub output: SolverOutput<T>,
    pub kind: SolveErrorKind,
}

impl<T> SolveError<T> {
    pub(crate) fn new(output: SolverOutput<T>, kind: SolveErrorKind) -> Self {
        Self { output, kind }
    }
}

impl<T> fmt::Display for SolveError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Krylov solve failed after {} iterations. ", self.output.num_iterations)?;
        write!(f, "Error: {}", self.kind)
    }
}

impl<T: fmt::Debug> std::error::Error for SolveError<T> {}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct SolverOutput<T> {
    /// Number of iterations of the solver.
    ///
    /// Corresponds to the number of updates made to the (initial) solution vector,
    pub num_iterations: usize,
    marker: PhantomData<T>,
}

impl<T> SolverOutput<T> {
    pub(crate) fn new() -> Self {
        Self {
            num_iterations: 0,
            marker: PhantomData,
        }
    }
}
