//! The linear-solve capability consumed by nonlinear solvers, and its default implementations.
use crate::direct::{CholeskySolver, LuSolver};
use crate::krylov_solver::{KrylovMethod, KrylovSolver, PreconditionerType};
use crate::operator::OperatorError;
use nalgebra::{DVectorView, DVectorViewMut, Scalar};
use nalgebra_sparse::CsrMatrix;
use nlsolve_traits::Real;
use std::error::Error;
use std::fmt;

/// Solves linear systems $A x = b$ for an operator $A$ bound beforehand.
///
/// The operator must be re-bound with [`LinearSolver::set_operator`] whenever its values change.
/// Implementations are free to factorize or otherwise preprocess the operator at that point.
pub trait LinearSolver<T: Scalar> {
    type Operator;

    fn set_operator(&mut self, operator: &Self::Operator) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Solves the system with the currently bound operator.
    ///
    /// Returns the number of iterations performed by the solver. Direct solvers report a single
    /// iteration.
    fn solve(&mut self, x: DVectorViewMut<T>, b: DVectorView<T>) -> Result<usize, Box<dyn Error + Send + Sync>>;
}

impl<'a, T, S> LinearSolver<T> for &'a mut S
where
    T: Scalar,
    S: ?Sized + LinearSolver<T>,
{
    type Operator = S::Operator;

    fn set_operator(&mut self, operator: &Self::Operator) -> Result<(), Box<dyn Error + Send + Sync>> {
        S::set_operator(self, operator)
    }

    fn solve(&mut self, x: DVectorViewMut<T>, b: DVectorView<T>) -> Result<usize, Box<dyn Error + Send + Sync>> {
        S::solve(self, x, b)
    }
}

impl<T, S> LinearSolver<T> for Box<S>
where
    T: Scalar,
    S: ?Sized + LinearSolver<T>,
{
    type Operator = S::Operator;

    fn set_operator(&mut self, operator: &Self::Operator) -> Result<(), Box<dyn Error + Send + Sync>> {
        S::set_operator(self, operator)
    }

    fn solve(&mut self, x: DVectorViewMut<T>, b: DVectorView<T>) -> Result<usize, Box<dyn Error + Send + Sync>> {
        S::solve(self, x, b)
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum LinearSolverError {
    /// `solve` was called before an operator was bound.
    NoOperator,
    NonSquareOperator {
        nrows: usize,
        ncols: usize,
    },
    DimensionMismatch {
        expected: usize,
        actual: usize,
    },
    SingularOperator,
    /// A solver restricted to symmetric operators was given a nonsymmetric one.
    NonSymmetricOperator,
    FactorizationError(String),
    PreconditionerError(OperatorError),
    UnknownMethod(String),
    UnknownPreconditioner(String),
}

impl fmt::Display for LinearSolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOperator => write!(f, "No operator has been set for the linear solver."),
            Self::NonSquareOperator { nrows, ncols } => {
                write!(f, "Operator must be square, but has dimensions {}x{}.", nrows, ncols)
            }
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "Vector dimension {} does not match operator dimension {}.", actual, expected)
            }
            Self::SingularOperator => write!(f, "Operator is singular."),
            Self::NonSymmetricOperator => write!(f, "Operator is not symmetric."),
            Self::FactorizationError(msg) => write!(f, "Factorization failed: {}", msg),
            Self::PreconditionerError(err) => {
                write!(f, "Failed to build preconditioner: ")?;
                err.fmt(f)
            }
            Self::UnknownMethod(method) => write!(
                f,
                "Unknown linear solver method \"{}\". Known methods are \
                 \"full\", \"default\", \"lu\", \"direct\", \"cholesky\", \"cg\" and \"bicgstab\".",
                method
            ),
            Self::UnknownPreconditioner(pc) => write!(
                f,
                "Unknown preconditioner \"{}\". Known preconditioners are \"default\", \"none\" and \"jacobi\".",
                pc
            ),
        }
    }
}

impl Error for LinearSolverError {}

pub(crate) fn check_square<T>(operator: &CsrMatrix<T>) -> Result<usize, LinearSolverError> {
    if operator.nrows() == operator.ncols() {
        Ok(operator.nrows())
    } else {
        Err(LinearSolverError::NonSquareOperator {
            nrows: operator.nrows(),
            ncols: operator.ncols(),
        })
    }
}

pub(crate) fn check_dimension(expected: usize, actual: usize) -> Result<(), LinearSolverError> {
    if expected == actual {
        Ok(())
    } else {
        Err(LinearSolverError::DimensionMismatch { expected, actual })
    }
}

/// Linear solver selected at runtime by method name.
#[derive(Debug)]
pub enum DefaultLinearSolver<T: Real> {
    Lu(LuSolver<T>),
    Cholesky(CholeskySolver<T>),
    Krylov(KrylovSolver<T>),
}

impl<T: Real> Default for DefaultLinearSolver<T> {
    fn default() -> Self {
        Self::Lu(LuSolver::new())
    }
}

impl<T: Real> DefaultLinearSolver<T> {
    /// Constructs a linear solver from a method and preconditioner name.
    ///
    /// `"full"`, `"default"`, `"lu"` and `"direct"` select a dense LU factorization,
    /// `"cholesky"` a sparse Cholesky factorization, and `"cg"` and `"bicgstab"` the corresponding
    /// Krylov methods. The preconditioner (`"default"`, `"none"` or `"jacobi"`) only applies to
    /// Krylov methods, but is validated for all methods.
    pub fn from_method(method: &str, preconditioner: &str) -> Result<Self, LinearSolverError> {
        let preconditioner: PreconditionerType = preconditioner.parse()?;
        match method {
            "full" | "default" | "lu" | "direct" => Ok(Self::Lu(LuSolver::new())),
            "cholesky" => Ok(Self::Cholesky(CholeskySolver::new())),
            krylov => {
                let method: KrylovMethod = krylov.parse()?;
                Ok(Self::Krylov(KrylovSolver::new(method, preconditioner)))
            }
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Lu(_) => "lu",
            Self::Cholesky(_) => "cholesky",
            Self::Krylov(solver) => solver.method().name(),
        }
    }
}

impl<T: Real> LinearSolver<T> for DefaultLinearSolver<T> {
    type Operator = CsrMatrix<T>;

    fn set_operator(&mut self, operator: &CsrMatrix<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        match self {
            Self::Lu(solver) => solver.set_operator(operator),
            Self::Cholesky(solver) => solver.set_operator(operator),
            Self::Krylov(solver) => solver.set_operator(operator),
        }
    }

    fn solve(&mut self, x: DVectorViewMut<T>, b: DVectorView<T>) -> Result<usize, Box<dyn Error + Send + Sync>> {
        match self {
            Self::Lu(solver) => solver.solve(x, b),
            Self::Cholesky(solver) => solver.solve(x, b),
            Self::Krylov(solver) => solver.solve(x, b),
        }
    }
}
