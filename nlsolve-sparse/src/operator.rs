//! Linear operators and simple preconditioners.
use nalgebra::base::constraint::AreMultipliable;
use nalgebra::constraint::{DimEq, ShapeConstraint};
use nalgebra::storage::Storage;
use nalgebra::{ClosedAdd, ClosedMul, DMatrix, DVector, DVectorView, DVectorViewMut, Dim, Dyn, Matrix, Scalar, U1};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use nlsolve_traits::Real;
use num::{One, Zero};
use std::error::Error;

/// Error type returned by operators.
pub type OperatorError = Box<dyn Error + Send + Sync>;

pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T, R, C, S> LinearOperator<T> for Matrix<T, R, C, S>
where
    T: Scalar + One + Zero + ClosedMul + ClosedAdd,
    R: Dim,
    C: Dim,
    S: Storage<T, R, C>,
    ShapeConstraint: DimEq<Dyn, R> + DimEq<C, Dyn> + AreMultipliable<R, C, Dyn, U1>,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        y.gemv(T::one(), self, &x, T::zero());
        Ok(())
    }
}

impl<T> LinearOperator<T> for CsrMatrix<T>
where
    T: Scalar + Zero + One + ClosedMul + ClosedAdd,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }
}

pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        y.copy_from(&x);
        Ok(())
    }
}

/// Operators that can be created in an empty state, to be filled in by their owner later.
///
/// Used for Jacobian workspaces, which are (re-)shaped by the nonlinear problem on first use.
pub trait EmptyOperator {
    fn empty() -> Self;
}

impl<T: Scalar + Zero> EmptyOperator for CsrMatrix<T> {
    fn empty() -> Self {
        CsrMatrix::zeros(0, 0)
    }
}

impl<T: Scalar + Zero> EmptyOperator for DMatrix<T> {
    fn empty() -> Self {
        DMatrix::zeros(0, 0)
    }
}

/// Diagonal (Jacobi) preconditioner, storing the inverse of the operator diagonal.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner<T: Scalar> {
    inverse_diagonal: DVector<T>,
}

impl<T: Real> JacobiPreconditioner<T> {
    /// Builds the preconditioner from the diagonal of the given square matrix.
    ///
    /// Fails if any diagonal entry is zero (structurally or numerically).
    pub fn from_csr(matrix: &CsrMatrix<T>) -> Result<Self, OperatorError> {
        let mut preconditioner = Self {
            inverse_diagonal: DVector::zeros(0),
        };
        preconditioner.update(matrix)?;
        Ok(preconditioner)
    }

    /// Recomputes the inverse diagonal, reusing the internal storage.
    pub fn update(&mut self, matrix: &CsrMatrix<T>) -> Result<(), OperatorError> {
        let n = matrix.nrows();
        self.inverse_diagonal.resize_vertically_mut(n, T::zero());
        self.inverse_diagonal.fill(T::zero());
        for (i, j, v) in matrix.triplet_iter() {
            if i == j {
                self.inverse_diagonal[i] += *v;
            }
        }

        for (i, d_i) in self.inverse_diagonal.iter_mut().enumerate() {
            if d_i.is_zero() {
                return Err(Box::from(format!(
                    "Cannot build Jacobi preconditioner: diagonal entry {} is zero.",
                    i
                )));
            }
            *d_i = d_i.recip();
        }
        Ok(())
    }

    pub fn inverse_diagonal(&self) -> &DVector<T> {
        &self.inverse_diagonal
    }
}

impl<T: Real> LinearOperator<T> for JacobiPreconditioner<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        y.copy_from(&x);
        y.component_mul_assign(&self.inverse_diagonal);
        Ok(())
    }
}
