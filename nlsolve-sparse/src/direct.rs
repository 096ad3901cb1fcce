//! Direct solvers based on matrix factorizations.
use crate::linear_solver::{check_dimension, check_square, LinearSolver, LinearSolverError};
use log::debug;
use nalgebra::{DMatrix, DVectorView, DVectorViewMut, Dyn, LU};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use nlsolve_traits::Real;
use std::error::Error;

/// Dense LU factorization with partial pivoting.
///
/// The sparse operator is densified when it is bound, so this solver is only suitable for
/// systems of moderate size.
#[derive(Debug, Clone)]
pub struct LuSolver<T: Real> {
    lu: Option<LU<T, Dyn, Dyn>>,
    dim: usize,
}

impl<T: Real> Default for LuSolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> LuSolver<T> {
    pub fn new() -> Self {
        Self { lu: None, dim: 0 }
    }
}

impl<T: Real> LinearSolver<T> for LuSolver<T> {
    type Operator = CsrMatrix<T>;

    fn set_operator(&mut self, operator: &CsrMatrix<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.dim = check_square(operator)?;
        debug!("LU: factorizing {}x{} operator ({} nnz)", self.dim, self.dim, operator.nnz());
        self.lu = Some(DMatrix::from(operator).lu());
        Ok(())
    }

    fn solve(&mut self, mut x: DVectorViewMut<T>, b: DVectorView<T>) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let lu = self.lu.as_ref().ok_or(LinearSolverError::NoOperator)?;
        check_dimension(self.dim, b.len())?;
        check_dimension(self.dim, x.len())?;
        x.copy_from(&b);
        if lu.solve_mut(&mut x) {
            Ok(1)
        } else {
            Err(Box::new(LinearSolverError::SingularOperator))
        }
    }
}

/// Sparse Cholesky factorization for symmetric positive definite operators.
#[derive(Debug, Clone)]
pub struct CholeskySolver<T: Real> {
    cholesky: Option<CscCholesky<T>>,
    dim: usize,
}

impl<T: Real> Default for CholeskySolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> CholeskySolver<T> {
    pub fn new() -> Self {
        Self {
            cholesky: None,
            dim: 0,
        }
    }
}

impl<T: Real> LinearSolver<T> for CholeskySolver<T> {
    type Operator = CsrMatrix<T>;

    fn set_operator(&mut self, operator: &CsrMatrix<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.dim = check_square(operator)?;
        // Drop any previous factorization so that a failure leaves the solver without operator
        self.cholesky = None;
        if !is_symmetric(operator) {
            return Err(Box::new(LinearSolverError::NonSymmetricOperator));
        }
        debug!("Cholesky: factorizing {}x{} operator ({} nnz)", self.dim, self.dim, operator.nnz());
        let csc = CscMatrix::from(operator);
        let cholesky =
            CscCholesky::factor(&csc).map_err(|err| LinearSolverError::FactorizationError(format!("{:?}", err)))?;
        self.cholesky = Some(cholesky);
        Ok(())
    }

    fn solve(&mut self, mut x: DVectorViewMut<T>, b: DVectorView<T>) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let cholesky = self.cholesky.as_ref().ok_or(LinearSolverError::NoOperator)?;
        check_dimension(self.dim, b.len())?;
        check_dimension(self.dim, x.len())?;
        let mut solution = DMatrix::from_iterator(self.dim, 1, b.iter().copied());
        cholesky.solve_mut(&mut solution);
        x.copy_from(&solution.column(0));
        Ok(1)
    }
}

/// Checks symmetry up to rounding, relative to the largest entry of the operator.
fn is_symmetric<T: Real>(operator: &CsrMatrix<T>) -> bool {
    let scale = operator
        .values()
        .iter()
        .fold(T::zero(), |max, v| max.max(v.abs()));
    let tol = T::default_epsilon().sqrt() * scale;
    operator.triplet_iter().all(|(i, j, &v_ij)| {
        let v_ji = operator
            .get_entry(j, i)
            .map(|entry| entry.into_value())
            .unwrap_or_else(T::zero);
        (v_ij - v_ji).abs() <= tol
    })
}
