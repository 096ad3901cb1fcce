//! Krylov subspace methods exposed through the [`LinearSolver`] capability.
use crate::bicgstab::{BiCgStab, BiCgStabWorkspace};
use crate::cg::{CgWorkspace, ConjugateGradient};
use crate::krylov::ResidualToleranceCriterion;
use crate::linear_solver::{check_dimension, check_square, LinearSolver, LinearSolverError};
use crate::nullspace::VectorSpaceBasis;
use crate::operator::{IdentityOperator, JacobiPreconditioner, LinearOperator};
use log::{debug, info};
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;
use nlsolve_traits::Real;
use std::error::Error;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KrylovMethod {
    /// Conjugate gradient. Requires a symmetric positive definite operator.
    Cg,
    BiCgStab,
}

impl KrylovMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cg => "cg",
            Self::BiCgStab => "bicgstab",
        }
    }
}

impl FromStr for KrylovMethod {
    type Err = LinearSolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cg" => Ok(Self::Cg),
            "bicgstab" => Ok(Self::BiCgStab),
            other => Err(LinearSolverError::UnknownMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PreconditionerType {
    None,
    Jacobi,
}

impl FromStr for PreconditionerType {
    type Err = LinearSolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" | "none" => Ok(Self::None),
            "jacobi" => Ok(Self::Jacobi),
            other => Err(LinearSolverError::UnknownPreconditioner(other.to_string())),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct KrylovSettings<T> {
    pub relative_tolerance: T,
    pub absolute_tolerance: T,
    pub maximum_iterations: usize,
    /// Use the incoming content of the solution vector as initial guess instead of zero.
    pub nonzero_initial_guess: bool,
    pub report: bool,
}

impl<T: Real> Default for KrylovSettings<T> {
    fn default() -> Self {
        Self {
            relative_tolerance: nalgebra::convert::<f64, T>(1e-6),
            absolute_tolerance: nalgebra::convert::<f64, T>(1e-15),
            maximum_iterations: 10000,
            nonzero_initial_guess: false,
            report: false,
        }
    }
}

#[derive(Debug)]
pub struct KrylovSolver<T: Real> {
    method: KrylovMethod,
    preconditioner_type: PreconditionerType,
    pub settings: KrylovSettings<T>,
    operator: Option<CsrMatrix<T>>,
    jacobi: Option<JacobiPreconditioner<T>>,
    nullspace: Option<VectorSpaceBasis<T>>,
    rhs: DVector<T>,
    cg_workspace: CgWorkspace<T>,
    bicgstab_workspace: BiCgStabWorkspace<T>,
}

impl<T: Real> KrylovSolver<T> {
    pub fn new(method: KrylovMethod, preconditioner_type: PreconditionerType) -> Self {
        Self {
            method,
            preconditioner_type,
            settings: KrylovSettings::default(),
            operator: None,
            jacobi: None,
            nullspace: None,
            rhs: DVector::zeros(0),
            cg_workspace: CgWorkspace::default(),
            bicgstab_workspace: BiCgStabWorkspace::default(),
        }
    }

    pub fn with_settings(self, settings: KrylovSettings<T>) -> Self {
        Self { settings, ..self }
    }

    pub fn method(&self) -> KrylovMethod {
        self.method
    }

    pub fn preconditioner_type(&self) -> PreconditionerType {
        self.preconditioner_type
    }

    /// Sets the null space of the operator.
    ///
    /// The right-hand side is orthogonalized against the null space before each solve,
    /// which makes singular (but consistent) systems solvable.
    pub fn set_nullspace(&mut self, nullspace: VectorSpaceBasis<T>) {
        self.nullspace = Some(nullspace);
    }

    pub fn clear_nullspace(&mut self) {
        self.nullspace = None;
    }
}

impl<T: Real> LinearSolver<T> for KrylovSolver<T> {
    type Operator = CsrMatrix<T>;

    fn set_operator(&mut self, operator: &CsrMatrix<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        check_square(operator)?;

        if self.preconditioner_type == PreconditionerType::Jacobi {
            let result = match &mut self.jacobi {
                Some(jacobi) => jacobi.update(operator),
                None => JacobiPreconditioner::from_csr(operator).map(|jacobi| self.jacobi = Some(jacobi)),
            };
            if let Err(err) = result {
                // Leave the solver unbound rather than paired with a stale operator
                self.jacobi = None;
                self.operator = None;
                return Err(Box::new(LinearSolverError::PreconditionerError(err)));
            }
        }

        match &mut self.operator {
            Some(existing) => existing.clone_from(operator),
            None => self.operator = Some(operator.clone()),
        }
        Ok(())
    }

    fn solve(&mut self, mut x: DVectorViewMut<T>, b: DVectorView<T>) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let operator = self.operator.as_ref().ok_or(LinearSolverError::NoOperator)?;
        let n = operator.nrows();
        check_dimension(n, b.len())?;
        check_dimension(n, x.len())?;

        if !self.settings.nonzero_initial_guess {
            x.fill(T::zero());
        }

        self.rhs.resize_vertically_mut(n, T::zero());
        self.rhs.copy_from(&b);
        if let Some(nullspace) = &self.nullspace {
            nullspace.orthogonalize(&mut self.rhs);
        }

        let preconditioner: &dyn LinearOperator<T> = match self.preconditioner_type {
            PreconditionerType::Jacobi => self.jacobi.as_ref().ok_or(LinearSolverError::NoOperator)?,
            PreconditionerType::None => &IdentityOperator,
        };
        let criterion = ResidualToleranceCriterion {
            relative_tolerance: self.settings.relative_tolerance,
            absolute_tolerance: self.settings.absolute_tolerance,
        };
        let max_iter = self.settings.maximum_iterations;

        let output = match self.method {
            KrylovMethod::Cg => ConjugateGradient::with_workspace(&mut self.cg_workspace)
                .with_operator(operator)
                .with_preconditioner(preconditioner)
                .with_stopping_criterion(&criterion)
                .with_max_iter(max_iter)
                .solve_with_guess(&self.rhs, x)?,
            KrylovMethod::BiCgStab => BiCgStab::with_workspace(&mut self.bicgstab_workspace)
                .with_operator(operator)
                .with_preconditioner(preconditioner)
                .with_stopping_criterion(&criterion)
                .with_max_iter(max_iter)
                .solve_with_guess(&self.rhs, x)?,
        };

        if self.settings.report {
            info!(
                "Krylov solver ({}) converged in {} iterations.",
                self.method.name(),
                output.num_iterations
            );
        } else {
            debug!("Krylov solver ({}): {} iterations", self.method.name(), output.num_iterations);
        }
        Ok(output.num_iterations)
    }
}
