//! Newton's method for nonlinear systems $F(x) = 0$.
//!
//! Each Newton step solves the linearized system
//! $$ J(x_k) \Delta x = F(x_k) $$
//! with a pluggable [`LinearSolver`] and updates the iterate as $x_{k+1} = x_k - \omega \Delta x$,
//! where $\omega$ is the relaxation parameter.
//!
//! Convergence is measured either on the residual $\norm{F(x_k)}_2$ or on the increment
//! $\norm{\Delta x}_2$ (see [`ConvergenceCriterion`]). A step has converged if the measured norm
//! is smaller than the absolute tolerance, or if its ratio to the norm measured at the first
//! evaluation is smaller than the relative tolerance.
use crate::parameters::{ParameterError, Parameters};
use crate::problem::NonlinearProblem;
use log::{debug, info, warn};
use nalgebra::{DVector, DVectorView, DVectorViewMut, Scalar};
use nlsolve_sparse::linear_solver::{DefaultLinearSolver, LinearSolver, LinearSolverError};
use nlsolve_sparse::norm::{l2_norm, Communicator, SerialCommunicator};
use nlsolve_sparse::operator::EmptyOperator;
use nlsolve_traits::Real;
use numeric_literals::replace_float_literals;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, LowerExp};
use std::str::FromStr;
use std::sync::Arc;

/// The quantity whose norm decides convergence.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConvergenceCriterion {
    /// Measure the residual $F(x_k)$. Convergence may occur before the first step.
    Residual,
    /// Measure the increment $\Delta x$. At least one step is always taken.
    Incremental,
}

impl ConvergenceCriterion {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Residual => "residual",
            Self::Incremental => "incremental",
        }
    }
}

impl FromStr for ConvergenceCriterion {
    type Err = NewtonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "residual" => Ok(Self::Residual),
            "incremental" => Ok(Self::Incremental),
            other => Err(NewtonError::InvalidConfiguration(format!(
                "The convergence criterion \"{}\" is unknown, known criteria are \"residual\" or \"incremental\".",
                other
            ))),
        }
    }
}

impl Display for ConvergenceCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Typed snapshot of the Newton solver parameters, taken at the start of each solve.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonSettings<T> {
    pub maximum_iterations: usize,
    pub relative_tolerance: T,
    pub absolute_tolerance: T,
    pub convergence_criterion: ConvergenceCriterion,
    pub relaxation_parameter: T,
    /// Log the residual at every iteration.
    pub report: bool,
    /// Return an error if the solver does not converge. Otherwise, only a warning is logged.
    pub error_on_nonconvergence: bool,
}

impl<T: Real> Default for NewtonSettings<T> {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn default() -> Self {
        Self {
            maximum_iterations: 10,
            relative_tolerance: 1e-9,
            absolute_tolerance: 1e-10,
            convergence_criterion: ConvergenceCriterion::Residual,
            relaxation_parameter: 1.0,
            report: true,
            error_on_nonconvergence: true,
        }
    }
}

impl<T: Real> NewtonSettings<T> {
    /// Parses and validates settings from a `newton_solver` parameter set.
    pub fn from_parameters(parameters: &Parameters) -> Result<Self, NewtonError> {
        let maximum_iterations = parameters.get_int("maximum_iterations")?;
        let maximum_iterations = usize::try_from(maximum_iterations).map_err(|_| {
            NewtonError::InvalidConfiguration(format!(
                "maximum_iterations must be non-negative, but is {}.",
                maximum_iterations
            ))
        })?;

        let non_negative = |key: &str| -> Result<T, NewtonError> {
            let value = parameters.get_real(key)?;
            if value >= 0.0 {
                Ok(T::from_subset(&value))
            } else {
                Err(NewtonError::InvalidConfiguration(format!(
                    "{} must be non-negative, but is {:e}.",
                    key, value
                )))
            }
        };
        let relative_tolerance = non_negative("relative_tolerance")?;
        let absolute_tolerance = non_negative("absolute_tolerance")?;

        let relaxation_parameter = parameters.get_real("relaxation_parameter")?;
        if !(relaxation_parameter > 0.0) {
            return Err(NewtonError::InvalidConfiguration(format!(
                "relaxation_parameter must be positive, but is {:e}.",
                relaxation_parameter
            )));
        }

        Ok(Self {
            maximum_iterations,
            relative_tolerance,
            absolute_tolerance,
            convergence_criterion: parameters.get_string("convergence_criterion")?.parse()?,
            relaxation_parameter: T::from_subset(&relaxation_parameter),
            report: parameters.get_bool("report")?,
            error_on_nonconvergence: parameters.get_bool("error_on_nonconvergence")?,
        })
    }
}

/// Returns the default parameters of the Newton solver.
pub fn default_parameters() -> Parameters {
    Parameters::new("newton_solver")
        .with("maximum_iterations", 10)
        .with("relative_tolerance", 1e-9)
        .with("absolute_tolerance", 1e-10)
        .with("convergence_criterion", "residual")
        .with("method", "full")
        .with("relaxation_parameter", 1.0)
        .with("report", true)
        .with("error_on_nonconvergence", true)
}

#[derive(Debug)]
pub enum NewtonError {
    /// The solver parameters are invalid, e.g. an unknown convergence criterion.
    InvalidConfiguration(String),
    /// The nonlinear problem failed to evaluate the residual or the Jacobian.
    ProblemEvaluationFailure(eyre::Report),
    /// The linear solver failed to bind the Jacobian or to solve the Newton system.
    LinearSolverFailure(Box<dyn Error + Send + Sync>),
    /// The procedure failed to converge within the maximum number of iterations.
    NonConvergence { iterations: usize },
}

impl Display for NewtonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            NewtonError::InvalidConfiguration(msg) => {
                write!(f, "Invalid Newton solver configuration: {}", msg)
            }
            NewtonError::ProblemEvaluationFailure(err) => {
                write!(f, "Failed to evaluate nonlinear problem. Error: {}", err)
            }
            NewtonError::LinearSolverFailure(err) => {
                write!(f, "Failed to solve Newton system. Error: {}", err)
            }
            NewtonError::NonConvergence { iterations } => {
                write!(f, "Newton solver did not converge after {} iterations.", iterations)
            }
        }
    }
}

impl Error for NewtonError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NewtonError::ProblemEvaluationFailure(err) => Some(&**err),
            NewtonError::LinearSolverFailure(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<ParameterError> for NewtonError {
    fn from(err: ParameterError) -> Self {
        NewtonError::InvalidConfiguration(err.to_string())
    }
}

impl From<LinearSolverError> for NewtonError {
    fn from(err: LinearSolverError) -> Self {
        match err {
            LinearSolverError::UnknownMethod(_) | LinearSolverError::UnknownPreconditioner(_) => {
                NewtonError::InvalidConfiguration(err.to_string())
            }
            err => NewtonError::LinearSolverFailure(Box::new(err)),
        }
    }
}

/// The vector on which convergence is tested.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Metric {
    Residual,
    Increment,
}

/// Ratio `r / r0`, defined as zero if both vanish. Otherwise a vanishing `r0` gives infinity.
fn relative<T: Real>(r: T, r0: T) -> T {
    if r0 == T::zero() && r == T::zero() {
        T::zero()
    } else {
        r / r0
    }
}

/// Newton solver for nonlinear systems, generic over the linear solver used for the
/// Newton steps.
///
/// The solver owns the Jacobian, increment and residual workspaces, which are reused across
/// iterations and solves.
#[derive(Debug)]
pub struct NewtonSolver<T, S>
where
    T: Scalar,
    S: LinearSolver<T>,
{
    /// Parameters read at the start of each solve. See [`default_parameters`].
    pub parameters: Parameters,
    solver: S,
    communicator: Arc<dyn Communicator<T>>,
    jacobian: S::Operator,
    dx: DVector<T>,
    f: DVector<T>,
    iteration: usize,
    residual: T,
    residual0: Option<T>,
}

impl<T, S> NewtonSolver<T, S>
where
    T: Real,
    S: LinearSolver<T>,
    S::Operator: EmptyOperator,
{
    /// Creates a Newton solver with default parameters that uses the given linear solver.
    pub fn new(solver: S) -> Self {
        Self {
            parameters: default_parameters(),
            solver,
            communicator: Arc::new(SerialCommunicator),
            jacobian: <S::Operator as EmptyOperator>::empty(),
            dx: DVector::zeros(0),
            f: DVector::zeros(0),
            iteration: 0,
            residual: T::zero(),
            residual0: None,
        }
    }
}

impl<T: Real> NewtonSolver<T, DefaultLinearSolver<T>> {
    /// Creates a Newton solver whose linear solver is selected by method and preconditioner name.
    ///
    /// See [`DefaultLinearSolver::from_method`] for the supported names.
    pub fn from_method(method: &str, preconditioner: &str) -> Result<Self, NewtonError> {
        let mut solver = Self::new(DefaultLinearSolver::from_method(method, preconditioner)?);
        solver.parameters.set("method", method)?;
        Ok(solver)
    }

    /// Creates a Newton solver from a parameter set.
    ///
    /// The parameters are merged into the default parameters, and the linear solver is selected
    /// by the `method` parameter.
    pub fn with_parameters(parameters: &Parameters) -> Result<Self, NewtonError> {
        let mut merged = default_parameters();
        merged.update(parameters)?;
        // Validate eagerly, even though settings are parsed again for every solve
        NewtonSettings::<T>::from_parameters(&merged)?;
        let method = merged.get_string("method")?;
        let mut solver = Self::new(DefaultLinearSolver::from_method(method, "default")?);
        solver.parameters = merged;
        Ok(solver)
    }
}

impl<T, S> NewtonSolver<T, S>
where
    T: Scalar,
    S: LinearSolver<T>,
{
    /// Sets the communicator used for norm reductions and for deciding which process reports.
    pub fn with_communicator(self, communicator: Arc<dyn Communicator<T>>) -> Self {
        Self { communicator, ..self }
    }

    /// The number of Newton iterations performed by the last solve.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// The norm most recently measured by the convergence test.
    ///
    /// Depending on the convergence criterion, this is the norm of either the residual or the
    /// increment.
    pub fn residual(&self) -> T
    where
        T: Copy,
    {
        self.residual
    }

    pub fn linear_solver(&self) -> &S {
        &self.solver
    }

    pub fn linear_solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    pub fn communicator(&self) -> &dyn Communicator<T> {
        &*self.communicator
    }
}

impl<T, S> NewtonSolver<T, S>
where
    T: Real + LowerExp,
    S: LinearSolver<T>,
{
    /// The last measured norm relative to the norm measured at the first evaluation.
    pub fn relative_residual(&self) -> T {
        relative(self.residual, self.residual0.unwrap_or_else(T::zero))
    }

    /// Solves $F(x) = 0$, starting from the initial guess in `x`.
    ///
    /// On return, `x` holds the last iterate, whether or not the solver converged.
    /// Returns the number of iterations performed and whether the solver converged. If the
    /// solver did not converge and `error_on_nonconvergence` is set, an error is returned
    /// instead.
    pub fn solve<'a, P>(
        &mut self,
        problem: &mut P,
        x: impl Into<DVectorViewMut<'a, T>>,
    ) -> Result<(usize, bool), NewtonError>
    where
        P: ?Sized + NonlinearProblem<T, S::Operator>,
    {
        let settings = NewtonSettings::<T>::from_parameters(&self.parameters)?;
        let mut x = x.into();
        let n = x.nrows();

        self.f.resize_vertically_mut(n, T::zero());
        self.f.fill(T::zero());
        self.dx.resize_vertically_mut(n, T::zero());
        self.iteration = 0;
        self.residual = T::zero();
        self.residual0 = None;
        let mut linear_iterations = 0;

        problem
            .residual(DVectorViewMut::from(&mut self.f), DVectorView::from(&x))
            .map_err(NewtonError::ProblemEvaluationFailure)?;

        let mut converged = match settings.convergence_criterion {
            ConvergenceCriterion::Residual => self.converged(Metric::Residual, &settings),
            // No increment to measure before the first step
            ConvergenceCriterion::Incremental => false,
        };

        problem
            .form(&mut self.jacobian, DVectorViewMut::from(&mut self.f), DVectorView::from(&x))
            .map_err(NewtonError::ProblemEvaluationFailure)?;

        while !converged && self.iteration < settings.maximum_iterations {
            problem
                .jacobian(&mut self.jacobian, DVectorView::from(&x))
                .map_err(NewtonError::ProblemEvaluationFailure)?;

            // The operator is rebound every iteration, since solvers may cache factorizations
            self.solver
                .set_operator(&self.jacobian)
                .map_err(NewtonError::LinearSolverFailure)?;

            self.dx.fill(T::zero());
            let step_iterations = self
                .solver
                .solve(DVectorViewMut::from(&mut self.dx), DVectorView::from(&self.f))
                .map_err(NewtonError::LinearSolverFailure)?;
            linear_iterations += step_iterations;
            debug!(
                "Newton iteration {}: linear solve took {} iterations",
                self.iteration, step_iterations
            );

            let relaxation = settings.relaxation_parameter;
            if (T::one() - relaxation).abs() < T::default_epsilon() {
                x -= &self.dx;
            } else {
                x.axpy(-relaxation, &self.dx, T::one());
            }

            problem
                .form(&mut self.jacobian, DVectorViewMut::from(&mut self.f), DVectorView::from(&x))
                .map_err(NewtonError::ProblemEvaluationFailure)?;
            problem
                .residual(DVectorViewMut::from(&mut self.f), DVectorView::from(&x))
                .map_err(NewtonError::ProblemEvaluationFailure)?;

            converged = match settings.convergence_criterion {
                ConvergenceCriterion::Residual => {
                    self.iteration += 1;
                    self.converged(Metric::Residual, &settings)
                }
                ConvergenceCriterion::Incremental => {
                    // The iteration count is incremented *after* the test, so that the first
                    // increment establishes the reference norm
                    let converged = self.converged(Metric::Increment, &settings);
                    self.iteration += 1;
                    converged
                }
            };
        }

        if converged {
            if self.communicator.is_coordinator() {
                info!(
                    "Newton solver finished in {} iterations and {} linear solver iterations.",
                    self.iteration, linear_iterations
                );
            }
        } else if settings.error_on_nonconvergence {
            return Err(NewtonError::NonConvergence {
                iterations: self.iteration,
            });
        } else if self.communicator.is_coordinator() {
            warn!("Newton solver did not converge.");
        }

        Ok((self.iteration, converged))
    }

    /// Measures the norm of the selected vector and tests it against the tolerances.
    fn converged(&mut self, metric: Metric, settings: &NewtonSettings<T>) -> bool {
        let v = match metric {
            Metric::Residual => &self.f,
            Metric::Increment => &self.dx,
        };
        self.residual = l2_norm(v.as_slice(), &*self.communicator);

        let residual0 = *self.residual0.get_or_insert(self.residual);
        let relative_residual = relative(self.residual, residual0);

        if settings.report && self.communicator.is_coordinator() {
            info!(
                "Newton iteration {}: r (abs) = {:.3e} (tol = {:.3e}) r (rel) = {:.3e} (tol = {:.3e})",
                self.iteration,
                self.residual,
                settings.absolute_tolerance,
                relative_residual,
                settings.relative_tolerance
            );
        }

        relative_residual < settings.relative_tolerance || self.residual < settings.absolute_tolerance
    }
}
