use eyre::eyre;
use log::Level;
use matrixcompare::assert_scalar_eq;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, Dyn, LU};
use nlsolve::newton::{default_parameters, ConvergenceCriterion, NewtonError, NewtonSettings, NewtonSolver};
use nlsolve::parameters::{Parameter, Parameters};
use nlsolve::problem::{NonlinearProblem, ProblemBuilder};
use nlsolve::sparse::{Communicator, CsrMatrix, DefaultLinearSolver, LinearSolver};
use proptest::prelude::*;
use std::error::Error;
use std::sync::Arc;
use util::{assert_approx_matrix_eq, capture_logs, messages_at};

/// Dense LU solver that counts how often it is used.
#[derive(Debug, Default)]
struct CountingLuSolver {
    lu: Option<LU<f64, Dyn, Dyn>>,
    set_operator_calls: usize,
    solve_calls: usize,
}

impl LinearSolver<f64> for CountingLuSolver {
    type Operator = DMatrix<f64>;

    fn set_operator(&mut self, operator: &DMatrix<f64>) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.set_operator_calls += 1;
        self.lu = Some(operator.clone().lu());
        Ok(())
    }

    fn solve(&mut self, mut x: DVectorViewMut<f64>, b: DVectorView<f64>) -> Result<usize, Box<dyn Error + Send + Sync>> {
        self.solve_calls += 1;
        let lu = self.lu.as_ref().ok_or("no operator")?;
        let solution = lu.solve(&b).ok_or("singular operator")?;
        x.copy_from(&solution);
        Ok(1)
    }
}

/// F(x) = A x - b, recording the order in which it is evaluated.
struct LinearProblem {
    a: DMatrix<f64>,
    b: DVector<f64>,
    events: Vec<&'static str>,
}

impl LinearProblem {
    fn new() -> Self {
        Self {
            a: DMatrix::from_row_slice(3, 3, &[5.0, 1.0, 2.0, 1.0, 4.0, 2.0, 2.0, 2.0, 4.0]),
            b: DVector::from_column_slice(&[1.0, 2.0, 3.0]),
            events: Vec::new(),
        }
    }

    fn exact_solution(&self) -> DVector<f64> {
        self.a.clone().lu().solve(&self.b).unwrap()
    }

    fn count(&self, event: &str) -> usize {
        self.events.iter().filter(|e| **e == event).count()
    }
}

impl NonlinearProblem<f64, DMatrix<f64>> for LinearProblem {
    fn residual(&mut self, mut f: DVectorViewMut<f64>, x: DVectorView<f64>) -> eyre::Result<()> {
        self.events.push("residual");
        f.copy_from(&(&self.a * x - &self.b));
        Ok(())
    }

    fn jacobian(&mut self, jacobian: &mut DMatrix<f64>, _x: DVectorView<f64>) -> eyre::Result<()> {
        self.events.push("jacobian");
        jacobian.clone_from(&self.a);
        Ok(())
    }

    fn form(&mut self, _jacobian: &mut DMatrix<f64>, _f: DVectorViewMut<f64>, _x: DVectorView<f64>) -> eyre::Result<()> {
        self.events.push("form");
        Ok(())
    }
}

/// Communicator simulating a run where every process owns an identical copy of the local data.
#[derive(Debug)]
struct ReplicatedCommunicator {
    rank: usize,
    size: usize,
}

impl Communicator<f64> for ReplicatedCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn sum(&self, local: f64) -> f64 {
        local * self.size as f64
    }
}

fn lu_newton() -> NewtonSolver<f64, CountingLuSolver> {
    NewtonSolver::new(CountingLuSolver::default())
}

fn sqrt2_newton(criterion: &str) -> NewtonSolver<f64, CountingLuSolver> {
    let mut solver = lu_newton();
    solver.parameters.set("relative_tolerance", 1e-10).unwrap();
    solver.parameters.set("absolute_tolerance", 1e-12).unwrap();
    solver.parameters.set("maximum_iterations", 20).unwrap();
    solver.parameters.set("convergence_criterion", criterion).unwrap();
    solver
}

fn sqrt2_problem() -> impl NonlinearProblem<f64, DMatrix<f64>> {
    ProblemBuilder::new()
        .with_residual(|mut f: DVectorViewMut<f64>, x: DVectorView<f64>| {
            f[0] = x[0] * x[0] - 2.0;
            Ok(())
        })
        .with_jacobian(|j: &mut DMatrix<f64>, x: DVectorView<f64>| {
            *j = DMatrix::from_element(1, 1, 2.0 * x[0]);
            Ok(())
        })
}

#[test]
fn default_settings_match_default_parameters() {
    let settings = NewtonSettings::<f64>::from_parameters(&default_parameters()).unwrap();
    assert_eq!(settings, NewtonSettings::default());
    assert_eq!(settings.maximum_iterations, 10);
    assert_eq!(settings.relative_tolerance, 1e-9);
    assert_eq!(settings.absolute_tolerance, 1e-10);
    assert_eq!(settings.convergence_criterion, ConvergenceCriterion::Residual);
    assert_eq!(settings.relaxation_parameter, 1.0);
    assert!(settings.report);
    assert!(settings.error_on_nonconvergence);
    assert_eq!(default_parameters().get_string("method").unwrap(), "full");
}

#[test]
fn convergence_criterion_parses_known_names() {
    assert_eq!("residual".parse::<ConvergenceCriterion>().unwrap(), ConvergenceCriterion::Residual);
    assert_eq!(
        "incremental".parse::<ConvergenceCriterion>().unwrap(),
        ConvergenceCriterion::Incremental
    );
    assert!(matches!(
        "bogus".parse::<ConvergenceCriterion>(),
        Err(NewtonError::InvalidConfiguration(_))
    ));
    assert_eq!(ConvergenceCriterion::Incremental.to_string(), "incremental");
}

#[test]
fn settings_reject_invalid_values() {
    let invalid = [
        ("maximum_iterations", Parameter::Int(-1)),
        ("relative_tolerance", Parameter::Real(-1e-3)),
        ("absolute_tolerance", Parameter::Real(-1e-3)),
        ("relaxation_parameter", Parameter::Real(0.0)),
        ("convergence_criterion", Parameter::from("bogus")),
    ];
    for (key, value) in invalid {
        let mut parameters = default_parameters();
        parameters.set(key, value).unwrap();
        let result = NewtonSettings::<f64>::from_parameters(&parameters);
        assert!(
            matches!(result, Err(NewtonError::InvalidConfiguration(_))),
            "{} must be rejected",
            key
        );
    }
}

#[test]
fn newton_converges_in_single_iteration_for_linear_system() {
    for max_iter in [1, 2, 10] {
        let mut problem = LinearProblem::new();
        let mut solver = lu_newton();
        solver.parameters.set("maximum_iterations", max_iter).unwrap();

        let mut x = DVector::zeros(3);
        let (iterations, converged) = solver.solve(&mut problem, &mut x).unwrap();

        assert_eq!(iterations, 1);
        assert!(converged);
        assert_eq!(solver.iteration(), 1);
        assert_approx_matrix_eq!(&x, &problem.exact_solution(), abstol = 1e-12);
        assert_eq!(solver.linear_solver().set_operator_calls, 1);
        assert_eq!(solver.linear_solver().solve_calls, 1);
    }
}

#[test]
fn problem_is_evaluated_in_order() {
    let mut problem = LinearProblem::new();
    let mut solver = lu_newton();
    let mut x = DVector::zeros(3);
    solver.solve(&mut problem, &mut x).unwrap();

    assert_eq!(
        problem.events,
        vec!["residual", "form", "jacobian", "form", "residual"]
    );
}

#[test]
fn linear_solver_operator_is_rebound_every_iteration() {
    let mut problem = sqrt2_problem();
    let mut solver = sqrt2_newton("residual");
    let mut x = DVector::from_element(1, 1.0);
    let (iterations, _) = solver.solve(&mut problem, &mut x).unwrap();

    assert_eq!(solver.linear_solver().set_operator_calls, iterations);
    assert_eq!(solver.linear_solver().solve_calls, iterations);
}

// With the incremental criterion, the first increment only establishes the reference norm,
// so a linear system takes a second (vanishing) step before convergence is detected.
#[test]
fn incremental_criterion_takes_a_second_step_for_linear_system() {
    let mut problem = LinearProblem::new();
    let mut solver = lu_newton();
    solver.parameters.set("convergence_criterion", "incremental").unwrap();

    let mut x = DVector::zeros(3);
    let (iterations, converged) = solver.solve(&mut problem, &mut x).unwrap();

    assert_eq!(iterations, 2);
    assert!(converged);
    assert_approx_matrix_eq!(&x, &problem.exact_solution(), abstol = 1e-12);
    // Residual evaluations: initial, plus one per step
    assert_eq!(problem.count("residual"), 3);
    assert_eq!(problem.count("jacobian"), 2);
}

#[test]
fn sqrt2_scenario_residual_criterion() {
    let mut problem = sqrt2_problem();
    let mut solver = sqrt2_newton("residual");
    let mut x = DVector::from_element(1, 1.0);

    let (iterations, converged) = solver.solve(&mut problem, &mut x).unwrap();

    assert!(converged);
    assert_eq!(iterations, 4);
    assert_scalar_eq!(x[0], 2.0f64.sqrt(), comp = abs, tol = 1e-11);
}

#[test]
fn sqrt2_scenario_incremental_criterion() {
    let mut problem = sqrt2_problem();
    let mut solver = sqrt2_newton("incremental");
    let mut x = DVector::from_element(1, 1.0);

    let (iterations, converged) = solver.solve(&mut problem, &mut x).unwrap();

    assert!(converged);
    assert_eq!(iterations, 5);
    assert_scalar_eq!(x[0], 2.0f64.sqrt(), comp = abs, tol = 1e-14);
}

#[test]
fn sqrt2_scenario_with_default_sparse_solver() {
    let mut problem = ProblemBuilder::new()
        .with_residual(|mut f: DVectorViewMut<f64>, x: DVectorView<f64>| {
            f[0] = x[0] * x[0] - 2.0;
            Ok(())
        })
        .with_jacobian(|j: &mut CsrMatrix<f64>, x: DVectorView<f64>| {
            *j = CsrMatrix::from(&DMatrix::from_element(1, 1, 2.0 * x[0]));
            Ok(())
        });

    for method in ["full", "lu", "cholesky", "cg", "bicgstab"] {
        let mut solver = NewtonSolver::<f64, DefaultLinearSolver<f64>>::from_method(method, "default").unwrap();
        solver.parameters.set("relative_tolerance", 1e-10).unwrap();
        solver.parameters.set("absolute_tolerance", 1e-12).unwrap();
        solver.parameters.set("maximum_iterations", 20).unwrap();

        let mut x = DVector::from_element(1, 1.0);
        let (iterations, converged) = solver.solve(&mut problem, &mut x).unwrap();
        assert!(converged, "method {}", method);
        assert!((4..=6).contains(&iterations), "method {}", method);
        assert_scalar_eq!(x[0], 2.0f64.sqrt(), comp = abs, tol = 1e-10);
    }
}

#[test]
fn relative_residual_is_relative_to_first_measurement() {
    // Residual criterion: the reference is the initial residual, which is b for x = 0
    let mut problem = LinearProblem::new();
    let mut solver = lu_newton();
    let mut x = DVector::zeros(3);
    solver.solve(&mut problem, &mut x).unwrap();
    assert_scalar_eq!(
        solver.relative_residual(),
        solver.residual() / problem.b.norm(),
        comp = float
    );

    // Incremental criterion: the reference is the first increment, which is the exact solution
    // for x = 0
    let mut problem = LinearProblem::new();
    let mut solver = lu_newton();
    solver.parameters.set("convergence_criterion", "incremental").unwrap();
    let mut x = DVector::zeros(3);
    solver.solve(&mut problem, &mut x).unwrap();
    assert_scalar_eq!(
        solver.relative_residual(),
        solver.residual() / problem.exact_solution().norm(),
        comp = float
    );
}

#[test]
fn relative_residual_is_zero_when_reference_and_residual_vanish() {
    let mut problem = LinearProblem::new();
    let mut solver = lu_newton();
    // Integer data, so the residual vanishes exactly
    let mut x = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
    problem.b = &problem.a * &x;

    assert_eq!(solver.relative_residual(), 0.0);
    let (iterations, converged) = solver.solve(&mut problem, &mut x).unwrap();
    assert_eq!((iterations, converged), (0, true));
    assert_eq!(solver.residual(), 0.0);
    assert_eq!(solver.relative_residual(), 0.0);
}

#[test]
fn zero_max_iterations_with_residual_criterion_converges_without_linear_solve() {
    let mut problem = LinearProblem::new();
    let mut x = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
    problem.b = &problem.a * &x;

    let mut solver = lu_newton();
    solver.parameters.set("maximum_iterations", 0).unwrap();
    let result = solver.solve(&mut problem, &mut x).unwrap();

    assert_eq!(result, (0, true));
    assert_eq!(solver.linear_solver().set_operator_calls, 0);
    assert_eq!(solver.linear_solver().solve_calls, 0);
    assert_eq!(problem.count("jacobian"), 0);
}

#[test]
fn zero_max_iterations_with_incremental_criterion_never_converges() {
    let mut problem = LinearProblem::new();
    let mut x = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
    problem.b = &problem.a * &x;

    let mut solver = lu_newton();
    solver.parameters.set("maximum_iterations", 0).unwrap();
    solver.parameters.set("convergence_criterion", "incremental").unwrap();
    let result = solver.solve(&mut problem, &mut x);
    assert!(matches!(result, Err(NewtonError::NonConvergence { iterations: 0 })));

    solver.parameters.set("error_on_nonconvergence", false).unwrap();
    let result = solver.solve(&mut problem, &mut x).unwrap();
    assert_eq!(result, (0, false));
    assert_eq!(solver.linear_solver().solve_calls, 0);
}

#[test]
fn solve_is_idempotent_for_converged_iterate() {
    let mut problem = sqrt2_problem();
    let mut solver = sqrt2_newton("residual");
    let mut x = DVector::from_element(1, 1.0);
    solver.solve(&mut problem, &mut x).unwrap();
    let x_converged = x.clone();

    // The reference norm is now the converged residual itself, so convergence is reconfirmed
    // through the (default) absolute tolerance
    solver.parameters.set("absolute_tolerance", 1e-10).unwrap();
    for _ in 0..2 {
        let result = solver.solve(&mut problem, &mut x).unwrap();
        assert_eq!(result, (0, true));
        assert_eq!(x, x_converged);
        assert_eq!(solver.linear_solver().solve_calls, 4);
    }
}

#[test]
fn unknown_criterion_fails_before_any_evaluation() {
    let mut problem = LinearProblem::new();
    let mut solver = lu_newton();
    solver.parameters.set("convergence_criterion", "bogus").unwrap();

    let mut x = DVector::zeros(3);
    let result = solver.solve(&mut problem, &mut x);

    assert!(matches!(result, Err(NewtonError::InvalidConfiguration(_))));
    assert!(problem.events.is_empty());
    assert_eq!(solver.linear_solver().solve_calls, 0);
}

#[test]
fn relaxation_parameter_damps_the_step() {
    let mut problem = LinearProblem::new();
    let mut solver = lu_newton();
    solver.parameters.set("relaxation_parameter", 0.5).unwrap();
    solver.parameters.set("maximum_iterations", 1).unwrap();
    solver.parameters.set("error_on_nonconvergence", false).unwrap();

    let mut x = DVector::zeros(3);
    let (iterations, converged) = solver.solve(&mut problem, &mut x).unwrap();
    assert_eq!((iterations, converged), (1, false));
    assert_approx_matrix_eq!(&x, &(0.5 * problem.exact_solution()), abstol = 1e-12);

    // Every damped step halves the residual, and 2^-30 is the first power below 1e-9
    let mut problem = LinearProblem::new();
    solver.parameters.set("maximum_iterations", 50).unwrap();
    let mut x = DVector::zeros(3);
    let (iterations, converged) = solver.solve(&mut problem, &mut x).unwrap();
    assert_eq!((iterations, converged), (30, true));
}

#[test]
fn nonconvergence_is_an_error_by_default() {
    let mut problem = LinearProblem::new();
    let mut solver = lu_newton();
    solver.parameters.set("relaxation_parameter", 0.5).unwrap();
    solver.parameters.set("maximum_iterations", 3).unwrap();

    let mut x = DVector::zeros(3);
    let result = solver.solve(&mut problem, &mut x);
    assert!(matches!(result, Err(NewtonError::NonConvergence { iterations: 3 })));
    // The last iterate is kept
    assert_approx_matrix_eq!(&x, &(0.875 * problem.exact_solution()), abstol = 1e-12);
}

#[test]
fn nonconvergence_is_a_warning_when_configured() {
    let mut problem = LinearProblem::new();
    let mut solver = lu_newton();
    solver.parameters.set("relaxation_parameter", 0.5).unwrap();
    solver.parameters.set("maximum_iterations", 3).unwrap();
    solver.parameters.set("error_on_nonconvergence", false).unwrap();

    let mut x = DVector::zeros(3);
    let (result, records) = capture_logs(|| solver.solve(&mut problem, &mut x));

    assert_eq!(result.unwrap(), (3, false));
    assert_eq!(messages_at(&records, Level::Warn), vec!["Newton solver did not converge."]);
}

#[test]
fn report_logs_every_iteration_and_summary() {
    let mut problem = sqrt2_problem();
    let mut solver = sqrt2_newton("residual");
    let mut x = DVector::from_element(1, 1.0);

    let (result, records) = capture_logs(|| solver.solve(&mut problem, &mut x));
    assert_eq!(result.unwrap(), (4, true));

    let info = messages_at(&records, Level::Info);
    assert_eq!(info.len(), 6);
    assert_eq!(
        info[0],
        "Newton iteration 0: r (abs) = 1.000e0 (tol = 1.000e-12) r (rel) = 1.000e0 (tol = 1.000e-10)"
    );
    assert!(info[4].starts_with("Newton iteration 4: r (abs) = "));
    assert_eq!(
        info[5],
        "Newton solver finished in 4 iterations and 4 linear solver iterations."
    );
}

#[test]
fn report_can_be_disabled() {
    let mut problem = sqrt2_problem();
    let mut solver = sqrt2_newton("residual");
    solver.parameters.set("report", false).unwrap();
    let mut x = DVector::from_element(1, 1.0);

    let (result, records) = capture_logs(|| solver.solve(&mut problem, &mut x));
    assert!(result.is_ok());
    assert_eq!(
        messages_at(&records, Level::Info),
        vec!["Newton solver finished in 4 iterations and 4 linear solver iterations."]
    );
}

#[test]
fn only_coordinator_reports() {
    let mut problem = sqrt2_problem();
    let mut solver = sqrt2_newton("residual")
        .with_communicator(Arc::new(ReplicatedCommunicator { rank: 1, size: 2 }));
    solver.parameters.set("error_on_nonconvergence", false).unwrap();
    solver.parameters.set("maximum_iterations", 1).unwrap();
    let mut x = DVector::from_element(1, 1.0);

    let (result, records) = capture_logs(|| solver.solve(&mut problem, &mut x));
    assert_eq!(result.unwrap(), (1, false));
    assert!(messages_at(&records, Level::Info).is_empty());
    assert!(messages_at(&records, Level::Warn).is_empty());
}

#[test]
fn norms_are_reduced_over_communicator() {
    let mut problem = sqrt2_problem();
    let mut solver = sqrt2_newton("residual")
        .with_communicator(Arc::new(ReplicatedCommunicator { rank: 0, size: 4 }));
    solver.parameters.set("maximum_iterations", 0).unwrap();
    solver.parameters.set("error_on_nonconvergence", false).unwrap();
    let mut x = DVector::from_element(1, 3.0);

    solver.solve(&mut problem, &mut x).unwrap();
    // |F(3)| = 7 on each of the 4 processes
    assert_scalar_eq!(solver.residual(), 14.0, comp = float);
}

#[test]
fn problem_failures_are_propagated() {
    let mut failing_residual = ProblemBuilder::new()
        .with_residual(|_f: DVectorViewMut<f64>, _x: DVectorView<f64>| Err(eyre!("residual failed")))
        .with_jacobian(|_j: &mut DMatrix<f64>, _x: DVectorView<f64>| Ok(()));
    let mut x = DVector::zeros(1);
    let result = lu_newton().solve(&mut failing_residual, &mut x);
    assert!(matches!(result, Err(NewtonError::ProblemEvaluationFailure(_))));

    let mut failing_jacobian = ProblemBuilder::new()
        .with_residual(|mut f: DVectorViewMut<f64>, _x: DVectorView<f64>| {
            f.fill(1.0);
            Ok(())
        })
        .with_jacobian(|_j: &mut DMatrix<f64>, _x: DVectorView<f64>| Err(eyre!("jacobian failed")));
    let mut solver = lu_newton();
    let result = solver.solve(&mut failing_jacobian, &mut x);
    match result {
        Err(err @ NewtonError::ProblemEvaluationFailure(_)) => {
            assert!(err.source().is_some());
            assert!(err.to_string().contains("jacobian failed"));
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(solver.linear_solver().solve_calls, 0);
}

#[test]
fn linear_solver_failures_are_propagated() {
    let mut singular = LinearProblem::new();
    singular.a = DMatrix::zeros(3, 3);
    let mut solver = lu_newton();
    let mut x = DVector::zeros(3);

    let result = solver.solve(&mut singular, &mut x);
    assert!(matches!(result, Err(NewtonError::LinearSolverFailure(_))));
    assert_eq!(solver.linear_solver().solve_calls, 1);
    assert_eq!(solver.iteration(), 0);
}

#[test]
fn cholesky_fails_on_nonsymmetric_jacobian() {
    let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 3.0, 4.0]);
    let b = DVector::from_column_slice(&[1.0, 2.0]);
    let jacobian = CsrMatrix::from(&a);
    let mut problem = ProblemBuilder::new()
        .with_residual(move |mut f: DVectorViewMut<f64>, x: DVectorView<f64>| {
            f.copy_from(&(&a * x - &b));
            Ok(())
        })
        .with_jacobian(move |j: &mut CsrMatrix<f64>, _x: DVectorView<f64>| {
            *j = jacobian.clone();
            Ok(())
        });

    let mut solver = NewtonSolver::<f64, DefaultLinearSolver<f64>>::from_method("cholesky", "default").unwrap();
    let mut x = DVector::zeros(2);
    let result = solver.solve(&mut problem, &mut x);
    assert!(matches!(result, Err(NewtonError::LinearSolverFailure(_))));
    assert_eq!(solver.iteration(), 0);
}

#[test]
fn solver_can_be_reused_for_problems_of_different_size() {
    let mut solver = lu_newton();

    let mut scalar = sqrt2_problem();
    let mut x = DVector::from_element(1, 1.0);
    solver.parameters.set("maximum_iterations", 20).unwrap();
    assert!(solver.solve(&mut scalar, &mut x).unwrap().1);

    let mut linear = LinearProblem::new();
    let mut x = DVector::zeros(3);
    assert_eq!(solver.solve(&mut linear, &mut x).unwrap(), (1, true));
}

#[test]
fn from_method_rejects_unknown_names() {
    let result = NewtonSolver::<f64, DefaultLinearSolver<f64>>::from_method("bogus", "default");
    assert!(matches!(result, Err(NewtonError::InvalidConfiguration(_))));
    let result = NewtonSolver::<f64, DefaultLinearSolver<f64>>::from_method("cg", "bogus");
    assert!(matches!(result, Err(NewtonError::InvalidConfiguration(_))));

    let solver = NewtonSolver::<f64, DefaultLinearSolver<f64>>::from_method("bicgstab", "jacobi").unwrap();
    assert_eq!(solver.linear_solver().method_name(), "bicgstab");
    assert_eq!(solver.parameters.get_string("method").unwrap(), "bicgstab");
}

#[test]
fn with_parameters_merges_into_defaults() {
    let parameters = Parameters::new("newton_solver")
        .with("maximum_iterations", 25)
        .with("method", "cg");
    let solver = NewtonSolver::<f64, DefaultLinearSolver<f64>>::with_parameters(&parameters).unwrap();

    assert_eq!(solver.linear_solver().method_name(), "cg");
    assert_eq!(solver.parameters.get_int("maximum_iterations").unwrap(), 25);
    assert_eq!(solver.parameters.get_real("relative_tolerance").unwrap(), 1e-9);

    let unknown = Parameters::new("newton_solver").with("tolerance", 1e-3);
    let result = NewtonSolver::<f64, DefaultLinearSolver<f64>>::with_parameters(&unknown);
    assert!(matches!(result, Err(NewtonError::InvalidConfiguration(_))));

    let invalid = Parameters::new("newton_solver").with("relaxation_parameter", -1.0);
    let result = NewtonSolver::<f64, DefaultLinearSolver<f64>>::with_parameters(&invalid);
    assert!(matches!(result, Err(NewtonError::InvalidConfiguration(_))));
}

proptest! {
    #[test]
    fn newton_finds_square_roots(c in 0.5..100.0f64, x0 in 1.0..20.0f64) {
        let mut problem = ProblemBuilder::new()
            .with_residual(move |mut f: DVectorViewMut<f64>, x: DVectorView<f64>| {
                f[0] = x[0] * x[0] - c;
                Ok(())
            })
            .with_jacobian(|j: &mut DMatrix<f64>, x: DVectorView<f64>| {
                *j = DMatrix::from_element(1, 1, 2.0 * x[0]);
                Ok(())
            });
        let mut solver = lu_newton();
        solver.parameters.set("maximum_iterations", 50).unwrap();
        solver.parameters.set("relative_tolerance", 1e-12).unwrap();
        solver.parameters.set("report", false).unwrap();

        let mut x = DVector::from_element(1, x0);
        let (iterations, converged) = solver.solve(&mut problem, &mut x).unwrap();
        prop_assert!(converged);
        prop_assert!(iterations <= 15);
        prop_assert!((x[0] - c.sqrt()).abs() <= 1e-8 * c.sqrt());
    }
}
