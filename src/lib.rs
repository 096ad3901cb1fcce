//! Newton–Raphson driver for nonlinear systems $F(x) = 0$ with sparse Jacobians.
//!
//! The driver ([`NewtonSolver`](newton::NewtonSolver)) is generic over two capabilities:
//! a [`NonlinearProblem`](problem::NonlinearProblem) that evaluates the residual and Jacobian,
//! and a [`LinearSolver`](sparse::LinearSolver) that solves the Newton systems.
pub mod newton;
pub mod parameters;
pub mod problem;

pub mod sparse {
    pub use nlsolve_sparse::*;
}

pub use nlsolve_traits::Real;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
