//! Sparse linear solvers, operators and norm reductions for `nlsolve`.
pub mod bicgstab;
pub mod cg;
pub mod direct;
pub mod krylov;
pub mod krylov_solver;
pub mod linear_solver;
pub mod norm;
pub mod nullspace;
pub mod operator;

pub use linear_solver::{DefaultLinearSolver, LinearSolver, LinearSolverError};
pub use nalgebra_sparse::{CooMatrix, CscMatrix, CsrMatrix};
pub use norm::{Communicator, SerialCommunicator};
