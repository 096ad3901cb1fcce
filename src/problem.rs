//! The nonlinear problem capability consumed by [`NewtonSolver`](crate::newton::NewtonSolver).
use nalgebra::{DVectorView, DVectorViewMut, Scalar};

/// A nonlinear system of equations $F(x) = 0$ together with its Jacobian $J(x)$.
///
/// The Jacobian is stored in a matrix of type `M`, which must be compatible with the
/// operator type of the linear solver used to solve the Newton systems.
///
/// Any error returned by a problem is treated as fatal by the solver.
pub trait NonlinearProblem<T: Scalar, M> {
    /// Computes the residual $F(x)$. The output vector has the same dimension as `x`.
    fn residual(&mut self, f: DVectorViewMut<T>, x: DVectorView<T>) -> eyre::Result<()>;

    /// Computes the Jacobian $J(x)$.
    ///
    /// The matrix is owned by the solver and reused between iterations. It is empty on the first
    /// call, so implementations are responsible for giving it the right shape.
    fn jacobian(&mut self, jacobian: &mut M, x: DVectorView<T>) -> eyre::Result<()>;

    /// Hook called before the residual and Jacobian are evaluated at a new iterate.
    ///
    /// Problems that share intermediate quantities between $F$ and $J$ can compute them here.
    /// The default implementation does nothing.
    fn form(&mut self, _jacobian: &mut M, _f: DVectorViewMut<T>, _x: DVectorView<T>) -> eyre::Result<()> {
        Ok(())
    }
}

impl<'a, T, M, P> NonlinearProblem<T, M> for &'a mut P
where
    T: Scalar,
    P: ?Sized + NonlinearProblem<T, M>,
{
    fn residual(&mut self, f: DVectorViewMut<T>, x: DVectorView<T>) -> eyre::Result<()> {
        P::residual(self, f, x)
    }

    fn jacobian(&mut self, jacobian: &mut M, x: DVectorView<T>) -> eyre::Result<()> {
        P::jacobian(self, jacobian, x)
    }

    fn form(&mut self, jacobian: &mut M, f: DVectorViewMut<T>, x: DVectorView<T>) -> eyre::Result<()> {
        P::form(self, jacobian, f, x)
    }
}

/// Signature of the no-op form hook used when no hook is given.
pub type NoForm<T, M> = fn(&mut M, DVectorViewMut<T>, DVectorView<T>) -> eyre::Result<()>;

fn no_form<T: Scalar, M>(_jacobian: &mut M, _f: DVectorViewMut<T>, _x: DVectorView<T>) -> eyre::Result<()> {
    Ok(())
}

/// Builds a [`NonlinearProblem`] from closures.
///
/// ```
/// # use nlsolve::problem::ProblemBuilder;
/// # use nlsolve::nalgebra::{DMatrix, DVectorView, DVectorViewMut};
/// let problem = ProblemBuilder::new()
///     .with_residual(|mut f: DVectorViewMut<f64>, x: DVectorView<f64>| {
///         f[0] = x[0] * x[0] - 2.0;
///         Ok(())
///     })
///     .with_jacobian(|j: &mut DMatrix<f64>, x: DVectorView<f64>| {
///         *j = DMatrix::from_element(1, 1, 2.0 * x[0]);
///         Ok(())
///     });
/// # let _ = problem;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProblemBuilder;

/// A [`NonlinearProblem`] defined by closures. Constructed with [`ProblemBuilder`].
#[derive(Debug, Clone)]
pub struct ClosureProblem<F, J, H> {
    residual: F,
    jacobian: J,
    form: H,
}

impl ProblemBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn with_residual<F, T>(self, residual: F) -> ClosureProblem<F, (), ()>
    where
        T: Scalar,
        F: FnMut(DVectorViewMut<T>, DVectorView<T>) -> eyre::Result<()>,
    {
        ClosureProblem {
            residual,
            jacobian: (),
            form: (),
        }
    }
}

impl<F> ClosureProblem<F, (), ()> {
    pub fn with_jacobian<J, T, M>(self, jacobian: J) -> ClosureProblem<F, J, NoForm<T, M>>
    where
        T: Scalar,
        J: FnMut(&mut M, DVectorView<T>) -> eyre::Result<()>,
    {
        ClosureProblem {
            residual: self.residual,
            jacobian,
            form: no_form::<T, M>,
        }
    }
}

impl<F, J, T, M> ClosureProblem<F, J, NoForm<T, M>> {
    pub fn with_form<H>(self, form: H) -> ClosureProblem<F, J, H>
    where
        T: Scalar,
        H: FnMut(&mut M, DVectorViewMut<T>, DVectorView<T>) -> eyre::Result<()>,
    {
        ClosureProblem {
            residual: self.residual,
            jacobian: self.jacobian,
            form,
        }
    }
}

impl<T, M, F, J, H> NonlinearProblem<T, M> for ClosureProblem<F, J, H>
where
    T: Scalar,
    F: FnMut(DVectorViewMut<T>, DVectorView<T>) -> eyre::Result<()>,
    J: FnMut(&mut M, DVectorView<T>) -> eyre::Result<()>,
    H: FnMut(&mut M, DVectorViewMut<T>, DVectorView<T>) -> eyre::Result<()>,
{
    fn residual(&mut self, f: DVectorViewMut<T>, x: DVectorView<T>) -> eyre::Result<()> {
        (self.residual)(f, x)
    }

    fn jacobian(&mut self, jacobian: &mut M, x: DVectorView<T>) -> eyre::Result<()> {
        (self.jacobian)(jacobian, x)
    }

    fn form(&mut self, jacobian: &mut M, f: DVectorViewMut<T>, x: DVectorView<T>) -> eyre::Result<()> {
        (self.form)(jacobian, f, x)
    }
}
