use nalgebra::{DVector, DVectorViewMut, Scalar};
use nlsolve_traits::Real;
use std::error::Error;
use std::fmt;

/// An orthonormal set of vectors, e.g. spanning the null space of a singular operator.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSpaceBasis<T: Scalar> {
    basis: Vec<DVector<T>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotOrthonormal;

impl fmt::Display for NotOrthonormal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector space basis is not orthonormal.")
    }
}

impl Error for NotOrthonormal {}

impl<T: Real> VectorSpaceBasis<T> {
    /// Creates a basis without verifying orthonormality.
    pub fn new(basis: Vec<DVector<T>>) -> Self {
        Self { basis }
    }

    /// Creates a basis, failing if the vectors are not orthonormal to (a small multiple of)
    /// machine precision.
    pub fn new_checked(basis: Vec<DVector<T>>) -> Result<Self, NotOrthonormal> {
        let basis = Self::new(basis);
        if basis.is_orthonormal() {
            Ok(basis)
        } else {
            Err(NotOrthonormal)
        }
    }

    pub fn is_orthonormal(&self) -> bool {
        let eps = T::default_epsilon() * nalgebra::convert::<f64, T>(10.0);
        for (i, b_i) in self.basis.iter().enumerate() {
            for (j, b_j) in self.basis.iter().enumerate().skip(i) {
                let delta_ij = if i == j { T::one() } else { T::zero() };
                if b_i.len() != b_j.len() || (delta_ij - b_i.dot(b_j)).abs() > eps {
                    return false;
                }
            }
        }
        true
    }

    /// Removes the components of `x` along the basis vectors.
    ///
    /// # Panics
    ///
    /// Panics if the dimension of `x` does not match the dimension of the basis vectors.
    pub fn orthogonalize<'a>(&self, x: impl Into<DVectorViewMut<'a, T>>) {
        let mut x = x.into();
        for b_i in &self.basis {
            let dot = b_i.dot(&x);
            x.axpy(-dot, b_i, T::one());
        }
    }

    pub fn len(&self) -> usize {
        self.basis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.basis.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&DVector<T>> {
        self.basis.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DVector<T>> {
        self.basis.iter()
    }
}
