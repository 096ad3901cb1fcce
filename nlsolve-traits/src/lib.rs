use nalgebra::RealField;

pub use nalgebra;

/// Scalar type used throughout `nlsolve`.
///
/// Trait alias for real fields that are cheap to copy, i.e. `f32` and `f64` in practice.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
