//! Global norm reductions over (possibly distributed) vectors.
use nlsolve_traits::Real;
use rayon::prelude::*;
use std::fmt::Debug;

/// Vectors shorter than this are reduced serially.
const PARALLEL_THRESHOLD: usize = 1 << 14;
const CHUNK_SIZE: usize = 4096;

/// Collective communication used by reductions over distributed vectors.
///
/// Each process owns a local part of every vector. Reductions first reduce the local part,
/// then combine the local results across all processes with [`Communicator::sum`].
pub trait Communicator<T>: Debug + Send + Sync {
    /// Index of this process.
    fn rank(&self) -> usize;

    /// Total number of participating processes.
    fn size(&self) -> usize;

    /// Sums `local` over all processes. Every process receives the same result.
    ///
    /// This is a collective, blocking operation.
    fn sum(&self, local: T) -> T;

    /// Whether this process is responsible for emitting diagnostics.
    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }
}

/// The trivial communicator of a non-distributed run.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SerialCommunicator;

impl<T> Communicator<T> for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn sum(&self, local: T) -> T {
        local
    }
}

/// Computes the squared Euclidean norm of the locally owned entries.
pub fn local_norm_squared<T: Real>(v: &[T]) -> T {
    let sum_squares = |chunk: &[T]| chunk.iter().fold(T::zero(), |acc, &v_i| acc + v_i * v_i);
    if v.len() < PARALLEL_THRESHOLD {
        sum_squares(v)
    } else {
        v.par_chunks(CHUNK_SIZE)
            .map(sum_squares)
            .reduce(T::zero, |a, b| a + b)
    }
}

/// Computes the global $\ell^2$ norm of a distributed vector, given its locally owned entries.
pub fn l2_norm<T: Real>(v: &[T], communicator: &dyn Communicator<T>) -> T {
    communicator.sum(local_norm_squared(v)).sqrt()
}
