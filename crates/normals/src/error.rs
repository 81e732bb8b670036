/// Errors raised while setting up a normal estimator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalEstimationError {
    /// A caller-supplied spatial index was built over a different point set.
    #[error("spatial index holds {index_len} points but the input has {points_len}")]
    IndexSizeMismatch { index_len: usize, points_len: usize },
}
