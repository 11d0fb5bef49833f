//! Word timing estimation and post-processing

mod estimator;
mod post_process;

pub use estimator::TimingEstimator;
pub use post_process::{adjust_offsets, filter_punctuation, normalize_sequence, TimingPostProcessor};
