pub mod affine;
pub mod ranges;

pub use affine::{affine_matrix, geometric_transform, normalize, AffineBatch, SamplingMode};
pub use ranges::AugmentRanges;
