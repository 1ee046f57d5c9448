pub mod dataset;
pub mod idx;

pub use dataset::Dataset;
