pub mod architecture;
pub mod classifier;
pub mod metadata;
pub mod network;
pub mod spec;

pub use architecture::Architecture;
pub use classifier::Classifier;
pub use metadata::{InputType, ModelMetadata};
pub use network::{Network, CONV_DROPOUT, IMAGE_SHAPE, NUM_CLASSES};
pub use spec::{LayerSpec, NetworkSpec};
