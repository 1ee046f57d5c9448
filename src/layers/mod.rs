pub mod activation_layer;
pub mod conv;
pub mod dense;
pub mod dropout;
pub mod layer;
pub mod param;
pub mod pool;

pub use activation_layer::{ActivationLayer, Flatten};
pub use conv::Conv2d;
pub use dense::Dense;
pub use dropout::Dropout;
pub use layer::Layer;
pub use param::Param;
pub use pool::MaxPool2d;
