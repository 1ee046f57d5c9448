pub mod state_dict;
pub mod store;

pub use state_dict::StateDict;
pub use store::{CheckpointInfo, CheckpointStore};
