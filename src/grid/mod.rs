pub mod block;
pub mod hash;
pub mod index;
pub mod layer;

pub use block::Block;
pub use index::{BlockIndex, GlobalVoxelIndex, LocalVoxelIndex};
pub use layer::Layer;
