pub mod stage0_chunk;
pub mod stage1_map;
pub mod stage2_reduce;
pub mod stage3_refine;

pub use stage0_chunk::*;
pub use stage1_map::*;
pub use stage2_reduce::*;
pub use stage3_refine::*;
