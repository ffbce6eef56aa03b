pub mod chunk;
pub mod extraction;
pub mod meeting;
pub mod outcome;
pub mod protocol;
pub mod segment;

pub use chunk::*;
pub use extraction::*;
pub use meeting::*;
pub use outcome::*;
pub use protocol::*;
pub use segment::*;
