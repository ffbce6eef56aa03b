pub mod document;
pub mod input;
pub mod output;

pub use document::*;
pub use input::*;
pub use output::*;
