pub mod cached;
pub mod client;
#[cfg(test)]
pub mod mock;
pub mod prompts;
pub mod retry;
pub mod validation;

pub use cached::*;
pub use client::*;
pub use prompts::*;
pub use retry::*;
pub use validation::*;
