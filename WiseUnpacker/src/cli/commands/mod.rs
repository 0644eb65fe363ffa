//! CLI commands

mod definitions;
mod execute;
pub mod extract;
pub mod info;

pub use definitions::Commands;
