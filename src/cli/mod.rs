pub mod commands;
pub mod options;

pub use options::{Cli, Options};
