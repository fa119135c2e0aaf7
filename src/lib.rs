pub mod cli;
pub mod load_config;
pub mod plan;

pub use cli::{run, Cli, Commands};
