pub mod auth;
pub mod cli;
pub mod drive;
pub mod load_config;
pub mod progress;
pub mod storage;

pub use cli::{run, Cli, Commands, RunOutcome};
