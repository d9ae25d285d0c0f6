// crates/cli/src/lib.rs
//! Operator CLI over the job history ledger.
pub mod args;
pub mod commands;
pub mod config;

pub use args::{Cli, Command};
pub use commands::{execute, JobView};
pub use config::{CliConfig, RegistryConfig};
