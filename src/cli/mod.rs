// file: src/cli/mod.rs
// version: 2.0.0
// guid: 58b0e3c7-2d94-4f1a-86e5-c3a71f9d0b24

//! Command line interface for the BLX provisioner

pub mod args;
pub mod commands;

pub use args::Cli;
pub use commands::*;
