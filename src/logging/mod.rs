// file: src/logging/mod.rs
// version: 2.0.0
// guid: 6a2f8d41-c37e-4b90-9e15-b84d0c7a31f6

//! Logging setup for the provisioner

pub mod logger;

pub use logger::{init_file_logger, init_json_logger, init_logger, with_async_operation_span};
