// file: src/appliance/mod.rs
// version: 1.0.0
// guid: 0b5d8e2f-4c19-4a73-b6e8-92f1c7d3a504

//! Appliance provisioning: instance model, rendering and lifecycle orchestration

pub mod attempts;
pub mod distro;
pub mod host_tuning;
pub mod instance;
pub mod lifecycle;
pub mod offload;
pub mod package;
pub mod render;

pub use distro::DistroKind;
pub use instance::{ApplianceInstance, FilePathSet};
pub use lifecycle::{LifecycleState, LifecycleTimings, Operation, Orchestrator};
pub use render::{ConfigBlock, ConfigDocument};
