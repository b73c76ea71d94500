//! Application orchestration module

pub mod initialization;
pub mod execution;

pub use initialization::{build_environment, configure_logging, load_configuration, resolve_engine_config};
pub use execution::{load_capabilities, load_host, run_probe, PlannedCapability};
