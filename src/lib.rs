pub mod app;
pub mod cli;
pub mod compat;
pub mod config;
pub mod logging;
pub mod report;
