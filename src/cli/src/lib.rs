//! platconf CLI - appliance update orchestrator front-end.

pub mod commands;
pub mod logging;
