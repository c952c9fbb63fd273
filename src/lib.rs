//! Medical Scanner library
//! Discovers BLE thermometers, ranks them by signal strength, connects to one
//! and streams decoded temperature readings.

// Module declarations
pub mod commands;
pub mod config;
pub mod core;
pub mod logging;
pub mod state;
pub mod utils;
