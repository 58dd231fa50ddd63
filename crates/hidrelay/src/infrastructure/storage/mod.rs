//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration file, fills in
//! defaults for anything missing, and converts the result into the settings
//! structs the two relay tasks take.

pub mod config;
