//! The herald daemon: wires the switchboard and the runners together
//! from one TOML configuration file.

pub mod config;
pub mod controller;
