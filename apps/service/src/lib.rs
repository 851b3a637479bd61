//! Host inventory monitoring service.
//!
//! Keeps a registry of IP addresses in a local LibSQL database and
//! periodically probes every one of them (echo request plus hostname
//! resolution), storing the latest outcome per host.

pub mod config;
pub mod database;
pub mod monitoring;
pub mod pool;
pub mod validation;

pub use config::Config;
