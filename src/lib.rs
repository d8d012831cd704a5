//! Ensemble - provisions clusters of distributed services
//!
//! Ensemble turns a declarative cluster spec into a running, wired-together
//! group of machines on a compute provider. It provides:
//!
//! - Cluster spec loading from YAML with command-line overrides
//! - Role launch planning
//! - A launch pipeline: create, authorize, bootstrap, configure, assemble
//! - ZooKeeper and Cassandra service definitions
//! - Simulated and bring-your-own-node compute providers

pub mod cluster;
pub mod config;
pub mod error;
pub mod firewall;
pub mod orchestrator;
pub mod planner;
pub mod provider;
pub mod script;
pub mod service;
pub mod spec;

pub use error::{EnsembleError, Result};
