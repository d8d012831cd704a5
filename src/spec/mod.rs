//! Declarative cluster specifications
//!
//! A cluster spec names the service, the compute provider, the key pair
//! injected into nodes and how many instances each role needs.

pub mod config;
pub mod parser;

pub use config::{ByonHost, ClusterSpec, InstanceTemplate, KeyPair};
pub use parser::{ClusterSpecParser, SpecDocument, SpecOverrides};
