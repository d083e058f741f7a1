//! Sluice Core functionality.
//!
//! This crate contains the domain models, the latency filtering and weight
//! computation primitives, and the adaptive controller loop that re-weights a
//! proxy hostgroup of read replicas based on measured round-trip latency.

pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod load_balancer;
pub mod probe;

pub use config::ControllerConfig;
pub use controller::{Controller, CycleOutcome, CycleReport};
pub use domain::backend::{Backend, HostgroupId};
pub use domain::routing::{RoutingStore, RoutingTable};
pub use error::{BackendParseError, ConfigError, StoreError};
pub use probe::Prober;
