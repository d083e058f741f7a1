//! Domain models: backends, hostgroups and the routing table they live in.

pub mod backend;
pub mod routing;
