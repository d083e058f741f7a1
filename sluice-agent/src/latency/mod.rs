//! Latency probes against live replicas.

pub mod prober;
