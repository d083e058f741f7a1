//! Latency filtering, weight computation and weighted selection.

pub mod ewma;
pub mod sampling;
pub mod selector;
pub mod weights;
