// Prime Count Estimator
//
// This crate estimates π(N) by summing 1/ln(n) over ever-advancing, disjoint
// slices of the integers on long-lived solver threads, with periodic
// reporting and checkpointing.

pub mod estimator;
pub mod logging;

// Re-export commonly used types
pub use estimator::*;
