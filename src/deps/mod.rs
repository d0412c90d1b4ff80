//! Dependency upgrade aggregation on the client side

pub mod aggregator;

pub use aggregator::{DependencyRecord, DependencyStatus, DependencyTable};
