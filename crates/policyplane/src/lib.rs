//! policyplane maintains an in-memory topology of networking resources
//! (gateways, listeners, routes, services, backends) together with the
//! policies attached to them, and computes the effective policy applying to
//! each traffic path through the graph. A controller runtime multiplexes
//! informer events into reconcile cycles that always observe one consistent
//! snapshot of cache, topology and policy attachments.

pub use plane_core::prelude::*;

pub mod controller;
pub mod merge;
pub mod topology;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(test)]
mod controller_test;
#[cfg(test)]
mod workflow_test;
