pub mod deployment;
pub mod naming;
pub mod reconcile;

pub use reconcile::{error_policy, reconcile, Context, ReconcileError};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "ingress_test.rs"]
mod tests;
