pub mod builders;
pub mod clock;
pub mod ingress;
pub mod services;
pub mod store;
pub mod strategies;

#[cfg(test)]
pub(crate) mod fixtures;

pub use ingress::{error_policy, reconcile, Context, ReconcileError};
