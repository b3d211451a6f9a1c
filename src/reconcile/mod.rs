pub mod reconciler;

pub use reconciler::{canonicalize, verify_consistent, ReconcileConfig, Reconciler};
