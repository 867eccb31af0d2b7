//! Automation callback intake.

pub mod payload;
pub mod reconciler;

pub use payload::{CallbackFlow, CallbackPayload, RawCallback};
pub use reconciler::{CallbackReconciler, ReconcileOutcome};
