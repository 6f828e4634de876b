//! Application layer containing the payment-completion reconciliation engine.
//!
//! The `PaymentPage` mounts one engine instance per page session. Every component proposes
//! status changes to the `Reconciler`, an actor task that is the single writer of the
//! `PaymentStatus`; all timers and pollers live in a `TaskScope` released on unmount.

pub mod heuristics;
pub mod listener;
pub mod page;
pub mod reconciler;
pub mod scope;
pub mod verification;
