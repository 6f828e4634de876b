//! Domain layer: the payment status model, the embedded-channel message model, the
//! interaction heuristics' data, the reconciliation precedence table and the ports
//! through which the engine reaches its collaborators.

pub mod message;
pub mod ports;
pub mod reconcile;
pub mod status;
pub mod tally;
