//! Infrastructure layer with concrete implementations of the domain ports.
//!
//! The in-memory implementations are scripted or recording: they drive the engine from
//! tests and from the CLI replay harness.

pub mod in_memory;
