//! High-level entry points intended for external callers.
//!
//! A workflow owns the translation from a declarative run configuration to
//! a root controller and back to a result the caller can report on. All
//! policy lives below; this layer only sequences and validates.

pub mod prepare;

pub use prepare::{check, run, RunConfig, RunReport};
