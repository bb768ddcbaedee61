//! # mdprep Core Library
//!
//! A pipeline orchestrator that prepares biomolecular structures for
//! molecular-dynamics simulation. It sequences heterogeneous, long-running
//! operations (structure building, ligation, membrane-patch packing, energy
//! minimization and equilibration) that are carried out by external engines,
//! while maintaining a consistent, resumable system state.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a
//! clear separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Stateless data models and pure functions:
//!   the artifact naming registry, state handles, chain-id allocation,
//!   leaflet compositions, and lightweight structure-file metadata.
//!
//! - **[`engine`]: The Logic Core.** The stateful orchestration layer: task
//!   dispatch, the `Controller` that threads state handles through an ordered
//!   task list, adapters for the external build/packing/simulation engines,
//!   and the membrane patch builder.
//!
//! - **[`workflows`]: The Public API.** The highest-level, user-facing layer.
//!   It ties `engine` and `core` together to execute a complete preparation
//!   pipeline from a parsed run configuration.

pub mod core;
pub mod engine;
pub mod workflows;
