//! # Engine Module
//!
//! The stateful orchestration layer of mdprep. It sequences the heterogeneous
//! operations of a preparation pipeline, threading an immutable state handle
//! from task to task while the actual chemistry is carried out by external
//! engines invoked as blocking subprocesses.
//!
//! - **Task dispatch** ([`tasks`]) - the closed set of task kinds and the
//!   exhaustive dispatcher that executes one of them
//! - **Controller** ([`controller`]) - strictly serial execution of an ordered
//!   task list, with arena-style sub-controller spawning
//! - **External engines** ([`external`]) - script/config writers and the
//!   subprocess seam for the structure builder, the MD engine, and the packer
//! - **Membrane building** ([`membrane`]) - the patch/quilt state machine,
//!   including the asymmetric two-patch merge-and-trim algorithm
//! - **Error handling** ([`error`]) - the fatal-error taxonomy; no layer
//!   retries, every failure propagates unchanged to the run driver

pub mod context;
pub mod controller;
pub mod error;
pub mod external;
pub mod membrane;
pub mod progress;
pub mod tasks;
