//! Stateless data models and pure helpers shared by the orchestration engine.

pub mod boxfile;
pub mod chains;
pub mod composition;
pub mod naming;
pub mod state;
pub mod structure;
