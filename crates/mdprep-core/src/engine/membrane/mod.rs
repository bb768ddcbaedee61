//! Membrane patch and quilt construction.
//!
//! Split between the pure geometry and phase bookkeeping ([`patch`]) and
//! the engine-driving build sequence ([`bilayer`]). The task layer owns
//! parameter parsing and validation; this module assumes validated
//! compositions.

pub mod bilayer;
pub mod patch;

pub use bilayer::{build, BilayerSpec};
pub use patch::{BuildPhase, Leaflet, Patch};
