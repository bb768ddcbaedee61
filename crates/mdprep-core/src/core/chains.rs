//! Chain-identifier bookkeeping.
//!
//! Topology edits that introduce new segments (insertions, cleavage products,
//! glycan grafts) need fresh chain letters that do not collide with anything
//! already in the system. The allocator is an explicit value owned by the
//! task performing the edit and threaded through its sub-steps; there is no
//! process-wide counter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ChainError {
    #[error("chain identifier space exhausted ({0} identifiers in use)")]
    Exhausted(usize),
}

/// Ordered map from chain letter to the segment id it carries in the
/// connectivity file.
pub type ChainIdMap = BTreeMap<char, String>;

const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Hands out chain letters in a fixed order, skipping any already present in
/// the map it was seeded from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainIdAllocator {
    used: Vec<char>,
}

impl ChainIdAllocator {
    /// Seed the allocator with the identifiers already present in a map.
    pub fn seeded_from(map: &ChainIdMap) -> Self {
        Self {
            used: map.keys().copied().collect(),
        }
    }

    pub fn new() -> Self {
        Self { used: Vec::new() }
    }

    /// Claim the next free identifier.
    pub fn allocate(&mut self) -> Result<char, ChainError> {
        for candidate in ALPHABET.chars() {
            if !self.used.contains(&candidate) {
                self.used.push(candidate);
                return Ok(candidate);
            }
        }
        Err(ChainError::Exhausted(self.used.len()))
    }

    /// Mark an identifier as in use without allocating it.
    pub fn reserve(&mut self, id: char) {
        if !self.used.contains(&id) {
            self.used.push(id);
        }
    }
}

impl Default for ChainIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
