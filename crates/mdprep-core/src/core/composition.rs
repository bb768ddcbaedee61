//! Lipid leaflet compositions.
//!
//! A bilayer is described per leaflet as a list of lipid species with mole
//! fractions. Compositions are validated before any packing-engine process is
//! started; a composition whose fractions do not sum to one never reaches an
//! external engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance on the mole-fraction sum.
pub const FRACTION_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum CompositionError {
    #[error("leaflet composition is empty")]
    Empty,

    #[error("mole fractions sum to {sum:.4}, expected 1.0 +/- {FRACTION_TOLERANCE}")]
    BadSum { sum: f64 },

    #[error("lipid '{name}' has mole fraction {fraction}, expected a value in (0, 1]")]
    BadFraction { name: String, fraction: f64 },

    #[error("lipid '{name}' appears more than once in one leaflet")]
    Duplicate { name: String },
}

/// One lipid species within a leaflet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LipidSpecies {
    /// Residue name of the lipid, e.g. `POPC`.
    pub name: String,
    pub mole_fraction: f64,
    /// Index into the species' conformer library used as the packing template.
    #[serde(default)]
    pub conformer: usize,
}

/// Composition of one leaflet of a bilayer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeafletComposition {
    pub lipids: Vec<LipidSpecies>,
}

impl LeafletComposition {
    pub fn new(lipids: Vec<LipidSpecies>) -> Self {
        Self { lipids }
    }

    pub fn validate(&self) -> Result<(), CompositionError> {
        if self.lipids.is_empty() {
            return Err(CompositionError::Empty);
        }
        for lipid in &self.lipids {
            if !(lipid.mole_fraction > 0.0 && lipid.mole_fraction <= 1.0) {
                return Err(CompositionError::BadFraction {
                    name: lipid.name.clone(),
                    fraction: lipid.mole_fraction,
                });
            }
        }
        for (i, lipid) in self.lipids.iter().enumerate() {
            if self.lipids[..i].iter().any(|other| other.name == lipid.name) {
                return Err(CompositionError::Duplicate {
                    name: lipid.name.clone(),
                });
            }
        }
        let sum: f64 = self.lipids.iter().map(|l| l.mole_fraction).sum();
        if (sum - 1.0).abs() > FRACTION_TOLERANCE {
            return Err(CompositionError::BadSum { sum });
        }
        Ok(())
    }

    /// Apportion `total` molecules across the species by largest remainder,
    /// so the counts are deterministic and sum exactly to `total`.
    pub fn species_counts(&self, total: usize) -> Vec<(String, usize)> {
        let mut counts: Vec<(usize, String, usize, f64)> = self
            .lipids
            .iter()
            .enumerate()
            .map(|(i, l)| {
                let exact = l.mole_fraction * total as f64;
                let floor = exact.floor() as usize;
                (i, l.name.clone(), floor, exact - exact.floor())
            })
            .collect();

        let assigned: usize = counts.iter().map(|c| c.2).sum();
        let mut remainder = total.saturating_sub(assigned);

        // Largest fractional remainders first; original order breaks ties.
        let mut order: Vec<usize> = (0..counts.len()).collect();
        order.sort_by(|&a, &b| {
            counts[b]
                .3
                .partial_cmp(&counts[a].3)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        for idx in order {
            if remainder == 0 {
                break;
            }
            counts[idx].2 += 1;
            remainder -= 1;
        }

        counts.into_iter().map(|(_, name, n, _)| (name, n)).collect()
    }
}
