//! Patch records, build-phase bookkeeping, and the pure geometry of
//! bilayer construction.

use crate::core::state::StateHandle;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Segment id of the upper-leaflet lipids in merged systems.
pub const UPPER_SEGMENT: &str = "MEMU";
/// Segment id of the lower-leaflet lipids in merged systems.
pub const LOWER_SEGMENT: &str = "MEML";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaflet {
    Upper,
    Lower,
}

impl Leaflet {
    pub fn name(self) -> &'static str {
        match self {
            Leaflet::Upper => "upper",
            Leaflet::Lower => "lower",
        }
    }

    pub fn segment(self) -> &'static str {
        match self {
            Leaflet::Upper => UPPER_SEGMENT,
            Leaflet::Lower => LOWER_SEGMENT,
        }
    }
}

/// Progress of one membrane build. Transitions are validated so a coding
/// error in the build sequence fails loudly instead of silently skipping a
/// stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    NotStarted,
    PatchBuilt,
    PatchRelaxed,
    Merged,
    Replicated,
    ExcessTrimmed,
    FinalRelaxed,
}

impl BuildPhase {
    /// Step to `to`, rejecting transitions the build algorithm never makes.
    /// `Merged` and `ExcessTrimmed` only occur on the asymmetric path.
    pub fn advance(self, to: BuildPhase) -> Result<BuildPhase, String> {
        use BuildPhase::*;
        let allowed = matches!(
            (self, to),
            (NotStarted, PatchBuilt)
                | (PatchBuilt, PatchRelaxed)
                | (PatchRelaxed, Merged)
                | (PatchRelaxed, Replicated)
                | (Merged, Replicated)
                | (Replicated, ExcessTrimmed)
                | (Replicated, FinalRelaxed)
                | (ExcessTrimmed, FinalRelaxed)
        );
        if allowed {
            Ok(to)
        } else {
            Err(format!("membrane build phase {self:?} cannot advance to {to:?}"))
        }
    }
}

/// A relaxed bilayer patch: its system state plus the lateral area actually
/// measured from the equilibrated cell, never the initial packing guess.
#[derive(Debug, Clone)]
pub struct Patch {
    pub state: StateHandle,
    pub lipids_per_leaflet: usize,
    pub lateral_area: f64,
}

impl Patch {
    /// Measured surface area per lipid of one leaflet.
    pub fn sapl(&self) -> f64 {
        self.lateral_area / self.lipids_per_leaflet as f64
    }
}

/// Side length of the square patch that gives each of `lipids` lipids the
/// target surface area.
pub fn patch_side(lipids: usize, area_per_lipid: f64) -> f64 {
    (lipids as f64 * area_per_lipid).sqrt()
}

/// Number of lipids to remove from the leaflet contributed by the
/// larger-area patch so that both leaflets end up at matched areal density.
/// Rounds half up.
pub fn excess_lipid_count(leaflet_lipids: usize, larger_area: f64, smaller_area: f64) -> usize {
    let exact = leaflet_lipids as f64 * (larger_area / smaller_area - 1.0);
    // The ratio arithmetic can land a hair under a half boundary (for
    // instance 10 * 0.15 evaluates to 1.4999999999999998); snap to a 1e-9
    // grid so the half still rounds up.
    let snapped = (exact * 1e9).round() / 1e9;
    (snapped + 0.5).floor() as usize
}

/// Which leaflet of the merged patch loses lipids: the one contributed by
/// the patch whose equilibrated area came out larger (the lower areal
/// density side). Equal areas need no trim.
pub fn trimmed_leaflet(upper_area: f64, lower_area: f64) -> Option<Leaflet> {
    if (upper_area - lower_area).abs() < f64::EPSILON {
        None
    } else if upper_area > lower_area {
        Some(Leaflet::Upper)
    } else {
        Some(Leaflet::Lower)
    }
}

/// Residue ids (1-based) of the lipids deleted from the trimmed leaflet,
/// drawn without replacement across the whole quilt so removals are spread
/// over all replica positions. Deterministic for a given seed. An excess at
/// or beyond the leaflet count selects every residue; `sample` aborts if
/// asked for more than the population holds.
pub fn select_trimmed_residues(leaflet_lipids: usize, excess: usize, seed: u64) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let excess = excess.min(leaflet_lipids);
    let mut picked: Vec<i32> = rand::seq::index::sample(&mut rng, leaflet_lipids, excess)
        .into_iter()
        .map(|i| i as i32 + 1)
        .collect();
    picked.sort_unstable();
    picked
}
