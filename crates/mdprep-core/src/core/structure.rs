//! Lightweight structure-file metadata.
//!
//! The external engines own all chemistry; the orchestrator only ever needs
//! shallow facts about the files they exchange: how many atoms a coordinate
//! or connectivity file describes, which chain letters appear, and the
//! bounding box of the coordinates (for solvation-cell sizing). These
//! scanners read the fixed-column PDB records and the `!NATOM` header of the
//! connectivity format; they deliberately parse nothing else.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("failed to read structure file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}' has no atom records")]
    NoAtoms { path: String },

    #[error("'{path}' has a malformed atom record at line {line}")]
    BadRecord { path: String, line: usize },

    #[error("connectivity file '{path}' has no !NATOM header")]
    NoAtomHeader { path: String },
}

/// Shallow facts about a coordinate file.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateSummary {
    pub atom_count: usize,
    pub chain_ids: BTreeSet<char>,
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl CoordinateSummary {
    pub fn extent(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// Scan ATOM/HETATM records of a PDB-format coordinate file.
pub fn coordinate_summary(path: &Path) -> Result<CoordinateSummary, StructureError> {
    let text = fs::read_to_string(path).map_err(|source| StructureError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let mut atom_count = 0usize;
    let mut chain_ids = BTreeSet::new();
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];

    for (lineno, line) in text.lines().enumerate() {
        if !(line.starts_with("ATOM") || line.starts_with("HETATM")) {
            continue;
        }
        let bad = || StructureError::BadRecord {
            path: path.display().to_string(),
            line: lineno + 1,
        };
        let coord = |range: std::ops::Range<usize>| -> Result<f64, StructureError> {
            line.get(range)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .ok_or_else(bad)
        };
        let x = coord(30..38)?;
        let y = coord(38..46)?;
        let z = coord(46..54)?;
        for (k, v) in [x, y, z].into_iter().enumerate() {
            min[k] = min[k].min(v);
            max[k] = max[k].max(v);
        }
        if let Some(chain) = line.get(21..22).and_then(|s| s.chars().next()) {
            if chain != ' ' {
                chain_ids.insert(chain);
            }
        }
        atom_count += 1;
    }

    if atom_count == 0 {
        return Err(StructureError::NoAtoms {
            path: path.display().to_string(),
        });
    }

    Ok(CoordinateSummary {
        atom_count,
        chain_ids,
        min,
        max,
    })
}

/// Atom count declared by the `!NATOM` header of a connectivity file.
pub fn topology_atom_count(path: &Path) -> Result<usize, StructureError> {
    let text = fs::read_to_string(path).map_err(|source| StructureError::Read {
        path: path.display().to_string(),
        source,
    })?;
    for line in text.lines() {
        if line.contains("!NATOM") {
            if let Some(count) = line.split_whitespace().next().and_then(|t| t.parse().ok()) {
                return Ok(count);
            }
        }
    }
    Err(StructureError::NoAtomHeader {
        path: path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn atom_line(serial: usize, chain: char, x: f64, y: f64, z: f64) -> String {
        format!(
            "ATOM  {:>5}  CA  ALA {}{:>4}    {:>8.3}{:>8.3}{:>8.3}  1.00  0.00           C\n",
            serial, chain, serial, x, y, z
        )
    }

    #[test]
    fn summarizes_atoms_chains_and_bounds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.pdb");
        let mut body = String::from("REMARK test\n");
        body.push_str(&atom_line(1, 'A', 0.0, 0.0, 0.0));
        body.push_str(&atom_line(2, 'A', 10.0, -5.0, 2.0));
        body.push_str(&atom_line(3, 'B', 4.0, 8.0, -3.0));
        body.push_str("END\n");
        std::fs::write(&path, body).unwrap();

        let summary = coordinate_summary(&path).unwrap();
        assert_eq!(summary.atom_count, 3);
        assert_eq!(
            summary.chain_ids.iter().collect::<Vec<_>>(),
            vec![&'A', &'B']
        );
        assert_eq!(summary.min, [0.0, -5.0, -3.0]);
        assert_eq!(summary.max, [10.0, 8.0, 2.0]);
        assert_eq!(summary.extent(), [10.0, 13.0, 5.0]);
    }

    #[test]
    fn file_without_atoms_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.pdb");
        std::fs::write(&path, "REMARK nothing here\nEND\n").unwrap();
        assert!(matches!(
            coordinate_summary(&path),
            Err(StructureError::NoAtoms { .. })
        ));
    }

    #[test]
    fn reads_natom_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.psf");
        std::fs::write(
            &path,
            "PSF\n\n       2 !NTITLE\n REMARKS a\n REMARKS b\n\n    1234 !NATOM\n",
        )
        .unwrap();
        assert_eq!(topology_atom_count(&path).unwrap(), 1234);
    }

    #[test]
    fn missing_natom_header_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.psf");
        std::fs::write(&path, "PSF\n").unwrap();
        assert!(matches!(
            topology_atom_count(&path),
            Err(StructureError::NoAtomHeader { .. })
        ));
    }
}
