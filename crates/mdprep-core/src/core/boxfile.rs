//! Periodic-cell (extended-system) files.
//!
//! The MD engine records the evolving periodic cell in an extended-system
//! file: comment lines starting with `#`, then data rows of thirteen numbers
//! (`step a_x a_y a_z b_x b_y b_z c_x c_y c_z o_x o_y o_z`). The last data
//! row is the current cell. Box state is propagated between tasks by reading
//! the file a dynamics run emitted and referencing it from the next state
//! handle.

use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoxFileError {
    #[error("failed to read box file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write box file '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("box file '{path}' contains no data row")]
    NoData { path: String },

    #[error("box file '{path}' has a malformed data row: {row}")]
    BadRow { path: String, row: String },

    #[error("cell is not orthorhombic; lateral area is undefined")]
    NotOrthorhombic,
}

/// Periodic cell: three lattice vectors and an origin, in Angstroms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxVectors {
    pub a: [f64; 3],
    pub b: [f64; 3],
    pub c: [f64; 3],
    pub origin: [f64; 3],
}

impl BoxVectors {
    /// Orthorhombic cell from side lengths, centered on the origin.
    pub fn orthorhombic(lx: f64, ly: f64, lz: f64) -> Self {
        Self {
            a: [lx, 0.0, 0.0],
            b: [0.0, ly, 0.0],
            c: [0.0, 0.0, lz],
            origin: [0.0, 0.0, 0.0],
        }
    }

    fn is_orthorhombic(&self) -> bool {
        let off = [
            self.a[1], self.a[2], self.b[0], self.b[2], self.c[0], self.c[1],
        ];
        off.iter().all(|v| v.abs() < 1e-6)
    }

    /// Lateral (xy-plane) area of an orthorhombic cell.
    pub fn lateral_area(&self) -> Result<f64, BoxFileError> {
        if !self.is_orthorhombic() {
            return Err(BoxFileError::NotOrthorhombic);
        }
        Ok((self.a[0] * self.b[1]).abs())
    }

    /// Cell after lateral replication by `nx` x `ny` copies.
    pub fn replicated(&self, nx: usize, ny: usize) -> Self {
        let mut out = *self;
        for k in 0..3 {
            out.a[k] *= nx as f64;
            out.b[k] *= ny as f64;
        }
        out
    }

    /// Read the last data row of an extended-system file.
    pub fn read(path: &Path) -> Result<Self, BoxFileError> {
        let text = fs::read_to_string(path).map_err(|source| BoxFileError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let row = text
            .lines()
            .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
            .next_back()
            .ok_or_else(|| BoxFileError::NoData {
                path: path.display().to_string(),
            })?;

        let fields: Vec<f64> = row
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| BoxFileError::BadRow {
                path: path.display().to_string(),
                row: row.to_string(),
            })?;
        if fields.len() < 13 {
            return Err(BoxFileError::BadRow {
                path: path.display().to_string(),
                row: row.to_string(),
            });
        }

        Ok(Self {
            a: [fields[1], fields[2], fields[3]],
            b: [fields[4], fields[5], fields[6]],
            c: [fields[7], fields[8], fields[9]],
            origin: [fields[10], fields[11], fields[12]],
        })
    }

    /// Write a single-row extended-system file.
    pub fn write(&self, path: &Path, step: u64) -> Result<(), BoxFileError> {
        let mut file = fs::File::create(path).map_err(|source| BoxFileError::Write {
            path: path.display().to_string(),
            source,
        })?;
        let body = format!(
            "# mdprep extended system configuration\n\
             #$LABELS step a_x a_y a_z b_x b_y b_z c_x c_y c_z o_x o_y o_z\n\
             {} {} {} {} {} {} {} {} {} {} {} {} {}\n",
            step,
            self.a[0],
            self.a[1],
            self.a[2],
            self.b[0],
            self.b[1],
            self.b[2],
            self.c[0],
            self.c[1],
            self.c[2],
            self.origin[0],
            self.origin[1],
            self.origin[2],
        );
        file.write_all(body.as_bytes())
            .map_err(|source| BoxFileError::Write {
                path: path.display().to_string(),
                source,
            })
    }
}
