//! Packing-specification writer for the molecular packing engine.
//!
//! The packer reads its specification from stdin: a tolerance, an output
//! file, and one `structure ... end structure` block per molecule template,
//! each with a copy count and a rectangular target region.

use crate::engine::external::{EngineKind, Invocation};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Rectangular packing region, `min` and `max` corners in Angstroms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

#[derive(Debug, Clone)]
pub struct PackingEntry {
    /// Template coordinate file for one copy of the molecule.
    pub template: PathBuf,
    pub count: usize,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct PackingSpec {
    pub tolerance: f64,
    pub output: PathBuf,
    pub entries: Vec<PackingEntry>,
    pub seed: u64,
}

impl PackingSpec {
    pub fn new(output: PathBuf, seed: u64) -> Self {
        Self {
            tolerance: 2.0,
            output,
            entries: Vec::new(),
            seed,
        }
    }

    pub fn add(&mut self, template: PathBuf, count: usize, region: Region) -> &mut Self {
        self.entries.push(PackingEntry {
            template,
            count,
            region,
        });
        self
    }

    /// Render the specification. Entries with a zero copy count are omitted;
    /// the packer rejects a `number 0` block.
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("tolerance {}", self.tolerance),
            format!("seed {}", self.seed),
            "filetype pdb".to_string(),
            format!("output {}", self.output.display()),
        ];
        for entry in self.entries.iter().filter(|e| e.count > 0) {
            lines.push(format!("structure {}", entry.template.display()));
            lines.push(format!("  number {}", entry.count));
            lines.push(format!(
                "  inside box {} {} {} {} {} {}",
                entry.region.min[0],
                entry.region.min[1],
                entry.region.min[2],
                entry.region.max[0],
                entry.region.max[1],
                entry.region.max[2],
            ));
            lines.push("end structure".to_string());
        }
        let mut body = lines.join("\n");
        body.push('\n');
        body
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.render())
    }

    pub fn invocation(&self, program: &Path, spec_path: &Path, workdir: &Path) -> Invocation {
        Invocation {
            engine: EngineKind::Packing,
            program: program.to_path_buf(),
            args: Vec::new(),
            stdin_file: Some(spec_path.to_path_buf()),
            stdout_file: None,
            workdir: workdir.to_path_buf(),
            expected_outputs: vec![self.output.clone()],
        }
    }
}
