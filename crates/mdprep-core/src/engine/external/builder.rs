//! Script writer for the structure-building engine.
//!
//! The builder consumes a line-oriented script naming its inputs, the
//! topology edits to perform, and the connectivity/coordinate files it must
//! write. The orchestrator composes directives; what each directive means
//! chemically is the engine's business.

use crate::engine::external::{EngineKind, Invocation};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct BuildScript {
    lines: Vec<String>,
}

impl BuildScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an existing system (connectivity optional for raw coordinates).
    pub fn read_structure(&mut self, topology: Option<&Path>, coordinates: &Path) -> &mut Self {
        if let Some(psf) = topology {
            self.lines.push(format!("readpsf {}", psf.display()));
        }
        self.lines
            .push(format!("coordpdb {}", coordinates.display()));
        self
    }

    pub fn mutate(&mut self, chain: char, resid: i32, to: &str) -> &mut Self {
        self.lines.push(format!("mutate {chain} {resid} {to}"));
        self
    }

    pub fn delete_range(&mut self, chain: char, start: i32, end: i32) -> &mut Self {
        self.lines.push(format!("delete {chain} {start} {end}"));
        self
    }

    pub fn insert(&mut self, chain: char, after: i32, sequence: &str) -> &mut Self {
        self.lines
            .push(format!("insert {chain} {after} {sequence}"));
        self
    }

    pub fn disulfide(
        &mut self,
        chain_a: char,
        resid_a: i32,
        chain_b: char,
        resid_b: i32,
    ) -> &mut Self {
        self.lines.push(format!(
            "patch DISU {chain_a}:{resid_a} {chain_b}:{resid_b}"
        ));
        self
    }

    /// Graft a donor fragment (e.g. a glycan) onto an anchor residue,
    /// placing it in a freshly allocated segment.
    pub fn graft(
        &mut self,
        donor: &Path,
        donor_chain: char,
        at_chain: char,
        at_resid: i32,
        new_chain: char,
    ) -> &mut Self {
        self.lines.push(format!(
            "graft {} {donor_chain} {at_chain}:{at_resid} {new_chain}",
            donor.display()
        ));
        self
    }

    /// Record a residue gap the builder leaves unresolved for a later
    /// ligation.
    pub fn mark_gap(&mut self, chain: char, start: i32, end: i32) -> &mut Self {
        self.lines.push(format!("gap {chain} {start} {end}"));
        self
    }

    /// Close a previously marked gap into a continuous covalent chain.
    pub fn ligate(&mut self, chain: char, start: i32, end: i32) -> &mut Self {
        self.lines.push(format!("ligate {chain} {start} {end}"));
        self
    }

    /// Split a chain after `at_resid`; the downstream half becomes
    /// `new_chain`.
    pub fn cleave(&mut self, chain: char, at_resid: i32, new_chain: char) -> &mut Self {
        self.lines
            .push(format!("cleave {chain} {at_resid} {new_chain}"));
        self
    }

    pub fn swap_domain(
        &mut self,
        chain: char,
        start: i32,
        end: i32,
        donor: &Path,
        donor_chain: char,
        donor_start: i32,
        donor_end: i32,
    ) -> &mut Self {
        self.lines.push(format!(
            "swap {chain}:{start}-{end} {} {donor_chain}:{donor_start}-{donor_end}",
            donor.display()
        ));
        self
    }

    /// Merge another coordinate set (e.g. packed solvent or a lipid quilt)
    /// into the system under construction.
    pub fn merge_coordinates(&mut self, coordinates: &Path) -> &mut Self {
        self.lines
            .push(format!("mergepdb {}", coordinates.display()));
        self
    }

    pub fn delete_segment(&mut self, segid: &str) -> &mut Self {
        self.lines.push(format!("delseg {segid}"));
        self
    }

    pub fn delete_residue(&mut self, segid: &str, resid: i32) -> &mut Self {
        self.lines.push(format!("delres {segid} {resid}"));
        self
    }

    /// Select one leaflet of a bilayer patch as the source for a merge.
    pub fn take_leaflet(&mut self, coordinates: &Path, leaflet: &str) -> &mut Self {
        self.lines
            .push(format!("leaflet {leaflet} {}", coordinates.display()));
        self
    }

    /// Replicate the system laterally into an nx-by-ny quilt.
    pub fn replicate(&mut self, nx: usize, ny: usize) -> &mut Self {
        self.lines.push(format!("replicate {nx} {ny}"));
        self
    }

    pub fn write_outputs(&mut self, topology: &Path, coordinates: &Path) -> &mut Self {
        self.lines.push(format!("writepsf {}", topology.display()));
        self.lines
            .push(format!("writepdb {}", coordinates.display()));
        self
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let mut body = self.lines.join("\n");
        body.push('\n');
        fs::write(path, body)
    }

    /// Invocation running this script (already written to `script_path`).
    pub fn invocation(
        program: &Path,
        script_path: &Path,
        workdir: &Path,
        expected_outputs: Vec<PathBuf>,
    ) -> Invocation {
        Invocation {
            engine: EngineKind::StructureBuilder,
            program: program.to_path_buf(),
            args: vec![script_path.display().to_string()],
            stdin_file: None,
            stdout_file: None,
            workdir: workdir.to_path_buf(),
            expected_outputs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn composes_directives_in_order() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("build.in");
        let mut builder = BuildScript::new();
        builder
            .read_structure(None, Path::new("in.pdb"))
            .mutate('A', 123, "SER")
            .disulfide('A', 10, 'A', 50)
            .mark_gap('A', 70, 75)
            .write_outputs(Path::new("out.psf"), Path::new("out.pdb"));
        builder.write_to(&script).unwrap();

        let text = std::fs::read_to_string(&script).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "coordpdb in.pdb");
        assert_eq!(lines[1], "mutate A 123 SER");
        assert_eq!(lines[2], "patch DISU A:10 A:50");
        assert_eq!(lines[3], "gap A 70 75");
        assert_eq!(lines[4], "writepsf out.psf");
        assert_eq!(lines[5], "writepdb out.pdb");
    }

    #[test]
    fn invocation_carries_expected_outputs() {
        let inv = BuildScript::invocation(
            Path::new("psfgen"),
            Path::new("/w/script.in"),
            Path::new("/w"),
            vec![PathBuf::from("/w/out.psf"), PathBuf::from("/w/out.pdb")],
        );
        assert_eq!(inv.engine, EngineKind::StructureBuilder);
        assert_eq!(inv.args, vec!["/w/script.in".to_string()]);
        assert_eq!(inv.expected_outputs.len(), 2);
    }
}
