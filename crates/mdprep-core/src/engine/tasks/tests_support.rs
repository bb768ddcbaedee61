//! Shared fixtures for task tests: a tempdir-backed working directory and a
//! fake launcher that fabricates the artifacts an engine invocation promises,
//! so pipelines can be exercised end-to-end without external binaries.

use crate::core::boxfile::BoxVectors;
use crate::core::naming::ControllerId;
use crate::engine::context::{EngineSet, RunContext};
use crate::engine::external::{EngineKind, ExternalError, Invocation, Launch};
use crate::engine::progress::ProgressReporter;
use crate::engine::tasks::TaskIo;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub(crate) fn pdb_atom_line(serial: usize, chain: char, x: f64, y: f64, z: f64) -> String {
    format!(
        "ATOM  {:>5}  CA  ALA {}{:>4}    {:>8.3}{:>8.3}{:>8.3}  1.00  0.00           C\n",
        serial,
        chain,
        (serial % 9000) + 1,
        x,
        y,
        z
    )
}

pub(crate) fn pdb_body(atoms: usize, chains: &[char]) -> String {
    let mut body = String::new();
    for i in 0..atoms {
        let chain = chains[i % chains.len()];
        body.push_str(&pdb_atom_line(
            i + 1,
            chain,
            i as f64,
            (i as f64) * 0.5,
            -(i as f64),
        ));
    }
    body.push_str("END\n");
    body
}

pub(crate) fn psf_body(atoms: usize) -> String {
    format!("PSF\n\n       1 !NTITLE\n REMARKS fabricated\n\n{:>8} !NATOM\n", atoms)
}

/// Fabricates every expected output of an invocation with content the
/// orchestrator's shallow parsers accept. Dynamics runs echo whatever cell
/// their run configuration references, so equilibration preserves the box
/// unless a test overrides the side for a specific launch.
#[derive(Default)]
pub(crate) struct FakeLauncher {
    pub invocations: RefCell<Vec<Invocation>>,
    /// Atom count fabricated psf/pdb files describe.
    pub atoms: Cell<usize>,
    /// Lateral box side fabricated xsc files describe when no cell can be
    /// echoed from the run configuration.
    pub box_side: Cell<f64>,
    /// Lateral box side per launch index, overriding the echoed cell.
    pub box_side_for: RefCell<BTreeMap<usize, f64>>,
    /// Fail the n-th launch (0-based) with a non-zero status.
    pub fail_on: Cell<Option<usize>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        let launcher = Self::default();
        launcher.atoms.set(12);
        launcher.box_side.set(40.0);
        launcher
    }

    pub fn launches(&self) -> usize {
        self.invocations.borrow().len()
    }

    /// Cell a dynamics run would carry through: the one named by the
    /// `extendedSystem` line of its run configuration.
    fn echoed_cell(&self, invocation: &Invocation) -> Option<BoxVectors> {
        if invocation.engine != EngineKind::Dynamics {
            return None;
        }
        let conf = invocation.args.first()?;
        let text = std::fs::read_to_string(conf).ok()?;
        let cell_path = text
            .lines()
            .find_map(|line| line.strip_prefix("extendedSystem "))?;
        BoxVectors::read(Path::new(cell_path)).ok()
    }
}

impl Launch for FakeLauncher {
    fn launch(&self, invocation: &Invocation) -> Result<(), ExternalError> {
        let index = self.invocations.borrow().len();
        self.invocations.borrow_mut().push(invocation.clone());

        if self.fail_on.get() == Some(index) {
            return Err(ExternalError::Failed {
                engine: invocation.engine,
                status: "exit status: 1".into(),
            });
        }

        for path in &invocation.expected_outputs {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            match ext {
                "psf" => std::fs::write(path, psf_body(self.atoms.get())),
                "pdb" | "coor" => std::fs::write(path, pdb_body(self.atoms.get(), &['A'])),
                "xsc" => {
                    let cell = self
                        .box_side_for
                        .borrow()
                        .get(&index)
                        .map(|&side| BoxVectors::orthorhombic(side, side, 90.0))
                        .or_else(|| self.echoed_cell(invocation))
                        .unwrap_or_else(|| {
                            let side = self.box_side.get();
                            BoxVectors::orthorhombic(side, side, 90.0)
                        });
                    cell.write(path, 0).expect("fabricate xsc");
                    Ok(())
                }
                _ => std::fs::write(path, "fabricated\n"),
            }
            .expect("fabricate output");
        }

        if let Some(log) = &invocation.stdout_file {
            std::fs::write(
                log,
                "ETITLE:      TS      TEMP   DENSITY\n\
                 ENERGY:       0     310.0    0.95\n\
                 ENERGY:     100     309.0    1.01\n",
            )
            .expect("fabricate log");
        }
        Ok(())
    }
}

pub(crate) struct TestHarness {
    pub dir: TempDir,
    pub engines: EngineSet,
    pub launcher: FakeLauncher,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
            engines: EngineSet::default(),
            launcher: FakeLauncher::new(),
        }
    }

    pub fn workdir(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_pdb(&self, name: &str, atoms: usize, chains: &[char]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, pdb_body(atoms, chains)).unwrap();
        path
    }

    pub fn write_psf(&self, name: &str, atoms: usize) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, psf_body(atoms)).unwrap();
        path
    }

    pub fn write_xsc(&self, name: &str, lx: f64, ly: f64, lz: f64) -> PathBuf {
        let path = self.dir.path().join(name);
        BoxVectors::orthorhombic(lx, ly, lz).write(&path, 0).unwrap();
        path
    }

    /// Run a closure against a `TaskIo` rooted at controller "00".
    pub fn with_io<R>(
        &self,
        label: &str,
        task_index: usize,
        f: impl FnOnce(&mut TaskIo) -> R,
    ) -> R {
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(self.dir.path(), &self.engines, &self.launcher, &reporter);
        let mut io = TaskIo::new(&ctx, ControllerId::root(), task_index, label);
        f(&mut io)
    }

    /// Run a closure against a full run context (for controller-level tests).
    pub fn with_ctx<R>(&self, f: impl FnOnce(&RunContext) -> R) -> R {
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(self.dir.path(), &self.engines, &self.launcher, &reporter);
        f(&ctx)
    }
}
