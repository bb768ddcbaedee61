use crate::cli::RunArgs;
use crate::error::Result;
use crate::progress::CliProgressHandler;
use mdprep::engine::context::{EngineSet, RunContext};
use mdprep::engine::external::ProcessLauncher;
use mdprep::engine::progress::ProgressReporter;
use mdprep::workflows;
use tracing::info;

pub fn run(args: RunArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;

    let mut engines = EngineSet::default();
    if let Some(builder) = args.builder {
        engines.builder = builder;
    }
    if let Some(dynamics) = args.dynamics {
        engines.dynamics = dynamics;
    }
    if let Some(packer) = args.packer {
        engines.packing = packer;
    }
    if let Some(fetcher) = args.fetcher {
        engines.fetch = fetcher;
    }

    std::fs::create_dir_all(&args.workdir)?;
    info!(
        workdir = %args.workdir.display(),
        tasks = config.tasks.len(),
        "Starting preparation run."
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let launcher = ProcessLauncher;
    let ctx = RunContext::new(&args.workdir, &engines, &launcher, &reporter);

    let report = workflows::run(&config, &ctx)?;

    println!(
        "✓ Pipeline finished ({} task(s) scheduled).",
        report.scheduled_tasks
    );
    let state = &report.final_state;
    if let Some(topology) = &state.topology {
        println!("  connectivity: {}", topology.display());
    }
    if let Some(coordinates) = &state.coordinates {
        println!("  coordinates:  {}", coordinates.display());
    }
    if let Some(boxfile) = &state.boxfile {
        println!("  box:          {}", boxfile.display());
    }
    Ok(())
}
