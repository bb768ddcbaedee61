use crate::cli::CheckArgs;
use crate::error::Result;
use mdprep::workflows;
use tracing::info;

pub fn run(args: CheckArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;
    workflows::check(&config)?;

    info!(tasks = config.tasks.len(), "Configuration is valid.");
    println!(
        "✓ Configuration is valid: {} task(s) scheduled.",
        config.tasks.len()
    );
    Ok(())
}
