pub mod check;
pub mod run;

use crate::error::{CliError, Result};
use mdprep::workflows::RunConfig;
use std::path::Path;

/// Load and deserialize a YAML run configuration.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    serde_yaml::from_str(&text).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}
