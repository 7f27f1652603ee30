use std::path::PathBuf;

use crate::policy::ActivationFailure;

/// Settings shared by every subcommand, built once from CLI options and environment variables
#[derive(Debug, Clone)]
pub struct Settings {
    /// Interpreter for the job script, also written as its shebang
    pub shell: PathBuf,
    /// Command prefix that activates a named environment, e.g. `source activate`
    pub activate: String,
    pub sbatch: PathBuf,
    pub on_activation_failure: ActivationFailure,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            shell: PathBuf::from("/bin/bash"),
            activate: "source activate".to_string(),
            sbatch: PathBuf::from("sbatch"),
            on_activation_failure: ActivationFailure::Continue,
        }
    }
}
