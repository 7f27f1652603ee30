use std::fmt;
use clap::ValueEnum;

/// What the job script does when environment activation fails
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum ActivationFailure {
    /// Invoke the program anyway, like a plain shell script
    #[default]
    Continue,
    /// Exit with the activation status, the program never runs
    Stop
}

impl fmt::Display for ActivationFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ActivationFailure::Continue => write!(f, "continue"),
            ActivationFailure::Stop => write!(f, "stop")
        }
    }
}
