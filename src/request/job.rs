use serde::Deserialize;

use crate::slurm::directive::Directive;
use crate::slurm::header::DirectiveSet;

/// A validated job manifest
#[derive(Debug, Clone, Deserialize)]
pub struct JobRequest {
    pub name: String,
    /// Runtime environment activated before the program runs
    pub environment: String,
    /// Invoked with no arguments
    pub program: String,
    #[serde(default)]
    pub directives: Vec<Directive>,
}

impl JobRequest {
    pub fn directive_set(&self) -> DirectiveSet {
        DirectiveSet::new(self.directives.clone())
    }
}
