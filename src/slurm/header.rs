use log::{debug, info};
use thiserror::Error;

use crate::slurm::directive::{Directive, ERROR, EXCLUSIVE, GPU, MARKER, MEMORY, OUTPUT};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {reason}")]
pub struct HeaderError {
    pub line: usize,
    pub reason: String,
}

/// Directives in the order they appear in a job script
///
/// Duplicates are kept as written, precedence is up to the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectiveSet {
    directives: Vec<Directive>,
}

impl DirectiveSet {
    pub fn new(directives: Vec<Directive>) -> DirectiveSet {
        DirectiveSet { directives }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter()
    }

    pub fn active(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter().filter(|d| d.enabled)
    }

    pub fn inert(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter().filter(|d| !d.enabled)
    }

    /// The last enabled directive for a key
    pub fn get(&self, key: &str) -> Option<&Directive> {
        self.directives.iter().rev().find(|d| d.enabled && d.key == key)
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Log the well-known resource requests that the scheduler will act on
    pub fn log_resources(&self) {
        for key in [GPU, MEMORY, OUTPUT, ERROR, EXCLUSIVE] {
            match self.get(key) {
                Some(directive) => info!("Requesting {}", directive),
                None => debug!("No active {} directive", key),
            }
        }
    }
}

/// Read the directive header of a job script
///
/// Like sbatch, reading stops at the first line that is not blank and not a comment. Directives
/// after that point are never seen by the scheduler, so they aren't returned either.
pub fn parse_header(script: &str) -> Result<DirectiveSet, HeaderError> {
    let mut directives: Vec<Directive> = Vec::new();

    for (i, raw) in script.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with('#') {
            debug!("Header ends at line {}", i + 1);
            break;
        }

        let unmarked = line.trim_start_matches('#');
        let hashes = line.len() - unmarked.len();
        let option = match unmarked.strip_prefix(&MARKER[1..]) {
            Some(option) => option,
            None => continue,
        };
        // "#SBATCHX" is an ordinary comment
        if !(option.is_empty() || option.starts_with(char::is_whitespace)) {
            continue;
        }

        let enabled = hashes == 1;
        let directive = Directive::parse_option(option, enabled)
            .map_err(|reason| HeaderError { line: i + 1, reason })?;
        directives.push(directive);
    }

    let set = DirectiveSet::new(directives);
    info!("Read {} directives from header, {} inert", set.len(), set.inert().count());
    Ok(set)
}
