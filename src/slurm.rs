//! Render job scripts, read their directive headers, and submit them to SLURM

/// A single `#SBATCH` resource directive
pub mod directive;

/// Read the directive header of an existing job script
pub mod header;

/// Read configuration templates and render them with manifest content
pub mod job;

/// Hand staged job scripts to sbatch
pub mod submit;
