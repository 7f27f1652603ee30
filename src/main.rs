use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use crate::config::Settings;
use crate::launch::Launcher;
use crate::policy::ActivationFailure;
use crate::request::job::JobRequest;
use crate::request::manifest::Manifest;
use crate::request::schema::load_schema;
use crate::slurm::header::parse_header;
use crate::slurm::job::WorkingDirectory;
use crate::slurm::submit::ensure_log_directories;

mod config;
mod launch;
mod policy;
mod request;
mod slurm;

#[derive(Parser, Debug)]
#[command(name = "jobwrap")]
#[command(author = "jobwrap developers")]
#[command(version = "0.1.0")]
#[command(about = "Render, run and submit single-program batch jobs")]
#[command(long_about = "
Describe a batch job as a JSON manifest (resource directives, a runtime environment and one \
program) and turn it into a SLURM job script. The script activates the environment once and then \
invokes the program with no arguments; its exit status is the program's.
")]
struct Args {
    /// Shell that runs the job script, also written as its shebang
    #[arg(long, env = "JOBWRAP_SHELL", default_value = "/bin/bash", global = true)]
    shell: PathBuf,
    /// Command prefix that activates a named environment
    #[arg(long, env = "JOBWRAP_ACTIVATE", default_value = "source activate", global = true)]
    activate: String,
    /// Path to sbatch
    #[arg(long, env = "JOBWRAP_SBATCH", default_value = "sbatch", global = true)]
    sbatch: PathBuf,
    /// What to do when environment activation fails
    #[arg(long, value_enum, env = "JOBWRAP_ACTIVATION_FAILURE", default_value_t = ActivationFailure::Continue, global = true)]
    activation_failure: ActivationFailure,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the job script for a manifest
    Render {
        manifest: PathBuf,
        /// Write the script here instead of standard output
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Run the job here, outside the scheduler, and exit with its status
    Run { manifest: PathBuf },
    /// Stage the job script in a working directory and submit it with sbatch
    Submit {
        manifest: PathBuf,
        /// Directory to stage job scripts in
        #[arg(short, long)]
        work_dir: PathBuf,
        /// Stage the script but don't call sbatch
        #[arg(long)]
        dry_run: bool,
    },
    /// List the directives in an existing job script
    Inspect { script: PathBuf },
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            shell: self.shell.clone(),
            activate: self.activate.clone(),
            sbatch: self.sbatch.clone(),
            on_activation_failure: self.activation_failure,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    info!("jobwrap starting up");

    let args = Args::parse();
    let settings = args.settings();

    match dispatch(args.command, &settings).await {
        Ok(code) => ExitCode::from(exit_status_byte(code)),
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

/// The job's status as the process exit status
///
/// Unix statuses always fit in a byte. Anything else can't be passed on unchanged and becomes 1.
fn exit_status_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or_else(|_| {
        warn!("Exit status {} doesn't fit in a byte, exiting with 1", code);
        1
    })
}

/// Run one subcommand, returning the status the process should exit with
async fn dispatch(command: Commands, settings: &Settings) -> Result<i32> {
    match command {
        Commands::Render { manifest, out } => {
            let script = read_job(&manifest)?.render(settings)?;
            match out {
                Some(path) => script.write_to(&path)?,
                None => print!("{}", script.content),
            }
            Ok(0)
        }
        Commands::Run { manifest } => {
            let job = read_job(&manifest)?;
            let directives = job.directive_set();
            if !directives.is_empty() {
                info!("Running outside the scheduler, {} directives are not applied", directives.len());
            }
            Launcher::new(settings).run(&job.render(settings)?).await
        }
        Commands::Submit { manifest, work_dir, dry_run } => {
            let job = read_job(&manifest)?;
            let wd = WorkingDirectory { path: work_dir };
            let directives = job.directive_set();
            directives.log_resources();
            let staged = job.render(settings)?.write(&wd)?;

            if !dry_run {
                let submit_dir = env::current_dir().context("can't read current directory")?;
                ensure_log_directories(&directives, &submit_dir)?;
            }

            if let Some(job_id) = staged.submit(settings, dry_run).await? {
                println!("{}", job_id.0);
            }
            Ok(0)
        }
        Commands::Inspect { script } => {
            let content = std::fs::read_to_string(&script)
                .with_context(|| format!("can't read job script {}", script.display()))?;
            let directives = parse_header(&content)
                .with_context(|| format!("bad directive header in {}", script.display()))?;
            for directive in directives.iter() {
                let state = if directive.enabled { "active" } else { "inert" };
                println!("{state}\t{directive}");
            }
            Ok(0)
        }
    }
}

fn read_job(path: &Path) -> Result<JobRequest> {
    let manifest = Manifest::new(path, load_schema()?);
    Ok(manifest.read()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_passes_through() {
        assert_eq!(exit_status_byte(0), 0);
        assert_eq!(exit_status_byte(42), 42);
        assert_eq!(exit_status_byte(143), 143);
        assert_eq!(exit_status_byte(255), 255);
    }

    #[test]
    fn out_of_range_status_becomes_one() {
        assert_eq!(exit_status_byte(256), 1);
        assert_eq!(exit_status_byte(-1), 1);
    }
}
