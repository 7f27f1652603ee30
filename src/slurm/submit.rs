use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;
use tokio::process::Command;

use crate::config::Settings;
use crate::slurm::header::DirectiveSet;
use crate::slurm::job::JobPath;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("can't run {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sbatch exited with status {status}: {stderr}")]
    Rejected { status: String, stderr: String },
    #[error("sbatch returned no job id")]
    NoJobId,
    #[error("can't create log directory {path}: {source}")]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Job id assigned by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerJobId(pub String);

impl JobPath {
    /// Hand the staged script to sbatch and return the scheduler's job id
    pub async fn submit(&self, settings: &Settings, dry_run: bool) -> Result<Option<SchedulerJobId>, SubmitError> {
        let job_script_path = self.path.as_path();
        let mut sbatch = Command::new(&settings.sbatch);
        let cmd = sbatch.arg("--parsable").arg(job_script_path);

        if dry_run {
            info!("--dry-run set, not submitting: {:?}", cmd);
            return Ok(None);
        }

        info!("Running sbatch process");
        info!("{:?}", cmd);
        let output = cmd.output().await.map_err(|source| SubmitError::Spawn {
            program: settings.sbatch.clone(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("sbatch rejected {}: {}", job_script_path.display(), stderr);
            return Err(SubmitError::Rejected { status: output.status.to_string(), stderr });
        }

        let job_id = parse_job_id(&String::from_utf8_lossy(&output.stdout))?;
        info!("SLURM job id: {}", job_id.0);
        Ok(Some(job_id))
    }
}

/// `--parsable` prints `jobid` or `jobid;cluster`
fn parse_job_id(stdout: &str) -> Result<SchedulerJobId, SubmitError> {
    let id = stdout.trim().split(';').next().unwrap_or_default().trim();
    match id.is_empty() {
        true => Err(SubmitError::NoJobId),
        false => Ok(SchedulerJobId(id.to_string())),
    }
}

/// Create parent directories of the active output / error paths
///
/// sbatch does not create them, and a job whose log directory is missing fails without any log.
/// Paths with a `%` replacement pattern in the directory part are left alone. Relative paths are
/// resolved against `submit_dir`, where sbatch runs.
pub fn ensure_log_directories(directives: &DirectiveSet, submit_dir: &Path) -> Result<Vec<PathBuf>, SubmitError> {
    let mut created = Vec::new();
    for directive in directives.active().filter(|d| d.is_log_path()) {
        let parent = match directive.value.as_deref().map(Path::new).and_then(Path::parent) {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => continue,
        };
        if parent.to_string_lossy().contains('%') {
            warn!("Not creating log directory with a replacement pattern: {}", parent.display());
            continue;
        }

        let path = submit_dir.join(parent);
        if !path.exists() {
            info!("Creating log directory {}", path.display());
            fs::create_dir_all(&path).map_err(|source| SubmitError::LogDirectory { path: path.clone(), source })?;
            created.push(path);
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::slurm::directive::{Directive, ERROR, MEMORY, OUTPUT};

    #[test]
    fn parsable_output() {
        assert_eq!(parse_job_id("12345\n").unwrap(), SchedulerJobId("12345".to_string()));
        assert_eq!(parse_job_id("678;puhti\n").unwrap(), SchedulerJobId("678".to_string()));
        assert!(matches!(parse_job_id("  \n"), Err(SubmitError::NoJobId)));
    }

    #[test]
    fn creates_active_log_directories_only() {
        let tmp = TempDir::new().unwrap();
        let set = DirectiveSet::new(vec![
            Directive::new(OUTPUT, Some("logs/out/%j.out"), true),
            Directive::new(ERROR, Some("disabled/%j.err"), false),
            Directive::new(MEMORY, Some("8G"), true),
        ]);

        let created = ensure_log_directories(&set, tmp.path()).unwrap();
        assert_eq!(created, vec![tmp.path().join("logs/out")]);
        assert!(tmp.path().join("logs/out").is_dir());
        assert!(!tmp.path().join("disabled").exists());
    }

    #[test]
    fn skips_patterned_and_bare_paths() {
        let tmp = TempDir::new().unwrap();
        let set = DirectiveSet::new(vec![
            Directive::new(OUTPUT, Some("%u/%j.out"), true),
            Directive::new(ERROR, Some("job.err"), true),
        ]);

        assert!(ensure_log_directories(&set, tmp.path()).unwrap().is_empty());
    }

    #[cfg(unix)]
    mod sbatch {
        use std::os::unix::fs::PermissionsExt;

        use super::*;

        fn fake_sbatch(dir: &Path, script: &str) -> PathBuf {
            let path = dir.join("sbatch");
            fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn returns_job_id() {
            let tmp = TempDir::new().unwrap();
            let sbatch = fake_sbatch(tmp.path(), r#"[ "$1" = "--parsable" ] || exit 2; echo "4242;cluster""#);
            let settings = Settings { sbatch, ..Settings::default() };
            let job = JobPath { path: tmp.path().join("job.sh") };

            let id = job.submit(&settings, false).await.unwrap();
            assert_eq!(id, Some(SchedulerJobId("4242".to_string())));
        }

        #[tokio::test]
        async fn rejection_carries_stderr() {
            let tmp = TempDir::new().unwrap();
            let sbatch = fake_sbatch(tmp.path(), "echo 'invalid partition' >&2; exit 1");
            let settings = Settings { sbatch, ..Settings::default() };
            let job = JobPath { path: tmp.path().join("job.sh") };

            match job.submit(&settings, false).await {
                Err(SubmitError::Rejected { stderr, .. }) => assert_eq!(stderr, "invalid partition"),
                other => panic!("expected rejection, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn dry_run_never_calls_sbatch() {
            let settings = Settings { sbatch: PathBuf::from("/nonexistent/sbatch"), ..Settings::default() };
            let job = JobPath { path: PathBuf::from("job.sh") };

            assert_eq!(job.submit(&settings, true).await.unwrap(), None);
        }
    }
}
