//! Run a rendered job script outside the scheduler
//!
//! The script runs in a single shell process that inherits stdio and the caller's environment.
//! Nothing is caught or translated: the shell's exit status is returned as-is so the caller can
//! exit with it.

use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::process::Command;

use crate::config::Settings;
use crate::slurm::job::JobScript;

pub struct Launcher<'a> {
    settings: &'a Settings,
}

impl<'a> Launcher<'a> {
    pub fn new(settings: &'a Settings) -> Launcher<'a> {
        Launcher { settings }
    }

    /// Run the script and return its exit status
    pub async fn run(&self, script: &JobScript) -> Result<i32> {
        let shell = &self.settings.shell;
        info!(
            "Running job {} with {}, on activation failure: {}",
            &script.name,
            shell.display(),
            self.settings.on_activation_failure
        );

        let status = Command::new(shell)
            .arg("-c")
            .arg(&script.content)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .with_context(|| format!("can't start {}", shell.display()))?;

        let code = exit_code(status);
        match code {
            0 => info!("Job {} finished", &script.name),
            _ => warn!("Job {} exited with status {}", &script.name, code),
        }
        Ok(code)
    }
}

/// Exit status as a shell reports it: the exit code, or 128 + signal number
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    use super::*;
    use crate::policy::ActivationFailure;
    use crate::request::job::JobRequest;

    /// Write a fake program that records its argument count and exits with `status`
    fn program(dir: &Path, trace: &Path, status: i32) -> PathBuf {
        let path = dir.join("program.sh");
        let body = format!(
            "#!/bin/sh\necho \"invoke $#\" >> '{}'\nexit {}\n",
            trace.display(),
            status
        );
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Activation stand-in that records the environment name, then succeeds or fails
    fn settings(trace: &Path, activation_ok: bool, policy: ActivationFailure) -> Settings {
        let result = if activation_ok { "true" } else { "false" };
        Settings {
            shell: PathBuf::from("/bin/sh"),
            activate: format!("{result} && printf 'activate %s\\n' >> '{}'", trace.display()),
            on_activation_failure: policy,
            ..Settings::default()
        }
    }

    fn job(program: &Path) -> JobRequest {
        JobRequest {
            name: "trace".to_string(),
            environment: "strand".to_string(),
            program: program.display().to_string(),
            directives: vec![],
        }
    }

    fn trace_lines(trace: &Path) -> Vec<String> {
        fs::read_to_string(trace)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn activates_once_then_invokes_once_without_arguments() {
        let tmp = TempDir::new().unwrap();
        let trace = tmp.path().join("trace.txt");
        let program = program(tmp.path(), &trace, 0);
        let settings = settings(&trace, true, ActivationFailure::Continue);

        let script = job(&program).render(&settings).unwrap();
        let code = Launcher::new(&settings).run(&script).await.unwrap();

        assert_eq!(code, 0);
        assert_eq!(trace_lines(&trace), vec!["activate strand", "invoke 0"]);
    }

    #[tokio::test]
    async fn exit_status_is_the_programs() {
        let tmp = TempDir::new().unwrap();
        let trace = tmp.path().join("trace.txt");
        let program = program(tmp.path(), &trace, 42);
        let settings = settings(&trace, true, ActivationFailure::Continue);

        let script = job(&program).render(&settings).unwrap();
        let code = Launcher::new(&settings).run(&script).await.unwrap();

        assert_eq!(code, 42);
    }

    #[tokio::test]
    async fn failed_activation_still_invokes_by_default() {
        let tmp = TempDir::new().unwrap();
        let trace = tmp.path().join("trace.txt");
        let program = program(tmp.path(), &trace, 3);
        let settings = settings(&trace, false, ActivationFailure::Continue);

        let script = job(&program).render(&settings).unwrap();
        let code = Launcher::new(&settings).run(&script).await.unwrap();

        assert_eq!(code, 3);
        assert_eq!(trace_lines(&trace), vec!["invoke 0"]);
    }

    #[tokio::test]
    async fn failed_activation_stops_under_stop_policy() {
        let tmp = TempDir::new().unwrap();
        let trace = tmp.path().join("trace.txt");
        let program = program(tmp.path(), &trace, 0);
        let settings = settings(&trace, false, ActivationFailure::Stop);

        let script = job(&program).render(&settings).unwrap();
        let code = Launcher::new(&settings).run(&script).await.unwrap();

        assert_eq!(code, 1);
        assert!(trace_lines(&trace).is_empty());
    }

    #[tokio::test]
    async fn signal_termination_reports_128_plus_signal() {
        let settings = Settings { shell: PathBuf::from("/bin/sh"), ..Settings::default() };
        let script = JobScript { name: "killed".to_string(), content: "kill -TERM $$\n".to_string() };

        let code = Launcher::new(&settings).run(&script).await.unwrap();
        assert_eq!(code, 128 + 15);
    }

    #[tokio::test]
    async fn missing_shell_is_an_error() {
        let settings = Settings { shell: PathBuf::from("/nonexistent/shell"), ..Settings::default() };
        let script = JobScript { name: "x".to_string(), content: "true".to_string() };
        assert!(Launcher::new(&settings).run(&script).await.is_err());
    }
}
