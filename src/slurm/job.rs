use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{self, Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tinytemplate::{format_unescaped, TinyTemplate};

use crate::config::Settings;
use crate::policy::ActivationFailure;
use crate::request::job::JobRequest;

/// Directory that job scripts are staged in, one subdirectory per job
pub struct WorkingDirectory {
    pub path: PathBuf,
}

/// A JobPath is the path to a staged job script that's submitted to SLURM via sbatch
pub struct JobPath {
    pub path: PathBuf,
}

/// A complete, rendered job script
#[derive(Debug, Clone)]
pub struct JobScript {
    pub name: String,
    pub content: String,
}

impl JobRequest {
    pub fn render(&self, settings: &Settings) -> Result<JobScript> {
        info!("Rendering job script for {}", &self.name);
        if let Some(directive) = self.directives.iter().find(|d| !d.fits_on_one_line()) {
            bail!("directive '{}' of job {} contains a line break or control character", directive.key.escape_debug(), self.name);
        }
        let header: Header = render_header(self, settings)?;
        let body: Body = render_body(self, settings)?;
        let job = JobTemplate { header, body };
        Ok(JobScript { name: self.name.clone(), content: job.concat() })
    }
}

impl JobScript {
    /// Stage the script as `<wd>/<name>/job.sh`
    pub fn write(&self, wd: &WorkingDirectory) -> Result<JobPath> {
        if !is_directory_name(&self.name) {
            bail!("job name '{}' can't be used as a directory under {}", self.name, wd.path.display());
        }
        let instance_dir = wd.path.join(&self.name);
        info!("Staging job {} in working directory {}", &self.name, instance_dir.display());
        fs::create_dir_all(&instance_dir)
            .with_context(|| format!("can't create job directory {}", instance_dir.display()))?;

        let path = instance_dir.join("job.sh");
        if path.exists() {
            warn!("Job script {} already exists and will be overwritten", path.display());
        }
        self.write_to(&path)?;
        Ok(JobPath { path })
    }

    /// Write the script to an exact path, creating or truncating it
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("can't open {}", path.display()))?;
        file.write_all(self.content.as_bytes())
            .with_context(|| format!("can't write job script {}", path.display()))?;
        make_executable(path)?;
        info!("Wrote job script to {}", path.display());
        Ok(())
    }
}

/// A single path component that stays inside its parent
fn is_directory_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().all(|c| c == '.') && !name.contains(path::is_separator)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("can't set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// All rendered sections of a job script
struct JobTemplate {
    header: Header,
    body: Body,
}

impl JobTemplate {
    fn concat(self) -> String {
        // order is important: sbatch stops reading directives at the first command
        [self.header.content, self.body.content].concat()
    }
}

/// Rendered SBATCH header
///
/// The shebang, then every directive in manifest order. Disabled directives are written with a
/// doubled marker so they stay visible in the script without being read by sbatch.
struct Header {
    content: String,
}

/// Rendered commands
///
/// Exactly one environment activation followed by exactly one program invocation. The script
/// exits with the status of its last command, which is the program unless activation failed
/// under the `stop` policy.
struct Body {
    content: String,
}

/// Rendering context for header
#[derive(Serialize)]
struct HeaderContext {
    shell: String,
    directives: Vec<String>,
    name: String,
    time_now: String,
}

/// Rendering context for body
#[derive(Serialize)]
struct BodyContext {
    activation: String,
    stop_on_failure: bool,
    program: String,
}

/// Render the SBATCH header using TinyTemplate
fn render_header(job: &JobRequest, settings: &Settings) -> Result<Header> {
    /// included header template
    static HEADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/header.txt"));
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&format_unescaped);
    tt.add_template("header", HEADER)?;

    let context = HeaderContext {
        shell: settings.shell.display().to_string(),
        directives: job.directives.iter().map(|d| d.to_string()).collect(),
        name: job.name.clone(),
        time_now: Utc::now().to_rfc3339(),
    };

    Ok(Header { content: tt.render("header", &context)? })
}

/// Render activation and invocation using TinyTemplate
fn render_body(job: &JobRequest, settings: &Settings) -> Result<Body> {
    /// included body template
    static BODY: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/body.txt"));
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&format_unescaped);
    tt.add_template("body", BODY)?;

    let context = BodyContext {
        activation: format!("{} {}", settings.activate.trim(), shell_quote(&job.environment)),
        stop_on_failure: settings.on_activation_failure == ActivationFailure::Stop,
        program: shell_quote(&job.program),
    };

    Ok(Body { content: tt.render("body", &context)? })
}

/// Single-quote a word for the shell
fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}
