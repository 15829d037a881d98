//! External tool stages.
//!
//! Every stage is one program with an explicit argument list. Nothing goes
//! through a shell, so client filenames are never interpreted.

use super::ConversionJob;
use crate::config::StageSpec;
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info};

const STDERR_LIMIT: usize = 2000;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(input_dir|output_dir|intermediate|input|output)\}")
        .expect("placeholder pattern is valid")
});

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("could not launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("`{program}` timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub program: String,
    pub args: Vec<String>,
}

impl Stage {
    pub fn from_spec(
        spec: &StageSpec,
        input: &Path,
        output: &Path,
        intermediate: Option<&Path>,
    ) -> Self {
        Self {
            program: spec.program.clone(),
            args: substitute_args(&spec.args, input, output, intermediate),
        }
    }
}

/// Expands `{input}`, `{output}`, `{intermediate}`, `{input_dir}` and
/// `{output_dir}` in each template argument.
pub fn substitute_args(
    template_args: &[String],
    input: &Path,
    output: &Path,
    intermediate: Option<&Path>,
) -> Vec<String> {
    let lossy = |p: &Path| p.to_string_lossy().to_string();
    let dir_of = |p: &Path| p.parent().map(lossy).unwrap_or_default();

    let input_str = lossy(input);
    let output_str = lossy(output);
    let intermediate_str = intermediate.map(lossy).unwrap_or_default();
    let input_dir = dir_of(input);
    let output_dir = dir_of(output);

    // One pass: values come from client filenames and are never re-scanned.
    template_args
        .iter()
        .map(|arg| {
            PLACEHOLDER
                .replace_all(arg, |caps: &Captures| match &caps[1] {
                    "input" => input_str.clone(),
                    "output" => output_str.clone(),
                    "intermediate" => intermediate_str.clone(),
                    "input_dir" => input_dir.clone(),
                    "output_dir" => output_dir.clone(),
                    _ => caps[0].to_string(),
                })
                .into_owned()
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run(&self, stage: &Stage) -> Result<StageOutput, ToolError>;
}

/// Runs stages as child processes of the server.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// `timeout_seconds == 0` lets a stage run indefinitely.
    pub fn new(timeout_seconds: u64) -> Self {
        Self {
            timeout: (timeout_seconds > 0).then(|| Duration::from_secs(timeout_seconds)),
        }
    }
}

#[async_trait]
impl StageRunner for ProcessRunner {
    async fn run(&self, stage: &Stage) -> Result<StageOutput, ToolError> {
        let start = Instant::now();

        let mut cmd = Command::new(&stage.program);
        cmd.args(&stage.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(res) => res,
                Err(_) => {
                    return Err(ToolError::Timeout {
                        program: stage.program.clone(),
                        seconds: limit.as_secs(),
                    });
                }
            },
            None => cmd.output().await,
        }
        .map_err(|source| ToolError::Spawn {
            program: stage.program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("exit code {code}"),
                None => "a signal".to_string(),
            };
            return Err(ToolError::Failed {
                program: stage.program.clone(),
                status,
                stderr: stderr.trim().chars().take(STDERR_LIMIT).collect(),
            });
        }

        Ok(StageOutput {
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Runs the job's stages in order, stopping at the first failure.
///
/// Files written by earlier stages are left in place on failure.
pub async fn run_job(runner: &dyn StageRunner, job: &ConversionJob) -> Result<(), ToolError> {
    for (i, stage) in job.stages.iter().enumerate() {
        info!(
            "stage {}/{} {} {:?}",
            i + 1,
            job.stages.len(),
            stage.program,
            stage.args
        );
        match runner.run(stage).await {
            Ok(out) => {
                debug!(
                    "stage {} ok in {}ms stdout={} bytes stderr={} bytes",
                    stage.program,
                    out.duration_ms,
                    out.stdout.len(),
                    out.stderr.len()
                );
            }
            Err(err) => {
                error!("stage {} failed: {err}", stage.program);
                return Err(err);
            }
        }
    }
    Ok(())
}
