//! Sandboxed script execution.
//!
//! Every run gets a freshly created, single-use work directory holding
//! exactly one file (the script), bind-mounted into an unprivileged
//! container of the pinned renderer image. The wall-clock limit is
//! enforced by the `timeout` wrapper inside the sandbox; the runtime
//! keeps a longer backstop of its own so a wedged container can never
//! hold the caller hostage. Only the diagnostic (stderr) stream is
//! captured; artifacts are picked up from the filesystem afterwards.
//!
//! The work directory is destroyed on every exit path, including
//! orchestration failures, which is the central resource-safety
//! invariant of this module.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SandboxConfig;
use crate::errors::SandboxError;
use crate::flags::CliFlags;
use crate::resolver::{self, ArtifactOutcome, OUTPUT_BASENAME};

pub mod docker;

/// Name of the single input file inside the work directory.
pub const SCRIPT_FILENAME: &str = "script.py";

/// Mount point of the work directory inside the container.
pub const CONTAINER_MOUNT: &str = "/sandbox/";

/// Exit status of the `timeout` wrapper when it kills the command.
pub const TIMEOUT_EXIT_CODE: i64 = 124;

/// One sandbox invocation: the script to run, the full command line, the
/// wall-clock limit, and the output naming convention (if an artifact is
/// expected at all).
#[derive(Debug, Clone)]
pub struct SandboxJob {
    pub script: String,
    pub command: Vec<String>,
    pub timeout: Duration,
    pub output_basename: Option<String>,
}

impl SandboxJob {
    /// A render job: `timeout <N> manim <fixed flags> <validated flags>
    /// /sandbox/script.py`, expecting a `scriptoutput.*` artifact.
    pub fn render(script: String, flags: &CliFlags, config: &SandboxConfig) -> Self {
        let mut command = vec![
            "timeout".to_string(),
            config.render_timeout_secs.to_string(),
            "manim".to_string(),
            format!("--quality={}", config.quality),
            "--disable_caching".to_string(),
            "--progress_bar=none".to_string(),
            format!("--output_file={OUTPUT_BASENAME}"),
        ];
        command.extend(flags.as_slice().iter().cloned());
        command.push(format!("{CONTAINER_MOUNT}{SCRIPT_FILENAME}"));
        Self {
            script,
            command,
            timeout: config.render_timeout(),
            output_basename: Some(OUTPUT_BASENAME.to_string()),
        }
    }

    /// A metadata probe: a short python run with the (much smaller)
    /// probe timeout and no expected artifact.
    pub fn probe(script: String, config: &SandboxConfig) -> Self {
        let command = vec![
            "timeout".to_string(),
            config.probe_timeout_secs.to_string(),
            "python".to_string(),
            format!("{CONTAINER_MOUNT}{SCRIPT_FILENAME}"),
        ];
        Self {
            script,
            command,
            timeout: config.probe_timeout(),
            output_basename: None,
        }
    }
}

/// What the container reported back: its exit status and the captured
/// diagnostic stream.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub exit_code: i64,
    pub diagnostics: Vec<u8>,
}

/// Terminal state of a run, with the timeout made explicit instead of
/// being inferred from diagnostic text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    TimedOut,
}

/// Engine result for one job.
#[derive(Debug, Clone)]
pub struct Execution {
    pub status: RunStatus,
    pub diagnostics: Vec<u8>,
    pub artifact: ArtifactOutcome,
}

/// The seam to the container collaborator. `host_dir` is the work
/// directory to bind-mount; implementations must not retain it past the
/// call.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn run(&self, job: &SandboxJob, host_dir: &Path) -> Result<RunReport, SandboxError>;
}

/// Provisions, runs, and tears down one job at a time.
pub struct SandboxEngine<R> {
    runtime: R,
}

impl<R: ContainerRuntime> SandboxEngine<R> {
    pub fn new(runtime: R) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Runs one job start to finish. The work directory is created here
    /// and removed before this function returns, on success and on every
    /// error path alike (the `TempDir` guard drops even on early
    /// returns).
    pub async fn execute(&self, job: &SandboxJob) -> Result<Execution, SandboxError> {
        let work_dir = tempfile::Builder::new()
            .prefix("manimate-")
            .tempdir()
            .map_err(|e| SandboxError::WorkDir(e.to_string()))?;

        tokio::fs::write(work_dir.path().join(SCRIPT_FILENAME), &job.script).await?;

        let report = self.runtime.run(job, work_dir.path()).await?;

        let status = if report.exit_code == TIMEOUT_EXIT_CODE {
            RunStatus::TimedOut
        } else {
            RunStatus::Completed
        };

        // Resolution only makes sense for a clean render; a run that
        // produced diagnostics or timed out is reported as such.
        let artifact = match (&status, &job.output_basename) {
            (RunStatus::Completed, Some(basename)) if report.diagnostics.is_empty() => {
                resolver::resolve(work_dir.path(), basename)?
            }
            _ => ArtifactOutcome::Skipped,
        };

        log::debug!(
            "sandbox job finished: status {status:?}, {} diagnostic bytes",
            report.diagnostics.len()
        );

        Ok(Execution {
            status,
            diagnostics: report.diagnostics,
            artifact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags;
    use crate::test_utils::{Behavior, FakeRuntime};

    fn render_job() -> SandboxJob {
        SandboxJob::render(
            "from manim import *".to_string(),
            &flags::validate(&[]).unwrap(),
            &SandboxConfig::default(),
        )
    }

    #[tokio::test]
    async fn clean_run_resolves_the_artifact() {
        let engine = SandboxEngine::new(FakeRuntime::new(Behavior::Artifacts(vec![
            "media/scriptoutput.mp4",
        ])));
        let execution = engine.execute(&render_job()).await.unwrap();
        assert_eq!(execution.status, RunStatus::Completed);
        match execution.artifact {
            ArtifactOutcome::Resolved(attachment) => {
                assert_eq!(attachment.filename, "scriptoutput.mp4")
            }
            other => panic!("expected artifact, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn diagnostics_skip_resolution() {
        let engine =
            SandboxEngine::new(FakeRuntime::new(Behavior::Diagnostics(b"Traceback: boom")));
        let execution = engine.execute(&render_job()).await.unwrap();
        assert_eq!(execution.status, RunStatus::Completed);
        assert_eq!(execution.diagnostics, b"Traceback: boom");
        assert_eq!(execution.artifact, ArtifactOutcome::Skipped);
    }

    #[tokio::test]
    async fn timeout_exit_code_maps_to_timed_out() {
        let engine = SandboxEngine::new(FakeRuntime::new(Behavior::Timeout));
        let execution = engine.execute(&render_job()).await.unwrap();
        assert_eq!(execution.status, RunStatus::TimedOut);
        assert_eq!(execution.artifact, ArtifactOutcome::Skipped);
    }

    #[tokio::test]
    async fn work_dir_is_gone_after_every_terminal_state() {
        for behavior in [
            Behavior::Artifacts(vec!["scriptoutput.png"]),
            Behavior::Diagnostics(b"err"),
            Behavior::Timeout,
            Behavior::Fail,
        ] {
            let runtime = FakeRuntime::new(behavior);
            let engine = SandboxEngine::new(runtime);
            let _ = engine.execute(&render_job()).await;
            let dirs = engine.runtime.seen_dirs.lock().unwrap();
            assert_eq!(dirs.len(), 1);
            assert!(!dirs[0].exists(), "work dir {} leaked", dirs[0].display());
        }
    }

    #[tokio::test]
    async fn infrastructure_failure_propagates_after_cleanup() {
        let engine = SandboxEngine::new(FakeRuntime::new(Behavior::Fail));
        assert!(engine.execute(&render_job()).await.is_err());
    }

    #[tokio::test]
    async fn two_artifacts_are_reported_ambiguous() {
        let engine = SandboxEngine::new(FakeRuntime::new(Behavior::Artifacts(vec![
            "scriptoutput.png",
            "media/scriptoutput.mp4",
        ])));
        let execution = engine.execute(&render_job()).await.unwrap();
        assert!(matches!(execution.artifact, ArtifactOutcome::Ambiguous(_)));
    }

    #[test]
    fn render_command_places_validated_flags_before_the_script() {
        let flags = flags::validate(&["-s".to_string()]).unwrap();
        let job = SandboxJob::render("pass".to_string(), &flags, &SandboxConfig::default());
        assert_eq!(
            job.command,
            vec![
                "timeout",
                "120",
                "manim",
                "--quality=m",
                "--disable_caching",
                "--progress_bar=none",
                "--output_file=scriptoutput",
                "-s",
                "/sandbox/script.py",
            ]
        );
    }

    #[test]
    fn probe_command_uses_the_probe_timeout() {
        let job = SandboxJob::probe("import manim".to_string(), &SandboxConfig::default());
        assert_eq!(job.command[0], "timeout");
        assert_eq!(job.command[1], "10");
        assert!(job.output_basename.is_none());
    }
}
