//! Shared test doubles.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::SandboxError;
use crate::sandbox::{ContainerRuntime, RunReport, SandboxJob, TIMEOUT_EXIT_CODE};

/// Scriptable runtime standing in for Docker. Counts runs and records
/// the work directories it was handed so tests can assert both the
/// short-circuit property (zero container starts) and the cleanup
/// invariant.
pub struct FakeRuntime {
    pub behavior: Behavior,
    pub runs: AtomicUsize,
    pub seen_dirs: Mutex<Vec<PathBuf>>,
}

pub enum Behavior {
    /// Drop the named files into the work dir, then report success.
    Artifacts(Vec<&'static str>),
    /// Report the given diagnostic bytes with a failing exit status.
    Diagnostics(&'static [u8]),
    /// Report the `timeout` wrapper's exit status.
    Timeout,
    /// Fail at the orchestration level.
    Fail,
}

impl FakeRuntime {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            runs: AtomicUsize::new(0),
            seen_dirs: Mutex::new(Vec::new()),
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn run(&self, _job: &SandboxJob, host_dir: &Path) -> Result<RunReport, SandboxError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.seen_dirs.lock().unwrap().push(host_dir.to_path_buf());
        match &self.behavior {
            Behavior::Artifacts(names) => {
                for name in names {
                    let path = host_dir.join(name);
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent).unwrap();
                    }
                    std::fs::write(path, b"artifact").unwrap();
                }
                Ok(RunReport {
                    exit_code: 0,
                    diagnostics: Vec::new(),
                })
            }
            Behavior::Diagnostics(bytes) => Ok(RunReport {
                exit_code: 1,
                diagnostics: bytes.to_vec(),
            }),
            Behavior::Timeout => Ok(RunReport {
                exit_code: TIMEOUT_EXIT_CODE,
                diagnostics: b"Terminated".to_vec(),
            }),
            Behavior::Fail => Err(SandboxError::WaitInterrupted),
        }
    }
}
