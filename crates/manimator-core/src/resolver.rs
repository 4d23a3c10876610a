//! Artifact resolution inside the sandbox work directory.
//!
//! A successful render leaves exactly one file named `scriptoutput.*`
//! somewhere under the media tree. Zero and multiple matches are
//! distinct outcomes; the resolver never guesses between candidates.

use std::fs;
use std::path::Path;

use crate::errors::SandboxError;
use crate::reply::Attachment;

/// Basename every render is asked to write its output under.
pub const OUTPUT_BASENAME: &str = "scriptoutput";

/// What the work directory held after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// Exactly one matching file; its bytes were read before teardown.
    Resolved(Attachment),
    /// No matching file was produced.
    Missing,
    /// More than one match; candidate filenames, sorted. Internal error,
    /// never silently picked from.
    Ambiguous(Vec<String>),
    /// The job did not ask for an artifact, or the run failed first.
    Skipped,
}

/// Scans `dir` recursively for files whose stem is `basename` and which
/// carry an extension.
pub fn resolve(dir: &Path, basename: &str) -> Result<ArtifactOutcome, SandboxError> {
    let mut matches = Vec::new();
    collect(dir, basename, &mut matches)?;

    match matches.len() {
        1 => {
            let path = &matches[0];
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| basename.to_string());
            let bytes = fs::read(path)?;
            Ok(ArtifactOutcome::Resolved(Attachment::new(filename, bytes)))
        }
        0 => Ok(ArtifactOutcome::Missing),
        _ => {
            let mut names: Vec<String> = matches
                .iter()
                .map(|path| path.to_string_lossy().into_owned())
                .collect();
            names.sort();
            Ok(ArtifactOutcome::Ambiguous(names))
        }
    }
}

fn collect(
    dir: &Path,
    basename: &str,
    matches: &mut Vec<std::path::PathBuf>,
) -> Result<(), SandboxError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect(&path, basename, matches)?;
        } else {
            let stem_matches = path
                .file_stem()
                .is_some_and(|stem| stem.to_string_lossy() == basename);
            if stem_matches && path.extension().is_some() {
                matches.push(path);
            }
        }
    }
    Ok(())
}
