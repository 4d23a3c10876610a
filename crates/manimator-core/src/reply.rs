//! Reply payload construction.
//!
//! Everything the bot sends back to the requester is described by a
//! [`ReplyPayload`]: explicit text plus zero or more file attachments.
//! This replaces ad-hoc keyword mappings with one tagged type that the
//! platform adapter can translate into an actual chat message or edit.

use std::time::Duration;

use crate::errors::SandboxError;

/// Diagnostics up to this many characters are shown inline in a code
/// block; anything larger is attached as a log file so the reply stays
/// under platform message-size limits.
pub const DIAGNOSTIC_INLINE_LIMIT: usize = 1200;

/// A file sent along with a reply. Bytes are read out of the sandbox
/// work directory before it is destroyed, so no path escapes the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// The chat-visible outcome of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPayload {
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl ReplyPayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(content: impl Into<String>, attachment: Attachment) -> Self {
        Self {
            content: content.into(),
            attachments: vec![attachment],
        }
    }
}

/// Reply for a malformed request (wrong fencing).
pub fn formatting_error() -> ReplyPayload {
    ReplyPayload::text(
        "Your message is not properly formatted. \
         Your code has to be written in a code block, like so:\n\
         \\`\\`\\`py\nyour code here\n\\`\\`\\`",
    )
}

/// Reply carrying the rendered artifact.
pub fn artifact_reply(artifact: Attachment) -> ReplyPayload {
    ReplyPayload::with_attachment("Here you go!", artifact)
}

/// Reply for a run whose diagnostic stream was non-empty.
///
/// Short diagnostics are inlined; long ones become an `error.log`
/// attachment.
pub fn sandbox_report(diagnostics: &[u8]) -> ReplyPayload {
    let text = String::from_utf8_lossy(diagnostics);
    if text.chars().count() <= DIAGNOSTIC_INLINE_LIMIT {
        ReplyPayload::text(format!(
            "Something went wrong, here is what Manim reports:\n```\n{}\n```",
            text.trim_end()
        ))
    } else {
        ReplyPayload::with_attachment(
            "Something went wrong, here is what Manim reports:",
            Attachment::new("error.log", diagnostics.to_vec()),
        )
    }
}

/// Reply for a run stopped by the sandbox timeout wrapper.
pub fn timeout_report(limit: Duration) -> ReplyPayload {
    ReplyPayload::text(format!(
        "Something went wrong: your render did not finish within the \
         {} second limit. :cry:",
        limit.as_secs()
    ))
}

/// Reply when no unique output file was produced.
pub fn resolution_failure() -> ReplyPayload {
    ReplyPayload::text("Something went wrong: no (unique) output file was produced. :cry:")
}

/// Generic reply for an orchestration failure. The requester gets a
/// best-effort trace as an attachment; the full error has already been
/// logged for operators by the caller.
pub fn infrastructure_reply(err: &SandboxError) -> ReplyPayload {
    ReplyPayload::with_attachment(
        "Something went wrong, the error log is attached. :cry:",
        Attachment::new("error.log", format!("{err:?}").into_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_diagnostics_are_inlined() {
        let reply = sandbox_report(b"ValueError: latex failed");
        assert!(reply.content.contains("ValueError: latex failed"));
        assert!(reply.attachments.is_empty());
    }

    #[test]
    fn long_diagnostics_become_an_attachment() {
        let diagnostics = vec![b'x'; DIAGNOSTIC_INLINE_LIMIT + 1300];
        let reply = sandbox_report(&diagnostics);
        assert_eq!(reply.attachments.len(), 1);
        assert_eq!(reply.attachments[0].filename, "error.log");
        assert_eq!(reply.attachments[0].bytes, diagnostics);
        assert!(!reply.content.contains("xxx"));
    }

    #[test]
    fn limit_boundary_is_inclusive() {
        let diagnostics = vec![b'x'; DIAGNOSTIC_INLINE_LIMIT];
        let reply = sandbox_report(&diagnostics);
        assert!(reply.attachments.is_empty());
    }

    #[test]
    fn timeout_report_names_the_limit() {
        let reply = timeout_report(Duration::from_secs(120));
        assert!(reply.content.contains("120 second"));
    }
}
