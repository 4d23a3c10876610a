//! The render pipeline: extract, assemble, validate, execute, resolve.
//!
//! User-level failures (bad fencing, disallowed flags) become replies and
//! never reach the sandbox. Only orchestration failures surface as `Err`,
//! after the engine has already torn its resources down, so a
//! platform-level handler can log them; the user-facing reply for that
//! case is built with [`reply::infrastructure_reply`].

use async_trait::async_trait;

use crate::config::SandboxConfig;
use crate::docs;
use crate::errors::SandboxError;
use crate::flags::{self, CliFlags};
use crate::reply::{self, ReplyPayload};
use crate::resolver::ArtifactOutcome;
use crate::sandbox::{ContainerRuntime, Execution, RunStatus, SandboxEngine, SandboxJob};
use crate::snippet::{self, AssemblyOptions};

/// Outcome of one pipeline invocation: the reply plus the flags that
/// were actually applied (echoed by the settings flow).
#[derive(Debug, Clone)]
pub struct RenderResponse {
    pub reply: ReplyPayload,
    pub flags: CliFlags,
}

/// Rendering seam consumed by the result lifecycle controller.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Renders the first `construct` snippet found in `source` with the
    /// given flags.
    async fn render(&self, source: &str, flags: &CliFlags) -> Result<ReplyPayload, SandboxError>;
}

pub struct RenderPipeline<R> {
    engine: SandboxEngine<R>,
    config: SandboxConfig,
}

impl<R: ContainerRuntime> RenderPipeline<R> {
    pub fn new(runtime: R, config: SandboxConfig) -> Self {
        Self {
            engine: SandboxEngine::new(runtime),
            config,
        }
    }

    pub fn runtime(&self) -> &R {
        self.engine.runtime()
    }

    /// Full pipeline for a command-style message: flag header plus
    /// fenced code block.
    pub async fn render_message(&self, raw: &str) -> Result<RenderResponse, SandboxError> {
        let request = match snippet::extract(raw) {
            Ok(request) => request,
            Err(err) => return Ok(RenderResponse::rejected(err.message())),
        };
        let flags = match flags::validate(&request.flags) {
            Ok(flags) => flags,
            Err(err) => return Ok(RenderResponse::rejected(err.message())),
        };
        self.run_render(&request.code, flags).await
    }

    /// Re-render path: picks the first `construct` snippet out of the
    /// referenced message and renders it with already-validated flags.
    pub async fn render_snippet(
        &self,
        message_text: &str,
        flags: &CliFlags,
    ) -> Result<ReplyPayload, SandboxError> {
        let Some(code) = snippet::extract_snippets(message_text).into_iter().next() else {
            return Ok(reply::formatting_error());
        };
        let response = self.run_render(&code, flags.clone()).await?;
        Ok(response.reply)
    }

    /// Sandboxed documentation lookup for a library symbol.
    pub async fn lookup_symbol(&self, arg: &str) -> Result<ReplyPayload, SandboxError> {
        let query = match docs::parse_symbol(arg) {
            Ok(query) => query,
            Err(err) => return Ok(ReplyPayload::text(err.message())),
        };
        let job = SandboxJob::probe(docs::probe_script(&query), &self.config);
        let execution = self.engine.execute(&job).await?;
        Ok(docs::classify(&query, &execution, &self.config))
    }

    async fn run_render(
        &self,
        code: &str,
        flags: CliFlags,
    ) -> Result<RenderResponse, SandboxError> {
        let script = snippet::assemble(
            code,
            &AssemblyOptions {
                online_tex: self.config.online_tex,
            },
        );
        let job = SandboxJob::render(script, &flags, &self.config);
        let execution = self.engine.execute(&job).await?;
        let reply = self.reply_for(execution);
        Ok(RenderResponse { reply, flags })
    }

    fn reply_for(&self, execution: Execution) -> ReplyPayload {
        match execution.status {
            RunStatus::TimedOut => reply::timeout_report(self.config.render_timeout()),
            RunStatus::Completed => {
                if !execution.diagnostics.is_empty() {
                    return reply::sandbox_report(&execution.diagnostics);
                }
                match execution.artifact {
                    ArtifactOutcome::Resolved(artifact) => reply::artifact_reply(artifact),
                    ArtifactOutcome::Missing => reply::resolution_failure(),
                    ArtifactOutcome::Ambiguous(names) => {
                        log::error!("render produced multiple output candidates: {names:?}");
                        reply::resolution_failure()
                    }
                    ArtifactOutcome::Skipped => reply::resolution_failure(),
                }
            }
        }
    }
}

impl RenderResponse {
    fn rejected(message: &str) -> Self {
        Self {
            reply: ReplyPayload::text(message),
            flags: CliFlags::default(),
        }
    }
}

#[async_trait]
impl<R: ContainerRuntime> Renderer for RenderPipeline<R> {
    async fn render(&self, source: &str, flags: &CliFlags) -> Result<ReplyPayload, SandboxError> {
        self.render_snippet(source, flags).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::DIAGNOSTIC_INLINE_LIMIT;
    use crate::test_utils::{Behavior, FakeRuntime};

    fn pipeline(behavior: Behavior) -> RenderPipeline<FakeRuntime> {
        RenderPipeline::new(FakeRuntime::new(behavior), SandboxConfig::default())
    }

    fn runtime(pipeline: &RenderPipeline<FakeRuntime>) -> &FakeRuntime {
        pipeline.runtime()
    }

    const STILL_FRAME_MESSAGE: &str = "-s\n```py\ndef construct(self):\n    pass\n```";

    #[tokio::test]
    async fn still_frame_request_returns_one_image_attachment() {
        let pipeline = pipeline(Behavior::Artifacts(vec!["media/images/scriptoutput.png"]));
        let response = pipeline.render_message(STILL_FRAME_MESSAGE).await.unwrap();
        assert_eq!(response.reply.content, "Here you go!");
        assert_eq!(response.reply.attachments.len(), 1);
        assert_eq!(response.reply.attachments[0].filename, "scriptoutput.png");
        assert_eq!(response.flags.as_slice(), &["-s"]);
    }

    #[tokio::test]
    async fn disallowed_flag_never_starts_a_sandbox() {
        let pipeline = pipeline(Behavior::Artifacts(vec!["scriptoutput.png"]));
        let response = pipeline
            .render_message("--delete-everything\n```py\ndef construct(self):\n    pass\n```")
            .await
            .unwrap();
        assert!(response.reply.content.contains("cannot pass CLI flags"));
        assert_eq!(runtime(&pipeline).run_count(), 0);
    }

    #[tokio::test]
    async fn malformed_fencing_never_starts_a_sandbox() {
        let pipeline = pipeline(Behavior::Artifacts(vec!["scriptoutput.png"]));
        let response = pipeline
            .render_message("-s\ndef construct(self): pass")
            .await
            .unwrap();
        assert!(response.reply.content.contains("not properly formatted"));
        assert_eq!(runtime(&pipeline).run_count(), 0);
    }

    #[tokio::test]
    async fn oversized_diagnostics_are_attached_as_a_log() {
        static BIG: &[u8] = &[b'e'; DIAGNOSTIC_INLINE_LIMIT + 1300];
        let pipeline = pipeline(Behavior::Diagnostics(BIG));
        let response = pipeline.render_message(STILL_FRAME_MESSAGE).await.unwrap();
        assert_eq!(response.reply.attachments.len(), 1);
        assert_eq!(response.reply.attachments[0].filename, "error.log");
    }

    #[tokio::test]
    async fn missing_artifact_is_the_fixed_apology() {
        let pipeline = pipeline(Behavior::Artifacts(vec![]));
        let response = pipeline.render_message(STILL_FRAME_MESSAGE).await.unwrap();
        assert!(response
            .reply
            .content
            .contains("no (unique) output file was produced"));
    }

    #[tokio::test]
    async fn ambiguous_artifacts_are_never_guessed_between() {
        let pipeline = pipeline(Behavior::Artifacts(vec![
            "scriptoutput.png",
            "media/scriptoutput.mp4",
        ]));
        let response = pipeline.render_message(STILL_FRAME_MESSAGE).await.unwrap();
        assert!(response.reply.attachments.is_empty());
        assert!(response
            .reply
            .content
            .contains("no (unique) output file was produced"));
    }

    #[tokio::test]
    async fn timed_out_render_names_the_limit() {
        let pipeline = pipeline(Behavior::Timeout);
        let response = pipeline.render_message(STILL_FRAME_MESSAGE).await.unwrap();
        assert!(response.reply.content.contains("120 second"));
    }

    #[tokio::test]
    async fn infrastructure_failure_is_the_err_arm() {
        let pipeline = pipeline(Behavior::Fail);
        assert!(pipeline.render_message(STILL_FRAME_MESSAGE).await.is_err());
    }

    #[tokio::test]
    async fn render_snippet_without_construct_is_a_formatting_error() {
        let pipeline = pipeline(Behavior::Artifacts(vec!["scriptoutput.png"]));
        let reply = pipeline
            .render_snippet("just words", &CliFlags::default())
            .await
            .unwrap();
        assert!(reply.content.contains("not properly formatted"));
        assert_eq!(runtime(&pipeline).run_count(), 0);
    }

    #[tokio::test]
    async fn missing_symbol_probe_reports_could_not_find() {
        static DIAG: &[u8] =
            b"Traceback (most recent call last):\nAttributeError: module 'manim' has no attribute 'NoSuchSymbol'";
        let pipeline = pipeline(Behavior::Diagnostics(DIAG));
        let reply = pipeline.lookup_symbol("NoSuchSymbol").await.unwrap();
        assert!(reply.content.contains("could not find `NoSuchSymbol`"));
    }

    #[tokio::test]
    async fn invalid_identifier_never_starts_a_probe() {
        let pipeline = pipeline(Behavior::Artifacts(vec![]));
        let reply = pipeline.lookup_symbol("no such symbol").await.unwrap();
        assert!(reply.content.contains("not a valid identifier"));
        assert_eq!(runtime(&pipeline).run_count(), 0);
    }
}
