//! Result lifecycle control.
//!
//! Every result message owns one controller for its whole lifetime. Two
//! transport bindings implement the same contract of one confirm-or-expire
//! interaction at a time, honored only for the original requester:
//!
//! - the structured-control binding drives the render-again /
//!   change-settings / dismiss buttons plus the settings modal, with an
//!   idle expiry that disables the controls exactly once;
//! - the legacy reaction binding arms a single deletion reaction and
//!   races it against a fixed expiry.
//!
//! The driver loop is strictly sequential, so there is never more than
//! one sandbox job in flight per result message and never more than one
//! pending wait registration.

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::LifecycleConfig;
use crate::flags::{self, CliFlags};
use crate::platform::{
    ControlSurface, InteractionEvent, PlatformError, ReactionEvent, ResultHandle, UserId,
};
use crate::render::Renderer;
use crate::reply;

/// Trash-can emoji arming deletion in the reaction binding.
pub const DELETE_EMOJI: &str = "\u{1F5D1}";

/// Initial label of the render button; replaced by
/// [`RENDER_AGAIN_LABEL`] once a render went through.
pub const RENDER_LABEL: &str = "Yes, render";
pub const RENDER_AGAIN_LABEL: &str = "Render again";

/// How a controller run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEnd {
    /// The requester dismissed the message.
    Deleted,
    /// The idle window elapsed; controls were disabled.
    Expired,
    /// The platform adapter dropped its sender.
    Disconnected,
}

/// Per-result state machine for the structured-control binding.
pub struct ResultLifecycle<P, H> {
    renderer: P,
    handle: H,
    requester: UserId,
    /// Text of the message holding the code snippet; re-renders extract
    /// from it again.
    source: String,
    /// Flags of the most recent invocation.
    flags: CliFlags,
    config: LifecycleConfig,
    render_label: &'static str,
}

impl<P: Renderer, H: ResultHandle> ResultLifecycle<P, H> {
    pub fn new(
        renderer: P,
        handle: H,
        requester: UserId,
        source: String,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            renderer,
            handle,
            requester,
            source,
            flags: CliFlags::default(),
            config,
            render_label: RENDER_LABEL,
        }
    }

    /// Drives the controls until dismissal, expiry, or adapter
    /// disconnect. Events from anyone but the requester are ignored.
    /// The idle window restarts on every honored interaction; when it
    /// elapses the controls are disabled exactly once and later events
    /// are no longer processed.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<InteractionEvent>,
    ) -> Result<LifecycleEnd, PlatformError> {
        let mut deadline = Instant::now() + self.config.view_timeout();

        loop {
            let event = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event,
                    None => return Ok(LifecycleEnd::Disconnected),
                },
                _ = tokio::time::sleep_until(deadline) => {
                    self.set_controls(false).await?;
                    log::debug!("result controls expired for requester {:?}", self.requester);
                    return Ok(LifecycleEnd::Expired);
                }
            };

            if event.actor() != self.requester {
                continue;
            }
            deadline = Instant::now() + self.config.view_timeout();

            match event {
                InteractionEvent::Dismiss { .. } => {
                    self.handle.delete().await?;
                    return Ok(LifecycleEnd::Deleted);
                }
                InteractionEvent::RenderAgain { .. } => {
                    self.rerender(None).await?;
                }
                InteractionEvent::ChangeSettings { input, .. } => {
                    self.rerender(Some(input)).await?;
                }
            }
        }
    }

    /// One render cycle: controls off, render, edit the reply in place,
    /// controls back on with the persisted "render again" label. Flag
    /// overrides that fail sanitization or validation produce an
    /// ephemeral error and leave everything untouched.
    async fn rerender(&mut self, override_input: Option<String>) -> Result<(), PlatformError> {
        let from_settings = override_input.is_some();
        let flags = match override_input {
            Some(input) => {
                let validated = flags::sanitize_override(&input)
                    .and_then(|tokens| flags::validate(&tokens));
                match validated {
                    Ok(flags) => flags,
                    Err(err) => {
                        self.handle.send_ephemeral(err.message()).await?;
                        return Ok(());
                    }
                }
            }
            None => self.flags.clone(),
        };

        self.set_controls(false).await?;

        let mut payload = match self.renderer.render(&self.source, &flags).await {
            Ok(payload) => payload,
            Err(err) => {
                log::error!("render orchestration failed: {err}");
                reply::infrastructure_reply(&err)
            }
        };
        if from_settings && !flags.is_empty() {
            payload
                .content
                .push_str(&format!("\n\nPassed CLI flags: `{}`", flags.display()));
        }

        self.flags = flags;
        self.render_label = RENDER_AGAIN_LABEL;
        self.handle.edit_reply(&payload).await?;
        self.set_controls(true).await?;
        Ok(())
    }

    async fn set_controls(&self, enabled: bool) -> Result<(), PlatformError> {
        self.handle
            .set_controls(&ControlSurface {
                render_label: self.render_label.to_string(),
                enabled,
            })
            .await
    }
}

/// Legacy reaction binding: arms the deletion reaction and races a fixed
/// expiry against a matching reaction from the requester. The first
/// observed outcome wins; the other is a no-op.
pub async fn await_deletion<H: ResultHandle>(
    handle: &H,
    requester: UserId,
    config: &LifecycleConfig,
    mut reactions: mpsc::Receiver<ReactionEvent>,
) -> Result<LifecycleEnd, PlatformError> {
    handle.add_reaction(DELETE_EMOJI).await?;
    let deadline = Instant::now() + config.reaction_timeout();

    loop {
        tokio::select! {
            event = reactions.recv() => match event {
                Some(event) if event.actor == requester && event.emoji == DELETE_EMOJI => {
                    handle.delete().await?;
                    return Ok(LifecycleEnd::Deleted);
                }
                Some(_) => continue,
                None => {
                    handle.clear_reaction(DELETE_EMOJI).await?;
                    return Ok(LifecycleEnd::Disconnected);
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                handle.clear_reaction(DELETE_EMOJI).await?;
                return Ok(LifecycleEnd::Expired);
            }
        }
    }
}
