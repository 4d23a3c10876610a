//! Chat-platform boundary.
//!
//! The dispatch framework of the actual chat platform is an external
//! collaborator; the core only sees these types. An adapter delivers
//! interaction events over a channel and implements [`ResultHandle`] for
//! the reply message it owns. Replies may be edited in place long after
//! the initial send.

use async_trait::async_trait;
use thiserror::Error;

use crate::reply::ReplyPayload;

/// The platform's identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub u64);

#[derive(Error, Debug)]
#[error("platform error: {0}")]
pub struct PlatformError(pub String);

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A click on one of the structured controls, or a settings-modal
/// submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionEvent {
    RenderAgain { actor: UserId },
    ChangeSettings { actor: UserId, input: String },
    Dismiss { actor: UserId },
}

impl InteractionEvent {
    pub fn actor(&self) -> UserId {
        match self {
            InteractionEvent::RenderAgain { actor }
            | InteractionEvent::ChangeSettings { actor, .. }
            | InteractionEvent::Dismiss { actor } => *actor,
        }
    }
}

/// A reaction added to the result message (legacy transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub actor: UserId,
    pub emoji: String,
}

/// The clickable control row attached to a result message. The render
/// button's label changes after the first render; disabling leaves the
/// controls visible but inert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSurface {
    pub render_label: String,
    pub enabled: bool,
}

/// One result message as seen by the core: editable in place, with a
/// control surface, reactions, and deletion.
#[async_trait]
pub trait ResultHandle: Send + Sync {
    async fn edit_reply(&self, payload: &ReplyPayload) -> Result<(), PlatformError>;
    async fn set_controls(&self, surface: &ControlSurface) -> Result<(), PlatformError>;
    /// An error only the interacting user sees.
    async fn send_ephemeral(&self, text: &str) -> Result<(), PlatformError>;
    async fn add_reaction(&self, emoji: &str) -> Result<(), PlatformError>;
    async fn clear_reaction(&self, emoji: &str) -> Result<(), PlatformError>;
    async fn delete(&self) -> Result<(), PlatformError>;
}
