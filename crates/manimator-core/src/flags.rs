//! CLI flag validation for render requests.
//!
//! The validated flag sequence is interpolated into the sandbox command
//! line, so the allow-list below is the sole defense against command
//! injection. Validation is all-or-nothing: one disallowed token rejects
//! the whole request, and nothing is filtered permissively. The derived
//! `--write_to_movie` flag is appended only after validation so it can
//! neither be smuggled in nor rejected by the allow-list itself.

use crate::errors::UserError;

/// Flags a requester may pass through to the renderer.
pub const ALLOWED_FLAGS: &[&str] = &[
    "-i",
    "--format=gif",
    "--save_as_gif",
    "-s",
    "--save_last_frame",
    "-t",
    "--transparent",
    "--renderer=opengl",
    "--use_projection_fill_shaders",
    "--use_projection_stroke_shaders",
];

const OPENGL_RENDERER: &str = "--renderer=opengl";
const WRITE_TO_MOVIE: &str = "--write_to_movie";

/// A validated, expansion-applied flag sequence. Only [`validate`] can
/// produce one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliFlags(Vec<String>);

impl CliFlags {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The flags joined for display (the "Passed CLI flags" footer).
    pub fn display(&self) -> String {
        self.0.join(" ")
    }
}

/// Checks every token against the allow-list and applies the renderer
/// expansion. A single unknown token invalidates the whole request; the
/// error enumerates the allow-list as remediation.
pub fn validate(tokens: &[String]) -> Result<CliFlags, UserError> {
    if let Some(offender) = tokens
        .iter()
        .find(|token| !ALLOWED_FLAGS.contains(&token.as_str()))
    {
        log::debug!("rejecting disallowed flag token {offender:?}");
        return Err(UserError::new(rejection_message()));
    }

    let mut flags: Vec<String> = tokens.to_vec();
    if flags.iter().any(|flag| flag == OPENGL_RENDERER) {
        flags.push(WRITE_TO_MOVIE.to_string());
    }
    Ok(CliFlags(flags))
}

/// Screens settings-modal input for shell metacharacters before it is
/// split into tokens. Rejections here are ephemeral-only and independent
/// of the allow-list.
pub fn sanitize_override(input: &str) -> Result<Vec<String>, UserError> {
    if input.contains(';') || input.contains('&') {
        return Err(UserError::new("Something went wrong, please try again."));
    }
    Ok(input.split_whitespace().map(str::to_string).collect())
}

fn rejection_message() -> String {
    let listed = ALLOWED_FLAGS
        .iter()
        .map(|flag| format!("`{flag}`"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("You cannot pass CLI flags other than {listed}.")
}
