//! Snippet extraction and script assembly.
//!
//! User messages arrive as free-form text: an optional flag header on the
//! first line, then a fenced code block. Extraction is strict about the
//! fencing (exactly two markers) because everything after it feeds a
//! sandbox invocation; malformed input is answered with a fixed
//! formatting-error reply before any sandbox resources are touched.

use regex::Regex;

use crate::errors::UserError;
use crate::reply;

/// The code-fence marker delimiting a snippet.
pub const FENCE: &str = "```";

/// The library's import-everything line. Stripped during extraction and
/// re-added by the assembler, so user-supplied imports stay idempotent.
pub const MANIM_IMPORT: &str = "from manim import *";

const ONLINETEX_IMPORT: &str = "from manim_onlinetex import *";

/// One user-submitted render request, immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub raw_text: String,
    /// Raw header tokens, not yet validated.
    pub flags: Vec<String>,
    /// The code between the fences, import line stripped, trimmed.
    pub code: String,
}

/// Splits a raw message into flag header and fenced code.
pub fn extract(raw: &str) -> Result<RenderRequest, UserError> {
    // A message that opens with the fence has no flag header; treat it
    // as if an empty header line preceded it.
    let text = if raw.starts_with(FENCE) {
        format!("\n{raw}")
    } else {
        raw.to_string()
    };

    let (header, body) = match text.split_once('\n') {
        Some((header, body)) => (header, body.trim().to_string()),
        None => (text.as_str(), String::new()),
    };
    let flags: Vec<String> = header.split_whitespace().map(str::to_string).collect();

    if body.matches(FENCE).count() != 2 {
        return Err(UserError::new(reply::formatting_error().content));
    }

    // Alternation is leftmost-first, so the longer tag goes first.
    let pattern = Regex::new(r"(?s)```(?:python|py)?(.*)```").unwrap();
    let code = match pattern.captures(&body) {
        Some(captures) => captures[1].trim().to_string(),
        None => return Err(UserError::new(reply::formatting_error().content)),
    };

    let code = strip_import(&code);

    Ok(RenderRequest {
        raw_text: raw.to_string(),
        flags,
        code,
    })
}

/// Fenced blocks containing a `construct` body, in message order. Used
/// to decide whether a plain message deserves a render offer and to pick
/// the snippet for re-renders.
pub fn extract_snippets(msg: &str) -> Vec<String> {
    let pattern = Regex::new(r"```(?:python|py)?([^`]*def construct[^`]*)```").unwrap();
    pattern
        .captures_iter(msg)
        .map(|captures| strip_import(captures[1].trim()))
        .collect()
}

fn strip_import(code: &str) -> String {
    code.lines()
        .filter(|line| line.trim() != MANIM_IMPORT)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Knobs affecting script assembly.
#[derive(Debug, Clone, Default)]
pub struct AssemblyOptions {
    /// Also import the online-TeX extension library.
    pub online_tex: bool,
}

/// Wraps a bare `construct` body into a scene class and prepends the
/// library import line(s). Deterministic and idempotent: already-wrapped
/// code passes through unchanged apart from the import prefix.
pub fn assemble(code: &str, opts: &AssemblyOptions) -> String {
    let mut script: Vec<String> = if code.starts_with("def construct(self):") {
        std::iter::once("class Manimation(Scene):".to_string())
            .chain(code.lines().map(|line| format!("    {line}")))
            .collect()
    } else {
        code.lines().map(str::to_string).collect()
    };

    let mut prescript = vec![MANIM_IMPORT.to_string()];
    if opts.online_tex {
        prescript.push(ONLINETEX_IMPORT.to_string());
    }
    prescript.append(&mut script);
    prescript.join("\n")
}
