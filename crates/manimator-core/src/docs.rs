//! Documentation lookup through a sandboxed metadata probe.
//!
//! Instead of guessing documentation URLs, a short generated script is
//! run in the same sandbox as renders: it imports the library, resolves
//! the requested symbol, and reports the fully-qualified name on the
//! diagnostic stream. A missing symbol raises `AttributeError`, which is
//! the marker the classifier looks for; every other failure goes through
//! the standard diagnostic routing.

use regex::Regex;

use crate::config::SandboxConfig;
use crate::errors::UserError;
use crate::reply::{self, ReplyPayload};
use crate::sandbox::{Execution, RunStatus};

/// Marker in the probe diagnostics that distinguishes "symbol does not
/// exist" from any other failure.
pub const NOT_FOUND_MARKER: &str = "AttributeError";

const DOCS_BASE: &str = "https://docs.manim.community/en/stable/reference";

/// A validated lookup target: a top-level symbol, optionally with one
/// attribute on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolQuery {
    pub name: String,
    pub attr: Option<String>,
}

impl SymbolQuery {
    pub fn display(&self) -> String {
        match &self.attr {
            Some(attr) => format!("{}.{attr}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Parses `Name` or `Name.attr`. Both segments must be identifiers;
/// this is also what makes interpolating them into the probe source
/// injection-safe.
pub fn parse_symbol(arg: &str) -> Result<SymbolQuery, UserError> {
    let invalid = || {
        UserError::new(format!(
            "`{arg}` is not a valid identifier, no class or function can be named like that."
        ))
    };

    let mut segments = arg.split('.');
    let name = segments.next().filter(|s| is_identifier(s)).ok_or_else(invalid)?;
    let attr = match segments.next() {
        Some(attr) if is_identifier(attr) => Some(attr.to_string()),
        Some(_) => return Err(invalid()),
        None => None,
    };
    if segments.next().is_some() {
        return Err(invalid());
    }

    Ok(SymbolQuery {
        name: name.to_string(),
        attr,
    })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// The generated probe source. Prints the fully-qualified name of the
/// resolved symbol to stderr (the engine discards stdout by contract).
pub fn probe_script(query: &SymbolQuery) -> String {
    let mut lines = vec![
        "import sys".to_string(),
        "import manim".to_string(),
        format!("obj = getattr(manim, \"{}\")", query.name),
    ];
    if let Some(attr) = &query.attr {
        lines.push(format!("getattr(obj, \"{attr}\")"));
    }
    lines.push(
        "print(f\"{obj.__module__}.{obj.__qualname__}\", file=sys.stderr)".to_string(),
    );
    lines.join("\n")
}

/// Turns a probe execution into the user-facing reply.
pub fn classify(query: &SymbolQuery, execution: &Execution, config: &SandboxConfig) -> ReplyPayload {
    if execution.status == RunStatus::TimedOut {
        return reply::timeout_report(config.probe_timeout());
    }

    let diagnostics = String::from_utf8_lossy(&execution.diagnostics);
    if diagnostics.contains(NOT_FOUND_MARKER) {
        return ReplyPayload::text(format!(
            "I could not find `{}` in the library, sorry. \
             Pass a documented class or function, like `Square`.",
            query.display()
        ));
    }

    match qualified_name(&diagnostics) {
        Some(fqn) => ReplyPayload::text(format!(
            "Documentation for `{}`: {}",
            query.display(),
            docs_url(&fqn, query.attr.as_deref())
        )),
        None => reply::sandbox_report(&execution.diagnostics),
    }
}

/// The last diagnostic line that looks like a dotted module path. The
/// import itself may emit warnings first, so the scan runs from the end.
fn qualified_name(diagnostics: &str) -> Option<String> {
    let pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)+$").unwrap();
    diagnostics
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| pattern.is_match(line))
        .map(str::to_string)
}

fn docs_url(fqn: &str, attr: Option<&str>) -> String {
    match attr {
        Some(attr) => format!("{DOCS_BASE}/{fqn}.html#{fqn}.{attr}"),
        None => format!("{DOCS_BASE}/{fqn}.html"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ArtifactOutcome;

    fn execution(status: RunStatus, diagnostics: &[u8]) -> Execution {
        Execution {
            status,
            diagnostics: diagnostics.to_vec(),
            artifact: ArtifactOutcome::Skipped,
        }
    }

    #[test]
    fn parses_plain_and_dotted_symbols() {
        assert_eq!(
            parse_symbol("Square").unwrap(),
            SymbolQuery {
                name: "Square".to_string(),
                attr: None
            }
        );
        assert_eq!(parse_symbol("Square.rotate").unwrap().attr.as_deref(), Some("rotate"));
    }

    #[test]
    fn rejects_invalid_identifiers() {
        for arg in ["1abc", "a b", "a.b.c", "a..b", "", "a-b", "a;b"] {
            assert!(parse_symbol(arg).is_err(), "{arg} should be rejected");
        }
    }

    #[test]
    fn probe_script_resolves_the_attribute() {
        let script = probe_script(&parse_symbol("Square.rotate").unwrap());
        assert!(script.contains("getattr(manim, \"Square\")"));
        assert!(script.contains("getattr(obj, \"rotate\")"));
        assert!(script.contains("file=sys.stderr"));
    }

    #[test]
    fn missing_symbol_marker_yields_not_found() {
        let diagnostics =
            b"Traceback (most recent call last):\nAttributeError: module 'manim' has no attribute 'NoSuchSymbol'";
        let reply = classify(
            &parse_symbol("NoSuchSymbol").unwrap(),
            &execution(RunStatus::Completed, diagnostics),
            &SandboxConfig::default(),
        );
        assert!(reply.content.contains("could not find `NoSuchSymbol`"));
    }

    #[test]
    fn reported_name_becomes_a_docs_link() {
        let reply = classify(
            &parse_symbol("Square").unwrap(),
            &execution(
                RunStatus::Completed,
                b"some warning\nmanim.mobject.geometry.polygram.Square\n",
            ),
            &SandboxConfig::default(),
        );
        assert!(reply.content.contains(
            "https://docs.manim.community/en/stable/reference/manim.mobject.geometry.polygram.Square.html"
        ));
    }

    #[test]
    fn attribute_lookup_links_the_anchor() {
        let reply = classify(
            &parse_symbol("Square.rotate").unwrap(),
            &execution(RunStatus::Completed, b"manim.mobject.geometry.polygram.Square"),
            &SandboxConfig::default(),
        );
        assert!(reply.content.ends_with("#manim.mobject.geometry.polygram.Square.rotate"));
    }

    #[test]
    fn unrelated_failure_routes_through_diagnostics() {
        let reply = classify(
            &parse_symbol("Square").unwrap(),
            &execution(RunStatus::Completed, b"ImportError: no module named manim"),
            &SandboxConfig::default(),
        );
        assert!(reply.content.contains("here is what Manim reports"));
    }

    #[test]
    fn probe_timeout_is_reported_as_such() {
        let reply = classify(
            &parse_symbol("Square").unwrap(),
            &execution(RunStatus::TimedOut, b""),
            &SandboxConfig::default(),
        );
        assert!(reply.content.contains("10 second"));
    }
}
