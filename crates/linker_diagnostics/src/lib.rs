//! Typed diagnostics for the linker.
//!
//! Modeled on two small crates from this workspace's ancestry: `js_err`
//! (wrap an [`anyhow::Error`] with a classification tag) and `multi_err`
//! (accumulate many errors instead of aborting on the first one). Here the
//! tag is [`Severity`] plus a [`DiagnosticKind`], and accumulation is
//! [`DiagnosticLog`], an append-only `Vec` rather than a `Result`-unwrapping
//! combinator, since the linker's propagation policy (spec §7) is "keep
//! going, decide at the phase boundary" rather than "short-circuit".

use std::fmt;

/// Source location a diagnostic is anchored to. `None` for diagnostics that
/// aren't tied to a specific module (e.g. cross-chunk invariant notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub source_index: u32,
    pub lo: u32,
    pub hi: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        })
    }
}

/// The diagnostic kinds named in spec.md §6/§7. Each `Display` impl renders
/// the byte-compatible message template the fixture tests assert on.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DiagnosticKind {
    #[error("No matching export for import \"{alias}\"")]
    NoMatchingExport { alias: String },

    #[error("Ambiguous import \"{alias}\" has multiple matching exports")]
    AmbiguousImport { alias: String },

    #[error("Import \"{alias}\" will always be undefined")]
    ImportAlwaysUndefined { alias: String },

    #[error("Detected cycle while resolving import \"{alias}\"")]
    ImportCycle { alias: String },

    #[error("Ignoring this import because \"{path}\" was marked as having no side effects")]
    IgnoredSideEffectFreeImport { path: String },

    #[error("Transforming {feature} to the configured target environment is not supported")]
    UnsupportedLowering { feature: String },
}

/// Companion note attached to [`DiagnosticKind::IgnoredSideEffectFreeImport`],
/// per spec.md §6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffectsNote {
    FalseInPackageJson,
    ExcludedFromArray,
}

impl fmt::Display for SideEffectsNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideEffectsNote::FalseInPackageJson => {
                f.write_str("\"sideEffects\" is false in the enclosing \"package.json\" file")
            }
            SideEffectsNote::ExcludedFromArray => f.write_str(
                "It was excluded from the \"sideEffects\" array in the enclosing \"package.json\" file",
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub span: Option<SourceSpan>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, span: Option<SourceSpan>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            span,
            notes: Vec::new(),
        }
    }

    pub fn warning(kind: DiagnosticKind, span: Option<SourceSpan>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            span,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.kind)?;
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

/// Accumulates diagnostics across a phase instead of aborting on the first
/// one, the same shape as `multi_err::MultiErr` but specialized to
/// [`Diagnostic`] and with a `has_errors` query rather than a conversion to
/// `anyhow::Error`.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticLog {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: DiagnosticLog) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }
}

/// The message every internal invariant violation panics with (spec.md §7).
/// Never expected to fire on well-formed input; exercised only by tests that
/// deliberately feed the linker a malformed graph.
pub const INTERNAL_ERROR: &str = "Internal error";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_no_matching_export_verbatim() {
        let d = Diagnostic::error(
            DiagnosticKind::NoMatchingExport {
                alias: "foo".to_string(),
            },
            None,
        );
        assert_eq!(d.kind.to_string(), "No matching export for import \"foo\"");
    }

    #[test]
    fn log_tracks_errors_independent_of_warnings() {
        let mut log = DiagnosticLog::new();
        log.push(Diagnostic::warning(
            DiagnosticKind::ImportAlwaysUndefined {
                alias: "bar".into(),
            },
            None,
        ));
        assert!(!log.has_errors());
        log.push(Diagnostic::error(
            DiagnosticKind::AmbiguousImport { alias: "baz".into() },
            None,
        ));
        assert!(log.has_errors());
        assert_eq!(log.warnings().count(), 1);
        assert_eq!(log.errors().count(), 1);
    }
}
