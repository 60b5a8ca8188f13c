use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::arena::ArenaError;
use crate::error::TableError;

/// Source position of a directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Arc<Path>,
    pub line: usize,
}

impl Location {
    pub fn new(file: Arc<Path>, line: usize) -> Location {
        Location { file, line }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiagnosticKind {
    #[error("syntax error: {0}")]
    Syntax(SmolStr),
    #[error("unknown symbol: {0}")]
    UnknownSymbol(SmolStr),
    #[error("include failed: {0}")]
    Include(SmolStr),
}

impl DiagnosticKind {
    pub fn syntax(message: impl Into<SmolStr>) -> DiagnosticKind {
        DiagnosticKind::Syntax(message.into())
    }

    pub fn unknown(symbol: impl Into<SmolStr>) -> DiagnosticKind {
        DiagnosticKind::UnknownSymbol(symbol.into())
    }
}

/// A directive that was skipped. The compile it belongs to still succeeds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{location}: {kind}")]
pub struct Diagnostic {
    pub location: Location,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(location: Location, kind: DiagnosticKind) -> Diagnostic {
        Diagnostic { location, kind }
    }
}

/// Outcome of a directive handler that did not succeed.
#[derive(Debug)]
pub enum DirectiveError {
    /// Drop this line, report it, keep going.
    Skip(DiagnosticKind),
    /// Abort the whole compile.
    Fatal(TableError),
}

impl From<DiagnosticKind> for DirectiveError {
    fn from(kind: DiagnosticKind) -> Self {
        DirectiveError::Skip(kind)
    }
}

impl From<TableError> for DirectiveError {
    fn from(e: TableError) -> Self {
        DirectiveError::Fatal(e)
    }
}

impl From<ArenaError> for DirectiveError {
    fn from(e: ArenaError) -> Self {
        DirectiveError::Fatal(e.into())
    }
}
