//! Reader for line-oriented, directive-based table sources.
//!
//! Each line is `keyword operand*`. Operands are separated by blanks, and an
//! operand starting with `#` comments out the rest of the line. `include`
//! directives are resolved here; every other directive is passed to a
//! [`DirectiveHandler`].
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::constants::MAX_INCLUDE_DEPTH;
use crate::error::TableError;
use crate::paths::with_default_extension;
use crate::vfs::Filesystem;

mod diagnostic;
mod text;

pub use self::diagnostic::{Diagnostic, DiagnosticKind, DirectiveError, Location};
pub use self::text::parse_text;

const INCLUDE_KEYWORD: &str = "include";
const COMMENT_PREFIX: char = '#';

/// A compiled table together with the directives that were skipped.
#[derive(Debug)]
pub struct Compiled<T> {
    pub table: T,
    pub diagnostics: Vec<Diagnostic>,
}

/// One source line, split into operands.
#[derive(Debug)]
pub struct Directive<'a> {
    keyword: &'a str,
    operands: Vec<&'a str>,
    next: usize,
    location: Location,
}

impl<'a> Directive<'a> {
    fn parse(line: &'a str, location: Location) -> Option<Directive<'a>> {
        let mut words = line
            .split(|c: char| c == ' ' || c == '\t')
            .filter(|w| !w.is_empty())
            .take_while(|w| !w.starts_with(COMMENT_PREFIX));

        let keyword = words.next()?;

        Some(Directive {
            keyword,
            operands: words.collect(),
            next: 0,
            location,
        })
    }

    #[inline(always)]
    pub fn keyword(&self) -> &'a str {
        self.keyword
    }

    #[inline(always)]
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn next_operand(&mut self) -> Option<&'a str> {
        let operand = self.operands.get(self.next).copied()?;
        self.next += 1;
        Some(operand)
    }

    /// Next operand, or a syntax diagnostic naming what was expected.
    pub fn require_operand(&mut self, what: &str) -> Result<&'a str, DiagnosticKind> {
        self.next_operand()
            .ok_or_else(|| DiagnosticKind::syntax(format!("missing {}", what)))
    }

    /// Rejects trailing operands nobody consumed.
    pub fn finish(&self) -> Result<(), DiagnosticKind> {
        match self.operands.get(self.next) {
            None => Ok(()),
            Some(extra) => Err(DiagnosticKind::syntax(format!(
                "unexpected operand `{}`",
                extra
            ))),
        }
    }
}

pub trait DirectiveHandler {
    fn handle(&mut self, directive: &mut Directive<'_>) -> Result<(), DirectiveError>;
}

/// Reads one source file, following its includes, and feeds every directive to
/// the handler. Returns the diagnostics of skipped directives.
pub struct DataFileReader<'fs, FS: Filesystem> {
    fs: &'fs FS,
    include_extension: &'static str,
    diagnostics: Vec<Diagnostic>,
}

impl<'fs, FS: Filesystem> DataFileReader<'fs, FS> {
    pub fn new(fs: &'fs FS, include_extension: &'static str) -> Self {
        DataFileReader {
            fs,
            include_extension,
            diagnostics: vec![],
        }
    }

    pub fn process<H: DirectiveHandler>(
        mut self,
        path: &Path,
        handler: &mut H,
    ) -> Result<Vec<Diagnostic>, TableError> {
        let source = self
            .fs
            .read_to_string(path)
            .map_err(|e| TableError::load(path, e))?;
        self.process_source(path, &source, handler, 0)?;
        Ok(self.diagnostics)
    }

    fn process_source<H: DirectiveHandler>(
        &mut self,
        path: &Path,
        source: &str,
        handler: &mut H,
        depth: usize,
    ) -> Result<(), TableError> {
        let file: Arc<Path> = Arc::from(path);

        for (index, line) in source.lines().enumerate() {
            let location = Location::new(file.clone(), index + 1);
            let mut directive = match Directive::parse(line, location) {
                Some(v) => v,
                None => continue,
            };

            let result = if directive.keyword() == INCLUDE_KEYWORD {
                self.include(path, &mut directive, handler, depth)
            } else {
                handler.handle(&mut directive)
            };

            match result {
                Ok(()) => {}
                Err(DirectiveError::Skip(kind)) => {
                    self.report(Diagnostic::new(directive.location().clone(), kind))
                }
                Err(DirectiveError::Fatal(e)) => return Err(e),
            }
        }

        Ok(())
    }

    fn include<H: DirectiveHandler>(
        &mut self,
        from: &Path,
        directive: &mut Directive<'_>,
        handler: &mut H,
        depth: usize,
    ) -> Result<(), DirectiveError> {
        let name = directive.require_operand("include file")?;
        directive.finish()?;

        if depth + 1 >= MAX_INCLUDE_DEPTH {
            let message = format!("`{}` nested too deeply", name);
            return Err(DiagnosticKind::Include(message.into()).into());
        }

        let path = self.include_path(from, name);
        let source = self.fs.read_to_string(&path).map_err(|e| {
            DirectiveError::from(DiagnosticKind::Include(
                format!("{}: {}", path.display(), e).into(),
            ))
        })?;

        log::debug!("including {}", path.display());
        self.process_source(&path, &source, handler, depth + 1)
            .map_err(DirectiveError::Fatal)
    }

    fn include_path(&self, from: &Path, name: &str) -> PathBuf {
        let name = Path::new(name);
        let path = if name.is_absolute() {
            name.to_path_buf()
        } else {
            from.parent().unwrap_or_else(|| Path::new("")).join(name)
        };

        with_default_extension(path, self.include_extension)
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::Fs;

    #[derive(Default)]
    struct Collect {
        lines: Vec<(String, Vec<String>, usize)>,
    }

    impl DirectiveHandler for Collect {
        fn handle(&mut self, directive: &mut Directive<'_>) -> Result<(), DirectiveError> {
            match directive.keyword() {
                "bad" => Err(DiagnosticKind::syntax("bad directive").into()),
                "fatal" => Err(DirectiveError::Fatal(TableError::OutOfMemory { requested: 1 })),
                keyword => {
                    let mut operands = vec![];
                    while let Some(op) = directive.next_operand() {
                        operands.push(op.to_string());
                    }
                    self.lines
                        .push((keyword.to_string(), operands, directive.location().line));
                    Ok(())
                }
            }
        }
    }

    #[test]
    fn operands_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.ctb");
        std::fs::write(
            &path,
            "# comment line\n\n  always\tab  12 # trailing\nword the 2346\r\n",
        )
        .unwrap();

        let mut handler = Collect::default();
        let diagnostics = DataFileReader::new(&Fs, "cti")
            .process(&path, &mut handler)
            .unwrap();

        assert!(diagnostics.is_empty());
        assert_eq!(
            handler.lines,
            vec![
                ("always".into(), vec!["ab".into(), "12".into()], 3),
                ("word".into(), vec!["the".into(), "2346".into()], 4),
            ]
        );
    }

    #[test]
    fn includes_and_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("common.cti"), "always x 1346\nbad line\n").unwrap();
        std::fs::write(
            dir.path().join("main.ctb"),
            "include common\ninclude missing\nalways y 13456\n",
        )
        .unwrap();

        let mut handler = Collect::default();
        let diagnostics = DataFileReader::new(&Fs, "cti")
            .process(&dir.path().join("main.ctb"), &mut handler)
            .unwrap();

        assert_eq!(handler.lines.len(), 2);
        assert_eq!(handler.lines[0].0, "always");
        assert_eq!(handler.lines[1].1[0], "y");

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].location.line, 2);
        assert!(diagnostics[0].location.file.ends_with("common.cti"));
        assert!(matches!(diagnostics[0].kind, DiagnosticKind::Syntax(_)));
        assert_eq!(diagnostics[1].location.line, 2);
        assert!(matches!(diagnostics[1].kind, DiagnosticKind::Include(_)));
    }

    #[test]
    fn recursive_include_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("loop.cti"), "include loop\n").unwrap();
        std::fs::write(dir.path().join("main.ctb"), "include loop\n").unwrap();

        let diagnostics = DataFileReader::new(&Fs, "cti")
            .process(&dir.path().join("main.ctb"), &mut Collect::default())
            .unwrap();

        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(diagnostics[0].kind, DiagnosticKind::Include(_)));
    }

    #[test]
    fn fatal_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.ctb");
        std::fs::write(&path, "always a 1\nfatal\nalways b 12\n").unwrap();

        let mut handler = Collect::default();
        let result = DataFileReader::new(&Fs, "cti").process(&path, &mut handler);
        assert!(matches!(result, Err(TableError::OutOfMemory { .. })));
        assert_eq!(handler.lines.len(), 1);

        let result = DataFileReader::new(&Fs, "cti")
            .process(&dir.path().join("nope.ctb"), &mut Collect::default());
        assert!(matches!(result, Err(TableError::Load { .. })));
    }
}
