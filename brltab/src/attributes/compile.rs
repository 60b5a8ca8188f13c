use std::path::Path;

use crate::arena::DataArena;
use crate::constants::{ATTRIBUTE_TABLE_SIZE, DOT_COUNT};
use crate::datafile::{
    Compiled, DataFileReader, DiagnosticKind, Directive, DirectiveError, DirectiveHandler,
};
use crate::error::TableError;
use crate::paths::TableKind;
use crate::types::Dots;
use crate::vfs::Filesystem;

use super::symbols::attribute_bit;
use super::AttributesTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DotOperation {
    /// `=`: the dot is raised while the bit is set.
    WhenPresent,
    /// `~`: the dot is raised while the bit is clear.
    WhenAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DotDefinition {
    pub attribute: u8,
    pub operation: DotOperation,
}

impl DotDefinition {
    #[inline(always)]
    pub fn is_raised(&self, attributes: u8) -> bool {
        let present = attributes & self.attribute != 0;
        match self.operation {
            DotOperation::WhenPresent => present,
            DotOperation::WhenAbsent => !present,
        }
    }
}

/// Dot definitions indexed by physical dot, 0 being dot 1.
pub type DotDefinitions = [Option<DotDefinition>; DOT_COUNT];

/// Materialize every attribute value into `out`, which holds one cell per value.
pub fn fill(dots: &DotDefinitions, out: &mut [Dots]) {
    for (value, cell) in out.iter_mut().enumerate() {
        *cell = dots
            .iter()
            .enumerate()
            .filter_map(|(index, dot)| dot.map(|dot| (index, dot)))
            .filter(|(_, dot)| dot.is_raised(value as u8))
            .fold(0, |cell, (index, _)| cell | (1u8 << index));
    }
}

#[derive(Debug, Default)]
pub(crate) struct AttributesCompiler {
    pub(crate) dots: DotDefinitions,
}

impl AttributesCompiler {
    fn parse_dot(&mut self, directive: &mut Directive<'_>) -> Result<(), DiagnosticKind> {
        let number = directive.require_operand("dot number")?;
        let index = match number.parse::<usize>() {
            Ok(n @ 1..=DOT_COUNT) => n - 1,
            _ => {
                return Err(DiagnosticKind::syntax(format!(
                    "invalid dot number `{}`",
                    number
                )))
            }
        };

        let operand = directive.require_operand("dot operation")?;
        let definition = parse_operation(operand)?;
        directive.finish()?;

        if self.dots[index].is_some() {
            log::debug!("dot {} redefined", index + 1);
        }
        self.dots[index] = Some(definition);
        Ok(())
    }
}

/// Parse `<attribute><op><name>`, normally written `=name` or `~name`.
fn parse_operation(operand: &str) -> Result<DotDefinition, DiagnosticKind> {
    let split = operand
        .char_indices()
        .find(|(_, c)| *c == '=' || *c == '~')
        .ok_or_else(|| DiagnosticKind::syntax(format!("missing operator in `{}`", operand)))?;

    let (at, op) = split;
    let operation = match op {
        '=' => DotOperation::WhenPresent,
        _ => DotOperation::WhenAbsent,
    };

    let prefix = &operand[..at];
    let suffix = &operand[at + op.len_utf8()..];

    let name = match (prefix.is_empty(), suffix.is_empty()) {
        (true, true) => return Err(DiagnosticKind::syntax("missing attribute name")),
        (true, false) => suffix,
        (false, true) => prefix,
        (false, false) => prefix,
    };

    let attribute = attribute_bit(name).ok_or_else(|| DiagnosticKind::unknown(name))?;

    if !prefix.is_empty() && !suffix.is_empty() {
        return Err(DiagnosticKind::syntax(format!(
            "unexpected text `{}` after operator",
            suffix
        )));
    }

    Ok(DotDefinition {
        attribute,
        operation,
    })
}

impl DirectiveHandler for AttributesCompiler {
    fn handle(&mut self, directive: &mut Directive<'_>) -> Result<(), DirectiveError> {
        match directive.keyword() {
            "dot" => self.parse_dot(directive).map_err(DirectiveError::from),
            other => Err(DiagnosticKind::syntax(format!("unknown directive `{}`", other)).into()),
        }
    }
}

/// Compile an attribute table source file.
pub fn compile_file<FS: Filesystem>(
    fs: &FS,
    path: &Path,
    arena_limit: Option<usize>,
) -> Result<Compiled<AttributesTable>, TableError> {
    let mut compiler = AttributesCompiler::default();
    let diagnostics = DataFileReader::new(fs, TableKind::Attributes.include_extension())
        .process(path, &mut compiler)?;

    let mut arena = DataArena::with_limit(arena_limit);
    let offset = arena.allocate(ATTRIBUTE_TABLE_SIZE, 1)?;
    fill(&compiler.dots, arena.bytes_mut(offset, ATTRIBUTE_TABLE_SIZE));

    let bytes = arena.finish();
    let table = AttributesTable::from_bytes(&bytes[offset.as_usize()..])?;

    log::debug!(
        "compiled attribute table {} ({} diagnostics)",
        path.display(),
        diagnostics.len()
    );

    Ok(Compiled { table, diagnostics })
}
