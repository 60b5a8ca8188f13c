//! Attribute tables: screen attribute bitmask to dot pattern.
//!
//! A source table defines up to eight dots, one directive each:
//!
//! ```text
//! dot 1 =fg-blue   # dot 1 while the foreground is blue
//! dot 8 ~blink     # dot 8 while not blinking
//! ```
//!
//! Compiling evaluates the definitions for every one of the 256 attribute
//! values, so lookups are a single index.
use std::io::Write;
use std::path::Path;

use crate::config::TableConfig;
use crate::constants::ATTRIBUTE_TABLE_SIZE;
use crate::contraction::layout::LayoutError;
use crate::datafile::Compiled;
use crate::error::TableError;
use crate::paths::{path_for, TableKind};
use crate::types::Dots;
use crate::vfs::{Filesystem, Fs};

pub mod compile;
pub mod symbols;

pub use self::compile::{DotDefinition, DotOperation};

/// Extension of a persisted attribute table.
pub const COMPILED_EXTENSION: &str = "batb";

#[derive(Clone, PartialEq, Eq)]
pub struct AttributesTable {
    cells: Box<[Dots; ATTRIBUTE_TABLE_SIZE]>,
}

impl std::fmt::Debug for AttributesTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributesTable").finish_non_exhaustive()
    }
}

impl AttributesTable {
    /// Compile the named table from the configured tables directory.
    pub fn compile(config: &TableConfig, name: &str) -> Result<Compiled<Self>, TableError> {
        let path = path_for(&config.tables_directory, TableKind::Attributes, name);
        compile::compile_file(&Fs, &path, config.arena_limit)
    }

    /// A persisted table is exactly the 256 cells, nothing else.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LayoutError> {
        let cells: [Dots; ATTRIBUTE_TABLE_SIZE] =
            bytes.try_into().map_err(|_| LayoutError::WrongSize {
                expected: ATTRIBUTE_TABLE_SIZE,
                actual: bytes.len(),
            })?;

        Ok(AttributesTable {
            cells: Box::new(cells),
        })
    }

    pub fn open<FS: Filesystem>(fs: &FS, path: &Path) -> Result<Self, TableError> {
        let mut file = fs.open_file(path).map_err(|e| TableError::load(path, e))?;
        let mut bytes = Vec::with_capacity(ATTRIBUTE_TABLE_SIZE);
        std::io::Read::read_to_end(&mut file, &mut bytes).map_err(|e| TableError::load(path, e))?;
        Ok(Self::from_bytes(&bytes)?)
    }

    #[inline(always)]
    pub fn dots_for(&self, attributes: u8) -> Dots {
        self.cells[attributes as usize]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.cells[..]
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(self.as_bytes())
    }

    pub fn destroy(self) {
        log::trace!("attribute table released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datafile::DiagnosticKind;
    use proptest::prelude::*;

    fn compile_source(source: &str) -> Compiled<AttributesTable> {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("Attributes");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("test.atb"), source).unwrap();

        AttributesTable::compile(&TableConfig::new(dir.path()), "test").unwrap()
    }

    #[test]
    fn blue_and_not_blink() {
        let compiled = compile_source("dot 1 =fg-blue\ndot 2 ~blink\n");
        assert!(compiled.diagnostics.is_empty());

        let table = compiled.table;
        assert_eq!(table.dots_for(0x01), 0b11);
        assert_eq!(table.dots_for(0x81), 0b01);
        assert_eq!(table.dots_for(0x80), 0b00);
        assert_eq!(table.dots_for(0x00), 0b10);
    }

    #[test]
    fn unknown_name_is_skipped() {
        let compiled = compile_source("dot 1 fg-purple=x\n");
        assert_eq!(compiled.diagnostics.len(), 1);
        assert_eq!(compiled.diagnostics[0].location.line, 1);
        assert!(matches!(
            compiled.diagnostics[0].kind,
            DiagnosticKind::UnknownSymbol(_)
        ));
        assert!((0..=255u8).all(|v| compiled.table.dots_for(v) == 0));
    }

    #[test]
    fn bad_directives_do_not_stop_the_compile() {
        let compiled = compile_source(
            "dot 9 =blink\ndot 0 =blink\ndot one =blink\ndot 3\ncolour 3 =blink\ndot 3 =bit2 extra\ndot 3 =bit2\n",
        );
        assert_eq!(compiled.diagnostics.len(), 6);
        assert!(compiled
            .diagnostics
            .iter()
            .all(|d| matches!(d.kind, DiagnosticKind::Syntax(_))));
        assert_eq!(compiled.table.dots_for(0x04), 0b100);
        assert_eq!(compiled.table.dots_for(0xfb), 0);
    }

    #[test]
    fn later_definition_wins() {
        let table = compile_source("dot 4 =bg-red\ndot 4 ~bit10\n").table;
        assert_eq!(table.dots_for(0x40), 1 << 3);
        assert_eq!(table.dots_for(0x10), 0);
    }

    #[test]
    fn deterministic() {
        let source = "dot 1 =fg-red\ndot 5 ~bg-green\ndot 8 =bit7\n";
        let a = compile_source(source).table;
        let b = compile_source(source).table;
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn persisted_form() {
        let table = compile_source("dot 7 =fg-bright\n").table;
        let mut bytes = vec![];
        table.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), ATTRIBUTE_TABLE_SIZE);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.batb");
        std::fs::write(&path, &bytes).unwrap();
        assert_eq!(AttributesTable::open(&Fs, &path).unwrap(), table);

        assert!(matches!(
            AttributesTable::from_bytes(&bytes[1..]),
            Err(LayoutError::WrongSize { expected: 256, actual: 255 })
        ));
    }

    #[test]
    fn missing_file_and_arena_limit() {
        let dir = tempfile::tempdir().unwrap();
        let result = AttributesTable::compile(&TableConfig::new(dir.path()), "absent");
        assert!(matches!(result, Err(TableError::Load { .. })));

        let path = dir.path().join("small.atb");
        std::fs::write(&path, "dot 1 =blink\n").unwrap();
        let result = compile::compile_file(&Fs, &path, Some(100));
        assert!(matches!(result, Err(TableError::OutOfMemory { .. })));
    }

    fn definition() -> impl Strategy<Value = Option<(u8, bool)>> {
        proptest::option::of((0u8..8, any::<bool>()))
    }

    proptest! {
        #[test]
        fn exhaustive_against_per_dot_evaluation(
            dots in proptest::collection::vec(definition(), 8)
        ) {
            let mut source = String::new();
            for (index, dot) in dots.iter().enumerate() {
                if let Some((bit, present)) = dot {
                    let op = if *present { '=' } else { '~' };
                    source.push_str(&format!("dot {} {}bit{}\n", index + 1, op, bit));
                }
            }

            let compiled = compile_source(&source);
            prop_assert!(compiled.diagnostics.is_empty());

            for value in 0..=255u8 {
                let cell = compiled.table.dots_for(value);
                for (index, dot) in dots.iter().enumerate() {
                    let raised = cell & (1u8 << index) != 0;
                    match dot {
                        None => prop_assert!(!raised),
                        Some((bit, present)) => {
                            let set = value & (1u8 << bit) != 0;
                            prop_assert_eq!(raised, set == *present);
                        }
                    }
                }
            }
        }
    }
}
