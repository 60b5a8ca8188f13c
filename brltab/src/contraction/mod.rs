//! Contraction tables and the backends that apply them.
//!
//! A [`ContractionTable`] is one of three backends, chosen once when the
//! table is loaded:
//!
//! * a native table compiled from `.ctb` source, or mapped from a persisted
//!   `.bctb` blob;
//! * an external helper program spoken to over a pipe;
//! * a registered third-party engine, named as `scheme:table-list`.
//!
//! All of them translate through [`ContractionBackend`].
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::HashMap;
use smol_str::SmolStr;

use crate::config::TableConfig;
use crate::datafile::Compiled;
use crate::error::{TableError, TranslateError};
use crate::paths::{self, TableKind};
use crate::vfs::Fs;

pub mod adapter;
pub mod compile;
pub mod external;
pub mod layout;
pub mod opcode;
pub mod session;
mod translate;

pub use self::adapter::{AdapterRequest, AdapterTable, ThirdPartyEngine};
pub use self::compile::ContractionCompiler;
pub use self::external::ExternalTable;
pub use self::layout::NativeTable;
pub use self::opcode::Opcode;
pub use self::session::{Translation, TranslationSession, TranslationStatus};

/// Extension of a persisted native table.
pub const COMPILED_EXTENSION: &str = "bctb";

pub trait ContractionBackend {
    /// Translate `text` to braille cells.
    ///
    /// Running out of output capacity is not an error: the result then has
    /// [`TranslationStatus::BufferFull`] and covers the input consumed so far.
    fn translate(
        &self,
        session: &mut TranslationSession,
        text: &str,
    ) -> Result<Translation, TranslateError>;
}

impl ContractionBackend for NativeTable {
    fn translate(
        &self,
        session: &mut TranslationSession,
        text: &str,
    ) -> Result<Translation, TranslateError> {
        Ok(translate::translate(self, session, text))
    }
}

#[derive(Debug)]
pub enum ContractionTable {
    Native(NativeTable),
    External(ExternalTable),
    Adapter(AdapterTable),
}

impl ContractionTable {
    pub fn kind(&self) -> &'static str {
        match self {
            ContractionTable::Native(_) => "native",
            ContractionTable::External(_) => "external",
            ContractionTable::Adapter(_) => "adapter",
        }
    }

    /// Release the table. A running helper process is stopped.
    pub fn destroy(self) {
        log::debug!("destroying {} contraction table", self.kind());
        drop(self);
    }
}

impl ContractionBackend for ContractionTable {
    fn translate(
        &self,
        session: &mut TranslationSession,
        text: &str,
    ) -> Result<Translation, TranslateError> {
        match self {
            ContractionTable::Native(table) => table.translate(session, text),
            ContractionTable::External(table) => table.translate(session, text),
            ContractionTable::Adapter(table) => table.translate(session, text),
        }
    }
}

/// Finds contraction tables by name and picks their backend.
pub struct ContractionTableLoader {
    config: TableConfig,
    engines: HashMap<SmolStr, Arc<dyn ThirdPartyEngine>>,
}

impl ContractionTableLoader {
    pub fn new(config: TableConfig) -> ContractionTableLoader {
        ContractionTableLoader {
            config,
            engines: HashMap::new(),
        }
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Make `scheme:table-list` names resolve to `engine`.
    pub fn register_engine(&mut self, engine: Arc<dyn ThirdPartyEngine>) {
        self.engines.insert(SmolStr::new(engine.name()), engine);
    }

    /// Path of the source table `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        paths::path_for(&self.config.tables_directory, TableKind::Contraction, name)
    }

    /// Compile the source table `name`, keeping the skipped directives.
    pub fn compile(&self, name: &str) -> Result<Compiled<NativeTable>, TableError> {
        self.compile_path(&self.path_for(name))
    }

    fn compile_path(&self, path: &Path) -> Result<Compiled<NativeTable>, TableError> {
        compile::compile_file(&Fs, path, self.config.arena_limit)
    }

    pub fn load(&self, name: &str) -> Result<ContractionTable, TableError> {
        if let Some((scheme, table_list)) = name.split_once(':') {
            // One letter is a drive, not a scheme.
            if scheme.len() > 1 {
                if let Some(engine) = self.engines.get(scheme) {
                    log::debug!("using {} engine for {}", scheme, table_list);
                    return Ok(ContractionTable::Adapter(AdapterTable::new(
                        Arc::clone(engine),
                        table_list,
                    )));
                }
            }
        }

        let path = paths::resolve(&self.config.tables_directory, TableKind::Contraction, name);
        let extension = path.extension().and_then(|e| e.to_str());

        let table = match extension {
            Some(ext) if ext == TableKind::Contraction.extension() => {
                ContractionTable::Native(self.compile_path(&path)?.table)
            }
            Some(ext) if ext == TableKind::Contraction.include_extension() => {
                ContractionTable::Native(self.compile_path(&path)?.table)
            }
            Some(COMPILED_EXTENSION) => ContractionTable::Native(NativeTable::open(&Fs, &path)?),
            _ if paths::is_executable(&path) => {
                ContractionTable::External(ExternalTable::new(path))
            }
            None => ContractionTable::Native(self.compile(name)?.table),
            Some(_) => return Err(TableError::UnsupportedTable(path)),
        };

        log::debug!("loaded {} contraction table {}", table.kind(), name);
        Ok(table)
    }
}
