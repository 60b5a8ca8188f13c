//! Contraction through another braille engine and its own tables.
use std::sync::Arc;

use smol_str::SmolStr;

use super::session::{CapitalizationState, Translation, TranslationSession};
use super::ContractionBackend;
use crate::error::TranslateError;
use crate::types::Dots;

pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Input handed to a third-party engine.
#[derive(Debug, Clone, Copy)]
pub struct AdapterRequest<'a> {
    pub text: &'a [char],
    pub cursor: Option<usize>,
    pub expand_current_word: bool,
    pub capitalization: CapitalizationState,
    pub capacity: usize,
}

/// What a third-party engine produced. Offsets are character indices into
/// the request text, one per cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterOutput {
    pub cells: Vec<Dots>,
    pub offsets: Vec<usize>,
    pub consumed: usize,
}

pub trait ThirdPartyEngine: Send + Sync {
    /// Scheme that selects this engine in a table name, as in `name:tables`.
    fn name(&self) -> &str;

    fn translate(
        &self,
        table_list: &str,
        request: &AdapterRequest<'_>,
    ) -> Result<AdapterOutput, EngineError>;
}

pub struct AdapterTable {
    engine: Arc<dyn ThirdPartyEngine>,
    table_list: SmolStr,
}

impl std::fmt::Debug for AdapterTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterTable")
            .field("engine", &self.engine.name())
            .field("table_list", &self.table_list)
            .finish()
    }
}

impl AdapterTable {
    pub fn new(engine: Arc<dyn ThirdPartyEngine>, table_list: impl Into<SmolStr>) -> AdapterTable {
        AdapterTable {
            engine,
            table_list: table_list.into(),
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn table_list(&self) -> &str {
        &self.table_list
    }
}

impl ContractionBackend for AdapterTable {
    fn translate(
        &self,
        session: &mut TranslationSession,
        text: &str,
    ) -> Result<Translation, TranslateError> {
        let chars: Vec<char> = text.chars().collect();
        let request = AdapterRequest {
            text: &chars,
            cursor: session.cursor,
            expand_current_word: session.expand_current_word,
            capitalization: session.capitalization,
            capacity: session.capacity,
        };

        let engine_error = |source: EngineError| TranslateError::Engine {
            engine: SmolStr::new(self.engine.name()),
            source,
        };

        let output = self
            .engine
            .translate(&self.table_list, &request)
            .map_err(engine_error)?;

        Translation::validated(
            output.cells,
            output.offsets,
            output.consumed,
            chars.len(),
            session.capacity,
        )
        .map_err(|e| engine_error(Box::new(e)))
    }
}
