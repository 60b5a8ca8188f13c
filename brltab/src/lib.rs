/*! Braille attribute and contraction tables.

Compiles the line-oriented table sources used by braille screen readers into
compact, relocatable binary tables, and applies them to live screen content:

* attribute tables map an 8-bit screen attribute (colour, blink) to a dot
  pattern through an exhaustively precomputed 256-entry table;
* contraction tables turn text into contracted braille with thousands of
  context-sensitive rules, hash-indexed and chained inside one flat blob.

# Usage examples

```no_run
use brltab::config::TableConfig;
use brltab::contraction::{ContractionBackend, ContractionTableLoader};
use brltab::contraction::session::TranslationSession;

let config = TableConfig::new("/etc/brltty");
let table = ContractionTableLoader::new(config.clone()).load("en-us-g2").unwrap();
let mut session = TranslationSession::new(&config);
let translation = table.translate(&mut session, "the cat sat").unwrap();
println!("{}", translation.to_unicode());
```

The `brltab` and `brltab-tools` binaries in the same repository show the
rest of the public interface in use.
*/

pub mod arena;
pub mod attributes;
pub mod classify;
pub mod config;
pub mod contraction;
pub mod datafile;
pub mod error;
pub mod paths;
pub mod types;
pub mod vfs;

pub(crate) mod constants;

pub use crate::error::{TableError, TranslateError};
