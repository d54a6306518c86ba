//! Structured manipulation of WordprocessingML (`.docx`) packages.
//!
//! The crate opens a package without disturbing the parts it does not
//! touch, parses the XML parts it needs into editable trees, and
//! offers document-level operations on top: locating and extracting
//! numbered sections, renumbering figure and table captions together
//! with their cross-references, reconstructing the list numbering Word
//! renders, injecting `{{ placeholder }}` paragraphs, and stripping
//! generated or hidden content.
//!
//! Heuristic knobs (caption labels, sub-heading lookahead) load from a
//! TOML file via [`heuristics::HeuristicRules`]; everything else is
//! derived from the package itself.

pub mod docx;
pub mod error;
pub mod heuristics;
pub mod progress;
pub mod textutil;

pub use error::{DocxError, Result};
