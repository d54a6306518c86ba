//! The OOXML layer: package I/O, part trees, derived tables, and the
//! document-level operations built on them.

pub mod captions;
pub mod extract;
pub mod labels;
pub mod locator;
pub mod numbering;
pub mod package;
pub mod para;
pub mod strip;
pub mod styles;
pub mod template;
pub mod walker;
pub mod xml;
