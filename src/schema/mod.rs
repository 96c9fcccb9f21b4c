//! Schema declarations and their static reference analysis.
//!
//! Declarations say, per entity schema, which fields hold references to
//! which other schemas and with what cardinality. The analyzer turns them
//! into a [`SchemaReferenceIndex`] once, at store construction.

mod declaration;
mod references;

pub use declaration::{EntitySchema, FieldDeclaration, SchemaMap};
pub use references::{RelationType, SchemaReference, SchemaReferenceIndex};
