//! Structural object model
//!
//! Backends, object kinds with their attribute tables, identities, and the
//! typed definitions carried by change operations.

pub mod backend;
pub mod definitions;
pub mod kind;
pub mod object;

pub use backend::Backend;
pub use definitions::{
    ColumnDef, Definition, ForeignKeyDef, IndexDef, PrimaryKeyDef, SchemaDef, SequenceDef,
    TableDef, UniqueConstraintDef, ViewDef,
};
pub use kind::{attr, AttributeSpec, Comparison, KindDescriptor, ObjectKind};
pub use object::{AttrValue, AttributeDelta, ObjectId, StructuralObject};
