//! Typed definitions of each object kind
//!
//! These are the payloads carried by change operations. Each converts to and
//! from the generic `StructuralObject` form; conversion checks the kind and
//! the required attributes and names the object on failure.

use super::kind::{attr, ObjectKind};
use super::object::{ObjectId, StructuralObject};
use crate::error::{invalid_object, EngineResult};
use serde::{Deserialize, Serialize};

/// Conversion between a typed definition and its structural form
pub trait Definition: Sized {
    const KIND: ObjectKind;

    fn id(&self) -> ObjectId;

    fn to_object(&self) -> StructuralObject;

    fn from_object(object: &StructuralObject) -> EngineResult<Self>;
}

fn expect_kind(object: &StructuralObject, kind: ObjectKind) -> EngineResult<()> {
    if object.kind() != kind {
        return Err(invalid_object(
            &object.id,
            format!("expected a {kind} definition"),
        ));
    }
    Ok(())
}

fn relation_of(object: &StructuralObject) -> EngineResult<String> {
    object
        .id
        .relation
        .clone()
        .ok_or_else(|| invalid_object(&object.id, "missing owning relation"))
}

fn required_text(object: &StructuralObject, name: &str) -> EngineResult<String> {
    object
        .text(name)
        .map(str::to_string)
        .ok_or_else(|| invalid_object(&object.id, format!("missing attribute '{name}'")))
}

fn required_list(object: &StructuralObject, name: &str) -> EngineResult<Vec<String>> {
    match object.list(name) {
        Some(items) if !items.is_empty() => Ok(items.to_vec()),
        _ => Err(invalid_object(
            &object.id,
            format!("attribute '{name}' must list at least one column"),
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDef {
    pub name: String,
}

impl Definition for SchemaDef {
    const KIND: ObjectKind = ObjectKind::Schema;

    fn id(&self) -> ObjectId {
        ObjectId::schema(self.name.clone())
    }

    fn to_object(&self) -> StructuralObject {
        StructuralObject::new(self.id())
    }

    fn from_object(object: &StructuralObject) -> EngineResult<Self> {
        expect_kind(object, Self::KIND)?;
        Ok(Self {
            name: object.id.name.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceDef {
    pub schema: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increment: Option<i64>,
}

impl Definition for SequenceDef {
    const KIND: ObjectKind = ObjectKind::Sequence;

    fn id(&self) -> ObjectId {
        ObjectId::top_level(Self::KIND, self.schema.clone(), self.name.clone())
    }

    fn to_object(&self) -> StructuralObject {
        StructuralObject::new(self.id())
            .with(attr::START, self.start)
            .with(attr::INCREMENT, self.increment)
    }

    fn from_object(object: &StructuralObject) -> EngineResult<Self> {
        expect_kind(object, Self::KIND)?;
        Ok(Self {
            schema: object.id.schema.clone(),
            name: object.id.name.clone(),
            start: object.int(attr::START),
            increment: object.int(attr::INCREMENT),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

impl Definition for ColumnDef {
    const KIND: ObjectKind = ObjectKind::Column;

    fn id(&self) -> ObjectId {
        ObjectId::contained(Self::KIND, self.schema.clone(), self.table.clone(), self.name.clone())
    }

    fn to_object(&self) -> StructuralObject {
        StructuralObject::new(self.id())
            .with(attr::DATA_TYPE, self.data_type.clone())
            .with(attr::NULLABLE, self.nullable)
            .with(attr::DEFAULT_VALUE, self.default_value.clone())
            .with(attr::POSITION, self.position)
    }

    fn from_object(object: &StructuralObject) -> EngineResult<Self> {
        expect_kind(object, Self::KIND)?;
        Ok(Self {
            schema: object.id.schema.clone(),
            table: relation_of(object)?,
            name: object.id.name.clone(),
            data_type: required_text(object, attr::DATA_TYPE)?,
            // Columns are nullable unless declared otherwise
            nullable: object.bool(attr::NULLABLE).unwrap_or(true),
            default_value: object.text(attr::DEFAULT_VALUE).map(str::to_string),
            position: object.int(attr::POSITION),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKeyDef {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
}

impl Definition for PrimaryKeyDef {
    const KIND: ObjectKind = ObjectKind::PrimaryKey;

    fn id(&self) -> ObjectId {
        ObjectId::contained(Self::KIND, self.schema.clone(), self.table.clone(), self.name.clone())
    }

    fn to_object(&self) -> StructuralObject {
        StructuralObject::new(self.id()).with(attr::COLUMNS, self.columns.clone())
    }

    fn from_object(object: &StructuralObject) -> EngineResult<Self> {
        expect_kind(object, Self::KIND)?;
        Ok(Self {
            schema: object.id.schema.clone(),
            table: relation_of(object)?,
            name: object.id.name.clone(),
            columns: required_list(object, attr::COLUMNS)?,
        })
    }
}

/// A table together with the columns and primary key created alongside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDef {
    pub schema: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKeyDef>,
    /// Foreign keys declared inline, for backends that cannot add them later
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl TableDef {
    /// Every structural object this definition creates, the table first
    pub fn objects(&self) -> Vec<StructuralObject> {
        let mut objects = vec![self.to_object()];
        objects.extend(self.columns.iter().map(Definition::to_object));
        objects.extend(self.primary_key.iter().map(Definition::to_object));
        objects.extend(self.foreign_keys.iter().map(Definition::to_object));
        objects
    }

    /// Every identity this definition covers
    pub fn affected_ids(&self) -> Vec<ObjectId> {
        self.objects().into_iter().map(|o| o.id).collect()
    }
}

impl Definition for TableDef {
    const KIND: ObjectKind = ObjectKind::Table;

    fn id(&self) -> ObjectId {
        ObjectId::top_level(Self::KIND, self.schema.clone(), self.name.clone())
    }

    /// The table object alone; columns and key are separate objects
    fn to_object(&self) -> StructuralObject {
        StructuralObject::new(self.id()).with(attr::REMARKS, self.remarks.clone())
    }

    fn from_object(object: &StructuralObject) -> EngineResult<Self> {
        expect_kind(object, Self::KIND)?;
        Ok(Self {
            schema: object.id.schema.clone(),
            name: object.id.name.clone(),
            remarks: object.text(attr::REMARKS).map(str::to_string),
            columns: Vec::new(),
            primary_key: None,
            foreign_keys: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueConstraintDef {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
}

impl Definition for UniqueConstraintDef {
    const KIND: ObjectKind = ObjectKind::UniqueConstraint;

    fn id(&self) -> ObjectId {
        ObjectId::contained(Self::KIND, self.schema.clone(), self.table.clone(), self.name.clone())
    }

    fn to_object(&self) -> StructuralObject {
        StructuralObject::new(self.id()).with(attr::COLUMNS, self.columns.clone())
    }

    fn from_object(object: &StructuralObject) -> EngineResult<Self> {
        expect_kind(object, Self::KIND)?;
        Ok(Self {
            schema: object.id.schema.clone(),
            table: relation_of(object)?,
            name: object.id.name.clone(),
            columns: required_list(object, attr::COLUMNS)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDef {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl Definition for IndexDef {
    const KIND: ObjectKind = ObjectKind::Index;

    fn id(&self) -> ObjectId {
        ObjectId::contained(Self::KIND, self.schema.clone(), self.table.clone(), self.name.clone())
    }

    fn to_object(&self) -> StructuralObject {
        StructuralObject::new(self.id())
            .with(attr::COLUMNS, self.columns.clone())
            .with(attr::UNIQUE, self.unique)
    }

    fn from_object(object: &StructuralObject) -> EngineResult<Self> {
        expect_kind(object, Self::KIND)?;
        Ok(Self {
            schema: object.id.schema.clone(),
            table: relation_of(object)?,
            name: object.id.name.clone(),
            columns: required_list(object, attr::COLUMNS)?,
            unique: object.bool(attr::UNIQUE).unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyDef {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,
}

impl Definition for ForeignKeyDef {
    const KIND: ObjectKind = ObjectKind::ForeignKey;

    fn id(&self) -> ObjectId {
        ObjectId::contained(Self::KIND, self.schema.clone(), self.table.clone(), self.name.clone())
    }

    fn to_object(&self) -> StructuralObject {
        StructuralObject::new(self.id())
            .with(attr::COLUMNS, self.columns.clone())
            .with(attr::REFERENCED_SCHEMA, self.referenced_schema.clone())
            .with(attr::REFERENCED_TABLE, self.referenced_table.clone())
            .with(attr::REFERENCED_COLUMNS, self.referenced_columns.clone())
            .with(attr::ON_DELETE, self.on_delete.clone())
            .with(attr::ON_UPDATE, self.on_update.clone())
    }

    fn from_object(object: &StructuralObject) -> EngineResult<Self> {
        expect_kind(object, Self::KIND)?;
        let columns = required_list(object, attr::COLUMNS)?;
        let referenced_columns = required_list(object, attr::REFERENCED_COLUMNS)?;
        if columns.len() != referenced_columns.len() {
            return Err(invalid_object(
                &object.id,
                "column count does not match referenced column count",
            ));
        }
        Ok(Self {
            schema: object.id.schema.clone(),
            table: relation_of(object)?,
            name: object.id.name.clone(),
            columns,
            referenced_schema: object
                .text(attr::REFERENCED_SCHEMA)
                .unwrap_or(&object.id.schema)
                .to_string(),
            referenced_table: required_text(object, attr::REFERENCED_TABLE)?,
            referenced_columns,
            on_delete: object.text(attr::ON_DELETE).map(str::to_string),
            on_update: object.text(attr::ON_UPDATE).map(str::to_string),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDef {
    pub schema: String,
    pub name: String,
    pub definition: String,
}

impl Definition for ViewDef {
    const KIND: ObjectKind = ObjectKind::View;

    fn id(&self) -> ObjectId {
        ObjectId::top_level(Self::KIND, self.schema.clone(), self.name.clone())
    }

    fn to_object(&self) -> StructuralObject {
        StructuralObject::new(self.id()).with(attr::DEFINITION, self.definition.clone())
    }

    fn from_object(object: &StructuralObject) -> EngineResult<Self> {
        expect_kind(object, Self::KIND)?;
        Ok(Self {
            schema: object.id.schema.clone(),
            name: object.id.name.clone(),
            definition: required_text(object, attr::DEFINITION)?,
        })
    }
}
