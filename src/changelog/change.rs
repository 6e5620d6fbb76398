//! Change operations
//!
//! A `ChangeOp` is one concrete structural action. A `Change` ties a forward
//! operation to the object it acts on and, where derivable, the operation that
//! undoes it.

use crate::model::{
    ColumnDef, Definition, ForeignKeyDef, IndexDef, ObjectId, ObjectKind, PrimaryKeyDef,
    SchemaDef, SequenceDef, TableDef, UniqueConstraintDef, ViewDef,
};
use crate::statement::Terminator;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The broad category of a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Drop,
    Alter,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeAction::Create => "create",
            ChangeAction::Drop => "drop",
            ChangeAction::Alter => "alter",
        })
    }
}

/// Which parts of a column an alteration touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnAspect {
    DataType,
    Nullability,
    Default,
}

/// A concrete structural action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangeOp {
    CreateSchema(SchemaDef),
    DropSchema(SchemaDef),
    CreateSequence(SequenceDef),
    DropSequence(SequenceDef),
    AlterSequence {
        from: SequenceDef,
        to: SequenceDef,
    },
    /// Creates the table with its columns and primary key
    CreateTable(TableDef),
    /// Drops the table; the definition is kept so the drop can be undone
    DropTable(TableDef),
    SetTableRemarks {
        schema: String,
        table: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remarks: Option<String>,
    },
    AddColumn(ColumnDef),
    DropColumn(ColumnDef),
    AlterColumn {
        from: ColumnDef,
        to: ColumnDef,
        aspects: Vec<ColumnAspect>,
    },
    AddPrimaryKey(PrimaryKeyDef),
    DropPrimaryKey(PrimaryKeyDef),
    AddUniqueConstraint(UniqueConstraintDef),
    DropUniqueConstraint(UniqueConstraintDef),
    CreateIndex(IndexDef),
    DropIndex(IndexDef),
    AddForeignKey(ForeignKeyDef),
    DropForeignKey(ForeignKeyDef),
    CreateView {
        view: ViewDef,
        #[serde(default)]
        replace: bool,
    },
    DropView(ViewDef),
    /// Hand-written statement, opaque to simulation
    Sql {
        sql: String,
        #[serde(default)]
        terminator: Terminator,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        affects: Vec<ObjectId>,
    },
    Comment {
        text: String,
    },
}

impl ChangeOp {
    pub fn action(&self) -> ChangeAction {
        match self {
            ChangeOp::CreateSchema(_)
            | ChangeOp::CreateSequence(_)
            | ChangeOp::CreateTable(_)
            | ChangeOp::AddColumn(_)
            | ChangeOp::AddPrimaryKey(_)
            | ChangeOp::AddUniqueConstraint(_)
            | ChangeOp::CreateIndex(_)
            | ChangeOp::AddForeignKey(_)
            | ChangeOp::CreateView { replace: false, .. } => ChangeAction::Create,
            ChangeOp::DropSchema(_)
            | ChangeOp::DropSequence(_)
            | ChangeOp::DropTable(_)
            | ChangeOp::DropColumn(_)
            | ChangeOp::DropPrimaryKey(_)
            | ChangeOp::DropUniqueConstraint(_)
            | ChangeOp::DropIndex(_)
            | ChangeOp::DropForeignKey(_)
            | ChangeOp::DropView(_) => ChangeAction::Drop,
            ChangeOp::AlterSequence { .. }
            | ChangeOp::SetTableRemarks { .. }
            | ChangeOp::AlterColumn { .. }
            | ChangeOp::CreateView { replace: true, .. }
            | ChangeOp::Sql { .. }
            | ChangeOp::Comment { .. } => ChangeAction::Alter,
        }
    }

    /// The object this operation acts on
    pub fn target(&self) -> Option<ObjectId> {
        match self {
            ChangeOp::CreateSchema(d) | ChangeOp::DropSchema(d) => Some(d.id()),
            ChangeOp::CreateSequence(d) | ChangeOp::DropSequence(d) => Some(d.id()),
            ChangeOp::AlterSequence { to, .. } => Some(to.id()),
            ChangeOp::CreateTable(d) | ChangeOp::DropTable(d) => Some(d.id()),
            ChangeOp::SetTableRemarks { schema, table, .. } => Some(ObjectId::top_level(
                ObjectKind::Table,
                schema.clone(),
                table.clone(),
            )),
            ChangeOp::AddColumn(d) | ChangeOp::DropColumn(d) => Some(d.id()),
            ChangeOp::AlterColumn { to, .. } => Some(to.id()),
            ChangeOp::AddPrimaryKey(d) | ChangeOp::DropPrimaryKey(d) => Some(d.id()),
            ChangeOp::AddUniqueConstraint(d) | ChangeOp::DropUniqueConstraint(d) => Some(d.id()),
            ChangeOp::CreateIndex(d) | ChangeOp::DropIndex(d) => Some(d.id()),
            ChangeOp::AddForeignKey(d) | ChangeOp::DropForeignKey(d) => Some(d.id()),
            ChangeOp::CreateView { view, .. } | ChangeOp::DropView(view) => Some(view.id()),
            ChangeOp::Sql { affects, .. } => affects.first().cloned(),
            ChangeOp::Comment { .. } => None,
        }
    }

    /// Every identity the operation creates, drops or alters
    pub fn affected_ids(&self) -> Vec<ObjectId> {
        match self {
            ChangeOp::CreateTable(d) | ChangeOp::DropTable(d) => d.affected_ids(),
            ChangeOp::Sql { affects, .. } => affects.clone(),
            other => other.target().into_iter().collect(),
        }
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        match self {
            ChangeOp::CreateSchema(d) => format!("Create schema {}", d.name),
            ChangeOp::DropSchema(d) => format!("Drop schema {}", d.name),
            ChangeOp::CreateSequence(d) => format!("Create sequence {}.{}", d.schema, d.name),
            ChangeOp::DropSequence(d) => format!("Drop sequence {}.{}", d.schema, d.name),
            ChangeOp::AlterSequence { to, .. } => format!("Alter sequence {}.{}", to.schema, to.name),
            ChangeOp::CreateTable(d) => {
                format!("Create table {}.{} ({} columns)", d.schema, d.name, d.columns.len())
            }
            ChangeOp::DropTable(d) => format!("Drop table {}.{}", d.schema, d.name),
            ChangeOp::SetTableRemarks { schema, table, .. } => {
                format!("Set remarks on table {schema}.{table}")
            }
            ChangeOp::AddColumn(d) => format!("Add column {} to {}.{}", d.name, d.schema, d.table),
            ChangeOp::DropColumn(d) => {
                format!("Drop column {} from {}.{}", d.name, d.schema, d.table)
            }
            ChangeOp::AlterColumn { to, aspects, .. } => format!(
                "Alter column {} in {}.{} ({})",
                to.name,
                to.schema,
                to.table,
                aspects
                    .iter()
                    .map(|a| match a {
                        ColumnAspect::DataType => "type",
                        ColumnAspect::Nullability => "nullability",
                        ColumnAspect::Default => "default",
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            ChangeOp::AddPrimaryKey(d) => format!("Add primary key {} on {}.{}", d.name, d.schema, d.table),
            ChangeOp::DropPrimaryKey(d) => {
                format!("Drop primary key {} from {}.{}", d.name, d.schema, d.table)
            }
            ChangeOp::AddUniqueConstraint(d) => {
                format!("Add unique constraint {} on {}.{}", d.name, d.schema, d.table)
            }
            ChangeOp::DropUniqueConstraint(d) => {
                format!("Drop unique constraint {} from {}.{}", d.name, d.schema, d.table)
            }
            ChangeOp::CreateIndex(d) => format!(
                "Create {}index {} on {}.{}",
                if d.unique { "unique " } else { "" },
                d.name,
                d.schema,
                d.table
            ),
            ChangeOp::DropIndex(d) => format!("Drop index {} from {}.{}", d.name, d.schema, d.table),
            ChangeOp::AddForeignKey(d) => format!(
                "Add foreign key {} from {}.{} to {}.{}",
                d.name, d.schema, d.table, d.referenced_schema, d.referenced_table
            ),
            ChangeOp::DropForeignKey(d) => {
                format!("Drop foreign key {} from {}.{}", d.name, d.schema, d.table)
            }
            ChangeOp::CreateView { view, replace } => format!(
                "{} view {}.{}",
                if *replace { "Replace" } else { "Create" },
                view.schema,
                view.name
            ),
            ChangeOp::DropView(d) => format!("Drop view {}.{}", d.schema, d.name),
            ChangeOp::Sql { sql, .. } => {
                let first = sql.lines().next().unwrap_or_default();
                format!("Run SQL: {first}")
            }
            ChangeOp::Comment { text } => format!("Comment: {text}"),
        }
    }

    /// Check if this operation can lose data
    pub fn is_destructive(&self) -> bool {
        match self {
            ChangeOp::DropSchema(_)
            | ChangeOp::DropSequence(_)
            | ChangeOp::DropTable(_)
            | ChangeOp::DropColumn(_) => true,
            ChangeOp::AlterColumn { aspects, .. } => aspects.contains(&ColumnAspect::DataType),
            _ => false,
        }
    }

    /// The operation that undoes this one, when it can be derived
    pub fn inverse(&self) -> Option<ChangeOp> {
        Some(match self {
            ChangeOp::CreateSchema(d) => ChangeOp::DropSchema(d.clone()),
            ChangeOp::DropSchema(d) => ChangeOp::CreateSchema(d.clone()),
            ChangeOp::CreateSequence(d) => ChangeOp::DropSequence(d.clone()),
            ChangeOp::DropSequence(d) => ChangeOp::CreateSequence(d.clone()),
            ChangeOp::AlterSequence { from, to } => ChangeOp::AlterSequence {
                from: to.clone(),
                to: from.clone(),
            },
            ChangeOp::CreateTable(d) => ChangeOp::DropTable(d.clone()),
            ChangeOp::DropTable(d) => ChangeOp::CreateTable(d.clone()),
            ChangeOp::AddColumn(d) => ChangeOp::DropColumn(d.clone()),
            ChangeOp::DropColumn(d) => ChangeOp::AddColumn(d.clone()),
            ChangeOp::AlterColumn { from, to, aspects } => ChangeOp::AlterColumn {
                from: to.clone(),
                to: from.clone(),
                aspects: aspects.clone(),
            },
            ChangeOp::AddPrimaryKey(d) => ChangeOp::DropPrimaryKey(d.clone()),
            ChangeOp::DropPrimaryKey(d) => ChangeOp::AddPrimaryKey(d.clone()),
            ChangeOp::AddUniqueConstraint(d) => ChangeOp::DropUniqueConstraint(d.clone()),
            ChangeOp::DropUniqueConstraint(d) => ChangeOp::AddUniqueConstraint(d.clone()),
            ChangeOp::CreateIndex(d) => ChangeOp::DropIndex(d.clone()),
            ChangeOp::DropIndex(d) => ChangeOp::CreateIndex(d.clone()),
            ChangeOp::AddForeignKey(d) => ChangeOp::DropForeignKey(d.clone()),
            ChangeOp::DropForeignKey(d) => ChangeOp::AddForeignKey(d.clone()),
            ChangeOp::CreateView {
                view,
                replace: false,
            } => ChangeOp::DropView(view.clone()),
            ChangeOp::DropView(d) => ChangeOp::CreateView {
                view: d.clone(),
                replace: false,
            },
            // Replacing a view or setting remarks loses the previous value
            ChangeOp::CreateView { replace: true, .. }
            | ChangeOp::SetTableRemarks { .. }
            | ChangeOp::Sql { .. }
            | ChangeOp::Comment { .. } => return None,
        })
    }
}

/// One atomic structural change with its optional undo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub forward: ChangeOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse: Option<ChangeOp>,
}

impl Change {
    /// A change without a reverse action
    pub fn new(forward: ChangeOp) -> Self {
        Self { forward, reverse: None }
    }

    /// A change whose reverse is derived from the forward operation
    pub fn reversible(forward: ChangeOp) -> Self {
        let reverse = forward.inverse();
        Self { forward, reverse }
    }

    /// A change with an explicitly supplied reverse
    pub fn with_reverse(forward: ChangeOp, reverse: ChangeOp) -> Self {
        Self {
            forward,
            reverse: Some(reverse),
        }
    }

    pub fn action(&self) -> ChangeAction {
        self.forward.action()
    }

    pub fn target(&self) -> Option<ObjectId> {
        self.forward.target()
    }

    pub fn description(&self) -> String {
        self.forward.description()
    }

    pub fn is_destructive(&self) -> bool {
        self.forward.is_destructive()
    }

    pub fn is_reversible(&self) -> bool {
        self.reverse.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn column(data_type: &str) -> ColumnDef {
        ColumnDef {
            schema: "public".into(),
            table: "users".into(),
            name: "email".into(),
            data_type: data_type.into(),
            nullable: true,
            default_value: None,
            position: None,
        }
    }

    #[test]
    fn test_alter_column_inverse_swaps_sides() {
        let op = ChangeOp::AlterColumn {
            from: column("text"),
            to: column("varchar(255)"),
            aspects: vec![ColumnAspect::DataType],
        };
        let inverse = op.inverse().unwrap();
        assert_eq!(inverse.inverse().unwrap(), op);
        assert!(op.is_destructive());
        assert_eq!(op.action(), ChangeAction::Alter);
    }

    #[test]
    fn test_drop_table_is_reversible() {
        let table = TableDef {
            schema: "public".into(),
            name: "users".into(),
            remarks: None,
            columns: vec![column("text")],
            primary_key: None,
            foreign_keys: Vec::new(),
        };
        let change = Change::reversible(ChangeOp::DropTable(table.clone()));
        assert!(change.is_destructive());
        assert_eq!(change.reverse, Some(ChangeOp::CreateTable(table)));
        assert_eq!(change.forward.affected_ids().len(), 2);
    }

    #[test]
    fn test_raw_sql_has_no_inverse() {
        let change = Change::reversible(ChangeOp::Sql {
            sql: "UPDATE users SET active = true".into(),
            terminator: Terminator::Semicolon,
            affects: vec![],
        });
        assert!(!change.is_reversible());
        assert_eq!(change.target(), None);
        assert_eq!(change.description(), "Run SQL: UPDATE users SET active = true");
    }

    #[test]
    fn test_json_shape_is_tagged() {
        let op = ChangeOp::CreateIndex(IndexDef {
            schema: "public".into(),
            table: "users".into(),
            name: "idx_users_email".into(),
            columns: vec!["email".into()],
            unique: true,
        });
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "create_index");
        assert_eq!(json["name"], "idx_users_email");
        let back: ChangeOp = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }
}
