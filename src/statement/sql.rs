//! SQL generation per backend
//!
//! One helper per operation, each producing the statements for that step.
//! Statements carry no terminator in their text; `Statement::render` adds it.

use super::Statement;
use crate::changelog::{Change, ChangeOp, ColumnAspect};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    Backend, ColumnDef, Definition, ForeignKeyDef, IndexDef, ObjectId, PrimaryKeyDef, SequenceDef,
    TableDef, UniqueConstraintDef, ViewDef,
};

/// Statements for a change's forward operation
pub fn materialize(change: &Change, backend: Backend) -> EngineResult<Vec<Statement>> {
    materialize_op(&change.forward, backend)
}

/// Statements for a change's reverse operation, if it has one
pub fn materialize_reverse(change: &Change, backend: Backend) -> EngineResult<Option<Vec<Statement>>> {
    change
        .reverse
        .as_ref()
        .map(|op| materialize_op(op, backend))
        .transpose()
}

pub fn materialize_op(op: &ChangeOp, backend: Backend) -> EngineResult<Vec<Statement>> {
    SqlGenerator::new(backend).statements(op)
}

/// Statements for a sequence of operations, in order
pub fn materialize_ops<'a>(
    ops: impl IntoIterator<Item = &'a ChangeOp>,
    backend: Backend,
) -> EngineResult<Vec<Statement>> {
    let generator = SqlGenerator::new(backend);
    let mut statements = Vec::new();
    for op in ops {
        statements.extend(generator.statements(op)?);
    }
    Ok(statements)
}

/// Renders change operations as statements for one backend
#[derive(Debug, Clone, Copy)]
pub struct SqlGenerator {
    backend: Backend,
}

impl SqlGenerator {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn statements(&self, op: &ChangeOp) -> EngineResult<Vec<Statement>> {
        let affects = op.affected_ids();
        let one = |sql: String| -> EngineResult<Vec<Statement>> {
            Ok(vec![Statement::new(sql, affects.clone())])
        };

        match op {
            ChangeOp::CreateSchema(d) => match self.backend {
                Backend::Sqlite => Ok(vec![Statement::comment(
                    &format!("sqlite has no schemas; {} is implicit", d.name),
                    affects.clone(),
                )]),
                _ => one(format!("CREATE SCHEMA {}", self.quote(&d.name))),
            },
            ChangeOp::DropSchema(d) => match self.backend {
                Backend::Sqlite => Ok(vec![Statement::comment(
                    &format!("sqlite has no schemas; {} is implicit", d.name),
                    affects.clone(),
                )]),
                _ => one(format!("DROP SCHEMA {}", self.quote(&d.name))),
            },
            ChangeOp::CreateSequence(d) => {
                self.require_sequences(d)?;
                one(self.create_sequence_sql(d))
            }
            ChangeOp::DropSequence(d) => {
                self.require_sequences(d)?;
                one(format!("DROP SEQUENCE {}", self.qualified(&d.schema, &d.name)))
            }
            ChangeOp::AlterSequence { from, to } => {
                self.require_sequences(to)?;
                Ok(self
                    .alter_sequence_sql(from, to)
                    .into_iter()
                    .map(|sql| Statement::new(sql, affects.clone()))
                    .collect())
            }
            ChangeOp::CreateTable(d) => Ok(self.create_table_statements(d, affects.clone())),
            ChangeOp::DropTable(d) => one(format!("DROP TABLE {}", self.qualified(&d.schema, &d.name))),
            ChangeOp::SetTableRemarks { schema, table, remarks } => {
                Ok(vec![self.remarks_statement(schema, table, remarks.as_deref(), affects.clone())])
            }
            ChangeOp::AddColumn(d) => one(format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.qualified(&d.schema, &d.table),
                self.column_definition(d)
            )),
            ChangeOp::DropColumn(d) => one(format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.qualified(&d.schema, &d.table),
                self.quote(&d.name)
            )),
            ChangeOp::AlterColumn { from, to, aspects } => {
                let sql = self.alter_column_sql(from, to, aspects)?;
                Ok(sql.into_iter().map(|s| Statement::new(s, affects.clone())).collect())
            }
            ChangeOp::AddPrimaryKey(d) => one(self.add_primary_key_sql(d)?),
            ChangeOp::DropPrimaryKey(d) => one(self.drop_primary_key_sql(d)?),
            ChangeOp::AddUniqueConstraint(d) => one(self.add_unique_sql(d)),
            ChangeOp::DropUniqueConstraint(d) => one(self.drop_unique_sql(d)),
            ChangeOp::CreateIndex(d) => one(self.create_index_sql(d)),
            ChangeOp::DropIndex(d) => one(self.drop_index_sql(d)),
            ChangeOp::AddForeignKey(d) => one(self.add_foreign_key_sql(d)?),
            ChangeOp::DropForeignKey(d) => one(self.drop_foreign_key_sql(d)?),
            ChangeOp::CreateView { view, replace } => Ok(self
                .create_view_sql(view, *replace)
                .into_iter()
                .map(|sql| Statement::new(sql, affects.clone()))
                .collect()),
            ChangeOp::DropView(d) => one(format!("DROP VIEW {}", self.qualified(&d.schema, &d.name))),
            ChangeOp::Sql { sql, terminator, affects } => Ok(vec![
                Statement::new(sql.clone(), affects.clone()).with_terminator(terminator.clone()),
            ]),
            ChangeOp::Comment { text } => Ok(vec![Statement::comment(text, Vec::new())]),
        }
    }

    fn quote(&self, ident: &str) -> String {
        self.backend.quote(ident)
    }

    /// Schema-qualified relation name; SQLite relations are unqualified
    fn qualified(&self, schema: &str, name: &str) -> String {
        if self.backend.supports_schemas() {
            format!("{}.{}", self.quote(schema), self.quote(name))
        } else {
            self.quote(name)
        }
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns.iter().map(|c| self.quote(c)).collect::<Vec<_>>().join(", ")
    }

    fn unsupported(&self, object: ObjectId, what: &str) -> EngineError {
        EngineError::GenerationFailed {
            object,
            reason: format!("{} cannot {what}", self.backend),
        }
    }

    fn require_sequences(&self, d: &SequenceDef) -> EngineResult<()> {
        match self.backend {
            Backend::Sqlite => Err(self.unsupported(d.id(), "manage sequences")),
            _ => Ok(()),
        }
    }

    fn create_sequence_sql(&self, d: &SequenceDef) -> String {
        let mut sql = format!("CREATE SEQUENCE {}", self.qualified(&d.schema, &d.name));
        if let Some(start) = d.start {
            sql.push_str(&format!(" START WITH {start}"));
        }
        if let Some(increment) = d.increment {
            sql.push_str(&format!(" INCREMENT BY {increment}"));
        }
        sql
    }

    fn alter_sequence_sql(&self, from: &SequenceDef, to: &SequenceDef) -> Vec<String> {
        let mut clauses = Vec::new();
        if from.start != to.start {
            if let Some(start) = to.start {
                clauses.push(format!("RESTART WITH {start}"));
            }
        }
        if from.increment != to.increment {
            clauses.push(format!("INCREMENT BY {}", to.increment.unwrap_or(1)));
        }
        if clauses.is_empty() {
            return Vec::new();
        }
        vec![format!(
            "ALTER SEQUENCE {} {}",
            self.qualified(&to.schema, &to.name),
            clauses.join(" ")
        )]
    }

    fn column_definition(&self, column: &ColumnDef) -> String {
        let mut def = format!("{} {}", self.quote(&column.name), column.data_type);
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default_value {
            def.push_str(&format!(" DEFAULT {default}"));
        }
        def
    }

    fn create_table_statements(&self, table: &TableDef, affects: Vec<ObjectId>) -> Vec<Statement> {
        let mut columns = table.columns.clone();
        columns.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name)));

        let mut lines: Vec<String> = columns.iter().map(|c| self.column_definition(c)).collect();
        if let Some(pk) = &table.primary_key {
            lines.push(match self.backend {
                Backend::Mysql => format!("PRIMARY KEY ({})", self.column_list(&pk.columns)),
                _ => format!(
                    "CONSTRAINT {} PRIMARY KEY ({})",
                    self.quote(&pk.name),
                    self.column_list(&pk.columns)
                ),
            });
        }

        lines.extend(table.foreign_keys.iter().map(|fk| self.foreign_key_clause(fk)));

        let mut sql = format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.qualified(&table.schema, &table.name),
            lines.join(",\n  ")
        );
        let remarks = table.remarks.as_deref();
        if let (Backend::Mysql, Some(remarks)) = (self.backend, remarks) {
            sql.push_str(&format!(" COMMENT = {}", literal(remarks)));
        }

        let mut statements = vec![Statement::new(sql, affects.clone())];
        if let Some(remarks) = remarks {
            if self.backend != Backend::Mysql {
                statements.push(self.remarks_statement(&table.schema, &table.name, Some(remarks), affects));
            }
        }
        statements
    }

    fn remarks_statement(
        &self,
        schema: &str,
        table: &str,
        remarks: Option<&str>,
        affects: Vec<ObjectId>,
    ) -> Statement {
        let target = self.qualified(schema, table);
        match self.backend {
            Backend::Mysql => Statement::new(
                format!("ALTER TABLE {target} COMMENT = {}", literal(remarks.unwrap_or(""))),
                affects,
            ),
            Backend::Sqlite => Statement::comment(
                &format!("{schema}.{table}: {}", remarks.unwrap_or("(no remarks)")),
                affects,
            ),
            Backend::Postgres | Backend::Generic => Statement::new(
                format!(
                    "COMMENT ON TABLE {target} IS {}",
                    remarks.map(literal).unwrap_or_else(|| "NULL".to_string())
                ),
                affects,
            ),
        }
    }

    fn alter_column_sql(
        &self,
        from: &ColumnDef,
        to: &ColumnDef,
        aspects: &[ColumnAspect],
    ) -> EngineResult<Vec<String>> {
        let table = self.qualified(&to.schema, &to.table);
        let column = self.quote(&to.name);

        match self.backend {
            Backend::Sqlite => Err(self.unsupported(to.id(), "alter a column in place")),
            // MySQL restates the whole column
            Backend::Mysql => Ok(vec![format!(
                "ALTER TABLE {table} MODIFY COLUMN {}",
                self.column_definition(to)
            )]),
            Backend::Postgres | Backend::Generic => {
                let mut statements = Vec::new();
                for aspect in aspects {
                    match aspect {
                        ColumnAspect::DataType => statements.push(match self.backend {
                            Backend::Postgres => format!(
                                "ALTER TABLE {table} ALTER COLUMN {column} TYPE {} USING {column}::{}",
                                to.data_type, to.data_type
                            ),
                            _ => format!("ALTER TABLE {table} ALTER COLUMN {column} TYPE {}", to.data_type),
                        }),
                        ColumnAspect::Nullability if from.nullable != to.nullable => {
                            let action = if to.nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
                            statements.push(format!("ALTER TABLE {table} ALTER COLUMN {column} {action}"));
                        }
                        ColumnAspect::Nullability => {}
                        ColumnAspect::Default => statements.push(match &to.default_value {
                            Some(default) => {
                                format!("ALTER TABLE {table} ALTER COLUMN {column} SET DEFAULT {default}")
                            }
                            None => format!("ALTER TABLE {table} ALTER COLUMN {column} DROP DEFAULT"),
                        }),
                    }
                }
                Ok(statements)
            }
        }
    }

    fn add_primary_key_sql(&self, d: &PrimaryKeyDef) -> EngineResult<String> {
        let table = self.qualified(&d.schema, &d.table);
        match self.backend {
            Backend::Sqlite => Err(self.unsupported(d.id(), "add a primary key to an existing table")),
            Backend::Mysql => Ok(format!(
                "ALTER TABLE {table} ADD PRIMARY KEY ({})",
                self.column_list(&d.columns)
            )),
            _ => Ok(format!(
                "ALTER TABLE {table} ADD CONSTRAINT {} PRIMARY KEY ({})",
                self.quote(&d.name),
                self.column_list(&d.columns)
            )),
        }
    }

    fn drop_primary_key_sql(&self, d: &PrimaryKeyDef) -> EngineResult<String> {
        let table = self.qualified(&d.schema, &d.table);
        match self.backend {
            Backend::Sqlite => Err(self.unsupported(d.id(), "drop a primary key from an existing table")),
            Backend::Mysql => Ok(format!("ALTER TABLE {table} DROP PRIMARY KEY")),
            _ => Ok(format!("ALTER TABLE {table} DROP CONSTRAINT {}", self.quote(&d.name))),
        }
    }

    fn add_unique_sql(&self, d: &UniqueConstraintDef) -> String {
        match self.backend {
            // Unique constraints are unique indexes on SQLite
            Backend::Sqlite => format!(
                "CREATE UNIQUE INDEX {} ON {} ({})",
                self.quote(&d.name),
                self.qualified(&d.schema, &d.table),
                self.column_list(&d.columns)
            ),
            _ => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
                self.qualified(&d.schema, &d.table),
                self.quote(&d.name),
                self.column_list(&d.columns)
            ),
        }
    }

    fn drop_unique_sql(&self, d: &UniqueConstraintDef) -> String {
        let table = self.qualified(&d.schema, &d.table);
        match self.backend {
            Backend::Sqlite => format!("DROP INDEX {}", self.quote(&d.name)),
            Backend::Mysql => format!("ALTER TABLE {table} DROP INDEX {}", self.quote(&d.name)),
            _ => format!("ALTER TABLE {table} DROP CONSTRAINT {}", self.quote(&d.name)),
        }
    }

    fn create_index_sql(&self, d: &IndexDef) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if d.unique { "UNIQUE " } else { "" },
            self.quote(&d.name),
            self.qualified(&d.schema, &d.table),
            self.column_list(&d.columns)
        )
    }

    fn drop_index_sql(&self, d: &IndexDef) -> String {
        match self.backend {
            Backend::Mysql => format!(
                "DROP INDEX {} ON {}",
                self.quote(&d.name),
                self.qualified(&d.schema, &d.table)
            ),
            // Indexes live in the table's schema
            _ => format!("DROP INDEX {}", self.qualified(&d.schema, &d.name)),
        }
    }

    fn add_foreign_key_sql(&self, d: &ForeignKeyDef) -> EngineResult<String> {
        if self.backend == Backend::Sqlite {
            return Err(self.unsupported(d.id(), "add a foreign key to an existing table"));
        }
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.qualified(&d.schema, &d.table),
            self.foreign_key_clause(d)
        ))
    }

    /// `CONSTRAINT ... FOREIGN KEY ... REFERENCES ...`, shared by inline and
    /// added keys
    fn foreign_key_clause(&self, d: &ForeignKeyDef) -> String {
        let mut clause = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote(&d.name),
            self.column_list(&d.columns),
            self.qualified(&d.referenced_schema, &d.referenced_table),
            self.column_list(&d.referenced_columns)
        );
        if let Some(action) = &d.on_delete {
            clause.push_str(&format!(" ON DELETE {}", action.to_uppercase()));
        }
        if let Some(action) = &d.on_update {
            clause.push_str(&format!(" ON UPDATE {}", action.to_uppercase()));
        }
        clause
    }

    fn drop_foreign_key_sql(&self, d: &ForeignKeyDef) -> EngineResult<String> {
        let table = self.qualified(&d.schema, &d.table);
        match self.backend {
            Backend::Sqlite => Err(self.unsupported(d.id(), "drop a foreign key from an existing table")),
            Backend::Mysql => Ok(format!("ALTER TABLE {table} DROP FOREIGN KEY {}", self.quote(&d.name))),
            _ => Ok(format!("ALTER TABLE {table} DROP CONSTRAINT {}", self.quote(&d.name))),
        }
    }

    fn create_view_sql(&self, view: &ViewDef, replace: bool) -> Vec<String> {
        let name = self.qualified(&view.schema, &view.name);
        let definition = view.definition.trim().trim_end_matches(';');
        match (self.backend, replace) {
            (_, false) => vec![format!("CREATE VIEW {name} AS {definition}")],
            (Backend::Sqlite, true) => vec![
                format!("DROP VIEW IF EXISTS {name}"),
                format!("CREATE VIEW {name} AS {definition}"),
            ],
            (_, true) => vec![format!("CREATE OR REPLACE VIEW {name} AS {definition}")],
        }
    }
}

/// A single-quoted string literal
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
