//! Object kinds and their per-kind attribute tables
//!
//! Each kind declares which kinds must exist before it and which attributes
//! take part in structural comparison. The tables are static and built once;
//! diffing never inspects attributes that are not declared here.

use super::object::{AttrValue, AttributeDelta, StructuralObject};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attribute names shared by the typed definitions, generators and diffing
pub mod attr {
    pub const START: &str = "start";
    pub const INCREMENT: &str = "increment";
    pub const REMARKS: &str = "remarks";
    pub const DATA_TYPE: &str = "data_type";
    pub const NULLABLE: &str = "nullable";
    pub const DEFAULT_VALUE: &str = "default_value";
    pub const POSITION: &str = "position";
    pub const COLUMNS: &str = "columns";
    pub const UNIQUE: &str = "unique";
    pub const REFERENCED_SCHEMA: &str = "referenced_schema";
    pub const REFERENCED_TABLE: &str = "referenced_table";
    pub const REFERENCED_COLUMNS: &str = "referenced_columns";
    pub const ON_DELETE: &str = "on_delete";
    pub const ON_UPDATE: &str = "on_update";
    pub const DEFINITION: &str = "definition";
}

/// Categories of structural objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Schema,
    Sequence,
    Table,
    Column,
    PrimaryKey,
    UniqueConstraint,
    Index,
    ForeignKey,
    View,
}

/// How a single attribute is compared between reference and observed objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Exact,
    CaseInsensitive,
    /// Runs of whitespace are collapsed and the ends trimmed before comparing
    Whitespace,
    /// Carried for materialization but never reported as a difference
    Ignored,
}

#[derive(Debug, Clone)]
pub struct AttributeSpec {
    pub name: &'static str,
    pub comparison: Comparison,
    /// Value an absent attribute is read as when comparing
    pub default: AttrValue,
}

const fn spec(name: &'static str, comparison: Comparison) -> AttributeSpec {
    AttributeSpec {
        name,
        comparison,
        default: AttrValue::Null,
    }
}

const fn flag(name: &'static str, default: bool) -> AttributeSpec {
    AttributeSpec {
        name,
        comparison: Comparison::Exact,
        default: AttrValue::Bool(default),
    }
}

/// Static description of one kind
#[derive(Debug)]
pub struct KindDescriptor {
    pub kind: ObjectKind,
    pub depends_on: &'static [ObjectKind],
    pub attributes: &'static [AttributeSpec],
}

static SCHEMA: KindDescriptor = KindDescriptor {
    kind: ObjectKind::Schema,
    depends_on: &[],
    attributes: &[],
};

static SEQUENCE: KindDescriptor = KindDescriptor {
    kind: ObjectKind::Sequence,
    depends_on: &[ObjectKind::Schema],
    attributes: &[
        spec(attr::START, Comparison::Exact),
        spec(attr::INCREMENT, Comparison::Exact),
    ],
};

static TABLE: KindDescriptor = KindDescriptor {
    kind: ObjectKind::Table,
    depends_on: &[ObjectKind::Schema],
    attributes: &[spec(attr::REMARKS, Comparison::Exact)],
};

static COLUMN: KindDescriptor = KindDescriptor {
    kind: ObjectKind::Column,
    depends_on: &[ObjectKind::Table, ObjectKind::Sequence],
    attributes: &[
        spec(attr::DATA_TYPE, Comparison::CaseInsensitive),
        flag(attr::NULLABLE, true),
        spec(attr::DEFAULT_VALUE, Comparison::Exact),
        spec(attr::POSITION, Comparison::Ignored),
    ],
};

static PRIMARY_KEY: KindDescriptor = KindDescriptor {
    kind: ObjectKind::PrimaryKey,
    depends_on: &[ObjectKind::Table, ObjectKind::Column],
    attributes: &[spec(attr::COLUMNS, Comparison::Exact)],
};

static UNIQUE_CONSTRAINT: KindDescriptor = KindDescriptor {
    kind: ObjectKind::UniqueConstraint,
    depends_on: &[ObjectKind::Table, ObjectKind::Column],
    attributes: &[spec(attr::COLUMNS, Comparison::Exact)],
};

static INDEX: KindDescriptor = KindDescriptor {
    kind: ObjectKind::Index,
    depends_on: &[ObjectKind::Table, ObjectKind::Column],
    attributes: &[
        spec(attr::COLUMNS, Comparison::Exact),
        flag(attr::UNIQUE, false),
    ],
};

static FOREIGN_KEY: KindDescriptor = KindDescriptor {
    kind: ObjectKind::ForeignKey,
    depends_on: &[
        ObjectKind::Table,
        ObjectKind::Column,
        ObjectKind::PrimaryKey,
        ObjectKind::UniqueConstraint,
        ObjectKind::Index,
    ],
    attributes: &[
        spec(attr::COLUMNS, Comparison::Exact),
        spec(attr::REFERENCED_SCHEMA, Comparison::Exact),
        spec(attr::REFERENCED_TABLE, Comparison::Exact),
        spec(attr::REFERENCED_COLUMNS, Comparison::Exact),
        spec(attr::ON_DELETE, Comparison::CaseInsensitive),
        spec(attr::ON_UPDATE, Comparison::CaseInsensitive),
    ],
};

static VIEW: KindDescriptor = KindDescriptor {
    kind: ObjectKind::View,
    depends_on: &[ObjectKind::Table, ObjectKind::Column],
    attributes: &[spec(attr::DEFINITION, Comparison::Whitespace)],
};

impl ObjectKind {
    pub const ALL: [ObjectKind; 9] = [
        ObjectKind::Schema,
        ObjectKind::Sequence,
        ObjectKind::Table,
        ObjectKind::Column,
        ObjectKind::PrimaryKey,
        ObjectKind::UniqueConstraint,
        ObjectKind::Index,
        ObjectKind::ForeignKey,
        ObjectKind::View,
    ];

    /// Stable snake_case name, also the ordering tiebreak
    pub fn name(&self) -> &'static str {
        match self {
            ObjectKind::Schema => "schema",
            ObjectKind::Sequence => "sequence",
            ObjectKind::Table => "table",
            ObjectKind::Column => "column",
            ObjectKind::PrimaryKey => "primary_key",
            ObjectKind::UniqueConstraint => "unique_constraint",
            ObjectKind::Index => "index",
            ObjectKind::ForeignKey => "foreign_key",
            ObjectKind::View => "view",
        }
    }

    pub fn descriptor(&self) -> &'static KindDescriptor {
        match self {
            ObjectKind::Schema => &SCHEMA,
            ObjectKind::Sequence => &SEQUENCE,
            ObjectKind::Table => &TABLE,
            ObjectKind::Column => &COLUMN,
            ObjectKind::PrimaryKey => &PRIMARY_KEY,
            ObjectKind::UniqueConstraint => &UNIQUE_CONSTRAINT,
            ObjectKind::Index => &INDEX,
            ObjectKind::ForeignKey => &FOREIGN_KEY,
            ObjectKind::View => &VIEW,
        }
    }

    /// Kinds that must exist before an object of this kind can be created
    pub fn depends_on(&self) -> &'static [ObjectKind] {
        self.descriptor().depends_on
    }

    /// Objects of this kind live inside a relation (table)
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            ObjectKind::Column
                | ObjectKind::PrimaryKey
                | ObjectKind::UniqueConstraint
                | ObjectKind::Index
                | ObjectKind::ForeignKey
        )
    }

    /// Compare the declared attributes of two objects of this kind.
    ///
    /// Returns one delta per declared, non-ignored attribute whose values
    /// differ. An empty result means the objects are structurally equal.
    pub fn compare(&self, reference: &StructuralObject, observed: &StructuralObject) -> Vec<AttributeDelta> {
        self.descriptor()
            .attributes
            .iter()
            .filter(|spec| spec.comparison != Comparison::Ignored)
            .filter_map(|spec| {
                let r = spec.effective(reference.get(spec.name));
                let o = spec.effective(observed.get(spec.name));
                if values_match(spec.comparison, r, o) {
                    None
                } else {
                    Some(AttributeDelta {
                        attribute: spec.name.to_string(),
                        reference: r.clone(),
                        observed: o.clone(),
                    })
                }
            })
            .collect()
    }
}

impl AttributeSpec {
    fn effective<'a>(&'a self, value: &'a AttrValue) -> &'a AttrValue {
        if value.is_null() {
            &self.default
        } else {
            value
        }
    }
}

fn values_match(comparison: Comparison, a: &AttrValue, b: &AttrValue) -> bool {
    match (comparison, a, b) {
        (Comparison::Ignored, _, _) => true,
        (Comparison::CaseInsensitive, AttrValue::Text(x), AttrValue::Text(y)) => {
            x.eq_ignore_ascii_case(y)
        }
        (Comparison::Whitespace, AttrValue::Text(x), AttrValue::Text(y)) => {
            collapse_whitespace(x) == collapse_whitespace(y)
        }
        _ => a == b,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown object kind '{s}'"))
    }
}
