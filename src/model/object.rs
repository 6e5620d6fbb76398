//! Structural objects and their identities

use super::kind::ObjectKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a structural object.
///
/// Ordering is `(kind, schema, relation, name)`, which is the stable order
/// used everywhere objects of one kind are processed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectId {
    pub kind: ObjectKind,
    pub schema: String,
    /// Owning relation for contained kinds (columns, indexes, constraints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    pub name: String,
}

impl ObjectId {
    pub fn schema(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: ObjectKind::Schema,
            schema: name.clone(),
            relation: None,
            name,
        }
    }

    /// A schema-level object (table, view, sequence)
    pub fn top_level(kind: ObjectKind, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            schema: schema.into(),
            relation: None,
            name: name.into(),
        }
    }

    /// An object that lives inside a relation
    pub fn contained(
        kind: ObjectKind,
        schema: impl Into<String>,
        relation: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            schema: schema.into(),
            relation: Some(relation.into()),
            name: name.into(),
        }
    }

    /// Full path to the object, e.g. "public.users.email"
    pub fn qualified_name(&self) -> String {
        match (&self.kind, &self.relation) {
            (ObjectKind::Schema, _) => self.name.clone(),
            (_, Some(rel)) => format!("{}.{}.{}", self.schema, rel, self.name),
            (_, None) => format!("{}.{}", self.schema, self.name),
        }
    }

    /// Identity of the table that owns this object, if any
    pub fn relation_id(&self) -> Option<ObjectId> {
        self.relation
            .as_ref()
            .map(|rel| ObjectId::top_level(ObjectKind::Table, self.schema.clone(), rel.clone()))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.qualified_name())
    }
}

/// Value of a single attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum AttrValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
}

static NULL: AttrValue = AttrValue::Null;

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => f.write_str("NULL"),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Text(s) => write!(f, "{s:?}"),
            AttrValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(v: Vec<String>) -> Self {
        AttrValue::List(v)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(AttrValue::Null)
    }
}

/// An identified object with its attribute map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralObject {
    pub id: ObjectId,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl StructuralObject {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            attributes: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.id.kind
    }

    /// Builder-style setter. Null values are not stored.
    pub fn with(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<AttrValue>) {
        let value = value.into();
        if value.is_null() {
            self.attributes.remove(name);
        } else {
            self.attributes.insert(name.to_string(), value);
        }
    }

    /// Attribute value; absent attributes read as `Null`
    pub fn get(&self, name: &str) -> &AttrValue {
        self.attributes.get(name).unwrap_or(&NULL)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            AttrValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.get(name) {
            AttrValue::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Equal under the kind's attribute table
    pub fn structurally_equals(&self, other: &StructuralObject) -> bool {
        self.id == other.id && self.kind().compare(self, other).is_empty()
    }
}

/// A single attribute difference between the reference and observed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDelta {
    pub attribute: String,
    /// Desired value
    pub reference: AttrValue,
    /// Current value
    pub observed: AttrValue,
}

impl fmt::Display for AttributeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} → {}", self.attribute, self.observed, self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_names() {
        assert_eq!(ObjectId::schema("public").qualified_name(), "public");
        assert_eq!(
            ObjectId::top_level(ObjectKind::Table, "public", "users").qualified_name(),
            "public.users"
        );
        let col = ObjectId::contained(ObjectKind::Column, "public", "users", "email");
        assert_eq!(col.qualified_name(), "public.users.email");
        assert_eq!(col.to_string(), "column public.users.email");
        assert_eq!(
            col.relation_id(),
            Some(ObjectId::top_level(ObjectKind::Table, "public", "users"))
        );
    }

    #[test]
    fn test_null_is_not_stored() {
        let obj = StructuralObject::new(ObjectId::schema("s"))
            .with("a", "x")
            .with("a", AttrValue::Null);
        assert!(obj.attributes.is_empty());
        assert!(obj.get("a").is_null());
    }

    #[test]
    fn test_attr_value_json_shape() {
        let obj = StructuralObject::new(ObjectId::top_level(ObjectKind::Sequence, "public", "seq"))
            .with("start", 1i64)
            .with("flag", true)
            .with("cols", vec!["a".to_string()]);
        let json = serde_json::to_string(&obj).unwrap();
        let back: StructuralObject = serde_json::from_str(&json).unwrap();
        assert_eq!(back, obj);
    }
}
