//! Attribute-table comparison

use super::{ATTRIBUTE_TABLE_DIFF, STANDARD_PRIORITY};
use crate::model::{AttributeDelta, Backend, ObjectKind, StructuralObject};
use crate::registry::{DiffGenerator, Generator};

/// Compares the attributes each kind declares, with the kind's comparison rules
pub struct AttributeTableDiffGenerator;

impl Generator for AttributeTableDiffGenerator {
    fn id(&self) -> &str {
        ATTRIBUTE_TABLE_DIFF
    }

    fn priority(&self) -> i32 {
        STANDARD_PRIORITY
    }

    fn applies_to(&self, _kind: ObjectKind, _backend: Backend) -> bool {
        true
    }
}

impl DiffGenerator for AttributeTableDiffGenerator {
    fn compare(&self, reference: &StructuralObject, observed: &StructuralObject) -> Vec<AttributeDelta> {
        reference.kind().compare(reference, observed)
    }
}
