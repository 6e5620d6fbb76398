//! Dependency ordering across object kinds
//!
//! Kinds are sorted topologically (Kahn's algorithm) so that no kind is
//! created before a kind it depends on. When several kinds are ready at the
//! same time the one with the lexicographically smallest name goes first,
//! which makes the order identical on every call and every run.

use crate::error::{EngineError, EngineResult};
use crate::model::ObjectKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The three change-generation modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Objects only in the observed state are dropped
    Unexpected,
    /// Objects only in the reference are created
    Missing,
    /// Objects in both with differences are altered
    Changed,
}

/// Declared "must exist before" relation between kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindGraph {
    depends_on: BTreeMap<ObjectKind, BTreeSet<ObjectKind>>,
}

impl KindGraph {
    /// The graph declared by the built-in kind descriptors
    pub fn standard() -> Self {
        Self::from_declarations(
            ObjectKind::ALL
                .into_iter()
                .map(|kind| (kind, kind.depends_on().to_vec())),
        )
    }

    /// Build a graph from explicit declarations. Kinds that only appear as a
    /// dependency are added with no dependencies of their own.
    pub fn from_declarations<I>(declarations: I) -> Self
    where
        I: IntoIterator<Item = (ObjectKind, Vec<ObjectKind>)>,
    {
        let mut depends_on: BTreeMap<ObjectKind, BTreeSet<ObjectKind>> = BTreeMap::new();
        for (kind, deps) in declarations {
            for dep in &deps {
                depends_on.entry(*dep).or_default();
            }
            depends_on.entry(kind).or_default().extend(deps);
        }
        Self { depends_on }
    }

    pub fn kinds(&self) -> impl Iterator<Item = ObjectKind> + '_ {
        self.depends_on.keys().copied()
    }

    pub fn dependencies(&self, kind: ObjectKind) -> impl Iterator<Item = ObjectKind> + '_ {
        self.depends_on.get(&kind).into_iter().flatten().copied()
    }

    /// Kinds in creation order: every kind after all of its dependencies
    pub fn create_order(&self) -> EngineResult<Vec<ObjectKind>> {
        let mut remaining: BTreeMap<ObjectKind, usize> = self
            .depends_on
            .iter()
            .map(|(kind, deps)| (*kind, deps.iter().filter(|d| **d != *kind).count()))
            .collect();

        let mut dependents: BTreeMap<ObjectKind, Vec<ObjectKind>> = BTreeMap::new();
        for (kind, deps) in &self.depends_on {
            for dep in deps.iter().filter(|d| **d != *kind) {
                dependents.entry(*dep).or_default().push(*kind);
            }
        }

        // Ready kinds, ordered by name
        let mut ready: BTreeSet<(&'static str, ObjectKind)> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(kind, _)| (kind.name(), *kind))
            .collect();

        let mut order = Vec::with_capacity(remaining.len());
        while let Some(next) = ready.pop_first() {
            let (_, kind) = next;
            order.push(kind);
            remaining.remove(&kind);
            for dependent in dependents.get(&kind).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert((dependent.name(), *dependent));
                    }
                }
            }
        }

        // A self-dependency is ignored; anything left over is on a cycle
        if !remaining.is_empty() {
            return Err(EngineError::CyclicKindDependency(
                remaining.keys().map(|k| k.name().to_string()).collect(),
            ));
        }
        Ok(order)
    }

    /// Kinds in drop order, the reverse of creation order
    pub fn drop_order(&self) -> EngineResult<Vec<ObjectKind>> {
        let mut order = self.create_order()?;
        order.reverse();
        Ok(order)
    }

    pub fn order_for(&self, mode: GenerationMode) -> EngineResult<Vec<ObjectKind>> {
        match mode {
            GenerationMode::Unexpected => self.drop_order(),
            GenerationMode::Missing | GenerationMode::Changed => self.create_order(),
        }
    }
}

impl Default for KindGraph {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_standard_create_order() {
        let order = KindGraph::standard().create_order().unwrap();
        assert_eq!(
            order,
            vec![
                ObjectKind::Schema,
                ObjectKind::Sequence,
                ObjectKind::Table,
                ObjectKind::Column,
                ObjectKind::Index,
                ObjectKind::PrimaryKey,
                ObjectKind::UniqueConstraint,
                ObjectKind::ForeignKey,
                ObjectKind::View,
            ]
        );
    }

    #[test]
    fn test_drop_order_is_reverse() {
        let graph = KindGraph::standard();
        let mut create = graph.create_order().unwrap();
        create.reverse();
        assert_eq!(graph.order_for(GenerationMode::Unexpected).unwrap(), create);
    }

    #[test]
    fn test_every_kind_after_its_dependencies() {
        let graph = KindGraph::standard();
        let order = graph.create_order().unwrap();
        for (i, kind) in order.iter().enumerate() {
            for dep in graph.dependencies(*kind) {
                let at = order.iter().position(|k| *k == dep).unwrap();
                assert!(at < i, "{dep} must precede {kind}");
            }
        }
    }

    #[test]
    fn test_cycle_is_configuration_error() {
        let graph = KindGraph::from_declarations([
            (ObjectKind::Table, vec![ObjectKind::View]),
            (ObjectKind::View, vec![ObjectKind::Table]),
            (ObjectKind::Schema, vec![]),
        ]);
        match graph.create_order() {
            Err(EngineError::CyclicKindDependency(kinds)) => {
                assert_eq!(kinds, vec!["table".to_string(), "view".to_string()]);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_independent_kinds_ordered_by_name() {
        let graph = KindGraph::from_declarations([
            (ObjectKind::View, vec![]),
            (ObjectKind::Index, vec![]),
            (ObjectKind::Column, vec![]),
        ]);
        assert_eq!(
            graph.create_order().unwrap(),
            vec![ObjectKind::Column, ObjectKind::Index, ObjectKind::View]
        );
    }
}
