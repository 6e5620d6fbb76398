//! Engine state
//!
//! Bundles the generator registry, the kind dependency graph and the
//! configured defaults so callers do not thread them through every call.

use crate::changelog::{ChangeLog, ChangeLogGenerator, ChangeSet, GenerationOptions, KindGraph};
use crate::config::Settings;
use crate::error::EngineResult;
use crate::execution::{ChangeLogTraversal, SnapshotApplyVisitor, TamperPolicy};
use crate::generators::standard_registry;
use crate::model::Backend;
use crate::registry::GeneratorRegistry;
use crate::snapshot::{capture, DiffResult, KindFilter, MetadataSource, Snapshot, SnapshotComparator};

/// Registry, ordering and defaults shared by every engine operation
pub struct Engine {
    registry: GeneratorRegistry,
    graph: KindGraph,
    backend: Backend,
    options: GenerationOptions,
    tamper_policy: TamperPolicy,
}

impl Engine {
    /// Engine over the given registry with default options
    pub fn new(registry: GeneratorRegistry) -> Self {
        Self {
            registry,
            graph: KindGraph::standard(),
            backend: Backend::Postgres,
            options: GenerationOptions::default(),
            tamper_policy: TamperPolicy::default(),
        }
    }

    /// Engine with the built-in generators
    pub fn standard() -> Self {
        Self::new(standard_registry())
    }

    /// Engine with the built-in generators configured from settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            backend: settings.engine.backend,
            options: GenerationOptions {
                author: settings.engine.author.clone(),
                id_prefix: settings.engine.id_prefix.clone(),
                grouping: settings.engine.grouping,
            },
            tamper_policy: settings.engine.tamper_policy,
            ..Self::standard()
        }
    }

    pub fn with_graph(mut self, graph: KindGraph) -> Self {
        self.graph = graph;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &GeneratorRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut GeneratorRegistry {
        &mut self.registry
    }

    /// Backend statements are materialized for
    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn capture(
        &self,
        source: &dyn MetadataSource,
        backend: Backend,
        filter: &KindFilter,
    ) -> EngineResult<Snapshot> {
        capture(&self.registry, source, backend, filter)
    }

    /// Re-capture a stored snapshot so it compares like a freshly read one
    pub fn normalize(&self, snapshot: &Snapshot) -> EngineResult<Snapshot> {
        self.capture(snapshot, snapshot.backend(), &KindFilter::all())
    }

    pub fn diff(&self, reference: &Snapshot, observed: &Snapshot) -> EngineResult<DiffResult> {
        SnapshotComparator::new(&self.registry).diff(reference, observed)
    }

    pub fn generate_changesets(&self, reference: &Snapshot, observed: &Snapshot) -> EngineResult<Vec<ChangeSet>> {
        let diff = self.diff(reference, observed)?;
        ChangeLogGenerator::with_graph(&self.registry, self.graph.clone()).generate_changesets(&diff, &self.options)
    }

    /// Changelog that turns `observed` into `reference`
    pub fn generate_changelog(&self, reference: &Snapshot, observed: &Snapshot) -> EngineResult<ChangeLog> {
        Ok(ChangeLog::from_changesets(self.generate_changesets(reference, observed)?))
    }

    /// Traversal over `changelog` with the configured tamper policy and backend
    pub fn traversal<'a>(&self, changelog: &'a ChangeLog) -> ChangeLogTraversal<'a> {
        ChangeLogTraversal::new(changelog)
            .tamper_policy(self.tamper_policy)
            .backend(self.backend)
    }

    /// Apply every changeset of `changelog` to `snapshot`, ignoring any
    /// execution log
    pub fn simulate(&self, snapshot: &Snapshot, changelog: &ChangeLog) -> EngineResult<Snapshot> {
        let mut visitor = SnapshotApplyVisitor::new(snapshot.clone());
        let mut log = crate::execution::MemoryExecutionLog::new();
        self.traversal(changelog).forward(&mut log, &mut visitor)?;
        Ok(visitor.into_snapshot())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::GroupingPolicy;
    use crate::model::{attr, ObjectId, ObjectKind, StructuralObject};
    use pretty_assertions::assert_eq;

    fn users(with_email: bool) -> Snapshot {
        let mut objects = vec![
            StructuralObject::new(ObjectId::top_level(ObjectKind::Table, "public", "users")),
            StructuralObject::new(ObjectId::contained(ObjectKind::Column, "public", "users", "id"))
                .with(attr::DATA_TYPE, "integer")
                .with(attr::NULLABLE, false)
                .with(attr::POSITION, 1i64),
        ];
        if with_email {
            objects.push(
                StructuralObject::new(ObjectId::contained(ObjectKind::Column, "public", "users", "email"))
                    .with(attr::DATA_TYPE, "text")
                    .with(attr::POSITION, 2i64),
            );
        }
        Snapshot::new(Backend::Postgres, objects).unwrap()
    }

    #[test]
    fn test_settings_flow_into_generation() {
        let mut settings = Settings::default();
        settings.engine.author = "ci".into();
        settings.engine.id_prefix = "auto".into();
        settings.engine.grouping = GroupingPolicy::Single;
        settings.engine.backend = Backend::Mysql;
        let engine = Engine::from_settings(&settings);
        assert_eq!(engine.backend(), Backend::Mysql);

        let changelog = engine.generate_changelog(&users(true), &users(false)).unwrap();
        assert_eq!(changelog.len(), 1);
        assert_eq!(changelog.changesets()[0].key().to_string(), "auto-1::ci");
    }

    #[test]
    fn test_stored_snapshots_are_normalized_before_diffing() {
        let engine = Engine::standard();
        let spelled = |data_type: &str| {
            Snapshot::new(
                Backend::Postgres,
                vec![
                    StructuralObject::new(ObjectId::top_level(ObjectKind::Table, "public", "users")),
                    StructuralObject::new(ObjectId::contained(ObjectKind::Column, "public", "users", "id"))
                        .with(attr::DATA_TYPE, data_type)
                        .with(attr::NULLABLE, false)
                        .with(attr::POSITION, 1i64),
                ],
            )
            .unwrap()
        };
        let reference = spelled("integer");
        let observed = spelled("int4");

        // Raw documents disagree on spelling only
        assert_eq!(engine.diff(&reference, &observed).unwrap().changed().count(), 1);

        let reference = engine.normalize(&reference).unwrap();
        let observed = engine.normalize(&observed).unwrap();
        assert!(engine.diff(&reference, &observed).unwrap().is_empty());
    }

    #[test]
    fn test_simulation_converges() {
        let engine = Engine::standard();
        let reference = users(true);
        let observed = Snapshot::empty(Backend::Postgres);
        let changelog = engine.generate_changelog(&reference, &observed).unwrap();
        let result = engine.simulate(&observed, &changelog).unwrap();
        assert!(engine.diff(&reference, &result).unwrap().is_empty());
    }
}
