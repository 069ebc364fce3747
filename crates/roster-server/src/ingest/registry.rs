//! Entity type to importer lookup, built once at startup

use roster_common::EntityType;
use std::collections::HashMap;
use std::sync::Arc;

use super::importers::{
    ClassImporter, EntityImporter, RoomImporter, StudentImporter, SubjectImporter,
    TeacherImporter, TimetableImporter,
};
use super::password::PasswordHasher;

#[derive(Clone, Default)]
pub struct ImporterRegistry {
    importers: HashMap<EntityType, Arc<dyn EntityImporter>>,
}

impl ImporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with an importer for every entity type
    pub fn standard(hasher: PasswordHasher) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ClassImporter));
        registry.register(Arc::new(SubjectImporter));
        registry.register(Arc::new(RoomImporter));
        registry.register(Arc::new(StudentImporter::new(hasher)));
        registry.register(Arc::new(TeacherImporter::new(hasher)));
        registry.register(Arc::new(TimetableImporter));
        registry
    }

    pub fn register(&mut self, importer: Arc<dyn EntityImporter>) {
        self.importers.insert(importer.entity_type(), importer);
    }

    pub fn get(&self, entity_type: EntityType) -> Option<Arc<dyn EntityImporter>> {
        self.importers.get(&entity_type).cloned()
    }

    /// Registered types in declaration order
    pub fn entity_types(&self) -> Vec<EntityType> {
        EntityType::ALL
            .into_iter()
            .filter(|t| self.importers.contains_key(t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_every_entity_type() {
        let registry = ImporterRegistry::standard(PasswordHasher::new(4));

        assert_eq!(registry.entity_types(), EntityType::ALL.to_vec());
        for entity_type in EntityType::ALL {
            let importer = registry.get(entity_type).unwrap();
            assert_eq!(importer.entity_type(), entity_type);
            assert!(!importer.expected_headers().is_empty());
        }
    }

    #[test]
    fn test_empty_registry_has_no_importers() {
        let registry = ImporterRegistry::new();
        assert!(registry.get(EntityType::Class).is_none());
        assert!(registry.entity_types().is_empty());
    }

    #[test]
    fn test_only_timetable_checks_overlaps() {
        let registry = ImporterRegistry::standard(PasswordHasher::new(4));
        let overlapping: Vec<EntityType> = EntityType::ALL
            .into_iter()
            .filter(|t| registry.get(*t).is_some_and(|i| i.checks_schedule_overlaps()))
            .collect();

        assert_eq!(overlapping, vec![EntityType::Timetable]);
    }
}
