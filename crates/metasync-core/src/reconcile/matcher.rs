//! Qualified-name matching between a source listing and a target listing.

use std::collections::{HashMap, HashSet};

use crate::catalog::{CatalogEntity, TargetRecord};
use crate::page::TargetListing;

/// Index of target records by qualified name.
///
/// Names compare exactly and case-sensitively. When several records share a
/// name, the first one in listing order is the match.
#[derive(Debug, Default)]
pub struct Matcher<'a> {
    index: HashMap<&'a str, &'a TargetRecord>,
}

impl<'a> Matcher<'a> {
    /// Index a target listing.
    pub fn new(records: &'a [TargetRecord]) -> Self {
        let mut index = HashMap::with_capacity(records.len());
        for record in records {
            index.entry(record.qualified_name.as_str()).or_insert(record);
        }
        Self { index }
    }

    /// The record matching a qualified name.
    pub fn find(&self, qualified_name: &str) -> Option<&'a TargetRecord> {
        self.index.get(qualified_name).copied()
    }
}

/// What to do with one entity or record of a scope.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelAction<'a> {
    /// The source entity has no target record.
    Create(&'a CatalogEntity),
    /// The matched record diverges from the source entity.
    Update(&'a CatalogEntity, &'a TargetRecord),
    /// The matched record already mirrors the source entity.
    Keep(&'a CatalogEntity, &'a TargetRecord),
    /// The record's name is absent from the whole source listing.
    Delete(&'a TargetRecord),
}

/// Actions for one scope: source entities in listing order, then deletes
/// in target listing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelPlan<'a> {
    actions: Vec<LevelAction<'a>>,
}

impl<'a> LevelPlan<'a> {
    /// All actions in execution order.
    pub fn actions(&self) -> &[LevelAction<'a>] {
        &self.actions
    }

    /// Number of creates.
    pub fn creates(&self) -> usize {
        self.count(|a| matches!(a, LevelAction::Create(_)))
    }

    /// Number of updates.
    pub fn updates(&self) -> usize {
        self.count(|a| matches!(a, LevelAction::Update(..)))
    }

    /// Number of deletes.
    pub fn deletes(&self) -> usize {
        self.count(|a| matches!(a, LevelAction::Delete(_)))
    }

    /// Number of matched records needing no write.
    pub fn unchanged(&self) -> usize {
        self.count(|a| matches!(a, LevelAction::Keep(..)))
    }

    /// Whether the plan performs no write.
    pub fn is_noop(&self) -> bool {
        self.actions.len() == self.unchanged()
    }

    fn count(&self, f: impl Fn(&LevelAction<'a>) -> bool) -> usize {
        self.actions.iter().filter(|a| f(*a)).count()
    }
}

impl<'a> IntoIterator for LevelPlan<'a> {
    type Item = LevelAction<'a>;
    type IntoIter = std::vec::IntoIter<LevelAction<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}

/// Decide the writes that bring one scope of the target in line with the
/// source.
///
/// A never-listed scope turns every source entity into a create and never
/// yields a delete. A listed scope deletes each record whose name matches
/// no entity of the full source listing.
pub fn plan_level<'a>(source: &'a [CatalogEntity], target: &'a TargetListing) -> LevelPlan<'a> {
    let records = target.records();
    let matcher = Matcher::new(records);
    let mut actions = Vec::with_capacity(source.len() + records.len());

    for entity in source {
        let action = match matcher.find(&entity.qualified_name) {
            None => LevelAction::Create(entity),
            Some(record) if record.differs_from(entity) => LevelAction::Update(entity, record),
            Some(record) => LevelAction::Keep(entity, record),
        };
        actions.push(action);
    }

    if !target.is_never_listed() {
        let observed: HashSet<&str> = source.iter().map(|e| e.qualified_name.as_str()).collect();
        for record in records {
            if !observed.contains(record.qualified_name.as_str()) {
                actions.push(LevelAction::Delete(record));
            }
        }
    }

    LevelPlan { actions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Attributes, TargetId};

    fn schema(name: &str) -> CatalogEntity {
        CatalogEntity::schema(format!("sales.{}", name), name)
    }

    fn record(id: &str, entity: &CatalogEntity) -> TargetRecord {
        TargetRecord::from_entity(TargetId::new(id), entity)
    }

    #[test]
    fn test_never_listed_creates_everything() {
        let source = vec![schema("public"), schema("archive")];
        let plan = plan_level(&source, &TargetListing::NeverListed);

        assert_eq!(plan.creates(), 2);
        assert_eq!(plan.updates(), 0);
        assert_eq!(plan.deletes(), 0);
    }

    #[test]
    fn test_listed_and_empty_creates_everything() {
        let source = vec![schema("public")];
        let target = TargetListing::Listed(Vec::new());
        let plan = plan_level(&source, &target);
        assert_eq!(plan.actions(), &[LevelAction::Create(&source[0])]);
    }

    #[test]
    fn test_identical_listing_is_noop() {
        let source = vec![schema("public"), schema("archive")];
        let target =
            TargetListing::Listed(vec![record("s-2", &source[1]), record("s-1", &source[0])]);

        let plan = plan_level(&source, &target);
        assert!(plan.is_noop());
        assert_eq!(plan.unchanged(), 2);
    }

    #[test]
    fn test_absent_record_is_deleted_once() {
        let source = vec![schema("public"), schema("staging")];
        let archive = schema("archive");
        // Neither kept record is the first one compared.
        let target = TargetListing::Listed(vec![
            record("s-3", &archive),
            record("s-2", &source[1]),
            record("s-1", &source[0]),
        ]);

        let plan = plan_level(&source, &target);
        assert_eq!(plan.deletes(), 1);
        assert_eq!(plan.unchanged(), 2);
        match plan.actions().last() {
            Some(LevelAction::Delete(r)) => assert_eq!(r.qualified_name, "sales.archive"),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_single_divergence_is_one_update() {
        let source = vec![
            schema("public").with_attributes(Attributes::new().with_description("main")),
            schema("archive"),
        ];
        let target = TargetListing::Listed(vec![
            record("s-1", &schema("public")),
            record("s-2", &source[1]),
        ]);

        let plan = plan_level(&source, &target);
        assert_eq!(plan.updates(), 1);
        assert_eq!(plan.creates() + plan.deletes(), 0);
        match &plan.actions()[0] {
            LevelAction::Update(entity, record) => {
                assert_eq!(entity.attributes.description.as_deref(), Some("main"));
                assert_eq!(record.target_id, TargetId::new("s-1"));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_first_match_wins() {
        let entity = schema("public");
        let records = vec![record("first", &entity), record("second", &entity)];
        let matcher = Matcher::new(&records);
        assert_eq!(matcher.find("sales.public").unwrap().target_id, TargetId::new("first"));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let source = vec![schema("Public")];
        let target = TargetListing::Listed(vec![record("s-1", &schema("public"))]);

        let plan = plan_level(&source, &target);
        assert_eq!(plan.creates(), 1);
        assert_eq!(plan.deletes(), 1);
    }

    #[test]
    fn test_duplicate_record_names_are_not_deleted() {
        let entity = schema("public");
        let source = vec![entity.clone()];
        let target = TargetListing::Listed(vec![record("a", &entity), record("b", &entity)]);

        let plan = plan_level(&source, &target);
        assert_eq!(plan.deletes(), 0);
        assert_eq!(plan.unchanged(), 1);
    }
}
