use crate::core::resource::{Relation, Resource, ResourceKey};
use crate::graph::relationship::RelationshipAttribute;

/// A relationship as seen from one traversal step.
///
/// Many-to-many relationships are read through their public navigation, so a
/// traversal moves straight from the principal to the dependent and never
/// visits join resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationshipProxy {
    pub attribute: RelationshipAttribute,

    /// Whether the current request writes this relationship
    pub is_context_relation: bool,
}

impl RelationshipProxy {
    pub fn new(attribute: RelationshipAttribute, is_context_relation: bool) -> Self {
        Self {
            attribute,
            is_context_relation,
        }
    }

    pub fn left_type(&self) -> &str {
        self.attribute.left_type()
    }

    pub fn right_type(&self) -> &str {
        self.attribute.right_type()
    }

    pub fn is_to_many(&self) -> bool {
        self.attribute.is_to_many()
    }

    /// Keys referenced from `left`, `None` when the relationship is not populated
    pub fn get_value(&self, left: &Resource) -> Option<Vec<ResourceKey>> {
        self.attribute.get_value(left).map(Relation::keys)
    }

    /// Whether `left` references at least one resource through this relationship
    pub fn is_populated_on(&self, left: &Resource) -> bool {
        self.attribute.get_value(left).is_some_and(|value| !value.is_empty())
    }
}
