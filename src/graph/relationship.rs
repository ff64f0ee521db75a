//! Relationship metadata
//!
//! A [`RelationshipAttribute`] describes one navigation edge of the resource
//! graph. Attributes are built once from configuration and never change.

use crate::core::resource::{Relation, Resource, ResourceKey};

/// Join description of a many-to-many relationship
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThroughJoin {
    /// The join resource type
    pub through_type: String,

    /// Navigation on the principal holding the join resources
    pub through_property: String,

    /// To-one navigation on the join resource pointing to the principal
    pub left_property: String,

    /// To-one navigation on the join resource pointing to the dependent
    pub right_property: String,
}

impl ThroughJoin {
    /// Identity of the join row linking `left` to `right`.
    ///
    /// Ids are ordered by navigation name so that both sides of a many-to-many
    /// relationship agree on the key of a shared row.
    pub fn join_key(&self, left: &ResourceKey, right: &ResourceKey) -> ResourceKey {
        let id = if self.left_property <= self.right_property {
            format!("{}:{}", left.id, right.id)
        } else {
            format!("{}:{}", right.id, left.id)
        };
        ResourceKey::new(self.through_type.clone(), id)
    }

    /// A fresh join resource linking `left` to `right`
    pub fn join_resource(&self, left: &ResourceKey, right: &ResourceKey) -> Resource {
        let key = self.join_key(left, right);
        Resource::new(key.resource_type, key.id)
            .with_to_one(self.left_property.clone(), Some(left.clone()))
            .with_to_one(self.right_property.clone(), Some(right.clone()))
    }

    /// The dependent side of a join resource
    pub fn right_of(&self, join: &Resource) -> Option<ResourceKey> {
        match join.relation(&self.right_property) {
            Some(Relation::ToOne(Some(key))) => Some(key.clone()),
            _ => None,
        }
    }

    /// The principal side of a join resource
    pub fn left_of(&self, join: &Resource) -> Option<ResourceKey> {
        match join.relation(&self.left_property) {
            Some(Relation::ToOne(Some(key))) => Some(key.clone()),
            _ => None,
        }
    }
}

/// Cardinality of a relationship
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// To-one
    HasOne,
    /// To-many
    HasMany,
    /// Many-to-many through a join resource
    HasManyThrough(ThroughJoin),
}

/// One navigation edge of the resource graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationshipAttribute {
    /// Public relationship name
    pub public_name: String,

    /// The type declaring the relationship (left side)
    pub principal_type: String,

    /// The type the relationship points to (right side)
    pub dependent_type: String,

    /// Cardinality
    pub kind: RelationshipKind,

    /// Name of the paired relationship on the dependent type
    pub inverse_navigation: Option<String>,

    /// Whether clients may include this relationship
    pub can_include: bool,
}

impl RelationshipAttribute {
    /// Create a to-one relationship
    pub fn has_one(
        principal_type: impl Into<String>,
        public_name: impl Into<String>,
        dependent_type: impl Into<String>,
    ) -> Self {
        Self {
            public_name: public_name.into(),
            principal_type: principal_type.into(),
            dependent_type: dependent_type.into(),
            kind: RelationshipKind::HasOne,
            inverse_navigation: None,
            can_include: true,
        }
    }

    /// Create a to-many relationship
    pub fn has_many(
        principal_type: impl Into<String>,
        public_name: impl Into<String>,
        dependent_type: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationshipKind::HasMany,
            ..Self::has_one(principal_type, public_name, dependent_type)
        }
    }

    /// Builder: set the inverse navigation
    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse_navigation = Some(inverse.into());
        self
    }

    /// The left type of the edge
    pub fn left_type(&self) -> &str {
        &self.principal_type
    }

    /// The right type of the edge
    pub fn right_type(&self) -> &str {
        &self.dependent_type
    }

    pub fn is_to_many(&self) -> bool {
        !matches!(self.kind, RelationshipKind::HasOne)
    }

    pub fn is_through(&self) -> bool {
        matches!(self.kind, RelationshipKind::HasManyThrough(_))
    }

    /// The join description of a many-to-many relationship
    pub fn through(&self) -> Option<&ThroughJoin> {
        match &self.kind {
            RelationshipKind::HasManyThrough(join) => Some(join),
            _ => None,
        }
    }

    /// Read the navigation value off a resource.
    ///
    /// `None` means the relationship is not populated on this resource.
    pub fn get_value<'a>(&self, resource: &'a Resource) -> Option<&'a Relation> {
        resource.relation(&self.public_name)
    }

    /// The keys referenced by the navigation value, empty when not populated
    pub fn get_keys(&self, resource: &Resource) -> Vec<ResourceKey> {
        self.get_value(resource).map(Relation::keys).unwrap_or_default()
    }

    /// Assign the navigation value from a set of keys, shaped by cardinality
    pub fn set_keys(&self, resource: &mut Resource, keys: Vec<ResourceKey>) {
        resource.set_relation(self.public_name.clone(), self.shape(keys));
    }

    /// Shape a set of keys as a value of this relationship
    pub fn shape(&self, keys: Vec<ResourceKey>) -> Relation {
        if self.is_to_many() {
            Relation::ToMany(keys)
        } else {
            Relation::ToOne(keys.into_iter().next())
        }
    }

    /// An explicitly empty value of this relationship
    pub fn empty_value(&self) -> Relation {
        self.shape(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> RelationshipAttribute {
        RelationshipAttribute {
            kind: RelationshipKind::HasManyThrough(ThroughJoin {
                through_type: "article-tags".to_string(),
                through_property: "article-tags".to_string(),
                left_property: "article".to_string(),
                right_property: "tag".to_string(),
            }),
            ..RelationshipAttribute::has_many("articles", "tags", "tags")
        }
    }

    #[test]
    fn test_shape_follows_cardinality() {
        let author = RelationshipAttribute::has_one("articles", "author", "people");
        let key = ResourceKey::new("people", "1");

        assert_eq!(author.shape(vec![key.clone()]), Relation::ToOne(Some(key.clone())));
        assert_eq!(author.empty_value(), Relation::ToOne(None));
        assert!(!author.is_to_many());

        assert!(tags().is_to_many());
        assert!(tags().is_through());
        assert_eq!(tags().empty_value(), Relation::ToMany(vec![]));
    }

    #[test]
    fn test_join_resource_links_both_sides() {
        let attr = tags();
        let join = attr.through().unwrap();
        let article = ResourceKey::new("articles", "1");
        let tag = ResourceKey::new("tags", "9");

        let row = join.join_resource(&article, &tag);
        assert_eq!(row.id, "1:9");
        assert_eq!(join.left_of(&row), Some(article));
        assert_eq!(join.right_of(&row), Some(tag));
    }

    #[test]
    fn test_get_keys_on_unpopulated_relationship() {
        let author = RelationshipAttribute::has_one("articles", "author", "people");
        let article = Resource::new("articles", "1");
        assert!(author.get_value(&article).is_none());
        assert!(author.get_keys(&article).is_empty());
    }
}
