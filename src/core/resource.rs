//! Resource objects and identity
//!
//! A [`Resource`] is the dynamically-typed record the hook engine and the
//! repository work on. Relationships never hold live references to other
//! resources: they hold [`ResourceKey`]s, and the resources themselves live in
//! an arena (see [`EntityGraph`](crate::graph::entity_graph::EntityGraph)).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identity of a resource: its concrete type and canonical string id.
///
/// Two resources with equal keys are the same logical entity regardless of
/// which instance carries them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    /// The resource type (e.g. "people", "articles")
    #[serde(rename = "type")]
    pub resource_type: String,

    /// The canonical string form of the id
    pub id: String,
}

impl ResourceKey {
    /// Create a new resource key
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)
    }
}

/// Base trait for anything with a stable identity
pub trait Identifiable {
    /// The resource type name
    fn resource_type(&self) -> &str;

    /// The id in its canonical string form
    fn string_id(&self) -> &str;

    /// The full identity
    fn key(&self) -> ResourceKey {
        ResourceKey::new(self.resource_type(), self.string_id())
    }

    /// Whether two values denote the same logical entity
    fn same_identity(&self, other: &dyn Identifiable) -> bool {
        self.resource_type() == other.resource_type() && self.string_id() == other.string_id()
    }
}

impl Identifiable for ResourceKey {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn string_id(&self) -> &str {
        &self.id
    }

    fn key(&self) -> ResourceKey {
        self.clone()
    }
}

/// Value of one relationship on a resource.
///
/// Serialized as JSON:API resource linkage: `null`, a single identifier object,
/// or an array of identifier objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Relation {
    /// A to-one relationship, `None` when explicitly empty
    ToOne(Option<ResourceKey>),
    /// A to-many relationship
    ToMany(Vec<ResourceKey>),
}

impl Relation {
    /// All keys referenced by this value
    pub fn keys(&self) -> Vec<ResourceKey> {
        match self {
            Relation::ToOne(Some(key)) => vec![key.clone()],
            Relation::ToOne(None) => Vec::new(),
            Relation::ToMany(keys) => keys.clone(),
        }
    }

    /// Whether the value references nothing
    pub fn is_empty(&self) -> bool {
        match self {
            Relation::ToOne(value) => value.is_none(),
            Relation::ToMany(keys) => keys.is_empty(),
        }
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        match self {
            Relation::ToOne(value) => value.as_ref() == Some(key),
            Relation::ToMany(keys) => keys.contains(key),
        }
    }

    /// Keep only the referenced keys accepted by `keep`, preserving the shape
    pub fn retain(&mut self, mut keep: impl FnMut(&ResourceKey) -> bool) {
        match self {
            Relation::ToOne(value) => {
                if value.as_ref().is_some_and(|key| !keep(key)) {
                    *value = None;
                }
            }
            Relation::ToMany(keys) => keys.retain(|key| keep(key)),
        }
    }
}

/// A JSON:API resource object.
///
/// Relationships absent from `relationships` are "not populated": either the
/// client did not supply them or, for resources loaded from storage, the
/// navigation was not loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// The resource type
    #[serde(rename = "type")]
    pub resource_type: String,

    /// The canonical string id. Empty for resources that still await an id.
    #[serde(default)]
    pub id: String,

    /// Attribute values by public name
    #[serde(default)]
    pub attributes: Map<String, Value>,

    /// Relationship values by public name
    #[serde(default)]
    pub relationships: IndexMap<String, Relation>,
}

impl Resource {
    /// Create a resource without attributes or relationships
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            attributes: Map::new(),
            relationships: IndexMap::new(),
        }
    }

    /// An identity-only pointer, as supplied in relationship linkage
    pub fn pointer(key: &ResourceKey) -> Self {
        Self::new(key.resource_type.clone(), key.id.clone())
    }

    /// Builder: set an attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Builder: set a to-one relationship
    pub fn with_to_one(mut self, name: impl Into<String>, target: Option<ResourceKey>) -> Self {
        self.relationships.insert(name.into(), Relation::ToOne(target));
        self
    }

    /// Builder: set a to-many relationship
    pub fn with_to_many(mut self, name: impl Into<String>, targets: Vec<ResourceKey>) -> Self {
        self.relationships.insert(name.into(), Relation::ToMany(targets));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relationships.get(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, value: Relation) {
        self.relationships.insert(name.into(), value);
    }

    /// Mark a relationship as not populated
    pub fn clear_relation(&mut self, name: &str) -> Option<Relation> {
        self.relationships.shift_remove(name)
    }

    /// Whether the resource carries only its identity
    pub fn is_pointer(&self) -> bool {
        self.attributes.is_empty() && self.relationships.is_empty()
    }
}

impl Identifiable for Resource {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn string_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_ignores_payload() {
        let a = Resource::new("people", "1").with_attribute("name", "Ada");
        let b = Resource::new("people", "1");
        let c = Resource::new("articles", "1");

        assert!(a.same_identity(&b));
        assert!(!a.same_identity(&c));
        assert_eq!(a.key(), ResourceKey::new("people", "1"));
    }

    #[test]
    fn test_relation_retain_keeps_shape() {
        let keep = ResourceKey::new("tags", "1");
        let drop = ResourceKey::new("tags", "2");

        let mut many = Relation::ToMany(vec![keep.clone(), drop.clone()]);
        many.retain(|k| k == &keep);
        assert_eq!(many, Relation::ToMany(vec![keep.clone()]));

        let mut one = Relation::ToOne(Some(drop.clone()));
        one.retain(|k| k == &keep);
        assert_eq!(one, Relation::ToOne(None));
    }

    #[test]
    fn test_relation_linkage_json() {
        let value: Relation = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(value, Relation::ToOne(None));

        let value: Relation =
            serde_json::from_value(json!([{ "type": "tags", "id": "1" }])).unwrap();
        assert_eq!(value, Relation::ToMany(vec![ResourceKey::new("tags", "1")]));

        let value: Relation = serde_json::from_value(json!({ "type": "people", "id": "7" })).unwrap();
        assert_eq!(value, Relation::ToOne(Some(ResourceKey::new("people", "7"))));
    }

    #[test]
    fn test_pointer_detection() {
        let key = ResourceKey::new("people", "1");
        assert!(Resource::pointer(&key).is_pointer());
        assert!(!Resource::pointer(&key).with_attribute("name", "x").is_pointer());
    }
}
