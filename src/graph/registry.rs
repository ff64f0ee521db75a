//! Resource registry
//!
//! Holds the immutable resource graph built from configuration: which resource
//! types exist, which relationships they declare and how those relationships
//! pair up with their inverses. Also resolves client include chains against the
//! graph.

use crate::config::{HookOptions, RelationshipConfig, RelationshipKindConfig, ResourcesConfig};
use crate::core::error::{ConfigError, QueryError};
use crate::graph::relationship::{RelationshipAttribute, RelationshipKind, ThroughJoin};
use indexmap::IndexMap;

/// Metadata of one resource type
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceContext {
    /// Resource type name
    pub resource_type: String,

    /// Public attribute names
    pub attributes: Vec<String>,

    /// Relationships declared on this type, in declaration order
    pub relationships: Vec<RelationshipAttribute>,

    /// Whether this type only exists as the join of a many-to-many relationship
    pub is_join: bool,
}

impl ResourceContext {
    pub fn relationship(&self, name: &str) -> Option<&RelationshipAttribute> {
        self.relationships.iter().find(|r| r.public_name == name)
    }
}

/// Registry of resource types and their relationships
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    options: HookOptions,
    contexts: IndexMap<String, ResourceContext>,
}

impl ResourceRegistry {
    /// Build and validate the resource graph from configuration
    pub fn from_config(config: &ResourcesConfig) -> Result<Self, ConfigError> {
        let mut contexts: IndexMap<String, ResourceContext> = IndexMap::new();

        for resource in &config.resources {
            if contexts.contains_key(&resource.name) {
                return Err(ConfigError::DuplicateResource {
                    resource_type: resource.name.clone(),
                });
            }
            contexts.insert(
                resource.name.clone(),
                ResourceContext {
                    resource_type: resource.name.clone(),
                    attributes: resource.attributes.clone(),
                    relationships: Vec::new(),
                    is_join: false,
                },
            );
        }

        let mut join_contexts = Vec::new();
        for resource in &config.resources {
            let mut relationships = Vec::with_capacity(resource.relationships.len());
            for rel in &resource.relationships {
                if !contexts.contains_key(&rel.target) {
                    return Err(ConfigError::UnknownRelationshipTarget {
                        resource: resource.name.clone(),
                        relationship: rel.name.clone(),
                        target: rel.target.clone(),
                    });
                }
                let attr = build_attribute(&resource.name, rel)?;
                if let Some(join) = attr.through() {
                    join_contexts.push((join.clone(), attr.principal_type.clone(), attr.dependent_type.clone()));
                }
                relationships.push(attr);
            }
            if let Some(context) = contexts.get_mut(&resource.name) {
                context.relationships = relationships;
            }
        }

        for (join, left_type, right_type) in join_contexts {
            register_join(&mut contexts, &join, &left_type, &right_type)?;
        }

        let registry = Self {
            options: config.options.clone(),
            contexts,
        };
        registry.validate_inverses()?;

        tracing::debug!(
            resource_types = registry.contexts.len(),
            "resource graph built"
        );
        Ok(registry)
    }

    fn validate_inverses(&self) -> Result<(), ConfigError> {
        for attr in self.contexts.values().flat_map(|c| c.relationships.iter()) {
            let Some(inverse_name) = &attr.inverse_navigation else {
                continue;
            };
            let valid = self
                .relationship(&attr.dependent_type, inverse_name)
                .is_some_and(|inverse| inverse.dependent_type == attr.principal_type);
            if !valid {
                return Err(ConfigError::InvalidInverse {
                    resource: attr.principal_type.clone(),
                    relationship: attr.public_name.clone(),
                    inverse: inverse_name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn options(&self) -> &HookOptions {
        &self.options
    }

    /// Metadata of a resource type
    pub fn context(&self, resource_type: &str) -> Option<&ResourceContext> {
        self.contexts.get(resource_type)
    }

    /// Metadata of a resource type, as a client error when unknown
    pub fn require_context(&self, resource_type: &str) -> Result<&ResourceContext, QueryError> {
        self.context(resource_type)
            .ok_or_else(|| QueryError::UnknownResourceType {
                resource_type: resource_type.to_string(),
            })
    }

    /// All declared resource types
    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.contexts.keys().map(String::as_str)
    }

    /// Relationships declared on a type, empty for unknown types
    pub fn relationships(&self, resource_type: &str) -> &[RelationshipAttribute] {
        self.context(resource_type)
            .map(|c| c.relationships.as_slice())
            .unwrap_or(&[])
    }

    pub fn relationship(&self, resource_type: &str, name: &str) -> Option<&RelationshipAttribute> {
        self.context(resource_type).and_then(|c| c.relationship(name))
    }

    /// Every relationship in the graph
    pub fn all_relationships(&self) -> impl Iterator<Item = &RelationshipAttribute> {
        self.contexts.values().flat_map(|c| c.relationships.iter())
    }

    /// The paired edge named by the inverse navigation of `attr`
    pub fn inverse(&self, attr: &RelationshipAttribute) -> Option<&RelationshipAttribute> {
        attr.inverse_navigation
            .as_deref()
            .and_then(|name| self.relationship(&attr.dependent_type, name))
    }

    /// Resolve an include parameter into relationship chains.
    ///
    /// The parameter is a comma separated list of dot separated relationship
    /// names, each chain starting at `primary_type`.
    pub fn parse_includes(
        &self,
        primary_type: &str,
        raw: &str,
    ) -> Result<Vec<Vec<RelationshipAttribute>>, QueryError> {
        self.require_context(primary_type)?;
        if raw.trim().is_empty() {
            return Err(QueryError::EmptyInclude);
        }

        raw.split(',')
            .map(|chain| self.parse_include_chain(primary_type, chain.trim()))
            .collect()
    }

    /// Resolve one dot separated include chain
    pub fn parse_include_chain(
        &self,
        primary_type: &str,
        chain: &str,
    ) -> Result<Vec<RelationshipAttribute>, QueryError> {
        let mut current = primary_type;
        let mut resolved = Vec::new();

        for (position, segment) in chain.split('.').enumerate() {
            if segment.is_empty() {
                return Err(QueryError::EmptyIncludeSegment {
                    chain: chain.to_string(),
                    position,
                });
            }

            let attr = self.relationship(current, segment).ok_or_else(|| {
                QueryError::InvalidRelationship {
                    resource: current.to_string(),
                    relationship: segment.to_string(),
                }
            })?;

            if !attr.can_include {
                return Err(QueryError::RelationshipNotIncludable {
                    resource: current.to_string(),
                    relationship: segment.to_string(),
                });
            }

            current = &attr.dependent_type;
            resolved.push(attr.clone());
        }

        Ok(resolved)
    }
}

fn build_attribute(
    resource: &str,
    rel: &RelationshipConfig,
) -> Result<RelationshipAttribute, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidThrough {
        resource: resource.to_string(),
        relationship: rel.name.clone(),
        message: message.to_string(),
    };

    let kind = match (rel.kind, &rel.through) {
        (RelationshipKindConfig::HasOne, None) => RelationshipKind::HasOne,
        (RelationshipKindConfig::HasMany, None) => RelationshipKind::HasMany,
        (RelationshipKindConfig::HasManyThrough, Some(through)) => {
            if through.left == through.right {
                return Err(invalid("join navigations must differ"));
            }
            RelationshipKind::HasManyThrough(ThroughJoin {
                through_type: through.join_type.clone(),
                through_property: through.property.clone(),
                left_property: through.left.clone(),
                right_property: through.right.clone(),
            })
        }
        (RelationshipKindConfig::HasManyThrough, None) => {
            return Err(invalid("has_many_through requires a join description"));
        }
        (_, Some(_)) => {
            return Err(invalid("only has_many_through takes a join description"));
        }
    };

    Ok(RelationshipAttribute {
        public_name: rel.name.clone(),
        principal_type: resource.to_string(),
        dependent_type: rel.target.clone(),
        kind,
        inverse_navigation: rel.inverse.clone(),
        can_include: rel.can_include,
    })
}

/// Declare the join type of a many-to-many relationship, or check a declared one
fn register_join(
    contexts: &mut IndexMap<String, ResourceContext>,
    join: &ThroughJoin,
    left_type: &str,
    right_type: &str,
) -> Result<(), ConfigError> {
    let left = RelationshipAttribute {
        can_include: false,
        ..RelationshipAttribute::has_one(join.through_type.clone(), join.left_property.clone(), left_type)
    };
    let right = RelationshipAttribute {
        can_include: false,
        ..RelationshipAttribute::has_one(join.through_type.clone(), join.right_property.clone(), right_type)
    };

    match contexts.get_mut(&join.through_type) {
        Some(context) if !context.is_join => {
            for expected in [&left, &right] {
                let declared = context.relationship(&expected.public_name);
                if !declared.is_some_and(|d| d.dependent_type == expected.dependent_type && !d.is_to_many()) {
                    return Err(ConfigError::InvalidThrough {
                        resource: left_type.to_string(),
                        relationship: join.through_property.clone(),
                        message: format!(
                            "join type '{}' must declare to-one '{}' targeting '{}'",
                            join.through_type, expected.public_name, expected.dependent_type
                        ),
                    });
                }
            }
        }
        Some(context) => {
            // The inverse side of the same join: both navigations are already present.
            for attr in [left, right] {
                if context.relationship(&attr.public_name).is_none() {
                    context.relationships.push(attr);
                }
            }
        }
        None => {
            contexts.insert(
                join.through_type.clone(),
                ResourceContext {
                    resource_type: join.through_type.clone(),
                    attributes: Vec::new(),
                    relationships: vec![left, right],
                    is_join: true,
                },
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
resources:
  - name: articles
    attributes: [title]
    relationships:
      - name: author
        kind: has_one
        target: people
        inverse: articles
      - name: reviewer
        kind: has_one
        target: people
        can_include: false
      - name: tags
        kind: has_many_through
        target: tags
        through:
          join_type: article-tags
          property: article-tags
          left: article
          right: tag
  - name: people
    attributes: [name]
    relationships:
      - name: articles
        kind: has_many
        target: articles
        inverse: author
  - name: tags
"#;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::from_config(&ResourcesConfig::from_yaml_str(YAML).unwrap()).unwrap()
    }

    #[test]
    fn test_inverse_resolution() {
        let registry = registry();
        let author = registry.relationship("articles", "author").unwrap();
        let inverse = registry.inverse(author).unwrap();

        assert_eq!(inverse.public_name, "articles");
        assert_eq!(inverse.principal_type, "people");
        assert!(inverse.is_to_many());
        assert!(registry.inverse(registry.relationship("articles", "reviewer").unwrap()).is_none());
    }

    #[test]
    fn test_join_type_is_registered() {
        let registry = registry();
        let join = registry.context("article-tags").unwrap();

        assert!(join.is_join);
        assert_eq!(join.relationship("article").unwrap().dependent_type, "articles");
        assert_eq!(join.relationship("tag").unwrap().dependent_type, "tags");
    }

    #[test]
    fn test_parse_include_chains() {
        let registry = registry();
        let chains = registry.parse_includes("articles", "author.articles,tags").unwrap();

        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0][0].public_name, "author");
        assert_eq!(chains[0][1].public_name, "articles");
        assert_eq!(chains[0][1].principal_type, "people");
        assert_eq!(chains[1][0].dependent_type, "tags");
    }

    #[test]
    fn test_include_errors() {
        let registry = registry();

        assert_eq!(registry.parse_includes("articles", " "), Err(QueryError::EmptyInclude));
        assert_eq!(
            registry.parse_includes("articles", "author..articles"),
            Err(QueryError::EmptyIncludeSegment {
                chain: "author..articles".to_string(),
                position: 1,
            })
        );
        assert_eq!(
            registry.parse_includes("articles", "author.writer"),
            Err(QueryError::InvalidRelationship {
                resource: "people".to_string(),
                relationship: "writer".to_string(),
            })
        );
        assert_eq!(
            registry.parse_includes("articles", "reviewer"),
            Err(QueryError::RelationshipNotIncludable {
                resource: "articles".to_string(),
                relationship: "reviewer".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let yaml = r#"
resources:
  - name: articles
    relationships:
      - name: author
        kind: has_one
        target: ghosts
"#;
        let err = ResourceRegistry::from_config(&ResourcesConfig::from_yaml_str(yaml).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRelationshipTarget { .. }));
    }

    #[test]
    fn test_invalid_inverse_is_rejected() {
        let yaml = r#"
resources:
  - name: articles
    relationships:
      - name: author
        kind: has_one
        target: people
        inverse: books
  - name: people
"#;
        let err = ResourceRegistry::from_config(&ResourcesConfig::from_yaml_str(yaml).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInverse { .. }));
    }

    #[test]
    fn test_duplicate_resource_is_rejected() {
        let yaml = "resources:\n  - name: people\n  - name: people\n";
        let err = ResourceRegistry::from_config(&ResourcesConfig::from_yaml_str(yaml).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateResource { .. }));
    }

    #[test]
    fn test_through_requires_join_description() {
        let yaml = r#"
resources:
  - name: articles
    relationships:
      - name: tags
        kind: has_many_through
        target: tags
  - name: tags
"#;
        let err = ResourceRegistry::from_config(&ResourcesConfig::from_yaml_str(yaml).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThrough { .. }));
    }
}
