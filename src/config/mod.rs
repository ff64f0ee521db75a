//! Configuration loading and management
//!
//! Resources, their relationships and the hook engine options are declared in
//! YAML:
//!
//! ```yaml
//! options:
//!   load_database_values: true
//! resources:
//!   - name: groups
//!     attributes: [name]
//!     relationships:
//!       - name: users
//!         kind: has_many
//!         target: users
//!         inverse: group
//!   - name: users
//!     attributes: [name]
//!     relationships:
//!       - name: group
//!         kind: has_one
//!         target: groups
//!         inverse: users
//! ```

use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options of the hook engine and the repository layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookOptions {
    /// Whether resource hooks run at all
    #[serde(default = "default_true")]
    pub enable_resource_hooks: bool,

    /// Whether hooks that can diff against stored values load them by default.
    ///
    /// Individual hooks may override this in their manifest.
    #[serde(default)]
    pub load_database_values: bool,

    /// Whether list requests count the total number of records
    #[serde(default)]
    pub include_total_record_count: bool,

    /// Page size used when a request does not specify one (0 disables paging)
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> usize {
    10
}

impl Default for HookOptions {
    fn default() -> Self {
        Self {
            enable_resource_hooks: true,
            load_database_values: false,
            include_total_record_count: false,
            default_page_size: default_page_size(),
        }
    }
}

/// Cardinality of a configured relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKindConfig {
    /// To-one navigation
    HasOne,
    /// To-many navigation
    HasMany,
    /// Many-to-many navigation through a join resource
    HasManyThrough,
}

/// Join resource description of a many-to-many relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughConfig {
    /// The join resource type (e.g. "article-tags")
    pub join_type: String,

    /// Navigation on the principal holding the join resources
    pub property: String,

    /// To-one navigation on the join resource pointing to the principal
    pub left: String,

    /// To-one navigation on the join resource pointing to the dependent
    pub right: String,
}

/// Configuration for one relationship of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipConfig {
    /// Public relationship name
    pub name: String,

    /// Cardinality
    pub kind: RelationshipKindConfig,

    /// Dependent resource type
    pub target: String,

    /// Name of the relationship on the target pointing back, if any
    #[serde(default)]
    pub inverse: Option<String>,

    /// Whether clients may include this relationship
    #[serde(default = "default_true")]
    pub can_include: bool,

    /// Join description, required for `has_many_through`
    #[serde(default)]
    pub through: Option<ThroughConfig>,
}

/// Configuration for a resource type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type name (e.g. "people")
    pub name: String,

    /// Public attribute names
    #[serde(default)]
    pub attributes: Vec<String>,

    /// Relationships declared on this resource
    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
}

/// Complete configuration of the resource graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Engine options
    #[serde(default)]
    pub options: HookOptions,

    /// Declared resources
    pub resources: Vec<ResourceConfig>,
}

impl ResourcesConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            file: Some(path.display().to_string()),
            message: e.to_string(),
        })
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Find a resource configuration by name
    pub fn find_resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
options:
  load_database_values: true
resources:
  - name: articles
    attributes: [title]
    relationships:
      - name: author
        kind: has_one
        target: people
        inverse: articles
      - name: tags
        kind: has_many_through
        target: tags
        through:
          join_type: article-tags
          property: article-tags
          left: article
          right: tag
  - name: people
    relationships:
      - name: articles
        kind: has_many
        target: articles
        inverse: author
        can_include: false
  - name: tags
"#;

    #[test]
    fn test_parse_yaml() {
        let config = ResourcesConfig::from_yaml_str(YAML).unwrap();

        assert!(config.options.load_database_values);
        assert!(config.options.enable_resource_hooks);
        assert_eq!(config.options.default_page_size, 10);
        assert_eq!(config.resources.len(), 3);

        let articles = config.find_resource("articles").unwrap();
        assert_eq!(articles.attributes, vec!["title".to_string()]);
        assert_eq!(articles.relationships[1].kind, RelationshipKindConfig::HasManyThrough);
        assert_eq!(
            articles.relationships[1].through.as_ref().unwrap().join_type,
            "article-tags"
        );

        let people = config.find_resource("people").unwrap();
        assert!(!people.relationships[0].can_include);
        assert!(config.find_resource("tags").unwrap().relationships.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let config = ResourcesConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.resources.len(), 3);
    }

    #[test]
    fn test_missing_file() {
        let err = ResourcesConfig::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = ResourcesConfig::from_yaml_str(YAML).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = ResourcesConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
