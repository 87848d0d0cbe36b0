//! Repository configuration
//!
//! Read once when a repository is opened. Stored as pretty JSON; `save`
//! writes a temp file next to the target and renames it into place.

use crate::error::{CmisError, Result};
use crate::types::{TypeDefinition, TypeRegistry, TypeRegistryBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Which ACL propagation modes the repository accepts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AclPropagationSupport {
    ObjectOnly,
    Propagate,
    /// Both modes are accepted and the repository picks when asked
    #[default]
    RepositoryDetermined,
}

impl FromStr for AclPropagationSupport {
    type Err = CmisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "object-only" => Ok(Self::ObjectOnly),
            "propagate" => Ok(Self::Propagate),
            "repository-determined" => Ok(Self::RepositoryDetermined),
            other => Err(CmisError::Config(format!(
                "Unknown ACL propagation support: {}",
                other
            ))),
        }
    }
}

/// Optional repository capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default = "default_true")]
    pub multifiling: bool,
    #[serde(default = "default_true")]
    pub unfiling: bool,
    #[serde(default)]
    pub acl_propagation: AclPropagationSupport,
}

fn default_true() -> bool {
    true
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            multifiling: true,
            unfiling: true,
            acl_propagation: AclPropagationSupport::RepositoryDetermined,
        }
    }
}

/// Repository configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub repository_id: String,
    #[serde(default)]
    pub repository_name: String,
    #[serde(default)]
    pub description: String,
    /// Page size used when a request passes `max_items == 0`
    #[serde(default = "default_max_items")]
    pub default_max_items: usize,
    /// Retained change events; 0 keeps everything
    #[serde(default = "default_change_log_capacity")]
    pub change_log_capacity: usize,
    #[serde(default = "default_true")]
    pub content_copied_on_checkout: bool,
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Permission names accepted in ACEs besides the basic ones
    #[serde(default)]
    pub extra_permissions: Vec<String>,
    /// Custom types, registered on top of the base types in any order
    #[serde(default)]
    pub types: Vec<TypeDefinition>,
}

fn default_max_items() -> usize {
    100
}

fn default_change_log_capacity() -> usize {
    10_000
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            repository_id: "default".to_string(),
            repository_name: "Default Repository".to_string(),
            description: String::new(),
            default_max_items: default_max_items(),
            change_log_capacity: default_change_log_capacity(),
            content_copied_on_checkout: true,
            capabilities: Capabilities::default(),
            extra_permissions: Vec::new(),
            types: Vec::new(),
        }
    }
}

impl RepositoryConfig {
    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            CmisError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;
        let config: RepositoryConfig = serde_json::from_str(&data).map_err(|e| {
            CmisError::Config(format!("Failed to parse config {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save the config, replacing any existing file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Check scalar fields; the type forest is checked by `type_registry`.
    pub fn validate(&self) -> Result<()> {
        if self.repository_id.trim().is_empty() {
            return Err(CmisError::Config("repository_id cannot be empty".into()));
        }
        if self.default_max_items == 0 {
            return Err(CmisError::Config("default_max_items must be positive".into()));
        }
        if let Some(p) = self
            .extra_permissions
            .iter()
            .find(|p| p.trim().is_empty())
        {
            return Err(CmisError::Config(format!("Invalid permission name: {:?}", p)));
        }
        Ok(())
    }

    /// Build the type registry for this config
    pub fn type_registry(&self) -> Result<TypeRegistry> {
        TypeRegistryBuilder::new()
            .extend(self.types.iter().cloned())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseType;
    use tempfile::TempDir;

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("repository.json");

        let mut config = RepositoryConfig::default();
        config.repository_id = "test-repo".to_string();
        config.types.push(TypeDefinition::subtype(
            "acme:memo",
            "cmis:document",
            BaseType::Document,
        ));
        config.save(&path).unwrap();

        let loaded = RepositoryConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("repository.json");
        fs::write(&path, r#"{ "repository_id": "r1" }"#).unwrap();

        let loaded = RepositoryConfig::load(&path).unwrap();
        assert_eq!(loaded.default_max_items, 100);
        assert_eq!(loaded.change_log_capacity, 10_000);
        assert!(loaded.capabilities.multifiling);
        assert_eq!(
            loaded.capabilities.acl_propagation,
            AclPropagationSupport::RepositoryDetermined
        );
    }

    #[test]
    fn test_config_load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = RepositoryConfig::load(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, CmisError::Config(_)));
    }

    #[test]
    fn test_config_validate() {
        let mut config = RepositoryConfig::default();
        assert!(config.validate().is_ok());
        config.default_max_items = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_type_registry_from_config_out_of_order() {
        let mut config = RepositoryConfig::default();
        config.types.push(TypeDefinition::subtype("b", "a", BaseType::Folder));
        config.types.push(TypeDefinition::subtype("a", "cmis:folder", BaseType::Folder));
        let registry = config.type_registry().unwrap();
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_acl_propagation_support_parse() {
        assert_eq!(
            "propagate".parse::<AclPropagationSupport>().unwrap(),
            AclPropagationSupport::Propagate
        );
        assert!("sideways".parse::<AclPropagationSupport>().is_err());
    }
}
