//! Naming configuration via `nomen.toml`
//!
//! Every field has a default, so an empty or missing file yields the built-in
//! behavior. Entity profiles declared in the file are merged over the
//! built-in `Customer` and `Supplier` profiles, by entity type name.

use serde::{Deserialize, Serialize};
use std::path::Path;

use nomen_core::limits::{DEFAULT_BATCH_SIZE, DEFAULT_INITIAL_VALUE, DEFAULT_PADDING};
use nomen_core::{EntityType, Error, Result};

/// Config file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "nomen.toml";

/// How one entity type is named
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProfile {
    /// Entity type (table) name, e.g. `Customer`
    #[serde(rename = "name")]
    pub entity_type: EntityType,
    /// Series key tag, e.g. `CUST`
    pub type_tag: String,
    /// Field holding the display name, e.g. `customer_name`
    pub name_field: String,
    /// Field holding the owning group
    #[serde(default = "default_group_field")]
    pub group_field: String,
}

fn default_group_field() -> String {
    "company".to_string()
}

impl EntityProfile {
    /// Create a profile
    pub fn new(
        entity_type: impl Into<EntityType>,
        type_tag: impl Into<String>,
        name_field: impl Into<String>,
        group_field: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            type_tag: type_tag.into(),
            name_field: name_field.into(),
            group_field: group_field.into(),
        }
    }

    /// Built-in `Customer` profile
    pub fn customer() -> Self {
        Self::new("Customer", "CUST", "customer_name", "company")
    }

    /// Built-in `Supplier` profile
    pub fn supplier() -> Self {
        Self::new("Supplier", "SUPP", "supplier_name", "company")
    }
}

/// Naming configuration loaded from `nomen.toml`.
///
/// # Example
///
/// ```toml
/// padding = 3
/// batch_size = 100
///
/// [[entity]]
/// name = "Lead"
/// type_tag = "LEAD"
/// name_field = "lead_name"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NomenConfig {
    /// Minimum digits in a sequence number
    #[serde(default = "default_padding")]
    pub padding: usize,
    /// Records per page and per checkpoint during migration
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// First value of a fresh series
    #[serde(default = "default_initial_value")]
    pub initial_value: i64,
    /// Group used when an entity names none; overrides the dataset default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_group: Option<String>,
    /// Additional or overriding entity profiles
    #[serde(default, rename = "entity", skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<EntityProfile>,
}

fn default_padding() -> usize {
    DEFAULT_PADDING
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_initial_value() -> i64 {
    DEFAULT_INITIAL_VALUE
}

impl Default for NomenConfig {
    fn default() -> Self {
        Self {
            padding: default_padding(),
            batch_size: default_batch_size(),
            initial_value: default_initial_value(),
            default_group: None,
            entities: Vec::new(),
        }
    }
}

impl NomenConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Nomen naming configuration
#
# Minimum digits in the sequence part of an identifier (default: 3).
# Longer numbers are never truncated: 999 is followed by 1000.
padding = 3

# Records per page and per checkpoint during migration (default: 100).
batch_size = 100

# First number handed out by a fresh series (default: 1).
initial_value = 1

# Group used when an entity names none. Falls back to the dataset's
# default group when unset.
# default_group = "Acme Inc"

# Extra entity types. Built-ins: Customer (CUST), Supplier (SUPP).
# [[entity]]
# name = "Lead"
# type_tag = "LEAD"
# name_field = "lead_name"
# group_field = "company"        # optional, default "company"
"#
    }

    /// Parse config from TOML text and validate it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the text cannot be parsed or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: NomenConfig = toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Check value ranges and profile fields.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.padding == 0 {
            return Err(Error::InvalidConfig("padding must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.initial_value < 0 {
            return Err(Error::InvalidConfig(
                "initial_value must not be negative".into(),
            ));
        }
        for profile in &self.entities {
            if profile.type_tag.trim().is_empty() || profile.name_field.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "entity '{}' needs a type_tag and a name_field",
                    profile.entity_type
                )));
            }
        }
        Ok(())
    }

    /// All known profiles: built-ins overridden by configured entries
    pub fn profiles(&self) -> Vec<EntityProfile> {
        let mut profiles = vec![EntityProfile::customer(), EntityProfile::supplier()];
        for custom in &self.entities {
            match profiles
                .iter_mut()
                .find(|p| p.entity_type == custom.entity_type)
            {
                Some(existing) => *existing = custom.clone(),
                None => profiles.push(custom.clone()),
            }
        }
        profiles
    }

    /// Profile for an entity type name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType` if no profile matches.
    pub fn profile(&self, entity_type: &str) -> Result<EntityProfile> {
        self.profiles()
            .into_iter()
            .find(|p| p.entity_type.as_str() == entity_type)
            .ok_or_else(|| Error::UnknownEntityType(entity_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_toml_parses_to_defaults() {
        let config = NomenConfig::from_toml_str(NomenConfig::default_toml()).unwrap();
        assert_eq!(config, NomenConfig::default());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = NomenConfig::from_toml_str("").unwrap();
        assert_eq!(config.padding, 3);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.initial_value, 1);
    }

    #[test]
    fn test_builtin_profiles() {
        let config = NomenConfig::default();
        let customer = config.profile("Customer").unwrap();
        assert_eq!(customer.type_tag, "CUST");
        assert_eq!(customer.name_field, "customer_name");
        assert_eq!(config.profile("Supplier").unwrap().type_tag, "SUPP");
        assert!(matches!(
            config.profile("Lead"),
            Err(Error::UnknownEntityType(_))
        ));
    }

    #[test]
    fn test_custom_profiles_merge_over_builtins() {
        let config = NomenConfig::from_toml_str(
            r#"
            [[entity]]
            name = "Lead"
            type_tag = "LEAD"
            name_field = "lead_name"

            [[entity]]
            name = "Customer"
            type_tag = "CLI"
            name_field = "customer_name"
            group_field = "branch"
            "#,
        )
        .unwrap();
        assert_eq!(config.profiles().len(), 3);
        assert_eq!(config.profile("Lead").unwrap().group_field, "company");
        let customer = config.profile("Customer").unwrap();
        assert_eq!(customer.type_tag, "CLI");
        assert_eq!(customer.group_field, "branch");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(NomenConfig::from_toml_str("padding = 0").is_err());
        assert!(NomenConfig::from_toml_str("batch_size = 0").is_err());
        assert!(NomenConfig::from_toml_str("padding = \"three\"").is_err());
        assert!(NomenConfig::from_toml_str(
            "[[entity]]\nname = \"Lead\"\ntype_tag = \"\"\nname_field = \"lead_name\""
        )
        .is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "padding = 5\ndefault_group = \"Acme Inc\"").unwrap();
        let config = NomenConfig::from_file(&path).unwrap();
        assert_eq!(config.padding, 5);
        assert_eq!(config.default_group.as_deref(), Some("Acme Inc"));

        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            NomenConfig::from_file(&missing),
            Err(Error::InvalidConfig(_))
        ));
    }
}
