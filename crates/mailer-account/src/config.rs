//! Account configuration.
//!
//! Each protocol publishes an ordered list of named, typed entries. Hosts
//! render the list as a settings form and write values back by name.
//! Values are checked against the entry type on assignment.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Type of a configuration entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKind {
    /// Free text.
    String,
    /// Secret text, never logged.
    Password,
    /// Path of a local file.
    FilePath,
    /// TCP port.
    Port,
    /// On/off switch.
    Boolean,
    /// Visual separator with no value.
    Separator,
}

/// Value of a configuration entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// A boolean.
    Boolean(bool),
    /// A port number.
    Port(u16),
    /// A string.
    String(String),
    /// No value.
    #[default]
    None,
}

impl ConfigValue {
    fn fits(&self, kind: ConfigKind) -> bool {
        match (kind, self) {
            (_, Self::None) => true,
            (ConfigKind::String | ConfigKind::Password | ConfigKind::FilePath, Self::String(_))
            | (ConfigKind::Port, Self::Port(_))
            | (ConfigKind::Boolean, Self::Boolean(_)) => true,
            _ => false,
        }
    }
}

/// One named, typed configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Key used by the engine, empty for separators.
    pub name: String,
    /// Label shown to the user.
    pub title: String,
    /// Entry type.
    pub kind: ConfigKind,
    /// Current value.
    #[serde(default)]
    pub value: ConfigValue,
}

impl ConfigEntry {
    /// Creates an entry with a default value.
    #[must_use]
    pub fn new(name: &str, title: &str, kind: ConfigKind, value: ConfigValue) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            kind,
            value,
        }
    }

    /// Creates a separator entry.
    #[must_use]
    pub fn separator() -> Self {
        Self::new("", "", ConfigKind::Separator, ConfigValue::None)
    }
}

/// Ordered account configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    entries: Vec<ConfigEntry>,
}

impl Config {
    /// Creates a configuration from its entries.
    #[must_use]
    pub const fn new(entries: Vec<ConfigEntry>) -> Self {
        Self { entries }
    }

    /// Entries in display order.
    #[must_use]
    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }

    /// Returns the value of an entry.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.entry(name).map(|e| &e.value)
    }

    /// Returns a non-empty string value.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            ConfigValue::String(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// Returns a port value.
    #[must_use]
    pub fn get_port(&self, name: &str) -> Option<u16> {
        match self.get(name)? {
            ConfigValue::Port(port) => Some(*port),
            _ => None,
        }
    }

    /// Returns a boolean value, false when unset.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> bool {
        matches!(self.get(name), Some(ConfigValue::Boolean(true)))
    }

    /// Assigns a value to an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the entry does not exist or the value
    /// does not match its type.
    pub fn set(&mut self, name: &str, value: ConfigValue) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.kind != ConfigKind::Separator && e.name == name)
            .ok_or_else(|| Error::Config(format!("unknown setting {name:?}")))?;
        if !value.fits(entry.kind) {
            return Err(Error::Config(format!(
                "setting {name:?} expects a {:?} value",
                entry.kind
            )));
        }
        if entry.kind == ConfigKind::Password {
            tracing::debug!(name, "setting updated (redacted)");
        } else {
            tracing::debug!(name, ?value, "setting updated");
        }
        entry.value = value;
        Ok(())
    }

    /// Assigns a value parsed from text according to the entry type.
    ///
    /// Empty text clears the entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the entry does not exist or the text
    /// cannot be parsed.
    pub fn set_str(&mut self, name: &str, text: &str) -> Result<()> {
        let kind = self
            .entry(name)
            .map(|e| e.kind)
            .ok_or_else(|| Error::Config(format!("unknown setting {name:?}")))?;
        let value = if text.is_empty() {
            ConfigValue::None
        } else {
            match kind {
                ConfigKind::Port => text
                    .parse()
                    .map(ConfigValue::Port)
                    .map_err(|_| Error::Config(format!("invalid port {text:?}")))?,
                ConfigKind::Boolean => match text.to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => ConfigValue::Boolean(true),
                    "0" | "false" | "no" | "off" => ConfigValue::Boolean(false),
                    _ => return Err(Error::Config(format!("invalid boolean {text:?}"))),
                },
                _ => ConfigValue::String(text.to_string()),
            }
        };
        self.set(name, value)
    }

    fn entry(&self, name: &str) -> Option<&ConfigEntry> {
        self.entries
            .iter()
            .find(|e| e.kind != ConfigKind::Separator && e.name == name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config::new(vec![
            ConfigEntry::new("username", "Username", ConfigKind::String, ConfigValue::None),
            ConfigEntry::new("password", "Password", ConfigKind::Password, ConfigValue::None),
            ConfigEntry::separator(),
            ConfigEntry::new("port", "Port", ConfigKind::Port, ConfigValue::Port(143)),
            ConfigEntry::new("ssl", "Use SSL", ConfigKind::Boolean, ConfigValue::Boolean(false)),
        ])
    }

    #[test]
    fn test_defaults() {
        let config = sample();
        assert_eq!(config.get_port("port"), Some(143));
        assert!(!config.get_bool("ssl"));
        assert_eq!(config.get_str("username"), None);
        assert_eq!(config.entries().len(), 5);
    }

    #[test]
    fn test_set_checks_kind() {
        let mut config = sample();
        config.set("port", ConfigValue::Port(993)).unwrap();
        config.set("ssl", ConfigValue::Boolean(true)).unwrap();
        assert_eq!(config.get_port("port"), Some(993));
        assert!(config.get_bool("ssl"));

        assert!(matches!(
            config.set("port", ConfigValue::String("993".into())),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config.set("hostname", ConfigValue::None),
            Err(Error::Config(_))
        ));
        assert!(config.set("", ConfigValue::None).is_err());
    }

    #[test]
    fn test_set_str_parses() {
        let mut config = sample();
        config.set_str("port", "995").unwrap();
        config.set_str("ssl", "yes").unwrap();
        config.set_str("username", "joe").unwrap();
        assert_eq!(config.get_port("port"), Some(995));
        assert!(config.get_bool("ssl"));
        assert_eq!(config.get_str("username"), Some("joe"));

        assert!(config.set_str("port", "99999").is_err());
        assert!(config.set_str("ssl", "maybe").is_err());

        config.set_str("username", "").unwrap();
        assert_eq!(config.get("username"), Some(&ConfigValue::None));
    }

    #[test]
    fn test_json_values() {
        let value: ConfigValue = serde_json::from_str("993").unwrap();
        assert_eq!(value, ConfigValue::Port(993));
        let value: ConfigValue = serde_json::from_str("true").unwrap();
        assert_eq!(value, ConfigValue::Boolean(true));
        let value: ConfigValue = serde_json::from_str("\"imap.example.com\"").unwrap();
        assert_eq!(value, ConfigValue::String("imap.example.com".into()));
        let value: ConfigValue = serde_json::from_str("null").unwrap();
        assert_eq!(value, ConfigValue::None);
    }
}
