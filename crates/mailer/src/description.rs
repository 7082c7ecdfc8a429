//! Account description file.
//!
//! ```json
//! {
//!   "type": "imap4",
//!   "settings": {
//!     "hostname": "imap.example.com",
//!     "port": 993,
//!     "ssl": true,
//!     "username": "joe"
//!   },
//!   "idle_delay_secs": 60,
//!   "remember_password": true
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use mailer_account::{AccountBackend, AccountKind, ConfigValue, Settings};
use serde::{Deserialize, Serialize};

/// One account as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDescription {
    /// Protocol of the account.
    #[serde(rename = "type")]
    pub kind: AccountKind,
    /// Values for the protocol's configuration entries.
    #[serde(default)]
    pub settings: BTreeMap<String, ConfigValue>,
    /// Seconds of inactivity before a keepalive is sent.
    #[serde(default)]
    pub idle_delay_secs: Option<u64>,
    /// Store a password typed at the prompt in the system keyring.
    #[serde(default)]
    pub remember_password: bool,
}

impl AccountDescription {
    /// Default location of the description file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailer")
            .join("account.json")
    }

    /// Reads and parses a description file.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid account description in {}", path.display()))
    }

    /// Copies the settings into the account configuration.
    pub fn apply(&self, backend: &mut dyn AccountBackend) -> Result<()> {
        for (name, value) in &self.settings {
            backend
                .config_mut()
                .set(name, value.clone())
                .with_context(|| format!("setting {name:?}"))?;
        }
        Ok(())
    }

    /// Connection tunables.
    pub fn connection_settings(&self) -> Settings {
        let builder = Settings::builder();
        match self.idle_delay_secs {
            Some(secs) => builder.idle_delay(Duration::from_secs(secs)).build(),
            None => builder.build(),
        }
    }

    /// Key of the account's password in the system keyring.
    pub fn keyring_user(&self) -> String {
        format!(
            "{}:{}@{}",
            self.kind.id(),
            self.text("username"),
            self.text("hostname")
        )
    }

    fn text(&self, name: &str) -> &str {
        match self.settings.get(name) {
            Some(ConfigValue::String(value)) => value,
            _ => "",
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "imap4",
        "settings": {
            "hostname": "imap.example.com",
            "port": 993,
            "ssl": true,
            "username": "joe"
        },
        "idle_delay_secs": 60
    }"#;

    #[test]
    fn test_parse_description() {
        let description: AccountDescription = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(description.kind, AccountKind::Imap4);
        assert_eq!(
            description.settings.get("port"),
            Some(&ConfigValue::Port(993))
        );
        assert_eq!(
            description.settings.get("ssl"),
            Some(&ConfigValue::Boolean(true))
        );
        assert!(!description.remember_password);
        assert_eq!(
            description.connection_settings().idle_delay,
            Duration::from_secs(60)
        );
        assert_eq!(description.keyring_user(), "imap4:joe@imap.example.com");
    }

    #[test]
    fn test_apply_settings() {
        let description: AccountDescription = serde_json::from_str(SAMPLE).unwrap();
        let mut backend = description.kind.create(mailer_account::NoopHelper);
        description.apply(backend.as_mut()).unwrap();
        assert_eq!(backend.config().get_port("port"), Some(993));
        assert!(backend.config().get_bool("ssl"));
        assert_eq!(backend.config().get_str("prefix"), None);
    }

    #[test]
    fn test_apply_rejects_unknown_setting() {
        let description: AccountDescription =
            serde_json::from_str(r#"{"type": "pop3", "settings": {"prefix": "INBOX."}}"#)
                .unwrap();
        let mut backend = description.kind.create(mailer_account::NoopHelper);
        assert!(description.apply(backend.as_mut()).is_err());
    }

    #[test]
    fn test_unknown_type() {
        let parsed = serde_json::from_str::<AccountDescription>(r#"{"type": "smtp"}"#);
        assert!(parsed.is_err());
    }
}
