use crate::error::{Error, Result};
use crate::models::AccountConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub graph: GraphSettings,
    #[serde(default)]
    pub archive: ArchiveSettings,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphSettings {
    #[serde(default = "default_login_endpoint")]
    pub login_endpoint: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_secrets_file")]
    pub secrets_file: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveSettings {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub on_failure: ArchivePolicy,
}

/// What to do when a page cannot be archived. The permissive mode matches
/// the historical behavior; blocking refuses to delete anything whose
/// metadata was not captured first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchivePolicy {
    #[default]
    Advisory,
    Blocking,
}

fn default_login_endpoint() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_endpoint() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_secrets_file() -> String {
    "graph-secrets.json".to_string()
}

fn default_page_size() -> u32 {
    10
}

fn default_database_url() -> String {
    "sqlite:archive.db?mode=rwc".to_string()
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            login_endpoint: default_login_endpoint(),
            endpoint: default_endpoint(),
            secrets_file: default_secrets_file(),
            page_size: default_page_size(),
        }
    }
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            on_failure: ArchivePolicy::default(),
        }
    }
}

/// Service principal credentials, kept out of the settings file so the
/// settings can be committed while the secrets stay deployment-local.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphSecrets {
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub secret: String,
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            return Err(Error::Config("no accounts configured".into()));
        }
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.email.trim().is_empty() {
                return Err(Error::Config("account with empty email".into()));
            }
            if !seen.insert(account.email.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate account: {}",
                    account.email
                )));
            }
        }
        Ok(())
    }
}

impl GraphSecrets {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_days_default_to_thirty() {
        let settings: Settings = toml::from_str(
            r#"
            [[accounts]]
            email = "a@x.com"
            "#,
        )
        .unwrap();
        let account = &settings.accounts[0];
        assert_eq!(account.inbox_days, 30);
        assert_eq!(account.sent_days, 30);
        assert_eq!(account.deleted_days, 30);
        assert!(!account.require_attachment);
        assert!(!account.unread_only);
    }

    #[test]
    fn graph_and_archive_sections_are_optional() {
        let settings: Settings = toml::from_str(
            r#"
            [[accounts]]
            email = "a@x.com"
            "#,
        )
        .unwrap();
        assert_eq!(settings.graph.page_size, 10);
        assert_eq!(settings.archive.on_failure, ArchivePolicy::Advisory);
        settings.validate().unwrap();
    }

    #[test]
    fn blocking_policy_parses() {
        let settings: Settings = toml::from_str(
            r#"
            [archive]
            on_failure = "blocking"

            [[accounts]]
            email = "a@x.com"
            "#,
        )
        .unwrap();
        assert_eq!(settings.archive.on_failure, ArchivePolicy::Blocking);
    }

    #[test]
    fn duplicate_accounts_rejected() {
        let settings: Settings = toml::from_str(
            r#"
            [[accounts]]
            email = "a@x.com"

            [[accounts]]
            email = "a@x.com"
            "#,
        )
        .unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn empty_account_list_rejected() {
        let settings: Settings = toml::from_str("").unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn secrets_use_camel_case_keys() {
        let secrets: GraphSecrets = serde_json::from_str(
            r#"{"tenantId": "t", "clientId": "c", "secret": "s"}"#,
        )
        .unwrap();
        assert_eq!(secrets.tenant_id, "t");
        assert_eq!(secrets.client_id, "c");
    }
}
