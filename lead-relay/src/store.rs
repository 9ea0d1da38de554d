//! Configuration store.
//!
//! Holds the active `{page, forms, webhook URL, access token}` tuple produced
//! by the setup flow. Writes replace the whole configuration behind an `Arc`,
//! so a reader holding a snapshot never observes a half-written value.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use url::Url;

use crate::error::RelayError;

/// A lead form selected during setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormConfig {
    pub id: String,
    pub name: String,
}

/// Validated relay configuration.
///
/// Invariants: `forms` is non-empty, `webhook_url` is an absolute http(s)
/// URL, `access_token` is non-empty.
#[derive(Clone, PartialEq)]
pub struct Configuration {
    page_id: String,
    page_name: String,
    forms: Vec<FormConfig>,
    webhook_url: Url,
    access_token: String,
}

impl Configuration {
    pub fn new(
        page_id: impl Into<String>,
        page_name: impl Into<String>,
        forms: Vec<FormConfig>,
        webhook_url: &str,
        access_token: impl Into<String>,
    ) -> Result<Self, RelayError> {
        let page_id = page_id.into();
        let access_token = access_token.into();

        if page_id.trim().is_empty() {
            return Err(RelayError::InvalidConfiguration("page id is empty".into()));
        }
        if forms.is_empty() {
            return Err(RelayError::InvalidConfiguration(
                "at least one form is required".into(),
            ));
        }
        if access_token.trim().is_empty() {
            return Err(RelayError::InvalidConfiguration("access token is empty".into()));
        }

        Ok(Self {
            page_id,
            page_name: page_name.into(),
            forms,
            webhook_url: parse_webhook_url(webhook_url)?,
            access_token,
        })
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    pub fn page_name(&self) -> &str {
        &self.page_name
    }

    pub fn forms(&self) -> &[FormConfig] {
        &self.forms
    }

    pub fn webhook_url(&self) -> &Url {
        &self.webhook_url
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Whether a lead from `form_id` belongs to this configuration.
    ///
    /// A change without a form id, or with an empty one, is accepted.
    pub fn accepts_form(&self, form_id: Option<&str>) -> bool {
        match form_id.filter(|id| !id.is_empty()) {
            Some(id) => self.forms.iter().any(|f| f.id == id),
            None => true,
        }
    }

    pub fn form_name(&self, form_id: &str) -> Option<&str> {
        self.forms
            .iter()
            .find(|f| f.id == form_id)
            .map(|f| f.name.as_str())
    }

    /// The only configured form, when exactly one is configured.
    pub fn single_form(&self) -> Option<&FormConfig> {
        match self.forms.as_slice() {
            [form] => Some(form),
            _ => None,
        }
    }

    /// Serializable view without the access token.
    pub fn redacted(&self) -> ConfigurationView<'_> {
        ConfigurationView {
            page_id: &self.page_id,
            page_name: &self.page_name,
            forms: &self.forms,
            webhook_url: self.webhook_url.as_str(),
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("page_id", &self.page_id)
            .field("page_name", &self.page_name)
            .field("forms", &self.forms)
            .field("webhook_url", &self.webhook_url.as_str())
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationView<'a> {
    pub page_id: &'a str,
    pub page_name: &'a str,
    pub forms: &'a [FormConfig],
    pub webhook_url: &'a str,
}

/// Parse a user-supplied destination into an absolute http(s) URL.
pub fn parse_webhook_url(raw: &str) -> Result<Url, RelayError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| RelayError::InvalidConfiguration(format!("webhook URL: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(RelayError::InvalidConfiguration(format!(
            "webhook URL must be an absolute http(s) URL: {}",
            raw
        )));
    }

    Ok(url)
}

/// Holder of the active configuration.
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    /// Snapshot of the current configuration, if any.
    async fn get(&self) -> Option<Arc<Configuration>>;

    /// Replace the configuration wholesale.
    async fn set(&self, configuration: Configuration);

    async fn clear(&self);
}

/// Process-memory store; contents are lost on restart.
#[derive(Default)]
pub struct InMemoryConfigurationStore {
    current: RwLock<Option<Arc<Configuration>>>,
}

impl InMemoryConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigurationStore for InMemoryConfigurationStore {
    async fn get(&self) -> Option<Arc<Configuration>> {
        self.current.read().await.clone()
    }

    async fn set(&self, configuration: Configuration) {
        info!(
            page_id = %configuration.page_id(),
            page_name = %configuration.page_name(),
            form_count = configuration.forms().len(),
            webhook_url = %configuration.webhook_url(),
            "configuration_stored"
        );

        *self.current.write().await = Some(Arc::new(configuration));
    }

    async fn clear(&self) {
        *self.current.write().await = None;
        info!("configuration_cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(id: &str, name: &str) -> FormConfig {
        FormConfig {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn sample() -> Configuration {
        Configuration::new(
            "page-1",
            "Bakery",
            vec![form("f1", "Spring promo"), form("f2", "Catering")],
            "https://hooks.example.com/leads",
            "page-token",
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_empty_forms() {
        let err = Configuration::new("p", "n", vec![], "https://a.example", "t");
        assert!(matches!(err, Err(RelayError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_rejects_relative_webhook_url() {
        let err = Configuration::new("p", "n", vec![form("f", "F")], "/leads", "t");
        assert!(matches!(err, Err(RelayError::InvalidConfiguration(_))));

        let err = Configuration::new("p", "n", vec![form("f", "F")], "ftp://host/x", "t");
        assert!(matches!(err, Err(RelayError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_rejects_empty_access_token() {
        let err = Configuration::new("p", "n", vec![form("f", "F")], "https://a.example", " ");
        assert!(matches!(err, Err(RelayError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_form_matching() {
        let config = sample();

        assert!(config.accepts_form(Some("f2")));
        assert!(!config.accepts_form(Some("f3")));
        assert!(config.accepts_form(None));
        assert!(config.accepts_form(Some("")));
        assert_eq!(config.form_name("f1"), Some("Spring promo"));
        assert!(config.single_form().is_none());
    }

    #[test]
    fn test_debug_and_view_hide_token() {
        let config = sample();

        assert!(!format!("{:?}", config).contains("page-token"));
        let view = serde_json::to_value(config.redacted()).unwrap();
        assert_eq!(view["pageId"], "page-1");
        assert!(view.get("accessToken").is_none());
    }

    #[tokio::test]
    async fn test_store_set_get_clear() {
        let store = InMemoryConfigurationStore::new();
        assert!(store.get().await.is_none());

        store.set(sample()).await;
        let snapshot = store.get().await.unwrap();
        assert_eq!(snapshot.page_id(), "page-1");

        let replacement = Configuration::new(
            "page-2",
            "Florist",
            vec![form("f9", "Weddings")],
            "https://other.example.com/hook",
            "token-2",
        )
        .unwrap();
        store.set(replacement).await;

        // Earlier snapshot is unaffected by the replacement.
        assert_eq!(snapshot.page_id(), "page-1");
        assert_eq!(store.get().await.unwrap().page_id(), "page-2");

        store.clear().await;
        assert!(store.get().await.is_none());
    }
}
