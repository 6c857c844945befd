//! DOI and dispatcher settings

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// DOI issuance settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoiConfig {
    /// Registration prefix reserved for this deployment
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Public portal; registration targets are resolved against it
    #[serde(default = "default_portal_url")]
    pub portal_url: String,

    #[serde(default = "default_max_issue_attempts")]
    pub max_issue_attempts: u32,

    /// Datasets whose parent is listed here are never sent for registration
    #[serde(default)]
    pub dataset_parent_exclude_list: Vec<Uuid>,
}

impl Default for DoiConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            portal_url: default_portal_url(),
            max_issue_attempts: default_max_issue_attempts(),
            dataset_parent_exclude_list: Vec::new(),
        }
    }
}

/// Registration queue and worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Attempts per command before a transient authority failure is dropped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_prefix() -> String {
    "10.5072".to_string()
}

fn default_portal_url() -> String {
    "https://www.gbif.org/".to_string()
}

fn default_max_issue_attempts() -> u32 {
    1000
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_retries() -> u32 {
    4
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// Landing pages GBIF DOIs resolve to
#[derive(Debug, Clone)]
pub struct RegistrationTargets {
    dataset: Url,
    download: Url,
}

impl RegistrationTargets {
    /// Derive targets from the portal root (`<portal>/dataset/<key>`,
    /// `<portal>/occurrence/download/<key>`)
    pub fn from_portal(portal_url: &str) -> Result<Self, url::ParseError> {
        let mut portal = Url::parse(portal_url)?;
        if !portal.path().ends_with('/') {
            let path = format!("{}/", portal.path());
            portal.set_path(&path);
        }
        Ok(Self {
            dataset: portal.join("dataset/")?,
            download: portal.join("occurrence/download/")?,
        })
    }

    pub fn dataset(&self, key: &Uuid) -> Result<Url, url::ParseError> {
        self.dataset.join(&key.to_string())
    }

    pub fn download(&self, key: &str) -> Result<Url, url::ParseError> {
        self.download.join(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_resolved_under_the_portal() {
        let targets = RegistrationTargets::from_portal("https://www.gbif-uat.org").unwrap();
        let key = Uuid::nil();

        assert_eq!(
            targets.dataset(&key).unwrap().as_str(),
            "https://www.gbif-uat.org/dataset/00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            targets.download("0000001-200101").unwrap().as_str(),
            "https://www.gbif-uat.org/occurrence/download/0000001-200101"
        );
    }

    #[test]
    fn defaults_match_registry_conventions() {
        let doi = DoiConfig::default();
        assert_eq!(doi.prefix, "10.5072");
        assert_eq!(doi.max_issue_attempts, 1000);

        let dispatcher = DispatcherConfig::default();
        assert_eq!(dispatcher.max_retries, 4);
    }
}
