//! Company-registry directory service.
//!
//! The trait is the contract the bodacc variant programs against; the
//! bundled client talks to the public BODACC announcements API. Both are
//! replaceable per process.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::domains::gmaps::CompanyInfo;

#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Look a company up by name and address. `Ok(None)` when the registry
    /// has no match.
    async fn search_company(&self, name: &str, address: &str) -> Result<Option<CompanyInfo>>;
}

const DEFAULT_BASE_URL: &str =
    "https://bodacc-datadila.opendatasoft.com/api/records/1.0/search/";

pub struct BodaccClient {
    http: reqwest::Client,
    base_url: String,
}

impl BodaccClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("failed to create registry HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    fn company_from_record(record: &Value) -> Option<CompanyInfo> {
        let fields = record.get("fields")?;
        let get = |key: &str| {
            fields
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let national_id = get("registre")
            .split(',')
            .next_back()
            .unwrap_or_default()
            .trim()
            .replace(' ', "");
        if national_id.is_empty() {
            return None;
        }

        let mut info = CompanyInfo {
            legal_form: get("commercant"),
            created: get("dateparution"),
            national_id: national_id.clone(),
            registry_link: format!("https://www.pappers.fr/entreprise/{national_id}"),
            diffusion: true,
            ..Default::default()
        };

        // Person listings are themselves JSON-encoded in the record.
        if let Some(raw) = fields.get("listepersonnes").and_then(|v| v.as_str()) {
            if let Ok(people) = serde_json::from_str::<Value>(raw) {
                if let Some(form) = people
                    .pointer("/personne/formeJuridique")
                    .and_then(|v| v.as_str())
                {
                    info.legal_form = form.to_string();
                }
                if let Some(name) = people
                    .pointer("/personne/denomination")
                    .and_then(|v| v.as_str())
                {
                    if info.legal_form.is_empty() {
                        info.legal_form = name.to_string();
                    }
                }
            }
        }

        Some(info)
    }
}

#[async_trait]
impl DirectoryService for BodaccClient {
    async fn search_company(&self, name: &str, address: &str) -> Result<Option<CompanyInfo>> {
        let query = if address.is_empty() {
            name.to_string()
        } else {
            format!("{name} {address}")
        };

        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("dataset", "annonces-commerciales"),
                ("q", query.as_str()),
                ("rows", "5"),
            ])
            .send()
            .await
            .context("registry request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("registry returned status {}", response.status());
        }

        let payload: Value = response
            .json()
            .await
            .context("registry response was not JSON")?;

        let records = payload
            .get("records")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let company = records.iter().find_map(Self::company_from_record);
        debug!(
            company = %name,
            matched = company.is_some(),
            candidates = records.len(),
            "registry search finished"
        );

        Ok(company)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_with_registre_becomes_company() {
        let record = json!({
            "fields": {
                "registre": "123 456 789,123456789",
                "commercant": "CAFE MONO",
                "dateparution": "2024-05-01",
                "listepersonnes": "{\"personne\":{\"denomination\":\"CAFE MONO\",\"formeJuridique\":\"SARL\"}}",
            }
        });

        let info = BodaccClient::company_from_record(&record).unwrap();
        assert_eq!(info.national_id, "123456789");
        assert_eq!(info.legal_form, "SARL");
        assert!(info.registry_link.ends_with("/123456789"));
    }

    #[test]
    fn record_without_registre_is_skipped() {
        let record = json!({"fields": {"commercant": "X"}});
        assert!(BodaccClient::company_from_record(&record).is_none());
    }
}
