//! Extracted listing record and company-registry data.

use serde::{Deserialize, Serialize};
use url::Url;

/// Company-registry fields attached to a listing after enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    #[serde(default)]
    pub directors: Vec<String>,
    #[serde(default)]
    pub legal_form: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub closed: String,
    /// National company identifier (SIREN-like).
    #[serde(default)]
    pub national_id: String,
    /// Link to the registry page for this company.
    #[serde(default)]
    pub registry_link: String,
    /// Whether the registry allows diffusion of the record.
    #[serde(default)]
    pub diffusion: bool,
}

impl CompanyInfo {
    /// The cache only considers rows that actually carry registry data.
    pub fn is_empty(&self) -> bool {
        self.directors.is_empty() && self.national_id.is_empty()
    }
}

/// One extracted listing. Flows from `process` to the result writer and, for
/// the email/bodacc/pappers variants, travels inside the job envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Id of the listing's place job lineage.
    #[serde(default)]
    pub id: String,
    /// Canonical URL of the listing. Dedup key together with the tenant.
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub company: CompanyInfo,
}

impl Entry {
    /// Whether the listing's website is worth a follow-up email fetch.
    pub fn is_website_valid_for_email(&self) -> bool {
        if self.website.is_empty() {
            return false;
        }

        match Url::parse(&self.website) {
            Ok(url) => {
                matches!(url.scheme(), "http" | "https") && url.host_str().is_some()
            }
            Err(_) => false,
        }
    }

    /// Build an entry from the structured payload the page-automation layer
    /// attaches to a place fetch. Unknown keys are ignored.
    pub fn from_place_payload(payload: &serde_json::Value) -> Option<Self> {
        let obj = payload.as_object()?;

        let mut entry = Entry::default();
        let get = |key: &str| {
            obj.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        entry.title = get("name");
        entry.address = get("address");
        entry.phone = get("phone");
        entry.website = get("website");
        entry.link = get("link");

        if let Some(categories) = obj.get("categories").and_then(|v| v.as_array()) {
            entry.categories = categories
                .iter()
                .filter_map(|c| c.as_str())
                .map(str::to_string)
                .collect();
            if let Some(first) = entry.categories.first() {
                entry.category = first.clone();
            }
        }

        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn website_validity() {
        let mut entry = Entry::default();
        assert!(!entry.is_website_valid_for_email());

        entry.website = "https://example.org/contact".to_string();
        assert!(entry.is_website_valid_for_email());

        entry.website = "ftp://example.org".to_string();
        assert!(!entry.is_website_valid_for_email());

        entry.website = "not a url".to_string();
        assert!(!entry.is_website_valid_for_email());
    }

    #[test]
    fn entry_from_place_payload() {
        let payload = json!({
            "name": "Boulangerie Martin",
            "address": "12 Rue de la Paix, Paris",
            "phone": "+33 1 23 45 67 89",
            "website": "https://boulangerie-martin.fr",
            "link": "https://maps.example.com/place/abc",
            "categories": ["Bakery", "Cafe"],
        });

        let entry = Entry::from_place_payload(&payload).unwrap();
        assert_eq!(entry.title, "Boulangerie Martin");
        assert_eq!(entry.category, "Bakery");
        assert_eq!(entry.categories.len(), 2);
        assert_eq!(entry.link, "https://maps.example.com/place/abc");
    }

    #[test]
    fn entry_from_non_object_payload_is_none() {
        assert!(Entry::from_place_payload(&json!("just a string")).is_none());
    }

    #[test]
    fn company_info_emptiness() {
        let mut info = CompanyInfo::default();
        assert!(info.is_empty());

        info.national_id = "123456789".to_string();
        assert!(!info.is_empty());
    }

    #[test]
    fn entry_round_trips_through_json() {
        let entry = Entry {
            id: "abc".to_string(),
            link: "https://x/1".to_string(),
            title: "T".to_string(),
            emails: vec!["a@b.c".to_string()],
            company: CompanyInfo {
                directors: vec!["Jane Doe".to_string()],
                national_id: "987654321".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let value = serde_json::to_value(&entry).unwrap();
        let back: Entry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }
}
