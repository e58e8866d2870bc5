//! Place job: one listing's detail page.
//!
//! Yields the extracted entry directly, or hands it to a follow-up child
//! (email fetch of the listing's website, or company-registry enrichment)
//! in which case the entry travels inside the child and the place job
//! itself contributes nothing to the results.

use anyhow::{bail, Result};
use scraper::{Html, Selector};
use uuid::Uuid;

use super::{BodaccJob, CrawlJob, EmailJob, Entry, JobCore};
use crate::kernel::fetch::PageResponse;
use crate::kernel::jobs::JobPriority;

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceJob {
    pub core: JobCore,
    pub owner_id: String,
    pub organization_id: String,
    /// Whether this job's own entry should surface in results. Cleared on
    /// the wire when a child carries the entry instead.
    pub usage_in_results: bool,
    pub extract_email: bool,
    pub extract_bodacc: bool,
}

impl PlaceJob {
    pub const JOB_TYPE: &'static str = "place";

    const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(
        parent_id: Uuid,
        lang_code: &str,
        url: &str,
        owner_id: &str,
        organization_id: &str,
        extract_email: bool,
        extract_bodacc: bool,
    ) -> Self {
        let core = JobCore::new(
            url.to_string(),
            JobPriority::Normal,
            Self::DEFAULT_MAX_RETRIES,
        )
        .with_parent(parent_id)
        .with_param("hl", lang_code);

        Self {
            core,
            owner_id: owner_id.to_string(),
            organization_id: organization_id.to_string(),
            usage_in_results: true,
            extract_email,
            extract_bodacc,
        }
    }

    pub fn process(&self, resp: &PageResponse) -> Result<(Option<Entry>, Vec<CrawlJob>)> {
        if let Some(err) = &resp.error {
            bail!("place fetch failed: {err}");
        }

        let mut entry = match &resp.meta {
            Some(payload) => match Entry::from_place_payload(payload) {
                Some(entry) => entry,
                None => bail!("malformed place payload"),
            },
            None => entry_from_html(&resp.body),
        };

        entry.id = self
            .core
            .parent_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| self.core.id.to_string());

        if entry.link.is_empty() {
            entry.link = self.core.url.clone();
        }

        if self.extract_email && entry.is_website_valid_for_email() {
            let child = EmailJob::new(
                self.core.id,
                entry,
                &self.owner_id,
                &self.organization_id,
                self.extract_bodacc,
            );
            return Ok((None, vec![CrawlJob::Email(child)]));
        }

        if self.extract_bodacc && !entry.title.is_empty() && !entry.address.is_empty() {
            let title = entry.title.clone();
            let address = entry.address.clone();
            let child = BodaccJob::new(
                Some(self.core.id),
                &title,
                &address,
                &self.owner_id,
                &self.organization_id,
                entry,
            );
            return Ok((None, vec![CrawlJob::Bodacc(child)]));
        }

        if !self.usage_in_results {
            return Ok((None, vec![]));
        }

        Ok((Some(entry), vec![]))
    }
}

/// Degraded extraction used when the page-automation layer attached no
/// structured payload: title and canonical link only.
fn entry_from_html(body: &str) -> Entry {
    let doc = Html::parse_document(body);
    let mut entry = Entry::default();

    let h1 = Selector::parse("h1").unwrap();
    if let Some(el) = doc.select(&h1).next() {
        entry.title = el.text().collect::<String>().trim().to_string();
    }
    if entry.title.is_empty() {
        let title = Selector::parse("title").unwrap();
        if let Some(el) = doc.select(&title).next() {
            entry.title = el.text().collect::<String>().trim().to_string();
        }
    }

    let canonical = Selector::parse("link[rel=\"canonical\"]").unwrap();
    if let Some(el) = doc.select(&canonical).next() {
        if let Some(href) = el.value().attr("href") {
            entry.link = href.to_string();
        }
    }

    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok_response(meta: serde_json::Value) -> PageResponse {
        PageResponse {
            url: "https://www.google.com/maps/place/x".to_string(),
            status: 200,
            body: String::new(),
            meta: Some(meta),
            error: None,
        }
    }

    #[test]
    fn entry_falls_back_to_job_url_for_link() {
        let job = PlaceJob::new(Uuid::new_v4(), "en", "https://maps/p/1", "u", "", false, false);
        let (data, children) = job
            .process(&ok_response(json!({"name": "Cafe"})))
            .unwrap();

        let entry = data.unwrap();
        assert!(children.is_empty());
        assert_eq!(entry.link, "https://maps/p/1");
        assert_eq!(entry.id, job.core.parent_id.unwrap().to_string());
    }

    #[test]
    fn email_fan_out_moves_entry_into_child() {
        let job = PlaceJob::new(Uuid::new_v4(), "en", "https://maps/p/1", "u", "o", true, false);
        let (data, children) = job
            .process(&ok_response(json!({
                "name": "Cafe",
                "website": "https://cafe.example.org",
            })))
            .unwrap();

        assert!(data.is_none());
        assert_eq!(children.len(), 1);
        match &children[0] {
            CrawlJob::Email(email) => {
                assert_eq!(email.core.parent_id, Some(job.core.id));
                assert_eq!(email.core.url, "https://cafe.example.org");
                assert_eq!(email.entry.title, "Cafe");
            }
            other => panic!("expected email child, got {other:?}"),
        }
    }

    #[test]
    fn bodacc_fan_out_when_no_email_requested() {
        let job = PlaceJob::new(Uuid::new_v4(), "fr", "https://maps/p/1", "u", "o", false, true);
        let (data, children) = job
            .process(&ok_response(json!({
                "name": "Boulangerie",
                "address": "1 Rue Test, Lyon",
            })))
            .unwrap();

        assert!(data.is_none());
        assert!(matches!(children[0], CrawlJob::Bodacc(_)));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let job = PlaceJob::new(Uuid::new_v4(), "en", "https://maps/p/1", "", "", false, false);
        assert!(job.process(&ok_response(json!(42))).is_err());
    }

    #[test]
    fn html_fallback_extracts_title() {
        let job = PlaceJob::new(Uuid::new_v4(), "en", "https://maps/p/1", "", "", false, false);
        let resp = PageResponse {
            url: "https://maps/p/1".to_string(),
            status: 200,
            body: "<html><head><title>ignored</title></head><body><h1>The Spot</h1></body></html>"
                .to_string(),
            meta: None,
            error: None,
        };
        let (data, _) = job.process(&resp).unwrap();
        assert_eq!(data.unwrap().title, "The Spot");
    }
}
