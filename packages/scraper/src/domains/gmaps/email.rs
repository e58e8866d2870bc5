//! Email job: fetch the listing's website and harvest contact addresses.
//!
//! The entry travels inside the job; a failed fetch still yields the entry
//! so the listing is not lost, just without emails.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use uuid::Uuid;

use super::{BodaccJob, CrawlJob, Entry, JobCore};
use crate::kernel::fetch::PageResponse;
use crate::kernel::jobs::JobPriority;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}").unwrap()
});

const EXCLUDED_DOMAINS: &[&str] = &["sentry", "example", "wix"];
const EXCLUDED_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp"];

#[derive(Debug, Clone, PartialEq)]
pub struct EmailJob {
    pub core: JobCore,
    pub owner_id: String,
    pub organization_id: String,
    pub entry: Entry,
    pub extract_bodacc: bool,
}

impl EmailJob {
    pub const JOB_TYPE: &'static str = "email";

    // Email fetches are single-shot.
    const DEFAULT_MAX_RETRIES: u32 = 0;

    pub fn new(
        parent_id: Uuid,
        entry: Entry,
        owner_id: &str,
        organization_id: &str,
        extract_bodacc: bool,
    ) -> Self {
        let core = JobCore::new(
            entry.website.clone(),
            JobPriority::High,
            Self::DEFAULT_MAX_RETRIES,
        )
        .with_parent(parent_id);

        Self {
            core,
            owner_id: owner_id.to_string(),
            organization_id: organization_id.to_string(),
            entry,
            extract_bodacc,
        }
    }

    pub fn process(&self, resp: &PageResponse) -> (Option<Entry>, Vec<CrawlJob>) {
        let mut entry = self.entry.clone();

        if resp.error.is_none() {
            entry.emails = extract_emails(&resp.body);
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
            return (None, vec![CrawlJob::Bodacc(child)]);
        }

        (Some(entry), vec![])
    }
}

/// mailto: anchors first, then a regex sweep of the raw body, deduplicated
/// in discovery order.
pub fn extract_emails(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut emails = Vec::new();

    let doc = Html::parse_document(body);
    let mailto = Selector::parse("a[href^=\"mailto:\"]").unwrap();
    for element in doc.select(&mailto) {
        if let Some(href) = element.value().attr("href") {
            let candidate = href
                .trim_start_matches("mailto:")
                .split('?')
                .next()
                .unwrap_or_default()
                .trim()
                .to_lowercase();
            if accept_email(&candidate) && seen.insert(candidate.clone()) {
                emails.push(candidate);
            }
        }
    }

    for m in EMAIL_RE.find_iter(body) {
        let candidate = m.as_str().trim().to_lowercase();
        if accept_email(&candidate) && seen.insert(candidate.clone()) {
            emails.push(candidate);
        }
    }

    emails
}

fn accept_email(candidate: &str) -> bool {
    if candidate.is_empty() || !candidate.contains('@') {
        return false;
    }
    if EXCLUDED_SUFFIXES.iter().any(|s| candidate.ends_with(s)) {
        return false;
    }
    let domain = candidate.rsplit('@').next().unwrap_or_default();
    if EXCLUDED_DOMAINS.iter().any(|d| domain.contains(d)) {
        return false;
    }
    EMAIL_RE
        .find(candidate)
        .is_some_and(|m| m.as_str() == candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_mailto_and_body_emails() {
        let body = r#"
            <html><body>
              <a href="mailto:Contact@Shop.example.org?subject=hi">write us</a>
              <p>or reach sales@shop.example.org directly</p>
            </body></html>
        "#;
        let emails = extract_emails(body);
        assert_eq!(
            emails,
            vec![
                "contact@shop.example.org".to_string(),
                "sales@shop.example.org".to_string(),
            ]
        );
    }

    #[test]
    fn filters_noise_addresses() {
        assert!(!accept_email("icon@2x.png"));
        assert!(!accept_email("abcdef@sentry.io"));
        assert!(!accept_email("user@wixpress.com"));
        assert!(accept_email("real@business.fr"));
    }

    #[test]
    fn dedupes_across_sources() {
        let body = r#"<a href="mailto:a@b.co">a@b.co</a> a@b.co"#;
        assert_eq!(extract_emails(body), vec!["a@b.co".to_string()]);
    }

    #[test]
    fn failed_fetch_still_yields_entry() {
        let entry = Entry {
            title: "Shop".to_string(),
            website: "https://shop.example.org".to_string(),
            ..Default::default()
        };
        let job = EmailJob::new(Uuid::new_v4(), entry, "u", "", false);
        let resp = PageResponse {
            error: Some("timeout".to_string()),
            ..PageResponse::empty()
        };

        let (data, children) = job.process(&resp);
        assert!(children.is_empty());
        let out = data.unwrap();
        assert_eq!(out.title, "Shop");
        assert!(out.emails.is_empty());
    }

    #[test]
    fn bodacc_chain_when_requested() {
        let entry = Entry {
            title: "Shop".to_string(),
            address: "1 Rue Test".to_string(),
            website: "https://shop.example.org".to_string(),
            ..Default::default()
        };
        let job = EmailJob::new(Uuid::new_v4(), entry, "u", "o", true);
        let resp = PageResponse {
            url: "https://shop.example.org".to_string(),
            status: 200,
            body: "contact@shop.example.org".to_string(),
            meta: None,
            error: None,
        };

        let (data, children) = job.process(&resp);
        assert!(data.is_none());
        match &children[0] {
            CrawlJob::Bodacc(bodacc) => {
                assert_eq!(bodacc.entry.emails, vec!["contact@shop.example.org".to_string()]);
            }
            other => panic!("expected bodacc child, got {other:?}"),
        }
    }
}
