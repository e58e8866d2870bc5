//! Search job: one seed query against the mapping service.
//!
//! A search is the root of its fetch tree. Processing a search result page
//! fans out one place job per discovered listing link.

use std::collections::HashSet;

use anyhow::{bail, Result};
use scraper::{Html, Selector};
use url::Url;

use super::{CrawlJob, Entry, JobCore, PlaceJob};
use crate::kernel::fetch::PageResponse;
use crate::kernel::jobs::JobPriority;

/// Listings surfaced per scroll of the results page. `max_depth` bounds the
/// scroll depth, so it caps the fan-out at `max_depth * RESULTS_PER_SCROLL`.
const RESULTS_PER_SCROLL: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchJob {
    pub core: JobCore,
    pub max_depth: u32,
    pub lang_code: String,
    pub extract_email: bool,
    pub extract_bodacc: bool,
    pub owner_id: String,
    pub organization_id: String,
}

impl SearchJob {
    pub const JOB_TYPE: &'static str = "search";

    const DEFAULT_MAX_RETRIES: u32 = 3;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        query: &str,
        lang_code: &str,
        owner_id: &str,
        organization_id: &str,
        max_depth: u32,
        extract_email: bool,
        extract_bodacc: bool,
        geo: Option<(f64, f64)>,
        zoom: u8,
    ) -> Self {
        let mut url = format!(
            "https://www.google.com/maps/search/{}",
            urlencode_query(query)
        );
        if let Some((lat, lon)) = geo {
            url.push_str(&format!("/@{lat},{lon},{zoom}z"));
        }

        let core = JobCore::new(url, JobPriority::Normal, Self::DEFAULT_MAX_RETRIES)
            .with_param("hl", lang_code);

        Self {
            core,
            max_depth,
            lang_code: lang_code.to_string(),
            extract_email,
            extract_bodacc,
            owner_id: owner_id.to_string(),
            organization_id: organization_id.to_string(),
        }
    }

    pub fn process(&self, resp: &PageResponse) -> Result<(Option<Entry>, Vec<CrawlJob>)> {
        if let Some(err) = &resp.error {
            bail!("search fetch failed: {err}");
        }

        let limit = (self.max_depth as usize).max(1) * RESULTS_PER_SCROLL;
        let links = place_links(&resp.body, &self.core.url, limit);

        let children = links
            .into_iter()
            .map(|link| {
                CrawlJob::Place(PlaceJob::new(
                    self.core.id,
                    &self.lang_code,
                    &link,
                    &self.owner_id,
                    &self.organization_id,
                    self.extract_email,
                    self.extract_bodacc,
                ))
            })
            .collect();

        Ok((None, children))
    }
}

/// Collect listing links from a results page, deduplicated, in document
/// order. Relative hrefs resolve against the page URL.
fn place_links(body: &str, base: &str, limit: usize) -> Vec<String> {
    let doc = Html::parse_document(body);
    let anchors = Selector::parse("a[href]").unwrap();
    let base_url = Url::parse(base).ok();

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in doc.select(&anchors) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if !href.contains("/maps/place/") {
            continue;
        }

        let resolved = match (&base_url, Url::parse(href)) {
            (_, Ok(url)) => url.to_string(),
            (Some(base), Err(_)) => match base.join(href) {
                Ok(url) => url.to_string(),
                Err(_) => continue,
            },
            (None, Err(_)) => continue,
        };

        if seen.insert(resolved.clone()) {
            links.push(resolved);
            if links.len() >= limit {
                break;
            }
        }
    }

    links
}

fn urlencode_query(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for b in query.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_carries_query_and_geo() {
        let job = SearchJob::new(
            "coffee shops",
            "en",
            "u1",
            "",
            2,
            false,
            false,
            Some((37.7749, -122.4194)),
            15,
        );
        assert!(job.core.url.starts_with("https://www.google.com/maps/search/coffee+shops"));
        assert!(job.core.url.contains("@37.7749,-122.4194,15z"));
        assert_eq!(job.core.url_params.get("hl").map(String::as_str), Some("en"));
    }

    #[test]
    fn place_links_resolve_and_dedupe() {
        let body = r#"
            <html><body>
              <a href="https://www.google.com/maps/place/one">One</a>
              <a href="/maps/place/two">Two</a>
              <a href="https://www.google.com/maps/place/one">One again</a>
              <a href="https://elsewhere.example.com/about">Not a place</a>
            </body></html>
        "#;
        let links = place_links(body, "https://www.google.com/maps/search/q", 10);
        assert_eq!(
            links,
            vec![
                "https://www.google.com/maps/place/one".to_string(),
                "https://www.google.com/maps/place/two".to_string(),
            ]
        );
    }

    #[test]
    fn place_links_respect_limit() {
        let mut body = String::from("<html><body>");
        for i in 0..50 {
            body.push_str(&format!("<a href=\"/maps/place/{i}\">p</a>"));
        }
        body.push_str("</body></html>");

        let links = place_links(&body, "https://www.google.com/maps/search/q", 5);
        assert_eq!(links.len(), 5);
    }

    #[test]
    fn fan_out_builds_place_children() {
        let job = SearchJob::new("bars", "fr", "u1", "o1", 1, true, true, None, 15);
        let resp = PageResponse {
            url: job.core.url.clone(),
            status: 200,
            body: "<a href=\"/maps/place/a\">a</a><a href=\"/maps/place/b\">b</a>".to_string(),
            meta: None,
            error: None,
        };

        let (data, children) = job.process(&resp).unwrap();
        assert!(data.is_none());
        assert_eq!(children.len(), 2);
        for child in &children {
            assert_eq!(child.parent_id(), Some(job.core.id));
            assert_eq!(child.owner_id(), "u1");
            assert_eq!(child.organization_id(), "o1");
        }
    }

    #[test]
    fn failed_fetch_is_an_error() {
        let job = SearchJob::new("bars", "en", "", "", 1, false, false, None, 15);
        let resp = PageResponse {
            error: Some("connection refused".to_string()),
            ..PageResponse::empty()
        };
        assert!(job.process(&resp).is_err());
    }
}
