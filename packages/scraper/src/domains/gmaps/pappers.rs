//! Pappers job: scrape director names off the company's registry page.

use scraper::{Html, Selector};
use uuid::Uuid;

use super::{CrawlJob, Entry, JobCore};
use crate::kernel::fetch::PageResponse;
use crate::kernel::jobs::JobPriority;

#[derive(Debug, Clone, PartialEq)]
pub struct PappersJob {
    pub core: JobCore,
    pub owner_id: String,
    pub organization_id: String,
    pub entry: Entry,
}

impl PappersJob {
    pub const JOB_TYPE: &'static str = "pappers";

    const DEFAULT_MAX_RETRIES: u32 = 2;

    pub fn new(parent_id: Uuid, entry: Entry, owner_id: &str, organization_id: &str) -> Self {
        let core = JobCore::new(
            entry.company.registry_link.clone(),
            JobPriority::High,
            Self::DEFAULT_MAX_RETRIES,
        )
        .with_parent(parent_id);

        Self {
            core,
            owner_id: owner_id.to_string(),
            organization_id: organization_id.to_string(),
            entry,
        }
    }

    pub fn process(&self, resp: &PageResponse) -> (Option<Entry>, Vec<CrawlJob>) {
        let mut entry = self.entry.clone();

        if resp.error.is_none() {
            let directors = extract_directors(&resp.body);
            if !directors.is_empty() {
                entry.company.directors = directors;
            }
        }

        (Some(entry), vec![])
    }
}

fn extract_directors(body: &str) -> Vec<String> {
    let doc = Html::parse_document(body);
    let selector = Selector::parse("td.info-dirigeant a.underline").unwrap();

    let mut directors = Vec::new();
    for element in doc.select(&selector) {
        let name = element.text().collect::<String>().trim().to_string();
        if !name.is_empty() {
            directors.push(name);
        }
    }

    directors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::gmaps::CompanyInfo;

    fn job() -> PappersJob {
        PappersJob::new(
            Uuid::new_v4(),
            Entry {
                title: "Shop".to_string(),
                company: CompanyInfo {
                    national_id: "123456789".to_string(),
                    registry_link: "https://registry.example.org/123456789".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
            "u",
            "",
        )
    }

    #[test]
    fn url_comes_from_registry_link() {
        assert_eq!(job().core.url, "https://registry.example.org/123456789");
    }

    #[test]
    fn extracts_director_names() {
        let body = r#"
            <table><tbody>
              <tr>
                <td class="info-dirigeant"><a class="underline" href="/p/1"> DOE Jane </a></td>
              </tr>
              <tr>
                <td class="info-dirigeant"><a class="underline" href="/p/2">SMITH John</a></td>
              </tr>
              <tr>
                <td class="info-dirigeant"><a href="/p/3">no underline class</a></td>
                <td><a class="underline" href="/p/4">not a director cell</a></td>
              </tr>
            </tbody></table>
        "#;
        let resp = PageResponse {
            url: job().core.url.clone(),
            status: 200,
            body: body.to_string(),
            meta: None,
            error: None,
        };

        let (data, children) = job().process(&resp);
        assert!(children.is_empty());
        assert_eq!(
            data.unwrap().company.directors,
            vec!["DOE Jane".to_string(), "SMITH John".to_string()]
        );
    }

    #[test]
    fn failed_fetch_still_yields_entry() {
        let resp = PageResponse {
            error: Some("timeout".to_string()),
            ..PageResponse::empty()
        };
        let (data, children) = job().process(&resp);
        assert!(children.is_empty());
        let entry = data.unwrap();
        assert!(entry.company.directors.is_empty());
        assert_eq!(entry.company.national_id, "123456789");
    }

    #[test]
    fn keeps_existing_company_data_on_empty_page() {
        let resp = PageResponse {
            url: job().core.url.clone(),
            status: 200,
            body: "<html></html>".to_string(),
            meta: None,
            error: None,
        };
        let (data, _) = job().process(&resp);
        assert_eq!(data.unwrap().company.national_id, "123456789");
    }
}
