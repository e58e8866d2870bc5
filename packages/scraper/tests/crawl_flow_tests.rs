//! Fan-out flow tests: seed file → root jobs → per-variant processing,
//! exercised against mock fetch responses and mock enrichment services.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use scraper_core::config::Config;
use scraper_core::domains::gmaps::{CompanyInfo, CrawlJob, Entry};
use scraper_core::kernel::company_cache::CompanyDataChecker;
use scraper_core::kernel::registry_client::DirectoryService;
use scraper_core::kernel::{PageResponse, ProcessDeps};
use scraper_core::runner::create_seed_jobs;

// =============================================================================
// Mock services
// =============================================================================

struct NoCache;

#[async_trait]
impl CompanyDataChecker for NoCache {
    async fn existing_company_data(
        &self,
        _title: &str,
        _address: &str,
        _owner_id: &str,
        _organization_id: &str,
    ) -> Result<Option<CompanyInfo>> {
        Ok(None)
    }
}

struct FixedDirectory(Option<CompanyInfo>);

#[async_trait]
impl DirectoryService for FixedDirectory {
    async fn search_company(&self, _name: &str, _address: &str) -> Result<Option<CompanyInfo>> {
        Ok(self.0.clone())
    }
}

fn deps(directory: Option<CompanyInfo>) -> ProcessDeps {
    ProcessDeps {
        company_cache: Arc::new(NoCache),
        directory: Arc::new(FixedDirectory(directory)),
    }
}

fn test_config(args: &[&str]) -> Config {
    use clap::Parser;
    let mut full = vec!["placescout", "--dsn", "postgres://localhost/test"];
    full.extend_from_slice(args);
    Config::try_parse_from(full).expect("config parses")
}

fn ok_response(url: &str, body: &str) -> PageResponse {
    PageResponse {
        url: url.to_string(),
        status: 200,
        body: body.to_string(),
        meta: None,
        error: None,
    }
}

// =============================================================================
// Seed → search → place
// =============================================================================

#[tokio::test]
async fn search_tree_fans_out_to_places() {
    let cfg = test_config(&["--email", "--depth", "1"]);
    let seeds = "coffee in berlin #!# tenant-7\n";
    let jobs = create_seed_jobs(&cfg, Cursor::new(seeds)).expect("seed jobs");
    assert_eq!(jobs.len(), 1);

    let root = &jobs[0];
    assert!(root.is_root());
    assert_eq!(root.owner_id(), "tenant-7");

    let body = r#"
        <a href="/maps/place/cafe-a">a</a>
        <a href="/maps/place/cafe-b">b</a>
    "#;
    let (data, children) = root
        .process(&deps(None), &ok_response(root.url(), body))
        .await
        .expect("search processes");

    assert!(data.is_none());
    assert_eq!(children.len(), 2);
    for child in &children {
        assert_eq!(child.job_type(), "place");
        assert_eq!(child.parent_id(), Some(root.id()));
        assert_eq!(child.owner_id(), "tenant-7");
    }
}

// =============================================================================
// Place → email chain
// =============================================================================

#[tokio::test]
async fn place_with_website_chains_into_email_extraction() {
    let cfg = test_config(&["--email"]);
    let jobs = create_seed_jobs(&cfg, Cursor::new("bars\n")).expect("seed jobs");
    let root = &jobs[0];

    let (_, children) = root
        .process(
            &deps(None),
            &ok_response(root.url(), r#"<a href="/maps/place/spot">s</a>"#),
        )
        .await
        .expect("search processes");
    let place = &children[0];

    // The automation layer attaches the structured place payload.
    let place_resp = PageResponse {
        url: place.url().to_string(),
        status: 200,
        body: String::new(),
        meta: Some(serde_json::json!({
            "name": "The Spot",
            "address": "1 Main Street",
            "website": "https://thespot.example.org",
            "link": "https://maps.example.org/place/spot",
        })),
        error: None,
    };

    let (data, children) = place
        .process(&deps(None), &place_resp)
        .await
        .expect("place processes");
    assert!(data.is_none(), "entry travels inside the email child");
    assert_eq!(children.len(), 1);

    let email = &children[0];
    assert_eq!(email.job_type(), "email");
    assert_eq!(email.url(), "https://thespot.example.org");

    let email_resp = ok_response(
        email.url(),
        r#"<a href="mailto:book@thespot.example.org">book</a>"#,
    );
    let (data, children) = email
        .process(&deps(None), &email_resp)
        .await
        .expect("email processes");

    assert!(children.is_empty());
    let entry = data.expect("email yields the entry");
    assert_eq!(entry.title, "The Spot");
    assert_eq!(entry.emails, vec!["book@thespot.example.org".to_string()]);
}

// =============================================================================
// Registry enrichment chain
// =============================================================================

#[tokio::test]
async fn bodacc_without_directors_chains_into_pappers() {
    let entry = Entry {
        title: "The Spot".to_string(),
        address: "1 Main Street".to_string(),
        link: "https://maps.example.org/place/spot".to_string(),
        ..Default::default()
    };
    let bodacc = CrawlJob::Bodacc(scraper_core::domains::gmaps::BodaccJob::new(
        None,
        "The Spot",
        "1 Main Street",
        "u1",
        "",
        entry,
    ));

    let info = CompanyInfo {
        national_id: "123456789".to_string(),
        registry_link: "https://registry.example.org/123456789".to_string(),
        ..Default::default()
    };

    let (data, children) = bodacc
        .process(&deps(Some(info)), &PageResponse::empty())
        .await
        .expect("bodacc processes");

    assert!(data.is_none());
    assert_eq!(children.len(), 1);
    let pappers = &children[0];
    assert_eq!(pappers.job_type(), "pappers");

    let pappers_resp = ok_response(
        pappers.url(),
        r#"<table><tbody><tr>
             <td class="info-dirigeant"><a class="underline" href="/p/1">DOE Jane</a></td>
           </tr></tbody></table>"#,
    );
    let (data, children) = pappers
        .process(&deps(None), &pappers_resp)
        .await
        .expect("pappers processes");

    assert!(children.is_empty());
    let entry = data.expect("pappers yields the enriched entry");
    assert_eq!(entry.company.directors, vec!["DOE Jane".to_string()]);
    assert_eq!(entry.company.national_id, "123456789");
}

// =============================================================================
// Fetch-error behavior
// =============================================================================

#[tokio::test]
async fn fetch_error_processing_is_per_variant() {
    let cfg = test_config(&[]);
    let jobs = create_seed_jobs(&cfg, Cursor::new("bars\n")).expect("seed jobs");
    let root = &jobs[0];

    // Search (and place/bodacc) jobs fail on a failed fetch.
    assert!(!root.process_on_fetch_error());
    let failed = PageResponse::failed(root.url(), "boom");
    assert!(root.process(&deps(None), &failed).await.is_err());

    // Email and pappers jobs still process so the travelling entry is
    // not lost.
    let entry = Entry {
        title: "The Spot".to_string(),
        website: "https://thespot.example.org".to_string(),
        company: CompanyInfo {
            national_id: "123456789".to_string(),
            registry_link: "https://registry.example.org/123456789".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    let email = CrawlJob::Email(scraper_core::domains::gmaps::EmailJob::new(
        root.id(),
        entry.clone(),
        "u1",
        "",
        false,
    ));
    assert!(email.process_on_fetch_error());

    let pappers = CrawlJob::Pappers(scraper_core::domains::gmaps::PappersJob::new(
        root.id(),
        entry,
        "u1",
        "",
    ));
    assert!(pappers.process_on_fetch_error());

    let failed = PageResponse::failed(pappers.url(), "boom");
    let (data, children) = pappers
        .process(&deps(None), &failed)
        .await
        .expect("pappers processes on fetch error");
    assert!(children.is_empty());
    let survived = data.expect("entry survives the failed fetch");
    assert_eq!(survived.company.national_id, "123456789");
}
