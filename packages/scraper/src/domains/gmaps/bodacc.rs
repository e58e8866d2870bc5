//! Bodacc job: company-registry enrichment of an extracted listing.
//!
//! Checks previously persisted results first (cheap read) and only then
//! asks the external directory service. When the registry knows the company
//! but not its directors, a pappers follow-up job is created; that child is
//! only ever fetched through the durable queue.

use anyhow::Result;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{CrawlJob, Entry, JobCore, PappersJob};
use crate::kernel::jobs::JobPriority;
use crate::kernel::ProcessDeps;

#[derive(Debug, Clone, PartialEq)]
pub struct BodaccJob {
    pub core: JobCore,
    pub owner_id: String,
    pub organization_id: String,
    pub company_name: String,
    pub address: String,
    pub entry: Entry,
}

impl BodaccJob {
    pub const JOB_TYPE: &'static str = "bodacc";

    const DEFAULT_MAX_RETRIES: u32 = 2;

    pub fn new(
        parent_id: Option<Uuid>,
        company_name: &str,
        address: &str,
        owner_id: &str,
        organization_id: &str,
        entry: Entry,
    ) -> Self {
        // No URL: the registry lookup is a service call, not a page fetch.
        let mut core = JobCore::new(String::new(), JobPriority::High, Self::DEFAULT_MAX_RETRIES);
        core.parent_id = parent_id;

        Self {
            core,
            owner_id: owner_id.to_string(),
            organization_id: organization_id.to_string(),
            company_name: company_name.to_string(),
            address: address.to_string(),
            entry,
        }
    }

    pub async fn process(&self, deps: &ProcessDeps) -> Result<(Option<Entry>, Vec<CrawlJob>)> {
        let mut entry = self.entry.clone();

        match deps
            .company_cache
            .existing_company_data(
                &self.company_name,
                &self.address,
                &self.owner_id,
                &self.organization_id,
            )
            .await
        {
            Ok(Some(info)) => {
                debug!(company = %self.company_name, "company data served from prior results");
                entry.company = info;
                return Ok((Some(entry), vec![]));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(company = %self.company_name, error = %err, "company data cache lookup failed");
            }
        }

        match deps
            .directory
            .search_company(&self.company_name, &self.address)
            .await
        {
            Ok(Some(info)) => entry.company = info,
            Ok(None) => {
                debug!(company = %self.company_name, "no registry match");
            }
            Err(err) => {
                // The listing is still worth keeping without registry data.
                warn!(company = %self.company_name, error = %err, "directory lookup failed");
                return Ok((Some(entry), vec![]));
            }
        }

        if entry.company.directors.is_empty() && !entry.company.registry_link.is_empty() {
            let child = PappersJob::new(
                self.core.id,
                entry,
                &self.owner_id,
                &self.organization_id,
            );
            return Ok((None, vec![CrawlJob::Pappers(child)]));
        }

        Ok((Some(entry), vec![]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::gmaps::CompanyInfo;
    use crate::kernel::company_cache::CompanyDataChecker;
    use crate::kernel::registry_client::DirectoryService;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedCache(Option<CompanyInfo>);

    #[async_trait]
    impl CompanyDataChecker for FixedCache {
        async fn existing_company_data(
            &self,
            _title: &str,
            _address: &str,
            _owner_id: &str,
            _organization_id: &str,
        ) -> Result<Option<CompanyInfo>> {
            Ok(self.0.clone())
        }
    }

    struct FixedDirectory(Option<CompanyInfo>);

    #[async_trait]
    impl DirectoryService for FixedDirectory {
        async fn search_company(&self, _name: &str, _address: &str) -> Result<Option<CompanyInfo>> {
            Ok(self.0.clone())
        }
    }

    fn deps(cache: Option<CompanyInfo>, directory: Option<CompanyInfo>) -> ProcessDeps {
        ProcessDeps {
            company_cache: Arc::new(FixedCache(cache)),
            directory: Arc::new(FixedDirectory(directory)),
        }
    }

    fn job() -> BodaccJob {
        BodaccJob::new(
            Some(Uuid::new_v4()),
            "Boulangerie Martin",
            "12 Rue de la Paix",
            "u",
            "o",
            Entry {
                title: "Boulangerie Martin".to_string(),
                address: "12 Rue de la Paix".to_string(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn cache_hit_skips_directory() {
        let cached = CompanyInfo {
            directors: vec!["Jane Doe".to_string()],
            national_id: "123456789".to_string(),
            ..Default::default()
        };
        let deps = deps(Some(cached.clone()), None);

        let (data, children) = job().process(&deps).await.unwrap();
        assert!(children.is_empty());
        assert_eq!(data.unwrap().company, cached);
    }

    #[tokio::test]
    async fn directory_miss_still_yields_entry() {
        let deps = deps(None, None);
        let (data, children) = job().process(&deps).await.unwrap();
        assert!(children.is_empty());
        assert!(data.unwrap().company.is_empty());
    }

    #[tokio::test]
    async fn missing_directors_fan_out_to_pappers() {
        let info = CompanyInfo {
            national_id: "123456789".to_string(),
            registry_link: "https://registry.example.org/123456789".to_string(),
            ..Default::default()
        };
        let deps = deps(None, Some(info));

        let (data, children) = job().process(&deps).await.unwrap();
        assert!(data.is_none());
        match &children[0] {
            CrawlJob::Pappers(pappers) => {
                assert_eq!(pappers.core.url, "https://registry.example.org/123456789");
            }
            other => panic!("expected pappers child, got {other:?}"),
        }
    }
}
