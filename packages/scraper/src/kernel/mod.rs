//! Process-wide services: the scheduler core, the notification client, the
//! result pipeline, and the seams business logic programs against.

pub mod api_client;
pub mod company_cache;
pub mod fetch;
pub mod jobs;
pub mod queries;
pub mod registry_client;
pub mod result_writer;

use std::sync::Arc;

use typed_builder::TypedBuilder;

pub use api_client::ApiClient;
pub use company_cache::{CompanyDataChecker, PgCompanyDataCache};
pub use fetch::{Fetcher, HttpFetcher, PageResponse};
pub use registry_client::{BodaccClient, DirectoryService};
pub use result_writer::{ResultWriter, ScrapeResult};

/// Dependencies handed to business `process`.
///
/// Explicit instead of smuggled through a task-local registry, so variants
/// stay testable with plain mock implementations.
#[derive(Clone, TypedBuilder)]
pub struct ProcessDeps {
    pub company_cache: Arc<dyn CompanyDataChecker>,
    pub directory: Arc<dyn DirectoryService>,
}
