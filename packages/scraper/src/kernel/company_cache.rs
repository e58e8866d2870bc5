//! Company data cache: short-circuit directory lookups by reusing prior
//! results.
//!
//! Repeated enrichment of the same (title, address, tenant) combination
//! becomes a cheap read of the `results` table instead of another round of
//! external registry calls.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use super::queries::CompanyDataQuery;
use crate::domains::gmaps::CompanyInfo;

/// Seam used by the bodacc variant's business logic.
#[async_trait]
pub trait CompanyDataChecker: Send + Sync {
    /// Returns previously resolved company data for the combination, or
    /// `None` when no prior result carries registry fields.
    async fn existing_company_data(
        &self,
        title: &str,
        address: &str,
        owner_id: &str,
        organization_id: &str,
    ) -> Result<Option<CompanyInfo>>;
}

pub struct PgCompanyDataCache {
    db: PgPool,
}

impl PgCompanyDataCache {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

type CompanyRow = (
    Vec<String>,    // company_directors
    String,         // company_legal_form
    String,         // company_created
    String,         // company_closed
    String,         // company_national_id
    String,         // company_link
    bool,           // company_diffusion
);

#[async_trait]
impl CompanyDataChecker for PgCompanyDataCache {
    async fn existing_company_data(
        &self,
        title: &str,
        address: &str,
        owner_id: &str,
        organization_id: &str,
    ) -> Result<Option<CompanyInfo>> {
        let Some((sql, args)) =
            CompanyDataQuery::new(title, address, owner_id, organization_id).build()
        else {
            return Ok(None);
        };

        let mut query = sqlx::query_as::<_, CompanyRow>(&sql);
        for arg in &args {
            query = query.bind(arg);
        }

        let row = query
            .fetch_optional(&self.db)
            .await
            .context("company data lookup failed")?;

        Ok(row.map(
            |(directors, legal_form, created, closed, national_id, registry_link, diffusion)| {
                CompanyInfo {
                    directors,
                    legal_form,
                    created,
                    closed,
                    national_id,
                    registry_link,
                    diffusion,
                }
            },
        ))
    }
}
