//! Parameterized query builders for the `results` table.
//!
//! Each builder returns `Some((sql, args))` or `None` when the inputs are
//! insufficient to build a meaningful query (empty URL, no tenant).

/// Duplicate-URL check, keyed by (link, tenant).
#[derive(Debug, Clone)]
pub struct DuplicateUrlQuery<'a> {
    url: &'a str,
    user_id: &'a str,
    organization_id: &'a str,
}

impl<'a> DuplicateUrlQuery<'a> {
    pub fn new(url: &'a str, user_id: &'a str, organization_id: &'a str) -> Self {
        Self {
            url,
            user_id,
            organization_id,
        }
    }

    pub fn build(&self) -> Option<(String, Vec<String>)> {
        if self.url.is_empty() {
            return None;
        }

        if !self.user_id.is_empty() && !self.organization_id.is_empty() {
            return Some((
                "SELECT COUNT(*) FROM results \
                 WHERE link = $1 AND (user_id = $2 OR organization_id = $3)"
                    .to_string(),
                vec![
                    self.url.to_string(),
                    self.user_id.to_string(),
                    self.organization_id.to_string(),
                ],
            ));
        }

        if !self.user_id.is_empty() {
            return Some((
                "SELECT COUNT(*) FROM results WHERE link = $1 AND user_id = $2".to_string(),
                vec![self.url.to_string(), self.user_id.to_string()],
            ));
        }

        if !self.organization_id.is_empty() {
            return Some((
                "SELECT COUNT(*) FROM results WHERE link = $1 AND organization_id = $2"
                    .to_string(),
                vec![self.url.to_string(), self.organization_id.to_string()],
            ));
        }

        // No tenant: nothing to deduplicate against.
        None
    }
}

const COMPANY_SELECT: &str = "SELECT company_directors, company_legal_form, company_created, \
     company_closed, company_national_id, company_link, company_diffusion \
     FROM results \
     WHERE LOWER(TRIM(title)) = LOWER(TRIM($1)) \
     AND LOWER(TRIM(address)) = LOWER(TRIM($2))";

const COMPANY_COND: &str = " AND (COALESCE(cardinality(company_directors), 0) > 0 \
     OR COALESCE(company_national_id, '') <> '') \
     LIMIT 1";

/// Existing-company-data lookup, keyed by normalized (title, address, tenant),
/// restricted to rows that actually carry registry data.
#[derive(Debug, Clone)]
pub struct CompanyDataQuery<'a> {
    title: &'a str,
    address: &'a str,
    owner_id: &'a str,
    organization_id: &'a str,
}

impl<'a> CompanyDataQuery<'a> {
    pub fn new(title: &'a str, address: &'a str, owner_id: &'a str, organization_id: &'a str) -> Self {
        Self {
            title,
            address,
            owner_id,
            organization_id,
        }
    }

    pub fn build(&self) -> Option<(String, Vec<String>)> {
        if self.title.is_empty() || self.address.is_empty() {
            return None;
        }

        if !self.owner_id.is_empty() && !self.organization_id.is_empty() {
            return Some((
                format!("{COMPANY_SELECT} AND (user_id = $3 OR organization_id = $4){COMPANY_COND}"),
                vec![
                    self.title.to_string(),
                    self.address.to_string(),
                    self.owner_id.to_string(),
                    self.organization_id.to_string(),
                ],
            ));
        }

        if !self.owner_id.is_empty() {
            return Some((
                format!("{COMPANY_SELECT} AND user_id = $3{COMPANY_COND}"),
                vec![
                    self.title.to_string(),
                    self.address.to_string(),
                    self.owner_id.to_string(),
                ],
            ));
        }

        if !self.organization_id.is_empty() {
            return Some((
                format!("{COMPANY_SELECT} AND organization_id = $3{COMPANY_COND}"),
                vec![
                    self.title.to_string(),
                    self.address.to_string(),
                    self.organization_id.to_string(),
                ],
            ));
        }

        None
    }
}
