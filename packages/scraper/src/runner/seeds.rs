//! Seed query loading.
//!
//! One query per line; a `#!#<id>` suffix carries the external owner id
//! that scopes the run's results. Blank lines are skipped.

use std::io::BufRead;

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::domains::gmaps::{CrawlJob, SearchJob};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedQuery {
    pub query: String,
    pub external_id: Option<String>,
}

pub fn parse_seed_queries<R: BufRead>(reader: R) -> Result<Vec<SeedQuery>> {
    let mut seeds = Vec::new();

    for line in reader.lines() {
        let line = line.context("failed to read seed input")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let seed = match line.split_once("#!#") {
            Some((query, id)) => SeedQuery {
                query: query.trim().to_string(),
                external_id: Some(id.trim().to_string()).filter(|id| !id.is_empty()),
            },
            None => SeedQuery {
                query: line.to_string(),
                external_id: None,
            },
        };

        if !seed.query.is_empty() {
            seeds.push(seed);
        }
    }

    Ok(seeds)
}

/// Turn seed queries into root search jobs per the run configuration.
pub fn create_seed_jobs<R: BufRead>(cfg: &Config, reader: R) -> Result<Vec<CrawlJob>> {
    let geo = cfg.parsed_geo()?;
    if geo.is_some() && (cfg.zoom < 1 || cfg.zoom > 21) {
        bail!("invalid zoom level: {}", cfg.zoom);
    }

    let jobs = parse_seed_queries(reader)?
        .into_iter()
        .map(|seed| {
            let owner_id = seed.external_id.unwrap_or_default();
            CrawlJob::Search(SearchJob::new(
                &seed.query,
                &cfg.lang,
                &owner_id,
                "",
                cfg.depth,
                cfg.email,
                cfg.bodacc,
                geo,
                cfg.zoom,
            ))
        })
        .collect();

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_queries_and_external_ids() {
        let input = "coffee shops in berlin\n\nbars in paris #!# user-42\n  \n";
        let seeds = parse_seed_queries(Cursor::new(input)).unwrap();

        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].query, "coffee shops in berlin");
        assert!(seeds[0].external_id.is_none());
        assert_eq!(seeds[1].query, "bars in paris");
        assert_eq!(seeds[1].external_id.as_deref(), Some("user-42"));
    }

    #[test]
    fn empty_external_id_is_absent() {
        let seeds = parse_seed_queries(Cursor::new("bars #!# \n")).unwrap();
        assert_eq!(seeds[0].query, "bars");
        assert!(seeds[0].external_id.is_none());
    }

    #[test]
    fn seed_jobs_are_roots_owned_by_external_id() {
        let cfg = Config::for_tests();
        let jobs = create_seed_jobs(&cfg, Cursor::new("bars #!# u9\n")).unwrap();

        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert!(job.is_root());
        assert_eq!(job.owner_id(), "u9");
        assert_eq!(job.job_type(), "search");
    }

    #[test]
    fn bad_geo_fails_seed_creation() {
        let mut cfg = Config::for_tests();
        cfg.geo = Some("91.0,0.0".to_string());
        assert!(create_seed_jobs(&cfg, Cursor::new("bars\n")).is_err());
    }
}
