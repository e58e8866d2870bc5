//! Distributed mapping-service crawl pipeline.
//!
//! Many worker processes share one PostgreSQL store acting as both queue
//! and result warehouse. The `kernel::jobs` module is the durable
//! hierarchical scheduler; `domains::gmaps` holds the job variants;
//! `runner` wires a process together.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod runner;
