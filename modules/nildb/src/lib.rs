//! nilDB service module.
//!
//! A multi-tenant, schema-validated document service: builders define
//! JSON-Schema collections, store builder-owned or user-owned documents,
//! and run parameterised aggregation queries, all authorised by chained
//! NUC capability tokens.
//!
//! Layering follows the usual module shape: `api` (REST surface and
//! middleware) → `domain` (models, services, query engine, access control)
//! → `infra` (catalog repositories and caches), with `nildb-db` and
//! `nildb-nuc` underneath.

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod module;
pub mod state;

pub use config::NodeConfig;
pub use module::{build, Module};
