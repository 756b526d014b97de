use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use nildb_db::DbOptions;
use nildb_nuc::Did;

use crate::domain::service::ServiceConfig;

/// Module configuration, deserialized from the host's layered config.
///
/// Flattened into the host config, so unknown-field rejection lives on the
/// leaf sections.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub database: DbOptions,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Key material and trust anchors.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// Hex-encoded secp256k1 secret key; the node DID derives from it.
    pub secret_key: SecretString,
    /// DID of the external authority trusted to root delegation chains.
    #[serde(default)]
    pub authority_did: Option<Did>,
}

/// Engine tunables with production defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
    #[serde(default = "default_tail_limit")]
    pub default_tail_limit: i64,
    #[serde(default = "default_max_tail_limit")]
    pub max_tail_limit: i64,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    #[serde(default = "default_revocation_ttl_secs")]
    pub revocation_cache_ttl_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            default_tail_limit: default_tail_limit(),
            max_tail_limit: default_max_tail_limit(),
            run_timeout_secs: default_run_timeout_secs(),
            revocation_cache_ttl_secs: default_revocation_ttl_secs(),
        }
    }
}

impl From<&LimitsConfig> for ServiceConfig {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            default_page_size: limits.default_page_size,
            max_page_size: limits.max_page_size,
            default_tail_limit: limits.default_tail_limit,
            max_tail_limit: limits.max_tail_limit,
            run_timeout: Duration::from_secs(limits.run_timeout_secs),
            revocation_cache_ttl: Duration::from_secs(limits.revocation_cache_ttl_secs),
        }
    }
}

fn default_page_size() -> i64 {
    100
}

fn default_max_page_size() -> i64 {
    1_000
}

fn default_tail_limit() -> i64 {
    10
}

fn default_max_tail_limit() -> i64 {
    100
}

fn default_run_timeout_secs() -> u64 {
    60
}

fn default_revocation_ttl_secs() -> u64 {
    30
}
