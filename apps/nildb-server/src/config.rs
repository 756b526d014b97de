use std::net::SocketAddr;
use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use nildb::NodeConfig;

/// Host configuration: server and logging sections wrap the module config.
///
/// Layering: YAML file (if given) → `NILDB__*` environment variables → CLI
/// overrides applied by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(flatten)]
    pub node: NodeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Base `EnvFilter` directive, e.g. `info` or `nildb=debug,info`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    use std::net::{IpAddr, Ipv4Addr};
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40080)
}

fn default_log_level() -> String {
    "info".into()
}

impl AppConfig {
    /// Load the layered configuration.
    ///
    /// # Errors
    /// Unreadable files, malformed YAML, or missing required fields
    /// (identity and database have no defaults).
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed("NILDB__").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Effective configuration for `--print-config`, secrets redacted.
    #[must_use]
    pub fn redacted_json(&self) -> serde_json::Value {
        serde_json::json!({
            "server": self.server,
            "logging": self.logging,
            "database": self.node.database,
            "identity": {
                "secret_key": "<redacted>",
                "authority_did": self.node.identity.authority_did,
            },
            "limits": self.node.limits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
database:
  url: mongodb://localhost:27017
  base_name: nildb_test
identity:
  secret_key: "0000000000000000000000000000000000000000000000000000000000000001"
"#;

    #[test]
    fn minimal_yaml_gets_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.server.bind_addr.port(), 40080);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.node.database.base_name, "nildb_test");
        assert_eq!(config.node.limits.default_page_size, 100);
    }

    #[test]
    fn missing_identity_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"database:\n  url: mongodb://localhost\n")
            .unwrap();
        assert!(AppConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn redaction_hides_key_material() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        let rendered = config.redacted_json().to_string();
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("0000000000000000"));
    }
}
