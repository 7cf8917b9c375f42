//! # Configuration
//!
//! TOML configuration file, overridable from the command line.
//!
//! ```toml
//! [sync]
//! interval_secs = 5.0
//! autosync = false
//! call_timeout_secs = 30.0
//! sessions = true
//!
//! [storage]
//! database = ":memory:"
//! record_type = "kernel"
//!
//! [gateway]
//! url = "http://127.0.0.1:8888"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8090
//! ```
//!
//! Every section and key is optional. Validation runs before any pass.

use crate::sync::SyncOptions;
use kernsync_core::{DatabaseLocation, IN_MEMORY, KernsyncError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8090;

// =============================================================================
// SECTIONS
// =============================================================================

/// `[sync]`: pass scheduling and engine options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    /// Seconds between automatic passes.
    pub interval_secs: f64,
    /// Run passes periodically after the startup pass.
    pub autosync: bool,
    /// Upper bound in seconds for each collaborator call.
    pub call_timeout_secs: f64,
    /// Reconcile sessions after kernels.
    pub sessions: bool,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            interval_secs: 5.0,
            autosync: false,
            call_timeout_secs: 30.0,
            sessions: true,
        }
    }
}

/// Record type kept in the kernel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// Identified by `kernel_id` only.
    #[default]
    Kernel,
    /// Identified by `kernel_id` and the gateway's `remote_id`.
    Remote,
}

/// `[storage]`: kernel table location and record type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// `":memory:"` or a database file path.
    pub database: String,
    /// Record type of the table rows.
    pub record_type: RecordType,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database: IN_MEMORY.to_string(),
            record_type: RecordType::default(),
        }
    }
}

/// `[gateway]`: remote kernel gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    /// Base URL of the gateway.
    pub url: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// `[server]`: HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Full configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub sync: SyncSection,
    pub storage: StorageSection,
    pub gateway: Option<GatewaySection>,
    pub server: ServerSection,
}

impl Config {
    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, KernsyncError> {
        toml::from_str(text).map_err(|e| KernsyncError::Config(e.to_string()))
    }

    /// Load configuration from `path`.
    ///
    /// A missing file yields the defaults unless `required` is set.
    pub fn load(path: &Path, required: bool) -> Result<Self, KernsyncError> {
        if !path.exists() {
            if required {
                return Err(KernsyncError::Config(format!(
                    "configuration file '{}' not found",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            KernsyncError::Config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Delay between automatic passes.
    pub fn interval(&self) -> Result<Duration, KernsyncError> {
        positive_duration("sync.interval_secs", self.sync.interval_secs)
    }

    /// Upper bound for each collaborator call.
    pub fn call_timeout(&self) -> Result<Duration, KernsyncError> {
        positive_duration("sync.call_timeout_secs", self.sync.call_timeout_secs)
    }

    /// Engine options.
    pub fn sync_options(&self) -> Result<SyncOptions, KernsyncError> {
        Ok(SyncOptions {
            call_timeout: self.call_timeout()?,
            sync_sessions: self.sync.sessions,
        })
    }

    /// Validated kernel table location.
    pub fn database_location(&self) -> Result<DatabaseLocation, KernsyncError> {
        let location: DatabaseLocation = self.storage.database.parse()?;
        location.validate()?;
        Ok(location)
    }

    /// Check every setting that can be checked without running a pass.
    pub fn validate(&self) -> Result<(), KernsyncError> {
        self.interval()?;
        self.call_timeout()?;
        self.database_location()?;
        if let Some(gateway) = &self.gateway {
            if !(gateway.url.starts_with("http://") || gateway.url.starts_with("https://")) {
                return Err(KernsyncError::Config(format!(
                    "gateway.url must be an http(s) URL, got '{}'",
                    gateway.url
                )));
            }
        }
        if self.server.host.trim().is_empty() {
            return Err(KernsyncError::Config("server.host is empty".to_string()));
        }
        Ok(())
    }

    /// `host:port` to bind the HTTP server to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn positive_duration(key: &str, secs: f64) -> Result<Duration, KernsyncError> {
    let duration = Duration::try_from_secs_f64(secs)
        .map_err(|e| KernsyncError::Config(format!("{} = {}: {}", key, secs, e)))?;
    if duration.is_zero() {
        return Err(KernsyncError::Config(format!("{} must be greater than zero", key)));
    }
    Ok(duration)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.interval().unwrap(), Duration::from_secs(5));
        assert!(!config.sync.autosync);
        assert_eq!(config.database_location().unwrap(), DatabaseLocation::InMemory);
        assert_eq!(config.storage.record_type, RecordType::Kernel);
        assert!(config.gateway.is_none());
        assert_eq!(config.bind_addr(), "127.0.0.1:8090");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_file() {
        let config = Config::from_toml(
            r#"
            [sync]
            interval_secs = 0.5
            autosync = true

            [storage]
            database = "kernels.redb"
            record_type = "remote"

            [gateway]
            url = "http://gateway:8888"
            auth_token = "secret"

            [server]
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(config.interval().unwrap(), Duration::from_millis(500));
        assert!(config.sync.autosync);
        assert_eq!(config.storage.record_type, RecordType::Remote);
        assert_eq!(
            config.gateway.as_ref().and_then(|g| g.auth_token.as_deref()),
            Some("secret")
        );
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn bad_interval_rejected() {
        for bad in ["0.0", "-1.0", "nan"] {
            let config = Config::from_toml(&format!("[sync]\ninterval_secs = {}", bad)).unwrap();
            assert!(matches!(config.validate(), Err(KernsyncError::Config(_))), "{}", bad);
        }
    }

    #[test]
    fn unknown_keys_and_record_types_rejected() {
        assert!(Config::from_toml("[sync]\nintervall = 3.0").is_err());
        assert!(Config::from_toml("[storage]\nrecord_type = \"sqlite\"").is_err());
    }

    #[test]
    fn document_check_is_not_configurable() {
        assert!(Config::from_toml("[sync]\nprune_missing_documents = true").is_err());
        assert!(Config::from_toml("[contents]\nroot_dir = \".\"").is_err());
    }

    #[test]
    fn directory_database_rejected() {
        let temp = tempdir().expect("temp dir");
        let mut config = Config::default();
        config.storage.database = temp.path().display().to_string();
        assert!(matches!(
            config.validate(),
            Err(KernsyncError::InvalidDatabasePath(_))
        ));
    }

    #[test]
    fn missing_optional_file_yields_defaults() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("kernsync.toml");
        assert_eq!(Config::load(&path, false).unwrap(), Config::default());
        assert!(Config::load(&path, true).is_err());

        std::fs::write(&path, "[server]\nport = 1234\n").expect("write");
        assert_eq!(Config::load(&path, true).unwrap().server.port, 1234);
    }

    #[test]
    fn gateway_url_must_be_http() {
        let config = Config::from_toml("[gateway]\nurl = \"gateway:8888\"").unwrap();
        assert!(config.validate().is_err());
    }
}
