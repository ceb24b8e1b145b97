use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::service::Context;

/// Server connection configuration
///
/// Mirrors the server's own rc file: the `[options]` section of an
/// INI-format config provides `root_path` and `admin_passwd`, everything
/// else is supplied by the caller through the builder setters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path of the config file this was loaded from, if any
    pub config_file: Option<PathBuf>,

    /// Server installation root
    pub root_path: String,

    /// Super-admin password for the database service
    pub admin_passwd: String,

    /// Database to work on; database-lifecycle helpers run without one
    pub database: Option<String>,

    /// Acting user id, defaults to the admin user (1)
    pub user: u32,

    /// Acting user's password
    pub password: String,

    /// Commit after every mutating model call; when disabled the caller
    /// commits through the transaction handle
    pub auto_commit: bool,

    /// Call context; when `None` it is resolved from the acting user's
    /// stored preferences at transaction start
    pub context: Option<Context>,

    /// Default language for created databases
    pub language: String,

    /// Major version of the target server; selects the wire method table
    pub version: u32,

    /// Upper bound on the create-database progress poll
    pub create_timeout: Duration,

    /// Base URL for the HTTP transport
    pub url: String,
}

impl ServerConfig {
    /// Create a configuration without reading a config file
    pub fn new(root_path: &str, admin_passwd: &str) -> Self {
        Self {
            config_file: None,
            root_path: root_path.to_string(),
            admin_passwd: admin_passwd.to_string(),
            database: None,
            user: 1,
            password: "admin".to_string(),
            auto_commit: true,
            context: None,
            language: "en_US".to_string(),
            version: 5,
            create_timeout: Duration::from_secs(300),
            url: "http://localhost:8069".to_string(),
        }
    }

    /// Load the `[options]` section of a server rc file
    ///
    /// The file must provide `root_path` and `admin_passwd` under
    /// `[options]`; a missing file, section or key is a config error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;

        let options = parse_ini_section(&text, "options");
        let root_path = options
            .get("root_path")
            .ok_or_else(|| Error::Config("missing 'root_path' in [options]".to_string()))?;
        let admin_passwd = options
            .get("admin_passwd")
            .ok_or_else(|| Error::Config("missing 'admin_passwd' in [options]".to_string()))?;

        let mut config = Self::new(root_path, admin_passwd);
        config.config_file = Some(path.to_path_buf());
        Ok(config)
    }

    /// Set the database name
    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    /// Set the acting user id
    pub fn user(mut self, user: u32) -> Self {
        self.user = user;
        self
    }

    /// Set the acting user's password
    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    /// Enable or disable commit-after-mutation
    pub fn auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    /// Set an explicit call context
    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the default language
    pub fn language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    /// Set the target server major version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the create-database poll deadline
    pub fn create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout = timeout;
        self
    }

    /// Set the HTTP transport base URL
    pub fn url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.admin_passwd.is_empty() {
            return Err(Error::Config("admin password cannot be empty".to_string()));
        }
        if self.version < 5 {
            return Err(Error::Config(format!(
                "unsupported server version {}",
                self.version
            )));
        }
        if self.create_timeout.is_zero() {
            return Err(Error::Config("create_timeout must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Collect `key = value` pairs from one section of an INI file
fn parse_ini_section(text: &str, section: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    let mut in_section = false;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim() == section;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            pairs.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::new("/opt/openerp", "secret");
        assert_eq!(config.user, 1);
        assert_eq!(config.password, "admin");
        assert_eq!(config.language, "en_US");
        assert_eq!(config.version, 5);
        assert!(config.auto_commit);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ServerConfig::new("/opt/openerp", "secret")
            .database("test_db")
            .user(3)
            .version(6)
            .auto_commit(false);

        assert_eq!(config.database.as_deref(), Some("test_db"));
        assert_eq!(config.user, 3);
        assert_eq!(config.version, 6);
        assert!(!config.auto_commit);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "; server rc\n[options]\nroot_path = /opt/openerp/server\nadmin_passwd = swordfish\nport = 8069\n"
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.root_path, "/opt/openerp/server");
        assert_eq!(config.admin_passwd, "swordfish");
        assert_eq!(config.config_file.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_from_file_missing_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[options]\nroot_path = /opt/openerp\n").unwrap();

        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("admin_passwd"));
    }

    #[test]
    fn test_from_file_missing_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[other]\nroot_path = /opt/openerp\nadmin_passwd = x\n").unwrap();

        assert!(ServerConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_from_missing_file() {
        assert!(ServerConfig::from_file("/does/not/exist.rc").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(ServerConfig::new("/opt", "secret").validate().is_ok());
        assert!(ServerConfig::new("/opt", "").validate().is_err());
        assert!(ServerConfig::new("/opt", "secret").version(4).validate().is_err());
        assert!(
            ServerConfig::new("/opt", "secret")
                .create_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
