use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::adapter::{SessionRefresh, UpstreamCredentials};

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "nextauth.base_url") is overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    /// Get all overrides as a map of setting key -> env var name.
    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub preferences: PreferencesConfig,
    /// Popup backend. Switching to it fails while this is absent.
    #[serde(default)]
    pub firebase: Option<FirebaseConfig>,
    #[serde(default)]
    pub nextauth: NextAuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreferencesConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Preference file, used by the `file` backend.
    #[serde(default = "default_preferences_path")]
    pub path: PathBuf,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_preferences_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FirebaseConfig {
    /// Web API key of the Firebase project.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_identity_toolkit_url")]
    pub identity_toolkit_url: String,
    /// Redirect URI registered with the upstream issuers.
    #[serde(default = "default_request_uri")]
    pub request_uri: String,
    #[serde(default)]
    pub google_client_id: Option<String>,
    #[serde(default)]
    pub github_client_id: Option<String>,
    #[serde(default)]
    pub github_client_secret: Option<String>,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            identity_toolkit_url: default_identity_toolkit_url(),
            request_uri: default_request_uri(),
            google_client_id: None,
            github_client_id: None,
            github_client_secret: None,
        }
    }
}

impl FirebaseConfig {
    pub fn upstream_credentials(&self) -> UpstreamCredentials {
        UpstreamCredentials {
            google_client_id: self.google_client_id.clone(),
            github_client_id: self.github_client_id.clone(),
            github_client_secret: self.github_client_secret.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NextAuthConfig {
    /// Origin of the NextAuth server.
    #[serde(default = "default_nextauth_base_url")]
    pub base_url: String,
    #[serde(default = "default_nextauth_base_path")]
    pub base_path: String,
    /// Where the server sends the browser after sign-in; defaults to `base_url`.
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub session_refresh: SessionRefreshMode,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for NextAuthConfig {
    fn default() -> Self {
        Self {
            base_url: default_nextauth_base_url(),
            base_path: default_nextauth_base_path(),
            callback_url: None,
            session_refresh: SessionRefreshMode::default(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl NextAuthConfig {
    /// Absolute URL of the auth routes, e.g. `http://localhost:3000/api/auth`.
    pub fn auth_url(&self) -> anyhow::Result<url::Url> {
        let base = url::Url::parse(&self.base_url)
            .map_err(|e| anyhow::anyhow!("Invalid nextauth.base_url '{}': {e}", self.base_url))?;
        let path = self.base_path.trim_matches('/');
        let url = if path.is_empty() {
            base
        } else {
            crate::backend::firebase::with_trailing_slash(base).join(path)?
        };
        Ok(url)
    }

    pub fn session_refresh(&self) -> SessionRefresh {
        match self.session_refresh {
            SessionRefreshMode::Manual => SessionRefresh::Manual,
            SessionRefreshMode::AfterOperations => SessionRefresh::AfterOperations,
            SessionRefreshMode::Poll => {
                SessionRefresh::Poll(Duration::from_secs(self.poll_interval_secs.max(1)))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionRefreshMode {
    #[default]
    Manual,
    AfterOperations,
    Poll,
}

impl FromStr for SessionRefreshMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "manual" => Ok(Self::Manual),
            "after-operations" => Ok(Self::AfterOperations),
            "poll" => Ok(Self::Poll),
            _ => Err(format!("Unknown session refresh mode: {s}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Keyring => write!(f, "keyring"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown storage backend: {s}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_preferences_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("authswitch")
        .join("preferences.json")
}
fn default_identity_toolkit_url() -> String {
    crate::backend::firebase::IDENTITY_TOOLKIT_URL.to_string()
}
fn default_request_uri() -> String {
    crate::backend::firebase::DEFAULT_REQUEST_URI.to_string()
}
fn default_nextauth_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_nextauth_base_path() -> String {
    "/api/auth".to_string()
}
const fn default_poll_interval_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Config loading and env overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `AUTHSWITCH_` takes precedence
    /// over the file value and is tracked in `env_overrides`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides read through `lookup` (normally the process environment).
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let mut ov = EnvOverrides::default();

        // -- Helpers (macros for concise per-field overrides) --

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    }
                }
            };
        }
        macro_rules! env_path {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    $field = PathBuf::from(val);
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_opt_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    $field = if val.is_empty() { None } else { Some(val) };
                    ov.record($key, $env);
                }
            };
        }

        // -- Preferences --
        env_parse!(
            "preferences.backend",
            "AUTHSWITCH_PREFERENCES_BACKEND",
            self.preferences.backend
        );
        env_path!(
            "preferences.path",
            "AUTHSWITCH_PREFERENCES_PATH",
            self.preferences.path
        );

        // -- Firebase --
        // An API key in the environment is enough to enable the section.
        if self.firebase.is_none() && lookup("AUTHSWITCH_FIREBASE_API_KEY").is_some() {
            self.firebase = Some(FirebaseConfig::default());
        }
        if let Some(firebase) = self.firebase.as_mut() {
            env_str!("firebase.api_key", "AUTHSWITCH_FIREBASE_API_KEY", firebase.api_key);
            env_str!(
                "firebase.identity_toolkit_url",
                "AUTHSWITCH_FIREBASE_IDENTITY_TOOLKIT_URL",
                firebase.identity_toolkit_url
            );
            env_str!(
                "firebase.request_uri",
                "AUTHSWITCH_FIREBASE_REQUEST_URI",
                firebase.request_uri
            );
            // Upstream client credentials keep their conventional bare names.
            env_opt_str!("firebase.google_client_id", "GOOGLE_CLIENT_ID", firebase.google_client_id);
            env_opt_str!("firebase.github_client_id", "GITHUB_CLIENT_ID", firebase.github_client_id);
            env_opt_str!(
                "firebase.github_client_secret",
                "GITHUB_CLIENT_SECRET",
                firebase.github_client_secret
            );
        }

        // -- NextAuth --
        env_str!("nextauth.base_url", "AUTHSWITCH_NEXTAUTH_URL", self.nextauth.base_url);
        env_str!(
            "nextauth.base_path",
            "AUTHSWITCH_NEXTAUTH_BASE_PATH",
            self.nextauth.base_path
        );
        env_opt_str!(
            "nextauth.callback_url",
            "AUTHSWITCH_NEXTAUTH_CALLBACK_URL",
            self.nextauth.callback_url
        );
        env_parse!(
            "nextauth.session_refresh",
            "AUTHSWITCH_NEXTAUTH_SESSION_REFRESH",
            self.nextauth.session_refresh
        );
        env_parse!(
            "nextauth.poll_interval_secs",
            "AUTHSWITCH_NEXTAUTH_POLL_INTERVAL_SECS",
            self.nextauth.poll_interval_secs
        );

        // -- Logging --
        env_str!("logging.level", "AUTHSWITCH_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "AUTHSWITCH_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.preferences.backend, StorageBackend::File);
        assert!(config.preferences.path.ends_with("authswitch/preferences.json"));
        assert!(config.firebase.is_none());
        assert_eq!(config.nextauth.base_url, "http://localhost:3000");
        assert_eq!(config.nextauth.base_path, "/api/auth");
        assert_eq!(config.nextauth.session_refresh(), SessionRefresh::Manual);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.nextauth.poll_interval_secs, 30);
    }

    #[test]
    fn test_load_toml_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[preferences]
backend = "memory"

[firebase]
api_key = "AIza-test"
google_client_id = "google-id"

[nextauth]
base_url = "https://app.example.com"
session_refresh = "poll"
poll_interval_secs = 5

[logging]
level = "debug"
json = true
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.preferences.backend, StorageBackend::Memory);
        let firebase = config.firebase.unwrap();
        assert_eq!(firebase.api_key, "AIza-test");
        assert_eq!(firebase.request_uri, "http://localhost");
        assert_eq!(
            firebase.upstream_credentials().google_client_id.as_deref(),
            Some("google-id")
        );
        assert_eq!(
            config.nextauth.session_refresh(),
            SessionRefresh::Poll(Duration::from_secs(5))
        );
        assert!(config.logging.json);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[nextauth\nbase_url = 1").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_auth_url_joins_base_path() {
        let mut nextauth = NextAuthConfig::default();
        assert_eq!(nextauth.auth_url().unwrap().as_str(), "http://localhost:3000/api/auth");

        nextauth.base_url = "https://example.com/app".into();
        nextauth.base_path = "auth/".into();
        assert_eq!(nextauth.auth_url().unwrap().as_str(), "https://example.com/app/auth");

        nextauth.base_url = "not a url".into();
        assert!(nextauth.auth_url().is_err());
    }

    #[test]
    fn test_poll_interval_is_at_least_one_second() {
        let nextauth = NextAuthConfig {
            session_refresh: SessionRefreshMode::Poll,
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            nextauth.session_refresh(),
            SessionRefresh::Poll(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_env_overrides_applied_and_tracked() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup_from(&[
            ("AUTHSWITCH_PREFERENCES_BACKEND", "keyring"),
            ("AUTHSWITCH_NEXTAUTH_URL", "https://auth.example.com"),
            ("AUTHSWITCH_NEXTAUTH_SESSION_REFRESH", "after_operations"),
            ("AUTHSWITCH_LOG_JSON", "yes"),
        ]));

        assert_eq!(config.preferences.backend, StorageBackend::Keyring);
        assert_eq!(config.nextauth.base_url, "https://auth.example.com");
        assert_eq!(config.nextauth.session_refresh(), SessionRefresh::AfterOperations);
        assert!(config.logging.json);
        assert_eq!(
            config.env_overrides.env_var_for("nextauth.base_url"),
            Some("AUTHSWITCH_NEXTAUTH_URL")
        );
        assert!(!config.env_overrides.is_overridden("logging.level"));
        assert_eq!(config.env_overrides.all().len(), 4);
    }

    #[test]
    fn test_unparseable_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup_from(&[("AUTHSWITCH_PREFERENCES_BACKEND", "cloud")]));
        assert_eq!(config.preferences.backend, StorageBackend::File);
        assert!(!config.env_overrides.is_overridden("preferences.backend"));
    }

    #[test]
    fn test_firebase_enabled_by_env_api_key() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup_from(&[
            ("AUTHSWITCH_FIREBASE_API_KEY", "AIza-env"),
            ("GITHUB_CLIENT_ID", "gh-id"),
            ("GITHUB_CLIENT_SECRET", "gh-secret"),
            ("GOOGLE_CLIENT_ID", ""),
        ]));
        let firebase = config.firebase.unwrap();
        assert_eq!(firebase.api_key, "AIza-env");
        let creds = firebase.upstream_credentials();
        assert_eq!(creds.github_client_id.as_deref(), Some("gh-id"));
        assert_eq!(creds.github_client_secret.as_deref(), Some("gh-secret"));
        assert!(creds.google_client_id.is_none());
    }

    #[test]
    fn test_client_ids_without_firebase_section_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup_from(&[("GOOGLE_CLIENT_ID", "g")]));
        assert!(config.firebase.is_none());
    }

    #[test]
    fn test_session_refresh_mode_from_str() {
        assert_eq!("manual".parse::<SessionRefreshMode>().unwrap(), SessionRefreshMode::Manual);
        assert_eq!(
            "After-Operations".parse::<SessionRefreshMode>().unwrap(),
            SessionRefreshMode::AfterOperations
        );
        assert_eq!("poll".parse::<SessionRefreshMode>().unwrap(), SessionRefreshMode::Poll);
        assert!("push".parse::<SessionRefreshMode>().is_err());
    }

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("file".parse::<StorageBackend>().unwrap(), StorageBackend::File);
        assert_eq!("keyring".parse::<StorageBackend>().unwrap(), StorageBackend::Keyring);
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert!("unknown".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_storage_backend_display() {
        assert_eq!(StorageBackend::File.to_string(), "file");
        assert_eq!(StorageBackend::Keyring.to_string(), "keyring");
        assert_eq!(StorageBackend::Memory.to_string(), "memory");
    }
}
