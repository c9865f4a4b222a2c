//! Authentication configuration
//!
//! Loaded from the `auth` section of a YAML file, for example:
//!
//! ```yaml
//! method: user_token
//! authenticate_heartbeats: true
//! auth_user: alice
//! auth_token: 9f8e7d
//! admin_host: https://admin.example.com
//! # Defaults to true, which accepts any certificate from the authority
//! insecure_skip_verify: false
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::AuthError;
use crate::policy::BaseConfig;
use crate::remote::{is_absolute_url, HttpAuthorityConfig, RetryPolicy, DEFAULT_AUTH_URL};
use crate::token::TokenConfig;
use crate::user_token::UserTokenConfig;

/// Which scheme signs and verifies control messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Shared secret, keyed-hash proofs
    #[default]
    Token,
    /// User/token pair checked by a remote authority
    UserToken,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Token => f.write_str("token"),
            AuthMethod::UserToken => f.write_str("user_token"),
        }
    }
}

/// Authentication settings shared by client and server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub method: AuthMethod,

    /// Sign and verify heartbeats
    #[serde(default)]
    pub authenticate_heartbeats: bool,

    /// Sign and verify new work connections
    #[serde(default)]
    pub authenticate_new_work_conns: bool,

    /// Shared secret (token method)
    #[serde(default)]
    pub token: String,

    /// User name stamped on messages (both methods)
    #[serde(default)]
    pub auth_user: String,

    /// Credential forwarded to the authority (user_token method)
    #[serde(default)]
    pub auth_token: String,

    /// Verification path or absolute URL (user_token method)
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Authority base URL, e.g. `https://admin.example.com` (user_token server)
    #[serde(default)]
    pub admin_host: String,

    /// Accept any TLS certificate from the authority.
    ///
    /// Defaults to `true`: trust decisions toward the authority must then be
    /// made at the network layer.
    #[serde(default = "default_true")]
    pub insecure_skip_verify: bool,

    /// Remember identities confirmed by the authority
    #[serde(default = "default_true")]
    pub cache_identities: bool,

    /// Send the token to the authority along with the user name
    #[serde(default = "default_true")]
    pub send_token: bool,

    /// Total attempts per remote verification
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay after the first failed attempt, in seconds
    #[serde(default = "default_retry_wait")]
    pub retry_wait_secs: u64,

    /// Upper bound for a single retry delay, in seconds
    #[serde(default = "default_retry_max_wait")]
    pub retry_max_wait_secs: u64,

    /// Timeout of a single request to the authority, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_wait() -> u64 {
    5
}

fn default_retry_max_wait() -> u64 {
    20
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            method: AuthMethod::default(),
            authenticate_heartbeats: false,
            authenticate_new_work_conns: false,
            token: String::new(),
            auth_user: String::new(),
            auth_token: String::new(),
            auth_url: default_auth_url(),
            admin_host: String::new(),
            insecure_skip_verify: true,
            cache_identities: true,
            send_token: true,
            retry_attempts: default_retry_attempts(),
            retry_wait_secs: default_retry_wait(),
            retry_max_wait_secs: default_retry_max_wait(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl AuthConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, AuthError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| AuthError::config(format!("Failed to parse auth config: {}", e)))
    }

    /// Load from a YAML file
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuthError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn base(&self) -> BaseConfig {
        BaseConfig::new(
            self.authenticate_heartbeats,
            self.authenticate_new_work_conns,
        )
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            token: self.token.clone(),
            auth_user: self.auth_user.clone(),
        }
    }

    pub fn user_token_config(&self) -> UserTokenConfig {
        UserTokenConfig {
            auth_token: self.auth_token.clone(),
            auth_user: self.auth_user.clone(),
            auth_url: self.auth_url.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_secs(self.retry_wait_secs),
            max_delay: Duration::from_secs(self.retry_max_wait_secs),
        }
    }

    pub fn http_authority_config(&self) -> HttpAuthorityConfig {
        HttpAuthorityConfig {
            base_url: self.admin_host.clone(),
            auth_url: self.auth_url.clone(),
            insecure_skip_verify: self.insecure_skip_verify,
            send_token: self.send_token,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retry: self.retry_policy(),
        }
    }

    /// Check the settings a signing client needs
    pub fn validate_for_client(&self) -> Result<(), AuthError> {
        match self.method {
            AuthMethod::Token => {
                if self.token.is_empty() {
                    warn!("Auth token is empty; any peer with an empty token will match");
                }
            }
            AuthMethod::UserToken => {
                if self.auth_user.is_empty() {
                    return Err(AuthError::config("auth_user is required for user_token auth"));
                }
                if self.auth_token.is_empty() {
                    return Err(AuthError::config(
                        "auth_token is required for user_token auth",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Check the settings a verifying server needs
    pub fn validate_for_server(&self) -> Result<(), AuthError> {
        match self.method {
            AuthMethod::Token => {
                if self.token.is_empty() {
                    warn!("Auth token is empty; any peer with an empty token will match");
                }
            }
            AuthMethod::UserToken => {
                if self.auth_url.is_empty() {
                    return Err(AuthError::config("auth_url must not be empty"));
                }
                if !is_absolute_url(&self.auth_url) {
                    if self.admin_host.is_empty() {
                        return Err(AuthError::config(
                            "admin_host is required when auth_url is a relative path",
                        ));
                    }
                    if !is_absolute_url(&self.admin_host) {
                        return Err(AuthError::config(format!(
                            "admin_host must start with http:// or https://, got '{}'",
                            self.admin_host
                        )));
                    }
                }
                if self.retry_attempts == 0 {
                    return Err(AuthError::config("retry_attempts must be at least 1"));
                }
                if self.retry_wait_secs > self.retry_max_wait_secs {
                    return Err(AuthError::config(format!(
                        "retry_wait_secs ({}) exceeds retry_max_wait_secs ({})",
                        self.retry_wait_secs, self.retry_max_wait_secs
                    )));
                }
                if self.request_timeout_secs == 0 {
                    return Err(AuthError::config("request_timeout_secs must be positive"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = AuthConfig::from_yaml_str("{}").unwrap();

        assert_eq!(config, AuthConfig::default());
        assert_eq!(config.method, AuthMethod::Token);
        assert_eq!(config.auth_url, "/clients/verify");
        assert!(config.insecure_skip_verify);
        assert!(config.cache_identities);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.base(), BaseConfig::default());
    }

    #[test]
    fn test_parse_user_token_config() {
        let yaml = r#"
method: user_token
authenticate_heartbeats: true
auth_user: alice
auth_token: t-1
admin_host: https://admin.example.com
insecure_skip_verify: false
retry_attempts: 5
"#;
        let config = AuthConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.method, AuthMethod::UserToken);
        assert_eq!(config.base(), BaseConfig::new(true, false));
        assert_eq!(config.user_token_config(), UserTokenConfig::new("alice", "t-1"));

        let remote = config.http_authority_config();
        assert_eq!(remote.verify_url(), "https://admin.example.com/clients/verify");
        assert!(!remote.insecure_skip_verify);
        assert_eq!(remote.retry.max_attempts, 5);

        assert!(config.validate_for_client().is_ok());
        assert!(config.validate_for_server().is_ok());
    }

    #[test]
    fn test_unknown_method_rejected() {
        let err = AuthConfig::from_yaml_str("method: oidc").unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn test_token_config_carries_secret_and_user() {
        let config = AuthConfig {
            token: "s3cr3t".to_string(),
            auth_user: "alice".to_string(),
            ..Default::default()
        };

        assert_eq!(
            config.token_config(),
            TokenConfig::new("s3cr3t").with_auth_user("alice")
        );
        assert!(config.validate_for_client().is_ok());
        assert!(config.validate_for_server().is_ok());
    }

    #[test]
    fn test_user_token_client_requires_credentials() {
        let mut config = AuthConfig {
            method: AuthMethod::UserToken,
            ..Default::default()
        };
        assert!(config.validate_for_client().is_err());

        config.auth_user = "alice".to_string();
        assert!(config.validate_for_client().is_err());

        config.auth_token = "t-1".to_string();
        assert!(config.validate_for_client().is_ok());
    }

    #[test]
    fn test_user_token_server_requires_authority() {
        let mut config = AuthConfig {
            method: AuthMethod::UserToken,
            ..Default::default()
        };
        assert!(config.validate_for_server().is_err());

        config.admin_host = "admin.example.com".to_string();
        assert!(config.validate_for_server().is_err());

        config.admin_host = "http://admin.example.com".to_string();
        assert!(config.validate_for_server().is_ok());

        config.admin_host.clear();
        config.auth_url = "https://auth.example.com/verify".to_string();
        assert!(config.validate_for_server().is_ok());
    }

    #[test]
    fn test_user_token_server_retry_bounds() {
        let mut config = AuthConfig {
            method: AuthMethod::UserToken,
            admin_host: "http://admin".to_string(),
            retry_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate_for_server().is_err());

        config.retry_attempts = 3;
        config.retry_wait_secs = 30;
        assert!(config.validate_for_server().is_err());

        config.retry_wait_secs = 5;
        config.request_timeout_secs = 0;
        assert!(config.validate_for_server().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "token: s3cr3t\nauthenticate_new_work_conns: true").unwrap();

        let config = AuthConfig::load(file.path()).unwrap();
        assert_eq!(config.token, "s3cr3t");
        assert!(config.authenticate_new_work_conns);

        let missing = AuthConfig::load(Path::new("/nonexistent/burrow-auth.yml"));
        assert!(matches!(missing, Err(AuthError::Config(_))));
    }
}
