//! Target environment resolution.
//!
//! Base URL and credentials come from explicit values (CLI flags or process
//! environment) with an optional JSON override file as fallback, shaped like
//! `{"BASE": ..., "EMAIL": ..., "PASSWORD": ...}`. Resolution fails fast when
//! a required field is missing so a run can never send an empty credential.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, StampedeError};

/// Fully resolved target environment, shared read-only by the whole run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetEnv {
    /// Base URL of the target service, without a trailing slash
    pub base_url: String,

    /// Login email for the setup call
    pub email: String,

    /// Login password for the setup call
    pub password: String,

    /// Path of the token-issuing endpoint
    #[serde(default = "default_auth_path")]
    pub auth_path: String,

    /// Path of the create endpoint under test
    #[serde(default = "default_resource_path")]
    pub resource_path: String,
}

fn default_auth_path() -> String {
    "/api/auth/tokens".to_string()
}

fn default_resource_path() -> String {
    "/api/entries".to_string()
}

impl TargetEnv {
    /// Resolve the environment from explicit values and an optional override
    /// file. Explicit values win over the file.
    pub fn resolve(
        file: Option<EnvFile>,
        base_url: Option<String>,
        email: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let file = file.unwrap_or_default();

        let base_url = base_url.or(file.base);
        let email = email.or(file.email);
        let password = password.or(file.password);

        match (base_url, email, password) {
            (Some(base_url), Some(email), Some(password)) => Ok(Self {
                base_url: base_url.trim_end_matches('/').to_string(),
                email,
                password,
                auth_path: default_auth_path(),
                resource_path: default_resource_path(),
            }),
            (base_url, email, password) => {
                let mut missing = Vec::new();
                if base_url.is_none() {
                    missing.push("base_url");
                }
                if email.is_none() {
                    missing.push("email");
                }
                if password.is_none() {
                    missing.push("password");
                }
                Err(StampedeError::MissingConfig(missing.join(", ")))
            }
        }
    }

    /// Full URL of the token-issuing endpoint
    pub fn auth_url(&self) -> String {
        format!("{}{}", self.base_url, self.auth_path)
    }

    /// Full URL of the create endpoint under test
    pub fn resource_url(&self) -> String {
        format!("{}{}", self.base_url, self.resource_path)
    }
}

/// Optional override file, the `env/local.json` convention
#[derive(Debug, Default, Deserialize)]
pub struct EnvFile {
    #[serde(rename = "BASE")]
    pub base: Option<String>,

    #[serde(rename = "EMAIL")]
    pub email: Option<String>,

    #[serde(rename = "PASSWORD")]
    pub password: Option<String>,
}

impl EnvFile {
    /// Read and parse an override file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| StampedeError::EnvFileRead {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| StampedeError::EnvFileFormat {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(base: Option<&str>, email: Option<&str>, password: Option<&str>) -> EnvFile {
        EnvFile {
            base: base.map(String::from),
            email: email.map(String::from),
            password: password.map(String::from),
        }
    }

    #[test]
    fn test_explicit_values_win_over_file() {
        let env = TargetEnv::resolve(
            Some(file(Some("http://file.example"), Some("file@x"), Some("filepw"))),
            Some("http://flag.example".to_string()),
            None,
            None,
        )
        .unwrap();

        assert_eq!(env.base_url, "http://flag.example");
        assert_eq!(env.email, "file@x");
        assert_eq!(env.password, "filepw");
    }

    #[test]
    fn test_missing_fields_are_all_listed() {
        let err = TargetEnv::resolve(None, Some("http://x".to_string()), None, None).unwrap_err();

        let msg = format!("{}", err);
        assert!(msg.contains("email"));
        assert!(msg.contains("password"));
        assert!(!msg.contains("base_url"));
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let env = TargetEnv::resolve(
            None,
            Some("http://x.example/".to_string()),
            Some("a@b".to_string()),
            Some("pw".to_string()),
        )
        .unwrap();

        assert_eq!(env.auth_url(), "http://x.example/api/auth/tokens");
        assert_eq!(env.resource_url(), "http://x.example/api/entries");
    }

    #[test]
    fn test_env_file_parses_upper_case_keys() {
        let parsed: EnvFile = serde_json::from_str(
            r#"{"BASE": "http://local.example", "EMAIL": "op@x", "PASSWORD": "pw"}"#,
        )
        .unwrap();

        assert_eq!(parsed.base.as_deref(), Some("http://local.example"));
        assert_eq!(parsed.email.as_deref(), Some("op@x"));
        assert_eq!(parsed.password.as_deref(), Some("pw"));
    }
}
