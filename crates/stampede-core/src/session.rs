//! Run session: one bearer token acquired before any worker starts.
//!
//! The login call is the synchronization barrier of the setup phase; the
//! resulting [`Session`] is shared read-only and never refreshed during a
//! run.

use serde::Deserialize;
use tracing::info;

use crate::config::TargetEnv;
use crate::error::{Result, StampedeError};

/// Shared read-only credential for the whole run
#[derive(Clone, Debug)]
pub struct Session {
    token: String,
}

impl Session {
    /// Session from an already-issued token
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// `Authorization` header value
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

#[derive(Deserialize)]
struct TokenEnvelope {
    data: TokenData,
}

#[derive(Deserialize)]
struct TokenData {
    #[serde(rename = "accessToken")]
    access_token: String,
}

/// Log in once and return the shared session
pub async fn authenticate(client: &reqwest::Client, env: &TargetEnv) -> Result<Session> {
    let url = env.auth_url();
    info!(url = %url, "authenticating");

    let response = client
        .post(&url)
        .json(&serde_json::json!({ "email": env.email, "password": env.password }))
        .send()
        .await
        .map_err(StampedeError::AuthRequest)?;

    let status = response.status();
    if !status.is_success() {
        return Err(StampedeError::AuthRejected {
            status: status.as_u16(),
        });
    }

    let envelope: TokenEnvelope = response
        .json()
        .await
        .map_err(|e| StampedeError::AuthResponseShape(e.to_string()))?;

    if envelope.data.access_token.is_empty() {
        return Err(StampedeError::AuthResponseShape(
            "empty accessToken".to_string(),
        ));
    }

    Ok(Session {
        token: envelope.data.access_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_header_value() {
        let session = Session::with_token("abc123");
        assert_eq!(session.bearer(), "Bearer abc123");
        assert_eq!(session.token(), "abc123");
    }

    #[test]
    fn test_token_envelope_shape() {
        let envelope: TokenEnvelope =
            serde_json::from_str(r#"{"data": {"accessToken": "tok"}}"#).unwrap();
        assert_eq!(envelope.data.access_token, "tok");

        let bad = serde_json::from_str::<TokenEnvelope>(r#"{"accessToken": "tok"}"#);
        assert!(bad.is_err());
    }
}
