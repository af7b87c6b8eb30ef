//! Client-credentials authentication against the identity endpoint.
//!
//! The rest of the application only ever asks for a bearer token; refresh
//! and caching stay in here. Any failure on this path is fatal to the run.

use crate::config::GraphSecrets;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use hyper::client::HttpConnector;
use hyper::{Body, Method, Request};
use hyper_rustls::HttpsConnector;
use serde::Deserialize;
use tokio::sync::Mutex;

const SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tokens are renewed this many seconds before their reported expiry, so a
/// token never goes stale mid-batch.
const REFRESH_MARGIN_SECS: i64 = 120;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct TokenProvider {
    http: hyper::Client<HttpsConnector<HttpConnector>>,
    token_url: String,
    secrets: GraphSecrets,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(
        http: hyper::Client<HttpsConnector<HttpConnector>>,
        login_endpoint: &str,
        secrets: GraphSecrets,
    ) -> Self {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            login_endpoint.trim_end_matches('/'),
            secrets.tenant_id
        );
        Self {
            http,
            token_url,
            secrets,
            cached: Mutex::new(None),
        }
    }

    /// A currently valid access token, fetching a fresh one if the cached
    /// token is missing or inside the refresh margin.
    pub async fn bearer(&self) -> Result<String> {
        let mut guard = self.cached.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.access_token.clone());
            }
        }

        let req = Request::builder()
            .method(Method::POST)
            .uri(&self.token_url)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(token_form(&self.secrets)))?;

        let resp = self
            .http
            .request(req)
            .await
            .map_err(|e| Error::Auth(format!("token request failed: {e}")))?;
        let status = resp.status();
        let bytes = hyper::body::to_bytes(resp.into_body())
            .await
            .map_err(|e| Error::Auth(format!("token response unreadable: {e}")))?;

        if !status.is_success() {
            return Err(Error::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&bytes)
            )));
        }

        let token: TokenResponse = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Auth(format!("malformed token response: {e}")))?;

        let lifetime = (token.expires_in - REFRESH_MARGIN_SECS).max(0);
        *guard = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(lifetime),
        });
        tracing::debug!(expires_in = token.expires_in, "acquired access token");

        Ok(token.access_token)
    }
}

fn token_form(secrets: &GraphSecrets) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "client_credentials")
        .append_pair("scope", SCOPE)
        .append_pair("client_id", &secrets.client_id)
        .append_pair("client_secret", &secrets.secret)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_form_carries_client_credentials_grant() {
        let secrets = GraphSecrets {
            tenant_id: "tenant".into(),
            client_id: "client one".into(),
            secret: "s&cret".into(),
        };
        let form = token_form(&secrets);
        assert!(form.contains("grant_type=client_credentials"));
        assert!(form.contains("client_id=client+one"));
        assert!(form.contains("client_secret=s%26cret"));
        assert!(form.contains("scope=https%3A%2F%2Fgraph.microsoft.com%2F.default"));
    }
}
