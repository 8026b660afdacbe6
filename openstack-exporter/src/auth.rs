//! Identity service authentication (Keystone v3).
//!
//! An [`AuthenticatingClient`] owns the authenticated session and hands out
//! service clients built from it. Exporters re-authenticate on every scrape
//! and rebuild their service client afterwards, so a token that expired
//! between scrapes is never reused.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::config::{CloudConfig, Interface};
use crate::network::{NetworkApi, NeutronClient};

/// Catalog service type of the network service.
pub const NETWORK_SERVICE_TYPE: &str = "network";

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Identity service rejected authentication (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to reach identity service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Identity response carried no X-Subject-Token header")]
    MissingToken,

    #[error("Invalid identity response: {0}")]
    InvalidResponse(String),

    #[error("No '{service_type}' endpoint in catalog for interface '{interface}'{}", region_suffix(.region))]
    EndpointNotFound {
        service_type: String,
        interface: String,
        region: Option<String>,
    },

    #[error("Client is not authenticated")]
    NotAuthenticated,
}

fn region_suffix(region: &Option<String>) -> String {
    match region {
        Some(region) => format!(" and region '{}'", region),
        None => String::new(),
    }
}

/// A client that can (re-)authenticate and build service clients from the
/// resulting session.
#[async_trait]
pub trait AuthenticatingClient: Send + Sync {
    type Network: NetworkApi;

    /// Authenticate and replace the held session.
    async fn authenticate(&mut self) -> Result<(), AuthError>;

    /// Build a fresh network service client from the current session.
    fn network_client(&self) -> Result<Self::Network, AuthError>;
}

/// One catalog endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    pub interface: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    pub url: String,
}

/// One catalog entry (a service and its endpoints).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// Service catalog returned alongside a token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ServiceCatalog {
    pub entries: Vec<CatalogEntry>,
}

impl ServiceCatalog {
    /// Find the URL of a service endpoint by type, interface and (optionally) region.
    pub fn endpoint(
        &self,
        service_type: &str,
        interface: Interface,
        region: Option<&str>,
    ) -> Option<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.service_type == service_type)
            .flat_map(|entry| entry.endpoints.iter())
            .find(|ep| {
                ep.interface == interface.as_str()
                    && region.is_none_or(|r| {
                        ep.region.as_deref() == Some(r) || ep.region_id.as_deref() == Some(r)
                    })
            })
            .map(|ep| ep.url.as_str())
    }
}

/// An authenticated session: a scoped token and its service catalog.
#[derive(Clone)]
pub struct Session {
    token: String,
    expires_at: Option<String>,
    catalog: ServiceCatalog,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("expires_at", &self.expires_at)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(token: impl Into<String>, expires_at: Option<String>, catalog: ServiceCatalog) -> Self {
        Self {
            token: token.into(),
            expires_at,
            catalog,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Option<&str> {
        self.expires_at.as_deref()
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Deserialize)]
struct TokenBody {
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    catalog: ServiceCatalog,
}

/// Keystone v3 password-authenticating client.
pub struct KeystoneClient {
    http: reqwest::Client,
    config: CloudConfig,
    session: Option<Session>,
}

impl KeystoneClient {
    /// Create a client. No request is made until [`authenticate`](AuthenticatingClient::authenticate).
    pub fn new(config: CloudConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            config,
            session: None,
        })
    }

    /// The current session, if the last authentication succeeded.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn tokens_url(&self) -> String {
        let base = self.config.auth_url.trim_end_matches('/');
        if base.ends_with("/v3") {
            format!("{}/auth/tokens", base)
        } else {
            format!("{}/v3/auth/tokens", base)
        }
    }

    fn auth_body(&self) -> serde_json::Value {
        json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.config.username,
                            "domain": { "name": self.config.user_domain_name },
                            "password": self.config.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": self.config.project_name,
                        "domain": { "name": self.config.project_domain_name },
                    }
                }
            }
        })
    }

    async fn request_session(&self) -> Result<Session, AuthError> {
        let url = self.tokens_url();
        debug!(url = %url, user = %self.config.username, "Requesting token");

        let response = self.http.post(&url).json(&self.auth_body()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(AuthError::MissingToken)?;

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        Ok(Session::new(token, body.token.expires_at, body.token.catalog))
    }
}

#[async_trait]
impl AuthenticatingClient for KeystoneClient {
    type Network = NeutronClient;

    async fn authenticate(&mut self) -> Result<(), AuthError> {
        self.session = None;
        let session = self.request_session().await?;
        debug!(
            expires_at = session.expires_at().unwrap_or("unknown"),
            services = session.catalog().entries.len(),
            "Authenticated"
        );
        self.session = Some(session);
        Ok(())
    }

    fn network_client(&self) -> Result<NeutronClient, AuthError> {
        let session = self.session.as_ref().ok_or(AuthError::NotAuthenticated)?;
        let region = self.config.region_name.as_deref();

        let endpoint = session
            .catalog()
            .endpoint(NETWORK_SERVICE_TYPE, self.config.interface, region)
            .ok_or_else(|| AuthError::EndpointNotFound {
                service_type: NETWORK_SERVICE_TYPE.to_string(),
                interface: self.config.interface.as_str().to_string(),
                region: region.map(str::to_string),
            })?;

        Ok(NeutronClient::new(
            self.http.clone(),
            endpoint,
            session.token(),
        ))
    }
}
