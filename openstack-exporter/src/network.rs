//! Client for the OpenStack network service (Neutron v2.0 API).
//!
//! Only the fields the exporter consumes are modelled; everything else in
//! the API responses is ignored during deserialization.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::trace;

/// Errors returned by network service calls.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to decode {collection} response: {message}")]
    Decode { collection: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FloatingIp {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Network {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SecurityGroup {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Subnet {
    #[serde(default)]
    pub id: String,
}

/// A network agent (L3, DHCP, metadata, OVS...) as reported by Neutron.
///
/// Missing or `null` fields decode to their zero value, so one incomplete
/// record never fails the whole agent list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Agent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub host: String,
    /// Service binary name, e.g. `neutron-l3-agent`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub binary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub alive: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub admin_state_up: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Read-only list operations of the network service.
#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>, NetworkError>;
    async fn list_agents(&self) -> Result<Vec<Agent>, NetworkError>;
    async fn list_networks(&self) -> Result<Vec<Network>, NetworkError>;
    async fn list_security_groups(&self) -> Result<Vec<SecurityGroup>, NetworkError>;
    async fn list_subnets(&self) -> Result<Vec<Subnet>, NetworkError>;
}

/// HTTP client for Neutron, bound to one endpoint and one token.
#[derive(Clone)]
pub struct NeutronClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for NeutronClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeutronClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl NeutronClient {
    /// Create a client for the given catalog endpoint.
    ///
    /// The `/v2.0` API version suffix is appended unless the endpoint
    /// already carries it.
    pub fn new(http: reqwest::Client, endpoint: &str, token: impl Into<String>) -> Self {
        let trimmed = endpoint.trim_end_matches('/');
        let base_url = if trimmed.ends_with("/v2.0") {
            trimmed.to_string()
        } else {
            format!("{}/v2.0", trimmed)
        };

        Self {
            http,
            base_url,
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `{base_url}/{path}` and decode the `collection` array from the body.
    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        collection: &str,
    ) -> Result<Vec<T>, NetworkError> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .http
            .get(&url)
            .header("X-Auth-Token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| NetworkError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let mut body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|source| NetworkError::Transport {
                    url: url.clone(),
                    source,
                })?;

        let items = body
            .get_mut(collection)
            .map(serde_json::Value::take)
            .ok_or_else(|| NetworkError::Decode {
                collection: collection.to_string(),
                message: format!("missing '{}' field", collection),
            })?;

        let items: Vec<T> = serde_json::from_value(items).map_err(|e| NetworkError::Decode {
            collection: collection.to_string(),
            message: e.to_string(),
        })?;

        trace!(url = %url, count = items.len(), "Listed {}", collection);
        Ok(items)
    }
}

#[async_trait]
impl NetworkApi for NeutronClient {
    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>, NetworkError> {
        self.list("floatingips", "floatingips").await
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, NetworkError> {
        self.list("agents", "agents").await
    }

    async fn list_networks(&self) -> Result<Vec<Network>, NetworkError> {
        self.list("networks", "networks").await
    }

    async fn list_security_groups(&self) -> Result<Vec<SecurityGroup>, NetworkError> {
        self.list("security-groups", "security_groups").await
    }

    async fn list_subnets(&self) -> Result<Vec<Subnet>, NetworkError> {
        self.list("subnets", "subnets").await
    }
}
