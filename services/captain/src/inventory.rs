//! Client for the cloud inventory API.
//!
//! The inventory holds the fleet's machine records. Captain only ever asks it
//! one question: which hosts carrying a given tag are currently running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inventory API error {status}: {message}")]
    Api { status: u16, message: String },
}

/// One reservation record returned by the inventory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reservation {
    #[serde(default)]
    pub instances: Vec<HostRecord>,
}

/// One machine inside a reservation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostRecord {
    #[serde(default)]
    pub private_ip_address: Option<String>,
}

/// Seam over the inventory API so discovery can be tested without a server.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    /// Look up running hosts tagged `tag_name = tag_value`. Zero matches is
    /// an empty result, not an error.
    async fn describe_running_hosts(
        &self,
        tag_name: &str,
        tag_value: &str,
    ) -> Result<Vec<Reservation>, InventoryError>;
}

#[derive(Debug, Serialize)]
struct DescribeRequest {
    filters: Vec<Filter>,
}

#[derive(Debug, Serialize)]
struct Filter {
    name: String,
    values: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DescribeResponse {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

/// Inventory client backed by the real HTTP API.
#[derive(Clone)]
pub struct HttpInventory {
    http: reqwest::Client,
    base_url: String,
}

impl HttpInventory {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InventoryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl InventoryApi for HttpInventory {
    async fn describe_running_hosts(
        &self,
        tag_name: &str,
        tag_value: &str,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let url = format!("{}/instances/describe", self.base_url);
        let request = DescribeRequest {
            filters: vec![
                Filter {
                    name: format!("tag:{tag_name}"),
                    values: vec![tag_value.to_string()],
                },
                Filter {
                    name: "instance-state-name".to_string(),
                    values: vec!["running".to_string()],
                },
            ],
        };

        debug!(url = %url, tag_name = %tag_name, tag_value = %tag_value, "describing running hosts");
        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = %status, message = %message, "inventory describe failed");
            return Err(InventoryError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: DescribeResponse = response.json().await?;
        Ok(body.reservations)
    }
}

/// Mock inventory for tests.
pub struct MockInventory {
    hosts: Vec<String>,
    calls: AtomicU64,
    fail: bool,
}

impl MockInventory {
    /// Mock that answers every describe with the given hosts.
    pub fn new(hosts: Vec<String>) -> Self {
        Self {
            hosts,
            calls: AtomicU64::new(0),
            fail: false,
        }
    }

    /// Mock that fails every describe.
    pub fn failing() -> Self {
        Self {
            hosts: Vec::new(),
            calls: AtomicU64::new(0),
            fail: true,
        }
    }

    /// Number of describe calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventoryApi for MockInventory {
    async fn describe_running_hosts(
        &self,
        _tag_name: &str,
        _tag_value: &str,
    ) -> Result<Vec<Reservation>, InventoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(InventoryError::Api {
                status: 500,
                message: "mock inventory configured to fail".to_string(),
            });
        }
        Ok(vec![Reservation {
            instances: self
                .hosts
                .iter()
                .map(|host| HostRecord {
                    private_ip_address: Some(host.clone()),
                })
                .collect(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn describe_sends_tag_and_state_filters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instances/describe"))
            .and(body_partial_json(serde_json::json!({
                "filters": [
                    {"name": "tag:role", "values": ["docker"]},
                    {"name": "instance-state-name", "values": ["running"]},
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "reservations": [
                    {"instances": [
                        {"private_ip_address": "10.0.0.4"},
                        {"private_ip_address": "10.0.0.5"},
                    ]},
                    {"instances": [{"private_ip_address": "10.0.0.9"}]},
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let inventory = HttpInventory::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let reservations = inventory
            .describe_running_hosts("role", "docker")
            .await
            .unwrap();

        assert_eq!(reservations.len(), 2);
        assert_eq!(
            reservations[0].instances[1].private_ip_address.as_deref(),
            Some("10.0.0.5")
        );
    }

    #[tokio::test]
    async fn no_matching_hosts_is_an_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instances/describe"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"reservations": []})),
            )
            .mount(&server)
            .await;

        let inventory = HttpInventory::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let reservations = inventory
            .describe_running_hosts("role", "docker")
            .await
            .unwrap();

        assert!(reservations.is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instances/describe"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance window"))
            .mount(&server)
            .await;

        let inventory = HttpInventory::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = inventory
            .describe_running_hosts("role", "docker")
            .await
            .unwrap_err();

        match err {
            InventoryError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "maintenance window");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
