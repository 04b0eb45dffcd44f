//! Wire models for the container runtime API.
//!
//! Field names mirror the engine's JSON (PascalCase) via serde renames so
//! the structs stay greppable against captured API traffic.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Map key for a TCP port, e.g. `8080/tcp`.
pub fn tcp_port(port: u16) -> String {
    format!("{port}/tcp")
}

// ============================================================================
// Listing
// ============================================================================

/// One entry from the container listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,
    /// Names carry a leading slash, e.g. `/paye_b51a5c`.
    #[serde(rename = "Names", default)]
    pub names: Vec<String>,
    #[serde(rename = "Image", default)]
    pub image: String,
    /// Coarse run state: `created`, `running`, `paused`, `restarting`,
    /// `exited` or `dead`.
    #[serde(rename = "State", default)]
    pub state: String,
    /// Human-readable status line, e.g. `Exited (0) 3 hours ago`.
    #[serde(rename = "Status", default)]
    pub status: String,
    /// Creation time, seconds since the Unix epoch.
    #[serde(rename = "Created", default)]
    pub created: i64,
    #[serde(rename = "Ports", default)]
    pub ports: Vec<PortSummary>,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    pub fn is_exited(&self) -> bool {
        self.state == "exited" || self.state == "dead"
    }
}

/// A published or exposed port in a listing entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PortSummary {
    #[serde(rename = "PrivatePort")]
    pub private_port: u16,
    /// Host-side port; absent when the port is exposed but not published.
    #[serde(rename = "PublicPort")]
    pub public_port: Option<u16>,
    #[serde(rename = "Type", default)]
    pub protocol: String,
}

// ============================================================================
// Inspection
// ============================================================================

/// Full inspection record for one container.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerDetails {
    #[serde(rename = "Id")]
    pub id: String,
    /// Name with a leading slash, e.g. `/paye_b51a5c`.
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Created")]
    pub created: Option<DateTime<Utc>>,
    #[serde(rename = "State")]
    pub state: ContainerState,
    #[serde(rename = "Config")]
    pub config: ContainerConfig,
    #[serde(rename = "HostConfig")]
    pub host_config: HostConfig,
    #[serde(rename = "NetworkSettings", default)]
    pub network_settings: NetworkSettings,
}

impl ContainerDetails {
    /// Container name without the leading slash.
    pub fn plain_name(&self) -> &str {
        self.name.trim_start_matches('/')
    }

    /// Host port the given internal TCP port is published on, post-start.
    pub fn published_port(&self, private_port: u16) -> Option<u16> {
        self.network_settings
            .ports
            .get(&tcp_port(private_port))?
            .as_ref()?
            .first()?
            .host_port
            .parse()
            .ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerState {
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Running", default)]
    pub running: bool,
    #[serde(rename = "StartedAt")]
    pub started_at: Option<DateTime<Utc>>,
    /// Exit time. The engine reports `0001-01-01T00:00:00Z` for containers
    /// that never ran.
    #[serde(rename = "FinishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    #[serde(rename = "Hostname", default)]
    pub hostname: String,
    /// Environment as `KEY=VALUE` strings.
    #[serde(rename = "Env", default)]
    pub env: Vec<String>,
    #[serde(rename = "Image", default)]
    pub image: String,
    #[serde(rename = "Cmd")]
    pub cmd: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Memory limit in bytes; 0 means unlimited.
    #[serde(rename = "Memory", default)]
    pub memory: i64,
    #[serde(rename = "CpuShares", default)]
    pub cpu_shares: i64,
    #[serde(rename = "PortBindings", default)]
    pub port_bindings: HashMap<String, Option<Vec<PortBinding>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkSettings {
    /// Resolved published ports; values are null for unpublished ports.
    #[serde(rename = "Ports", default)]
    pub ports: HashMap<String, Option<Vec<PortBinding>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortBinding {
    #[serde(rename = "HostIp", default)]
    pub host_ip: String,
    /// The engine reports host ports as strings.
    #[serde(rename = "HostPort", default)]
    pub host_port: String,
}

// ============================================================================
// Creation
// ============================================================================

/// Body for the create-container endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CreateContainerRequest {
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "Cmd", skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    #[serde(rename = "Env")]
    pub env: Vec<String>,
    #[serde(rename = "ExposedPorts")]
    pub exposed_ports: HashMap<String, Empty>,
    #[serde(rename = "Hostname", skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(rename = "HostConfig")]
    pub host_config: CreateHostConfig,
}

/// The engine expects `{}` as the value of each exposed-ports key.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Empty {}

#[derive(Debug, Clone, Serialize)]
pub struct CreateHostConfig {
    /// Memory limit in bytes.
    #[serde(rename = "Memory")]
    pub memory: i64,
    #[serde(rename = "CpuShares")]
    pub cpu_shares: i64,
    /// An empty `HostPort` requests a dynamically assigned host port.
    #[serde(rename = "PortBindings")]
    pub port_bindings: HashMap<String, Vec<HostPortRequest>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostPortRequest {
    #[serde(rename = "HostPort")]
    pub host_port: String,
}

/// Response from the create-container endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedContainer {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Warnings", default)]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_entry_deserializes() {
        let json = r#"{
            "Id": "eba8bea2600029",
            "Names": ["/paye_b51a5c"],
            "Image": "runner/image:0.0.73",
            "State": "running",
            "Status": "Up 3 hours",
            "Created": 1736172451,
            "Ports": [
                {"PrivatePort": 8080, "PublicPort": 9317, "Type": "tcp"}
            ]
        }"#;

        let entry: ContainerSummary = serde_json::from_str(json).unwrap();
        assert!(entry.is_running());
        assert!(!entry.is_exited());
        assert_eq!(entry.ports[0].private_port, 8080);
        assert_eq!(entry.ports[0].public_port, Some(9317));
    }

    #[test]
    fn test_exposed_but_unpublished_port() {
        let json = r#"{
            "Id": "jh23899fg00029",
            "Names": ["/sidecar"],
            "State": "running",
            "Status": "Up 2 hours",
            "Created": 1736172451,
            "Ports": [{"PrivatePort": 9000, "Type": "tcp"}]
        }"#;

        let entry: ContainerSummary = serde_json::from_str(json).unwrap();
        assert_eq!(entry.ports[0].public_port, None);
    }

    #[test]
    fn test_inspect_record_deserializes() {
        let json = r#"{
            "Id": "eba8bea2600029",
            "Name": "/paye_b51a5c",
            "Created": "2025-01-06T12:07:31.485331387Z",
            "State": {
                "Status": "running",
                "Running": true,
                "StartedAt": "2025-01-06T12:07:32.1Z",
                "FinishedAt": "0001-01-01T00:00:00Z"
            },
            "Config": {
                "Hostname": "eba8bea26000",
                "Env": ["PORT=8080", "PATH=/usr/bin"],
                "Image": "runner/image:0.0.73"
            },
            "HostConfig": {
                "Memory": 268435456,
                "CpuShares": 2,
                "PortBindings": {"8080/tcp": [{"HostIp": "", "HostPort": ""}]}
            },
            "NetworkSettings": {
                "Ports": {"8080/tcp": [{"HostIp": "0.0.0.0", "HostPort": "9317"}]}
            }
        }"#;

        let details: ContainerDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details.plain_name(), "paye_b51a5c");
        assert_eq!(details.published_port(8080), Some(9317));
        assert_eq!(details.host_config.memory, 268435456);
        assert_eq!(details.state.finished_at.unwrap().timestamp(), -62135596800);
    }

    #[test]
    fn test_published_port_handles_null_binding() {
        let json = r#"{
            "Id": "x",
            "Name": "/x",
            "State": {"Status": "running", "Running": true},
            "Config": {},
            "HostConfig": {},
            "NetworkSettings": {"Ports": {"8080/tcp": null}}
        }"#;

        let details: ContainerDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details.published_port(8080), None);
    }

    #[test]
    fn test_create_request_serializes_engine_field_names() {
        let mut exposed = HashMap::new();
        exposed.insert(tcp_port(8080), Empty {});
        let mut bindings = HashMap::new();
        bindings.insert(
            tcp_port(8080),
            vec![HostPortRequest { host_port: String::new() }],
        );

        let request = CreateContainerRequest {
            image: "runner/image:0.0.73".to_string(),
            cmd: Some(vec!["start".to_string(), "web".to_string()]),
            env: vec!["PORT=8080".to_string()],
            exposed_ports: exposed,
            hostname: None,
            host_config: CreateHostConfig {
                memory: 256 * 1024 * 1024,
                cpu_shares: 2,
                port_bindings: bindings,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["Image"], "runner/image:0.0.73");
        assert_eq!(json["HostConfig"]["Memory"], 268435456);
        assert_eq!(json["ExposedPorts"]["8080/tcp"], serde_json::json!({}));
        assert_eq!(json["HostConfig"]["PortBindings"]["8080/tcp"][0]["HostPort"], "");
        assert!(json.get("Hostname").is_none());
    }
}
