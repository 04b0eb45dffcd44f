//! # captain-docker-api
//!
//! Typed client for the container runtime management API exposed by each
//! node in a captain fleet.
//!
//! One [`DockerClient`] is bound to one node endpoint (scheme, host, port,
//! optional basic-auth credentials, request timeout) and covers the
//! operations the orchestrator needs:
//!
//! - list and inspect containers
//! - create, start, stop and remove containers
//! - fetch or follow container logs (with stream-frame demultiplexing)
//! - a lightweight liveness ping
//!
//! Wire models mirror the engine's JSON field names so captured traffic
//! stays greppable against the structs.

mod client;
mod error;
mod logs;
mod models;

pub use client::DockerClient;
pub use error::DockerError;
pub use logs::LogLines;
pub use models::{
    tcp_port, ContainerConfig, ContainerDetails, ContainerState, ContainerSummary,
    CreateContainerRequest, CreateHostConfig, CreatedContainer, Empty, HostConfig,
    HostPortRequest, NetworkSettings, PortBinding, PortSummary,
};

pub use reqwest::Url;
