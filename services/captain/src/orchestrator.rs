//! Fleet-wide instance and node operations.
//!
//! All state lives on the nodes themselves. Every operation re-reads the
//! fleet, so several captains (or a captain and an operator with a docker
//! client) can work against the same nodes without coordinating.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use captain_docker_api::{
    tcp_port, ContainerDetails, ContainerSummary, CreateContainerRequest, CreateHostConfig,
    DockerClient, DockerError, Empty, HostPortRequest, LogLines,
};

use crate::config::Config;
use crate::discovery::NodeResolver;
use crate::error::CaptainError;
use crate::model::{Instance, InstanceSummary, NodeDescriptor, SlotUsage};
use crate::pool::NodePool;

/// Port every application listens on inside its container.
pub const APP_PORT: u16 = 8080;

/// Environment key carrying the source bundle location into the runner.
const SOURCE_URL_KEY: &str = "SOURCE_URL";

/// Environment keys owned by the platform, hidden from instance views.
const RESERVED_ENV_KEYS: [&str; 4] = ["HOME", "PATH", "PORT", SOURCE_URL_KEY];

/// Node calls allowed in flight during one fan-out.
const FANOUT_LIMIT: usize = 8;

/// Parameters for placing one instance on a node.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub app: String,
    pub source_uri: String,
    pub node: String,
    pub environment: HashMap<String, String>,
    /// Slot cost; the configured default applies when unset.
    pub slots: Option<u32>,
    pub hostname: Option<String>,
    /// Overrides the configured runner image tag for this launch only.
    pub runner_version: Option<String>,
}

/// Log lines for one instance.
pub enum InstanceLogs {
    /// Complete history at the time of the call.
    History(Vec<String>),
    /// Live stream following new output until the consumer drops it.
    Follow(LogLines),
}

pub struct Orchestrator {
    pool: NodePool,
    limiter: Arc<Semaphore>,
    gc_grace_secs: i64,
    slots_per_node: u32,
    slot_memory_mb: u64,
    default_slots: u32,
    runner_image: String,
    runner_command: String,
    runner_version: String,
}

impl Orchestrator {
    pub fn new(pool: NodePool, config: &Config) -> Self {
        Self {
            pool,
            limiter: Arc::new(Semaphore::new(FANOUT_LIMIT)),
            gc_grace_secs: config.gc_grace_secs as i64,
            slots_per_node: config.slots_per_node,
            slot_memory_mb: config.slot_memory_mb,
            default_slots: config.default_slots,
            runner_image: config.runner_image.clone(),
            runner_command: config.runner_command.clone(),
            runner_version: config.runner_version.clone(),
        }
    }

    /// Resolve the fleet and build an orchestrator over it.
    pub async fn from_resolver(
        resolver: &dyn NodeResolver,
        config: &Config,
    ) -> Result<Self, CaptainError> {
        let endpoints = resolver.resolve().await?;
        let pool = NodePool::build(&endpoints, Duration::from_secs(config.node_timeout_secs));
        Ok(Self::new(pool, config))
    }

    /// Ids of every node in the pool, in no particular order.
    pub fn node_ids(&self) -> Vec<String> {
        self.pool.node_ids()
    }

    /// All live instances on the fleet, or on one node when filtered.
    ///
    /// Each node is swept concurrently; a node that cannot be reached is
    /// logged and contributes nothing. The sweep doubles as the garbage
    /// collector: exited containers past the grace period are removed along
    /// the way. Ordering across nodes is not defined.
    pub async fn list_instances(
        &self,
        node_filter: Option<&str>,
    ) -> Result<Vec<Instance>, CaptainError> {
        let clients = self.clients_for(node_filter)?;

        let mut handles = Vec::with_capacity(clients.len());
        for (node, client) in clients {
            let limiter = Arc::clone(&self.limiter);
            let gc_grace_secs = self.gc_grace_secs;
            let slot_memory_mb = self.slot_memory_mb;
            handles.push(tokio::spawn(async move {
                let _permit = match limiter.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Vec::new(),
                };
                match sweep_node(&node, &client, gc_grace_secs, slot_memory_mb).await {
                    Ok(instances) => instances,
                    Err(error) => {
                        error!(node = %node, error = %error, "failed to list instances on node");
                        Vec::new()
                    }
                }
            }));
        }

        let mut instances = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(found) => instances.extend(found),
                Err(error) => error!(error = %error, "node sweep task failed"),
            }
        }
        Ok(instances)
    }

    /// Capacity and health of one node.
    pub async fn get_node(&self, node: &str) -> Result<NodeDescriptor, CaptainError> {
        let client = self.pool.get(node).ok_or_else(|| CaptainError::NodeNotFound {
            node: node.to_string(),
        })?;
        Ok(describe_node(
            node.to_string(),
            client,
            self.slots_per_node,
            self.gc_grace_secs,
            self.slot_memory_mb,
        )
        .await)
    }

    /// Descriptors for the whole fleet, one per pool member.
    ///
    /// An unreachable node appears as a degraded descriptor rather than
    /// disappearing from the list, so fleet reports always account for every
    /// configured node.
    pub async fn get_nodes(&self) -> Vec<NodeDescriptor> {
        let mut handles = Vec::new();
        for (node, client) in self.pool.clients() {
            let limiter = Arc::clone(&self.limiter);
            let total_slots = self.slots_per_node;
            let gc_grace_secs = self.gc_grace_secs;
            let slot_memory_mb = self.slot_memory_mb;
            handles.push(tokio::spawn(async move {
                let _permit = match limiter.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return NodeDescriptor::degraded(node, "worker pool closed"),
                };
                describe_node(node, client, total_slots, gc_grace_secs, slot_memory_mb).await
            }));
        }

        let mut nodes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(descriptor) => nodes.push(descriptor),
                Err(error) => error!(error = %error, "node description task failed"),
            }
        }
        nodes
    }

    /// Place and start one instance.
    ///
    /// Admission control reads the node's current usage fresh rather than
    /// trusting any cached figure. The check and the create are still two
    /// steps: concurrent placements on the same node can both pass the check
    /// before either lands, so capacity can transiently overshoot.
    pub async fn start_instance(&self, request: LaunchRequest) -> Result<Instance, CaptainError> {
        let node = request.node.clone();
        let client = self.pool.get(&node).ok_or_else(|| CaptainError::NodeNotFound {
            node: node.clone(),
        })?;

        let slots = request.slots.unwrap_or(self.default_slots);
        let resident = self.list_instances(Some(&node)).await?;
        let used: u32 = resident.iter().map(|instance| instance.slots).sum();
        if used.saturating_add(slots) > self.slots_per_node {
            return Err(CaptainError::CapacityExceeded {
                node,
                requested: slots,
                used,
                total: self.slots_per_node,
            });
        }

        let version = request
            .runner_version
            .as_deref()
            .unwrap_or(&self.runner_version);
        let image = format!("{}:{}", self.runner_image, version);

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(tcp_port(APP_PORT), Empty {});
        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            tcp_port(APP_PORT),
            vec![HostPortRequest {
                host_port: String::new(),
            }],
        );

        let create = CreateContainerRequest {
            image,
            cmd: Some(
                self.runner_command
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
            ),
            env: launch_env(&request.environment, &request.source_uri),
            exposed_ports,
            hostname: request.hostname.clone(),
            host_config: CreateHostConfig {
                memory: i64::from(slots) * self.slot_memory_mb as i64 * 1024 * 1024,
                cpu_shares: i64::from(slots),
                port_bindings,
            },
        };

        let name = format!("{}_{}", request.app, Uuid::new_v4());
        info!(node = %node, app = %request.app, name = %name, slots, "starting instance");

        let created = client
            .create_container(&name, &create)
            .await
            .map_err(|error| CaptainError::unreachable(&node, error))?;
        if !created.warnings.is_empty() {
            warn!(node = %node, container = %created.id, warnings = ?created.warnings, "create returned warnings");
        }

        client
            .start_container(&created.id)
            .await
            .map_err(|error| CaptainError::unreachable(&node, error))?;

        // The engine assigns the host port during start, so inspect again.
        let details = client
            .inspect_container(&created.id)
            .await
            .map_err(|error| CaptainError::unreachable(&node, error))?;
        let instance = instance_from_details(&node, &details, self.slot_memory_mb);
        info!(node = %node, container = %instance.id, port = ?instance.port, "instance started");
        Ok(instance)
    }

    /// Stop an instance wherever it lives. Returns false when no live
    /// instance carries the id, which makes repeated stops harmless.
    pub async fn stop_instance(&self, instance_id: &str) -> Result<bool, CaptainError> {
        let instances = self.list_instances(None).await?;
        let Some(instance) = instances
            .into_iter()
            .find(|instance| instance.id == instance_id)
        else {
            debug!(instance = %instance_id, "stop requested for unknown instance");
            return Ok(false);
        };

        let client = self
            .pool
            .get(&instance.node)
            .ok_or_else(|| CaptainError::NodeNotFound {
                node: instance.node.clone(),
            })?;

        client
            .stop_container(instance_id)
            .await
            .map_err(|error| CaptainError::unreachable(&instance.node, error))?;

        // Removal is cleanup on top of a successful stop.
        if let Err(error) = client.remove_container(instance_id, true).await {
            warn!(
                node = %instance.node,
                container = %instance_id,
                error = %error,
                "failed to remove stopped container"
            );
        }

        info!(node = %instance.node, container = %instance_id, "instance stopped");
        Ok(true)
    }

    /// Log lines for one instance, historical or followed.
    pub async fn get_logs(
        &self,
        instance_id: &str,
        follow: bool,
    ) -> Result<InstanceLogs, CaptainError> {
        let instances = self.list_instances(None).await?;
        let Some(instance) = instances
            .into_iter()
            .find(|instance| instance.id == instance_id)
        else {
            return Err(CaptainError::InstanceNotFound {
                instance: instance_id.to_string(),
            });
        };

        let client = self
            .pool
            .get(&instance.node)
            .ok_or_else(|| CaptainError::NodeNotFound {
                node: instance.node.clone(),
            })?;

        if follow {
            let lines = client
                .follow_logs(instance_id)
                .await
                .map_err(|error| CaptainError::unreachable(&instance.node, error))?;
            Ok(InstanceLogs::Follow(lines))
        } else {
            let lines = client
                .container_logs(instance_id)
                .await
                .map_err(|error| CaptainError::unreachable(&instance.node, error))?;
            Ok(InstanceLogs::History(lines))
        }
    }

    /// Instance counts for the whole fleet, grouped by app.
    pub async fn get_instance_summary(&self) -> Result<InstanceSummary, CaptainError> {
        let instances = self.list_instances(None).await?;
        Ok(InstanceSummary::from_instances(&instances))
    }

    fn clients_for(
        &self,
        node_filter: Option<&str>,
    ) -> Result<Vec<(String, DockerClient)>, CaptainError> {
        match node_filter {
            Some(node) => {
                let client = self.pool.get(node).ok_or_else(|| CaptainError::NodeNotFound {
                    node: node.to_string(),
                })?;
                Ok(vec![(node.to_string(), client)])
            }
            None => Ok(self.pool.clients()),
        }
    }
}

/// List one node's containers, convert the live ones and collect the
/// expired exited ones. Failures here fail the whole node, which the
/// callers isolate.
async fn sweep_node(
    node: &str,
    client: &DockerClient,
    gc_grace_secs: i64,
    slot_memory_mb: u64,
) -> Result<Vec<Instance>, DockerError> {
    let summaries = client.list_containers(true).await?;
    let mut instances = Vec::new();

    for summary in summaries {
        if summary.is_running() {
            if !publishes_app_port(&summary) {
                // Not one of ours.
                continue;
            }
            let details = client.inspect_container(&summary.id).await?;
            instances.push(instance_from_details(node, &details, slot_memory_mb));
        } else if summary.is_exited() {
            collect_if_expired(node, client, &summary.id, gc_grace_secs).await?;
        }
        // Created and paused containers stay untouched either way.
    }

    Ok(instances)
}

/// Remove an exited container once it has sat beyond the grace period.
/// Containers the engine never ran report the zero time as their exit time
/// and age out immediately.
async fn collect_if_expired(
    node: &str,
    client: &DockerClient,
    id: &str,
    gc_grace_secs: i64,
) -> Result<(), DockerError> {
    let details = client.inspect_container(id).await?;
    let Some(finished_at) = details.state.finished_at else {
        return Ok(());
    };

    let idle_secs = Utc::now().signed_duration_since(finished_at).num_seconds();
    if idle_secs <= gc_grace_secs {
        return Ok(());
    }

    info!(node = %node, container = %id, idle_secs, "removing expired container");
    if let Err(error) = client.remove_container(id, false).await {
        warn!(node = %node, container = %id, error = %error, "failed to remove expired container");
    }
    Ok(())
}

/// Health-check one node and count its resident slots, degrading to a
/// zero-capacity descriptor when the node cannot answer.
async fn describe_node(
    node: String,
    client: DockerClient,
    total_slots: u32,
    gc_grace_secs: i64,
    slot_memory_mb: u64,
) -> NodeDescriptor {
    if let Err(error) = client.ping().await {
        warn!(node = %node, error = %error, "node health check failed");
        return NodeDescriptor::degraded(node, error.to_string());
    }

    match sweep_node(&node, &client, gc_grace_secs, slot_memory_mb).await {
        Ok(instances) => {
            let used = instances.iter().map(|instance| instance.slots).sum();
            NodeDescriptor::healthy(node, SlotUsage::new(total_slots, used))
        }
        Err(error) => {
            error!(node = %node, error = %error, "failed to list instances on node");
            NodeDescriptor::degraded(node, error.to_string())
        }
    }
}

/// True when the listing shows exactly one published mapping of the app
/// port. Anything else is not an instance this fleet manages.
fn publishes_app_port(summary: &ContainerSummary) -> bool {
    let mut mappings = summary
        .ports
        .iter()
        .filter(|port| port.private_port == APP_PORT && port.public_port.is_some());
    mappings.next().is_some() && mappings.next().is_none()
}

/// Launch environment: the caller's variables with the platform's port and
/// source location injected over them, in stable order.
fn launch_env(environment: &HashMap<String, String>, source_uri: &str) -> Vec<String> {
    let mut env: Vec<String> = environment
        .iter()
        .filter(|(key, _)| key.as_str() != "PORT" && key.as_str() != SOURCE_URL_KEY)
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    env.sort();
    env.push(format!("PORT={APP_PORT}"));
    env.push(format!("{SOURCE_URL_KEY}={source_uri}"));
    env
}

/// Build the instance view of an inspected container.
fn instance_from_details(node: &str, details: &ContainerDetails, slot_memory_mb: u64) -> Instance {
    let name = details.plain_name();
    let app = match name.split_once('_') {
        Some((app, _)) => app.to_string(),
        None => name.to_string(),
    };

    let mut environment = HashMap::new();
    for entry in &details.config.env {
        if let Some((key, value)) = entry.split_once('=') {
            environment.insert(key.to_string(), value.to_string());
        }
    }
    let source_uri = environment.get(SOURCE_URL_KEY).cloned();
    for key in RESERVED_ENV_KEYS {
        environment.remove(key);
    }

    let per_slot_bytes = slot_memory_mb.saturating_mul(1024 * 1024);
    let memory = details.host_config.memory.max(0) as u64;
    let slots = if per_slot_bytes == 0 {
        0
    } else {
        (memory / per_slot_bytes) as u32
    };

    Instance {
        id: details.id.clone(),
        app,
        node: node.to_string(),
        port: details.published_port(APP_PORT),
        slots,
        environment,
        source_uri,
    }
}
