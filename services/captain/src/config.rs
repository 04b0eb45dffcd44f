//! Configuration for the captain server.

use std::net::SocketAddr;

use anyhow::{Context, Result};

/// Captain server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API binds to.
    pub listen_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Fixed node endpoint URLs. Empty when cloud discovery is active.
    pub nodes: Vec<String>,

    /// Inventory tag name that marks container hosts.
    pub cloud_tag_name: String,

    /// Inventory tag value. Setting it switches discovery to cloud mode.
    pub cloud_tag_value: Option<String>,

    /// Base URL of the inventory API, required in cloud mode.
    pub inventory_url: Option<String>,

    /// Credentials embedded in cloud-resolved node endpoints.
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,

    /// Seconds a resolved host list stays fresh before the inventory is
    /// queried again.
    pub cloud_refresh_secs: u64,

    /// Seconds an exited container is kept before garbage collection.
    pub gc_grace_secs: u64,

    /// Per-request timeout for node API calls, in seconds.
    pub node_timeout_secs: u64,

    /// Declared slot capacity of every node.
    pub slots_per_node: u32,

    /// Memory backing one slot, in MiB.
    pub slot_memory_mb: u64,

    /// Slots granted to an instance when the request does not say.
    pub default_slots: u32,

    /// Image every instance runs.
    pub runner_image: String,

    /// Command executed inside the runner image.
    pub runner_command: String,

    /// Tag applied to the runner image.
    pub runner_version: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("CAPTAIN_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
            .parse()?;

        let log_level = std::env::var("CAPTAIN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let nodes: Vec<String> = std::env::var("CAPTAIN_NODES")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cloud_tag_name =
            std::env::var("CAPTAIN_CLOUD_TAG_NAME").unwrap_or_else(|_| "role".to_string());
        let cloud_tag_value = std::env::var("CAPTAIN_CLOUD_TAG_VALUE").ok();
        let inventory_url = std::env::var("CAPTAIN_INVENTORY_URL").ok();
        let proxy_username = std::env::var("CAPTAIN_PROXY_USERNAME").ok();
        let proxy_password = std::env::var("CAPTAIN_PROXY_PASSWORD").ok();

        if !nodes.is_empty() && cloud_tag_value.is_some() {
            anyhow::bail!("CAPTAIN_NODES and CAPTAIN_CLOUD_TAG_VALUE are mutually exclusive");
        }

        if cloud_tag_value.is_some() {
            if inventory_url.is_none() {
                anyhow::bail!(
                    "CAPTAIN_INVENTORY_URL must be set when CAPTAIN_CLOUD_TAG_VALUE is set"
                );
            }
            if proxy_username.is_none() || proxy_password.is_none() {
                anyhow::bail!(
                    "CAPTAIN_CLOUD_TAG_VALUE requires CAPTAIN_PROXY_USERNAME and \
                     CAPTAIN_PROXY_PASSWORD"
                );
            }
        } else if nodes.is_empty() {
            anyhow::bail!("one of CAPTAIN_NODES or CAPTAIN_CLOUD_TAG_VALUE must be set");
        }

        // Defaults apply only when a variable is absent; a value that is
        // present must parse.
        let cloud_refresh_secs = std::env::var("CAPTAIN_CLOUD_REFRESH_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("CAPTAIN_CLOUD_REFRESH_SECS must be a number")?;

        let gc_grace_secs = std::env::var("CAPTAIN_GC_GRACE_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .context("CAPTAIN_GC_GRACE_SECS must be a number")?;

        let node_timeout_secs = std::env::var("CAPTAIN_NODE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .context("CAPTAIN_NODE_TIMEOUT_SECS must be a number")?;

        // A 16 GiB node at 128 MiB per slot, with headroom kept for the OS.
        let slots_per_node = std::env::var("CAPTAIN_SLOTS_PER_NODE")
            .unwrap_or_else(|_| "110".to_string())
            .parse()
            .context("CAPTAIN_SLOTS_PER_NODE must be a number")?;

        let slot_memory_mb = std::env::var("CAPTAIN_SLOT_MEMORY_MB")
            .unwrap_or_else(|_| "128".to_string())
            .parse()
            .context("CAPTAIN_SLOT_MEMORY_MB must be a number")?;

        let default_slots = std::env::var("CAPTAIN_DEFAULT_SLOTS")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .context("CAPTAIN_DEFAULT_SLOTS must be a number")?;

        let runner_image =
            std::env::var("CAPTAIN_RUNNER_IMAGE").context("CAPTAIN_RUNNER_IMAGE must be set")?;

        let runner_command = std::env::var("CAPTAIN_RUNNER_COMMAND")
            .context("CAPTAIN_RUNNER_COMMAND must be set")?;

        let runner_version =
            std::env::var("CAPTAIN_RUNNER_VERSION").unwrap_or_else(|_| "0.0.0".to_string());

        Ok(Self {
            listen_addr,
            log_level,
            nodes,
            cloud_tag_name,
            cloud_tag_value,
            inventory_url,
            proxy_username,
            proxy_password,
            cloud_refresh_secs,
            gc_grace_secs,
            node_timeout_secs,
            slots_per_node,
            slot_memory_mb,
            default_slots,
            runner_image,
            runner_command,
            runner_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: &[&str] = &[
        "CAPTAIN_LISTEN_ADDR",
        "CAPTAIN_LOG_LEVEL",
        "CAPTAIN_NODES",
        "CAPTAIN_CLOUD_TAG_NAME",
        "CAPTAIN_CLOUD_TAG_VALUE",
        "CAPTAIN_INVENTORY_URL",
        "CAPTAIN_PROXY_USERNAME",
        "CAPTAIN_PROXY_PASSWORD",
        "CAPTAIN_CLOUD_REFRESH_SECS",
        "CAPTAIN_GC_GRACE_SECS",
        "CAPTAIN_NODE_TIMEOUT_SECS",
        "CAPTAIN_SLOTS_PER_NODE",
        "CAPTAIN_SLOT_MEMORY_MB",
        "CAPTAIN_DEFAULT_SLOTS",
        "CAPTAIN_RUNNER_IMAGE",
        "CAPTAIN_RUNNER_COMMAND",
        "CAPTAIN_RUNNER_VERSION",
    ];

    /// Back to a minimal valid static-mode environment.
    fn reset_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
        std::env::set_var("CAPTAIN_NODES", "http://node-1:2376");
        std::env::set_var("CAPTAIN_RUNNER_IMAGE", "runner/image");
        std::env::set_var("CAPTAIN_RUNNER_COMMAND", "start web");
    }

    // The environment is process-global, so every scenario lives in this one
    // test instead of racing across parallel test threads.
    #[test]
    fn from_env_defaults_absent_numerics_and_rejects_garbage() {
        reset_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config.cloud_refresh_secs, 60);
        assert_eq!(config.gc_grace_secs, 86_400);
        assert_eq!(config.node_timeout_secs, 15);
        assert_eq!(config.slots_per_node, 110);
        assert_eq!(config.slot_memory_mb, 128);
        assert_eq!(config.default_slots, 2);

        reset_env();
        std::env::set_var("CAPTAIN_SLOTS_PER_NODE", "64");
        std::env::set_var("CAPTAIN_GC_GRACE_SECS", "3600");
        let config = Config::from_env().unwrap();
        assert_eq!(config.slots_per_node, 64);
        assert_eq!(config.gc_grace_secs, 3600);

        let garbage = [
            ("CAPTAIN_CLOUD_REFRESH_SECS", "60.5"),
            ("CAPTAIN_GC_GRACE_SECS", "1 day"),
            ("CAPTAIN_NODE_TIMEOUT_SECS", ""),
            ("CAPTAIN_SLOTS_PER_NODE", "ten"),
            ("CAPTAIN_SLOT_MEMORY_MB", "128MB"),
            ("CAPTAIN_DEFAULT_SLOTS", "-2"),
        ];
        for (var, value) in garbage {
            reset_env();
            std::env::set_var(var, value);
            let error = Config::from_env().unwrap_err();
            assert!(
                error.to_string().contains(var),
                "error for {var}={value:?} should name the variable: {error}"
            );
        }

        reset_env();
    }
}
