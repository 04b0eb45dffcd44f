//! End-to-end happy path test.
//!
//! This test boots a full captain server against a mock container engine and
//! walks the complete operator flow, verifying:
//!
//! 1. Readiness with a resolved node pool
//! 2. Place an instance
//! 3. See it in the instance list and the fleet summary
//! 4. Read its capacity off the node descriptor
//! 5. Fetch its logs
//! 6. Stop it
//!
//! ## Running
//!
//! ```bash
//! cargo test -p captain-e2e --test happy_path
//! ```

use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use captain_server::api;
use captain_server::config::Config;
use captain_server::orchestrator::Orchestrator;
use captain_server::pool::NodePool;
use captain_server::state::AppState;

const NODE: &str = "127.0.0.1";
const INSTANCE_ID: &str = "e2e0123456789a";

fn e2e_config() -> Config {
    Config {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "info".to_string(),
        nodes: Vec::new(),
        cloud_tag_name: "role".to_string(),
        cloud_tag_value: None,
        inventory_url: None,
        proxy_username: None,
        proxy_password: None,
        cloud_refresh_secs: 60,
        gc_grace_secs: 86_400,
        node_timeout_secs: 5,
        slots_per_node: 10,
        slot_memory_mb: 128,
        default_slots: 2,
        runner_image: "runner/image".to_string(),
        runner_command: "start web".to_string(),
        runner_version: "0.0.73".to_string(),
    }
}

/// Script the engine: an empty node that gains one instance after the
/// placement lands. The first listing (admission control) sees the node
/// empty; every listing after that sees the placed container.
async fn script_engine(engine: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/containers/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(engine)
        .await;
    Mock::given(method("GET"))
        .and(path("/containers/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "Id": INSTANCE_ID,
            "Names": ["/paye_e2e"],
            "Image": "runner/image:0.0.73",
            "State": "running",
            "Status": "Up 1 second",
            "Created": 1_755_000_000i64,
            "Ports": [{"PrivatePort": 8080, "PublicPort": 9317, "Type": "tcp"}]
        }])))
        .mount(engine)
        .await;

    Mock::given(method("POST"))
        .and(path("/containers/create"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"Id": INSTANCE_ID, "Warnings": []})),
        )
        .mount(engine)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/containers/{INSTANCE_ID}/start")))
        .respond_with(ResponseTemplate::new(204))
        .mount(engine)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/containers/{INSTANCE_ID}/json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Id": INSTANCE_ID,
            "Name": "/paye_e2e",
            "State": {
                "Status": "running",
                "Running": true,
                "StartedAt": "2026-08-21T09:00:00Z",
                "FinishedAt": "0001-01-01T00:00:00Z"
            },
            "Config": {
                "Hostname": "",
                "Env": [
                    "JAVA_OPTS=-Xmx256m -Xms256m",
                    "PORT=8080",
                    "SOURCE_URL=https://host/paye_216.tgz",
                    "PATH=/usr/local/bin:/usr/bin"
                ],
                "Image": "runner/image:0.0.73"
            },
            "HostConfig": {
                "Memory": 268_435_456i64,
                "CpuShares": 2,
                "PortBindings": {"8080/tcp": [{"HostIp": "", "HostPort": ""}]}
            },
            "NetworkSettings": {
                "Ports": {"8080/tcp": [{"HostIp": "0.0.0.0", "HostPort": "9317"}]}
            }
        })))
        .mount(engine)
        .await;

    Mock::given(method("GET"))
        .and(path("/_ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(engine)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/containers/{INSTANCE_ID}/logs")))
        .and(query_param("follow", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_string("booting paye\nready on 8080\n"))
        .mount(engine)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/containers/{INSTANCE_ID}/stop")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(engine)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/containers/{INSTANCE_ID}")))
        .and(query_param("force", "true"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(engine)
        .await;
}

#[tokio::test]
async fn test_happy_path() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,captain_server=debug".into()),
        )
        .with_test_writer()
        .try_init();

    let engine = MockServer::start().await;
    script_engine(&engine).await;

    let config = e2e_config();
    let pool = NodePool::build(
        &[engine.uri()],
        Duration::from_secs(config.node_timeout_secs),
    );
    let orchestrator = Orchestrator::new(pool, &config);
    let state = AppState::new(orchestrator);
    let app = api::create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();

    // 1. The captain is ready once its pool resolved.
    let resp = client
        .get(format!("{base_url}/readyz"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200, "captain should be ready");

    // 2. Place an instance.
    let resp = client
        .post(format!("{base_url}/v1/instances"))
        .json(&json!({
            "app": "paye",
            "source_uri": "https://host/paye_216.tgz",
            "node": NODE,
            "environment": {"JAVA_OPTS": "-Xmx256m -Xms256m"}
        }))
        .send()
        .await
        .unwrap();
    let status = resp.status();
    let instance: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(status, 201, "placement failed: {instance:?}");
    assert_eq!(instance["id"], INSTANCE_ID);
    assert_eq!(instance["app"], "paye");
    assert_eq!(instance["node"], NODE);
    assert_eq!(instance["port"], 9317);

    // 3. It shows up in the list and in the summary.
    let resp = client
        .get(format!("{base_url}/v1/instances"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let instances: serde_json::Value = resp.json().await.unwrap();
    let items = instances.as_array().expect("instances must be an array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], INSTANCE_ID);

    let resp = client
        .get(format!("{base_url}/v1/summary"))
        .send()
        .await
        .unwrap();
    let summary: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(summary["total_instances"], 1);
    assert_eq!(summary["apps"]["paye"], 1);

    // 4. The node accounts for its slots.
    let resp = client
        .get(format!("{base_url}/v1/nodes/{NODE}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let node: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(node["state"], "healthy");
    assert_eq!(node["slots"], json!({"total": 10, "used": 2, "free": 8}));

    // 5. Logs stream back as ndjson.
    let resp = client
        .get(format!("{base_url}/v1/instances/{INSTANCE_ID}/logs"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/x-ndjson");
    let body = resp.text().await.unwrap();
    assert_eq!(body, "{\"msg\":\"booting paye\"}\n{\"msg\":\"ready on 8080\"}\n");

    // 6. Stop the instance.
    let resp = client
        .delete(format!("{base_url}/v1/instances/{INSTANCE_ID}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204, "stop failed");
}
