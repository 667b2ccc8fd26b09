//! Failure injection over real sockets: HTTP health probes against a flaky
//! backend and the admin API driving breaker state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use provider_failover::admin::AdminServer;
use provider_failover::config::{AdminConfig, ProberConfig};
use provider_failover::health::{HealthProber, HttpProbe};
use provider_failover::registry::ProviderSpec;
use provider_failover::resilience::{CircuitState, ErrorKind};
use provider_failover::Shutdown;
use serde_json::{json, Value};
use tokio::net::TcpListener;

mod common;
use common::{breaker, chat_registry, orchestrator, start_programmable_backend, Behaviour, FakeFleet};

fn prober_config() -> ProberConfig {
    ProberConfig {
        enabled: true,
        interval_ms: 20,
        timeout_ms: 500,
        stale_after_ms: 3_600_000,
    }
}

#[tokio::test]
async fn http_probe_reopens_then_recovers_flaky_backend() {
    // 503 on the first probe, healthy afterwards
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let addr = start_programmable_backend(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                (503, "warming up".to_string())
            } else {
                (200, "ok".to_string())
            }
        }
    })
    .await;

    let registry = chat_registry(&[], breaker(1, 50));
    let probe = HttpProbe::new(&format!("http://{addr}/health")).unwrap();
    let p1 = registry.register_with_probe(
        ProviderSpec::new("p1").with_capability("chat").with_breaker(breaker(1, 50)),
        Arc::new(probe),
    );
    p1.breaker().record_failure(ErrorKind::Transient);

    let prober = HealthProber::new(registry.clone(), prober_config());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(prober.check_all().await, 1);
    let snap = p1.breaker().snapshot();
    assert_eq!(snap.state, CircuitState::Open);
    assert_eq!(snap.reset_timeout_ms, 100);

    // Backed-off timeout not yet elapsed
    assert_eq!(prober.check_all().await, 0);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(prober.check_all().await, 1);
    let snap = p1.breaker().snapshot();
    assert_eq!(snap.state, CircuitState::Closed);
    assert_eq!(snap.reset_timeout_ms, 50);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unreachable_probe_target_keeps_circuit_open() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let registry = chat_registry(&[], breaker(1, 20));
    let p1 = registry.register_with_probe(
        ProviderSpec::new("p1").with_capability("chat").with_breaker(breaker(1, 20)),
        Arc::new(HttpProbe::new(&format!("http://{addr}/health")).unwrap()),
    );
    p1.breaker().record_failure(ErrorKind::Transient);

    let prober = HealthProber::new(registry.clone(), prober_config());
    let (tx, rx) = tokio::sync::broadcast::channel(1);
    let task = tokio::spawn(prober.run(rx));

    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(()).unwrap();
    task.await.unwrap();

    let snap = p1.breaker().snapshot();
    assert_eq!(snap.state, CircuitState::Open);
    assert!(snap.trips >= 2, "failed probes re-open the circuit");
    assert!(p1.telemetry().snapshot().error_kinds.contains_key(&ErrorKind::Transient));
}

#[tokio::test]
async fn admin_force_state_steers_live_traffic() {
    let registry = chat_registry(&["p1", "p2"], breaker(3, 60_000));
    let orch = Arc::new(orchestrator(&registry));
    let fleet = FakeFleet::new();
    fleet.set("p2", Behaviour::Succeed);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let config = AdminConfig {
        enabled: true,
        bind_address: addr.to_string(),
        api_key: Some("secret".to_string()),
        ..AdminConfig::default()
    };
    let server = AdminServer::new(orch.clone(), &config);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let denied = client
        .post(format!("{base}/providers/p1/force-state"))
        .json(&json!({ "state": "OPEN" }))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 401);

    let forced = client
        .post(format!("{base}/providers/p1/force-state"))
        .bearer_auth("secret")
        .json(&json!({ "state": "OPEN" }))
        .send()
        .await
        .unwrap();
    assert_eq!(forced.status(), 200);
    let body: Value = forced.json().await.unwrap();
    assert_eq!(body["breaker"]["state"], "OPEN");

    let reply = orch.handle("chat", |p| fleet.call(p)).await.unwrap();
    assert_eq!(reply, "reply from p2");
    assert_eq!(fleet.calls_to("p1"), 0);

    let health: Value = client
        .get(format!("{base}/providers/health"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let providers = health.as_array().unwrap();
    assert_eq!(providers.len(), 2);
    assert_eq!(providers[0]["id"], "p1");
    assert_eq!(providers[0]["breaker_state"], "OPEN");
    assert_eq!(providers[1]["success_rate"], 1.0);

    let closed = client
        .post(format!("{base}/providers/p1/force-state"))
        .bearer_auth("secret")
        .json(&json!({ "state": "CLOSED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(closed.status(), 200);

    let reply = orch.handle("chat", |p| fleet.call(p)).await.unwrap();
    assert_eq!(reply, "reply from p1");

    shutdown.trigger();
    server_task.await.unwrap().unwrap();
}
