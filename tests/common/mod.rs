//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use provider_failover::registry::{Provider, ProviderRegistry, ProviderSpec};
use provider_failover::resilience::{BreakerSettings, ProviderError};
use provider_failover::Orchestrator;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// How a fake provider answers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behaviour {
    Succeed,
    /// 503 from the provider (transient).
    Unavailable,
    /// 400 from the provider (fatal-request).
    BadRequest,
    /// Answers after the given delay.
    Slow(Duration),
}

/// Scripted stand-in for real provider clients, keyed by provider id.
#[derive(Debug, Default)]
pub struct FakeFleet {
    behaviours: Mutex<HashMap<String, Behaviour>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFleet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, id: &str, behaviour: Behaviour) {
        self.behaviours.lock().insert(id.to_string(), behaviour);
    }

    /// Provider ids in the order they were called.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, id: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == id).count()
    }

    pub async fn call(&self, provider: Arc<Provider>) -> Result<String, ProviderError> {
        let id = provider.id().to_string();
        self.calls.lock().push(id.clone());
        let behaviour = self
            .behaviours
            .lock()
            .get(&id)
            .copied()
            .unwrap_or(Behaviour::Succeed);

        match behaviour {
            Behaviour::Succeed => Ok(format!("reply from {id}")),
            Behaviour::Unavailable => Err(ProviderError::status(503, "service unavailable")),
            Behaviour::BadRequest => Err(ProviderError::status(400, "malformed prompt")),
            Behaviour::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(format!("slow reply from {id}"))
            }
        }
    }
}

pub fn breaker(threshold: u32, reset_ms: u64) -> BreakerSettings {
    BreakerSettings {
        failure_threshold: threshold,
        reset_timeout: Duration::from_millis(reset_ms),
        max_reset_timeout: Duration::from_millis(reset_ms * 16),
    }
}

/// Registry with one "chat" provider per id; priority follows list order.
pub fn chat_registry(ids: &[&str], settings: BreakerSettings) -> Arc<ProviderRegistry> {
    let registry = Arc::new(ProviderRegistry::new(64));
    for (priority, id) in ids.iter().enumerate() {
        registry.register(
            ProviderSpec::new(*id)
                .with_capability("chat")
                .with_priority(priority as i32)
                .with_breaker(settings),
        );
    }
    registry
}

pub fn orchestrator(registry: &Arc<ProviderRegistry>) -> Orchestrator {
    Orchestrator::new(Arc::clone(registry)).with_call_timeout(Duration::from_millis(500))
}

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` decides status and body for each request.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                // Drain the request head before answering
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;

                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    400 => "400 Bad Request",
                    429 => "429 Too Many Requests",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}
