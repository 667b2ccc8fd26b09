//! Lightweight liveness probes.
//!
//! # Responsibilities
//! - Define the `Probe` seam the prober calls through
//! - Provide an HTTP implementation for providers exposing a health URL

use std::fmt;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::registry::ProviderSpec;
use crate::resilience::ProviderError;

/// A cheap call that tells whether a provider is answering.
///
/// Errors are classified like real traffic, so a probe answering 400 does
/// not count against the breaker.
#[async_trait]
pub trait Probe: Send + Sync + fmt::Debug {
    async fn probe(&self, spec: &ProviderSpec) -> Result<(), ProviderError>;
}

/// `GET <url>`; any 2xx is healthy.
pub struct HttpProbe {
    url: Uri,
    client: Client<HttpConnector, Body>,
}

impl HttpProbe {
    pub fn new(url: &str) -> Result<Self, ProviderError> {
        let url: Uri = url
            .parse()
            .map_err(|e| ProviderError::InvalidRequest(format!("invalid probe url '{url}': {e}")))?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &Uri {
        &self.url
    }
}

impl fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProbe").field("url", &self.url).finish()
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, spec: &ProviderSpec) -> Result<(), ProviderError> {
        let request = Request::builder()
            .method("GET")
            .uri(self.url.clone())
            .header("user-agent", "provider-failover-probe")
            .body(Body::empty())
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        tracing::debug!(provider = %spec.id, status = %status, "Probe answered with non-success status");
        Err(ProviderError::status(
            status.as_u16(),
            format!("probe returned {status}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{Classify, ErrorKind};
    use axum::{http::StatusCode, routing::get, Router};
    use tokio::net::TcpListener;

    async fn serve(status: StatusCode) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/health", get(move || async move { status }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/health")
    }

    #[test]
    fn test_rejects_unparsable_url() {
        let err = HttpProbe::new("not a url").unwrap_err();
        assert_eq!(err.classify(), ErrorKind::FatalRequest);
    }

    #[tokio::test]
    async fn test_success_status_is_healthy() {
        let url = serve(StatusCode::OK).await;
        let probe = HttpProbe::new(&url).unwrap();
        assert!(probe.probe(&ProviderSpec::new("p1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let url = serve(StatusCode::SERVICE_UNAVAILABLE).await;
        let probe = HttpProbe::new(&url).unwrap();
        let err = probe.probe(&ProviderSpec::new("p1")).await.unwrap_err();
        assert_eq!(err.classify(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = HttpProbe::new(&format!("http://{addr}/health")).unwrap();
        let err = probe.probe(&ProviderSpec::new("p1")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Connection(_)));
        assert_eq!(err.classify(), ErrorKind::Transient);
    }
}
