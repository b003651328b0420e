//! Service reachability probe
//!
//! One GET against the target before any check runs. 200 means available,
//! anything else (including transport errors) means unavailable.

use std::time::Duration;

use tracing::{debug, warn};

use crate::types::{Result, ValidatorError};

/// User agent sent with every request to the target
pub const USER_AGENT: &str = "lab-validator/0.1";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP client shared by the probe and the checks
///
/// With `insecure_tls` the client accepts self-signed certificates, which
/// lab deployments routinely use.
pub fn build_http_client(insecure_tls: bool) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(insecure_tls)
        .build()
        .map_err(|e| ValidatorError::Http(format!("HTTP client error: {}", e)))
}

/// Reachability check for the target service
#[async_trait::async_trait]
pub trait ServiceProbe: Send + Sync {
    /// Whether `target` (a base URL ending in `/`) answers the probe
    async fn is_available(&self, target: &str) -> bool;
}

/// Probe issuing `GET {target}{path}`
pub struct HttpServiceProbe {
    client: reqwest::Client,
    path: String,
}

impl HttpServiceProbe {
    pub fn new(client: reqwest::Client, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into().trim_start_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ServiceProbe for HttpServiceProbe {
    async fn is_available(&self, target: &str) -> bool {
        let url = format!("{}{}", target, self.path);

        match self.client.get(&url).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                debug!(url = %url, "Target service available");
                true
            }
            Ok(resp) => {
                warn!(url = %url, status = %resp.status(), "Target service probe rejected");
                false
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Target service unreachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn probe() -> HttpServiceProbe {
        HttpServiceProbe::new(build_http_client(true).unwrap(), "/health/whoami")
    }

    #[tokio::test]
    async fn test_ok_is_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/whoami"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(probe().is_available(&format!("{}/", server.uri())).await);
    }

    #[tokio::test]
    async fn test_non_200_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/whoami"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(!probe().is_available(&format!("{}/", server.uri())).await);
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        assert!(!probe().is_available("http://127.0.0.1:1/").await);
    }
}
