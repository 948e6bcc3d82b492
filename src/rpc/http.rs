//! HTTP JSON-RPC transport with per-network endpoints

use super::{Network, RpcError, RpcResult, RpcTransport};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, warn};

/// Basic-auth credentials for nodes that require them
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// JSON-RPC over HTTP POST
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint_main: String,
    endpoint_test: String,
    credentials: Option<Credentials>,
}

impl HttpTransport {
    /// Create a new transport
    pub fn new(
        endpoint_main: impl Into<String>,
        endpoint_test: impl Into<String>,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> RpcResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint_main: endpoint_main.into(),
            endpoint_test: endpoint_test.into(),
            credentials,
        })
    }

    /// Resolve the endpoint for a network, scoped to a wallet when one is given
    pub fn endpoint(&self, wallet: &str, network: Network) -> String {
        let base = match network {
            Network::Main => &self.endpoint_main,
            Network::Test => &self.endpoint_test,
        };

        if wallet.is_empty() {
            base.clone()
        } else {
            format!("{}/wallet/{}", base, wallet)
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, body: Vec<u8>, wallet: &str, network: Network) -> RpcResult<Vec<u8>> {
        let url = self.endpoint(wallet, network);

        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body);

        if let Some(ref credentials) = self.credentials {
            request = request.basic_auth(&credentials.user, Some(&credentials.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        // Nodes report JSON-RPC errors with non-2xx statuses; anything else
        // with such a status came from the HTTP layer
        if !status.is_success() && serde_json::from_slice::<serde_json::Value>(&bytes).is_err() {
            warn!("Node at {} answered {} without a JSON-RPC body", url, status);
            return Err(RpcError::Transport(format!("HTTP {}", status)));
        }

        debug!("Node at {} answered {} ({} bytes)", url, status, bytes.len());
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    fn transport() -> HttpTransport {
        HttpTransport::new(
            "http://main-node:8332",
            "http://test-node:18332",
            None,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_routing() {
        let transport = transport();
        assert_eq!(
            transport.endpoint("", Network::from("main")),
            "http://main-node:8332"
        );
        assert_eq!(
            transport.endpoint("", Network::from("Main")),
            "http://test-node:18332"
        );
        assert_eq!(
            transport.endpoint("", Network::from("")),
            "http://test-node:18332"
        );
    }

    #[test]
    fn test_wallet_scoped_endpoint() {
        let transport = transport();
        assert_eq!(
            transport.endpoint("savings", Network::Main),
            "http://main-node:8332/wallet/savings"
        );
        assert_eq!(
            transport.endpoint("savings", Network::Test),
            "http://test-node:18332/wallet/savings"
        );
    }

    #[test]
    fn test_unreachable_node_is_transport_error() {
        let transport = HttpTransport::new(
            "http://127.0.0.1:1",
            "http://127.0.0.1:1",
            None,
            Duration::from_secs(2),
        )
        .unwrap();

        let result = tokio_test::block_on(transport.send(b"{}".to_vec(), "", Network::Test));
        let err = tokio_test::assert_err!(result);
        assert!(err.is_transport());
    }

    /// Serve one canned reply on a local port, remembering the `Authorization` header
    async fn canned_node(
        status: StatusCode,
        body: &'static str,
    ) -> (String, Arc<Mutex<Option<String>>>) {
        let seen = Arc::new(Mutex::new(None));
        let recorded = seen.clone();

        let app = Router::new().route(
            "/",
            post(move |headers: HeaderMap| {
                let recorded = recorded.clone();
                async move {
                    *recorded.lock().unwrap() = headers
                        .get(AUTHORIZATION)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string);
                    (status, body)
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await });

        (url, seen)
    }

    #[tokio::test]
    async fn test_node_error_with_error_status_is_decoded() {
        let (url, seen) = canned_node(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"result":null,"error":{"code":-26,"message":"x"},"id":"1"}"#,
        )
        .await;
        let transport = HttpTransport::new(
            url.clone(),
            url,
            Some(Credentials {
                user: "user".to_string(),
                password: "pass".to_string(),
            }),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = crate::rpc::call::<Value>(&transport, "sendrawtransaction", &[], "", Network::Test)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RpcError::Node {
                code: -26,
                message: "x".to_string()
            }
        );
        assert_eq!(seen.lock().unwrap().as_deref(), Some("Basic dXNlcjpwYXNz"));
    }

    #[tokio::test]
    async fn test_html_error_page_is_transport_error() {
        let (url, seen) = canned_node(
            StatusCode::BAD_GATEWAY,
            "<html><body>502 Bad Gateway</body></html>",
        )
        .await;
        let transport = HttpTransport::new(url.clone(), url, None, Duration::from_secs(5)).unwrap();

        let err = transport
            .send(b"{}".to_vec(), "", Network::Main)
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("502"));
        assert_eq!(*seen.lock().unwrap(), None);
    }
}
