//! JSON-RPC probe using the SDK's `wallet_list` method

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{LoadProbe, ProbeError};
use crate::config::TlsConfig;

/// Queries `wallet_list` with page 1 and page size 1; the reported
/// `total_pages` is then the number of wallets loaded on the server.
pub struct JsonRpcProbe {
    http_client: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<WalletListResult>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct WalletListResult {
    total_pages: u64,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    message: String,
}

impl JsonRpcProbe {
    pub fn new(timeout: Duration, tls: Option<&TlsConfig>) -> Result<Self, ProbeError> {
        Ok(Self {
            http_client: build_probe_client(timeout, tls)?,
            next_id: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl LoadProbe for JsonRpcProbe {
    async fn load(&self, address: &str) -> Result<u64, ProbeError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "wallet_list",
            "params": { "page": 1, "page_size": 1 },
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let response: RpcResponse = self
            .http_client
            .post(address)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(ProbeError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        response
            .result
            .map(|r| r.total_pages)
            .ok_or_else(|| ProbeError::Decode("response has neither result nor error".to_string()))
    }
}

/// Build the HTTP client used for load queries
fn build_probe_client(timeout: Duration, tls: Option<&TlsConfig>) -> Result<reqwest::Client, ProbeError> {
    let mut client_builder = reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(2);

    if let Some(tls) = tls {
        if tls.accept_invalid_certs {
            client_builder = client_builder.danger_accept_invalid_certs(true);
            tracing::warn!("TLS: Accepting invalid certificates (use only for development/testing)");
        }

        if let Some(ref ca_path) = tls.ca_cert_path {
            let ca_cert = std::fs::read(ca_path)
                .map_err(|e| ProbeError::Client(format!("reading {}: {}", ca_path, e)))?;
            let ca_cert = reqwest::Certificate::from_pem(&ca_cert)?;
            client_builder = client_builder.add_root_certificate(ca_cert);
            tracing::info!("TLS: Loaded custom CA certificate from {}", ca_path);
        }
    }

    Ok(client_builder.build()?)
}
