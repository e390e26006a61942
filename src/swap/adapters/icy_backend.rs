//! ICY backend client
//!
//! Swap parameters and signatures come from the ICY backend; signed swaps
//! and plain token transfers are executed on-chain by the relayer, which
//! answers only once the transaction is mined.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{IcyInfo, SignatureRequest, SwapExecutor, SwapSignature, TokenTransfer};
use crate::config::IcyBackendConfig;
use crate::swap::error::AdapterError;

const SERVICE: &str = "icy-backend";

#[derive(Deserialize)]
struct IcyInfoResponse {
    data: IcyInfo,
}

#[derive(Deserialize)]
struct SignatureResponse {
    #[serde(default)]
    data: Option<SwapSignature>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct RelayedSwap<'a> {
    icy_amount: &'a str,
    btc_amount: &'a str,
    btc_address: &'a str,
    nonce: &'a str,
    deadline: &'a str,
    signature: &'a str,
}

#[derive(Serialize)]
struct RelayedTransfer<'a> {
    amount: &'a str,
    destination: &'a str,
}

/// Relayer receipt. `status` is `success` once the tx is mined and succeeded.
#[derive(Deserialize)]
struct RelayerReceipt {
    #[serde(default)]
    tx_hash: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
}

pub struct IcyBackendClient {
    client: reqwest::Client,
    base_url: String,
    relayer_url: String,
}

impl IcyBackendClient {
    pub fn new(config: &IcyBackendConfig) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                AdapterError::new(SERVICE, format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            relayer_url: config.relayer_url.trim_end_matches('/').to_string(),
        })
    }

    /// Post to the relayer and turn its receipt into a tx hash.
    async fn relay<T: Serialize>(&self, path: &str, body: &T) -> Result<String, AdapterError> {
        let url = format!("{}{}", self.relayer_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AdapterError::new(SERVICE, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let receipt: RelayerReceipt = response.json().await.map_err(|e| {
            AdapterError::new(
                SERVICE,
                format!("Failed to parse relayer response ({}): {}", status, e),
            )
        })?;

        if status.is_success() && receipt.status == "success" && !receipt.tx_hash.is_empty() {
            return Ok(receipt.tx_hash);
        }

        let message = receipt
            .error
            .unwrap_or_else(|| format!("Transaction not confirmed (status {})", receipt.status));
        let mut err = AdapterError::new(SERVICE, message);
        // A hash here means the tx was broadcast before it failed
        if !receipt.tx_hash.is_empty() {
            err = err.with_reference(receipt.tx_hash);
        }
        Err(err)
    }
}

fn ensure_integer(field: &str, value: &str) -> Result<(), AdapterError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AdapterError::new(
            SERVICE,
            format!("Invalid {} format: {:?}", field, value),
        ));
    }
    Ok(())
}

#[async_trait]
impl SwapExecutor for IcyBackendClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn icy_info(&self) -> Result<IcyInfo, AdapterError> {
        let url = format!("{}/api/v1/swap/info", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::new(SERVICE, format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AdapterError::new(
                SERVICE,
                format!("Swap info returned {}", response.status()),
            ));
        }

        let body: IcyInfoResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::new(SERVICE, format!("Failed to parse response: {}", e)))?;
        debug!(rate = %body.data.icy_satoshi_rate, fee = %body.data.min_satoshi_fee, "Fetched swap info");
        Ok(body.data)
    }

    async fn get_signature(&self, req: &SignatureRequest) -> Result<SwapSignature, AdapterError> {
        let url = format!("{}/api/v1/swap/generate-signature", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| AdapterError::new(SERVICE, format!("HTTP request failed: {}", e)))?;

        let body: SignatureResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::new(SERVICE, format!("Failed to parse response: {}", e)))?;

        if let Some(error) = body.error.filter(|e| !e.is_empty()) {
            return Err(AdapterError::new(SERVICE, error));
        }
        body.data
            .ok_or_else(|| AdapterError::new(SERVICE, "No signature in response"))
    }

    async fn swap(
        &self,
        signature: &SwapSignature,
        btc_address: &str,
    ) -> Result<String, AdapterError> {
        ensure_integer("icy_amount", &signature.icy_amount)?;
        ensure_integer("btc_amount", &signature.btc_amount)?;
        ensure_integer("nonce", &signature.nonce)?;
        ensure_integer("deadline", &signature.deadline)?;
        if signature.signature.trim_start_matches("0x").is_empty() {
            return Err(AdapterError::new(SERVICE, "Empty swap signature"));
        }

        let body = RelayedSwap {
            icy_amount: &signature.icy_amount,
            btc_amount: &signature.btc_amount,
            btc_address,
            nonce: &signature.nonce,
            deadline: &signature.deadline,
            signature: &signature.signature,
        };
        self.relay("/api/v1/swap", &body).await.inspect_err(|e| {
            warn!(error = %e, "Relayed swap failed");
        })
    }
}

#[async_trait]
impl TokenTransfer for IcyBackendClient {
    async fn transfer(&self, amount: &str, destination: &str) -> Result<String, AdapterError> {
        ensure_integer("amount", amount)?;
        let body = RelayedTransfer {
            amount,
            destination,
        };
        self.relay("/api/v1/transfer", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, routing::get, routing::post};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<Value>>>;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(url: &str) -> IcyBackendClient {
        IcyBackendClient::new(&IcyBackendConfig {
            base_url: url.to_string(),
            relayer_url: url.to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn signature() -> SwapSignature {
        SwapSignature {
            icy_amount: "100000000000000000000".into(),
            btc_amount: "1250".into(),
            nonce: "7".into(),
            deadline: "1999999999".into(),
            signature: "0xabcdef".into(),
        }
    }

    #[tokio::test]
    async fn test_icy_info() {
        let router = Router::new().route(
            "/api/v1/swap/info",
            get(|| async {
                Json(json!({
                    "data": {
                        "icy_satoshi_rate": "12.5",
                        "min_satoshi_fee": "250",
                        "icy_usd_rate": "1.5",
                        "circulated_icy_balance": "1000"
                    },
                    "message": "ok"
                }))
            }),
        );
        let url = spawn(router).await;

        let info = client(&url).icy_info().await.unwrap();
        assert_eq!(info.icy_satoshi_rate, "12.5");
        assert_eq!(info.min_satoshi_fee, "250");
        assert_eq!(info.icy_usd_rate, "1.5");
        assert!(info.min_icy_to_swap.is_empty());
    }

    #[tokio::test]
    async fn test_signature_error_field() {
        let router = Router::new().route(
            "/api/v1/swap/generate-signature",
            post(|| async { Json(json!({"data": null, "error": "insufficient liquidity"})) }),
        );
        let url = spawn(router).await;

        let err = client(&url)
            .get_signature(&SignatureRequest {
                icy_amount: "1".into(),
                btc_address: "bc1q".into(),
                btc_amount: "1".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.service, "icy-backend");
        assert_eq!(err.message, "insufficient liquidity");
    }

    #[tokio::test]
    async fn test_signature_request_body() {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route(
                "/api/v1/swap/generate-signature",
                post(|State(c): State<Captured>, Json(body): Json<Value>| async move {
                    c.lock().unwrap().push(body.clone());
                    Json(json!({
                        "data": {
                            "icy_amount": body["icy_amount"],
                            "btc_amount": body["btc_amount"],
                            "nonce": "3",
                            "deadline": "1700000000",
                            "signature": "0x01"
                        }
                    }))
                }),
            )
            .with_state(captured.clone());
        let url = spawn(router).await;

        let sig = client(&url)
            .get_signature(&SignatureRequest {
                icy_amount: "12500000000000000000".into(),
                btc_address: "bc1qdest".into(),
                btc_amount: "156".into(),
            })
            .await
            .unwrap();

        assert_eq!(sig.btc_amount, "156");
        assert_eq!(sig.nonce, "3");
        let body = captured.lock().unwrap()[0].clone();
        assert_eq!(body["btc_address"], "bc1qdest");
        assert_eq!(body["icy_amount"], "12500000000000000000");
    }

    #[tokio::test]
    async fn test_swap_confirmed() {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route(
                "/api/v1/swap",
                post(|State(c): State<Captured>, Json(body): Json<Value>| async move {
                    c.lock().unwrap().push(body);
                    Json(json!({"tx_hash": "0xswaphash", "status": "success"}))
                }),
            )
            .with_state(captured.clone());
        let url = spawn(router).await;

        let hash = client(&url).swap(&signature(), "bc1qdest").await.unwrap();
        assert_eq!(hash, "0xswaphash");
        assert_eq!(captured.lock().unwrap()[0]["btc_address"], "bc1qdest");
    }

    #[tokio::test]
    async fn test_reverted_tx_keeps_reference() {
        let router = Router::new().route(
            "/api/v1/transfer",
            post(|| async {
                Json(json!({"tx_hash": "0xpartial", "status": "reverted", "error": "execution reverted"}))
            }),
        );
        let url = spawn(router).await;

        let err = client(&url).transfer("1000", "0xvault").await.unwrap_err();
        assert_eq!(err.message, "execution reverted");
        assert_eq!(err.reference.as_deref(), Some("0xpartial"));
    }

    #[tokio::test]
    async fn test_malformed_signature_rejected_locally() {
        // Unreachable relayer: the call must fail before any request
        let c = client("http://127.0.0.1:1");
        let mut sig = signature();
        sig.nonce = "abc".into();
        let err = c.swap(&sig, "bc1q").await.unwrap_err();
        assert!(err.message.contains("nonce"));

        assert!(c.transfer("1.5", "0xvault").await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let err = client("http://127.0.0.1:1").icy_info().await.unwrap_err();
        assert!(err.message.contains("HTTP request failed"));
    }
}
