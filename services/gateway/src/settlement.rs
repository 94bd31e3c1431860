//! Settlement collaborator interface
//!
//! The Ethereum-side signer lives outside this service; the core submits
//! signed trades and waits for the transaction outcome. Settlement is
//! two-phase: `submit_trade` returns the transaction hash once the
//! submission is accepted, `wait_receipt` resolves when the transaction
//! confirms or fails on chain. The HTTP client talks to the configured
//! settlement endpoint; the mock client stands in for it in tests and
//! local runs.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use types::order::Order;
use types::primitives::{keccak256, Hash};
use types::trade::Trade;

/// How many receipt polls before the transaction counts as lost.
const RECEIPT_POLL_ATTEMPTS: u32 = 30;
/// Base delay between receipt polls; doubles up to the cap.
const RECEIPT_POLL_BASE: Duration = Duration::from_millis(500);
const RECEIPT_POLL_CAP: Duration = Duration::from_secs(8);

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("settlement transport error: {0}")]
    Transport(String),
    #[error("settlement rejected trade: {0}")]
    Rejected(String),
    #[error("transaction failed on chain: {0}")]
    TransactionFailed(String),
    #[error("timed out waiting for receipt of {0}")]
    ReceiptTimeout(Hash),
}

#[async_trait]
pub trait SettlementClient: Send + Sync {
    /// Submit a taker-signed trade for on-chain execution, returning the
    /// transaction hash once the submission is accepted.
    async fn submit_trade(&self, trade: &Trade, maker_order: &Order)
        -> Result<Hash, SettlementError>;

    /// Wait for the submitted transaction to confirm. An error means the
    /// transaction failed or was never mined; the caller reverses the
    /// trade.
    async fn wait_receipt(&self, tx_hash: Hash) -> Result<(), SettlementError>;
}

/// HTTP client for the settlement collaborator.
pub struct HttpSettlementClient {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    tx_hash: Hash,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptResponse {
    /// "pending", "confirmed", or "failed"
    status: String,
    #[serde(default)]
    error: Option<String>,
}

impl HttpSettlementClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SettlementClient for HttpSettlementClient {
    async fn submit_trade(
        &self,
        trade: &Trade,
        maker_order: &Order,
    ) -> Result<Hash, SettlementError> {
        let url = format!("{}/trades", self.endpoint.trim_end_matches('/'));
        let body = serde_json::json!({
            "trade": trade,
            "makerOrder": maker_order,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SettlementError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SettlementError::Rejected(format!("{}: {}", status, text)));
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| SettlementError::Transport(e.to_string()))?;
        Ok(parsed.tx_hash)
    }

    /// Poll the transaction status with bounded exponential backoff.
    async fn wait_receipt(&self, tx_hash: Hash) -> Result<(), SettlementError> {
        let url = format!(
            "{}/transactions/{}",
            self.endpoint.trim_end_matches('/'),
            tx_hash
        );

        let mut delay = RECEIPT_POLL_BASE;
        for attempt in 0..RECEIPT_POLL_ATTEMPTS {
            if attempt > 0 {
                sleep(delay).await;
                delay = (delay * 2).min(RECEIPT_POLL_CAP);
            }

            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    // Transient transport errors retry within the budget
                    debug!(tx = %tx_hash, error = %e, "receipt poll failed");
                    continue;
                }
            };
            if !response.status().is_success() {
                continue;
            }
            let receipt: ReceiptResponse = match response.json().await {
                Ok(receipt) => receipt,
                Err(e) => {
                    debug!(tx = %tx_hash, error = %e, "undecodable receipt");
                    continue;
                }
            };

            match receipt.status.as_str() {
                "confirmed" => return Ok(()),
                "failed" => {
                    return Err(SettlementError::TransactionFailed(
                        receipt.error.unwrap_or_else(|| "unknown".to_string()),
                    ))
                }
                _ => continue,
            }
        }

        Err(SettlementError::ReceiptTimeout(tx_hash))
    }
}

enum MockMode {
    Accept,
    RejectSubmit,
    FailReceipt,
}

/// Mock settlement for tests and local runs.
///
/// Accepted trades get a deterministic pseudo transaction hash derived
/// from the trade hash.
pub struct MockSettlementClient {
    mode: MockMode,
}

impl MockSettlementClient {
    /// Accept every submission and confirm every receipt.
    pub fn accepting() -> Self {
        Self {
            mode: MockMode::Accept,
        }
    }

    /// Reject at submission time.
    pub fn rejecting() -> Self {
        Self {
            mode: MockMode::RejectSubmit,
        }
    }

    /// Accept the submission but fail the transaction on chain.
    pub fn failing_receipt() -> Self {
        Self {
            mode: MockMode::FailReceipt,
        }
    }
}

#[async_trait]
impl SettlementClient for MockSettlementClient {
    async fn submit_trade(
        &self,
        trade: &Trade,
        _maker_order: &Order,
    ) -> Result<Hash, SettlementError> {
        if matches!(self.mode, MockMode::RejectSubmit) {
            return Err(SettlementError::Rejected("mock rejection".to_string()));
        }
        Ok(keccak256(&[b"tx:", trade.hash.as_bytes()]))
    }

    async fn wait_receipt(&self, tx_hash: Hash) -> Result<(), SettlementError> {
        match self.mode {
            MockMode::FailReceipt => Err(SettlementError::TransactionFailed(format!(
                "mock failure for {}",
                tx_hash
            ))),
            _ => Ok(()),
        }
    }
}
