//! Solana JSON-RPC client implementing the ledger port.

use crate::config::LedgerConfig;
use crate::decode::decode_transaction;
use crate::rpc::{
    JsonRpcRequest, JsonRpcResponse, RpcBlockhash, RpcSignatureStatus, RpcTransaction, WithContext,
};
use crate::transaction::{build_transfer, SignedTransfer};
use async_trait::async_trait;
use lottery_core::{
    Address, Commitment, LedgerClient, LedgerError, LedgerResult, RoundKeypair, SignatureStatus,
    TransactionRecord, TransferOutput,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

fn transport(e: reqwest::Error) -> LedgerError {
    LedgerError::Transport(e.to_string())
}

fn parse_commitment(status: &str) -> Option<Commitment> {
    match status {
        "finalized" => Some(Commitment::Finalized),
        "confirmed" => Some(Commitment::Confirmed),
        "processed" => Some(Commitment::Processed),
        _ => None,
    }
}

impl From<RpcSignatureStatus> for SignatureStatus {
    fn from(status: RpcSignatureStatus) -> Self {
        Self {
            error: status.err.map(|err| err.to_string()),
            confirmation: status.confirmation_status.as_deref().and_then(parse_commitment),
        }
    }
}

/// Ledger client speaking Solana JSON-RPC over HTTP.
pub struct SolanaRpcClient {
    client: Client,
    config: LedgerConfig,
    request_id: AtomicU64,
}

impl SolanaRpcClient {
    pub fn new(config: LedgerConfig) -> LedgerResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(transport)?;

        Ok(Self {
            client,
            config,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.config.rpc_url
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Call a JSON-RPC method. A `null` result is `Ok(None)`.
    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: P,
    ) -> LedgerResult<Option<R>> {
        let request = JsonRpcRequest::new(method, params, self.next_id());

        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(method, rpc_url = %self.config.rpc_url, error = %e, "Ledger request failed");
                transport(e)
            })?
            .error_for_status()
            .map_err(transport)?;

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| LedgerError::Malformed(format!("{method}: {e}")))?;

        if let Some(error) = body.error {
            debug!(method, code = error.code, message = %error.message, "Ledger returned an error");
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(body.result)
    }

    async fn call_required<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: P,
    ) -> LedgerResult<R> {
        self.call(method, params)
            .await?
            .ok_or_else(|| LedgerError::Malformed(format!("{method}: missing result")))
    }

    /// Probe the endpoint with `getHealth`.
    pub async fn health(&self) -> LedgerResult<()> {
        let status: String = self.call_required("getHealth", [(); 0]).await?;
        if status == "ok" {
            Ok(())
        } else {
            Err(LedgerError::Malformed(format!("getHealth: {status}")))
        }
    }

    pub async fn latest_blockhash(&self) -> LedgerResult<String> {
        let response: WithContext<RpcBlockhash> = self
            .call_required(
                "getLatestBlockhash",
                json!([{ "commitment": Commitment::Finalized.as_str() }]),
            )
            .await?;
        Ok(response.value.blockhash)
    }

    async fn send_transaction(&self, signed: &SignedTransfer) -> LedgerResult<String> {
        self.call_required(
            "sendTransaction",
            json!([
                signed.to_base58(),
                {
                    "encoding": "base58",
                    "preflightCommitment": Commitment::Confirmed.as_str()
                }
            ]),
        )
        .await
    }

    /// Poll until `signature` reaches at least `confirmed`.
    async fn await_confirmation(&self, signature: &str) -> LedgerResult<()> {
        for attempt in 1..=self.config.confirmation_attempts {
            match self.fetch_signature_status(signature).await {
                Ok(Some(SignatureStatus {
                    error: Some(reason), ..
                })) => {
                    return Err(LedgerError::TransactionFailed {
                        signature: signature.to_string(),
                        reason,
                    });
                }
                Ok(Some(SignatureStatus {
                    confirmation: Some(Commitment::Confirmed | Commitment::Finalized),
                    ..
                })) => return Ok(()),
                Ok(_) => debug!(signature, attempt, "Transfer not confirmed yet"),
                Err(e) => debug!(signature, attempt, error = %e, "Status poll failed"),
            }
            tokio::time::sleep(self.config.confirmation_interval).await;
        }

        warn!(
            signature,
            attempts = self.config.confirmation_attempts,
            "Transfer confirmation timed out"
        );
        Err(LedgerError::Unconfirmed {
            signature: signature.to_string(),
        })
    }
}

#[async_trait]
impl LedgerClient for SolanaRpcClient {
    async fn fetch_transaction(
        &self,
        transfer_id: &str,
        commitment: Commitment,
    ) -> LedgerResult<Option<TransactionRecord>> {
        let tx: Option<RpcTransaction> = self
            .call(
                "getTransaction",
                json!([
                    transfer_id,
                    {
                        "encoding": "json",
                        "commitment": commitment.as_str(),
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;

        tx.map(decode_transaction).transpose()
    }

    async fn fetch_signature_status(&self, transfer_id: &str) -> LedgerResult<Option<SignatureStatus>> {
        let response: WithContext<Vec<Option<RpcSignatureStatus>>> = self
            .call_required(
                "getSignatureStatuses",
                json!([[transfer_id], { "searchTransactionHistory": true }]),
            )
            .await?;

        Ok(response.value.into_iter().next().flatten().map(SignatureStatus::from))
    }

    async fn balance(&self, address: &Address) -> LedgerResult<u64> {
        let response: WithContext<u64> = self
            .call_required(
                "getBalance",
                json!([address.as_str(), { "commitment": Commitment::Confirmed.as_str() }]),
            )
            .await?;
        Ok(response.value)
    }

    async fn submit_transfer(
        &self,
        signer: &RoundKeypair,
        outputs: &[TransferOutput],
    ) -> LedgerResult<String> {
        let blockhash = self.latest_blockhash().await?;
        let signed = build_transfer(signer, outputs, &blockhash)?;

        let signature = self.send_transaction(&signed).await?;
        if signature != signed.signature {
            warn!(expected = %signed.signature, returned = %signature, "Ledger returned a different signature");
        }
        info!(signature = %signature, outputs = outputs.len(), "Transfer submitted");

        self.await_confirmation(&signature).await?;
        Ok(signature)
    }
}
