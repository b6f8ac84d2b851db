use std::time::Duration;

use anyhow::Context;
use chainlist_shared::AccountAddress;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, trace, warn};

use crate::config::ClientConfig;
use crate::error::{LedgerError, Result};
use crate::gateway::{LedgerGateway, RawResource, TableItemRequest, TransactionHandle};
use crate::payload::EntryFunctionPayload;

const PENDING_TRANSACTION: &str = "pending_transaction";

/// The wallet capability: signs the payload with the connected account and
/// hands it to the chain. Key custody stays with the implementor.
#[allow(async_fn_in_trait)]
pub trait WalletSigner {
    /// A refusal (user declined, simulation failed) is `TransactionRejected`.
    async fn sign_and_submit(&self, payload: &EntryFunctionPayload) -> Result<TransactionHandle>;
}

/// Gateway backed by a fullnode REST API and a wallet signer.
#[derive(Debug)]
pub struct RestGateway<S> {
    client: reqwest::Client,
    base_url: String,
    signer: S,
    await_timeout: Duration,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct NodeErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionStatus {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    vm_status: Option<String>,
}

enum PollOutcome {
    Pending,
    Committed,
    Failed(String),
}

impl<S> RestGateway<S> {
    pub fn new(cfg: &ClientConfig, signer: S) -> anyhow::Result<Self> {
        cfg.validate()?;
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .context("failed building HTTP client for ledger node")?;

        debug!(
            node = %cfg.base_url(),
            await_timeout_ms = cfg.await_timeout.as_millis() as u64,
            "constructed rest gateway"
        );

        Ok(Self {
            client,
            base_url: cfg.base_url().to_string(),
            signer,
            await_timeout: cfg.await_timeout,
            poll_interval: cfg.poll_interval,
        })
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    async fn poll_once(&self, hash: &str) -> Result<PollOutcome> {
        let url = format!("{}/v1/transactions/by_hash/{}", self.base_url, hash);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(hash, error = %err, "transaction poll failed; retrying until deadline");
                return Ok(PollOutcome::Pending);
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            trace!(hash, "transaction not indexed yet");
            return Ok(PollOutcome::Pending);
        }
        if status.is_server_error() {
            warn!(hash, status = %status, "node error while polling; retrying until deadline");
            return Ok(PollOutcome::Pending);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(LedgerError::network(format!(
                "transaction lookup for {hash} returned HTTP {status}: {}",
                error_message(&body)
            )));
        }

        let txn: TransactionStatus = serde_json::from_str(&body)?;
        if txn.kind == PENDING_TRANSACTION {
            return Ok(PollOutcome::Pending);
        }
        match txn.success {
            Some(true) => Ok(PollOutcome::Committed),
            _ => Ok(PollOutcome::Failed(
                txn.vm_status
                    .unwrap_or_else(|| "transaction failed".to_string()),
            )),
        }
    }
}

impl<S> LedgerGateway for RestGateway<S>
where
    S: WalletSigner,
{
    #[instrument(skip(self, account), fields(account = %account))]
    async fn read_resource(
        &self,
        account: &AccountAddress,
        resource_type: &str,
    ) -> Result<RawResource> {
        let url = format!(
            "{}/v1/accounts/{}/resource/{}",
            self.base_url, account, resource_type
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(
                error_code = ?node_error_code(&body),
                "resource not found"
            );
            return Err(LedgerError::ResourceNotFound {
                account: account.to_string(),
                resource_type: resource_type.to_string(),
            });
        }
        if !status.is_success() {
            return Err(LedgerError::network(format!(
                "resource read returned HTTP {status}: {}",
                error_message(&body)
            )));
        }

        Ok(serde_json::from_str(&body)?)
    }

    #[instrument(skip(self, request), fields(key = %request.key))]
    async fn read_table_item(&self, handle: &str, request: &TableItemRequest) -> Result<Value> {
        let url = format!("{}/v1/tables/{}/item", self.base_url, handle);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(request)?)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(LedgerError::network(format!(
                "table item {} lookup returned HTTP {status}: {}",
                request.key,
                error_message(&body)
            )));
        }

        Ok(serde_json::from_str(&body)?)
    }

    #[instrument(skip(self, payload), fields(function = %payload.function))]
    async fn submit_transaction(
        &self,
        payload: &EntryFunctionPayload,
    ) -> Result<TransactionHandle> {
        let handle = self.signer.sign_and_submit(payload).await?;
        debug!(hash = %handle.hash, "transaction submitted");
        Ok(handle)
    }

    #[instrument(skip(self, handle), fields(hash = %handle.hash))]
    async fn await_transaction(&self, handle: &TransactionHandle) -> Result<()> {
        let started = Instant::now();
        let deadline = started + self.await_timeout;

        loop {
            match self.poll_once(&handle.hash).await? {
                PollOutcome::Committed => {
                    debug!(
                        waited_ms = started.elapsed().as_millis() as u64,
                        "transaction committed"
                    );
                    return Ok(());
                }
                PollOutcome::Failed(vm_status) => {
                    warn!(vm_status = %vm_status, "transaction failed on chain");
                    return Err(LedgerError::rejected(Some(handle.hash.clone()), vm_status));
                }
                PollOutcome::Pending => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LedgerError::Timeout {
                    hash: handle.hash.clone(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<NodeErrorBody>(body) {
        Ok(parsed) if !parsed.message.is_empty() => parsed.message,
        _ => body.chars().take(200).collect(),
    }
}

fn node_error_code(body: &str) -> Option<String> {
    serde_json::from_str::<NodeErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error_code)
}
