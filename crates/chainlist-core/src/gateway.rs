//! The four remote capabilities the synchronizer depends on.
//!
//! Implementations translate transport faults into `LedgerError` and never
//! retry; retry decisions belong to whoever called the executor.

use std::sync::Arc;

use chainlist_shared::AccountAddress;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::payload::EntryFunctionPayload;

/// A typed per-account resource as the node returns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub data: Value,
}

/// Body of a table lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableItemRequest {
    pub key_type: String,
    pub value_type: String,
    pub key: String,
}

impl TableItemRequest {
    pub fn u64_key(value_type: impl Into<String>, key: u64) -> Self {
        Self {
            key_type: "u64".to_string(),
            value_type: value_type.into(),
            key: key.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TransactionHandle {
    pub hash: String,
}

#[allow(async_fn_in_trait)]
pub trait LedgerGateway {
    /// Fails with `ResourceNotFound` when the account has no such resource.
    async fn read_resource(
        &self,
        account: &AccountAddress,
        resource_type: &str,
    ) -> Result<RawResource>;

    /// A missing key is reported as `Network`: tables are dense.
    async fn read_table_item(&self, handle: &str, request: &TableItemRequest) -> Result<Value>;

    async fn submit_transaction(&self, payload: &EntryFunctionPayload)
    -> Result<TransactionHandle>;

    /// Resolves once the transaction is committed successfully.
    async fn await_transaction(&self, handle: &TransactionHandle) -> Result<()>;
}

impl<G> LedgerGateway for Arc<G>
where
    G: LedgerGateway,
{
    async fn read_resource(
        &self,
        account: &AccountAddress,
        resource_type: &str,
    ) -> Result<RawResource> {
        (**self).read_resource(account, resource_type).await
    }

    async fn read_table_item(&self, handle: &str, request: &TableItemRequest) -> Result<Value> {
        (**self).read_table_item(handle, request).await
    }

    async fn submit_transaction(
        &self,
        payload: &EntryFunctionPayload,
    ) -> Result<TransactionHandle> {
        (**self).submit_transaction(payload).await
    }

    async fn await_transaction(&self, handle: &TransactionHandle) -> Result<()> {
        (**self).await_transaction(handle).await
    }
}
