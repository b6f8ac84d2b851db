use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::gateway::{LedgerGateway, TransactionHandle};
use crate::payload::EntryFunctionPayload;

/// Submits one mutation and waits for it to be finalized.
///
/// There is no retry here: resubmitting `create_task` would create a duplicate task, so
/// the decision belongs to the user.
pub struct MutationExecutor<'g, G> {
    gateway: &'g G,
}

impl<'g, G> MutationExecutor<'g, G>
where
    G: LedgerGateway,
{
    pub fn new(gateway: &'g G) -> Self {
        Self { gateway }
    }

    /// Ok only once the ledger reports the transaction committed.
    #[instrument(skip(self, payload), fields(function = %payload.function))]
    pub async fn execute(&self, payload: &EntryFunctionPayload) -> Result<TransactionHandle> {
        let handle = self
            .gateway
            .submit_transaction(payload)
            .await
            .inspect_err(|err| warn!(error = %err, "submission failed"))?;

        self.gateway
            .await_transaction(&handle)
            .await
            .inspect_err(|err| warn!(hash = %handle.hash, error = %err, "confirmation failed"))?;

        info!(hash = %handle.hash, "mutation committed");
        Ok(handle)
    }
}
