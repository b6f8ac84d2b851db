pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod mock;
pub mod overlay;
pub mod payload;
pub mod reader;
pub mod rest;
pub mod sync;
pub mod telemetry;

use std::path::Path;

use anyhow::Context;
pub use chainlist_shared::{
  AccountAddress,
  ListPhase,
  ListView,
  Task,
  TaskId
};
pub use error::LedgerError;
pub use sync::{
  LoadOutcome,
  MutationOutcome,
  SkipReason,
  SyncController
};
use tracing::{
  debug,
  info
};

/// Loads configuration, applies
/// `key=value` overrides and wires a
/// controller to the configured node
/// through `signer`.
#[tracing::instrument(skip_all)]
pub fn connect<S, I>(
  config_path: Option<&Path>,
  overrides: I,
  signer: S
) -> anyhow::Result<
  SyncController<rest::RestGateway<S>>
>
where
  S: rest::WalletSigner,
  I: IntoIterator<Item = (String, String)>
{
  let mut cfg =
    config::ClientConfig::load(
      config_path
    )?;
  cfg.apply_overrides(overrides)?;
  debug!(?cfg, "resolved client config");

  let gateway =
    rest::RestGateway::new(&cfg, signer)
      .with_context(|| {
        format!(
          "failed to build gateway for \
           {}",
          cfg.base_url()
        )
      })?;

  info!(
    node = %cfg.base_url(),
    module = %cfg.module_address,
    "chainlist client ready"
  );
  Ok(SyncController::new(gateway, cfg))
}
