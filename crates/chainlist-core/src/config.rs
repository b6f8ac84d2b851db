use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow,
  bail
};
use chainlist_shared::AccountAddress;
use tracing::{
  debug,
  info,
  warn
};

pub const DEFAULT_NODE_URL: &str =
  "https://fullnode.devnet.aptoslabs.com";

pub const DEFAULT_MODULE_ADDRESS: &str = "0x86d53202b18d083a845839e65cda90722437f9ee3a1813b107debfb4b3cb24fb";

const MODULE_NAME: &str = "todolist";

/// What to do locally when a mutation
/// is submitted but its confirmation
/// times out.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum TimeoutPolicy {
  /// Treat as failed and roll back the
  /// optimistic edit.
  Rollback,
  /// Roll back, then re-read the list
  /// and adopt what the ledger holds.
  Reconcile
}

impl std::str::FromStr for TimeoutPolicy {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "rollback" => Ok(Self::Rollback),
      | "reconcile" => {
        Ok(Self::Reconcile)
      }
      | other => {
        Err(anyhow!(
          "unknown timeout policy \
           {other:?}; expected \
           rollback or reconcile"
        ))
      }
    }
  }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub node_url: String,
  pub module_address: String,
  pub request_timeout: Duration,
  pub await_timeout: Duration,
  pub poll_interval: Duration,
  pub table_read_concurrency: usize,
  pub on_timeout: TimeoutPolicy,
  pub reload_after_create_list: bool,
  pub loaded_files: Vec<PathBuf>
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      node_url: DEFAULT_NODE_URL
        .to_string(),
      module_address:
        DEFAULT_MODULE_ADDRESS
          .to_string(),
      request_timeout:
        Duration::from_secs(30),
      await_timeout:
        Duration::from_secs(30),
      poll_interval:
        Duration::from_millis(500),
      table_read_concurrency: 1,
      on_timeout:
        TimeoutPolicy::Rollback,
      reload_after_create_list: true,
      loaded_files: vec![]
    }
  }
}

impl ClientConfig {
  /// Defaults, then the first config
  /// file found: the explicit path,
  /// `$CHAINLIST_CONFIG`, or
  /// `~/.chainlist.toml`.
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::default();

    let path = resolve_config_path(
      config_override
    )?;
    if let Some(path) = path {
      info!(config = %path.display(), "loading chainlist config");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no config file found; using \
         defaults"
      );
    }

    cfg.validate()?;
    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("chainlist.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.set(&key, &v)?;
    }
    self.validate()
  }

  pub fn validate(
    &self
  ) -> anyhow::Result<()> {
    let url = self.node_url.trim();
    if url.is_empty() {
      bail!("node_url cannot be empty");
    }
    if !url.starts_with("http://")
      && !url.starts_with("https://")
    {
      bail!(
        "node_url must be http(s): \
         {url}"
      );
    }
    AccountAddress::parse(
      &self.module_address
    )
    .map_err(|e| anyhow!(e))
    .context("invalid module_address")?;
    if self.table_read_concurrency == 0
    {
      bail!(
        "table_read_concurrency must \
         be at least 1"
      );
    }
    if self.poll_interval.is_zero() {
      bail!(
        "poll_interval_ms must be \
         positive"
      );
    }
    Ok(())
  }

  /// Node URL without a trailing slash.
  pub fn base_url(&self) -> &str {
    self.node_url.trim_end_matches('/')
  }

  /// `<module>::todolist::TodoList`
  pub fn list_resource_type(
    &self
  ) -> String {
    format!(
      "{}::{MODULE_NAME}::TodoList",
      self.module_address
    )
  }

  /// `<module>::todolist::Task`
  pub fn task_value_type(
    &self
  ) -> String {
    format!(
      "{}::{MODULE_NAME}::Task",
      self.module_address
    )
  }

  pub fn entry_function(
    &self,
    name: &str
  ) -> String {
    format!(
      "{}::{MODULE_NAME}::{name}",
      self.module_address
    )
  }

  fn set(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    let value = value.trim();
    match key {
      | "node_url" => {
        self.node_url =
          value.to_string();
      }
      | "module_address" => {
        self.module_address =
          AccountAddress::parse(value)
            .map_err(|e| anyhow!(e))?
            .to_string();
      }
      | "request_timeout_secs" => {
        self.request_timeout =
          Duration::from_secs(
            parse_u64(key, value)?
          );
      }
      | "await_timeout_secs" => {
        self.await_timeout =
          Duration::from_secs(
            parse_u64(key, value)?
          );
      }
      | "poll_interval_ms" => {
        self.poll_interval =
          Duration::from_millis(
            parse_u64(key, value)?
          );
      }
      | "table_read_concurrency" => {
        self.table_read_concurrency =
          usize::try_from(parse_u64(
            key, value
          )?)
          .context(
            "table_read_concurrency \
             out of range"
          )?;
      }
      | "on_timeout" => {
        self.on_timeout =
          value.parse()?;
      }
      | "reload_after_create_list" => {
        self.reload_after_create_list =
          parse_bool(value);
      }
      | other => {
        warn!(key = %other, "ignoring unknown config key");
      }
    }
    Ok(())
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    let table: toml::Table =
      toml::from_str(&text)
        .with_context(|| {
          format!(
            "failed to parse {}",
            path.display()
          )
        })?;

    for (key, value) in table {
      let raw = match value {
        | toml::Value::String(s) => s,
        | other => other.to_string()
      };
      self.set(&key, &raw).with_context(
        || {
          format!(
            "invalid value for {key} \
             in {}",
            path.display()
          )
        }
      )?;
    }

    self.loaded_files.push(path);
    Ok(())
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(from_env) =
    std::env::var("CHAINLIST_CONFIG")
  {
    if from_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      from_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping default \
       config"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".chainlist.toml");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_u64(
  key: &str,
  value: &str
) -> anyhow::Result<u64> {
  value.parse::<u64>().with_context(
    || {
      format!(
        "{key} expects an unsigned \
         integer, got {value:?}"
      )
    }
  )
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
