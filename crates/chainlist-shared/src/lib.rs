use std::fmt;
use std::str::FromStr;

use serde::{
  Deserialize,
  Deserializer,
  Serialize,
  Serializer
};

/// Length of a canonical account
/// address in hex digits.
const ADDRESS_HEX_LEN: usize = 64;

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
)]
#[serde(
  try_from = "String",
  into = "String"
)]
pub struct AccountAddress(String);

impl AccountAddress {
  /// Parses `0x`-prefixed (or bare)
  /// hex and pads it to the long form
  /// so `0x1` and `0x00..01` compare
  /// equal.
  pub fn parse(
    raw: &str
  ) -> Result<Self, String> {
    let trimmed = raw.trim();
    let digits = trimmed
      .strip_prefix("0x")
      .or_else(|| {
        trimmed.strip_prefix("0X")
      })
      .unwrap_or(trimmed);

    if digits.is_empty() {
      return Err(format!(
        "account address is empty: \
         {raw:?}"
      ));
    }
    if digits.len() > ADDRESS_HEX_LEN {
      return Err(format!(
        "account address longer than \
         {ADDRESS_HEX_LEN} hex digits: \
         {raw}"
      ));
    }
    if !digits
      .chars()
      .all(|c| c.is_ascii_hexdigit())
    {
      return Err(format!(
        "account address is not hex: \
         {raw}"
      ));
    }

    Ok(Self(format!(
      "0x{:0>width$}",
      digits.to_ascii_lowercase(),
      width = ADDRESS_HEX_LEN
    )))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Abbreviated form used when
  /// listing task creators,
  /// e.g. `0x86d5...b24fb`.
  pub fn short(&self) -> String {
    let head = &self.0[..6];
    let tail =
      &self.0[self.0.len() - 5..];
    format!("{head}...{tail}")
  }
}

impl fmt::Display for AccountAddress {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for AccountAddress {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl TryFrom<String> for AccountAddress {
  type Error = String;

  fn try_from(
    value: String
  ) -> Result<Self, Self::Error> {
    Self::parse(&value)
  }
}

impl From<AccountAddress> for String {
  fn from(value: AccountAddress) -> Self {
    value.0
  }
}

/// Ledger-assigned task id. Ids start
/// at 1 and travel as decimal strings.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
)]
pub struct TaskId(u64);

impl TaskId {
  pub const FIRST: TaskId = TaskId(1);

  pub fn new(
    value: u64
  ) -> Result<Self, String> {
    if value == 0 {
      return Err(
        "task ids start at 1".to_string()
      );
    }
    Ok(Self(value))
  }

  pub fn get(self) -> u64 {
    self.0
  }

  /// Saturates at `u64::MAX`; the
  /// ledger counter cannot go past it.
  pub fn next(self) -> Self {
    Self(self.0.saturating_add(1))
  }
}

impl fmt::Display for TaskId {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl FromStr for TaskId {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let value =
      s.trim().parse::<u64>().map_err(
        |e| {
          format!(
            "invalid task id {s:?}: {e}"
          )
        }
      )?;
    Self::new(value)
  }
}

impl Serialize for TaskId {
  fn serialize<S>(
    &self,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer
      .collect_str(&self.0)
  }
}

impl<'de> Deserialize<'de> for TaskId {
  fn deserialize<D>(
    deserializer: D
  ) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw =
      lenient_u64::deserialize(
        deserializer
      )?;
    TaskId::new(raw)
      .map_err(serde::de::Error::custom)
  }
}

/// The ledger's JSON encodes `u64` as
/// a decimal string; some transports
/// send a plain number.
pub mod lenient_u64 {
  use serde::{
    Deserialize,
    Deserializer
  };

  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Repr {
    Number(u64),
    Text(String)
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<u64, D::Error>
  where
    D: Deserializer<'de>
  {
    match Repr::deserialize(
      deserializer
    )? {
      | Repr::Number(n) => Ok(n),
      | Repr::Text(s) => {
        s.trim().parse::<u64>().map_err(
          |e| {
            serde::de::Error::custom(
              format!(
                "expected u64, got \
                 {s:?}: {e}"
              )
            )
          }
        )
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct Task {
  pub task_id:   TaskId,
  pub address:   AccountAddress,
  pub content:   String,
  pub completed: bool
}

impl Task {
  pub fn new_pending(
    task_id: TaskId,
    address: AccountAddress,
    content: String
  ) -> Self {
    Self {
      task_id,
      address,
      content,
      completed: false
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ListPhase {
  #[default]
  Uninitialized,
  Loading,
  NoList,
  Ready,
  Error
}

/// What a presentation layer renders.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Default,
)]
pub struct ListView {
  pub account:          Option<AccountAddress>,
  pub phase:            ListPhase,
  pub has_list:         bool,
  pub tasks:            Vec<Task>,
  pub pending_mutation: bool,
  #[serde(default)]
  pub last_error:       Option<String>
}

impl ListView {
  pub fn task(
    &self,
    task_id: TaskId
  ) -> Option<&Task> {
    self
      .tasks
      .iter()
      .find(|t| t.task_id == task_id)
  }
}
