use chainlist_shared::TaskId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ClientConfig;

pub const ENTRY_FUNCTION_PAYLOAD: &str = "entry_function_payload";

/// Request naming a remote state-transition function and its arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryFunctionPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Value>,
}

impl EntryFunctionPayload {
    /// Trailing segment of `<address>::<module>::<name>`.
    pub fn function_name(&self) -> &str {
        self.function
            .rsplit("::")
            .next()
            .unwrap_or(self.function.as_str())
    }

    pub fn string_arg(&self, idx: usize) -> Option<&str> {
        self.arguments.get(idx).and_then(Value::as_str)
    }
}

/// The three mutations the `todolist` module exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoCall {
    CreateList,
    CreateTask { content: String },
    CompleteTask { task_id: TaskId },
}

impl TodoCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::CreateList => "create_list",
            Self::CreateTask { .. } => "create_task",
            Self::CompleteTask { .. } => "complete_task",
        }
    }

    pub fn to_payload(&self, cfg: &ClientConfig) -> EntryFunctionPayload {
        let arguments = match self {
            Self::CreateList => vec![],
            Self::CreateTask { content } => vec![Value::String(content.clone())],
            Self::CompleteTask { task_id } => vec![Value::String(task_id.to_string())],
        };

        EntryFunctionPayload {
            kind: ENTRY_FUNCTION_PAYLOAD.to_string(),
            function: cfg.entry_function(self.function_name()),
            type_arguments: vec![],
            arguments,
        }
    }
}
