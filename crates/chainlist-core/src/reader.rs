use chainlist_shared::{AccountAddress, Task, lenient_u64};
use futures_util::{StreamExt, TryStreamExt, stream};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{LedgerError, Result};
use crate::gateway::{LedgerGateway, TableItemRequest};

/// Outcome of reading an account's list. Never partially populated.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskListSnapshot {
    /// The account has no list resource yet.
    Missing,
    /// The read failed part way; nothing from it is usable.
    Unavailable { reason: LedgerError },
    Present { task_counter: u64, tasks: Vec<Task> },
}

impl TaskListSnapshot {
    pub fn has_list(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    pub fn tasks(&self) -> &[Task] {
        match self {
            Self::Present { tasks, .. } => tasks,
            _ => &[],
        }
    }
}

#[derive(Debug, Deserialize)]
struct TodoListData {
    tasks: TableRef,
    #[serde(deserialize_with = "lenient_u64::deserialize")]
    task_counter: u64,
}

#[derive(Debug, Deserialize)]
struct TableRef {
    handle: String,
}

/// Rebuilds the ordered task collection from the table-backed list resource.
pub struct TaskTableReader<'g, G> {
    gateway: &'g G,
    resource_type: String,
    task_type: String,
    concurrency: usize,
}

impl<'g, G> TaskTableReader<'g, G>
where
    G: LedgerGateway,
{
    pub fn new(gateway: &'g G, cfg: &ClientConfig) -> Self {
        Self {
            gateway,
            resource_type: cfg.list_resource_type(),
            task_type: cfg.task_value_type(),
            concurrency: cfg.table_read_concurrency.max(1),
        }
    }

    #[instrument(skip(self, account), fields(account = %account))]
    pub async fn load_all(&self, account: &AccountAddress) -> TaskListSnapshot {
        match self.try_load(account).await {
            Ok(None) => {
                debug!("account has no list");
                TaskListSnapshot::Missing
            }
            Ok(Some((task_counter, tasks))) => {
                info!(count = tasks.len(), "loaded task list");
                TaskListSnapshot::Present {
                    task_counter,
                    tasks,
                }
            }
            Err(reason) => {
                warn!(error = %reason, "task list read failed; reporting no list");
                TaskListSnapshot::Unavailable { reason }
            }
        }
    }

    async fn try_load(&self, account: &AccountAddress) -> Result<Option<(u64, Vec<Task>)>> {
        let resource = match self
            .gateway
            .read_resource(account, &self.resource_type)
            .await
        {
            Ok(resource) => resource,
            Err(LedgerError::ResourceNotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };

        let data: TodoListData = serde_json::from_value(resource.data)?;
        debug!(
            task_counter = data.task_counter,
            handle = %data.tasks.handle,
            "walking task table"
        );

        let tasks = self
            .fetch_tasks(&data.tasks.handle, data.task_counter)
            .await?;
        Ok(Some((data.task_counter, tasks)))
    }

    async fn fetch_tasks(&self, handle: &str, task_counter: u64) -> Result<Vec<Task>> {
        if self.concurrency == 1 {
            let mut tasks = Vec::new();
            for key in 1..=task_counter {
                tasks.push(self.fetch_task(handle, key).await?);
            }
            return Ok(tasks);
        }

        // `buffered` yields in input order, so ids stay ascending.
        stream::iter(1..=task_counter)
            .map(|key| self.fetch_task(handle, key))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    async fn fetch_task(&self, handle: &str, key: u64) -> Result<Task> {
        let request = TableItemRequest::u64_key(self.task_type.as_str(), key);
        let raw = self.gateway.read_table_item(handle, &request).await?;
        let task: Task = serde_json::from_value(raw)?;
        if task.task_id.get() != key {
            return Err(LedgerError::network(format!(
                "table key {key} holds task {}",
                task.task_id
            )));
        }
        Ok(task)
    }
}
