//! In-memory ledger for exercising the synchronizer without a node.
//!
//! # Features
//!
//! - **Module semantics**: `create_list`, `create_task` and `complete_task` behave like the
//!   on-chain `todolist` module, including its aborts.
//! - **Fault injection**: queue a `LedgerError` for the next call of any operation.
//! - **Hold gates**: park every call attributed to an account (or only one operation for
//!   it) until it is released, to interleave account switches with in-flight calls.
//! - **Call counting**: verify which capabilities were (not) invoked.
//!
//! Transactions execute when they are awaited. An injected `Timeout` on await still
//! executes the transaction, matching a confirmation that was lost while the
//! transaction landed.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chainlist_shared::{AccountAddress, Task, TaskId};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::error::{LedgerError, Result};
use crate::gateway::{LedgerGateway, RawResource, TableItemRequest, TransactionHandle};
use crate::payload::{ENTRY_FUNCTION_PAYLOAD, EntryFunctionPayload};

const E_NOT_INITIALIZED: (&str, u64) = ("E_NOT_INITIALIZED", 1);
const ETASK_DOESNT_EXIST: (&str, u64) = ("ETASK_DOESNT_EXIST", 2);
const ETASK_IS_COMPLETED: (&str, u64) = ("ETASK_IS_COMPLETED", 3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    ReadResource,
    ReadTableItem,
    SubmitTransaction,
    AwaitTransaction,
}

impl MockOp {
    fn slot(self) -> usize {
        match self {
            Self::ReadResource => 0,
            Self::ReadTableItem => 1,
            Self::SubmitTransaction => 2,
            Self::AwaitTransaction => 3,
        }
    }
}

#[derive(Debug)]
struct ListState {
    handle: String,
    task_counter: u64,
    tasks: BTreeMap<u64, Task>,
}

#[derive(Debug)]
struct QueuedTxn {
    sender: AccountAddress,
    payload: EntryFunctionPayload,
}

#[derive(Debug, Default)]
struct LedgerState {
    lists: HashMap<AccountAddress, ListState>,
    handles: HashMap<String, AccountAddress>,
    queued: HashMap<String, QueuedTxn>,
    next_handle: u64,
    next_txn: u64,
    wallet: Option<AccountAddress>,
    faults: HashMap<MockOp, VecDeque<LedgerError>>,
}

impl LedgerState {
    fn create_list(&mut self, owner: &AccountAddress) -> bool {
        if self.lists.contains_key(owner) {
            return false;
        }
        self.next_handle += 1;
        let handle = format!("0x{:x}", 0x7ab1e000_u64 + self.next_handle);
        self.handles.insert(handle.clone(), owner.clone());
        self.lists.insert(
            owner.clone(),
            ListState {
                handle,
                task_counter: 0,
                tasks: BTreeMap::new(),
            },
        );
        true
    }
}

#[derive(Debug, Clone)]
struct HoldGate {
    /// `None` parks every operation.
    op: Option<MockOp>,
    semaphore: Arc<Semaphore>,
}

#[derive(Debug)]
pub struct MockLedger {
    config: ClientConfig,
    state: Mutex<LedgerState>,
    holds: Mutex<HashMap<AccountAddress, HoldGate>>,
    calls: [AtomicUsize; 4],
}

impl MockLedger {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            config: config.clone(),
            state: Mutex::new(LedgerState::default()),
            holds: Mutex::new(HashMap::new()),
            calls: Default::default(),
        }
    }

    /// Account whose wallet signs submitted transactions.
    pub fn connect_wallet(&self, account: Option<AccountAddress>) {
        self.state.lock().wallet = account;
    }

    /// Creates a list for `owner` holding `tasks` as (content, completed) pairs.
    pub fn seed_list(&self, owner: &AccountAddress, tasks: &[(&str, bool)]) {
        let mut state = self.state.lock();
        state.create_list(owner);
        if let Some(list) = state.lists.get_mut(owner) {
            for (content, completed) in tasks {
                list.task_counter += 1;
                let id = list.task_counter;
                list.tasks.insert(
                    id,
                    Task {
                        task_id: TaskId::new(id).unwrap_or(TaskId::FIRST),
                        address: owner.clone(),
                        content: (*content).to_string(),
                        completed: *completed,
                    },
                );
            }
        }
    }

    pub fn task_counter(&self, owner: &AccountAddress) -> Option<u64> {
        self.state.lock().lists.get(owner).map(|l| l.task_counter)
    }

    pub fn stored_task(&self, owner: &AccountAddress, id: u64) -> Option<Task> {
        self.state
            .lock()
            .lists
            .get(owner)
            .and_then(|l| l.tasks.get(&id).cloned())
    }

    /// The next call of `op` fails with `err`. Injections queue up per operation.
    pub fn inject(&self, op: MockOp, err: LedgerError) {
        self.state
            .lock()
            .faults
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Parks every call attributed to `account` until [`MockLedger::release`].
    pub fn hold(&self, account: &AccountAddress) {
        self.install_gate(account, None);
    }

    /// Like [`MockLedger::hold`], but only `op` is parked; other calls pass.
    pub fn hold_op(&self, account: &AccountAddress, op: MockOp) {
        self.install_gate(account, Some(op));
    }

    pub fn release(&self, account: &AccountAddress) {
        if let Some(gate) = self.holds.lock().remove(account) {
            gate.semaphore.close();
        }
    }

    fn install_gate(&self, account: &AccountAddress, op: Option<MockOp>) {
        // An existing gate keeps its parked calls and its filter.
        self.holds
            .lock()
            .entry(account.clone())
            .or_insert_with(|| HoldGate {
                op,
                semaphore: Arc::new(Semaphore::new(0)),
            });
    }

    pub fn calls(&self, op: MockOp) -> usize {
        self.calls[op.slot()].load(Ordering::SeqCst)
    }

    async fn enter(&self, op: MockOp, account: Option<&AccountAddress>) -> Option<LedgerError> {
        self.calls[op.slot()].fetch_add(1, Ordering::SeqCst);

        let gate = account
            .and_then(|a| self.holds.lock().get(a).cloned())
            .filter(|gate| gate.op.is_none_or(|held| held == op));
        if let Some(gate) = gate {
            trace!(?op, "call parked at hold gate");
            // Closing the semaphore is the release signal.
            let _ = gate.semaphore.acquire().await;
        }

        self.state
            .lock()
            .faults
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
    }

    fn abort(&self, hash: &str, (name, code): (&str, u64)) -> LedgerError {
        LedgerError::rejected(
            Some(hash.to_string()),
            format!(
                "Move abort in {}::todolist: {name}(0x{code:x})",
                self.config.module_address
            ),
        )
    }

    fn execute(&self, hash: &str, txn: QueuedTxn) -> Result<()> {
        let mut state = self.state.lock();
        let sender = txn.sender;
        let payload = txn.payload;

        match payload.function_name() {
            "create_list" => {
                if !state.create_list(&sender) {
                    return Err(LedgerError::rejected(
                        Some(hash.to_string()),
                        "RESOURCE_ALREADY_EXISTS",
                    ));
                }
            }
            "create_task" => {
                let content = payload
                    .string_arg(0)
                    .ok_or_else(|| LedgerError::rejected(Some(hash.to_string()), "NUMBER_OF_ARGUMENTS_MISMATCH"))?
                    .to_string();
                let list = state
                    .lists
                    .get_mut(&sender)
                    .ok_or_else(|| self.abort(hash, E_NOT_INITIALIZED))?;
                list.task_counter += 1;
                let id = list.task_counter;
                let task_id = TaskId::new(id).map_err(LedgerError::network)?;
                list.tasks
                    .insert(id, Task::new_pending(task_id, sender.clone(), content));
            }
            "complete_task" => {
                let id = payload
                    .string_arg(0)
                    .and_then(|raw| raw.parse::<u64>().ok())
                    .ok_or_else(|| LedgerError::rejected(Some(hash.to_string()), "FAILED_TO_DESERIALIZE_ARGUMENT"))?;
                let list = state
                    .lists
                    .get_mut(&sender)
                    .ok_or_else(|| self.abort(hash, E_NOT_INITIALIZED))?;
                let task = list
                    .tasks
                    .get_mut(&id)
                    .ok_or_else(|| self.abort(hash, ETASK_DOESNT_EXIST))?;
                if task.completed {
                    return Err(self.abort(hash, ETASK_IS_COMPLETED));
                }
                task.completed = true;
            }
            other => {
                return Err(LedgerError::rejected(
                    Some(hash.to_string()),
                    format!("FUNCTION_RESOLUTION_FAILURE: {other}"),
                ));
            }
        }

        debug!(hash, function = %payload.function, "mock transaction executed");
        Ok(())
    }
}

impl LedgerGateway for MockLedger {
    async fn read_resource(
        &self,
        account: &AccountAddress,
        resource_type: &str,
    ) -> Result<RawResource> {
        if let Some(err) = self.enter(MockOp::ReadResource, Some(account)).await {
            return Err(err);
        }

        let not_found = || LedgerError::ResourceNotFound {
            account: account.to_string(),
            resource_type: resource_type.to_string(),
        };
        if resource_type != self.config.list_resource_type() {
            return Err(not_found());
        }

        let state = self.state.lock();
        let list = state.lists.get(account).ok_or_else(not_found)?;
        Ok(RawResource {
            resource_type: resource_type.to_string(),
            data: json!({
                "set_task_event": { "counter": "0" },
                "task_counter": list.task_counter.to_string(),
                "tasks": { "handle": list.handle },
            }),
        })
    }

    async fn read_table_item(&self, handle: &str, request: &TableItemRequest) -> Result<Value> {
        let owner = self.state.lock().handles.get(handle).cloned();
        if let Some(err) = self.enter(MockOp::ReadTableItem, owner.as_ref()).await {
            return Err(err);
        }

        let owner = owner.ok_or_else(|| LedgerError::network(format!("table {handle} not found")))?;
        if request.key_type != "u64" || request.value_type != self.config.task_value_type() {
            return Err(LedgerError::network(format!(
                "table {handle} does not map {} to {}",
                request.key_type, request.value_type
            )));
        }
        let key = request
            .key
            .parse::<u64>()
            .map_err(|e| LedgerError::network(format!("invalid u64 key {}: {e}", request.key)))?;

        let state = self.state.lock();
        let task = state
            .lists
            .get(&owner)
            .and_then(|l| l.tasks.get(&key))
            .ok_or_else(|| LedgerError::network(format!("table item {key} not found")))?;
        Ok(serde_json::to_value(task)?)
    }

    async fn submit_transaction(
        &self,
        payload: &EntryFunctionPayload,
    ) -> Result<TransactionHandle> {
        let sender = self.state.lock().wallet.clone();
        if let Some(err) = self.enter(MockOp::SubmitTransaction, sender.as_ref()).await {
            return Err(err);
        }

        let sender = sender.ok_or_else(|| LedgerError::rejected(None, "no wallet connected"))?;
        let module_prefix = format!("{}::todolist::", self.config.module_address);
        if payload.kind != ENTRY_FUNCTION_PAYLOAD || !payload.function.starts_with(&module_prefix) {
            return Err(LedgerError::rejected(
                None,
                format!("unsupported payload {}", payload.function),
            ));
        }

        let mut state = self.state.lock();
        state.next_txn += 1;
        let hash = format!("0x{:064x}", state.next_txn);
        state.queued.insert(
            hash.clone(),
            QueuedTxn {
                sender,
                payload: payload.clone(),
            },
        );
        Ok(TransactionHandle { hash })
    }

    async fn await_transaction(&self, handle: &TransactionHandle) -> Result<()> {
        let sender = self
            .state
            .lock()
            .queued
            .get(&handle.hash)
            .map(|txn| txn.sender.clone());
        let fault = self.enter(MockOp::AwaitTransaction, sender.as_ref()).await;

        let txn = self
            .state
            .lock()
            .queued
            .remove(&handle.hash)
            .ok_or_else(|| LedgerError::network(format!("transaction {} not found", handle.hash)))?;

        match fault {
            Some(err) if err.is_indeterminate() => {
                let landed = self.execute(&handle.hash, txn);
                debug!(landed = landed.is_ok(), "confirmation lost for mock transaction");
                Err(err)
            }
            Some(err) => Err(err),
            None => self.execute(&handle.hash, txn),
        }
    }
}
