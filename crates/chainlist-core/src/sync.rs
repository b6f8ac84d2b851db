//! Orchestrates reads on account change and optimistic mutations for the active account.
//!
//! Every in-flight operation is tagged with the [`Session`] it was issued for. The
//! session changes whenever the account changes or the list is re-read, and results
//! for a session that is no longer active are dropped.
//!
//! A mutation belongs to its account rather than its session: switching away and back
//! does not allow a second mutation for the same account until the first one settles.
//!
//! The state lock is never held across a gateway call.

use chainlist_shared::{AccountAddress, ListPhase, ListView, Task, TaskId};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{ClientConfig, TimeoutPolicy};
use crate::error::{LedgerError, Result};
use crate::executor::MutationExecutor;
use crate::gateway::LedgerGateway;
use crate::overlay::{EditKind, PendingOverlay};
use crate::payload::TodoCall;
use crate::reader::{TaskListSnapshot, TaskTableReader};

/// Why a mutation request was a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoAccount,
    MutationPending,
    /// The list is loading or not loaded in a phase that accepts this request.
    WrongPhase(ListPhase),
    UnknownTask(TaskId),
    AlreadyCompleted(TaskId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Committed,
    Skipped(SkipReason),
    /// The account changed while the mutation was in flight.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied(ListPhase),
    /// The account was already active.
    Unchanged,
    Skipped(SkipReason),
    /// A newer session superseded this read.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub account: AccountAddress,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct ControllerState {
    generation: u64,
    account: Option<AccountAddress>,
    phase: ListPhase,
    overlay: PendingOverlay,
    pending_mutation: bool,
    /// Account whose mutation is still executing. Survives session resets.
    in_flight: Option<AccountAddress>,
    last_error: Option<LedgerError>,
}

impl ControllerState {
    fn is_current(&self, session: &Session) -> bool {
        self.generation == session.generation && self.account.as_ref() == Some(&session.account)
    }

    /// Starts a new session; everything speculative from the old one is gone.
    fn reset(&mut self, account: Option<AccountAddress>) -> Option<Session> {
        self.generation += 1;
        self.overlay = PendingOverlay::default();
        self.pending_mutation = false;
        self.last_error = None;
        self.phase = if account.is_some() {
            ListPhase::Loading
        } else {
            ListPhase::Uninitialized
        };
        self.account = account;
        self.session()
    }

    fn session(&self) -> Option<Session> {
        self.account.as_ref().map(|account| Session {
            account: account.clone(),
            generation: self.generation,
        })
    }

    fn begin_mutation(&self, allowed: &[ListPhase]) -> std::result::Result<Session, SkipReason> {
        let session = self.session().ok_or(SkipReason::NoAccount)?;
        if self.pending_mutation || self.in_flight.as_ref() == Some(&session.account) {
            return Err(SkipReason::MutationPending);
        }
        if !allowed.contains(&self.phase) {
            return Err(SkipReason::WrongPhase(self.phase));
        }
        Ok(session)
    }

    fn start_mutation(&mut self, session: &Session) {
        self.pending_mutation = true;
        self.in_flight = Some(session.account.clone());
        self.last_error = None;
    }

    fn finish_mutation(&mut self, account: &AccountAddress) {
        if self.in_flight.as_ref() == Some(account) {
            self.in_flight = None;
        }
    }

    /// New generation for the active account; older reads for it are dropped.
    fn begin_reload(&mut self) -> Option<Session> {
        self.account.as_ref()?;
        self.generation += 1;
        self.phase = ListPhase::Loading;
        self.session()
    }

    fn apply_snapshot(&mut self, snapshot: TaskListSnapshot) -> ListPhase {
        match snapshot {
            TaskListSnapshot::Present { tasks, .. } => {
                self.overlay.replace_confirmed(tasks);
                self.phase = ListPhase::Ready;
                self.last_error = None;
            }
            TaskListSnapshot::Missing => {
                self.overlay.replace_confirmed(vec![]);
                self.phase = ListPhase::NoList;
                self.last_error = None;
            }
            TaskListSnapshot::Unavailable { reason } => {
                self.overlay.replace_confirmed(vec![]);
                self.phase = ListPhase::Error;
                self.last_error = Some(reason);
            }
        }
        self.phase
    }
}

/// Clears `pending_mutation` and the account's in-flight marker and drops the
/// speculative edit unless the mutation settled normally. Runs on panic and when
/// the mutation future is dropped.
struct PendingGuard<'a> {
    state: &'a Mutex<ControllerState>,
    session: Session,
    edit: Option<Uuid>,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        state.finish_mutation(&self.session.account);
        if state.is_current(&self.session) {
            warn!(account = %self.session.account, "mutation abandoned before settling; rolling back");
            if let Some(edit) = self.edit {
                state.overlay.discard(edit);
            }
            state.pending_mutation = false;
        }
    }
}

pub struct SyncController<G> {
    gateway: G,
    config: ClientConfig,
    state: Mutex<ControllerState>,
}

impl<G> SyncController<G>
where
    G: LedgerGateway,
{
    pub fn new(gateway: G, config: ClientConfig) -> Self {
        Self {
            gateway,
            config,
            state: Mutex::new(ControllerState::default()),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn account(&self) -> Option<AccountAddress> {
        self.state.lock().account.clone()
    }

    pub fn view(&self) -> ListView {
        let state = self.state.lock();
        ListView {
            account: state.account.clone(),
            phase: state.phase,
            has_list: state.phase == ListPhase::Ready,
            tasks: state.overlay.view(),
            pending_mutation: state.pending_mutation,
            last_error: state.last_error.as_ref().map(ToString::to_string),
        }
    }

    pub fn last_error(&self) -> Option<LedgerError> {
        self.state.lock().last_error.clone()
    }

    fn reader(&self) -> TaskTableReader<'_, G> {
        TaskTableReader::new(&self.gateway, &self.config)
    }

    fn executor(&self) -> MutationExecutor<'_, G> {
        MutationExecutor::new(&self.gateway)
    }

    /// Switches the active account (or clears it) and reads its list.
    #[instrument(skip(self))]
    pub async fn select_account(&self, account: Option<AccountAddress>) -> LoadOutcome {
        let session = {
            let mut state = self.state.lock();
            if state.account == account && state.phase != ListPhase::Uninitialized {
                debug!("account unchanged");
                return LoadOutcome::Unchanged;
            }
            match state.reset(account) {
                Some(session) => session,
                None => {
                    info!("account cleared");
                    return LoadOutcome::Applied(ListPhase::Uninitialized);
                }
            }
        };

        info!(account = %session.account, generation = session.generation, "account selected");
        self.load(&session).await
    }

    /// Re-reads the active account's list, replacing local state.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> LoadOutcome {
        let session = {
            let mut state = self.state.lock();
            if state.account.is_none() {
                return LoadOutcome::Skipped(SkipReason::NoAccount);
            }
            if state.pending_mutation || state.in_flight == state.account {
                return LoadOutcome::Skipped(SkipReason::MutationPending);
            }
            match state.begin_reload() {
                Some(session) => session,
                None => return LoadOutcome::Skipped(SkipReason::NoAccount),
            }
        };

        self.load(&session).await
    }

    async fn load(&self, session: &Session) -> LoadOutcome {
        let snapshot = self.reader().load_all(&session.account).await;

        let mut state = self.state.lock();
        if !state.is_current(session) {
            debug!(account = %session.account, "discarding stale read");
            return LoadOutcome::Discarded;
        }
        LoadOutcome::Applied(state.apply_snapshot(snapshot))
    }

    /// Re-reads after a mutation. Only a present list is adopted: a node that lags
    /// behind the confirmation may still report no list, so anything else keeps
    /// `fallback`.
    async fn reload_after_mutation(&self, session: &Session, fallback: ListPhase) {
        let snapshot = self.reader().load_all(&session.account).await;

        let mut state = self.state.lock();
        if !state.is_current(session) {
            debug!(account = %session.account, "discarding stale reload");
            return;
        }
        if snapshot.has_list() {
            state.apply_snapshot(snapshot);
        } else {
            warn!(?fallback, "reload after mutation returned no list; keeping local state");
            state.phase = fallback;
        }
    }

    #[instrument(skip(self))]
    pub async fn create_list(&self) -> Result<MutationOutcome> {
        let session = {
            let mut state = self.state.lock();
            let session = match state.begin_mutation(&[ListPhase::NoList, ListPhase::Error]) {
                Ok(session) => session,
                Err(reason) => return Ok(skipped(reason)),
            };
            state.start_mutation(&session);
            session
        };

        let reload = self.config.reload_after_create_list;
        let outcome = self
            .run_mutation(&session, TodoCall::CreateList, None, |state, committed| {
                state.phase = match (committed, reload) {
                    (false, _) => ListPhase::NoList,
                    (true, true) => ListPhase::Loading,
                    (true, false) => ListPhase::Ready,
                };
            })
            .await?;

        if outcome == MutationOutcome::Committed && reload {
            self.reload_after_mutation(&session, ListPhase::Ready).await;
        }
        Ok(outcome)
    }

    #[instrument(skip(self, content))]
    pub async fn add_task(&self, content: impl Into<String>) -> Result<MutationOutcome> {
        let content = content.into();
        let (session, edit) = {
            let mut state = self.state.lock();
            let session = match state.begin_mutation(&[ListPhase::Ready]) {
                Ok(session) => session,
                Err(reason) => return Ok(skipped(reason)),
            };
            let task_id = state.overlay.next_task_id();
            debug!(task_id = %task_id, "optimistically adding task");
            let task = Task::new_pending(task_id, session.account.clone(), content.clone());
            let edit = state.overlay.push(EditKind::AddTask(task));
            state.start_mutation(&session);
            (session, edit)
        };

        self.run_mutation(&session, TodoCall::CreateTask { content }, Some(edit), |_, _| {})
            .await
    }

    #[instrument(skip(self))]
    pub async fn complete_task(&self, task_id: TaskId) -> Result<MutationOutcome> {
        let (session, edit) = {
            let mut state = self.state.lock();
            let session = match state.begin_mutation(&[ListPhase::Ready]) {
                Ok(session) => session,
                Err(reason) => return Ok(skipped(reason)),
            };
            match state.overlay.find(task_id) {
                None => return Ok(skipped(SkipReason::UnknownTask(task_id))),
                Some(task) if task.completed => {
                    return Ok(skipped(SkipReason::AlreadyCompleted(task_id)));
                }
                Some(_) => {}
            }
            let edit = state.overlay.push(EditKind::CompleteTask(task_id));
            state.start_mutation(&session);
            (session, edit)
        };

        self.run_mutation(&session, TodoCall::CompleteTask { task_id }, Some(edit), |_, _| {})
            .await
    }

    /// Executes `call` for a session whose `pending_mutation` is already set.
    /// `settle` runs under the state lock with whether the mutation committed.
    async fn run_mutation<F>(
        &self,
        session: &Session,
        call: TodoCall,
        edit: Option<Uuid>,
        settle: F,
    ) -> Result<MutationOutcome>
    where
        F: FnOnce(&mut ControllerState, bool),
    {
        let mut guard = PendingGuard {
            state: &self.state,
            session: session.clone(),
            edit,
            armed: true,
        };

        let payload = call.to_payload(&self.config);
        let result = self.executor().execute(&payload).await;

        guard.disarm();
        let outcome = {
            let mut state = self.state.lock();
            state.finish_mutation(&session.account);
            if !state.is_current(session) {
                debug!(function = call.function_name(), "discarding mutation result for inactive session");
                // The account came back while this ran; its view predates the result.
                let reread = if state.account.as_ref() == Some(&session.account) {
                    state.begin_reload()
                } else {
                    None
                };
                drop(state);
                if let Some(current) = reread {
                    info!(account = %current.account, "re-reading after superseded mutation");
                    self.load(&current).await;
                }
                return Ok(MutationOutcome::Discarded);
            }
            state.pending_mutation = false;

            match result {
                Ok(_) => {
                    if let Some(edit) = edit {
                        state.overlay.commit(edit);
                    }
                    settle(&mut *state, true);
                    Ok(MutationOutcome::Committed)
                }
                Err(err) => {
                    if let Some(edit) = edit {
                        state.overlay.discard(edit);
                    }
                    settle(&mut *state, false);
                    state.last_error = Some(err.clone());
                    Err(err)
                }
            }
        };

        if let Err(err) = &outcome
            && err.is_indeterminate()
            && self.config.on_timeout == TimeoutPolicy::Reconcile
        {
            self.reconcile(session).await;
        }
        outcome
    }

    /// Adopts whatever the ledger holds after an indeterminate mutation.
    async fn reconcile(&self, session: &Session) {
        let fallback = {
            let mut state = self.state.lock();
            if !state.is_current(session) || state.pending_mutation {
                return;
            }
            let fallback = state.phase;
            state.phase = ListPhase::Loading;
            fallback
        };
        info!(account = %session.account, "reconciling after unconfirmed mutation");
        self.reload_after_mutation(session, fallback).await;
    }
}

fn skipped(reason: SkipReason) -> MutationOutcome {
    debug!(?reason, "mutation request skipped");
    MutationOutcome::Skipped(reason)
}
